use std::time::{Duration, Instant};

use thirtyfour::prelude::*;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::converter::{Conversion, ConversionService};
use crate::core::MediaFormat;
use crate::error::{Result, TubemixError};
use crate::youtube::utils::build_watch_url;

/// Element id of the link input on the entry page
const INPUT_ID: &str = "v";

/// Swaps the site's download trigger for one that only records its arguments.
/// The site calls `download(url, _, _, title)`; title is only filled for audio.
const HOOK_SCRIPT: &str = r#"
window._downloadLink = null;
window._title = null;
window.download = function (e, t, r, n) {
  window._downloadLink = e;
  window._title = n;
};
"#;
const READ_LINK_SCRIPT: &str = "return window._downloadLink || null;";
const READ_TITLE_SCRIPT: &str = "return window._title || null;";

/// What the poll loop watches on the converter page after submitting
#[async_trait::async_trait]
trait ResultPage: Send + Sync {
    /// Link captured by the hook, if the site handed one over yet
    async fn read_link(&self) -> Result<Option<String>>;
    async fn button_count(&self) -> Result<usize>;
}

#[async_trait::async_trait]
impl ResultPage for BrowserSession {
    async fn read_link(&self) -> Result<Option<String>> {
        self.read_string(READ_LINK_SCRIPT).await
    }

    async fn button_count(&self) -> Result<usize> {
        Ok(self.driver().find_all(By::Tag("button")).await?.len())
    }
}

/// Poll until the hook holds a link. A page left with a single button is
/// the site's error screen.
async fn wait_for_link(
    page: &dyn ResultPage,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<String> {
    let started = Instant::now();
    loop {
        if let Some(link) = page.read_link().await? {
            return Ok(link);
        }
        match page.button_count().await {
            Ok(1) => {
                return Err(TubemixError::ConversionFailed(
                    "the service could not convert this video".to_string(),
                ));
            }
            Ok(_) => {}
            // the result panel re-renders while converting
            Err(e) => debug!("button lookup failed mid-render: {}", e),
        }
        if started.elapsed() >= timeout {
            return Err(TubemixError::ConversionTimeout(timeout.as_secs()));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn title_or_identifier(title: Option<String>, identifier: &str) -> String {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| identifier.to_string())
}

/// ytmp3-style converter page driven through the browser
pub struct Ytmp3Service {
    session: BrowserSession,
    entry_url: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl Ytmp3Service {
    pub fn new(session: BrowserSession, config: &Config) -> Self {
        Self {
            session,
            entry_url: config.service_url.clone(),
            timeout: config.conversion_timeout,
            poll_interval: config.poll_interval,
        }
    }

    pub async fn close(self) {
        self.session.close().await;
    }

    async fn buttons(&self) -> Result<Vec<WebElement>> {
        Ok(self.session.driver().find_all(By::Tag("button")).await?)
    }

    async fn submit(&self, identifier: &str, format: MediaFormat) -> Result<()> {
        let input = self.session.driver().find(By::Id(INPUT_ID)).await?;
        input.clear().await?;
        input.send_keys(build_watch_url(identifier)).await?;

        let buttons = self.buttons().await?;
        // first button toggles the format, last one converts
        if !format.is_audio()
            && let Some(toggle) = buttons.first()
        {
            toggle.click().await?;
        }
        let convert = self.buttons().await?.pop().ok_or_else(|| {
            TubemixError::ConversionFailed("convert button not found".to_string())
        })?;
        convert.click().await?;
        Ok(())
    }

    async fn resolve_title(&self, format: MediaFormat) -> Result<Option<String>> {
        if format.is_audio() {
            return self.session.read_string(READ_TITLE_SCRIPT).await;
        }
        // the hook doesn't see video titles, the result panel shows it
        let panel = self.session.driver().find(By::Tag("div")).await?;
        let text = panel.text().await?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

#[async_trait::async_trait]
impl ConversionService for Ytmp3Service {
    async fn submit_for_conversion(
        &self,
        identifier: &str,
        format: MediaFormat,
    ) -> Result<Conversion> {
        // the site's script state only resets on a full reload
        self.session.goto(&self.entry_url).await?;
        self.session.run_script(HOOK_SCRIPT).await?;
        self.submit(identifier, format).await?;

        let file_url = wait_for_link(&self.session, self.timeout, self.poll_interval).await?;
        let title = title_or_identifier(self.resolve_title(format).await?, identifier);
        debug!(%title, "conversion ready for {}", identifier);

        Ok(Conversion { file_url, title })
    }
}
