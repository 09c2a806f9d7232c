use std::process::Stdio;
use std::time::{Duration, Instant};

use thirtyfour::{ChromeCapabilities, ChromiumLikeCapabilities};
use thirtyfour::prelude::*;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::core::PageRenderer;
use crate::error::{Result, TubemixError};

const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);
const READY_STATE_TIMEOUT: Duration = Duration::from_secs(30);
/// Long playlists only render the rows near the viewport
const MAX_SCROLLS: usize = 50;

/// One automated browser, owned by whoever drives it
pub struct BrowserSession {
    driver: WebDriver,
    settle_delay: Duration,
    driver_process: Option<Child>,
}

fn chrome_capabilities(config: &BrowserConfig) -> Result<ChromeCapabilities> {
    let mut caps = DesiredCapabilities::chrome();
    if config.headless {
        caps.set_headless()?;
    }
    caps.add_arg("--disable-logging")?;
    caps.add_arg("--log-level=3")?;
    caps.add_arg("--mute-audio")?;
    Ok(caps)
}

fn spawn_driver(config: &BrowserConfig) -> Result<Child> {
    let port = config.driver_port();
    info!(port, "starting {}", config.driver_binary.display());
    Command::new(&config.driver_binary)
        .arg(format!("--port={}", port))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            TubemixError::BrowserStart(format!(
                "could not run {}: {}",
                config.driver_binary.display(),
                e
            ))
        })
}

impl BrowserSession {
    pub async fn start(config: &BrowserConfig) -> Result<Self> {
        let driver_process = if config.spawn_driver {
            Some(spawn_driver(config)?)
        } else {
            None
        };
        let caps = chrome_capabilities(config)?;

        // a freshly spawned driver needs a moment before it accepts sessions
        let deadline = Instant::now() + config.driver_startup_timeout;
        let driver = loop {
            match WebDriver::new(config.webdriver_url.as_str(), caps.clone()).await {
                Ok(driver) => break driver,
                Err(e) if driver_process.is_some() && Instant::now() < deadline => {
                    debug!("webdriver not ready yet: {}", e);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(TubemixError::BrowserStart(format!(
                        "{}: {}",
                        config.webdriver_url, e
                    )));
                }
            }
        };
        info!(headless = config.headless, "browser session started");

        Ok(Self {
            driver,
            settle_delay: config.settle_delay,
            driver_process,
        })
    }

    pub fn driver(&self) -> &WebDriver {
        &self.driver
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        debug!("navigating to {}", url);
        self.driver.goto(url).await?;
        Ok(())
    }

    /// Run a script in the page and return its JSON result
    pub async fn run_script(&self, script: &str) -> Result<serde_json::Value> {
        let ret = self.driver.execute(script, Vec::new()).await?;
        Ok(ret.json().clone())
    }

    /// Run a script expected to return a string; `null`, non-strings and
    /// blanks come back as `None`.
    pub async fn read_string(&self, script: &str) -> Result<Option<String>> {
        let value = self.run_script(script).await?;
        Ok(value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    async fn wait_until_ready(&self) -> Result<()> {
        let started = Instant::now();
        loop {
            let state = self.read_string("return document.readyState;").await?;
            if state.as_deref() == Some("complete") {
                break;
            }
            if started.elapsed() >= READY_STATE_TIMEOUT {
                warn!("page never reported readyState=complete, continuing anyway");
                break;
            }
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
        }
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }

    async fn scroll_to_end(&self) -> Result<()> {
        let mut last_height = self
            .run_script("return document.documentElement.scrollHeight;")
            .await?
            .as_u64()
            .unwrap_or(0);
        for _ in 0..MAX_SCROLLS {
            self.run_script("window.scrollTo(0, document.documentElement.scrollHeight);")
                .await?;
            tokio::time::sleep(self.settle_delay).await;
            let height = self
                .run_script("return document.documentElement.scrollHeight;")
                .await?
                .as_u64()
                .unwrap_or(0);
            if height <= last_height {
                break;
            }
            last_height = height;
        }
        Ok(())
    }

    /// Quit the browser. Failures are logged, the process is exiting anyway.
    pub async fn close(self) {
        if let Err(e) = self.driver.quit().await {
            warn!("failed to close browser: {}", e);
        }
        if let Some(mut child) = self.driver_process {
            let _ = child.kill().await;
        }
        debug!("browser session closed");
    }
}

#[async_trait::async_trait]
impl PageRenderer for BrowserSession {
    async fn render(&self, url: &str) -> Result<String> {
        self.goto(url).await?;
        self.wait_until_ready().await?;
        self.scroll_to_end().await?;
        Ok(self.driver.source().await?)
    }
}
