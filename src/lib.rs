pub mod browser;
pub mod config;
pub mod converter;
pub mod core;
pub mod download;
pub mod driver;
pub mod error;
pub mod progress;
pub mod utils;
pub mod youtube;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use converter::{Conversion, ConversionService, Ytmp3Service};
pub use core::{
    DownloadOutcome, Extraction, FailureReason, MediaFormat, PageRenderer, ReferenceCollection,
    SessionSummary, Source, VideoReference,
};
pub use driver::Downloader;
use error::{Result, TubemixError};

/// Extract the video references named by `source`.
///
/// Live playlists are rendered through `renderer`; the other sources are
/// parsed without a browser. An empty result is returned as-is, see
/// [`require_references`].
pub async fn extract(source: &Source, renderer: Option<&dyn PageRenderer>) -> Result<Extraction> {
    match source {
        Source::Video(url) => youtube::extract_video(url),
        Source::HtmlFile(path) => youtube::extract_saved_page(path).await,
        Source::Playlist(url) => {
            let renderer = renderer.ok_or_else(|| {
                TubemixError::BrowserStart("live playlists need a browser session".to_string())
            })?;
            youtube::extract_playlist(url, renderer).await
        }
    }
}

/// Treat "found nothing" as a hard failure rather than an empty playlist
pub fn require_references(extraction: Extraction, source: &Source) -> Result<Extraction> {
    if extraction.references.is_empty() {
        return Err(TubemixError::NoReferencesFound(source.to_string()));
    }
    Ok(extraction)
}
