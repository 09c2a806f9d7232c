use std::path::Path;

use tracing::{debug, info};

use crate::core::{Extraction, PageRenderer, VideoReference};
use crate::error::{Result, TubemixError};

pub mod html;
pub mod utils;

// Re-export commonly used functions
pub use html::{parse_rendered_playlist, parse_saved_page};
pub use utils::{build_watch_url, is_valid_video_id, parse_playlist_id, parse_video_id};

/// Single watch link
pub fn extract_video(url: &str) -> Result<Extraction> {
    let id = parse_video_id(url)?;
    let mut extraction = Extraction::default();
    extraction.push(VideoReference::new(id));
    Ok(extraction)
}

/// Live playlist page, rendered by the browser first
pub async fn extract_playlist(url: &str, renderer: &dyn PageRenderer) -> Result<Extraction> {
    let playlist_id = parse_playlist_id(url);
    debug!(?playlist_id, "rendering playlist page {}", url);
    let dom = renderer.render(url).await.map_err(|e| match e {
        TubemixError::WebDriver(err) => TubemixError::SourceNotFound(format!("{}: {}", url, err)),
        other => other,
    })?;
    let extraction = parse_rendered_playlist(&dom, playlist_id.as_deref());
    info!(found = extraction.references.len(), "playlist page parsed");
    Ok(extraction)
}

/// Playlist or mix page saved from the browser
pub async fn extract_saved_page(path: &Path) -> Result<Extraction> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        TubemixError::SourceNotFound(format!("{}: {}", path.display(), e))
    })?;
    let content = String::from_utf8_lossy(&bytes);
    let extraction = parse_saved_page(&content);
    info!(
        found = extraction.references.len(),
        invalid = extraction.invalid.len(),
        "saved page parsed"
    );
    Ok(extraction)
}
