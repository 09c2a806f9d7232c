use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
pub use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::error::{Result, TubemixError};
use crate::youtube::utils::{build_watch_url, has_query_param, is_valid_video_id};

/// Media formats offered by the conversion service
#[derive(EnumIter, Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    #[default]
    Mp3,
    Mp4,
}

impl MediaFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Mp4 => "mp4",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, MediaFormat::Mp3)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MediaFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        MediaFormat::iter()
            .find(|f| f.extension() == lower)
            .ok_or_else(|| {
                let choices: Vec<_> = MediaFormat::iter().map(|f| f.extension()).collect();
                format!("unsupported format '{}', expected one of: {}", s, choices.join(", "))
            })
    }
}

/// One playlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoReference {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl VideoReference {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: None,
            channel: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Watch URL submitted to the conversion service and reported on failure
    pub fn watch_url(&self) -> String {
        build_watch_url(&self.identifier)
    }
}

/// References keyed by identifier, first-seen order kept for display
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceCollection {
    #[serde(rename = "references")]
    items: Vec<VideoReference>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl ReferenceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the identifier is already present.
    pub fn insert(&mut self, reference: VideoReference) -> bool {
        if !self.seen.insert(reference.identifier.clone()) {
            return false;
        }
        self.items.push(reference);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VideoReference> {
        self.items.iter()
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.items.iter().map(|r| r.identifier.as_str()).collect()
    }
}

impl IntoIterator for ReferenceCollection {
    type Item = VideoReference;
    type IntoIter = std::vec::IntoIter<VideoReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReferenceCollection {
    type Item = &'a VideoReference;
    type IntoIter = std::slice::Iter<'a, VideoReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<VideoReference> for ReferenceCollection {
    fn from_iter<I: IntoIterator<Item = VideoReference>>(iter: I) -> Self {
        let mut collection = ReferenceCollection::new();
        for reference in iter {
            collection.insert(reference);
        }
        collection
    }
}

/// Result of running the extractor over a source
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    #[serde(flatten)]
    pub references: ReferenceCollection,
    /// Identifiers rejected by the length check
    pub invalid: Vec<String>,
}

impl Extraction {
    /// Adds a candidate identifier, routing malformed ones to `invalid`.
    pub fn push(&mut self, reference: VideoReference) {
        if is_valid_video_id(&reference.identifier) {
            self.references.insert(reference);
        } else if !self.invalid.contains(&reference.identifier) {
            self.invalid.push(reference.identifier);
        }
    }
}

/// Input kinds accepted on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Video(String),
    Playlist(String),
    HtmlFile(PathBuf),
}

impl Source {
    /// Classify a link or path. Saved pages win over links, single videos over playlists.
    pub fn parse(link_or_path: &str) -> Result<Self> {
        let input = link_or_path.trim();
        if input.contains(".html") {
            let path = Path::new(input);
            if !path.is_file() {
                return Err(TubemixError::SourceNotFound(input.to_string()));
            }
            return Ok(Source::HtmlFile(path.to_path_buf()));
        }
        if has_query_param(input, "v") {
            return Ok(Source::Video(input.to_string()));
        }
        if has_query_param(input, "list") {
            return Ok(Source::Playlist(input.to_string()));
        }
        Err(TubemixError::UnsupportedSource(input.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Source::Video(_) => "video",
            Source::Playlist(_) | Source::HtmlFile(_) => "playlist",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Video(url) | Source::Playlist(url) => f.write_str(url),
            Source::HtmlFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Loads a page in a real browser and hands back the rendered DOM.
///
/// Live playlist pages fill their item list from script, so a plain HTTP
/// fetch only sees an empty shell.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

/// Why a single reference could not be downloaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    ConversionFailed(String),
    Timeout,
    FetchFailed(String),
    Write(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ConversionFailed(msg) => write!(f, "conversion failed: {}", msg),
            FailureReason::Timeout => f.write_str("conversion timed out"),
            FailureReason::FetchFailed(msg) => write!(f, "download failed: {}", msg),
            FailureReason::Write(msg) => write!(f, "could not write file: {}", msg),
        }
    }
}

impl From<TubemixError> for FailureReason {
    fn from(err: TubemixError) -> Self {
        match err {
            TubemixError::ConversionTimeout(_) => FailureReason::Timeout,
            TubemixError::ConversionFailed(msg) => FailureReason::ConversionFailed(msg),
            e @ TubemixError::WebDriver(_) => FailureReason::ConversionFailed(e.to_string()),
            e @ (TubemixError::HttpError { .. }
            | TubemixError::NetworkError(_)
            | TubemixError::RequestTimeout(_)) => FailureReason::FetchFailed(e.to_string()),
            e @ TubemixError::IoError(_) => FailureReason::Write(e.to_string()),
            e => FailureReason::ConversionFailed(e.to_string()),
        }
    }
}

/// Per-reference result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DownloadOutcome {
    Succeeded { path: PathBuf, bytes: u64 },
    Failed { source_url: String, reason: FailureReason },
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Succeeded { .. })
    }
}

/// Aggregated outcomes of one session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub outcomes: Vec<DownloadOutcome>,
    /// At least one file name had illegal characters replaced
    pub names_sanitized: bool,
}

impl SessionSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failed_urls(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                DownloadOutcome::Failed { source_url, .. } => Some(source_url.as_str()),
                DownloadOutcome::Succeeded { .. } => None,
            })
            .collect()
    }

    /// True when there was something to download and nothing made it
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.succeeded() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_is_case_insensitive() {
        assert_eq!("MP3".parse::<MediaFormat>().unwrap(), MediaFormat::Mp3);
        assert_eq!("mp4".parse::<MediaFormat>().unwrap(), MediaFormat::Mp4);
        assert_eq!(" Mp4 ".parse::<MediaFormat>().unwrap(), MediaFormat::Mp4);
        assert!("flac".parse::<MediaFormat>().is_err());
    }

    #[test]
    fn test_collection_dedup_keeps_first() {
        let mut c = ReferenceCollection::new();
        assert!(c.insert(VideoReference::new("tPEE9ZwTmy0").with_title("first")));
        assert!(!c.insert(VideoReference::new("tPEE9ZwTmy0").with_title("second")));
        assert!(c.insert(VideoReference::new("OnoNITE-CLc")));
        assert_eq!(c.len(), 2);
        assert_eq!(c.iter().next().unwrap().title.as_deref(), Some("first"));
        assert_eq!(c.identifiers(), vec!["tPEE9ZwTmy0", "OnoNITE-CLc"]);
    }

    #[test]
    fn test_extraction_routes_invalid_ids() {
        let mut e = Extraction::default();
        e.push(VideoReference::new("tPEE9ZwTmy0"));
        e.push(VideoReference::new("short"));
        e.push(VideoReference::new("short"));
        assert_eq!(e.references.len(), 1);
        assert_eq!(e.invalid, vec!["short".to_string()]);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            Source::parse("https://www.youtube.com/watch?v=tPEE9ZwTmy0").unwrap(),
            Source::Video("https://www.youtube.com/watch?v=tPEE9ZwTmy0".into())
        );
        assert_eq!(
            Source::parse("https://www.youtube.com/playlist?list=PLCcqYFX7d5HC_Gz5pQex5gj708kGgjiRs")
                .unwrap()
                .kind(),
            "playlist"
        );
        // watch link inside a playlist is treated as the single video
        assert!(matches!(
            Source::parse("https://www.youtube.com/watch?v=tPEE9ZwTmy0&list=RDtPEE9ZwTmy0").unwrap(),
            Source::Video(_)
        ));
        // only a real `v` parameter makes a single video
        assert!(matches!(
            Source::parse("https://www.youtube.com/playlist?dev=1&list=PL1").unwrap(),
            Source::Playlist(_)
        ));
        assert!(matches!(
            Source::parse("https://www.youtube.com/watch?dev=1&v=tPEE9ZwTmy0").unwrap(),
            Source::Video(_)
        ));
        assert!(matches!(
            Source::parse("missing/page.html"),
            Err(TubemixError::SourceNotFound(_))
        ));
        assert!(matches!(
            Source::parse("https://example.com/"),
            Err(TubemixError::UnsupportedSource(_))
        ));
    }

    #[test]
    fn test_source_parse_existing_html() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.html");
        std::fs::write(&path, "<html></html>").unwrap();
        let source = Source::parse(path.to_str().unwrap()).unwrap();
        assert_eq!(source, Source::HtmlFile(path));
    }

    #[test]
    fn test_summary_counts() {
        let summary = SessionSummary {
            outcomes: vec![
                DownloadOutcome::Succeeded {
                    path: PathBuf::from("a.mp3"),
                    bytes: 10,
                },
                DownloadOutcome::Failed {
                    source_url: "https://youtube.com/watch?v=xxxxxxxxxxx".into(),
                    reason: FailureReason::Timeout,
                },
            ],
            names_sanitized: false,
        };
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(
            summary.failed_urls(),
            vec!["https://youtube.com/watch?v=xxxxxxxxxxx"]
        );
        assert!(!summary.all_failed());
        assert!(!SessionSummary::default().all_failed());
    }

    #[test]
    fn test_failure_reason_from_error() {
        assert_eq!(
            FailureReason::from(TubemixError::ConversionTimeout(3)),
            FailureReason::Timeout
        );
        assert!(matches!(
            FailureReason::from(TubemixError::HttpError {
                status: 500,
                url: "u".into()
            }),
            FailureReason::FetchFailed(_)
        ));
    }
}
