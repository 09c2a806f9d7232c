use thiserror::Error;

#[derive(Error, Debug)]
pub enum TubemixError {
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request timeout for URL: {0}")]
    RequestTimeout(String),

    #[error("HTTP error {status} for URL: {url}")]
    HttpError { status: u16, url: String },

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Unsupported source, expected a video link, playlist link or saved HTML page: {0}")]
    UnsupportedSource(String),

    #[error("No video id found in: {0}")]
    InvalidReference(String),

    #[error("Can't find any video from {0}")]
    NoReferencesFound(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Conversion did not produce a download link within {0} second(s)")]
    ConversionTimeout(u64),

    #[error("Failed to start browser session: {0}")]
    BrowserStart(String),

    #[error("Browser automation failed: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    #[error("Destination {path} is not usable: {source}")]
    Destination {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid header value: {0}")]
    HeaderError(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TubemixError {
    /// The link or path given on the command line is unusable
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TubemixError::SourceNotFound(_)
                | TubemixError::UnsupportedSource(_)
                | TubemixError::InvalidReference(_)
                | TubemixError::NoReferencesFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TubemixError>;
