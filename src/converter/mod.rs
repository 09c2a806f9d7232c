use crate::core::MediaFormat;
use crate::error::Result;

pub mod ytmp3;

pub use ytmp3::Ytmp3Service;

/// Direct file link produced by the conversion service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub file_url: String,
    pub title: String,
}

/// The only seam between the download loop and the external site.
///
/// Site markup changes are handled by the implementation; callers only see
/// an identifier going in and a file link coming out.
#[async_trait::async_trait]
pub trait ConversionService: Send + Sync {
    async fn submit_for_conversion(
        &self,
        identifier: &str,
        format: MediaFormat,
    ) -> Result<Conversion>;
}
