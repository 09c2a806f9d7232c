use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::{Result, TubemixError};
use crate::progress::ProgressSender;

/// HTTP client that looks like a browser to the file host
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    headers: HeaderMap,
    chunk_size: usize,
}

/// Initialize HTTP client with the configured timeouts
fn get_http_client(config: &FetchConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .build()?;
    Ok(client)
}

/// Browser-like request signature.
///
/// `identity` encoding keeps `Content-Length` equal to the bytes we write,
/// which the progress bar relies on.
fn get_default_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(headers)
}

/// Execute HTTP request with error handling
async fn execute_request(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<reqwest::Response> {
    let response = client.get(url).headers(headers).send().await.map_err(|e| {
        if e.is_timeout() {
            TubemixError::RequestTimeout(url.to_string())
        } else {
            TubemixError::NetworkError(e)
        }
    })?;

    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TubemixError::HttpError {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: get_http_client(config)?,
            headers: get_default_headers(&config.user_agent)?,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Start the GET; fails on non-2xx before anything touches the disk
    pub async fn open(&self, url: &str) -> Result<reqwest::Response> {
        execute_request(&self.client, url, self.headers.clone()).await
    }

    /// Stream a response body into `path`, returning the number of bytes written.
    ///
    /// The body goes to `{path}.part` first and is renamed when complete, so an
    /// interrupted transfer never leaves a truncated file under the final name.
    pub async fn save(
        &self,
        response: reqwest::Response,
        path: &Path,
        progress: &ProgressSender,
    ) -> Result<u64> {
        let part = partial_path(path);
        let result = self.write_body(response, &part, progress).await;
        match result {
            Ok(written) => {
                tokio::fs::rename(&part, path).await?;
                debug!(bytes = written, "saved {}", path.display());
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn write_body(
        &self,
        response: reqwest::Response,
        part: &Path,
        progress: &ProgressSender,
    ) -> Result<u64> {
        let file = tokio::fs::File::create(part).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.received(chunk.len() as u64).await;
        }
        writer.flush().await?;
        Ok(written)
    }
}
