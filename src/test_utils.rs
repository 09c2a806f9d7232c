//! Helpers shared by unit tests: a local file host and a scripted
//! conversion service, so sessions run without network or browser.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::converter::{Conversion, ConversionService};
use crate::core::MediaFormat;
use crate::error::{Result, TubemixError};

/// Minimal HTTP/1.1 responder serving fixed bodies, 404 for anything else
pub struct FileServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FileServer {
    pub async fn start(files: Vec<(&str, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(
            files
                .into_iter()
                .map(|(path, body)| (path.to_string(), body))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let files = files.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&buf).to_string();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();
                    seen.lock().unwrap().push(request);

                    let (status, body) = match files.get(&path) {
                        Some(body) => ("200 OK", body.clone()),
                        None => ("404 Not Found", b"not found".to_vec()),
                    };
                    let head = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn last_request(&self) -> Option<String> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// What the scripted service does for one identifier
#[derive(Debug, Clone)]
pub enum Script {
    Convert { file_url: String, title: String },
    Fail,
    Timeout,
}

/// Conversion service that answers from a table instead of a browser
#[derive(Default)]
pub struct ScriptedService {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, MediaFormat)>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert(mut self, identifier: &str, file_url: String, title: &str) -> Self {
        self.scripts.insert(
            identifier.to_string(),
            Script::Convert {
                file_url,
                title: title.to_string(),
            },
        );
        self
    }

    pub fn fail(mut self, identifier: &str) -> Self {
        self.scripts.insert(identifier.to_string(), Script::Fail);
        self
    }

    pub fn time_out(mut self, identifier: &str) -> Self {
        self.scripts.insert(identifier.to_string(), Script::Timeout);
        self
    }

    pub fn calls(&self) -> Vec<(String, MediaFormat)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ConversionService for ScriptedService {
    async fn submit_for_conversion(
        &self,
        identifier: &str,
        format: MediaFormat,
    ) -> Result<Conversion> {
        self.calls
            .lock()
            .unwrap()
            .push((identifier.to_string(), format));
        match self.scripts.get(identifier) {
            Some(Script::Convert { file_url, title }) => Ok(Conversion {
                file_url: file_url.clone(),
                title: title.clone(),
            }),
            Some(Script::Timeout) => Err(TubemixError::ConversionTimeout(1)),
            Some(Script::Fail) | None => Err(TubemixError::ConversionFailed(
                "service reported an error".to_string(),
            )),
        }
    }
}
