use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::converter::ConversionService;
use crate::core::{DownloadOutcome, MediaFormat, ReferenceCollection, SessionSummary, VideoReference};
use crate::download::Fetcher;
use crate::error::{Result, TubemixError};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::utils::sanitize_title;

const WRITE_PROBE: &str = ".tubemix-write-probe";

/// Create the destination (recursively) and make sure files can be written there.
pub async fn prepare_destination(destination: &Path) -> Result<()> {
    let unusable = |source: std::io::Error| TubemixError::Destination {
        path: destination.display().to_string(),
        source,
    };
    tokio::fs::create_dir_all(destination)
        .await
        .map_err(unusable)?;
    let probe = destination.join(WRITE_PROBE);
    tokio::fs::write(&probe, b"").await.map_err(unusable)?;
    tokio::fs::remove_file(&probe).await.map_err(unusable)?;
    Ok(())
}

struct Saved {
    path: PathBuf,
    bytes: u64,
    sanitized: bool,
}

/// Runs references through the conversion service one at a time
pub struct Downloader<'a> {
    service: &'a dyn ConversionService,
    fetcher: &'a Fetcher,
    progress: ProgressSender,
}

impl<'a> Downloader<'a> {
    pub fn new(service: &'a dyn ConversionService, fetcher: &'a Fetcher, progress: ProgressSender) -> Self {
        Self {
            service,
            fetcher,
            progress,
        }
    }

    /// Download every reference into `destination`.
    ///
    /// Per-reference failures are recorded in the summary; only an unusable
    /// destination aborts the session.
    pub async fn download(
        &self,
        references: ReferenceCollection,
        format: MediaFormat,
        destination: &Path,
    ) -> Result<SessionSummary> {
        prepare_destination(destination).await?;

        self.progress
            .send(ProgressEvent::Started {
                total: references.len(),
                format,
                destination: destination.to_path_buf(),
            })
            .await;

        let mut summary = SessionSummary::default();
        for (index, reference) in references.into_iter().enumerate() {
            self.progress
                .send(ProgressEvent::Converting {
                    index,
                    identifier: reference.identifier.clone(),
                })
                .await;

            let outcome = match self.download_one(index, &reference, format, destination).await {
                Ok(saved) => {
                    if saved.sanitized && !summary.names_sanitized {
                        summary.names_sanitized = true;
                        self.progress
                            .send(ProgressEvent::Note(
                                "Illegal characters such as '/\\*?\"<>|:' are replaced with '_' inside filenames"
                                    .to_string(),
                            ))
                            .await;
                    }
                    info!(bytes = saved.bytes, "saved {}", saved.path.display());
                    DownloadOutcome::Succeeded {
                        path: saved.path,
                        bytes: saved.bytes,
                    }
                }
                Err(e) => {
                    warn!("{} failed: {}", reference.watch_url(), e);
                    DownloadOutcome::Failed {
                        source_url: reference.watch_url(),
                        reason: e.into(),
                    }
                }
            };

            let label = match &outcome {
                DownloadOutcome::Succeeded { path, .. } => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                DownloadOutcome::Failed { source_url, reason } => {
                    format!("{} ({})", source_url, reason)
                }
            };
            self.progress
                .send(ProgressEvent::ItemCompleted {
                    index,
                    succeeded: outcome.is_success(),
                    label,
                })
                .await;
            summary.outcomes.push(outcome);
        }

        self.progress.send(ProgressEvent::Finished).await;
        Ok(summary)
    }

    async fn download_one(
        &self,
        index: usize,
        reference: &VideoReference,
        format: MediaFormat,
        destination: &Path,
    ) -> Result<Saved> {
        let conversion = self
            .service
            .submit_for_conversion(&reference.identifier, format)
            .await?;

        let response = self.fetcher.open(&conversion.file_url).await?;

        let title = conversion.title.trim();
        let filename = sanitize_title(title);
        let path = destination.join(format!("{}.{}", filename, format.extension()));

        self.progress
            .send(ProgressEvent::Fetching {
                index,
                title: title.to_string(),
                total_bytes: response.content_length(),
            })
            .await;
        let bytes = self.fetcher.save(response, &path, &self.progress).await?;

        Ok(Saved {
            path,
            bytes,
            sanitized: filename != title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::core::{FailureReason, VideoReference};
    use crate::test_utils::{FileServer, ScriptedService};

    fn references(ids: &[&str]) -> ReferenceCollection {
        ids.iter().map(|id| VideoReference::new(*id)).collect()
    }

    async fn collect(mut rx: tokio::sync::mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_single_video_mp3() {
        let server = FileServer::start(vec![("/a.mp3", b"audio".to_vec())]).await;
        let service = ScriptedService::new().convert(
            "tPEE9ZwTmy0",
            server.url("/a.mp3"),
            "Shortest Video on Youtube",
        );
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let summary = Downloader::new(&service, &fetcher, ProgressSender::disabled())
            .download(references(&["tPEE9ZwTmy0"]), MediaFormat::Mp3, dir.path())
            .await
            .unwrap();

        assert_eq!(summary.succeeded(), 1);
        let expected = dir.path().join("Shortest Video on Youtube.mp3");
        assert_eq!(std::fs::read(&expected).unwrap(), b"audio");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(
            service.calls(),
            vec![("tPEE9ZwTmy0".to_string(), MediaFormat::Mp3)]
        );
    }

    #[tokio::test]
    async fn test_failed_conversions_do_not_stop_the_session() {
        let server = FileServer::start(vec![("/ok.mp4", b"video".to_vec())]).await;
        let service = ScriptedService::new()
            .fail("aaaaaaaaaaa")
            .time_out("bbbbbbbbbbb")
            .convert("ccccccccccc", server.url("/ok.mp4"), "Last one");
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let summary = Downloader::new(&service, &fetcher, ProgressSender::disabled())
            .download(
                references(&["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"]),
                MediaFormat::Mp4,
                dir.path(),
            )
            .await
            .unwrap();

        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(
            summary.failed_urls(),
            vec![
                "https://youtube.com/watch?v=aaaaaaaaaaa",
                "https://youtube.com/watch?v=bbbbbbbbbbb"
            ]
        );
        assert!(matches!(
            &summary.outcomes[1],
            DownloadOutcome::Failed {
                reason: FailureReason::Timeout,
                ..
            }
        ));
        assert!(dir.path().join("Last one.mp4").exists());
        assert_eq!(service.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded() {
        let server = FileServer::start(vec![]).await;
        let service =
            ScriptedService::new().convert("tPEE9ZwTmy0", server.url("/gone"), "Gone");
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let summary = Downloader::new(&service, &fetcher, ProgressSender::disabled())
            .download(references(&["tPEE9ZwTmy0"]), MediaFormat::Mp3, dir.path())
            .await
            .unwrap();

        assert!(summary.all_failed());
        assert!(matches!(
            &summary.outcomes[0],
            DownloadOutcome::Failed {
                reason: FailureReason::FetchFailed(_),
                ..
            }
        ));
        assert!(!dir.path().join("Gone.mp3").exists());
    }

    #[tokio::test]
    async fn test_sanitized_names_and_single_note() {
        let server = FileServer::start(vec![("/1", b"1".to_vec()), ("/2", b"2".to_vec())]).await;
        let service = ScriptedService::new()
            .convert("aaaaaaaaaaa", server.url("/1"), "AC/DC: Thunder?")
            .convert("bbbbbbbbbbb", server.url("/2"), "Who? What?");
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (sender, rx) = ProgressSender::channel();
        let events = tokio::spawn(collect(rx));

        let summary = Downloader::new(&service, &fetcher, sender)
            .download(
                references(&["aaaaaaaaaaa", "bbbbbbbbbbb"]),
                MediaFormat::Mp3,
                dir.path(),
            )
            .await
            .unwrap();
        let events = events.await.unwrap();

        assert!(summary.names_sanitized);
        assert!(dir.path().join("AC_DC_ Thunder_.mp3").exists());
        assert!(dir.path().join("Who_ What_.mp3").exists());

        let notes = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Note(_)))
            .count();
        assert_eq!(notes, 1);
    }

    #[tokio::test]
    async fn test_progress_handshake() {
        let server = FileServer::start(vec![("/1", vec![7u8; 4096])]).await;
        let service = ScriptedService::new()
            .convert("aaaaaaaaaaa", server.url("/1"), "One")
            .fail("bbbbbbbbbbb");
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (sender, rx) = ProgressSender::channel();
        let events = tokio::spawn(collect(rx));

        Downloader::new(&service, &fetcher, sender)
            .download(
                references(&["aaaaaaaaaaa", "bbbbbbbbbbb"]),
                MediaFormat::Mp3,
                dir.path(),
            )
            .await
            .unwrap();
        let events = events.await.unwrap();

        assert!(matches!(events.first(), Some(ProgressEvent::Started { total: 2, .. })));
        assert_eq!(events.last(), Some(&ProgressEvent::Finished));
        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::ItemCompleted {
                    index, succeeded, ..
                } => Some((*index, *succeeded)),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![(0, true), (1, false)]);
        let received: u64 = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Received { bytes } => Some(*bytes),
                _ => None,
            })
            .sum();
        assert_eq!(received, 4096);
    }

    #[tokio::test]
    async fn test_unusable_destination_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let service = ScriptedService::new();
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let err = Downloader::new(&service, &fetcher, ProgressSender::disabled())
            .download(references(&["aaaaaaaaaaa"]), MediaFormat::Mp3, &file.join("sub"))
            .await
            .unwrap_err();

        assert!(matches!(err, TubemixError::Destination { .. }));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_destination_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("saved").join("2025-09-03 #0");
        prepare_destination(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }
}
