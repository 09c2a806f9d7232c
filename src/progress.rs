//! Progress events between the download driver and the terminal.
//!
//! The driver only ever sends; a single reporter task owns the rendering.
//! Every session emits exactly one `Started`, one `ItemCompleted` per
//! reference and one `Finished`.

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::core::MediaFormat;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started {
        total: usize,
        format: MediaFormat,
        destination: PathBuf,
    },
    Converting {
        index: usize,
        identifier: String,
    },
    Fetching {
        index: usize,
        title: String,
        total_bytes: Option<u64>,
    },
    Received {
        bytes: u64,
    },
    Note(String),
    ItemCompleted {
        index: usize,
        succeeded: bool,
        label: String,
    },
    Finished,
}

/// Sending half handed to the driver. A disabled sender drops everything.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSender {
    pub fn channel() -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub async fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // reporter gone means nobody is watching, not a download failure
            let _ = tx.send(event).await;
        }
    }

    pub async fn received(&self, bytes: u64) {
        self.send(ProgressEvent::Received { bytes }).await;
    }
}

/// What the reporter saw, returned when it shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportTally {
    pub started: bool,
    pub completed: usize,
    pub succeeded: usize,
    pub finished: bool,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

struct Reporter {
    multi: MultiProgress,
    silent: bool,
    items: Option<ProgressBar>,
    file: Option<ProgressBar>,
    tally: ReportTally,
}

impl Reporter {
    fn new(silent: bool) -> Self {
        let target = if silent {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            silent,
            items: None,
            file: None,
            tally: ReportTally::default(),
        }
    }

    /// Notes stay visible in silent mode
    fn println(&self, line: &str) {
        if self.silent {
            eprintln!("{}", line);
        } else {
            let _ = self.multi.println(line);
        }
    }

    fn handle(&mut self, event: ProgressEvent) -> bool {
        match event {
            ProgressEvent::Started {
                total,
                format,
                destination,
            } => {
                self.tally.started = true;
                let bar = self.multi.add(ProgressBar::new(total as u64));
                bar.set_style(style("{spinner:.green} {msg} [{pos}/{len}]"));
                bar.set_message(format!(
                    "Preparing {} download(s) in {} to {}",
                    total,
                    format,
                    destination.display()
                ));
                bar.enable_steady_tick(Duration::from_millis(120));
                self.items = Some(bar);
            }
            ProgressEvent::Converting { index, identifier } => {
                if let Some(bar) = &self.items {
                    bar.set_message(format!("({}) Converting {}", index + 1, identifier));
                }
            }
            ProgressEvent::Fetching {
                title, total_bytes, ..
            } => {
                let bar = self.multi.add(ProgressBar::new(total_bytes.unwrap_or(0)));
                if total_bytes.is_some() {
                    bar.set_style(style(
                        "{spinner:.green} {msg} {bar:30.cyan/blue} {bytes}/{total_bytes} {elapsed}",
                    ));
                } else {
                    bar.set_style(style("{spinner:.green} {msg} {bytes} {elapsed}"));
                }
                bar.set_message(format!("Downloading {}", title));
                if let Some(old) = self.file.replace(bar) {
                    old.finish_and_clear();
                }
            }
            ProgressEvent::Received { bytes } => {
                if let Some(bar) = &self.file {
                    bar.inc(bytes);
                }
            }
            ProgressEvent::Note(note) => self.println(&format!("Note: {}", note)),
            ProgressEvent::ItemCompleted {
                succeeded, label, ..
            } => {
                self.tally.completed += 1;
                if succeeded {
                    self.tally.succeeded += 1;
                }
                if let Some(bar) = self.file.take() {
                    bar.finish_and_clear();
                }
                if !self.silent {
                    let mark = if succeeded { "✓ Successful:" } else { "✗ Failed:" };
                    let _ = self.multi.println(format!("{} {}", mark, label));
                }
                if let Some(bar) = &self.items {
                    bar.inc(1);
                }
            }
            ProgressEvent::Finished => {
                self.tally.finished = true;
                if let Some(bar) = self.file.take() {
                    bar.finish_and_clear();
                }
                if let Some(bar) = self.items.take() {
                    bar.finish_with_message("Downloads finished");
                }
                return false;
            }
        }
        true
    }
}

/// Spawn the reporting task. It stops at `Finished` or when every sender is dropped.
pub fn spawn_reporter(silent: bool) -> (ProgressSender, JoinHandle<ReportTally>) {
    let (sender, mut rx) = ProgressSender::channel();
    let handle = tokio::spawn(async move {
        let mut reporter = Reporter::new(silent);
        while let Some(event) = rx.recv().await {
            if !reporter.handle(event) {
                break;
            }
        }
        reporter.tally
    });
    (sender, handle)
}

/// Wait for the reporter to drain. A panicked reporter only costs the display.
pub async fn join_reporter(handle: JoinHandle<ReportTally>) -> Option<ReportTally> {
    match handle.await {
        Ok(tally) => Some(tally),
        Err(e) => {
            warn!("progress reporter stopped abnormally: {}", e);
            None
        }
    }
}
