//! Patch upload progress reporting
//!
//! Progress flows over an unbounded channel so the renderer can follow an
//! upload without blocking the request stream. In-flight progress and the
//! terminal outcome are distinct events.

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Started { filename: String, total_bytes: u64 },
    /// Percentage of the file handed to the transport, 0 to 100
    Progress(u8),
    Completed { filename: String },
    Failed { filename: String, reason: String },
}

/// Sending side of an upload's progress channel. Percentages are
/// deduplicated and never go backwards.
#[derive(Debug, Clone, Default)]
pub struct UploadProgress {
    sender: Option<mpsc::UnboundedSender<UploadEvent>>,
    last_percent: Option<u8>,
}

impl UploadProgress {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
                last_percent: None,
            },
            receiver,
        )
    }

    /// Progress sink that drops every event
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: UploadEvent) {
        if let Some(sender) = &self.sender {
            // receiver gone just means nobody is watching
            let _ = sender.send(event);
        }
    }

    /// Reports `loaded` out of `total` bytes
    pub fn advance(&mut self, loaded: u64, total: u64) {
        let percent = percent(loaded, total);
        if self.last_percent.is_some_and(|last| percent <= last) {
            return;
        }
        self.last_percent = Some(percent);
        self.emit(UploadEvent::Progress(percent));
    }
}

/// Rounded completion percentage; an empty file counts as complete
pub fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let ratio = loaded.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}
