//! User-facing notices.

use crossbeam::channel::Sender;
use std::fmt;

/// Transient notices the core can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notice {
    /// The camera could not be opened, bound or configured.
    CameraUnavailable,
    /// The device failed while in use.
    CameraFault,
    /// A focus or capture request was rejected.
    CaptureFailed,
    /// Focusing failed and the policy forbids capturing anyway.
    FocusFailed,
}

impl Notice {
    /// Returns true if the notice accompanies the end of the screen.
    pub fn ends_flow(&self) -> bool {
        matches!(self, Notice::CameraUnavailable | Notice::CameraFault)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Notice::CameraUnavailable => "Camera unavailable",
            Notice::CameraFault => "Camera error",
            Notice::CaptureFailed => "Could not take the picture",
            Notice::FocusFailed => "Could not focus",
        };
        f.write_str(text)
    }
}

/// Shows notices without blocking the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        tracing::warn!(notice = %notice, ends_flow = notice.ends_flow(), "User notice");
    }
}

/// Forwards notices to a channel, e.g. a UI thread.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<Notice>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Notice>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            tracing::debug!(notice = %notice, "Notice receiver gone");
        }
    }
}
