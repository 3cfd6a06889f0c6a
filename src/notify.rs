//! Toast notifications
//!
//! Controllers never hand fetch errors back up the call stack; they report
//! them as toasts on a channel the caller drains and renders.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

/// Sending half of a toast channel
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Toast>,
}

impl Notifier {
    /// Create a notifier and the receiver toasts arrive on
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, level: ToastLevel, message: impl Into<String>) {
        let toast = Toast {
            level,
            message: message.into(),
        };
        // A closed receiver just means nobody is rendering toasts any more
        if self.tx.send(toast).is_err() {
            debug!("Toast dropped, receiver closed");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(ToastLevel::Success, message);
    }

    pub fn danger(&self, message: impl Into<String>) {
        self.push(ToastLevel::Danger, message);
    }
}
