use domain::{AuthMode, AuthRequest};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

const SIGNAL_CAPACITY: usize = 16;

/// Channel between anything that needs a signed-in user and the component
/// that owns the login/register dialog.
#[derive(Clone)]
pub struct AuthPrompts {
    tx: broadcast::Sender<AuthRequest>,
}

impl AuthPrompts {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    /// Fire and forget. Nobody listening is not an error.
    pub fn request(&self, mode: AuthMode) {
        if self.tx.send(AuthRequest { mode }).is_err() {
            debug!("Auth prompt {:?} dropped, no dialog is listening", mode);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthRequest> {
        self.tx.subscribe()
    }
}

impl Default for AuthPrompts {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Error,
}

/// Short user-facing message, the kind a toast would show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            title: title.into(),
            description: Some(description.into()),
        }
    }

    pub fn error(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            title: title.into(),
            description,
        }
    }
}

#[derive(Clone)]
pub struct Notices {
    tx: broadcast::Sender<Notice>,
}

impl Notices {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}
