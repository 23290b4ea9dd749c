//! User-visible status line.

use serde::Serialize;

/// Category of a status update, following the client's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusKind {
    Info,
    Success,
    /// Camera unavailable or permission denied.
    Acquisition,
    /// Transport failure talking to the service.
    Network,
    /// The service refused the request with a message.
    Service,
    /// The service answered with something unreadable.
    Parse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub kind: StatusKind,
    pub message: String,
}

impl Status {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Success, message)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.kind, StatusKind::Info | StatusKind::Success)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::info("")
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
