//! Watch events and the event-source capability.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// How a file arrived in a watch root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    MovedIn,
}

/// One filesystem notification. Ephemeral: produced by the event source,
/// consumed immediately by the pair matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

/// Event-source failures.
#[derive(Error, Debug)]
pub enum EventError {
    /// The source will deliver no further events; the dispatcher stops.
    #[error("Event source closed")]
    Closed,

    /// Transient notification-subsystem error; logged, watching resumes.
    #[error("Notification backend error: {0}")]
    Backend(String),
}

/// A sequence of watch events for a set of roots.
///
/// `next_event` blocks for at most `timeout` so the caller can interleave
/// stop-signal checks; `Ok(None)` means the timeout elapsed quietly.
pub trait EventSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<WatchEvent>, EventError>;
}
