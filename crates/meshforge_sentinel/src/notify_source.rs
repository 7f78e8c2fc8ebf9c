//! notify-backed event source.

use crate::event::{EventError, EventSource, WatchEvent, WatchEventKind};
use meshforge_core::ForgeError;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::trace;

/// Subscribes to create/move-in notifications on the watch roots.
///
/// The watcher handle is kept alive for the lifetime of the source; dropping
/// it unsubscribes and closes the event channel.
pub struct NotifyEventSource {
    _watcher: RecommendedWatcher,
    rx: Receiver<Result<WatchEvent, EventError>>,
}

impl NotifyEventSource {
    /// Watch each root non-recursively.
    pub fn subscribe(roots: &[&Path]) -> Result<Self, ForgeError> {
        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(kind) = convert_kind(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        let _ = tx.send(Ok(WatchEvent { path, kind }));
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(EventError::Backend(err.to_string())));
                }
            },
            notify::Config::default(),
        )
        .map_err(|err| ForgeError::Configuration(format!("cannot create watcher: {err}")))?;

        for root in roots {
            // Watch the resolved directory; backends report resolved paths
            // and a symlinked root must observe its target.
            let target = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
            watcher
                .watch(&target, RecursiveMode::NonRecursive)
                .map_err(|err| {
                    ForgeError::Configuration(format!(
                        "cannot watch {}: {err}",
                        root.display()
                    ))
                })?;
        }

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }
}

impl EventSource for NotifyEventSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<WatchEvent>, EventError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                trace!(path = %event.path.display(), kind = ?event.kind, "Watch event");
                Ok(Some(event))
            }
            Ok(Err(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EventError::Closed),
        }
    }
}

fn convert_kind(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WatchEventKind::MovedIn),
        _ => None,
    }
}
