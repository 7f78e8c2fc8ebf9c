//! The watch service for Meshforge.
//!
//! Observes the models and references directories, completes model/reference
//! pairs as files arrive and dispatches one processing job at a time. The
//! filesystem-notification mechanism sits behind the [`EventSource`] trait so
//! the dispatcher runs unchanged against a synthetic event producer in tests.

mod dispatcher;
mod event;
mod notify_source;

pub use dispatcher::{DispatcherState, WatchDispatcher};
pub use event::{EventError, EventSource, WatchEvent, WatchEventKind};
pub use notify_source::NotifyEventSource;
