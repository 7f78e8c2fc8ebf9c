//! Worker invocation for Meshforge.
//!
//! Translates a [`Job`](meshforge_core::Job) into a single renderer
//! subprocess run and classifies the outcome. The renderer is opaque: exit
//! code 0 means success, anything else is failure, and the only other signal
//! is the artifacts it drops into the output directory.

mod invoker;

pub use invoker::{WorkerInvoker, ARTIFACT_EXTENSIONS};
