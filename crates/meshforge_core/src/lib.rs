//! Core data model and orchestration logic for Meshforge.
//!
//! Everything the two entry points (watch service and batch runner) share
//! lives here: the job model, the error taxonomy, configuration structs,
//! model/reference pairing, manifest parsing and the sequential batch
//! orchestrator. Process spawning is behind the [`Invoke`] trait so both
//! orchestration paths can be exercised against a recording stub.

pub mod batch;
pub mod config;
pub mod error;
pub mod job;
pub mod manifest;
pub mod pairing;

pub use batch::{run_manifest, BatchRun};
pub use config::{BatchConfig, WatchConfig, WorkerConfig};
pub use error::{ForgeError, JobError, Result};
pub use job::{Invoke, Job, JobKind, JobResult};
pub use manifest::{ManifestEntry, ManifestMode};
pub use pairing::{pairing_key, ModelReferencePair, PairMatcher};
