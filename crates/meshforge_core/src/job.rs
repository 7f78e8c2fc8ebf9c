//! The unit of work sent to the external renderer.
//!
//! A [`Job`] is immutable once built: create, invoke, observe the
//! [`JobResult`]. A failed job is reported, never resubmitted. Both the watch
//! dispatcher and the batch orchestrator funnel through the [`Invoke`] trait
//! so there is exactly one dispatch semantics regardless of trigger source.

use crate::error::JobError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// What the worker is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Process an existing model with its reference image.
    Process,
    /// Generate a model from a text prompt.
    Generate,
}

/// One worker invocation. Constructed through [`Job::process`] or
/// [`Job::generate`] so required fields are always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub kind: JobKind,
    pub model_path: Option<PathBuf>,
    pub reference_path: Option<PathBuf>,
    pub prompt: Option<String>,
    pub description: Option<String>,
    pub output_dir: PathBuf,
    /// Pass-through flags appended verbatim after the structured arguments
    /// (e.g. `--no-save`, `--no-export`, `--no-render`).
    pub extra_flags: Vec<String>,
}

impl Job {
    /// Build a processing job for an existing model/reference pair.
    pub fn process(model_path: PathBuf, reference_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            kind: JobKind::Process,
            model_path: Some(model_path),
            reference_path: Some(reference_path),
            prompt: None,
            description: None,
            output_dir,
            extra_flags: Vec::new(),
        }
    }

    /// Build a generation job from a text prompt.
    pub fn generate(prompt: String, description: String, output_dir: PathBuf) -> Self {
        Self {
            kind: JobKind::Generate,
            model_path: None,
            reference_path: None,
            prompt: Some(prompt),
            description: if description.is_empty() {
                None
            } else {
                Some(description)
            },
            output_dir,
            extra_flags: Vec::new(),
        }
    }

    /// Attach an optional reference image to a generation job.
    pub fn with_reference(mut self, reference_path: PathBuf) -> Self {
        self.reference_path = Some(reference_path);
        self
    }

    /// Append pass-through flags.
    pub fn with_flags(mut self, flags: &[String]) -> Self {
        self.extra_flags.extend_from_slice(flags);
        self
    }

    /// The structured argument vector handed to the process-spawn primitive.
    ///
    /// Never rendered as a shell string: paths and prompts containing spaces
    /// or shell metacharacters pass through untouched.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self.kind {
            JobKind::Process => {
                if let Some(model) = &self.model_path {
                    args.push("--model".into());
                    args.push(model.clone().into_os_string());
                }
                if let Some(reference) = &self.reference_path {
                    args.push("--reference".into());
                    args.push(reference.clone().into_os_string());
                }
            }
            JobKind::Generate => {
                if let Some(prompt) = &self.prompt {
                    args.push("--prompt".into());
                    args.push(prompt.into());
                }
                if let Some(description) = &self.description {
                    args.push("--description".into());
                    args.push(description.into());
                }
                if let Some(reference) = &self.reference_path {
                    args.push("--reference".into());
                    args.push(reference.clone().into_os_string());
                }
            }
        }
        args.push("--output".into());
        args.push(self.output_dir.clone().into_os_string());
        for flag in &self.extra_flags {
            args.push(flag.into());
        }
        args
    }
}

/// Terminal outcome of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job: Job,
    pub exit_code: i32,
    pub succeeded: bool,
    /// Artifacts newly present in the output directory after the run.
    /// May be empty on success; that is a warning condition, not an error.
    pub output_files: Vec<PathBuf>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Dispatch seam between orchestration and process spawning.
///
/// The real implementation spawns the worker binary; tests substitute a
/// recording stub. Invocations are serialized by design, so `&mut self`.
pub trait Invoke {
    fn invoke(&mut self, job: &Job) -> std::result::Result<JobResult, JobError>;
}
