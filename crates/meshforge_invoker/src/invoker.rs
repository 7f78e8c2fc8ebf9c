//! The Job Invoker: one worker subprocess per job, serialized by design.

use chrono::Utc;
use meshforge_core::{ForgeError, Invoke, Job, JobError, JobResult, WorkerConfig};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output artifact suffixes the worker is known to produce.
pub const ARTIFACT_EXTENSIONS: &[&str] = &["blend", "fbx", "png"];

/// How much worker stderr to keep for the failure log line.
const STDERR_TAIL_BYTES: usize = 2048;

/// Spawns the external renderer for each job.
///
/// The worker binary is resolved once at construction; a missing binary is
/// fatal to the whole run, not a per-job condition.
#[derive(Debug, Clone)]
pub struct WorkerInvoker {
    program: PathBuf,
    prefix_args: Vec<String>,
}

impl WorkerInvoker {
    /// Resolve the worker program. An explicit path must point at a file; a
    /// bare name is searched on PATH.
    pub fn resolve(config: &WorkerConfig) -> Result<Self, ForgeError> {
        let program = resolve_program(&config.program)?;
        debug!(program = %program.display(), "Resolved worker binary");
        Ok(Self {
            program,
            prefix_args: config.prefix_args.clone(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Invoke for WorkerInvoker {
    fn invoke(&mut self, job: &Job) -> Result<JobResult, JobError> {
        // Fail closed if an input vanished between pairing and dispatch.
        for input in [&job.model_path, &job.reference_path].into_iter().flatten() {
            if !input.is_file() {
                return Err(JobError::MissingInput(input.clone()));
            }
        }

        fs::create_dir_all(&job.output_dir).map_err(|source| JobError::OutputDir {
            path: job.output_dir.clone(),
            source,
        })?;

        let before = list_artifacts(&job.output_dir);

        info!(
            program = %self.program.display(),
            kind = ?job.kind,
            output = %job.output_dir.display(),
            "Invoking worker"
        );

        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(job.to_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(JobError::Launch)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let exit_code = output.status.code().unwrap_or(-1);
        let succeeded = output.status.success();

        if succeeded {
            debug!(exit_code, duration_ms, "Worker exited cleanly");
        } else {
            warn!(
                exit_code,
                duration_ms,
                stderr = %stderr_tail(&output.stderr),
                "Worker exited with failure"
            );
        }

        let after = list_artifacts(&job.output_dir);
        let output_files: Vec<PathBuf> = after.difference(&before).cloned().collect();

        if succeeded && output_files.is_empty() {
            warn!(
                output = %job.output_dir.display(),
                "Worker succeeded but produced no artifacts"
            );
        }

        Ok(JobResult {
            job: job.clone(),
            exit_code,
            succeeded,
            output_files,
            duration_ms,
            finished_at: Utc::now(),
        })
    }
}

fn resolve_program(program: &Path) -> Result<PathBuf, ForgeError> {
    if program.components().count() > 1 {
        if program.is_file() {
            return Ok(program.to_path_buf());
        }
        return Err(ForgeError::UnavailableWorker(format!(
            "worker binary not found: {}",
            program.display()
        )));
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(ForgeError::UnavailableWorker(format!(
        "worker binary not found on PATH: {}",
        program.display()
    )))
}

/// Artifact files directly under `dir`. A missing directory yields an empty
/// set rather than an error.
fn list_artifacts(dir: &Path) -> BTreeSet<PathBuf> {
    let mut artifacts = BTreeSet::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return artifacts;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension() else {
            continue;
        };
        let ext = ext.to_string_lossy().to_ascii_lowercase();
        if ARTIFACT_EXTENSIONS.contains(&ext.as_str()) {
            artifacts.insert(path);
        }
    }
    artifacts
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let start = text.len() - STDERR_TAIL_BYTES;
    // Avoid splitting a UTF-8 codepoint.
    let boundary = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(start);
    format!("...{}", &text[boundary..])
}
