//! Sequential batch orchestration.
//!
//! Reads a manifest in file order and drives the invoker one entry at a
//! time. A single entry's failure never aborts the run: every entry is
//! processed and the aggregate is reported at the end.

use crate::config::BatchConfig;
use crate::error::ForgeError;
use crate::job::{Invoke, Job};
use crate::manifest::{parse_line, ManifestEntry};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{info, warn};

/// Aggregate counters for one manifest execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRun {
    /// Valid (parseable, non-comment, non-blank) entries processed.
    pub total: usize,
    /// Entries whose job exited 0.
    pub succeeded: usize,
}

impl BatchRun {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// Run every entry of the manifest sequentially and return the aggregate.
///
/// Malformed lines are logged with their line number and skipped; they count
/// neither as success nor failure. A per-entry launch failure counts as a
/// failed entry. Only a missing/unreadable manifest is fatal.
pub fn run_manifest<I: Invoke>(
    invoker: &mut I,
    config: &BatchConfig,
) -> Result<BatchRun, ForgeError> {
    let text = fs::read_to_string(&config.manifest).map_err(|err| {
        ForgeError::Configuration(format!(
            "cannot read manifest {}: {}",
            config.manifest.display(),
            err
        ))
    })?;

    info!(
        manifest = %config.manifest.display(),
        mode = %config.mode,
        "Starting batch run"
    );

    let mut run = BatchRun::default();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let entry = match parse_line(line, config.mode) {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(reason) => {
                warn!(line = line_no, %reason, "Skipping malformed manifest entry");
                continue;
            }
        };

        let job = build_job(entry, config);
        run.total += 1;

        match invoker.invoke(&job) {
            Ok(result) if result.succeeded => {
                run.succeeded += 1;
                info!(
                    line = line_no,
                    artifacts = result.output_files.len(),
                    duration_ms = result.duration_ms,
                    "Entry succeeded"
                );
            }
            Ok(result) => {
                warn!(
                    line = line_no,
                    exit_code = result.exit_code,
                    "Entry failed"
                );
            }
            Err(err) => {
                warn!(line = line_no, %err, "Entry failed to start");
            }
        }
    }

    info!(
        total = run.total,
        succeeded = run.succeeded,
        failed = run.failed(),
        "Batch run complete"
    );
    Ok(run)
}

fn build_job(entry: ManifestEntry, config: &BatchConfig) -> Job {
    let job = match entry {
        ManifestEntry::Generate {
            prompt,
            description,
            reference_path,
        } => {
            let job = Job::generate(prompt, description, config.output_dir.clone());
            match reference_path {
                Some(reference) => job.with_reference(reference),
                None => job,
            }
        }
        ManifestEntry::Process {
            model_path,
            reference_path,
        } => Job::process(model_path, reference_path, config.output_dir.clone()),
    };
    job.with_flags(&config.extra_flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::job::{JobKind, JobResult};
    use crate::manifest::ManifestMode;
    use chrono::Utc;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Records every invocation; invocation indices listed in `exit_nonzero`
    /// produce a failing result, indices in `launch_errors` fail to start.
    #[derive(Default)]
    struct RecordingInvoker {
        jobs: Vec<Job>,
        exit_nonzero: Vec<usize>,
        launch_errors: Vec<usize>,
    }

    impl Invoke for RecordingInvoker {
        fn invoke(&mut self, job: &Job) -> Result<JobResult, JobError> {
            let index = self.jobs.len();
            self.jobs.push(job.clone());
            if self.launch_errors.contains(&index) {
                return Err(JobError::Launch(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "stub launch failure",
                )));
            }
            let exit_code = if self.exit_nonzero.contains(&index) { 1 } else { 0 };
            Ok(JobResult {
                job: job.clone(),
                exit_code,
                succeeded: exit_code == 0,
                output_files: Vec::new(),
                duration_ms: 1,
                finished_at: Utc::now(),
            })
        }
    }

    fn write_manifest(tmp: &TempDir, contents: &str) -> BatchConfig {
        let manifest = tmp.path().join("batch.txt");
        fs::write(&manifest, contents).unwrap();
        BatchConfig::new(manifest, tmp.path().join("out"), ManifestMode::Generate)
    }

    #[test]
    fn counts_comments_and_blanks_as_non_entries() {
        let tmp = TempDir::new().unwrap();
        let config = write_manifest(&tmp, "katana|curved blade\n# comment\n\ngreatsword|large sword\n");
        let mut invoker = RecordingInvoker::default();

        let run = run_manifest(&mut invoker, &config).unwrap();
        assert_eq!(run, BatchRun { total: 2, succeeded: 2 });
        assert_eq!(invoker.jobs.len(), 2);
        assert_eq!(invoker.jobs[0].prompt.as_deref(), Some("katana"));
        assert_eq!(invoker.jobs[1].prompt.as_deref(), Some("greatsword"));
    }

    #[test]
    fn preserves_manifest_order() {
        let tmp = TempDir::new().unwrap();
        let config = write_manifest(&tmp, "alpha\nbravo\ncharlie\ndelta\n");
        let mut invoker = RecordingInvoker::default();

        run_manifest(&mut invoker, &config).unwrap();
        let prompts: Vec<_> = invoker
            .jobs
            .iter()
            .map(|j| j.prompt.clone().unwrap())
            .collect();
        assert_eq!(prompts, vec!["alpha", "bravo", "charlie", "delta"]);
    }

    #[test]
    fn mid_run_failure_does_not_abort() {
        let tmp = TempDir::new().unwrap();
        let config = write_manifest(&tmp, "one\ntwo\nthree\n");
        let mut invoker = RecordingInvoker {
            exit_nonzero: vec![1],
            ..Default::default()
        };

        let run = run_manifest(&mut invoker, &config).unwrap();
        assert_eq!(run, BatchRun { total: 3, succeeded: 2 });
        assert_eq!(invoker.jobs.len(), 3);
    }

    #[test]
    fn launch_error_counts_as_failure_and_continues() {
        let tmp = TempDir::new().unwrap();
        let config = write_manifest(&tmp, "one\ntwo\n");
        let mut invoker = RecordingInvoker {
            launch_errors: vec![0],
            ..Default::default()
        };

        let run = run_manifest(&mut invoker, &config).unwrap();
        assert_eq!(run, BatchRun { total: 2, succeeded: 1 });
    }

    #[test]
    fn malformed_entry_counts_neither_way() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join("batch.txt");
        fs::write(&manifest, "m1.fbx|r1.png\nno-reference-field\nm2.fbx|r2.png\n").unwrap();
        let config = BatchConfig::new(manifest, tmp.path().join("out"), ManifestMode::Process);
        let mut invoker = RecordingInvoker::default();

        let run = run_manifest(&mut invoker, &config).unwrap();
        assert_eq!(run, BatchRun { total: 2, succeeded: 2 });
        assert_eq!(invoker.jobs[0].kind, JobKind::Process);
        assert_eq!(
            invoker.jobs[1].model_path,
            Some(PathBuf::from("m2.fbx"))
        );
    }

    #[test]
    fn missing_manifest_is_a_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let config = BatchConfig::new(
            tmp.path().join("absent.txt"),
            tmp.path().join("out"),
            ManifestMode::Generate,
        );
        let mut invoker = RecordingInvoker::default();

        let err = run_manifest(&mut invoker, &config).unwrap_err();
        assert!(matches!(err, ForgeError::Configuration(_)));
    }

    #[test]
    fn generate_entry_reference_reaches_the_job() {
        let tmp = TempDir::new().unwrap();
        let config = write_manifest(
            &tmp,
            "katana|curved blade|refs/katana.png\ngreatsword|large sword\n",
        );
        let mut invoker = RecordingInvoker::default();

        let run = run_manifest(&mut invoker, &config).unwrap();
        assert_eq!(run, BatchRun { total: 2, succeeded: 2 });
        assert_eq!(
            invoker.jobs[0].reference_path,
            Some(PathBuf::from("refs/katana.png"))
        );
        assert_eq!(invoker.jobs[0].description.as_deref(), Some("curved blade"));
        assert_eq!(invoker.jobs[1].reference_path, None);
    }

    #[test]
    fn extra_flags_reach_every_job() {
        let tmp = TempDir::new().unwrap();
        let mut config = write_manifest(&tmp, "katana\n");
        config.extra_flags = vec!["--no-render".to_string()];
        let mut invoker = RecordingInvoker::default();

        run_manifest(&mut invoker, &config).unwrap();
        assert_eq!(invoker.jobs[0].extra_flags, vec!["--no-render"]);
    }
}
