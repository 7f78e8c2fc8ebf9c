//! Configuration structs for the two entry points.
//!
//! All paths and extension sets are explicit fields of immutable values
//! handed to each component at construction. Nothing is read from the
//! process environment during operation.

use crate::error::ForgeError;
use crate::manifest::ManifestMode;
use std::path::PathBuf;

/// Default accepted model extensions, in priority order.
pub const DEFAULT_MODEL_EXTENSIONS: &[&str] = &["fbx", "obj", "dae"];

/// Default accepted reference image extensions, in priority order.
pub const DEFAULT_REFERENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// How to reach the external renderer.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker program: an explicit path or a bare name resolved on PATH.
    pub program: PathBuf,
    /// Arguments placed before the job arguments on every invocation,
    /// e.g. `--background --python render.py --` for a Blender wrapper.
    pub prefix_args: Vec<String>,
}

impl WorkerConfig {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            prefix_args: Vec::new(),
        }
    }

    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }
}

/// Configuration for the watch service.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub models_dir: PathBuf,
    pub references_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Accepted model extensions, lowercase, in priority order.
    pub model_extensions: Vec<String>,
    /// Accepted reference extensions, lowercase, in priority order.
    pub reference_extensions: Vec<String>,
    /// Pass-through flags appended to every dispatched job.
    pub extra_flags: Vec<String>,
}

impl WatchConfig {
    pub fn new(models_dir: PathBuf, references_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            models_dir,
            references_dir,
            output_dir,
            model_extensions: default_extensions(DEFAULT_MODEL_EXTENSIONS),
            reference_extensions: default_extensions(DEFAULT_REFERENCE_EXTENSIONS),
            extra_flags: Vec::new(),
        }
    }

    /// A missing watch root is fatal at startup.
    pub fn validate(&self) -> Result<(), ForgeError> {
        for (label, dir) in [
            ("models directory", &self.models_dir),
            ("references directory", &self.references_dir),
        ] {
            if !dir.is_dir() {
                return Err(ForgeError::Configuration(format!(
                    "{} does not exist: {}",
                    label,
                    dir.display()
                )));
            }
        }
        if self.model_extensions.is_empty() || self.reference_extensions.is_empty() {
            return Err(ForgeError::Configuration(
                "extension sets cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for one batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub manifest: PathBuf,
    pub output_dir: PathBuf,
    pub mode: ManifestMode,
    /// Pass-through flags appended to every job built from the manifest.
    pub extra_flags: Vec<String>,
}

impl BatchConfig {
    pub fn new(manifest: PathBuf, output_dir: PathBuf, mode: ManifestMode) -> Self {
        Self {
            manifest,
            output_dir,
            mode,
            extra_flags: Vec::new(),
        }
    }
}

fn default_extensions(defaults: &[&str]) -> Vec<String> {
    defaults.iter().map(|ext| ext.to_string()).collect()
}
