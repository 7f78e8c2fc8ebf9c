//! Model/reference pairing.
//!
//! A model file and a reference image belong together when their filename
//! stems are equal. The matcher is a pure decision over filesystem state at
//! call time: given one newly-seen file it either completes a pair or reports
//! that the pair is still incomplete. A race between the probe and actual
//! file availability is acceptable; the invoker's own existence check fails
//! closed.

use crate::config::WatchConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The filename stem used to match a model file to its reference image.
pub fn pairing_key(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// A complete pair, created only when both members exist on disk.
/// Immutable; consumed exactly once by a dispatched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReferencePair {
    pub model_path: PathBuf,
    pub reference_path: PathBuf,
    /// Per-pair output directory: `<output root>/<pairing key>`, so artifacts
    /// from distinct pairs never collide.
    pub output_dir: PathBuf,
}

/// Decides whether a newly-seen file completes a (model, reference) pair.
#[derive(Debug, Clone)]
pub struct PairMatcher {
    models_dir: PathBuf,
    references_dir: PathBuf,
    output_dir: PathBuf,
    model_extensions: Vec<String>,
    reference_extensions: Vec<String>,
}

impl PairMatcher {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            models_dir: canonical(&config.models_dir),
            references_dir: canonical(&config.references_dir),
            output_dir: config.output_dir.clone(),
            model_extensions: lowercase(&config.model_extensions),
            reference_extensions: lowercase(&config.reference_extensions),
        }
    }

    /// Evaluate one watch event path. Returns `None` while the pair is
    /// incomplete or the path is not an accepted member of either root.
    ///
    /// The watch is non-recursive, so membership is direct parenthood. Roots
    /// and the event's parent are compared in canonical form: notification
    /// backends may report resolved paths that differ textually from the
    /// configured roots (symlinked directories).
    pub fn match_event(&self, path: &Path) -> Option<ModelReferencePair> {
        let parent = canonical(path.parent()?);
        let key = pairing_key(path)?;
        let ext = extension_lowercase(path)?;

        if parent == self.models_dir && self.model_extensions.contains(&ext) {
            let reference =
                probe(&self.references_dir, &key, &self.reference_extensions)?;
            Some(self.pair(path.to_path_buf(), reference, &key))
        } else if parent == self.references_dir && self.reference_extensions.contains(&ext) {
            let model = probe(&self.models_dir, &key, &self.model_extensions)?;
            Some(self.pair(model, path.to_path_buf(), &key))
        } else {
            debug!(path = %path.display(), "Event outside watch roots or extension not accepted");
            None
        }
    }

    fn pair(&self, model_path: PathBuf, reference_path: PathBuf, key: &str) -> ModelReferencePair {
        ModelReferencePair {
            model_path,
            reference_path,
            output_dir: self.output_dir.join(key),
        }
    }
}

/// Probe `root` for a file whose stem equals `key` and whose extension is
/// accepted. Ties between extensions resolve in priority order (first match
/// in the configured extension list wins); equal-priority candidates resolve
/// by filename order so the result is deterministic.
fn probe(root: &Path, key: &str, extensions: &[String]) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(root = %root.display(), %err, "Probe failed to read directory");
            return None;
        }
    };

    let mut best: Option<(usize, PathBuf)> = None;
    for entry in entries.flatten() {
        let candidate = entry.path();
        if !candidate.is_file() {
            continue;
        }
        let Some(stem) = pairing_key(&candidate) else {
            continue;
        };
        if stem != key {
            continue;
        }
        let Some(ext) = extension_lowercase(&candidate) else {
            continue;
        };
        let Some(priority) = extensions.iter().position(|e| *e == ext) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((best_priority, best_path)) => {
                priority < *best_priority
                    || (priority == *best_priority && candidate < *best_path)
            }
        };
        if better {
            best = Some((priority, candidate));
        }
    }
    best.map(|(_, path)| path)
}

/// Resolved form of a path for root-membership comparison; a path that cannot
/// be resolved (not yet existing, permission) is used as given.
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn lowercase(extensions: &[String]) -> Vec<String> {
    extensions.iter().map(|e| e.to_ascii_lowercase()).collect()
}
