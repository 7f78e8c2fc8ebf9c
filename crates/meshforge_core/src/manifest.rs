//! Manifest parsing for batch runs.
//!
//! UTF-8 text, one entry per line, fields separated by `|`. Leading and
//! trailing whitespace is insignificant; `#`-prefixed and blank lines are not
//! entries. The entry shape depends on the orchestrator mode:
//!
//! - `generate`: `prompt|description|referencePath` (description and
//!   reference optional)
//! - `process`: `modelPath|referencePath` (both required)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which entry shape a batch run expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestMode {
    Generate,
    Process,
}

impl fmt::Display for ManifestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestMode::Generate => write!(f, "generate"),
            ManifestMode::Process => write!(f, "process"),
        }
    }
}

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    Generate {
        prompt: String,
        description: String,
        reference_path: Option<PathBuf>,
    },
    Process {
        model_path: PathBuf,
        reference_path: PathBuf,
    },
}

/// Parse one manifest line.
///
/// `Ok(None)` means the line is not an entry (comment or blank). `Err`
/// carries the reason the line is malformed; the caller logs it with the
/// line number and skips the line.
pub fn parse_line(line: &str, mode: ManifestMode) -> Result<Option<ManifestEntry>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    match mode {
        ManifestMode::Generate => {
            let mut fields = line.splitn(3, '|');
            let prompt = fields.next().unwrap_or("").trim();
            let description = fields.next().unwrap_or("").trim();
            let reference = fields.next().map(str::trim).filter(|s| !s.is_empty());
            if prompt.is_empty() {
                return Err("missing prompt".to_string());
            }
            Ok(Some(ManifestEntry::Generate {
                prompt: prompt.to_string(),
                description: description.to_string(),
                reference_path: reference.map(PathBuf::from),
            }))
        }
        ManifestMode::Process => {
            let mut fields = line.splitn(2, '|');
            let model = fields.next().unwrap_or("").trim();
            let reference = fields.next().unwrap_or("").trim();
            if model.is_empty() {
                return Err("missing model path".to_string());
            }
            if reference.is_empty() {
                return Err("missing reference path".to_string());
            }
            Ok(Some(ManifestEntry::Process {
                model_path: PathBuf::from(model),
                reference_path: PathBuf::from(reference),
            }))
        }
    }
}
