//! Input discovery: literal paths and glob patterns to concrete files.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expands every entry of `patterns` into file paths.
///
/// Entries containing `*`, `?` or `[` are glob patterns whose matches are
/// sorted; other entries are taken literally (existence is checked when the
/// file is read). Order across entries follows `patterns`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidPattern`] for malformed globs and
/// [`PipelineError::NoInputFiles`] if nothing was found.
pub fn expand_globs<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        if !is_glob(pattern) {
            files.push(PathBuf::from(pattern));
            continue;
        }

        let entries = glob::glob(pattern).map_err(|e| PipelineError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let mut matched = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => matched.push(path),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping unreadable glob match"),
            }
        }
        matched.sort();
        debug!(pattern, matched = matched.len(), "expanded input glob");
        files.extend(matched);
    }

    if files.is_empty() {
        return Err(PipelineError::NoInputFiles);
    }
    Ok(files)
}
