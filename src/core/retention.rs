/// Retention pruning and artifact listing
///
/// Only files named `<instance>_<timestamp>.tar.gz` in the instance's own
/// backup directory are candidates; anything else in the directory is left
/// alone. Age is the filesystem creation time, falling back to the
/// modification time where creation time is unavailable, with the file
/// name as tiebreak (names sort chronologically).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::core::error::StepError;
use crate::utils::constants::ARTIFACT_SUFFIX;

#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    created: SystemTime,
}

fn file_age(path: &Path) -> SystemTime {
    match fs::metadata(path) {
        Ok(meta) => meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH),
        Err(_) => SystemTime::UNIX_EPOCH,
    }
}

/// Artifacts belonging to one instance, oldest first. The underscore in the
/// prefix guard keeps `demo` from matching `demo2_...` artifacts.
pub fn list_artifacts(backup_dir: &Path, instance_name: &str) -> Result<Vec<Artifact>, StepError> {
    let prefix = format!("{instance_name}_");
    let entries = fs::read_dir(backup_dir).map_err(|e| {
        StepError::directory(&format!("cannot read {}", backup_dir.display()), e)
    })?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            StepError::directory(&format!("cannot read {}", backup_dir.display()), e)
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) || !name.ends_with(ARTIFACT_SUFFIX) {
            continue;
        }
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        artifacts.push(Artifact {
            created: file_age(&path),
            file_name: name.to_string(),
            path,
        });
    }

    artifacts.sort_by(|a, b| {
        a.created
            .cmp(&b.created)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    Ok(artifacts)
}

/// Newest-first listing for the restore menu.
pub fn list_artifacts_newest_first(
    backup_dir: &Path,
    instance_name: &str,
) -> Result<Vec<Artifact>, StepError> {
    let mut artifacts = list_artifacts(backup_dir, instance_name)?;
    artifacts.reverse();
    Ok(artifacts)
}

/// Delete the oldest artifacts until at most `keep` remain. Returns the
/// number of files removed.
pub fn prune(backup_dir: &Path, instance_name: &str, keep: usize) -> Result<usize, StepError> {
    let artifacts = list_artifacts(backup_dir, instance_name)?;
    if artifacts.len() <= keep {
        return Ok(0);
    }

    let excess = artifacts.len() - keep;
    let mut removed = 0;
    for artifact in artifacts.into_iter().take(excess) {
        fs::remove_file(&artifact.path).map_err(|e| {
            StepError::directory(&format!("cannot remove {}", artifact.path.display()), e)
        })?;
        removed += 1;
    }
    Ok(removed)
}
