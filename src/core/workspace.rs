/// Ephemeral workspace management
///
/// Each run stages its dump and configuration files in `backup_dir/tmp`.
/// The directory is reset at the start of a run (stale state from an
/// aborted run is discarded) and removed unconditionally at the end. An
/// exclusive lock file in the backup directory serializes runs against the
/// same instance across processes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::config::Instance;
use crate::core::error::StepError;
use crate::utils::constants::{CONFIG_DIR, LOCK_FILE_NAME};

/// Create a directory (and parents) if it does not exist yet.
pub fn ensure_dir(path: &Path) -> Result<(), StepError> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|e| StepError::directory(&format!("cannot create {}", path.display()), e))
}

pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn for_instance(instance: &Instance) -> Self {
        Self {
            dir: instance.workspace_dir.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(name)
    }

    /// The staged configuration directory inside the workspace.
    pub fn config_dir(&self) -> PathBuf {
        self.join(CONFIG_DIR)
    }

    /// Delete-and-recreate the workspace so a run never sees leftovers from
    /// a previously aborted one.
    pub fn reset(&self) -> Result<(), StepError> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| {
                StepError::directory(&format!("cannot clear workspace {}", self.dir.display()), e)
            })?;
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            StepError::directory(&format!("cannot create workspace {}", self.dir.display()), e)
        })
    }

    /// Remove the workspace. Succeeds when it is already gone, so the
    /// finalizer can run even after a failure before workspace creation.
    pub fn remove(&self) -> Result<(), StepError> {
        if !self.dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&self.dir).map_err(|e| {
            StepError::directory(&format!("cannot remove workspace {}", self.dir.display()), e)
        })
    }
}

/// Exclusive per-instance lock, held for the duration of one run and
/// released on drop. A leftover lock from a crashed run must be removed by
/// the operator; the error message names the file.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(instance: &Instance) -> Result<Self, StepError> {
        let path = instance.backup_dir.join(LOCK_FILE_NAME);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "{} {}",
                    instance.name,
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                );
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(StepError::Directory(
                format!(
                    "another run for this instance appears to be in progress ({} exists)",
                    path.display()
                ),
            )),
            Err(e) => Err(StepError::directory(
                &format!("cannot create lock file {}", path.display()),
                e,
            )),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn instance_in(dir: &Path) -> Instance {
        Instance {
            name: "demo".to_string(),
            db_password: "pw".to_string(),
            app_container: "app".to_string(),
            db_container: "db".to_string(),
            backup_dir: dir.to_path_buf(),
            workspace_dir: dir.join("tmp"),
            retention: 3,
            compose_project: None,
        }
    }

    #[test]
    fn reset_discards_stale_state() {
        let tmp = TempDir::new().unwrap();
        let instance = instance_in(tmp.path());
        let ws = Workspace::for_instance(&instance);

        ws.reset().unwrap();
        fs::write(ws.join("stale.sql"), "old dump").unwrap();

        ws.reset().unwrap();
        assert!(ws.path().is_dir());
        assert!(!ws.join("stale.sql").exists());
    }

    #[test]
    fn remove_is_a_no_op_when_absent() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::for_instance(&instance_in(tmp.path()));

        assert!(!ws.path().exists());
        ws.remove().unwrap();

        ws.reset().unwrap();
        ws.remove().unwrap();
        assert!(!ws.path().exists());
    }

    #[test]
    fn lock_rejects_concurrent_acquisition_and_releases_on_drop() {
        let tmp = TempDir::new().unwrap();
        let instance = instance_in(tmp.path());

        let lock = InstanceLock::acquire(&instance).unwrap();
        let err = InstanceLock::acquire(&instance).unwrap_err();
        assert!(err.to_string().contains("in progress"));

        drop(lock);
        let _relocked = InstanceLock::acquire(&instance).unwrap();
    }
}
