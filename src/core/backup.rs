/// Backup sequencer
///
/// Produces one self-contained artifact per run: the full database dump at
/// top level plus the application's `config/` tree, gzip-compressed and
/// chmod 0400. Steps run strictly in order with short-circuit on failure;
/// the workspace finalizer runs unconditionally.

use chrono::Local;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use crate::core::archive::{artifact_file_name, dump_file_name, pack_backup, unpack_tar};
use crate::core::config::Instance;
use crate::core::docker::DockerCli;
use crate::core::error::StepError;
use crate::core::report::{Aborted, CancelFlag, OperationKind, RunReport, StepLog};
use crate::core::workspace::{ensure_dir, InstanceLock, Workspace};
use crate::utils::constants::{ARTIFACT_TIMESTAMP_FORMAT, CONFIG_TAR};

pub struct BackupRunner {
    docker: Arc<DockerCli>,
    cancel: CancelFlag,
}

impl BackupRunner {
    pub fn new(docker: Arc<DockerCli>, cancel: CancelFlag) -> Self {
        Self { docker, cancel }
    }

    /// Run the full backup pipeline for one instance. Never returns an
    /// error: every failure is captured as a step outcome in the report.
    pub async fn run(&self, instance: &Instance) -> RunReport {
        let mut log = StepLog::new(self.cancel.clone());
        let workspace = Workspace::for_instance(instance);

        let timestamp = Local::now().format(ARTIFACT_TIMESTAMP_FORMAT).to_string();
        let artifact_path = instance
            .backup_dir
            .join(artifact_file_name(&instance.name, &timestamp));
        let dump_path = workspace.join(dump_file_name(&instance.name, &timestamp));

        let mut lock = None;
        let mut artifact_size = None;

        let outcome: Result<(), Aborted> = async {
            log.check("create backup directory", || {
                ensure_dir(&instance.backup_dir)
            })?;

            lock = Some(log.check("prepare workspace", || {
                let lock = InstanceLock::acquire(instance)?;
                workspace.reset()?;
                Ok(lock)
            })?);

            log.run(
                "enable maintenance mode",
                self.docker.set_maintenance(instance, true),
            )
            .await?;

            log.run(
                "dump database",
                self.docker.dump_database(instance, &dump_path),
            )
            .await?;

            log.run(
                "export configuration",
                self.export_config(instance, &workspace),
            )
            .await?;

            log.run(
                "disable maintenance mode",
                self.docker.set_maintenance(instance, false),
            )
            .await?;

            log.check("pack artifact", || {
                pack_backup(&artifact_path, &dump_path, &workspace.config_dir())
            })?;

            log.check("restrict artifact permissions", || {
                restrict_permissions(&artifact_path)
            })?;

            artifact_size = Some(log.check("measure artifact", || artifact_size_mb(&artifact_path))?);
            Ok(())
        }
        .await;
        let _ = outcome;

        log.finalize("remove workspace", workspace.remove());
        drop(lock);

        let succeeded = log.all_succeeded();
        RunReport {
            instance: instance.name.clone(),
            kind: OperationKind::Backup,
            succeeded,
            artifact_path: succeeded.then_some(artifact_path),
            artifact_size_mb: artifact_size,
            steps: log.into_steps(),
        }
    }

    /// Round-trip the config directory out of the container and stage it in
    /// the workspace. Success requires the extracted directory to exist.
    async fn export_config(
        &self,
        instance: &Instance,
        workspace: &Workspace,
    ) -> Result<(), StepError> {
        let tar_path = workspace.join(CONFIG_TAR);
        self.docker
            .export_config_archive(instance, &tar_path)
            .await?;
        unpack_tar(&tar_path, workspace.path())?;
        if !workspace.config_dir().is_dir() {
            return Err(StepError::Archive(format!(
                "no config directory extracted in {}",
                workspace.path().display()
            )));
        }
        Ok(())
    }
}

/// Make the artifact owner-read-only and verify the mode took effect. The
/// archive contains credentials and the full database.
fn restrict_permissions(artifact: &Path) -> Result<(), StepError> {
    let restrictive = std::fs::Permissions::from_mode(0o400);
    std::fs::set_permissions(artifact, restrictive).map_err(|e| {
        StepError::Permission(format!("cannot chmod {}: {e}", artifact.display()))
    })?;

    let mode = std::fs::metadata(artifact)
        .map_err(|e| StepError::Permission(format!("cannot stat {}: {e}", artifact.display())))?
        .permissions()
        .mode();
    if mode & 0o777 != 0o400 {
        return Err(StepError::Permission(format!(
            "{} has mode {:o} after chmod",
            artifact.display(),
            mode & 0o777
        )));
    }
    Ok(())
}

/// Artifact size in decimal megabytes, rounded to two places.
fn artifact_size_mb(artifact: &Path) -> Result<f64, StepError> {
    let bytes = std::fs::metadata(artifact)
        .map_err(|e| StepError::Archive(format!("cannot stat {}: {e}", artifact.display())))?
        .len();
    Ok((bytes as f64 / 1_000_000.0 * 100.0).round() / 100.0)
}
