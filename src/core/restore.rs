/// Restore sequencer
///
/// Rebuilds an instance from one backup artifact: extract, swap in the
/// archived config directory, import the database dump. The dump inside
/// the archive is found by name derivation first, then by falling back to a
/// single top-level `.sql` file, so renamed artifacts stay restorable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::archive::{dump_name_for_artifact, pack_dir, unpack_backup};
use crate::core::config::Instance;
use crate::core::docker::DockerCli;
use crate::core::error::StepError;
use crate::core::report::{Aborted, CancelFlag, OperationKind, RunReport, StepLog};
use crate::core::workspace::{ensure_dir, InstanceLock, Workspace};
use crate::utils::constants::{CONFIG_DIR, CONFIG_TAR};

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Leave maintenance mode untouched. For instances that are already
    /// stopped or broken enough that occ cannot run.
    pub skip_maintenance: bool,
}

pub struct RestoreRunner {
    docker: Arc<DockerCli>,
    cancel: CancelFlag,
}

impl RestoreRunner {
    pub fn new(docker: Arc<DockerCli>, cancel: CancelFlag) -> Self {
        Self { docker, cancel }
    }

    /// Restore one instance from the given artifact. Never returns an
    /// error: every failure is captured as a step outcome in the report.
    pub async fn run(
        &self,
        instance: &Instance,
        archive: &Path,
        options: RestoreOptions,
    ) -> RunReport {
        let mut log = StepLog::new(self.cancel.clone());
        let workspace = Workspace::for_instance(instance);

        let mut lock = None;

        let outcome: Result<(), Aborted> = async {
            lock = Some(log.check("prepare workspace", || {
                ensure_dir(&instance.backup_dir)?;
                let lock = InstanceLock::acquire(instance)?;
                workspace.reset()?;
                Ok(lock)
            })?);

            log.check("extract artifact", || {
                if !archive.is_file() {
                    return Err(StepError::Archive(format!(
                        "artifact {} not found",
                        archive.display()
                    )));
                }
                unpack_backup(archive, workspace.path())?;
                if !workspace.config_dir().is_dir() {
                    return Err(StepError::Archive(format!(
                        "artifact contains no {CONFIG_DIR} directory"
                    )));
                }
                Ok(())
            })?;

            let dump = log.check("locate database dump", || {
                locate_dump(&workspace, archive)
            })?;

            if !options.skip_maintenance {
                log.run(
                    "enable maintenance mode",
                    self.docker.set_maintenance(instance, true),
                )
                .await?;
            }

            log.run(
                "import configuration",
                self.import_config(instance, &workspace),
            )
            .await?;

            log.run(
                "import database",
                self.docker.import_database(instance, &dump),
            )
            .await?;

            if !options.skip_maintenance {
                log.run(
                    "disable maintenance mode",
                    self.docker.set_maintenance(instance, false),
                )
                .await?;
            }
            Ok(())
        }
        .await;
        let _ = outcome;

        log.finalize("remove workspace", workspace.remove());
        drop(lock);

        RunReport {
            instance: instance.name.clone(),
            kind: OperationKind::Restore,
            succeeded: log.all_succeeded(),
            artifact_path: Some(archive.to_path_buf()),
            artifact_size_mb: None,
            steps: log.into_steps(),
        }
    }

    /// Re-pack the staged config directory and push it into the container.
    async fn import_config(
        &self,
        instance: &Instance,
        workspace: &Workspace,
    ) -> Result<(), StepError> {
        let tar_path = workspace.join(CONFIG_TAR);
        pack_dir(&tar_path, &workspace.config_dir(), CONFIG_DIR)?;
        self.docker.import_config_archive(instance, &tar_path).await
    }
}

/// Find the dump inside the extracted artifact: the name implied by the
/// artifact name, or the only top-level `.sql` file.
fn locate_dump(workspace: &Workspace, archive: &Path) -> Result<PathBuf, StepError> {
    if let Some(name) = dump_name_for_artifact(archive) {
        let candidate = workspace.join(&name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let entries = std::fs::read_dir(workspace.path()).map_err(|e| {
        StepError::directory(&format!("cannot read {}", workspace.path().display()), e)
    })?;
    let mut dumps: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == "sql").unwrap_or(false))
        .collect();

    match dumps.len() {
        1 => Ok(dumps.remove(0)),
        0 => Err(StepError::Archive(
            "artifact contains no database dump".to_string(),
        )),
        n => Err(StepError::Archive(format!(
            "artifact contains {n} .sql files, cannot pick one"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::pack_backup;
    use crate::core::process::testing::ScriptedRunner;
    use crate::core::process::{CmdOutput, CmdSpec};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn instance_in(dir: &Path) -> Instance {
        Instance {
            name: "demo".to_string(),
            db_password: "hunter2".to_string(),
            app_container: "nextcloud-app-demo".to_string(),
            db_container: "nextcloud-db-demo".to_string(),
            backup_dir: dir.to_path_buf(),
            workspace_dir: dir.join("tmp"),
            retention: 3,
            compose_project: None,
        }
    }

    /// Build a real artifact in the backup directory.
    fn make_artifact(backup_dir: &Path, dump_name: &str) -> PathBuf {
        let staging = TempDir::new().unwrap();
        let dump = staging.path().join(dump_name);
        fs::write(&dump, "CREATE TABLE t (id INT);").unwrap();
        let config = staging.path().join("config");
        fs::create_dir(&config).unwrap();
        fs::write(config.join("config.php"), "<?php return [];").unwrap();

        let artifact = backup_dir.join("demo_2024-01-01_120000.tar.gz");
        pack_backup(&artifact, &dump, &config).unwrap();
        artifact
    }

    fn docker_double(occ_calls: Arc<AtomicUsize>) -> ScriptedRunner {
        ScriptedRunner::new(move |spec: &CmdSpec| {
            if spec.args.iter().any(|a| a == "maintenance:mode") {
                occ_calls.fetch_add(1, Ordering::SeqCst);
                let phrase = if spec.args.iter().any(|a| a == "--on") {
                    "Maintenance mode enabled\n"
                } else {
                    "Maintenance mode disabled\n"
                };
                return Ok(CmdOutput::ok_with(phrase));
            }
            if spec.args.iter().any(|a| a == "mysql") {
                assert!(spec.stdin_file.is_some(), "import must stream from a file");
                return Ok(CmdOutput::ok_with(""));
            }
            // docker cp into the container, in-container tar/rm/test
            Ok(CmdOutput::ok_with(""))
        })
    }

    #[tokio::test]
    async fn restores_database_and_configuration() {
        let tmp = TempDir::new().unwrap();
        let instance = instance_in(tmp.path());
        let artifact = make_artifact(tmp.path(), "demo_2024-01-01_120000.sql");

        let occ_calls = Arc::new(AtomicUsize::new(0));
        let runner = RestoreRunner::new(
            Arc::new(DockerCli::with_runner(Box::new(docker_double(occ_calls.clone())))),
            CancelFlag::new(),
        );

        let report = runner
            .run(&instance, &artifact, RestoreOptions::default())
            .await;
        assert!(report.succeeded, "failed steps: {:?}", report.steps);
        assert_eq!(
            report.step_names(),
            vec![
                "prepare workspace",
                "extract artifact",
                "locate database dump",
                "enable maintenance mode",
                "import configuration",
                "import database",
                "disable maintenance mode",
                "remove workspace",
            ]
        );
        assert_eq!(occ_calls.load(Ordering::SeqCst), 2);
        assert!(!instance.workspace_dir.exists());
    }

    #[tokio::test]
    async fn skip_maintenance_leaves_occ_untouched() {
        let tmp = TempDir::new().unwrap();
        let instance = instance_in(tmp.path());
        let artifact = make_artifact(tmp.path(), "demo_2024-01-01_120000.sql");

        let occ_calls = Arc::new(AtomicUsize::new(0));
        let runner = RestoreRunner::new(
            Arc::new(DockerCli::with_runner(Box::new(docker_double(occ_calls.clone())))),
            CancelFlag::new(),
        );

        let options = RestoreOptions {
            skip_maintenance: true,
        };
        let report = runner.run(&instance, &artifact, options).await;
        assert!(report.succeeded, "failed steps: {:?}", report.steps);
        assert_eq!(occ_calls.load(Ordering::SeqCst), 0);
        assert!(!report.step_names().contains(&"enable maintenance mode"));
    }

    #[tokio::test]
    async fn renamed_artifact_falls_back_to_the_single_sql_file() {
        let tmp = TempDir::new().unwrap();
        let instance = instance_in(tmp.path());
        // Dump name does not match the artifact name.
        let artifact = make_artifact(tmp.path(), "exported-elsewhere.sql");

        let runner = RestoreRunner::new(
            Arc::new(DockerCli::with_runner(Box::new(docker_double(Arc::new(
                AtomicUsize::new(0),
            ))))),
            CancelFlag::new(),
        );
        let report = runner
            .run(&instance, &artifact, RestoreOptions::default())
            .await;
        assert!(report.succeeded, "failed steps: {:?}", report.steps);
    }

    #[tokio::test]
    async fn missing_artifact_fails_before_touching_the_instance() {
        let tmp = TempDir::new().unwrap();
        let instance = instance_in(tmp.path());

        let occ_calls = Arc::new(AtomicUsize::new(0));
        let runner = RestoreRunner::new(
            Arc::new(DockerCli::with_runner(Box::new(docker_double(occ_calls.clone())))),
            CancelFlag::new(),
        );

        let report = runner
            .run(
                &instance,
                &tmp.path().join("demo_2099-01-01_000000.tar.gz"),
                RestoreOptions::default(),
            )
            .await;
        assert!(!report.succeeded);
        let failed: Vec<_> = report.failed_steps().map(|s| s.name).collect();
        assert_eq!(failed, vec!["extract artifact"]);
        assert_eq!(occ_calls.load(Ordering::SeqCst), 0);
    }
}
