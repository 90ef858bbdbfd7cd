/// Upgrade sequencer
///
/// Pulls the compose project's images and only proceeds when the pull
/// actually changed an image id; otherwise the run ends early as
/// "no update available" without touching the instance. A safety backup
/// runs before the restart unless explicitly skipped, and a failed backup
/// aborts the upgrade.

use std::sync::Arc;

use crate::core::backup::BackupRunner;
use crate::core::config::Instance;
use crate::core::docker::DockerCli;
use crate::core::error::StepError;
use crate::core::report::{Aborted, CancelFlag, OperationKind, RunReport, StepLog};

#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeOptions {
    /// Skip the safety backup before restarting onto new images.
    pub skip_backup: bool,
    /// Leave maintenance mode enabled after the restart, for manual
    /// post-upgrade checks.
    pub keep_maintenance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Upgraded,
    NoUpdateAvailable,
    Failed,
}

pub struct UpgradeReport {
    pub report: RunReport,
    pub outcome: UpgradeOutcome,
    /// Report of the safety backup, when one was run.
    pub backup: Option<RunReport>,
}

pub struct UpgradeRunner {
    docker: Arc<DockerCli>,
    backup: BackupRunner,
    cancel: CancelFlag,
}

impl UpgradeRunner {
    pub fn new(docker: Arc<DockerCli>, cancel: CancelFlag) -> Self {
        let backup = BackupRunner::new(Arc::clone(&docker), cancel.clone());
        Self {
            docker,
            backup,
            cancel,
        }
    }

    /// Upgrade one instance. Never returns an error: every failure is
    /// captured as a step outcome in the report.
    pub async fn run(&self, instance: &Instance, options: UpgradeOptions) -> UpgradeReport {
        let mut log = StepLog::new(self.cancel.clone());
        let mut backup_report = None;
        let mut update_found = false;

        let outcome: Result<(), Aborted> = async {
            let project = log.check("check compose project", || {
                instance.compose_project.clone().ok_or_else(|| {
                    StepError::Process(format!(
                        "{}: compose_project is not configured",
                        instance.name
                    ))
                })
            })?;

            let before = log
                .run(
                    "snapshot image ids",
                    self.docker.compose_image_ids(&project),
                )
                .await?;

            log.run("pull images", self.docker.compose_pull(&project))
                .await?;

            let after = log
                .run(
                    "compare image ids",
                    self.docker.compose_image_ids(&project),
                )
                .await?;
            if before == after {
                return Ok(());
            }
            update_found = true;

            if !options.skip_backup {
                log.run("back up instance", async {
                    let report = self.backup.run(instance).await;
                    let failed = report
                        .failed_steps()
                        .next()
                        .map(|s| {
                            format!("{}: {}", s.name, s.detail.clone().unwrap_or_default())
                        });
                    let succeeded = report.succeeded;
                    backup_report = Some(report);
                    if succeeded {
                        Ok(())
                    } else {
                        Err(StepError::Process(format!(
                            "safety backup failed ({})",
                            failed.unwrap_or_default()
                        )))
                    }
                })
                .await?;
            }

            log.run(
                "enable maintenance mode",
                self.docker.set_maintenance(instance, true),
            )
            .await?;

            log.run("restart services", self.docker.compose_up(&project))
                .await?;

            if !options.keep_maintenance {
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

        let succeeded = log.all_succeeded();
        let outcome = if !succeeded {
            UpgradeOutcome::Failed
        } else if update_found {
            UpgradeOutcome::Upgraded
        } else {
            UpgradeOutcome::NoUpdateAvailable
        };

        UpgradeReport {
            report: RunReport {
                instance: instance.name.clone(),
                kind: OperationKind::Upgrade,
                succeeded,
                artifact_path: None,
                artifact_size_mb: None,
                steps: log.into_steps(),
            },
            outcome,
            backup: backup_report,
        }
    }
}
