mod cli;
mod core;
mod utils;

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use cli::{Cli, Commands, ConfigCommands};
use core::config::{Instance, Settings};
use core::report::CancelFlag;
use core::retention;
use core::{
    BackupRunner, DockerCli, RestoreOptions, RestoreRunner, RunLog, RunReport, UpgradeOptions,
    UpgradeOutcome, UpgradeRunner,
};
use utils::helpers::{confirm, select_from, Console};

struct Context {
    settings: Settings,
    console: Console,
    cancel: CancelFlag,
    run_log: Option<RunLog>,
    assume_yes: bool,
}

impl Context {
    fn docker(&self) -> Arc<DockerCli> {
        Arc::new(DockerCli::system(self.settings.command_timeout()))
    }

    fn log_run(&self, report: &RunReport) {
        if let Some(log) = &self.run_log {
            if let Err(e) = log.append(report) {
                self.console.warn(&format!("Run log not written: {e}"));
            }
        }
    }

    /// Print the run's outcome and return whether it succeeded.
    fn report_outcome(&self, report: &RunReport) -> bool {
        if report.succeeded {
            match (&report.artifact_path, report.artifact_size_mb) {
                (Some(path), Some(size)) => self.console.success(&format!(
                    "{}: {} finished ({}, {size:.2} MB)",
                    report.instance,
                    report.kind.as_str().to_lowercase(),
                    path.display()
                )),
                _ => self.console.success(&format!(
                    "{}: {} finished",
                    report.instance,
                    report.kind.as_str().to_lowercase()
                )),
            }
        } else {
            for step in report.failed_steps() {
                self.console.failure(&format!(
                    "{}: {} failed at '{}': {}",
                    report.instance,
                    report.kind.as_str().to_lowercase(),
                    step.name,
                    step.detail.as_deref().unwrap_or("no detail")
                ));
            }
        }
        report.succeeded
    }

    fn prune(&self, instance: &Instance) {
        match retention::prune(&instance.backup_dir, &instance.name, instance.retention) {
            Ok(0) => {}
            Ok(n) => self
                .console
                .info(&format!("{}: removed {n} old artifact(s)", instance.name)),
            Err(e) => self
                .console
                .warn(&format!("{}: retention pruning failed: {e}", instance.name)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = Settings::locate(cli.config.clone())?;
    let settings = Settings::load(&settings_path)?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupt received, finishing the current step...");
                cancel.cancel();
            }
        });
    }

    let run_log = (!cli.nolog && settings.log.logging)
        .then(|| RunLog::new(settings.log.log_dir.clone()));

    let ctx = Context {
        settings,
        console: Console::new(cli.quiet),
        cancel,
        run_log,
        assume_yes: cli.yes,
    };

    match cli.command {
        Commands::Backup {
            instances,
            all,
            nocleanup,
        } => handle_backup(&ctx, instances, all, nocleanup).await,
        Commands::Restore {
            instances,
            all,
            archive,
            no_maintenance,
        } => handle_restore(&ctx, instances, all, archive, no_maintenance).await,
        Commands::Upgrade {
            instances,
            all,
            nobackup,
            maintenance,
            nocleanup,
        } => handle_upgrade(&ctx, instances, all, nobackup, maintenance, nocleanup).await,
        Commands::Config { command } => handle_config(&ctx, command),
    }
}

/// Resolve the instances a command applies to. No names and no `--all`
/// means every configured instance.
fn select_instances(settings: &Settings, names: &[String], all: bool) -> Result<Vec<Instance>> {
    if all || names.is_empty() {
        let instances = settings.instances();
        if instances.is_empty() {
            return Err(anyhow!("No instances configured"));
        }
        return Ok(instances);
    }
    names
        .iter()
        .map(|name| {
            settings
                .instance(name)
                .ok_or_else(|| anyhow!("Unknown instance '{name}'"))
        })
        .collect()
}

fn finish(total: usize, failures: usize) -> Result<()> {
    if failures > 0 {
        Err(anyhow!("{failures} of {total} run(s) failed"))
    } else {
        Ok(())
    }
}

async fn handle_backup(
    ctx: &Context,
    instances: Vec<String>,
    all: bool,
    nocleanup: bool,
) -> Result<()> {
    let selected = select_instances(&ctx.settings, &instances, all)?;
    let runner = BackupRunner::new(ctx.docker(), ctx.cancel.clone());

    let mut failures = 0;
    for instance in &selected {
        ctx.console.info(&format!("Backing up {}...", instance.name));
        let report = runner.run(instance).await;
        ctx.log_run(&report);

        if ctx.report_outcome(&report) {
            if !nocleanup {
                ctx.prune(instance);
            }
        } else {
            failures += 1;
        }
    }
    finish(selected.len(), failures)
}

async fn handle_restore(
    ctx: &Context,
    instances: Vec<String>,
    all: bool,
    archive: Option<PathBuf>,
    no_maintenance: bool,
) -> Result<()> {
    let selected = if all || !instances.is_empty() {
        select_instances(&ctx.settings, &instances, all)?
    } else {
        // No scope given: pick one instance interactively.
        let candidates = ctx.settings.instances();
        let names: Vec<String> = candidates.iter().map(|i| i.name.clone()).collect();
        match select_from("Which instance should be restored?", &names)? {
            Some(i) => candidates.into_iter().skip(i).take(1).collect(),
            None => return Err(anyhow!("No instance selected")),
        }
    };

    if archive.is_some() && selected.len() > 1 {
        return Err(anyhow!("--archive can only be used with a single instance"));
    }

    let runner = RestoreRunner::new(ctx.docker(), ctx.cancel.clone());
    let options = RestoreOptions {
        skip_maintenance: no_maintenance,
    };

    let mut failures = 0;
    for instance in &selected {
        let artifact = match &archive {
            Some(path) => path.clone(),
            None => match pick_artifact(instance)? {
                Some(path) => path,
                None => {
                    ctx.console
                        .info(&format!("{}: no artifact selected, skipped", instance.name));
                    continue;
                }
            },
        };

        let prompt = format!(
            "Restore '{}' from {}? This overwrites the database and configuration",
            instance.name,
            artifact.display()
        );
        if !confirm(&prompt, ctx.assume_yes)? {
            ctx.console
                .info(&format!("{}: restore skipped", instance.name));
            continue;
        }

        ctx.console.info(&format!("Restoring {}...", instance.name));
        let report = runner.run(instance, &artifact, options).await;
        ctx.log_run(&report);
        if !ctx.report_outcome(&report) {
            failures += 1;
        }
    }
    finish(selected.len(), failures)
}

/// Newest-first artifact menu for one instance. `None` means the operator
/// declined to choose.
fn pick_artifact(instance: &Instance) -> Result<Option<PathBuf>> {
    let artifacts = retention::list_artifacts_newest_first(&instance.backup_dir, &instance.name)?;
    if artifacts.is_empty() {
        return Err(anyhow!(
            "No artifacts for '{}' in {}",
            instance.name,
            instance.backup_dir.display()
        ));
    }
    let names: Vec<String> = artifacts.iter().map(|a| a.file_name.clone()).collect();
    let prompt = format!("Which artifact should restore '{}'?", instance.name);
    Ok(select_from(&prompt, &names)?.map(|i| artifacts[i].path.clone()))
}

async fn handle_upgrade(
    ctx: &Context,
    instances: Vec<String>,
    all: bool,
    nobackup: bool,
    maintenance: bool,
    nocleanup: bool,
) -> Result<()> {
    let selected = select_instances(&ctx.settings, &instances, all)?;
    let runner = UpgradeRunner::new(ctx.docker(), ctx.cancel.clone());
    let options = UpgradeOptions {
        skip_backup: nobackup,
        keep_maintenance: maintenance,
    };

    let mut failures = 0;
    for instance in &selected {
        ctx.console
            .info(&format!("Checking {} for updates...", instance.name));
        let upgrade = runner.run(instance, options).await;

        if let Some(backup) = &upgrade.backup {
            ctx.log_run(backup);
            ctx.report_outcome(backup);
            if backup.succeeded && !nocleanup {
                ctx.prune(instance);
            }
        }
        ctx.log_run(&upgrade.report);

        match upgrade.outcome {
            UpgradeOutcome::NoUpdateAvailable => ctx
                .console
                .info(&format!("{}: no update available", instance.name)),
            UpgradeOutcome::Upgraded => {
                ctx.report_outcome(&upgrade.report);
                if maintenance {
                    ctx.console.info(&format!(
                        "{}: maintenance mode left enabled",
                        instance.name
                    ));
                }
            }
            UpgradeOutcome::Failed => {
                ctx.report_outcome(&upgrade.report);
                failures += 1;
            }
        }
    }
    finish(selected.len(), failures)
}

fn handle_config(ctx: &Context, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("log:");
            println!("  logging: {}", ctx.settings.log.logging);
            println!("  log_dir: {}", ctx.settings.log.log_dir.display());
            println!("command_timeout_secs: {}", ctx.settings.command_timeout_secs);
            println!("instances:");
            for instance in ctx.settings.instances() {
                println!("  {}:", instance.name);
                println!("    db_password: ****");
                println!("    app_container: {}", instance.app_container);
                println!("    db_container: {}", instance.db_container);
                println!("    backup_dir: {}", instance.backup_dir.display());
                println!("    retention: {}", instance.retention);
                if let Some(project) = &instance.compose_project {
                    println!("    compose_project: {}", project.display());
                }
            }
            Ok(())
        }
        ConfigCommands::Validate => {
            let errors = ctx.settings.validate();
            if errors.is_empty() {
                ctx.console.success("Configuration is valid");
                Ok(())
            } else {
                for error in &errors {
                    ctx.console.failure(error);
                }
                Err(anyhow!("{} configuration problem(s) found", errors.len()))
            }
        }
    }
}
