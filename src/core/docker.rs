/// Docker CLI integration
///
/// All interaction with the managed containers goes through the `docker`
/// binary: exec for occ and the MySQL clients, cp for the config
/// round-trip, compose for pull/restart. Exit status and output are the
/// only available signals; non-zero exits surface as step failures.
///
/// The MySQL root password is forwarded with a value-less `-e MYSQL_PWD`:
/// docker copies the variable from the client process environment into the
/// container, so the secret never appears in any argument vector.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::Instance;
use crate::core::error::StepError;
use crate::core::process::{CmdOutput, CmdSpec, CommandRunner, SystemRunner};
use crate::utils::constants::{
    APP_ROOT, CONFIG_DIR, CONFIG_TAR, MAINTENANCE_OFF_PHRASES, MAINTENANCE_ON_PHRASES,
    MYSQL_PWD_ENV,
};

pub struct DockerCli {
    runner: Box<dyn CommandRunner>,
}

impl DockerCli {
    /// Docker CLI backed by real subprocesses with the given per-command
    /// timeout.
    pub fn system(timeout: Duration) -> Self {
        Self::with_runner(Box::new(SystemRunner::new(timeout)))
    }

    pub fn with_runner(runner: Box<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Toggle the application's maintenance mode via occ. Success requires
    /// the acknowledgment phrase; "already enabled"/"already disabled"
    /// counts as success, so the toggle is idempotent.
    pub async fn set_maintenance(&self, instance: &Instance, enable: bool) -> Result<(), StepError> {
        let flag = if enable { "--on" } else { "--off" };
        let spec = CmdSpec::new("docker").args([
            "exec",
            "--user",
            "www-data",
            &instance.app_container,
            "php",
            "occ",
            "maintenance:mode",
            flag,
        ]);

        let out = self.runner.run(spec).await?;
        if !out.success {
            return Err(StepError::Process(format!(
                "occ maintenance:mode {flag}: {}",
                out.failure_detail()
            )));
        }

        let phrases: &[&str] = if enable {
            &MAINTENANCE_ON_PHRASES
        } else {
            &MAINTENANCE_OFF_PHRASES
        };
        let acknowledged = out
            .stdout
            .lines()
            .any(|line| phrases.contains(&line.trim()));
        if acknowledged {
            Ok(())
        } else {
            Err(StepError::Process(format!(
                "occ maintenance:mode {flag}: unexpected output: {}",
                out.stdout.trim()
            )))
        }
    }

    /// Dump all databases to a file in the workspace. The dump is streamed
    /// straight to disk; success requires a zero exit and a non-empty file.
    pub async fn dump_database(&self, instance: &Instance, dest: &Path) -> Result<(), StepError> {
        let spec = CmdSpec::new("docker")
            .args([
                "exec",
                "-e",
                MYSQL_PWD_ENV,
                &instance.db_container,
                "mysqldump",
                "--user=root",
                "--all-databases",
            ])
            .env(MYSQL_PWD_ENV, &instance.db_password)
            .stdout_file(dest);

        let out = self.runner.run(spec).await?;
        if !out.success {
            return Err(StepError::Process(format!(
                "mysqldump: {}",
                out.failure_detail()
            )));
        }

        let size = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(StepError::Process(format!(
                "dump file {} is missing or empty",
                dest.display()
            )));
        }
        Ok(())
    }

    /// Feed a dump file into the database client on stdin. Success is the
    /// client's exit status.
    pub async fn import_database(&self, instance: &Instance, dump: &Path) -> Result<(), StepError> {
        let spec = CmdSpec::new("docker")
            .args([
                "exec",
                "-i",
                "-e",
                MYSQL_PWD_ENV,
                &instance.db_container,
                "mysql",
                "--user=root",
            ])
            .env(MYSQL_PWD_ENV, &instance.db_password)
            .stdin_file(dump);

        let out = self.runner.run(spec).await?;
        if !out.success {
            return Err(StepError::Process(format!(
                "mysql import: {}",
                out.failure_detail()
            )));
        }
        Ok(())
    }

    /// Run a command inside the application container with the application
    /// root as working directory.
    async fn exec_app(&self, instance: &Instance, args: &[&str]) -> Result<CmdOutput, StepError> {
        let spec = CmdSpec::new("docker")
            .args(["exec", "--workdir", APP_ROOT, &instance.app_container])
            .args(args.iter().copied());
        self.runner.run(spec).await
    }

    async fn exec_app_ok(&self, instance: &Instance, args: &[&str]) -> Result<(), StepError> {
        let out = self.exec_app(instance, args).await?;
        if !out.success {
            return Err(StepError::Process(format!(
                "docker exec {}: {}",
                args.join(" "),
                out.failure_detail()
            )));
        }
        Ok(())
    }

    /// Archive the in-container config directory, copy the archive out to
    /// `dest`, and remove the in-container copy.
    pub async fn export_config_archive(
        &self,
        instance: &Instance,
        dest: &Path,
    ) -> Result<(), StepError> {
        self.exec_app_ok(instance, &["tar", "-cf", CONFIG_TAR, &format!("{CONFIG_DIR}/")])
            .await?;

        let source = format!("{}:{APP_ROOT}/{CONFIG_TAR}", instance.app_container);
        let dest_str = dest.display().to_string();
        let spec = CmdSpec::new("docker").args(["cp", source.as_str(), dest_str.as_str()]);
        let out = self.runner.run(spec).await?;
        if !out.success {
            // Still try to clear the transfer archive out of the container.
            let _ = self.exec_app(instance, &["rm", CONFIG_TAR]).await;
            return Err(StepError::Process(format!(
                "docker cp {source}: {}",
                out.failure_detail()
            )));
        }

        self.exec_app_ok(instance, &["rm", CONFIG_TAR]).await
    }

    /// Copy a local config archive into the application container and swap
    /// the config directory for its contents. Verified positively with an
    /// in-container directory test.
    pub async fn import_config_archive(
        &self,
        instance: &Instance,
        src: &Path,
    ) -> Result<(), StepError> {
        let target = format!("{}:{APP_ROOT}/{CONFIG_TAR}", instance.app_container);
        let src_str = src.display().to_string();
        let spec = CmdSpec::new("docker").args(["cp", src_str.as_str(), target.as_str()]);
        let out = self.runner.run(spec).await?;
        if !out.success {
            return Err(StepError::Process(format!(
                "docker cp {target}: {}",
                out.failure_detail()
            )));
        }

        self.exec_app_ok(instance, &["rm", "-r", CONFIG_DIR]).await?;
        self.exec_app_ok(instance, &["tar", "-xf", CONFIG_TAR]).await?;
        self.exec_app_ok(instance, &["rm", CONFIG_TAR]).await?;

        let check = self
            .exec_app(instance, &["test", "-d", CONFIG_DIR])
            .await?;
        if !check.success {
            return Err(StepError::Process(format!(
                "config directory missing in {} after import",
                instance.app_container
            )));
        }
        Ok(())
    }

    async fn compose(&self, project: &Path, args: &[&str]) -> Result<CmdOutput, StepError> {
        let dir = resolve_compose_dir(project)?;
        let spec = CmdSpec::new("docker")
            .arg("compose")
            .args(args.iter().copied())
            .current_dir(&dir);
        let out = self.runner.run(spec).await?;
        if !out.success {
            return Err(StepError::Process(format!(
                "docker compose {}: {}",
                args.join(" "),
                out.failure_detail()
            )));
        }
        Ok(out)
    }

    /// Image ids of the project's services. Compared before/after a pull to
    /// detect whether an update actually arrived.
    pub async fn compose_image_ids(&self, project: &Path) -> Result<BTreeSet<String>, StepError> {
        let out = self.compose(project, &["images", "--quiet"]).await?;
        Ok(out
            .stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    pub async fn compose_pull(&self, project: &Path) -> Result<(), StepError> {
        self.compose(project, &["pull"]).await.map(|_| ())
    }

    pub async fn compose_up(&self, project: &Path) -> Result<(), StepError> {
        self.compose(project, &["up", "-d"]).await.map(|_| ())
    }
}

/// A compose project may be given as the compose file or its directory.
fn resolve_compose_dir(project: &Path) -> Result<PathBuf, StepError> {
    if project.is_file() {
        match project.parent() {
            Some(parent) => Ok(parent.to_path_buf()),
            None => Err(StepError::Process(format!(
                "compose project path {} has no parent directory",
                project.display()
            ))),
        }
    } else if project.is_dir() {
        Ok(project.to_path_buf())
    } else {
        Err(StepError::Process(format!(
            "compose project path {} does not exist",
            project.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::ScriptedRunner;
    use crate::core::process::MockCommandRunner;
    use std::fs;
    use tempfile::TempDir;

    fn instance() -> Instance {
        Instance {
            name: "demo".to_string(),
            db_password: "hunter2".to_string(),
            app_container: "nextcloud-app-demo".to_string(),
            db_container: "nextcloud-db-demo".to_string(),
            backup_dir: PathBuf::from("/srv/backup/demo"),
            workspace_dir: PathBuf::from("/srv/backup/demo/tmp"),
            retention: 3,
            compose_project: None,
        }
    }

    #[tokio::test]
    async fn maintenance_enable_accepts_already_enabled() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|spec: &CmdSpec| {
                spec.program == "docker" && spec.args.contains(&"--on".to_string())
            })
            .returning(|_| Ok(CmdOutput::ok_with("Maintenance mode already enabled\n")));

        let docker = DockerCli::with_runner(Box::new(mock));
        docker.set_maintenance(&instance(), true).await.unwrap();
    }

    #[tokio::test]
    async fn maintenance_toggle_rejects_unexpected_output() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .returning(|_| Ok(CmdOutput::ok_with("Nextcloud is in debug mode\n")));

        let docker = DockerCli::with_runner(Box::new(mock));
        let err = docker.set_maintenance(&instance(), false).await.unwrap_err();
        assert!(err.to_string().contains("unexpected output"));
    }

    #[tokio::test]
    async fn dump_streams_to_file_and_rejects_empty_dumps() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("demo.sql");

        let runner = ScriptedRunner::new(|spec| {
            if let Some(path) = &spec.stdout_file {
                fs::write(path, "-- MySQL dump\n").unwrap();
            }
            Ok(CmdOutput::ok_with(""))
        });
        let docker = DockerCli::with_runner(Box::new(runner));
        docker.dump_database(&instance(), &dest).await.unwrap();
        assert!(dest.is_file());

        // A successful exit with nothing written is still a failure.
        let runner = ScriptedRunner::new(|_| Ok(CmdOutput::ok_with("")));
        let docker = DockerCli::with_runner(Box::new(runner));
        let empty = tmp.path().join("empty.sql");
        let err = docker.dump_database(&instance(), &empty).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn credentials_stay_out_of_the_argument_vector() {
        let runner = ScriptedRunner::new(|spec| {
            assert!(
                !spec.args.iter().any(|a| a.contains("hunter2")),
                "password leaked into argv: {:?}",
                spec.args
            );
            assert_eq!(
                spec.env,
                vec![(MYSQL_PWD_ENV.to_string(), "hunter2".to_string())]
            );
            if let Some(path) = &spec.stdout_file {
                fs::write(path, "-- dump").unwrap();
            }
            Ok(CmdOutput::ok_with(""))
        });
        let tmp = TempDir::new().unwrap();
        let dump = tmp.path().join("dump.sql");
        fs::write(&dump, "-- dump").unwrap();

        let docker = DockerCli::with_runner(Box::new(runner));
        let inst = instance();
        docker
            .dump_database(&inst, &tmp.path().join("out.sql"))
            .await
            .unwrap();
        docker.import_database(&inst, &dump).await.unwrap();
    }

    #[tokio::test]
    async fn import_uses_stdin_and_exit_status() {
        let tmp = TempDir::new().unwrap();
        let dump = tmp.path().join("dump.sql");
        fs::write(&dump, "CREATE TABLE t (id INT);").unwrap();

        let runner = ScriptedRunner::new(|spec| {
            assert_eq!(spec.program, "docker");
            assert!(spec.stdin_file.is_some());
            assert!(spec.env.iter().any(|(k, _)| k == MYSQL_PWD_ENV));
            assert!(!spec.args.iter().any(|a| a.contains("hunter2")));
            Ok(CmdOutput::ok_with(""))
        });
        let docker = DockerCli::with_runner(Box::new(runner));
        docker.import_database(&instance(), &dump).await.unwrap();

        let runner = ScriptedRunner::new(|_| Ok(CmdOutput::failed(1, "ERROR 1045 (28000)")));
        let docker = DockerCli::with_runner(Box::new(runner));
        let err = docker.import_database(&instance(), &dump).await.unwrap_err();
        assert!(err.to_string().contains("exit code 1"));
    }

    #[tokio::test]
    async fn failed_copy_still_clears_the_container_archive() {
        use std::sync::{Arc, Mutex};

        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let runner = ScriptedRunner::new({
            let seen = seen.clone();
            move |spec| {
                seen.lock().unwrap().push(spec.args.clone());
                if spec.args.first().map(String::as_str) == Some("cp") {
                    return Ok(CmdOutput::failed(1, "no space left on device"));
                }
                Ok(CmdOutput::ok_with(""))
            }
        });

        let tmp = TempDir::new().unwrap();
        let docker = DockerCli::with_runner(Box::new(runner));
        let err = docker
            .export_config_archive(&instance(), &tmp.path().join("config.tar"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("docker cp"));

        let calls = seen.lock().unwrap();
        let last = calls.last().unwrap();
        assert_eq!(
            last[last.len() - 2..].to_vec(),
            vec!["rm".to_string(), "config.tar".to_string()]
        );
    }

    #[tokio::test]
    async fn compose_runs_in_the_project_directory() {
        let tmp = TempDir::new().unwrap();
        let compose_file = tmp.path().join("docker-compose.yml");
        fs::write(&compose_file, "services: {}\n").unwrap();

        let expected = tmp.path().to_path_buf();
        let runner = ScriptedRunner::new(move |spec| {
            assert_eq!(spec.current_dir.as_deref(), Some(expected.as_path()));
            Ok(CmdOutput::ok_with("sha256:aaa\nsha256:bbb\n"))
        });
        let docker = DockerCli::with_runner(Box::new(runner));

        // Given the compose file itself, the parent directory is used.
        let ids = docker.compose_image_ids(&compose_file).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("sha256:aaa"));
    }
}
