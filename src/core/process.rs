/// External command invocation
///
/// Everything the sequencers do to the outside world goes through the
/// [`CommandRunner`] trait so pipelines can be exercised without a docker
/// daemon. [`SystemRunner`] is the real implementation: argument-vector
/// spawning, per-command timeout, and file-based stdin/stdout redirection.
/// Secrets are only ever placed in the child process environment, never in
/// the argument vector.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::core::error::StepError;

/// One external command to run.
#[derive(Debug, Clone, Default)]
pub struct CmdSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment set on the spawned process (not visible in any argv).
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    /// Redirect this file into the child's stdin (database import).
    pub stdin_file: Option<PathBuf>,
    /// Stream the child's stdout into this file (database dump).
    pub stdout_file: Option<PathBuf>,
}

impl CmdSpec {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn stdin_file(mut self, path: &Path) -> Self {
        self.stdin_file = Some(path.to_path_buf());
        self
    }

    pub fn stdout_file(mut self, path: &Path) -> Self {
        self.stdout_file = Some(path.to_path_buf());
        self
    }

    /// Loggable rendering: program and arguments only. Environment entries
    /// are deliberately excluded so credentials cannot leak into diagnostics.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    /// Short diagnostic for a failed command: exit code plus trimmed stderr.
    pub fn failure_detail(&self) -> String {
        let code = match self.code {
            Some(c) => c.to_string(),
            None => "killed".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {code}")
        } else {
            format!("exit code {code}: {stderr}")
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and capture its outcome. A non-zero
    /// exit is reported through [`CmdOutput::success`], not as an error;
    /// `Err` means the command could not be run at all (spawn failure,
    /// redirection failure, or timeout).
    async fn run(&self, spec: CmdSpec) -> Result<CmdOutput, StepError>;
}

/// Runs commands on the host with a fixed per-command timeout.
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: CmdSpec) -> Result<CmdOutput, StepError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        if let Some(path) = &spec.stdin_file {
            let file = std::fs::File::open(path).map_err(|e| {
                StepError::Process(format!("cannot open stdin file {}: {e}", path.display()))
            })?;
            cmd.stdin(Stdio::from(file));
        }

        if let Some(path) = &spec.stdout_file {
            let file = std::fs::File::create(path).map_err(|e| {
                StepError::Process(format!("cannot create stdout file {}: {e}", path.display()))
            })?;
            cmd.stdout(Stdio::from(file));
        }

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                StepError::Process(format!(
                    "timed out after {}s: {}",
                    self.timeout.as_secs(),
                    spec.display()
                ))
            })?
            .map_err(|e| StepError::Process(format!("failed to run {}: {e}", spec.display())))?;

        Ok(CmdOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    impl CmdOutput {
        pub fn ok_with(stdout: &str) -> Self {
            CmdOutput {
                code: Some(0),
                success: true,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }
        }

        pub fn failed(code: i32, stderr: &str) -> Self {
            CmdOutput {
                code: Some(code),
                success: false,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }
        }
    }

    /// Records every command it is asked to run and answers through a
    /// caller-supplied closure. Used to drive whole sequencer pipelines.
    pub struct ScriptedRunner {
        calls: Mutex<Vec<CmdSpec>>,
        respond: Box<dyn Fn(&CmdSpec) -> Result<CmdOutput, StepError> + Send + Sync>,
    }

    impl ScriptedRunner {
        pub fn new(
            respond: impl Fn(&CmdSpec) -> Result<CmdOutput, StepError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        pub fn calls(&self) -> Vec<CmdSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, spec: CmdSpec) -> Result<CmdOutput, StepError> {
            self.calls.lock().unwrap().push(spec.clone());
            (self.respond)(&spec)
        }
    }
}
