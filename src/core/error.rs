/// Step-level error taxonomy
///
/// Every pipeline step fails with one of these variants. Errors never cross
/// the sequencer boundary as a fault: the sequencers capture them into step
/// outcomes and always return a report.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepError {
    /// Creating or removing the backup/workspace directory failed.
    #[error("directory error: {0}")]
    Directory(String),

    /// An external command could not be spawned, timed out, exited non-zero,
    /// or produced output the step does not accept.
    #[error("external command failed: {0}")]
    Process(String),

    /// An archive could not be written, read, or had an unexpected layout.
    #[error("archive error: {0}")]
    Archive(String),

    /// The artifact's restrictive file mode could not be set or verified.
    /// The archive remains on disk but must be treated as insecure.
    #[error("permission error: {0}")]
    Permission(String),
}

impl StepError {
    pub fn directory(context: &str, err: std::io::Error) -> Self {
        StepError::Directory(format!("{context}: {err}"))
    }

    pub fn archive(context: &str, err: std::io::Error) -> Self {
        StepError::Archive(format!("{context}: {err}"))
    }
}
