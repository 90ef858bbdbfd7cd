/// Append-only run log
///
/// One line per finished run, ` ; `-separated:
/// `<timestamp> ; <operation> ; <instance> ; <artifact or -> ; <size|SUCCESS|FAIL>`.
/// The log is an operator audit trail; a write failure never fails the run
/// itself, callers report it as a warning and move on.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::core::report::RunReport;
use crate::utils::constants::LOG_FILE_NAME;

pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            path: log_dir.join(LOG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn append(&self, report: &RunReport) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open run log {}", self.path.display()))?;

        writeln!(file, "{}", render_line(report))
            .with_context(|| format!("Failed to write run log {}", self.path.display()))
    }
}

fn render_line(report: &RunReport) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let location = report
        .artifact_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    let status = if !report.succeeded {
        "FAIL".to_string()
    } else if let Some(size) = report.artifact_size_mb {
        format!("{size:.2} MB")
    } else {
        "SUCCESS".to_string()
    };
    format!(
        "{timestamp} ; {} ; {} ; {location} ; {status}",
        report.kind.as_str(),
        report.instance
    )
}
