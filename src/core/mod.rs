pub mod archive;
pub mod backup;
pub mod config;
pub mod docker;
pub mod error;
pub mod process;
pub mod report;
pub mod restore;
pub mod retention;
pub mod runlog;
pub mod upgrade;
pub mod workspace;

pub use backup::BackupRunner;
pub use config::Settings;
pub use docker::DockerCli;
pub use report::{CancelFlag, RunReport};
pub use restore::{RestoreOptions, RestoreRunner};
pub use runlog::RunLog;
pub use upgrade::{UpgradeOptions, UpgradeOutcome, UpgradeRunner};
