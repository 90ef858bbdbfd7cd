/// Shared constants for nextvault

/// Working directory of the Nextcloud application container.
pub const APP_ROOT: &str = "/var/www/html";

/// Name of the configuration directory inside the application container,
/// and of the directory staged in the workspace / stored in artifacts.
pub const CONFIG_DIR: &str = "config";

/// Transfer archive used for the config round-trip through `docker cp`.
pub const CONFIG_TAR: &str = "config.tar";

/// Acknowledgment phrases printed by `occ maintenance:mode --on`.
/// "already enabled" counts as success (the toggle is idempotent).
pub const MAINTENANCE_ON_PHRASES: [&str; 2] =
    ["Maintenance mode enabled", "Maintenance mode already enabled"];

/// Acknowledgment phrases printed by `occ maintenance:mode --off`.
pub const MAINTENANCE_OFF_PHRASES: [&str; 2] =
    ["Maintenance mode disabled", "Maintenance mode already disabled"];

/// Environment variable the MySQL client tools read the password from.
pub const MYSQL_PWD_ENV: &str = "MYSQL_PWD";

/// Timestamp embedded in artifact names. Lexicographic order of names
/// produced with this format equals chronological order; retention pruning
/// and the restore menu rely on that.
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Suffix of finished backup artifacts.
pub const ARTIFACT_SUFFIX: &str = ".tar.gz";

/// Subdirectory of the backup directory used as ephemeral workspace.
pub const WORKSPACE_DIR_NAME: &str = "tmp";

/// Lock file guarding against concurrent runs on the same instance.
pub const LOCK_FILE_NAME: &str = ".nextvault.lock";

/// File the run log is appended to inside the configured log directory.
pub const LOG_FILE_NAME: &str = "nextvault.log";

/// Default per-command timeout when settings.yaml does not set one.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
