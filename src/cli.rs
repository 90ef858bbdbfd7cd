/// CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build timestamp injected at compile time
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const VERSION_WITH_BUILD: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built: ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "nextvault")]
#[command(author, version = VERSION_WITH_BUILD, about = "Backup, restore and upgrade for containerized Nextcloud instances", long_about = None)]
pub struct Cli {
    /// Path to settings.yaml (default: ./settings.yaml, then ~/.config/nextvault/)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Skip the run log entry for this invocation
    #[arg(long, global = true)]
    pub nolog: bool,

    /// Answer yes to all confirmation prompts
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up instances (all configured instances when none are named)
    Backup {
        /// Instances to back up
        instances: Vec<String>,

        /// Back up every configured instance
        #[arg(short, long)]
        all: bool,

        /// Keep old artifacts (skip retention pruning)
        #[arg(long)]
        nocleanup: bool,
    },

    /// Restore instances from backup artifacts
    Restore {
        /// Instances to restore (interactive menu when omitted)
        instances: Vec<String>,

        /// Restore every configured instance
        #[arg(short, long)]
        all: bool,

        /// Artifact to restore from, requires a single instance
        /// (newest-first menu when omitted)
        #[arg(short = 'f', long)]
        archive: Option<PathBuf>,

        /// Leave maintenance mode untouched
        #[arg(long)]
        no_maintenance: bool,
    },

    /// Pull new images and upgrade instances that have an update
    Upgrade {
        /// Instances to upgrade
        instances: Vec<String>,

        /// Upgrade every configured instance
        #[arg(short, long)]
        all: bool,

        /// Skip the safety backup before the restart
        #[arg(long)]
        nobackup: bool,

        /// Keep maintenance mode enabled after the upgrade
        #[arg(long)]
        maintenance: bool,

        /// Keep old artifacts (skip retention pruning)
        #[arg(long)]
        nocleanup: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the resolved configuration (passwords masked)
    Show,

    /// Check settings.yaml for problems
    Validate,
}
