/// Settings loading and instance descriptors
///
/// `settings.yaml` maps instance names to their containers, credentials and
/// backup locations. Loaded once at startup; instances are immutable for
/// the duration of the process.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::constants::{DEFAULT_COMMAND_TIMEOUT_SECS, WORKSPACE_DIR_NAME};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: LogSettings,
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,
    pub instances: BTreeMap<String, InstanceSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_logging")]
    pub logging: bool,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceSettings {
    pub db_password: String,
    pub app_container: String,
    pub db_container: String,
    pub backup_dir: PathBuf,
    pub retention: usize,
    #[serde(default)]
    pub compose_project: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_logging() -> bool {
    true
}

/// Immutable descriptor of one managed instance: an application container
/// plus a database container sharing a backup directory.
#[derive(Clone)]
pub struct Instance {
    pub name: String,
    /// MySQL root password. Redacted from `Debug`, passed to clients only
    /// through the spawned process environment.
    pub db_password: String,
    pub app_container: String,
    pub db_container: String,
    pub backup_dir: PathBuf,
    /// Ephemeral staging area, always `backup_dir/tmp`. Owned exclusively
    /// by the sequencer for the duration of a run.
    pub workspace_dir: PathBuf,
    pub retention: usize,
    pub compose_project: Option<PathBuf>,
}

impl Instance {
    fn from_settings(name: &str, settings: &InstanceSettings) -> Self {
        Self {
            name: name.to_string(),
            db_password: settings.db_password.clone(),
            app_container: settings.app_container.clone(),
            db_container: settings.db_container.clone(),
            backup_dir: settings.backup_dir.clone(),
            workspace_dir: settings.backup_dir.join(WORKSPACE_DIR_NAME),
            retention: settings.retention,
            compose_project: settings.compose_project.clone(),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("db_password", &"****")
            .field("app_container", &self.app_container)
            .field("db_container", &self.db_container)
            .field("backup_dir", &self.backup_dir)
            .field("workspace_dir", &self.workspace_dir)
            .field("retention", &self.retention)
            .field("compose_project", &self.compose_project)
            .finish()
    }
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Resolve the settings file: explicit flag, then ./settings.yaml, then
    /// the user config directory.
    pub fn locate(explicit: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path);
            }
            return Err(anyhow!("Settings file not found at {}", path.display()));
        }

        let local = PathBuf::from("settings.yaml");
        if local.exists() {
            return Ok(local);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let fallback = config_dir.join("nextvault").join("settings.yaml");
            if fallback.exists() {
                return Ok(fallback);
            }
        }

        Err(anyhow!(
            "No settings.yaml found (looked in the current directory and ~/.config/nextvault/)"
        ))
    }

    /// Validate configuration, returning one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.instances.is_empty() {
            errors.push("No instances configured".to_string());
        }

        for (name, inst) in &self.instances {
            if inst.retention == 0 {
                errors.push(format!("{name}: retention must be at least 1"));
            }
            if inst.db_password.is_empty() {
                errors.push(format!("{name}: db_password is empty"));
            }
            if inst.app_container.is_empty() {
                errors.push(format!("{name}: app_container is empty"));
            }
            if inst.db_container.is_empty() {
                errors.push(format!("{name}: db_container is empty"));
            }
            if let Some(project) = &inst.compose_project {
                if !project.exists() {
                    errors.push(format!(
                        "{name}: compose_project {} does not exist",
                        project.display()
                    ));
                }
            }
        }

        errors
    }

    /// All configured instances, in name order.
    pub fn instances(&self) -> Vec<Instance> {
        self.instances
            .iter()
            .map(|(name, settings)| Instance::from_settings(name, settings))
            .collect()
    }

    pub fn instance(&self, name: &str) -> Option<Instance> {
        self.instances
            .get(name)
            .map(|settings| Instance::from_settings(name, settings))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
log:
  logging: true
  log_dir: /var/log/nextvault
instances:
  demo:
    db_password: "hunter2"
    app_container: nextcloud-app-demo
    db_container: nextcloud-db-demo
    backup_dir: /srv/backup/demo
    retention: 3
"#;

    fn write_settings(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_settings_and_derives_workspace() {
        let file = write_settings(SAMPLE);
        let settings = Settings::load(file.path()).unwrap();

        assert!(settings.log.logging);
        assert_eq!(settings.command_timeout_secs, 600);

        let inst = settings.instance("demo").unwrap();
        assert_eq!(inst.app_container, "nextcloud-app-demo");
        assert_eq!(inst.retention, 3);
        assert_eq!(inst.workspace_dir, PathBuf::from("/srv/backup/demo/tmp"));
        assert!(settings.validate().is_empty());
    }

    #[test]
    fn rejects_zero_retention() {
        let file = write_settings(&SAMPLE.replace("retention: 3", "retention: 0"));
        let settings = Settings::load(file.path()).unwrap();
        let errors = settings.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("retention"));
    }

    #[test]
    fn debug_output_redacts_the_password() {
        let file = write_settings(SAMPLE);
        let settings = Settings::load(file.path()).unwrap();
        let inst = settings.instance("demo").unwrap();
        let rendered = format!("{inst:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("****"));
    }

    #[test]
    fn instances_are_listed_in_name_order() {
        let extra = SAMPLE.to_string()
            + r#"
  alpha:
    db_password: "pw"
    app_container: app-a
    db_container: db-a
    backup_dir: /srv/backup/alpha
    retention: 2
"#;
        let file = write_settings(&extra);
        let settings = Settings::load(file.path()).unwrap();
        let names: Vec<_> = settings.instances().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["alpha", "demo"]);
    }
}
