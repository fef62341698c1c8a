use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifact::TemplateSelection;
use crate::secrets::expand_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    pub artifact_directory: String,
    /// Platform recorded on ingested postings.
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    pub templates: Vec<TemplateConfig>,
    #[serde(default)]
    pub default_template: Option<String>,
    #[serde(default)]
    pub keep_superseded_artifacts: bool,
    pub renderer: CommandConfig,
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub vault: VaultConfig,
}

fn default_platform() -> String {
    "hiring_cafe".to_string()
}

/// Renders and browser sessions are heavy; stay well below the core count.
fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, 4)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_actuator_timeout")]
    pub timeout_secs: u64,
}

fn default_actuator_timeout() -> u64 {
    600
}

/// Optional encryption key for stored credential secrets. Without one,
/// secrets are only base64-encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub encryption_key_file: Option<String>,
    #[serde(default)]
    pub encryption_key_env: Option<String>,
}

impl Config {
    /// Database location, `~/.jobledger/data/ledger.db` when unset.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }

    pub fn artifact_directory(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.artifact_directory))
    }

    pub fn actuator_timeout(&self) -> Duration {
        Duration::from_secs(self.actuator.timeout_secs)
    }

    /// Resolves a template by name, or the default template (the configured
    /// `default_template`, else the first one) when `name` is `None`.
    pub fn template(&self, name: Option<&str>) -> Option<TemplateSelection> {
        let wanted = name.or(self.default_template.as_deref());
        let template = match wanted {
            Some(wanted) => self.templates.iter().find(|t| t.name == wanted),
            None => self.templates.first(),
        }?;
        Some(TemplateSelection {
            name: template.name.clone(),
            path: PathBuf::from(expand_home(&template.path)),
        })
    }
}
