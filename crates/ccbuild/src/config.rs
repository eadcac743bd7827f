//! Configuration file parsing and merging
//!
//! Handles `ccbuild.toml` with an optional `ccbuild.local.toml` overlay
//! for per-machine settings. Tables merge recursively; arrays and
//! primitives in the local file replace the base values.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::command::Toolchain;
use crate::Result;

/// Main configuration structure for ccbuild
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace settings
    pub workspace: WorkspaceConfig,

    /// Build settings
    pub build: BuildConfig,
}

/// Workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Manifest file (default: "ccbuild.json")
    pub manifest: Utf8PathBuf,

    /// Object file directory (default: "build")
    pub build_dir: Utf8PathBuf,

    /// State directory for ccbuild internal files (default: ".ccbuild")
    pub state_dir: Utf8PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            manifest: Utf8PathBuf::from("ccbuild.json"),
            build_dir: Utf8PathBuf::from("build"),
            state_dir: Utf8PathBuf::from(".ccbuild"),
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of parallel jobs (default: available parallelism)
    pub jobs: Option<usize>,

    /// Stop scheduling new targets after the first failure
    pub stop_on_failure: bool,

    /// Compiler executable (default: "c++")
    pub compiler: String,

    /// Archiver executable (default: "ar")
    pub archiver: String,

    /// pkg-config executable (default: "pkg-config")
    pub pkg_config: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            stop_on_failure: false,
            compiler: "c++".to_string(),
            archiver: "ar".to_string(),
            pkg_config: "pkg-config".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a workspace directory.
    ///
    /// Loads `ccbuild.toml` and merges `ccbuild.local.toml` over it if
    /// present. Both files are optional.
    pub fn load(workspace_root: &Utf8Path) -> Result<Self> {
        let config_path = workspace_root.join("ccbuild.toml");
        let local_config_path = workspace_root.join("ccbuild.local.toml");

        let base_config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<toml::Value>(&content)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let local_config = if local_config_path.exists() {
            let content = std::fs::read_to_string(&local_config_path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        } else {
            None
        };

        let merged = if let Some(local) = local_config {
            merge_toml_values(base_config, local)
        } else {
            base_config
        };

        let config: Config = merged.try_into()?;
        Ok(config)
    }

    /// Load configuration from a string (for testing)
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Get the effective number of jobs
    pub fn effective_jobs(&self) -> usize {
        self.build
            .jobs
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Toolchain programs as configured
    pub fn toolchain(&self) -> Toolchain {
        Toolchain {
            compiler: self.build.compiler.clone(),
            archiver: self.build.archiver.clone(),
            pkg_config: self.build.pkg_config.clone(),
        }
    }
}

/// Merge two TOML values:
/// - Tables: recursively merged
/// - Arrays: local replaces base (not merged)
/// - Primitives: local overrides base
fn merge_toml_values(base: toml::Value, local: toml::Value) -> toml::Value {
    match (base, local) {
        (toml::Value::Table(mut base_table), toml::Value::Table(local_table)) => {
            for (key, local_value) in local_table {
                if let Some(base_value) = base_table.remove(&key) {
                    base_table.insert(key, merge_toml_values(base_value, local_value));
                } else {
                    base_table.insert(key, local_value);
                }
            }
            toml::Value::Table(base_table)
        }
        (_, local) => local,
    }
}
