//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Engine executable settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Harness behaviour
    #[serde(default)]
    pub harness: HarnessConfig,

    /// Scenario runner settings
    #[serde(default)]
    pub scenarios: ScenarioConfig,
}

/// Configuration for the engine under test
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Engine executable name or path
    #[serde(default = "default_engine")]
    pub path: PathBuf,

    /// Additional arguments to pass to the engine
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine(),
            args: Vec::new(),
        }
    }
}

fn default_engine() -> PathBuf {
    PathBuf::from("inspector-engine")
}

/// Harness settings
#[derive(Debug, Deserialize, Clone)]
pub struct HarnessConfig {
    /// Command sent to the peer when a test session completes
    #[serde(default = "default_teardown_method")]
    pub teardown_method: String,

    /// Print every frontend/backend message
    #[serde(default)]
    pub dump_protocol: bool,

    /// Echo the transcript to stdout while it is recorded
    #[serde(default = "default_true")]
    pub echo: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            teardown_method: default_teardown_method(),
            dump_protocol: false,
            echo: true,
        }
    }
}

fn default_teardown_method() -> String {
    "Debugger.disable".to_string()
}

fn default_true() -> bool {
    true
}

/// Scenario runner settings
#[derive(Debug, Deserialize, Clone)]
pub struct ScenarioConfig {
    /// Suffix appended to a scenario's file stem to find its expected transcript
    #[serde(default = "default_expectations_suffix")]
    pub expectations_suffix: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            expectations_suffix: default_expectations_suffix(),
        }
    }
}

fn default_expectations_suffix() -> String {
    "-expected.txt".to_string()
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Resolve the engine executable
    ///
    /// An explicit override wins over the configured path. Bare names are
    /// searched for in PATH.
    pub fn resolve_engine(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        let candidate = override_path.unwrap_or(&self.engine.path);
        if candidate.as_os_str().is_empty() {
            return Err(Error::Config("engine path is empty".to_string()));
        }

        if candidate.components().count() > 1 || candidate.is_absolute() {
            if candidate.exists() {
                return Ok(candidate.to_path_buf());
            }
            return Err(Error::engine_not_found(
                &candidate.display().to_string(),
                &[candidate.display().to_string()],
            ));
        }

        which::which(candidate).map_err(|_| {
            let searched = std::env::var("PATH").unwrap_or_default();
            Error::engine_not_found(&candidate.display().to_string(), &[searched])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.harness.teardown_method, "Debugger.disable");
        assert!(config.harness.echo);
        assert!(!config.harness.dump_protocol);
        assert_eq!(config.scenarios.expectations_suffix, "-expected.txt");
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
[engine]
path = "/opt/engine/d8"
args = ["--expose-gc"]

[harness]
teardown_method = "Runtime.disable"
"#,
        )
        .unwrap();
        assert_eq!(config.engine.path, PathBuf::from("/opt/engine/d8"));
        assert_eq!(config.engine.args, vec!["--expose-gc".to_string()]);
        assert_eq!(config.harness.teardown_method, "Runtime.disable");
        assert!(config.harness.echo);
    }

    #[test]
    fn test_resolve_missing_explicit_engine() {
        let config = Config::default();
        let err = config
            .resolve_engine(Some(Path::new("/definitely/not/here/engine")))
            .unwrap_err();
        assert!(matches!(err, Error::EngineNotFound { .. }));
    }

    #[test]
    fn test_resolve_existing_and_empty_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("engine");
        std::fs::write(&engine, "").unwrap();

        let config = Config::default();
        assert_eq!(config.resolve_engine(Some(&engine)).unwrap(), engine);
        assert!(matches!(
            config.resolve_engine(Some(Path::new(""))),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[harness]\necho = \"yes\"\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::ConfigParse(_))));
    }
}
