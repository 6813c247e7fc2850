//! Configuration for the functions. Nothing here is global: binaries load a
//! config once at start-up and pass it into the function they host.
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::{airports::warehouse::TableId, answer::MissingQuestion};

/// Environment variable naming the YAML file read by [`LoaderConfig::from_env_path`].
pub const CONFIG_PATH_VAR: &str = "FUNCTION_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./config.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid environment: {0}")]
    Env(#[from] envy::Error),
}

/// Settings of the airports loader, read from a YAML file:
///
/// ```yaml
/// gcp_project: my-project
/// bigquery_dataset: airports
/// bigquery_table: airports
/// storage:
///   kind: local
///   root: /var/data
/// warehouse:
///   kind: rest
///   endpoint: http://localhost:9050
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoaderConfig {
    pub gcp_project: String,
    pub bigquery_dataset: String,
    pub bigquery_table: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
}

/// Where uploaded objects are read from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Objects live at `{root}/{bucket}/{name}`.
    Local { root: PathBuf },
    /// A storage emulator speaking the JSON API over plain HTTP.
    Emulator { endpoint: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from("."),
        }
    }
}

/// Where rows are appended.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarehouseConfig {
    /// Tables held in process memory; they vanish with the process.
    #[default]
    Memory,
    /// A warehouse REST endpoint, e.g. an emulator.
    Rest { endpoint: String },
}

impl LoaderConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Loads the file named by `FUNCTION_CONFIG`, or `./config.yml`.
    pub fn from_env_path() -> Result<Self, ConfigError> {
        let path = env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(path)
    }

    /// The fully qualified destination table.
    pub fn destination(&self) -> TableId {
        TableId::new(&self.gcp_project, &self.bigquery_dataset, &self.bigquery_table)
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("howdoi")
}

fn default_disable_ssl() -> bool {
    true
}

/// Settings of the answer function, read from `HOWDOI_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerConfig {
    /// `HOWDOI_PROGRAM`: the lookup executable.
    #[serde(default = "default_program")]
    pub program: PathBuf,
    /// `HOWDOI_DISABLE_SSL`: query over plain `http` without certificate checks.
    #[serde(default = "default_disable_ssl")]
    pub disable_ssl: bool,
    /// `HOWDOI_MISSING_QUESTION`: `placeholder` or `reject`.
    #[serde(default)]
    pub missing_question: MissingQuestion,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        AnswerConfig {
            program: default_program(),
            disable_ssl: default_disable_ssl(),
            missing_question: MissingQuestion::default(),
        }
    }
}

impl AnswerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed("HOWDOI_").from_env()?)
    }

    #[cfg(test)]
    fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed("HOWDOI_").from_iter(vars)?)
    }
}
