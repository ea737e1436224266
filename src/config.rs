// ⚙️ Configuration - where the registries and the connections file live
//
// Optional JSON file, every field optional:
//   {
//     "hospital_registry": "data/hospital_codes.csv",
//     "company_registry": "data/company_codes.csv",
//     "connections_file": "data/code_connections.csv",
//     "merged_output": "data/merged_codes.csv"
//   }
// Command-line flags override file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOSPITAL_REGISTRY: &str = "hospital_codes.csv";
pub const DEFAULT_COMPANY_REGISTRY: &str = "company_codes.csv";
pub const DEFAULT_CONNECTIONS_FILE: &str = "code_connections.csv";
pub const DEFAULT_MERGED_OUTPUT: &str = "merged_codes.csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub hospital_registry: PathBuf,
    pub company_registry: PathBuf,
    pub connections_file: PathBuf,
    pub merged_output: PathBuf,
}

impl Default for MappingConfig {
    fn default() -> Self {
        MappingConfig {
            hospital_registry: PathBuf::from(DEFAULT_HOSPITAL_REGISTRY),
            company_registry: PathBuf::from(DEFAULT_COMPANY_REGISTRY),
            connections_file: PathBuf::from(DEFAULT_CONNECTIONS_FILE),
            merged_output: PathBuf::from(DEFAULT_MERGED_OUTPUT),
        }
    }
}

impl MappingConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Config file when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Builder pattern: override paths that were given on the command line
    pub fn with_overrides(
        mut self,
        hospital_registry: Option<PathBuf>,
        company_registry: Option<PathBuf>,
        connections_file: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = hospital_registry {
            self.hospital_registry = path;
        }
        if let Some(path) = company_registry {
            self.company_registry = path;
        }
        if let Some(path) = connections_file {
            self.connections_file = path;
        }
        self
    }
}
