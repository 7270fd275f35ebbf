use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub areas: PathBuf,
    pub points: PathBuf,
    pub id_column: String,
    #[serde(default)]
    pub name_columns: Vec<String>,
    // Overrides whatever CRS the files declare, e.g. "EPSG:32749"
    pub areas_crs: Option<String>,
    pub points_crs: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub csv: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: None,
        }
    }
}

fn default_port() -> u16 {
    8080
}

/// Column layout shared by the exported table and the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub id_column: String,
    pub name_columns: Vec<String>,
}

impl TableSchema {
    pub const LATITUDE: &'static str = "latitude";
    pub const LONGITUDE: &'static str = "longitude";

    pub fn header(&self) -> Vec<&str> {
        self.name_columns
            .iter()
            .map(String::as_str)
            .chain([self.id_column.as_str(), Self::LATITUDE, Self::LONGITUDE])
            .collect()
    }

    /// Name columns used for drill-down filtering; the last one labels rows.
    pub fn filter_levels(&self) -> &[String] {
        match self.name_columns.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema {
            id_column: self.input.id_column.clone(),
            name_columns: self.input.name_columns.clone(),
        }
    }
}
