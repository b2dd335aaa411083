use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_statement_cache_capacity() -> usize {
    64
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactStoreConfig {
    pub database: Option<PathBuf>,
    /// Prepared statements kept by the connection; one per query shape in use
    #[serde(default = "default_statement_cache_capacity")]
    pub statement_cache_capacity: usize,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for FactStoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            statement_cache_capacity: default_statement_cache_capacity(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl FactStoreConfig {
    /// Database path from the config, or `factstore.db` in the working directory
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| PathBuf::from("factstore.db"))
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("factstore.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<FactStoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: FactStoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &FactStoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
