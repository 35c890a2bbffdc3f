use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Node-level settings, read from ~/.netqasm/config.toml by default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Id of the local node in link-layer messages.
    pub node_id: u32,
    /// Default size of a new application's qubit unit module.
    pub max_qubits: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_id: 0,
            max_qubits: 5,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|h| h.join(".netqasm").join("config.toml"))
}

pub fn resolve_config_path(cli_path: &Option<PathBuf>) -> Option<PathBuf> {
    if let Some(p) = cli_path {
        return Some(p.clone());
    }
    default_config_path()
}

/// Loads the config at `path`, falling back to defaults when the file does
/// not exist. A file that exists but does not parse is an error.
pub fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let path = match resolve_config_path(path) {
        Some(path) if path.exists() => path,
        _ => return Ok(Config::default()),
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Parse config file {}", path.display()))
}

#[allow(dead_code)]
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Create config parent dir {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config(&Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.node_id, 0);
        assert_eq!(config.max_qubits, 5);
    }
}
