use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::format::DEFAULT_DESCRIPTION_LIMIT;

const DEFAULT_ENV_PREFIX: &str = "POSTCELL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub cell: CellConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellConfig {
    #[serde(default = "default_description_limit")]
    pub description_limit: usize,
    #[serde(default = "default_show_author")]
    pub show_author: bool,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            description_limit: default_description_limit(),
            show_author: default_show_author(),
        }
    }
}

fn default_description_limit() -> usize {
    DEFAULT_DESCRIPTION_LIMIT
}

fn default_show_author() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout: default_timeout(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_bytes() -> u64 {
    20 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            cfg = read_config_file(path)?;
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = read_config_file(&default_path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "cell.description_limit" => {
            if let Ok(parsed) = value.trim().parse::<usize>() {
                cfg.cell.description_limit = parsed;
            }
        }
        "cell.show_author" => {
            if let Some(parsed) = parse_bool(&value) {
                cfg.cell.show_author = parsed;
            }
        }
        "media.workers" => {
            if let Ok(parsed) = value.trim().parse::<usize>() {
                cfg.media.workers = parsed;
            }
        }
        "media.timeout" => {
            if let Ok(duration) = humantime::parse_duration(value.trim()) {
                cfg.media.timeout = duration;
            }
        }
        "media.max_bytes" => {
            if let Ok(parsed) = value.trim().parse::<u64>() {
                cfg.media.max_bytes = parsed;
            }
        }
        "viewer.id" => {
            let trimmed = value.trim();
            cfg.viewer.id = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        _ => {}
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("postcell").join("config.yaml"))
}
