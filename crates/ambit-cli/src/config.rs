//! Demo settings from `ambit.toml`.
//!
//! Search order:
//! 1. An explicit `--config` path
//! 2. `ambit.toml` in the current directory or any parent
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "ambit.toml";

pub const DEFAULT_WORKER_THREADS: usize = 4;
pub const DEFAULT_DELAYS_MS: [u64; 3] = [200, 100, 0];
pub const DEFAULT_FORK_WIDTH: usize = 2;
pub const DEFAULT_FORK_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worker_threads: usize,
    /// One computation per entry; each sleeps this long, then returns its index.
    pub delays_ms: Vec<u64>,
    pub fork_width: usize,
    pub fork_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            delays_ms: DEFAULT_DELAYS_MS.to_vec(),
            fork_width: DEFAULT_FORK_WIDTH,
            fork_depth: DEFAULT_FORK_DEPTH,
        }
    }
}

pub enum ConfigSource {
    /// Read from this file
    File(PathBuf),
    /// Default values (no config found)
    Default,
}

/// Find `ambit.toml` by searching upward from `start`.
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

pub fn parse(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    anyhow::ensure!(config.worker_threads > 0, "worker_threads must be at least 1");
    Ok(config)
}

fn read(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
}

/// Load the config, reporting where it came from.
pub fn load(explicit: Option<&Path>) -> Result<(Config, ConfigSource)> {
    if let Some(path) = explicit {
        return Ok((read(path)?, ConfigSource::File(path.to_path_buf())));
    }

    if let Some(path) = std::env::current_dir().ok().and_then(|cwd| find_config(&cwd)) {
        return Ok((read(&path)?, ConfigSource::File(path)));
    }

    Ok((Config::default(), ConfigSource::Default))
}
