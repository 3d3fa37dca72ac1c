//! Site-level configuration loaded from `config.yml`.
//!
//! CLI flags override the per-run values; this file only carries settings
//! that describe the site and sensible transfer defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Site root used for session bootstrap and relative-URL resolution.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Alternative domains serving the same catalogue; URLs on any of
    /// these hosts pass the hop shape checks.
    #[serde(default = "default_mirror_urls")]
    pub mirror_urls: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for metadata hops, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Timeout for file transfers, in seconds.
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout: u64,

    /// Streamed chunk size for file transfers, in kilobytes.
    #[serde(default = "default_chunk_size_kb")]
    pub chunk_size_kb: usize,

    /// Attempts per episode before giving up on its download.
    #[serde(default = "default_download_trials")]
    pub download_trials: u32,

    /// Items per listing page as observed from site behaviour. The site
    /// guarantees nothing here; this is a hint, not a contract.
    #[serde(default = "default_page_size_hint")]
    pub page_size_hint: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: default_site_url(),
            mirror_urls: default_mirror_urls(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            transfer_timeout: default_transfer_timeout(),
            chunk_size_kb: default_chunk_size_kb(),
            download_trials: default_download_trials(),
            page_size_hint: default_page_size_hint(),
        }
    }
}

impl Config {
    pub const FILE_NAME: &'static str = "config.yml";

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size_kb.max(1) * 1024
    }

    /// Hosts considered part of the site, primary domain first.
    pub fn known_hosts(&self) -> Vec<String> {
        std::iter::once(self.site_url.as_str())
            .chain(self.mirror_urls.iter().map(String::as_str))
            .filter_map(|raw| url::Url::parse(raw).ok())
            .filter_map(|u| u.host_str().map(str::to_string))
            .collect()
    }
}

/// Load `config.yml` from `base_dir` (or the working directory), creating
/// it with defaults on first run.
pub fn load_or_create(base_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let path = base_dir
        .map(|d| d.join(Config::FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(Config::FILE_NAME));

    if !path.exists() {
        let config = Config::default();
        write_default(&config, &path)?;
        return Ok(config);
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

fn write_default(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let yaml = serde_yaml::to_string(config)?;
    let contents = format!("# fzseries-downloader site settings\n{yaml}");
    fs::write(path, contents).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn default_site_url() -> String {
    "https://fztvseries.live/".to_string()
}

fn default_mirror_urls() -> Vec<String> {
    vec![
        "https://tvseries.in/".to_string(),
        "https://mobiletvshows.site/".to_string(),
    ]
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:129.0) Gecko/20100101 Firefox/129.0".to_string()
}

fn default_request_timeout() -> u64 {
    20
}

fn default_transfer_timeout() -> u64 {
    30 * 60
}

fn default_chunk_size_kb() -> usize {
    512
}

fn default_download_trials() -> u32 {
    10
}

fn default_page_size_hint() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_primary_domain() {
        let config = Config::default();
        assert!(config.site_url.contains("fztvseries.live"));
        assert_eq!(config.known_hosts()[0], "fztvseries.live");
        assert_eq!(config.known_hosts().len(), 3);
    }

    #[test]
    fn load_creates_file_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_create(Some(dir.path())).unwrap();
        assert!(dir.path().join(Config::FILE_NAME).exists());
        assert_eq!(config.page_size_hint, 20);

        // Second load parses what the first run wrote.
        let reloaded = load_or_create(Some(dir.path())).unwrap();
        assert_eq!(reloaded.site_url, config.site_url);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(Config::FILE_NAME),
            "request_timeout: 5\nchunk_size_kb: 64\n",
        )
        .unwrap();
        let config = load_or_create(Some(dir.path())).unwrap();
        assert_eq!(config.request_timeout, 5);
        assert_eq!(config.chunk_size(), 64 * 1024);
        assert_eq!(config.download_trials, 10);
    }
}
