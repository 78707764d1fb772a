//! Runtime configuration.
//!
//! The data root comes from `--data-dir`, then `RSS_DATA_DIR`, then
//! `~/data/rss`. An optional `config.toml` inside the root tunes fetching
//! and scheduling; every key has a default.

use crate::types::{DigestError, FetchConfig, Result, SchedulerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DATA_DIR_ENV: &str = "RSS_DATA_DIR";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub fetch: FetchConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Resolve the data root and read `<root>/config.toml` if present.
    pub fn load(data_dir_override: Option<&Path>) -> Result<Self> {
        let data_dir = resolve_data_dir(
            data_dir_override,
            std::env::var(DATA_DIR_ENV).ok(),
            std::env::var_os("HOME").map(PathBuf::from),
        );
        Self::load_from(data_dir)
    }

    pub fn load_from(data_dir: PathBuf) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => {
                debug!("Loading configuration from {}", path.display());
                Self::parse(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(DigestError::Io(e)),
        };
        config.data_dir = data_dir;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| DigestError::Config(format!("config parse error: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.workers == 0 {
            return Err(DigestError::Config("scheduler.workers must be at least 1".to_string()));
        }
        if self.scheduler.seen_cap == 0 {
            return Err(DigestError::Config("scheduler.seen_cap must be at least 1".to_string()));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(DigestError::Config("fetch.timeout_seconds must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn resolve_data_dir(
    data_dir_override: Option<&Path>,
    env_value: Option<String>,
    home: Option<PathBuf>,
) -> PathBuf {
    if let Some(dir) = data_dir_override {
        return dir.to_path_buf();
    }
    if let Some(dir) = env_value.filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    home.unwrap_or_else(|| PathBuf::from("."))
        .join("data")
        .join("rss")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn data_dir_precedence() {
        let home = Some(PathBuf::from("/home/reader"));
        assert_eq!(
            resolve_data_dir(None, None, home.clone()),
            PathBuf::from("/home/reader/data/rss")
        );
        assert_eq!(
            resolve_data_dir(None, Some("/srv/rss".into()), home.clone()),
            PathBuf::from("/srv/rss")
        );
        assert_eq!(
            resolve_data_dir(None, Some(String::new()), home.clone()),
            PathBuf::from("/home/reader/data/rss")
        );
        assert_eq!(
            resolve_data_dir(Some(Path::new("/tmp/x")), Some("/srv/rss".into()), home),
            PathBuf::from("/tmp/x")
        );
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.scheduler.workers, 5);
        assert_eq!(config.scheduler.seen_cap, 500);
        assert_eq!(config.fetch.timeout_seconds, 10);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [scheduler]
            workers = 8

            [fetch]
            user_agent = "test-agent"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.workers, 8);
        assert_eq!(config.scheduler.limit, 10);
        assert_eq!(config.fetch.user_agent, "test-agent");
        assert_eq!(config.fetch.max_redirects, 5);
    }

    #[test]
    fn invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[scheduler\nworkers = ").unwrap();
        let err = Config::load_from(dir.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, DigestError::Config(_)));

        std::fs::write(dir.path().join(CONFIG_FILE), "[scheduler]\nworkers = 0\n").unwrap();
        let err = Config::load_from(dir.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, DigestError::Config(_)));
    }
}
