use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use review_common::{config::Configuration, Error, Result};
use review_governance::ReviewConfig;

/// Settings of the `review` command-line tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Write a daily rolling log file here in addition to stderr
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// TOML file with the review settings; defaults apply when unset
    #[serde(default)]
    pub review_config: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./review-data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: None,
            log_level: default_log_level(),
            review_config: None,
        }
    }
}

impl CliConfig {
    /// Load from the YAML file named by `REVIEW_CONFIG_FILE`, or else from
    /// `REVIEW_*` environment variables
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = env::var("REVIEW_CONFIG_FILE") {
            if Path::new(&path).exists() {
                return Self::from_file(&path);
            }
            return Err(Error::configuration(format!("config file {} does not exist", path)));
        }

        Ok(CliConfig {
            data_dir: env::var("REVIEW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
            log_dir: env::var("REVIEW_LOG_DIR").ok().map(PathBuf::from),
            log_level: env::var("REVIEW_LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
            review_config: env::var("REVIEW_SETTINGS").ok().map(PathBuf::from),
        })
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::configuration(format!("invalid CLI config: {}", e)))
    }

    /// The review settings this CLI should run with
    pub fn load_review_config(&self) -> Result<ReviewConfig> {
        match &self.review_config {
            Some(path) => ReviewConfig::from_file(path),
            None => Ok(ReviewConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_yaml_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cli.yaml");
        fs::write(&path, "data_dir: /srv/review\nlog_level: debug\n").unwrap();

        let config = CliConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/review"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_dir, None);
        assert!(config.load_review_config().unwrap().schedules.is_empty());
    }

    #[test]
    fn test_review_settings_file() {
        let dir = tempdir().unwrap();
        let settings = dir.path().join("review.toml");
        fs::write(
            &settings,
            r#"
budget = 100

[[schedules]]
review_year = 2024
nominations_start = "2024-12-01T00:00:00Z"
nominations_end = "2024-12-15T00:00:00Z"
reviews_end = "2025-01-15T00:00:00Z"
"#,
        )
        .unwrap();

        let config = CliConfig {
            review_config: Some(settings),
            ..CliConfig::default()
        };
        let review = config.load_review_config().unwrap();
        assert_eq!(review.budget, 100);
        assert_eq!(review.schedules.len(), 1);
    }

    #[test]
    fn test_missing_yaml_is_an_error() {
        assert!(CliConfig::from_file("/nonexistent/cli.yaml").is_err());
    }
}
