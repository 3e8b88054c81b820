//! Common configuration utilities

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{Error, Result};

/// Base trait for all configuration types
pub trait Configuration: Serialize + for<'de> Deserialize<'de> + Default {
    /// Validate the configuration
    fn validate(&self) -> Result<()>;

    /// Load configuration from a TOML file
    fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}

/// Helper function to create directories needed for configurations
pub fn ensure_directory(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            Error::configuration(format!(
                "Failed to create directory '{}': {}",
                path.display(),
                e
            ))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        limit: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self { limit: 5 }
        }
    }

    impl Configuration for Sample {
        fn validate(&self) -> Result<()> {
            if self.limit == 0 {
                return Err(Error::configuration("limit must be positive"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        fs::write(&path, "limit = 9\n").unwrap();
        assert_eq!(Sample::from_file(&path).unwrap(), Sample { limit: 9 });
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        let err = Sample::from_file("/nonexistent/sample.toml").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = Sample::from_toml_str("limit = 0").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_ensure_directory_creates_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_directory(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
