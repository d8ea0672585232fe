use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::error::ConfigError;
use crate::filesystem::filename::FileNameFormat;

pub const DEFAULT_UPLOAD_URL: &str = "/media";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);
/// Longest accepted `TUS_TIMEOUT`, one year.
pub const MAX_TIMEOUT_SECS: u64 = 365 * 24 * 3600;

/// What creation does when a same-named file already sits in the destination
/// directory and the `keep` name format is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingFilePolicy {
    /// Refuse the upload up front with `409 Conflict`.
    #[default]
    Error,
    /// Accept it; the collision is reported when the upload completes.
    Ignore,
}

impl FromStr for ExistingFilePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "ignore" => Ok(Self::Ignore),
            other => Err(ConfigError::UnknownExistingFilePolicy(other.to_string())),
        }
    }
}

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct TusConfig {
    /// Staging directory for in-progress uploads
    pub upload_dir: PathBuf,

    /// Where finished uploads are moved to
    pub destination_dir: PathBuf,

    /// Path the tus endpoint is mounted under (default: "/media")
    pub upload_url: String,

    /// Largest accepted `Upload-Length` in bytes (default: 4 GB)
    pub max_file_size: u64,

    /// Inactivity window after which an upload expires (default: 1 hour)
    pub timeout: Duration,

    pub file_name_format: FileNameFormat,

    pub existing_file: ExistingFilePolicy,
}

impl TusConfig {
    /// Configuration with default settings for the given directories.
    pub fn new(upload_dir: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            destination_dir: destination_dir.into(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            timeout: DEFAULT_TIMEOUT,
            file_name_format: FileNameFormat::default(),
            existing_file: ExistingFilePolicy::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source shaped like the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let upload_dir = var("TUS_UPLOAD_DIR")
            .map(PathBuf::from)
            .or_else(|| var("TUS_BASE_DIR").map(|base| PathBuf::from(base).join("tmp").join("uploads")))
            .ok_or(ConfigError::MissingUploadDir)?;

        let destination_dir = var("TUS_DESTINATION_DIR")
            .or_else(|| var("TUS_MEDIA_ROOT"))
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingDestinationDir)?;

        let mut config = Self::new(upload_dir, destination_dir);

        if let Some(upload_url) = var("TUS_UPLOAD_URL") {
            config.upload_url = upload_url;
        }

        if let Some(value) = var("TUS_MAX_FILE_SIZE") {
            config.max_file_size = parse_number("TUS_MAX_FILE_SIZE", &value)?;
        }

        if let Some(value) = var("TUS_TIMEOUT") {
            let secs = parse_number("TUS_TIMEOUT", &value)?;
            if secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::OutOfRange {
                    var: "TUS_TIMEOUT",
                    value: secs,
                    max: MAX_TIMEOUT_SECS,
                });
            }
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(value) = var("TUS_FILE_NAME_FORMAT") {
            config.file_name_format = value.trim().parse()?;
        }

        if let Some(value) = var("TUS_EXISTING_FILE") {
            config.existing_file = value.trim().parse()?;
        }

        Ok(config)
    }

    /// Creates the staging and destination directories if they are missing.
    pub async fn ensure_directories(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.destination_dir).await
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TusConfig::from_lookup(lookup(&[
            ("TUS_UPLOAD_DIR", "/tmp/tus/uploads"),
            ("TUS_DESTINATION_DIR", "/tmp/tus/media"),
        ]))
        .unwrap();

        assert_eq!(config.upload_dir, PathBuf::from("/tmp/tus/uploads"));
        assert_eq!(config.destination_dir, PathBuf::from("/tmp/tus/media"));
        assert_eq!(config.upload_url, "/media");
        assert_eq!(config.max_file_size, 4294967296);
        assert_eq!(config.timeout, Duration::from_secs(3600));
        assert_eq!(config.file_name_format, FileNameFormat::Increment);
        assert_eq!(config.existing_file, ExistingFilePolicy::Error);
    }

    #[test]
    fn test_directory_fallbacks() {
        let config = TusConfig::from_lookup(lookup(&[
            ("TUS_BASE_DIR", "/srv/app"),
            ("TUS_MEDIA_ROOT", "/srv/media"),
        ]))
        .unwrap();

        assert_eq!(config.upload_dir, PathBuf::from("/srv/app/tmp/uploads"));
        assert_eq!(config.destination_dir, PathBuf::from("/srv/media"));
    }

    #[test]
    fn test_missing_directories() {
        assert_eq!(
            TusConfig::from_lookup(lookup(&[("TUS_DESTINATION_DIR", "/srv/media")])).unwrap_err(),
            ConfigError::MissingUploadDir
        );
        assert_eq!(
            TusConfig::from_lookup(lookup(&[("TUS_UPLOAD_DIR", "/srv/up"), ("TUS_DESTINATION_DIR", "")]))
                .unwrap_err(),
            ConfigError::MissingDestinationDir
        );
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let base = [("TUS_UPLOAD_DIR", "/u"), ("TUS_DESTINATION_DIR", "/d")];

        let mut pairs = base.to_vec();
        pairs.extend([
            ("TUS_UPLOAD_URL", "/files"),
            ("TUS_MAX_FILE_SIZE", "1024"),
            ("TUS_TIMEOUT", "60"),
            ("TUS_FILE_NAME_FORMAT", "keep"),
            ("TUS_EXISTING_FILE", "ignore"),
        ]);
        let config = TusConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.upload_url, "/files");
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.file_name_format, FileNameFormat::Keep);
        assert_eq!(config.existing_file, ExistingFilePolicy::Ignore);

        let mut pairs = base.to_vec();
        pairs.push(("TUS_FILE_NAME_FORMAT", "uuid-prefix"));
        assert_eq!(
            TusConfig::from_lookup(lookup(&pairs)).unwrap_err(),
            ConfigError::UnknownFileNameFormat("uuid-prefix".into())
        );

        let mut pairs = base.to_vec();
        pairs.push(("TUS_TIMEOUT", "-5"));
        assert!(matches!(
            TusConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidNumber { var: "TUS_TIMEOUT", .. })
        ));

        let mut pairs = base.to_vec();
        pairs.push(("TUS_TIMEOUT", "18446744073709551615"));
        assert_eq!(
            TusConfig::from_lookup(lookup(&pairs)).unwrap_err(),
            ConfigError::OutOfRange {
                var: "TUS_TIMEOUT",
                value: u64::MAX,
                max: MAX_TIMEOUT_SECS,
            }
        );

        let mut pairs = base.to_vec();
        pairs.push(("TUS_TIMEOUT", "31536000"));
        assert_eq!(
            TusConfig::from_lookup(lookup(&pairs)).unwrap().timeout,
            Duration::from_secs(MAX_TIMEOUT_SECS)
        );
    }

    #[tokio::test]
    async fn test_ensure_directories() {
        let root = tempfile::tempdir().unwrap();
        let config = TusConfig::new(root.path().join("tmp/uploads"), root.path().join("media"));

        config.ensure_directories().await.unwrap();

        assert!(config.upload_dir.is_dir());
        assert!(config.destination_dir.is_dir());
    }
}
