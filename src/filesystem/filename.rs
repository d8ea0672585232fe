use rand::{distributions::Alphanumeric, Rng};
use std::{fmt, path::Path, str::FromStr};

use crate::error::ConfigError;

const RANDOM_NAME_LENGTH: usize = 11;
const MAX_FILENAME_BYTES: usize = 255;

/// How a completed upload is named inside the destination directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileNameFormat {
    /// Keep the client supplied name, refusing to overwrite an existing file.
    Keep,
    /// Replace the name with a random string, keeping the extension.
    Random,
    /// Append `.<random>` before the extension.
    RandomSuffix,
    /// Append the first free `.0001`, `.0002`, ... before the extension.
    #[default]
    Increment,
}

impl FromStr for FileNameFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Self::Keep),
            "random" => Ok(Self::Random),
            "random-suffix" => Ok(Self::RandomSuffix),
            "increment" => Ok(Self::Increment),
            other => Err(ConfigError::UnknownFileNameFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FileNameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keep => "keep",
            Self::Random => "random",
            Self::RandomSuffix => "random-suffix",
            Self::Increment => "increment",
        };
        f.write_str(name)
    }
}

pub fn random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Splits `name` into stem and extension, the extension keeping its leading dot.
///
/// Leading dots never start an extension, so `.bashrc` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();

    match name[leading..].rfind('.') {
        Some(index) => name.split_at(leading + index),
        None => (name, ""),
    }
}

/// Computes the name a finished upload gets in `destination_dir`.
///
/// [`FileNameFormat::Keep`] returns the name untouched; detecting a collision is
/// up to the caller.
pub async fn resolve(original: &str, destination_dir: &Path, format: FileNameFormat) -> String {
    let (name, extension) = split_extension(original);

    match format {
        FileNameFormat::Keep => original.to_string(),
        FileNameFormat::Random => format!("{}{}", random_string(RANDOM_NAME_LENGTH), extension),
        FileNameFormat::RandomSuffix => format!(
            "{}.{}{}",
            name,
            random_string(RANDOM_NAME_LENGTH),
            extension
        ),
        FileNameFormat::Increment => {
            let mut index: u32 = 1;
            loop {
                let candidate = format!("{}.{:04}{}", name, index, extension);
                if !exists(&destination_dir.join(&candidate)).await {
                    return candidate;
                }
                index += 1;
            }
        }
    }
}

/// True if anything, dangling symlinks included, occupies `path`.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

/// Whether `name` is usable as a single file name on every common platform.
pub fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FILENAME_BYTES || name == "." || name == ".." {
        return false;
    }

    if name
        .chars()
        .any(|c| c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
    {
        return false;
    }

    if name.ends_with('.') || name.ends_with(' ') {
        return false;
    }

    let (stem, _) = split_extension(name);
    !is_reserved_device_name(stem)
}

fn is_reserved_device_name(stem: &str) -> bool {
    let upper = stem.to_ascii_uppercase();
    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => {
            let bytes = upper.as_bytes();
            bytes.len() == 4
                && (upper.starts_with("COM") || upper.starts_with("LPT"))
                && (b'1'..=b'9').contains(&bytes[3])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.txt"), ("a", ".txt"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("..hidden.cfg"), ("..hidden", ".cfg"));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("random-suffix".parse::<FileNameFormat>(), Ok(FileNameFormat::RandomSuffix));
        assert_eq!(
            "uuid".parse::<FileNameFormat>(),
            Err(ConfigError::UnknownFileNameFormat("uuid".into()))
        );
        assert_eq!(FileNameFormat::Increment.to_string(), "increment");
    }

    #[tokio::test]
    async fn test_keep_and_random_formats() {
        let dir = tempfile::tempdir().unwrap();

        let kept = resolve("report.pdf", dir.path(), FileNameFormat::Keep).await;
        assert_eq!(kept, "report.pdf");

        let random = resolve("report.pdf", dir.path(), FileNameFormat::Random).await;
        assert_eq!(random.len(), RANDOM_NAME_LENGTH + ".pdf".len());
        assert!(random.ends_with(".pdf"));
        assert!(random[..RANDOM_NAME_LENGTH].chars().all(|c| c.is_ascii_alphanumeric()));

        let suffixed = resolve("report.pdf", dir.path(), FileNameFormat::RandomSuffix).await;
        assert!(suffixed.starts_with("report."));
        assert!(suffixed.ends_with(".pdf"));
        assert_eq!(suffixed.len(), "report.".len() + RANDOM_NAME_LENGTH + ".pdf".len());
    }

    #[tokio::test]
    async fn test_increment_skips_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.0001.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("photo.0002.jpg"), b"x").unwrap();

        let name = resolve("photo.jpg", dir.path(), FileNameFormat::Increment).await;

        assert_eq!(name, "photo.0003.jpg");
    }

    #[tokio::test]
    async fn test_increment_returns_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = HashSet::new();

        for _ in 0..5 {
            let name = resolve("notes", dir.path(), FileNameFormat::Increment).await;
            assert!(!dir.path().join(&name).exists());
            std::fs::write(dir.path().join(&name), b"").unwrap();
            assert!(seen.insert(name));
        }

        assert!(seen.contains("notes.0005"));
    }

    #[test]
    fn test_is_valid_filename() {
        assert!(is_valid_filename("hello_world.txt"));
        assert!(is_valid_filename("ünïcödé.mov"));
        assert!(is_valid_filename(".bashrc"));

        assert!(!is_valid_filename(""));
        assert!(!is_valid_filename(".."));
        assert!(!is_valid_filename("../etc/passwd"));
        assert!(!is_valid_filename("a\\b"));
        assert!(!is_valid_filename("what?.txt"));
        assert!(!is_valid_filename("tab\there"));
        assert!(!is_valid_filename("trailing."));
        assert!(!is_valid_filename("con.txt"));
        assert!(!is_valid_filename("LPT1"));
        assert!(is_valid_filename("LPT0"));
        assert!(!is_valid_filename(&"a".repeat(256)));
    }
}
