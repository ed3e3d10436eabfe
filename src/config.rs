//! Settings file for autosort.
//!
//! Settings are stored in TOML and hold everything the sorter needs between
//! runs: the source and target directories, the separate-by-extension flag,
//! the default interval for periodic sorting and the category map.
//!
//! # Configuration File Format
//!
//! ```toml
//! source = "/home/me/Downloads"
//! target = "/home/me/SortedFiles"
//! separate_by_extension = false
//! interval_minutes = 5
//! extensionless = "category-root"
//!
//! [categories]
//! Documents = ["pdf", "docx"]
//! Images = ["png", "jpg"]
//! Others = []
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use crate::categories::{CategoryError, CategoryMap};
use crate::sorter::{ExtensionlessPlacement, SortRequest};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Name of the per-directory settings file.
pub const LOCAL_CONFIG_FILE: &str = ".autosortrc.toml";

/// Errors in configuration: the settings file itself, or values handed to a
/// trigger that make a run impossible.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested settings file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration in {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// IO error while reading or writing settings.
    #[error("IO error on configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Settings could not be turned back into TOML.
    #[error("Could not serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// The interval is not a positive whole number of minutes.
    #[error("Invalid interval '{0}': enter a positive integer (minutes)")]
    InvalidPeriod(String),
    /// No source directory was given.
    #[error("Source directory is not set")]
    EmptySourcePath,
    /// No target directory was given.
    #[error("Target directory is not set")]
    EmptyTargetPath,
    /// A category edit was rejected.
    #[error(transparent)]
    Category(#[from] CategoryError),
}

/// Persistent settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SorterConfig {
    pub source: PathBuf,
    pub target: PathBuf,
    pub separate_by_extension: bool,
    pub interval_minutes: i64,
    pub extensionless: ExtensionlessPlacement,
    pub categories: CategoryMap,
}

impl Default for SorterConfig {
    fn default() -> Self {
        let home = home_dir().unwrap_or_default();
        Self {
            source: home.join("Downloads"),
            target: home.join("SortedFiles"),
            separate_by_extension: false,
            interval_minutes: 5,
            extensionless: ExtensionlessPlacement::default(),
            categories: CategoryMap::default(),
        }
    }
}

impl SorterConfig {
    /// Load settings, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.autosortrc.toml` in the current directory
    /// 3. Look for `~/.config/autosort/config.toml` in the home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found (or explicitly given) but cannot be
    /// read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::locate(config_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Finds the settings file [`SorterConfig::load`] would read, if any.
    pub fn locate(config_path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Ok(Some(local_config));
        }

        Ok(user_config_path().filter(|path| path.exists()))
    }

    /// Path that edits should be written to: the explicit path, an existing
    /// settings file, or the per-user location.
    pub fn writable_path(config_path: Option<&Path>) -> PathBuf {
        if let Some(path) = config_path {
            return path.to_path_buf();
        }
        if let Ok(Some(existing)) = Self::locate(None) {
            return existing;
        }
        user_config_path().unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE))
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write settings to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, content).map_err(io_error)
    }

    /// Snapshot of these settings as a sort request.
    pub fn to_request(&self) -> SortRequest {
        SortRequest {
            source: self.source.clone(),
            target: self.target.clone(),
            categories: Arc::new(self.categories.clone()),
            separate_by_extension: self.separate_by_extension,
            extensionless: self.extensionless,
        }
    }
}

/// Checks that a request names both directories.
pub fn validate_request(request: &SortRequest) -> Result<(), ConfigError> {
    if request.source.as_os_str().is_empty() {
        return Err(ConfigError::EmptySourcePath);
    }
    if request.target.as_os_str().is_empty() {
        return Err(ConfigError::EmptyTargetPath);
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn user_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config").join("autosort").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::FALLBACK_CATEGORY;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SorterConfig::default();
        assert!(!config.separate_by_extension);
        assert_eq!(config.interval_minutes, 5);
        assert_eq!(config.extensionless, ExtensionlessPlacement::CategoryRoot);
        assert!(config.source.ends_with("Downloads"));
        assert!(config.target.ends_with("SortedFiles"));
        assert_eq!(config.categories, CategoryMap::default());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.toml");
        let result = SorterConfig::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::NotFound(p)) if p == path));
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
source = "/data/in"
separate_by_extension = true
extensionless = "null-folder"
"#,
        )
        .unwrap();

        let config = SorterConfig::load(Some(&path)).unwrap();
        assert_eq!(config.source, PathBuf::from("/data/in"));
        assert!(config.separate_by_extension);
        assert_eq!(config.extensionless, ExtensionlessPlacement::NullFolder);
        assert_eq!(config.interval_minutes, 5);
        assert_eq!(config.categories, CategoryMap::default());
    }

    #[test]
    fn test_load_custom_categories_adds_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[categories]
Ebooks = [".EPUB", "mobi"]
"#,
        )
        .unwrap();

        let config = SorterConfig::load(Some(&path)).unwrap();
        assert_eq!(config.categories.len(), 2);
        assert!(config.categories.contains(FALLBACK_CATEGORY));
        assert_eq!(config.categories.classify("book.epub"), "Ebooks");
        assert_eq!(config.categories.classify("report.pdf"), FALLBACK_CATEGORY);
    }

    #[test]
    fn test_load_blank_category_names() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[categories]
"" = ["pdf"]
"   " = ["png"]
" Ebooks " = ["epub"]
Ebooks = ["mobi"]
"#,
        )
        .unwrap();

        let config = SorterConfig::load(Some(&path)).unwrap();
        let names: Vec<&str> = config.categories.names().collect();
        assert_eq!(names, vec!["Ebooks", FALLBACK_CATEGORY]);
        assert_eq!(config.categories.classify("a.pdf"), FALLBACK_CATEGORY);
        assert_eq!(config.categories.classify("b.png"), FALLBACK_CATEGORY);
        assert_eq!(config.categories.classify("c.epub"), "Ebooks");
        assert_eq!(config.categories.classify("d.mobi"), "Ebooks");

        let request = config.to_request();
        let destination = crate::sorter::destination_for(
            &request,
            config.categories.classify("a.pdf"),
            "a.pdf",
            std::ffi::OsStr::new("a.pdf"),
        );
        assert_eq!(destination, request.target.join(FALLBACK_CATEGORY).join("a.pdf"));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "separate_by_extension = \"maybe\"").unwrap();

        let result = SorterConfig::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = SorterConfig::default();
        config.source = PathBuf::from("/in");
        config.interval_minutes = 15;
        config.categories.add_category("Ebooks").unwrap();
        config.categories.add_extension("Ebooks", "epub").unwrap();
        config.save(&path).expect("save failed");

        let reloaded = SorterConfig::load_from_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_to_request() {
        let mut config = SorterConfig::default();
        config.source = PathBuf::from("/in");
        config.target = PathBuf::from("/out");
        config.separate_by_extension = true;

        let request = config.to_request();
        assert_eq!(request.source, PathBuf::from("/in"));
        assert_eq!(request.target, PathBuf::from("/out"));
        assert!(request.separate_by_extension);
        assert_eq!(*request.categories, config.categories);
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&SortRequest::new("/in", "/out")).is_ok());
        assert!(matches!(
            validate_request(&SortRequest::new("", "/out")),
            Err(ConfigError::EmptySourcePath)
        ));
        assert!(matches!(
            validate_request(&SortRequest::new("/in", "")),
            Err(ConfigError::EmptyTargetPath)
        ));
    }

    #[test]
    fn test_writable_path_prefers_explicit() {
        let path = Path::new("/tmp/explicit.toml");
        assert_eq!(SorterConfig::writable_path(Some(path)), path);
    }
}
