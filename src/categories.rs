/// Category definitions and extension-based file classification.
///
/// A [`CategoryMap`] maps user-defined category names to the file extensions
/// they claim. Classification looks only at the file name: everything after the
/// last `.` is the extension, compared case-insensitively.
///
/// # Examples
///
/// ```
/// use autosort::categories::CategoryMap;
///
/// let map = CategoryMap::default();
/// assert_eq!(map.classify("report.pdf"), "Documents");
/// assert_eq!(map.classify("holiday.JPG"), "Images");
/// assert_eq!(map.classify("README"), "Others");
/// ```
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// The reserved fallback category. It always exists and can't be removed or renamed.
pub const FALLBACK_CATEGORY: &str = "Others";

/// Errors raised while editing a [`CategoryMap`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    /// The operation would remove or rename the fallback category.
    #[error("\"{0}\" is reserved and cannot be removed or renamed")]
    ReservedCategory(String),
    /// No category with this name exists.
    #[error("unknown category \"{0}\"")]
    UnknownCategory(String),
    /// A category with this name already exists.
    #[error("a category named \"{0}\" already exists")]
    DuplicateCategory(String),
    /// Category names can't be blank.
    #[error("category name cannot be empty")]
    EmptyName,
    /// Extensions can't be blank.
    #[error("extension cannot be empty")]
    EmptyExtension,
}

/// Mapping of category name to the extensions it claims.
///
/// Extensions are stored lower-cased, without a leading dot, and de-duplicated
/// within a category. The same extension may still appear in two categories;
/// see [`CategoryMap::classify`] for what that means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>", into = "BTreeMap<String, Vec<String>>")]
pub struct CategoryMap {
    categories: BTreeMap<String, Vec<String>>,
}

impl CategoryMap {
    /// Creates a map holding only the empty fallback category.
    pub fn empty() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(FALLBACK_CATEGORY.to_string(), Vec::new());
        Self { categories }
    }

    /// Creates the built-in default set: Documents, Images, Videos, Audio,
    /// Archives and Programs, plus the empty fallback.
    pub fn new() -> Self {
        let mut map = Self::empty();
        map.populate_defaults();
        map
    }

    fn populate_defaults(&mut self) {
        let defaults: [(&str, &[&str]); 6] = [
            (
                "Documents",
                &[
                    "pdf", "doc", "docx", "txt", "xls", "xlsx", "ppt", "pptx", "csv", "odt", "rtf",
                ],
            ),
            (
                "Images",
                &[
                    "jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "ico", "tiff", "raw",
                ],
            ),
            (
                "Videos",
                &[
                    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg",
                ],
            ),
            (
                "Audio",
                &["mp3", "wav", "flac", "aac", "m4a", "ogg", "wma", "opus"],
            ),
            (
                "Archives",
                &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "iso"],
            ),
            (
                "Programs",
                &["exe", "msi", "apk", "deb", "rpm", "dmg", "pkg", "jar"],
            ),
        ];

        for (name, extensions) in defaults {
            self.categories.insert(
                name.to_string(),
                extensions.iter().map(|ext| ext.to_string()).collect(),
            );
        }
    }

    /// Returns the category names in lookup order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Iterates over `(category, extensions)` pairs in lookup order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(name, exts)| (name.as_str(), exts.as_slice()))
    }

    /// Returns the extensions registered for `category`.
    pub fn extensions(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Adds an empty category. Returns `false` if it already existed.
    pub fn add_category(&mut self, name: &str) -> Result<bool, CategoryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CategoryError::EmptyName);
        }
        if self.categories.contains_key(name) {
            return Ok(false);
        }
        self.categories.insert(name.to_string(), Vec::new());
        Ok(true)
    }

    /// Removes a category and its extensions.
    pub fn remove_category(&mut self, name: &str) -> Result<Vec<String>, CategoryError> {
        if name == FALLBACK_CATEGORY {
            return Err(CategoryError::ReservedCategory(name.to_string()));
        }
        self.categories
            .remove(name)
            .ok_or_else(|| CategoryError::UnknownCategory(name.to_string()))
    }

    /// Renames a category, keeping its extensions.
    pub fn rename_category(&mut self, old: &str, new: &str) -> Result<(), CategoryError> {
        if old == FALLBACK_CATEGORY {
            return Err(CategoryError::ReservedCategory(old.to_string()));
        }
        let new = new.trim();
        if new.is_empty() {
            return Err(CategoryError::EmptyName);
        }
        if !self.categories.contains_key(old) {
            return Err(CategoryError::UnknownCategory(old.to_string()));
        }
        if self.categories.contains_key(new) {
            return Err(CategoryError::DuplicateCategory(new.to_string()));
        }

        let extensions = self.categories.remove(old).unwrap_or_default();
        self.categories.insert(new.to_string(), extensions);
        Ok(())
    }

    /// Registers an extension for a category.
    ///
    /// Accepts `".PDF"`, `"pdf"` or `" Pdf "` alike. Returns `false` if the
    /// category already claimed the extension.
    pub fn add_extension(&mut self, category: &str, ext: &str) -> Result<bool, CategoryError> {
        let ext = normalize_extension(ext).ok_or(CategoryError::EmptyExtension)?;
        let extensions = self
            .categories
            .get_mut(category)
            .ok_or_else(|| CategoryError::UnknownCategory(category.to_string()))?;

        if extensions.contains(&ext) {
            return Ok(false);
        }
        extensions.push(ext);
        Ok(true)
    }

    /// Unregisters an extension. Returns `false` if it wasn't registered.
    pub fn remove_extension(&mut self, category: &str, ext: &str) -> Result<bool, CategoryError> {
        let ext = normalize_extension(ext).ok_or(CategoryError::EmptyExtension)?;
        let extensions = self
            .categories
            .get_mut(category)
            .ok_or_else(|| CategoryError::UnknownCategory(category.to_string()))?;

        let before = extensions.len();
        extensions.retain(|existing| *existing != ext);
        Ok(extensions.len() != before)
    }

    /// Returns the category a file with this name belongs to.
    ///
    /// Files without an extension, or whose name ends in `.`, go to
    /// [`FALLBACK_CATEGORY`], as do extensions no category claims.
    ///
    /// When several categories claim the same extension, which one wins is
    /// unspecified. The current implementation returns the first in name order,
    /// but callers should not rely on it; [`CategoryMap::overlapping_extensions`]
    /// reports such conflicts.
    pub fn classify(&self, file_name: &str) -> &str {
        let Some(ext) = extension_of(file_name) else {
            return FALLBACK_CATEGORY;
        };

        self.categories
            .iter()
            .find(|(_, extensions)| extensions.contains(&ext))
            .map(|(name, _)| name.as_str())
            .unwrap_or(FALLBACK_CATEGORY)
    }

    /// Returns every extension claimed by more than one category, with the
    /// categories claiming it.
    pub fn overlapping_extensions(&self) -> BTreeMap<String, Vec<String>> {
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, extensions) in &self.categories {
            for ext in extensions {
                owners.entry(ext.clone()).or_default().push(name.clone());
            }
        }
        owners.retain(|_, names| names.len() > 1);
        owners
    }
}

impl Default for CategoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BTreeMap<String, Vec<String>>> for CategoryMap {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, extensions) in raw {
            // Same rule as add_category: names are trimmed and never blank.
            let name = name.trim();
            if name.is_empty() {
                warn!(?extensions, "ignoring category with an empty name");
                continue;
            }
            let normalized = categories.entry(name.to_string()).or_default();
            for ext in extensions.iter().filter_map(|ext| normalize_extension(ext)) {
                if !normalized.contains(&ext) {
                    normalized.push(ext);
                }
            }
        }
        categories
            .entry(FALLBACK_CATEGORY.to_string())
            .or_insert_with(Vec::new);
        Self { categories }
    }
}

impl From<CategoryMap> for BTreeMap<String, Vec<String>> {
    fn from(map: CategoryMap) -> Self {
        map.categories
    }
}

/// Extracts the lower-cased extension of a file name.
///
/// Returns `None` if the name has no `.` or ends with one.
///
/// ```
/// use autosort::categories::extension_of;
///
/// assert_eq!(extension_of("archive.tar.GZ").as_deref(), Some("gz"));
/// assert_eq!(extension_of("Makefile"), None);
/// assert_eq!(extension_of("weird."), None);
/// ```
pub fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

fn normalize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim();
    let ext = ext.strip_prefix('.').unwrap_or(ext).to_lowercase();
    if ext.is_empty() { None } else { Some(ext) }
}
