/// The sort engine: moves the files of a flat source directory into category
/// subdirectories of a target directory.
///
/// One call to [`SortEngine::run`] is one run. It lists the immediate entries of
/// the source directory, skips directories, classifies every other entry by
/// extension and moves it, replacing whatever already sits at the destination.
/// A file that can't be moved is reported through the [`LogSink`] and skipped;
/// only a source directory that can't be listed fails the run.
use crate::categories::{CategoryMap, FALLBACK_CATEGORY, extension_of};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where files without an extension go when sorting by extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionlessPlacement {
    /// Straight into the category directory, next to the extension folders.
    #[default]
    CategoryRoot,
    /// Into a subdirectory literally named `null`. Older versions of this tool
    /// produced that layout by accident; kept so existing trees stay consistent.
    NullFolder,
}

const NULL_FOLDER: &str = "null";

/// Everything one run needs, captured when the run starts.
///
/// The category map sits behind an `Arc` so a scheduler can hand the same
/// snapshot to many runs without copying it.
#[derive(Debug, Clone)]
pub struct SortRequest {
    pub source: PathBuf,
    pub target: PathBuf,
    pub categories: Arc<CategoryMap>,
    pub separate_by_extension: bool,
    pub extensionless: ExtensionlessPlacement,
}

impl SortRequest {
    /// Creates a request using the default category set.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            categories: Arc::new(CategoryMap::default()),
            separate_by_extension: false,
            extensionless: ExtensionlessPlacement::default(),
        }
    }

    pub fn with_categories(mut self, categories: CategoryMap) -> Self {
        self.categories = Arc::new(categories);
        self
    }

    pub fn separate_by_extension(mut self, separate: bool) -> Self {
        self.separate_by_extension = separate;
        self
    }

    pub fn with_extensionless(mut self, placement: ExtensionlessPlacement) -> Self {
        self.extensionless = placement;
        self
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SortRunResult {
    /// Non-directory entries found at the top level of the source directory.
    pub total_files: usize,
    /// Entries the move primitive succeeded for.
    pub moved_files: usize,
}

/// Files moved per category during one run.
///
/// Every category of the run's map has an entry, including those that received
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RunStats {
    counts: BTreeMap<String, usize>,
}

impl RunStats {
    fn reset(categories: &CategoryMap) -> Self {
        Self {
            counts: categories.names().map(|name| (name.to_string(), 0)).collect(),
        }
    }

    fn record(&mut self, category: &str) {
        *self.counts.entry(category.to_string()).or_insert(0) += 1;
    }

    /// Files moved into `category`, or `None` if it wasn't part of the run.
    pub fn get(&self, category: &str) -> Option<usize> {
        self.counts.get(category).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Sum over all categories; equals the run's moved count.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Receives one human-readable line per event of a run.
pub trait LogSink {
    fn line(&mut self, line: &str);
}

impl<F> LogSink for F
where
    F: FnMut(&str),
{
    fn line(&mut self, line: &str) {
        self(line)
    }
}

/// Errors that fail a whole run.
#[derive(Debug, Error)]
pub enum SortError {
    /// The source directory is missing, unreadable, or failed mid-listing.
    #[error("Error reading source directory {}: {source}", path.display())]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A single file that couldn't be moved. Recovered from inside the run.
#[derive(Debug, Error)]
#[error(
    "Failed to move {} to {}: {cause}{}",
    source_path.display(),
    destination.display(),
    copy_note(*copy_left)
)]
pub struct FileMoveError {
    pub source_path: PathBuf,
    pub destination: PathBuf,
    #[source]
    pub cause: io::Error,
    /// The file was copied to the destination but the original couldn't be
    /// removed, so it now exists in both places.
    pub copy_left: bool,
}

fn copy_note(copy_left: bool) -> &'static str {
    if copy_left {
        " (a copy was left at the destination)"
    } else {
        ""
    }
}

/// Result type for sort runs.
pub type SortResult<T> = Result<T, SortError>;

/// Runs sorts and keeps the statistics of the latest one.
#[derive(Debug, Default)]
pub struct SortEngine {
    stats: RunStats,
}

impl SortEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts the top-level files of `request.source` into `request.target`.
    ///
    /// Entries are handled one at a time in directory-listing order. Each
    /// destination's parent directories are created as needed and an existing
    /// file at the destination is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::DirectoryRead`] if the source directory can't be
    /// listed. Per-file failures never fail the run.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autosort::sorter::{SortEngine, SortRequest};
    ///
    /// let request = SortRequest::new("/home/me/Downloads", "/home/me/Sorted");
    /// let mut engine = SortEngine::new();
    /// let result = engine.run(&request, &mut |line: &str| println!("{}", line))?;
    /// println!("moved {} of {}", result.moved_files, result.total_files);
    /// # Ok::<(), autosort::sorter::SortError>(())
    /// ```
    pub fn run(
        &mut self,
        request: &SortRequest,
        sink: &mut dyn LogSink,
    ) -> SortResult<SortRunResult> {
        let categories = effective_categories(&request.categories);
        self.stats = RunStats::reset(&categories);

        let read_error = |source| SortError::DirectoryRead {
            path: request.source.clone(),
            source,
        };
        let entries = fs::read_dir(&request.source).map_err(read_error)?;

        let mut result = SortRunResult::default();
        for entry in entries {
            let entry = entry.map_err(read_error)?;
            let path = entry.path();
            if path.is_dir() {
                debug!(path = %path.display(), "skipping directory");
                continue;
            }

            result.total_files += 1;

            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let category = categories.classify(&name);
            let destination = destination_for(request, category, &name, &file_name);
            debug!(file = %name, category, destination = %destination.display(), "classified");

            match move_file(&path, &destination) {
                Ok(()) => {
                    result.moved_files += 1;
                    self.stats.record(category);
                    info!(from = %path.display(), to = %destination.display(), "moved");
                    sink.line(&format!("Moved: {} -> {}", path.display(), destination.display()));
                }
                Err(e) => {
                    warn!(
                        file = %path.display(),
                        error = %e.cause,
                        copy_left = e.copy_left,
                        "move failed"
                    );
                    sink.line(&format!(
                        "Failed to move {}: {}{}",
                        path.display(),
                        e.cause,
                        copy_note(e.copy_left)
                    ));
                }
            }
        }

        info!(
            source = %request.source.display(),
            total = result.total_files,
            moved = result.moved_files,
            "sort run finished"
        );
        sink.line(&format!(
            "Sorted {} of {} file(s) from {}",
            result.moved_files,
            result.total_files,
            request.source.display()
        ));

        Ok(result)
    }

    /// Per-category counts of the most recent run.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn into_stats(self) -> RunStats {
        self.stats
    }
}

/// Copies the caller's map, making sure the fallback category is present.
fn effective_categories(categories: &CategoryMap) -> CategoryMap {
    let mut effective = categories.clone();
    // Maps built through this crate always carry the fallback; this is a no-op then.
    let _ = effective.add_category(FALLBACK_CATEGORY);
    effective
}

/// Computes where a file lands.
///
/// `target/<category>/<file>`, or `target/<category>/<ext>/<file>` when sorting
/// by extension.
pub fn destination_for(
    request: &SortRequest,
    category: &str,
    name: &str,
    file_name: &std::ffi::OsStr,
) -> PathBuf {
    let category_dir = request.target.join(category);
    if !request.separate_by_extension {
        return category_dir.join(file_name);
    }

    match (extension_of(name), request.extensionless) {
        (Some(ext), _) => category_dir.join(ext).join(file_name),
        (None, ExtensionlessPlacement::CategoryRoot) => category_dir.join(file_name),
        (None, ExtensionlessPlacement::NullFolder) => {
            category_dir.join(NULL_FOLDER).join(file_name)
        }
    }
}

/// Moves `source` to `destination`, creating parent directories and
/// replacing an existing file.
///
/// Falls back to [`copy_then_remove`] when the two paths live on different
/// filesystems.
pub fn move_file(source: &Path, destination: &Path) -> Result<(), FileMoveError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|cause| move_error(source, destination, cause, false))?;
    }

    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                from = %source.display(),
                to = %destination.display(),
                "cross-device move, copying"
            );
            copy_then_remove(source, destination)
        }
        Err(e) => Err(move_error(source, destination, e, false)),
    }
}

/// Copies `source` over `destination`, then deletes `source`. Not atomic.
///
/// If the copy succeeds but the delete fails, the error has `copy_left` set.
pub fn copy_then_remove(source: &Path, destination: &Path) -> Result<(), FileMoveError> {
    fs::copy(source, destination)
        .map_err(|cause| move_error(source, destination, cause, false))?;
    fs::remove_file(source).map_err(|cause| move_error(source, destination, cause, true))
}

fn move_error(
    source: &Path,
    destination: &Path,
    cause: io::Error,
    copy_left: bool,
) -> FileMoveError {
    FileMoveError {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        cause,
        copy_left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source");
        let target = temp_dir.path().join("target");
        fs::create_dir(&source).expect("Failed to create source directory");
        (temp_dir, source, target)
    }

    fn run(request: &SortRequest) -> (SortResult<SortRunResult>, RunStats, Vec<String>) {
        let mut lines = Vec::new();
        let mut engine = SortEngine::new();
        let result = engine.run(request, &mut |line: &str| lines.push(line.to_string()));
        (result, engine.into_stats(), lines)
    }

    #[test]
    fn test_sorts_default_scenario() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("a.pdf"), "pdf").unwrap();
        fs::write(source.join("b.jpg"), "jpg").unwrap();
        fs::write(source.join("c"), "no extension").unwrap();
        fs::create_dir(source.join("sub")).unwrap();
        fs::write(source.join("sub").join("inner.pdf"), "nested").unwrap();

        let (result, stats, _) = run(&SortRequest::new(&source, &target));
        let result = result.expect("run failed");

        assert_eq!(result, SortRunResult { total_files: 3, moved_files: 3 });
        assert!(target.join("Documents").join("a.pdf").is_file());
        assert!(target.join("Images").join("b.jpg").is_file());
        assert!(target.join("Others").join("c").is_file());
        assert!(source.join("sub").join("inner.pdf").is_file());
        assert_eq!(stats.get("Documents"), Some(1));
        assert_eq!(stats.get("Images"), Some(1));
        assert_eq!(stats.get("Others"), Some(1));
        assert_eq!(stats.get("Videos"), Some(0));
        assert_eq!(stats.total(), result.moved_files);
    }

    #[test]
    fn test_separate_by_extension() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("x.mp3"), "audio").unwrap();

        let request = SortRequest::new(&source, &target).separate_by_extension(true);
        let (result, _, _) = run(&request);

        assert_eq!(result.unwrap().moved_files, 1);
        assert!(target.join("Audio").join("mp3").join("x.mp3").is_file());
    }

    #[test]
    fn test_separate_by_extension_lowercases_folder() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("Photo.JPG"), "jpg").unwrap();

        let request = SortRequest::new(&source, &target).separate_by_extension(true);
        run(&request).0.unwrap();

        assert!(target.join("Images").join("jpg").join("Photo.JPG").is_file());
    }

    #[test]
    fn test_extensionless_goes_to_category_root_by_default() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("Makefile"), "all:").unwrap();

        let request = SortRequest::new(&source, &target).separate_by_extension(true);
        run(&request).0.unwrap();

        assert!(target.join("Others").join("Makefile").is_file());
        assert!(!target.join("Others").join("null").exists());
    }

    #[test]
    fn test_extensionless_null_folder_placement() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("Makefile"), "all:").unwrap();

        let request = SortRequest::new(&source, &target)
            .separate_by_extension(true)
            .with_extensionless(ExtensionlessPlacement::NullFolder);
        run(&request).0.unwrap();

        assert!(target.join("Others").join("null").join("Makefile").is_file());
    }

    #[test]
    fn test_overwrites_existing_destination() {
        let (_tmp, source, target) = setup();
        fs::create_dir_all(target.join("Documents")).unwrap();
        fs::write(target.join("Documents").join("notes.txt"), "old").unwrap();
        fs::write(source.join("notes.txt"), "new").unwrap();

        let (result, _, _) = run(&SortRequest::new(&source, &target));

        assert_eq!(result.unwrap().moved_files, 1);
        let content = fs::read_to_string(target.join("Documents").join("notes.txt")).unwrap();
        assert_eq!(content, "new");
        assert!(!source.join("notes.txt").exists());
    }

    #[test]
    fn test_second_run_is_empty() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("a.pdf"), "pdf").unwrap();

        let request = SortRequest::new(&source, &target);
        run(&request).0.unwrap();
        let (result, stats, _) = run(&request);

        assert_eq!(result.unwrap(), SortRunResult::default());
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_missing_source_fails_run() {
        let (tmp, _, target) = setup();
        let missing = tmp.path().join("does-not-exist");

        let (result, _, lines) = run(&SortRequest::new(&missing, &target));

        match result {
            Err(SortError::DirectoryRead { path, source }) => {
                assert_eq!(path, missing);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected DirectoryRead, got {:?}", other),
        }
        assert!(lines.is_empty());
        assert!(!target.exists());
    }

    #[test]
    fn test_move_failure_is_skipped() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("a.pdf"), "pdf").unwrap();
        fs::write(source.join("b.jpg"), "jpg").unwrap();
        // A directory sitting where the file should land makes that one move fail.
        fs::create_dir_all(target.join("Documents").join("a.pdf").join("blocker")).unwrap();

        let (result, stats, lines) = run(&SortRequest::new(&source, &target));
        let result = result.expect("run should survive a failed move");

        assert_eq!(result.total_files, 2);
        assert_eq!(result.moved_files, 1);
        assert_eq!(stats.get("Documents"), Some(0));
        assert_eq!(stats.get("Images"), Some(1));
        assert!(source.join("a.pdf").is_file());
        assert!(lines.iter().any(|l| l.starts_with("Failed to move")));
    }

    #[test]
    fn test_log_lines() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("a.pdf"), "pdf").unwrap();

        let (_, _, lines) = run(&SortRequest::new(&source, &target));

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Moved: "));
        assert!(lines[0].contains("a.pdf"));
        assert!(lines[1].starts_with("Sorted 1 of 1 file(s)"));
    }

    #[test]
    fn test_stats_cover_custom_categories() {
        let (_tmp, source, target) = setup();
        fs::write(source.join("book.epub"), "epub").unwrap();

        let mut categories = CategoryMap::empty();
        categories.add_category("Ebooks").unwrap();
        categories.add_extension("Ebooks", "epub").unwrap();
        let request = SortRequest::new(&source, &target).with_categories(categories);
        let (_, stats, _) = run(&request);

        assert_eq!(stats.get("Ebooks"), Some(1));
        assert_eq!(stats.get(FALLBACK_CATEGORY), Some(0));
        assert_eq!(stats.get("Documents"), None);
    }

    #[test]
    fn test_move_file_creates_nested_parents() {
        let (_tmp, source, target) = setup();
        let file = source.join("deep.txt");
        fs::write(&file, "content").unwrap();
        let destination = target.join("a").join("b").join("deep.txt");

        move_file(&file, &destination).expect("move failed");

        assert!(destination.is_file());
        assert!(!file.exists());
    }

    #[test]
    fn test_move_file_missing_source() {
        let (_tmp, source, target) = setup();
        let err = move_file(&source.join("ghost.txt"), &target.join("ghost.txt")).unwrap_err();
        assert_eq!(err.cause.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("ghost.txt"));
        assert!(!err.copy_left);
    }

    #[test]
    fn test_copy_then_remove() {
        let (_tmp, source, target) = setup();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), "content").unwrap();
        fs::write(target.join("a.txt"), "old").unwrap();

        copy_then_remove(&source.join("a.txt"), &target.join("a.txt")).unwrap();

        assert!(!source.join("a.txt").exists());
        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "content");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_then_remove_reports_leftover_copy() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, source, target) = setup();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), "content").unwrap();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o500)).unwrap();

        // Root ignores permission bits; the delete would succeed.
        let writes_denied = fs::write(source.join("write-check"), "").is_err();
        let result = copy_then_remove(&source.join("a.txt"), &target.join("a.txt"));
        fs::set_permissions(&source, fs::Permissions::from_mode(0o700)).unwrap();
        if !writes_denied {
            return;
        }

        let err = result.unwrap_err();
        assert!(err.copy_left);
        assert_eq!(err.cause.kind(), io::ErrorKind::PermissionDenied);
        assert!(err.to_string().ends_with("(a copy was left at the destination)"));
        assert!(source.join("a.txt").exists());
        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "content");
    }

    #[test]
    fn test_destination_for() {
        let request = SortRequest::new("/src", "/dst");
        let name = std::ffi::OsStr::new("a.PDF");
        assert_eq!(
            destination_for(&request, "Documents", "a.PDF", name),
            PathBuf::from("/dst/Documents/a.PDF")
        );

        let request = request.separate_by_extension(true);
        assert_eq!(
            destination_for(&request, "Documents", "a.PDF", name),
            PathBuf::from("/dst/Documents/pdf/a.PDF")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_counts_as_file() {
        let (tmp, source, target) = setup();
        std::os::unix::fs::symlink(tmp.path().join("nowhere"), source.join("link.pdf")).unwrap();

        let (result, _, _) = run(&SortRequest::new(&source, &target));

        let result = result.unwrap();
        assert_eq!(result.total_files, 1);
        assert_eq!(result.moved_files, 1);
        assert!(fs::symlink_metadata(target.join("Documents").join("link.pdf")).is_ok());
    }
}
