//! Terminal output for the autosort binary.
//!
//! Colored status lines, a spinner for runs in progress, and the per-category
//! summary table. Library code never prints; it reports through log sinks and
//! `tracing`, and the CLI decides how that looks here.

use crate::categories::{CategoryMap, FALLBACK_CATEGORY};
use crate::sorter::RunStats;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages all CLI output with consistent styling.
///
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - A spinner for runs in progress
/// - Summary tables with statistics
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// OutputFormatter::success("Sorting completed.");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a ticking spinner for a run whose file count isn't known yet.
    ///
    /// Lines printed through [`ProgressBar::println`] appear above it.
    pub fn create_spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} ({pos} moved)")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }

    /// Prints the per-category counts of a run.
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// use autosort::sorter::RunStats;
    ///
    /// OutputFormatter::summary_table(&RunStats::default(), 0, 0);
    /// ```
    pub fn summary_table(stats: &RunStats, total_files: usize, moved_files: usize) {
        Self::header("SUMMARY");

        let max_category_len = stats
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in stats.iter().filter(|(_, count)| *count > 0) {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                file_word(count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} of {} {}",
            "Moved".bold(),
            moved_files.to_string().green().bold(),
            total_files,
            file_word(total_files),
            width = max_category_len
        );
        if moved_files < total_files {
            Self::warning(&format!(
                "{} file(s) could not be moved; see the log above",
                total_files - moved_files
            ));
        }
    }

    /// Prints every category with its extensions.
    pub fn category_table(categories: &CategoryMap) {
        Self::header("CATEGORIES");
        let width = categories.names().map(str::len).max().unwrap_or(0);
        for (name, extensions) in categories.iter() {
            println!(
                "{:<width$}  {}",
                name.bold(),
                category_label(name, extensions),
                width = width
            );
        }
    }
}

fn file_word(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Extension list shown next to a category. Only the fallback is labelled as such.
fn category_label(name: &str, extensions: &[String]) -> String {
    let listed = extensions.join(", ");
    match (name == FALLBACK_CATEGORY, extensions.is_empty()) {
        (true, true) => "(fallback for everything else)".dimmed().to_string(),
        (true, false) => format!("{} {}", listed, "(and everything else)".dimmed()),
        (false, true) => "(no extensions)".dimmed().to_string(),
        (false, false) => listed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_word() {
        assert_eq!(file_word(1), "file");
        assert_eq!(file_word(0), "files");
        assert_eq!(file_word(7), "files");
    }

    #[test]
    fn test_only_fallback_is_labelled_fallback() {
        let empty: Vec<String> = Vec::new();
        assert!(category_label(FALLBACK_CATEGORY, &empty).contains("fallback"));

        let ebooks = category_label("Ebooks", &empty);
        assert!(!ebooks.contains("fallback"));
        assert!(ebooks.contains("no extensions"));

        let docs = category_label("Documents", &["pdf".to_string(), "txt".to_string()]);
        assert_eq!(docs, "pdf, txt");

        let others = category_label(FALLBACK_CATEGORY, &["tmp".to_string()]);
        assert!(others.starts_with("tmp "));
        assert!(others.contains("everything else"));
    }
}
