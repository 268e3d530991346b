//! Mapping lines and input files.
//!
//! A mapping line is `original<TAB>perfected`. Only the first tab separates
//! the two fields.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

const FIELD_SEPARATOR: u8 = b'\t';

/// One `original<TAB>perfected` line of a mapping file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Filename as it exists today
    pub original: String,

    /// Suggested replacement filename
    pub perfected: String,
}

impl MappingEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(original: impl Into<String>, perfected: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            perfected: perfected.into(),
        }
    }

    /// Parses a TSV line, splitting on the first tab.
    ///
    /// The line is trimmed first. Returns `None` for lines without a tab.
    ///
    /// # Examples
    ///
    /// ```
    /// use rename_forge::MappingEntry;
    ///
    /// let entry = MappingEntry::parse("Foo.mkv\tFoo (2020).mkv").unwrap();
    /// assert_eq!(entry.original, "Foo.mkv");
    /// assert_eq!(entry.perfected, "Foo (2020).mkv");
    ///
    /// assert!(MappingEntry::parse("no tab here").is_none());
    /// ```
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let pos = memchr::memchr(FIELD_SEPARATOR, line.as_bytes())?;
        // Tab is ASCII, so both slices sit on char boundaries.
        Some(Self::new(&line[..pos], &line[pos + 1..]))
    }

    /// Serializes the entry without a trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{}\t{}", self.original, self.perfected)
    }
}

impl fmt::Display for MappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.original, self.perfected)
    }
}

/// Returns the original-filename field of a mapping line.
///
/// Lines without a tab are treated as a single field.
#[must_use]
pub fn original_field(line: &str) -> &str {
    let line = line.trim();
    match memchr::memchr(FIELD_SEPARATOR, line.as_bytes()) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Returns true if `text` contains at least one field separator.
#[must_use]
pub fn has_separator(text: &str) -> bool {
    memchr::memchr(FIELD_SEPARATOR, text.as_bytes()).is_some()
}

/// Rejects service output that carries no TSV data at all.
///
/// # Errors
///
/// Returns [`Error::MalformedResponse`] if no tab is present.
pub fn ensure_tsv(text: &str) -> Result<()> {
    if has_separator(text) {
        Ok(())
    } else {
        Err(Error::malformed(
            "response is not in the expected TSV format (no tab found)",
        ))
    }
}

/// Parses every tab-bearing line of a service response, in response order.
///
/// Lines without a tab are skipped.
#[must_use]
pub fn parse_response(text: &str) -> Vec<MappingEntry> {
    text.lines().filter_map(MappingEntry::parse).collect()
}

/// Collects the original-filename keys of every tab-bearing line.
#[must_use]
pub fn flagged_keys(text: &str) -> HashSet<String> {
    text.lines()
        .filter(|line| has_separator(line))
        .map(|line| original_field(line).to_string())
        .collect()
}

/// Reads a newline-delimited filename list, trimming lines and skipping blanks.
///
/// # Errors
///
/// Returns [`Error::MissingFile`] if the file doesn't exist, or an IO error if
/// it can't be read.
pub fn read_filenames(path: &Path) -> Result<Vec<String>> {
    let content = read_text(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Reads a whole text file, mapping `NotFound` to [`Error::MissingFile`].
///
/// # Errors
///
/// Returns an error if the file is missing or unreadable.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::missing_file(path)
        } else {
            Error::io(path, e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_parse_splits_on_first_tab() {
        let entry = MappingEntry::parse("a.mkv\tb.mkv\tc").unwrap();
        assert_eq!(entry.original, "a.mkv");
        assert_eq!(entry.perfected, "b.mkv\tc");
    }

    #[test]
    fn test_parse_trims_line() {
        let entry = MappingEntry::parse("  Foo.mkv\tFoo (2020).mkv \r").unwrap();
        assert_eq!(entry, MappingEntry::new("Foo.mkv", "Foo (2020).mkv"));
    }

    #[test]
    fn test_parse_rejects_line_without_tab() {
        assert!(MappingEntry::parse("no tab here").is_none());
        assert!(MappingEntry::parse("").is_none());
    }

    #[test]
    fn test_parse_response_skips_prose() {
        let text = "Here you go:\nA.mkv\tA - S01E01.mkv\n\nno tab here\nB.mkv\tB (1999).mkv\n";
        let entries = parse_response(text);

        assert_eq!(
            entries,
            vec![
                MappingEntry::new("A.mkv", "A - S01E01.mkv"),
                MappingEntry::new("B.mkv", "B (1999).mkv"),
            ]
        );
    }

    #[test]
    fn test_ensure_tsv() {
        assert!(ensure_tsv("a\tb").is_ok());
        assert!(ensure_tsv("I could not help with that").unwrap_err().is_malformed());
        assert!(ensure_tsv("").unwrap_err().is_malformed());
    }

    #[test]
    fn test_original_field() {
        assert_eq!(original_field("a.mkv\tb.mkv\n"), "a.mkv");
        assert_eq!(original_field("lonely.mkv\n"), "lonely.mkv");
    }

    #[test]
    fn test_flagged_keys_ignores_untabbed_lines() {
        let keys = flagged_keys("a.mkv\tx\nnote without tab\nb.mkv\ty\n");
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("a.mkv"));
        assert!(keys.contains("b.mkv"));
    }

    #[test]
    fn test_to_line() {
        let entry = MappingEntry::new("a.mkv", "A (2001).mkv");
        assert_eq!(entry.to_line(), "a.mkv\tA (2001).mkv");
        assert_eq!(entry.to_string(), "a.mkv -> A (2001).mkv");
    }

    #[test]
    fn test_read_filenames_skips_blanks() {
        let temp = assert_fs::TempDir::new().unwrap();
        let list = temp.child("file_list.txt");
        list.write_str("A.mkv\n\n  B.mkv  \n\t\nC.mkv").unwrap();

        let names = read_filenames(list.path()).unwrap();
        assert_eq!(names, vec!["A.mkv", "B.mkv", "C.mkv"]);
    }

    #[test]
    fn test_read_text_missing() {
        let err = read_text(Path::new("/nonexistent/notes.txt")).unwrap_err();
        assert!(err.is_missing_file());
    }
}
