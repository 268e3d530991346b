use crate::{
    config::StripperConfig,
    drive::{StorageService, build_query},
    error::Result,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

/// Replaces every `:` with `" -"`.
///
/// # Examples
///
/// ```
/// use rename_forge::strip_colons;
///
/// assert_eq!(strip_colons("Alien: Covenant (2017).mkv"), "Alien - Covenant (2017).mkv");
/// ```
#[must_use]
pub fn strip_colons(name: &str) -> String {
    name.replace(':', " -")
}

/// Counters for one stripper run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StripStats {
    /// Listing pages fetched
    pub pages: usize,

    /// Files returned by the query
    pub matched: usize,

    /// Files renamed remotely
    pub renamed: usize,

    /// Renames reported but not applied (dry run)
    pub would_rename: usize,

    /// Renames the service rejected
    pub failed: usize,

    /// Whether the run was a dry run
    pub dry_run: bool,
}

impl StripStats {
    /// Prints a summary of the run.
    pub fn print_summary(&self) {
        if self.matched == 0 {
            println!("No matching files were found.");
            return;
        }

        if self.dry_run {
            println!(
                "\nDry run complete. {} of {} matching files would be renamed. No changes were made.",
                self.would_rename, self.matched
            );
        } else {
            println!(
                "\nFinished. Renamed {} of {} matching files ({} failed).",
                self.renamed, self.matched, self.failed
            );
        }
    }
}

/// Pages through colon-bearing files in remote storage and renames them.
pub struct ColonStripper<S> {
    config: StripperConfig,
    storage: S,
}

impl<S: StorageService> ColonStripper<S> {
    /// Creates a stripper over the given storage.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: StripperConfig, storage: S) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, storage })
    }

    /// Runs the query to exhaustion, renaming (or reporting) each match.
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be listed. Individual rename
    /// failures are counted in [`StripStats::failed`] instead.
    #[instrument(skip(self), fields(dry_run = self.config.dry_run))]
    pub fn run(&self) -> Result<StripStats> {
        let query = build_query(&self.config.extensions);
        let mut stats = StripStats {
            dry_run: self.config.dry_run,
            ..StripStats::default()
        };

        if self.config.dry_run {
            warn!("Dry run mode enabled - no files will be renamed");
        }
        info!("Searching for files you own...");

        let mut page_token: Option<String> = None;
        loop {
            let page = self.storage.list_page(&query, page_token.as_deref())?;
            stats.pages += 1;
            stats.matched += page.files.len();

            for file in &page.files {
                let new_name = strip_colons(&file.name);
                if new_name == file.name {
                    continue;
                }

                if self.config.dry_run {
                    println!("[DRY RUN] Would rename '{}' to '{}'", file.name, new_name);
                    stats.would_rename += 1;
                    continue;
                }

                println!("Renaming '{}' to '{}'...", file.name, new_name);
                match self.storage.rename(&file.id, &new_name) {
                    Ok(()) => stats.renamed += 1,
                    Err(e) => {
                        error!("Failed to rename '{}': {}", file.name, e);
                        stats.failed += 1;
                    }
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        info!(
            "Scanned {} pages: {} matched, {} renamed, {} failed",
            stats.pages, stats.matched, stats.renamed, stats.failed
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::{DriveFile, FilePage};
    use crate::error::Error;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory storage serving fixed pages and recording renames.
    #[derive(Default)]
    struct FakeStorage {
        pages: HashMap<Option<String>, FilePage>,
        failing_ids: Vec<String>,
        queries: RefCell<Vec<String>>,
        renames: RefCell<Vec<(String, String)>>,
    }

    impl FakeStorage {
        fn with_page(
            mut self,
            token: Option<&str>,
            files: &[(&str, &str)],
            next: Option<&str>,
        ) -> Self {
            let page = FilePage {
                files: files
                    .iter()
                    .map(|(id, name)| DriveFile {
                        id: (*id).to_string(),
                        name: (*name).to_string(),
                    })
                    .collect(),
                next_page_token: next.map(str::to_string),
            };
            self.pages.insert(token.map(str::to_string), page);
            self
        }
    }

    impl StorageService for &FakeStorage {
        fn list_page(&self, query: &str, page_token: Option<&str>) -> Result<FilePage> {
            self.queries.borrow_mut().push(query.to_string());
            self.pages
                .get(&page_token.map(str::to_string))
                .cloned()
                .ok_or_else(|| Error::api(400, "invalid page token"))
        }

        fn rename(&self, id: &str, new_name: &str) -> Result<()> {
            if self.failing_ids.iter().any(|f| f == id) {
                return Err(Error::api(403, "insufficient permissions"));
            }
            self.renames
                .borrow_mut()
                .push((id.to_string(), new_name.to_string()));
            Ok(())
        }
    }

    fn config(dry_run: bool) -> StripperConfig {
        StripperConfig::builder().dry_run(dry_run).build().unwrap()
    }

    #[test]
    fn test_strip_colons() {
        assert_eq!(strip_colons("A:B:C.mkv"), "A -B -C.mkv");
        assert_eq!(strip_colons("Plain.mkv"), "Plain.mkv");

        let name = "Star Wars: Episode IV: A New Hope.mp4";
        let stripped = strip_colons(name);
        assert!(!stripped.contains(':'));
        assert_eq!(stripped.matches(" -").count(), name.matches(':').count());
    }

    #[test]
    fn test_live_run_follows_pages() {
        let storage = FakeStorage::default()
            .with_page(None, &[("1", "Alien: Covenant.mkv")], Some("p2"))
            .with_page(Some("p2"), &[("2", "Dune: Part Two.mp4")], None);

        let stats = ColonStripper::new(config(false), &storage).unwrap().run().unwrap();

        assert_eq!(stats.pages, 2);
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.renamed, 2);
        assert_eq!(
            *storage.renames.borrow(),
            vec![
                ("1".to_string(), "Alien - Covenant.mkv".to_string()),
                ("2".to_string(), "Dune - Part Two.mp4".to_string()),
            ]
        );
        assert!(storage.queries.borrow()[0].contains("name contains ':'"));
    }

    #[test]
    fn test_dry_run_renames_nothing() {
        let storage = FakeStorage::default().with_page(None, &[("1", "Alien: Covenant.mkv")], None);

        let stats = ColonStripper::new(config(true), &storage).unwrap().run().unwrap();

        assert_eq!(stats.would_rename, 1);
        assert_eq!(stats.renamed, 0);
        assert!(storage.renames.borrow().is_empty());
    }

    #[test]
    fn test_names_without_colon_are_skipped() {
        let storage = FakeStorage::default().with_page(None, &[("1", "Already Fine.mkv")], None);

        let stats = ColonStripper::new(config(false), &storage).unwrap().run().unwrap();

        assert_eq!(stats.matched, 1);
        assert_eq!(stats.renamed, 0);
        assert!(storage.renames.borrow().is_empty());
    }

    #[test]
    fn test_no_matches() {
        let storage = FakeStorage::default().with_page(None, &[], None);

        let stats = ColonStripper::new(config(false), &storage).unwrap().run().unwrap();

        assert_eq!(stats.pages, 1);
        assert_eq!(stats.matched, 0);
    }

    #[test]
    fn test_rename_failure_continues() {
        let mut storage = FakeStorage::default()
            .with_page(None, &[("1", "A: x.mkv"), ("2", "B: y.mkv")], None);
        storage.failing_ids.push("1".to_string());

        let stats = ColonStripper::new(config(false), &storage).unwrap().run().unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.renamed, 1);
        assert_eq!(storage.renames.borrow()[0].0, "2");
    }

    #[test]
    fn test_listing_failure_aborts() {
        let storage = FakeStorage::default().with_page(None, &[("1", "A: x.mkv")], Some("gone"));

        let result = ColonStripper::new(config(false), &storage).unwrap().run();

        assert!(result.is_err());
        assert_eq!(storage.renames.borrow().len(), 1);
    }
}
