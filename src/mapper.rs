use crate::{
    batch::{Batch, Batcher},
    config::MapperConfig,
    error::Result,
    gemini::TextGenerator,
    mapping::{self, MappingEntry},
    template::{PromptKind, TemplateEngine},
    writer::OutputSink,
};
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Statistics collected during a mapper run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MapperStats {
    /// Filenames read from the input list
    pub total_files: usize,

    /// Number of batches planned
    pub total_batches: usize,

    /// Batches whose request failed outright
    pub failed_batches: usize,

    /// Input filenames that received a mapping
    pub mapped: usize,

    /// Input filenames the service skipped in an otherwise good response
    pub unmatched: usize,

    /// Filenames written to the failure log (`unmatched` + failed batches)
    pub failed: usize,

    /// Lines written to the mapping file
    pub entries_written: usize,

    /// Dropped lines whose original was not in the batch
    pub unexpected_entries: usize,

    /// Dropped lines for an original already mapped in this run
    pub duplicate_lines: usize,

    /// Total execution time
    pub duration: Duration,

    /// Whether the run was a dry run
    pub dry_run: bool,
}

impl MapperStats {
    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              Batch Mapper Summary                     ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Filenames:            {:>8}                        ║",
            self.total_files
        );
        println!(
            "║ Batches:              {:>8}                        ║",
            self.total_batches
        );
        println!(
            "║   - Failed:           {:>8}                        ║",
            self.failed_batches
        );
        println!("║                                                       ║");
        println!(
            "║ Mapped:               {:>8}                        ║",
            self.mapped
        );
        println!(
            "║ Logged as failures:   {:>8}                        ║",
            self.failed
        );
        println!(
            "║   - Skipped by model: {:>8}                        ║",
            self.unmatched
        );
        println!(
            "║ Unexpected lines:     {:>8}                        ║",
            self.unexpected_entries
        );
        println!(
            "║ Duplicate lines:      {:>8}                        ║",
            self.duplicate_lines
        );
        println!(
            "║ Coverage:             {:>7.1}%                        ║",
            self.coverage() * 100.0
        );
        println!("║                                                       ║");
        println!(
            "║ Total time:           {:>8.2}s                       ║",
            self.duration.as_secs_f64()
        );
        println!(
            "║ Finished:             {}             ║",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        if self.dry_run {
            println!("║ ⚠ No requests sent, no files written (dry run)       ║");
        }
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }

    /// Returns the share of input filenames that received a mapping.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        self.mapped as f64 / self.total_files as f64
    }
}

/// Result of reconciling one response against its batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct BatchOutcome {
    /// Entries to append, in response order
    pub entries: Vec<MappingEntry>,
    /// Batch members no valid line resolved, in input order
    pub unmatched: Vec<String>,
    /// Batch members that were resolved
    pub resolved: usize,
    /// Dropped lines for originals outside the batch
    pub unexpected: usize,
    /// Lines dropped because their original was already mapped
    pub duplicates: usize,
}

/// Reconciles a service response with the batch it answers.
///
/// Only tab-bearing lines for batch members count. Lines for other originals
/// are dropped. The first line for an original wins; later lines for the same
/// original, or for one already written earlier in the run, are dropped.
pub(crate) fn reconcile(batch: &Batch, response: &str, written: &HashSet<String>) -> BatchOutcome {
    let members: HashSet<&str> = batch.filenames.iter().map(String::as_str).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut outcome = BatchOutcome::default();

    for entry in mapping::parse_response(response) {
        if !members.contains(entry.original.as_str()) {
            warn!(
                "Dropping line for '{}', which is not in batch {}",
                entry.original,
                batch.index + 1
            );
            outcome.unexpected += 1;
            continue;
        }

        if written.contains(&entry.original) || !seen.insert(entry.original.clone()) {
            warn!("Dropping duplicate line for '{}'", entry.original);
            outcome.duplicates += 1;
            continue;
        }

        outcome.entries.push(entry);
    }

    let mut counted: HashSet<&str> = HashSet::new();
    for name in &batch.filenames {
        if !counted.insert(name.as_str()) {
            continue;
        }

        if seen.contains(name) || written.contains(name) {
            outcome.resolved += 1;
        } else {
            outcome.unmatched.push(name.clone());
        }
    }

    outcome
}

/// Requests rename plans batch by batch and merges them into one mapping file.
pub struct BatchMapper<G> {
    config: MapperConfig,
    generator: G,
    templates: TemplateEngine,
    batcher: Batcher,
    sink: OutputSink,
}

impl<G: TextGenerator> BatchMapper<G> {
    /// Creates a new mapper with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The prompt template cannot be loaded
    pub fn new(config: MapperConfig, generator: G) -> Result<Self> {
        config.validate()?;

        let templates =
            TemplateEngine::with_override(PromptKind::Map, config.template_path.as_deref())?;
        let batcher = Batcher::new(config.batch_size);
        let sink = OutputSink::new(&config.output_path, &config.failure_log_path);

        Ok(Self {
            config,
            generator,
            templates,
            batcher,
            sink,
        })
    }

    /// Executes the run and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Read**: loads the filename list
    /// 2. **Render**: builds every batch prompt
    /// 3. **Initialize**: truncates the mapping file and failure log
    /// 4. **Batch**: requests, validates and reconciles each batch, appending
    ///    results as it goes
    ///
    /// A failed batch is logged in full to the failure log and the run moves
    /// on.
    ///
    /// # Errors
    ///
    /// Returns an error for setup problems (unreadable input, output files
    /// that can't be written, a prompt template that fails to render) and
    /// for generator errors that are not [recoverable](crate::Error::is_recoverable).
    /// A template failure is reported before any output file is touched.
    #[instrument(skip(self), fields(input = %self.config.input_path.display()))]
    pub fn run(self) -> Result<MapperStats> {
        let start_time = Instant::now();

        let filenames = mapping::read_filenames(&self.config.input_path)?;
        let total_files = filenames.len();
        info!("Found {} filenames to map", total_files);

        let batches = self.batcher.split(filenames);
        let total_batches = batches.len();

        let mut stats = MapperStats {
            total_files,
            total_batches,
            dry_run: self.config.dry_run,
            ..MapperStats::default()
        };

        // Render everything before the outputs are truncated, so a template
        // that fails at render time leaves the previous run's files intact.
        let prompts = batches
            .iter()
            .map(|batch| self.templates.render_map(batch, total_batches))
            .collect::<Result<Vec<_>>>()?;

        if self.config.dry_run {
            warn!("Dry run mode enabled - skipping requests and file writes");
            for (batch, prompt) in batches.iter().zip(&prompts) {
                info!(
                    "Would send batch {}/{} ({} filenames, {} prompt bytes)",
                    batch.index + 1,
                    total_batches,
                    batch.len(),
                    prompt.len()
                );
                debug!("Prompt for batch {}:\n{}", batch.index + 1, prompt);
            }
            stats.duration = start_time.elapsed();
            return Ok(stats);
        }

        self.sink.initialize()?;

        let mut written = HashSet::new();
        for (batch, prompt) in batches.iter().zip(&prompts) {
            self.process_batch(batch, prompt, total_batches, &mut written, &mut stats)?;
        }

        stats.duration = start_time.elapsed();

        info!(
            "✓ Mapped {}/{} filenames in {:.2}s; mapping written to {}",
            stats.mapped,
            total_files,
            stats.duration.as_secs_f64(),
            self.config.output_path.display()
        );
        if stats.failed > 0 {
            warn!(
                "{} filenames logged to {}",
                stats.failed,
                self.config.failure_log_path.display()
            );
        }

        Ok(stats)
    }

    fn process_batch(
        &self,
        batch: &Batch,
        prompt: &str,
        total_batches: usize,
        written: &mut HashSet<String>,
        stats: &mut MapperStats,
    ) -> Result<()> {
        info!(
            "Requesting batch {}/{} ({} filenames)",
            batch.index + 1,
            total_batches,
            batch.len()
        );

        let response = self.generator.generate(prompt).and_then(|text| {
            mapping::ensure_tsv(&text)?;
            Ok(text)
        });

        let text = match response {
            Ok(text) => text,
            Err(e) if !e.is_recoverable() => {
                error!(
                    "Batch {}/{} failed with a non-recoverable error; stopping",
                    batch.index + 1,
                    total_batches
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Batch {}/{} failed ({}); logging all {} filenames",
                    batch.index + 1,
                    total_batches,
                    e,
                    batch.len()
                );
                self.sink.append_failures(&batch.filenames)?;
                stats.failed_batches += 1;
                stats.failed += batch.len();
                return Ok(());
            }
        };

        let outcome = reconcile(batch, &text, written);
        self.sink.append_entries(&outcome.entries)?;
        self.sink.append_failures(&outcome.unmatched)?;
        written.extend(outcome.entries.iter().map(|entry| entry.original.clone()));

        if !outcome.unmatched.is_empty() {
            warn!(
                "Service skipped {} filenames in batch {}/{}; logging them",
                outcome.unmatched.len(),
                batch.index + 1,
                total_batches
            );
        }

        debug!(
            "Batch {}: {} lines written, {} resolved",
            batch.index + 1,
            outcome.entries.len(),
            outcome.resolved
        );

        stats.mapped += outcome.resolved;
        stats.unmatched += outcome.unmatched.len();
        stats.failed += outcome.unmatched.len();
        stats.entries_written += outcome.entries.len();
        stats.unexpected_entries += outcome.unexpected;
        stats.duplicate_lines += outcome.duplicates;

        Ok(())
    }
}
