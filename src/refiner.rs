use crate::{
    config::RefinerConfig,
    error::Result,
    gemini::TextGenerator,
    mapping::{self, MappingEntry},
    template::{PromptKind, TemplateEngine},
    writer,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Statistics from one refinement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefineStats {
    /// Distinct originals flagged as flawed
    pub flagged: usize,

    /// Lines removed from the mapping file
    pub removed: usize,

    /// Corrected lines appended
    pub appended: usize,

    /// Lines of the mapping file left untouched
    pub retained: usize,

    /// Backup written before the rewrite, if any
    pub backup_path: Option<PathBuf>,

    /// Whether the rewrite was skipped
    pub dry_run: bool,
}

/// Result of splicing corrections into a mapping file's contents.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Merge {
    pub content: String,
    pub removed: usize,
    pub retained: usize,
}

/// Removes every line whose original is flagged and appends `corrections`.
///
/// Every other line, blank ones included, is kept byte for byte. A final
/// newline is added before the corrections if the file lacked one.
pub(crate) fn merge(
    existing: &str,
    flagged: &HashSet<String>,
    corrections: &[MappingEntry],
) -> Merge {
    let mut content = String::with_capacity(existing.len());
    let mut removed = 0;
    let mut retained = 0;

    for line in existing.split_inclusive('\n') {
        if !line.trim().is_empty() && flagged.contains(mapping::original_field(line)) {
            removed += 1;
            continue;
        }

        content.push_str(line);
        retained += 1;
    }

    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }

    for entry in corrections {
        content.push_str(&entry.to_line());
        content.push('\n');
    }

    Merge {
        content,
        removed,
        retained,
    }
}

/// Parses a correction reply.
///
/// An empty reply means every flagged entry was deleted. Anything else must
/// carry TSV data.
pub(crate) fn parse_corrections(response: &str) -> Result<Vec<MappingEntry>> {
    if response.trim().is_empty() {
        return Ok(Vec::new());
    }

    mapping::ensure_tsv(response)?;
    Ok(mapping::parse_response(response))
}

/// Corrects flagged mapping lines using human notes and splices the result
/// back into the authoritative mapping file.
pub struct MapRefiner<G> {
    config: RefinerConfig,
    generator: G,
    templates: TemplateEngine,
}

impl<G: TextGenerator> MapRefiner<G> {
    /// Creates a new refiner with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails or the prompt
    /// template cannot be loaded.
    pub fn new(config: RefinerConfig, generator: G) -> Result<Self> {
        config.validate()?;

        let templates =
            TemplateEngine::with_override(PromptKind::Refine, config.template_path.as_deref())?;

        Ok(Self {
            config,
            generator,
            templates,
        })
    }

    /// Requests corrections and rewrites the mapping file.
    ///
    /// The mapping file is only read after a usable reply arrived, and only
    /// replaced through an atomic rename.
    ///
    /// # Errors
    ///
    /// Returns an error if an input file is missing, the correction request
    /// fails or returns something other than TSV, or the rewrite fails. In
    /// every case the mapping file is left as it was.
    #[instrument(skip(self), fields(map = %self.config.map_path.display()))]
    pub fn run(self) -> Result<RefineStats> {
        let flawed = mapping::read_text(&self.config.flawed_path)?;
        let flagged = mapping::flagged_keys(&flawed);
        info!(
            "Targeting {} flawed entries found in {}",
            flagged.len(),
            self.config.flawed_path.display()
        );

        let notes = mapping::read_text(&self.config.notes_path)?;
        info!("Reading guidance from {}", self.config.notes_path.display());

        let prompt = self.templates.render_refine(&flawed, &notes)?;

        let corrections = self
            .generator
            .generate(&prompt)
            .and_then(|text| parse_corrections(&text))
            .inspect_err(|e| error!("Refinement failed, mapping file not updated: {e}"))?;

        if corrections.is_empty() {
            info!("Service returned no corrections; flagged entries will only be removed");
        }

        for entry in corrections
            .iter()
            .filter(|entry| !flagged.contains(&entry.original))
        {
            warn!("Correction for '{}' was not among the flagged entries", entry.original);
        }

        let existing = mapping::read_text(&self.config.map_path)?;
        let merged = merge(&existing, &flagged, &corrections);

        let mut stats = RefineStats {
            flagged: flagged.len(),
            removed: merged.removed,
            appended: corrections.len(),
            retained: merged.retained,
            backup_path: None,
            dry_run: self.config.dry_run,
        };

        if self.config.dry_run {
            warn!(
                "Dry run mode enabled - {} would lose {} lines and gain {}",
                self.config.map_path.display(),
                stats.removed,
                stats.appended
            );
            return Ok(stats);
        }

        stats.backup_path = writer::write_file_atomic(
            &self.config.map_path,
            &merged.content,
            self.config.backup_existing,
        )
        .inspect_err(|e| error!("Rewrite of {} failed: {e}", self.config.map_path.display()))?;

        info!(
            "✓ Refined {}: removed {}, appended {}, kept {}",
            self.config.map_path.display(),
            stats.removed,
            stats.appended,
            stats.retained
        );

        Ok(stats)
    }
}

impl RefineStats {
    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              Map Refiner Summary                      ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Flagged entries:      {:>8}                        ║",
            self.flagged
        );
        println!(
            "║ Lines removed:        {:>8}                        ║",
            self.removed
        );
        println!(
            "║ Lines appended:       {:>8}                        ║",
            self.appended
        );
        println!(
            "║ Lines kept:           {:>8}                        ║",
            self.retained
        );
        if let Some(backup) = &self.backup_path {
            println!("║ Backup: {}", backup.display());
        }
        if self.dry_run {
            println!("║ ⚠ Mapping file not rewritten (dry run)                ║");
        }
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}
