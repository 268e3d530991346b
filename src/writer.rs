use crate::{
    error::{Error, Result},
    mapping::MappingEntry,
};
use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Append-only sink for the mapper's two output files.
///
/// [`OutputSink::initialize`] truncates both files once per run; every later
/// call appends, so whatever was written before a crash stays on disk.
pub(crate) struct OutputSink {
    output_path: PathBuf,
    failure_log_path: PathBuf,
}

impl OutputSink {
    pub(crate) fn new(
        output_path: impl Into<PathBuf>,
        failure_log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            output_path: output_path.into(),
            failure_log_path: failure_log_path.into(),
        }
    }

    /// Truncates (or creates) the mapping file and the failure log.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be created.
    pub(crate) fn initialize(&self) -> Result<()> {
        for path in [&self.output_path, &self.failure_log_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            fs::File::create(path).map_err(|e| Error::io(path, e))?;
        }

        debug!(
            "Initialized {} and {}",
            self.output_path.display(),
            self.failure_log_path.display()
        );
        Ok(())
    }

    /// Appends mapping entries, one TSV line each.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping file cannot be written.
    pub(crate) fn append_entries(&self, entries: &[MappingEntry]) -> Result<()> {
        append_lines(&self.output_path, entries.iter().map(MappingEntry::to_line))
    }

    /// Appends failed filenames, one per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the failure log cannot be written.
    pub(crate) fn append_failures(&self, filenames: &[String]) -> Result<()> {
        append_lines(&self.failure_log_path, filenames.iter().cloned())
    }
}

fn append_lines(path: &Path, lines: impl IntoIterator<Item = String>) -> Result<()> {
    let mut lines = lines.into_iter().peekable();
    if lines.peek().is_none() {
        return Ok(());
    }

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);

    for line in lines {
        writeln!(writer, "{line}").map_err(|e| Error::io(path, e))?;
    }

    writer.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Writes a file atomically with optional backup.
///
/// # Process
///
/// 1. Creates backup if file exists and backup is enabled
/// 2. Writes content to temporary file
/// 3. Syncs temporary file to disk
/// 4. Atomically renames temporary file to target path
///
/// Returns the backup path, if one was made.
///
/// # Errors
///
/// Returns an error if any filesystem step fails. The target is left
/// untouched unless the final rename succeeded.
pub(crate) fn write_file_atomic(
    path: &Path,
    content: &str,
    backup: bool,
) -> Result<Option<PathBuf>> {
    let backup_path = if path.exists() && backup {
        Some(backup_file(path)?)
    } else {
        None
    };

    let temp_path = path.with_extension("tmp");
    let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .sync_all()
        .map_err(|e| Error::io(&temp_path, e))?;

    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;

    Ok(backup_path)
}

/// Creates a timestamped backup of an existing file next to it.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let timestamp = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();

    let filename = path
        .file_name()
        .ok_or_else(|| Error::config("Invalid file path"))?
        .to_string_lossy();

    let backup_name = format!("{}.backup.{}", filename, timestamp);
    let backup_path = path.with_file_name(backup_name);

    fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

    debug!("Created backup: {}", backup_path.display());
    Ok(backup_path)
}
