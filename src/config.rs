use crate::error::{Error, Result};
use crate::template_validator::TemplateValidator;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 150;
const DEFAULT_INPUT_FILE: &str = "file_list.txt";
const DEFAULT_OUTPUT_FILE: &str = "renamemap.txt";
const DEFAULT_FAILURE_LOG_FILE: &str = "gemini_failures.txt";

const DEFAULT_FLAWED_FILE: &str = "repeats.txt";
const DEFAULT_NOTES_FILE: &str = "notes.txt";
const DEFAULT_MAP_FILE: &str = "renamemap_purified.txt";

const DEFAULT_TOKEN_FILE: &str = "token.json";
const DEFAULT_CLIENT_SECRETS_FILE: &str = "client_secrets.json";
const DEFAULT_EXTENSIONS: &[&str] = &["mkv", "mp4"];

const DEFAULT_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection settings for the text-generation service.
#[derive(Clone)]
#[non_exhaustive]
pub struct GeminiConfig {
    /// API key sent with every request
    pub api_key: String,

    /// Model identifier, e.g. `gemini-2.5-pro`
    pub model: String,

    /// Base URL of the REST API (without trailing slash)
    pub endpoint: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Creates a configuration for the default model and endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config(
                "Gemini API key is empty. Set GOOGLE_API_KEY or pass --api-key",
            ));
        }

        Ok(Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Overrides the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Configuration for the batch mapper.
///
/// Use [`MapperConfig::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct MapperConfig {
    /// Newline-delimited list of filenames to map
    pub input_path: PathBuf,

    /// Mapping file (`original<TAB>perfected` per line)
    pub output_path: PathBuf,

    /// Filenames that received no mapping, one per line
    pub failure_log_path: PathBuf,

    /// Number of filenames sent per request
    pub batch_size: usize,

    /// Dry run mode (no requests, no file writes)
    pub dry_run: bool,

    /// Path to external prompt template file
    pub template_path: Option<PathBuf>,
}

impl MapperConfig {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rename_forge::MapperConfig;
    ///
    /// let config = MapperConfig::builder()
    ///     .input_path("file_list.txt")
    ///     .batch_size(100)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> MapperConfigBuilder {
        MapperConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Input file doesn't exist
    /// - Batch size is zero
    /// - Mapping output and failure log point to the same file
    /// - The custom template is invalid
    pub fn validate(&self) -> Result<()> {
        require_file(&self.input_path)?;

        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be greater than 0"));
        }

        if self.output_path == self.failure_log_path {
            return Err(Error::config(format!(
                "output and failure log must be different files (both are {})",
                self.output_path.display()
            )));
        }

        if self.output_path == self.input_path || self.failure_log_path == self.input_path {
            return Err(Error::config(format!(
                "input file {} would be truncated by the run",
                self.input_path.display()
            )));
        }

        if let Some(ref template_path) = self.template_path {
            TemplateValidator::validate_template(template_path, &["filenames"])?;
        }

        Ok(())
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(DEFAULT_INPUT_FILE),
            output_path: PathBuf::from(DEFAULT_OUTPUT_FILE),
            failure_log_path: PathBuf::from(DEFAULT_FAILURE_LOG_FILE),
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            template_path: None,
        }
    }
}

/// Builder for creating a [`MapperConfig`].
#[derive(Debug, Default)]
pub struct MapperConfigBuilder {
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    failure_log_path: Option<PathBuf>,
    batch_size: Option<usize>,
    dry_run: bool,
    template_path: Option<PathBuf>,
}

impl MapperConfigBuilder {
    /// Sets the filename list to read.
    #[must_use]
    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    /// Sets the mapping file to write.
    #[must_use]
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Sets the failure log to write.
    #[must_use]
    pub fn failure_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.failure_log_path = Some(path.into());
        self
    }

    /// Sets the number of filenames per request.
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Enables dry run mode (no requests, no file writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Sets the path to an external prompt template.
    ///
    /// The template must compile as Tera and reference `filenames`.
    #[must_use]
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<MapperConfig> {
        let config = MapperConfig {
            input_path: self
                .input_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_FILE)),
            output_path: self
                .output_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE)),
            failure_log_path: self
                .failure_log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FAILURE_LOG_FILE)),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            dry_run: self.dry_run,
            template_path: self.template_path,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration for the map refiner.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RefinerConfig {
    /// Flagged mapping lines that need correction
    pub flawed_path: PathBuf,

    /// Free-form human notes describing the corrections
    pub notes_path: PathBuf,

    /// Authoritative mapping file rewritten in place
    pub map_path: PathBuf,

    /// Create a timestamped backup before rewriting
    pub backup_existing: bool,

    /// Dry run mode (request is sent, mapping file is not rewritten)
    pub dry_run: bool,

    /// Path to external prompt template file
    pub template_path: Option<PathBuf>,
}

impl RefinerConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> RefinerConfigBuilder {
        RefinerConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three input files is missing, or if the
    /// custom template is invalid.
    pub fn validate(&self) -> Result<()> {
        require_file(&self.flawed_path)?;
        require_file(&self.notes_path)?;
        require_file(&self.map_path)?;

        if self.flawed_path == self.map_path {
            return Err(Error::config(
                "flawed entries file and mapping file must be different files",
            ));
        }

        if let Some(ref template_path) = self.template_path {
            TemplateValidator::validate_template(template_path, &["flawed", "notes"])?;
        }

        Ok(())
    }
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            flawed_path: PathBuf::from(DEFAULT_FLAWED_FILE),
            notes_path: PathBuf::from(DEFAULT_NOTES_FILE),
            map_path: PathBuf::from(DEFAULT_MAP_FILE),
            backup_existing: true,
            dry_run: false,
            template_path: None,
        }
    }
}

/// Builder for creating a [`RefinerConfig`].
#[derive(Debug, Default)]
pub struct RefinerConfigBuilder {
    flawed_path: Option<PathBuf>,
    notes_path: Option<PathBuf>,
    map_path: Option<PathBuf>,
    backup_existing: Option<bool>,
    dry_run: bool,
    template_path: Option<PathBuf>,
}

impl RefinerConfigBuilder {
    /// Sets the file of flagged mapping lines.
    #[must_use]
    pub fn flawed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.flawed_path = Some(path.into());
        self
    }

    /// Sets the notes file.
    #[must_use]
    pub fn notes_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.notes_path = Some(path.into());
        self
    }

    /// Sets the authoritative mapping file.
    #[must_use]
    pub fn map_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.map_path = Some(path.into());
        self
    }

    /// Enables or disables backup creation.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = Some(enabled);
        self
    }

    /// Enables dry run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Sets the path to an external prompt template.
    ///
    /// The template must compile as Tera and reference `flawed` and `notes`.
    #[must_use]
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<RefinerConfig> {
        let config = RefinerConfig {
            flawed_path: self
                .flawed_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FLAWED_FILE)),
            notes_path: self
                .notes_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_NOTES_FILE)),
            map_path: self
                .map_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MAP_FILE)),
            backup_existing: self.backup_existing.unwrap_or(true),
            dry_run: self.dry_run,
            template_path: self.template_path,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration for the colon stripper.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct StripperConfig {
    /// Persisted OAuth token
    pub token_path: PathBuf,

    /// Installed-app client secrets, used when no usable token exists
    pub client_secrets_path: PathBuf,

    /// File extensions (without the dot) eligible for renaming
    pub extensions: Vec<String>,

    /// Report intended renames without applying them
    pub dry_run: bool,
}

impl StripperConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> StripperConfigBuilder {
        StripperConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension allow-list is empty or contains
    /// characters that would break the storage query.
    pub fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() {
            return Err(Error::config("at least one file extension is required"));
        }

        if let Some(bad) = self
            .extensions
            .iter()
            .find(|ext| ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(Error::config(format!(
                "invalid file extension '{bad}': only ASCII letters and digits are allowed"
            )));
        }

        Ok(())
    }
}

impl Default for StripperConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(DEFAULT_TOKEN_FILE),
            client_secrets_path: PathBuf::from(DEFAULT_CLIENT_SECRETS_FILE),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
            dry_run: false,
        }
    }
}

/// Builder for creating a [`StripperConfig`].
#[derive(Debug, Default)]
pub struct StripperConfigBuilder {
    token_path: Option<PathBuf>,
    client_secrets_path: Option<PathBuf>,
    extensions: Vec<String>,
    dry_run: bool,
}

impl StripperConfigBuilder {
    /// Sets the token file.
    #[must_use]
    pub fn token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// Sets the client secrets file.
    #[must_use]
    pub fn client_secrets_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_secrets_path = Some(path.into());
        self
    }

    /// Adds an eligible extension. A leading dot is ignored.
    #[must_use]
    pub fn extension(mut self, ext: impl AsRef<str>) -> Self {
        self.extensions
            .push(ext.as_ref().trim_start_matches('.').to_ascii_lowercase());
        self
    }

    /// Enables dry run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// Falls back to `mkv` and `mp4` when no extension was added.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<StripperConfig> {
        let defaults = StripperConfig::default();
        let config = StripperConfig {
            token_path: self.token_path.unwrap_or(defaults.token_path),
            client_secrets_path: self
                .client_secrets_path
                .unwrap_or(defaults.client_secrets_path),
            extensions: if self.extensions.is_empty() {
                defaults.extensions
            } else {
                self.extensions
            },
            dry_run: self.dry_run,
        };

        config.validate()?;
        Ok(config)
    }
}

fn require_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::missing_file(path));
    }

    if !path.is_file() {
        return Err(Error::config(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_mapper_defaults() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("file_list.txt");
        input.write_str("A.mkv\n").unwrap();

        let config = MapperConfig::builder()
            .input_path(input.path())
            .build()
            .unwrap();

        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT_FILE));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_mapper_missing_input() {
        let result = MapperConfig::builder()
            .input_path("/nonexistent/path/file_list.txt")
            .build();

        assert!(result.unwrap_err().is_missing_file());
    }

    #[test]
    fn test_mapper_zero_batch_size() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("file_list.txt");
        input.write_str("A.mkv\n").unwrap();

        let result = MapperConfig::builder()
            .input_path(input.path())
            .batch_size(0)
            .build();

        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_mapper_same_output_and_failure_log() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("file_list.txt");
        input.write_str("A.mkv\n").unwrap();

        let result = MapperConfig::builder()
            .input_path(input.path())
            .output_path(temp.path().join("out.txt"))
            .failure_log_path(temp.path().join("out.txt"))
            .build();

        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_mapper_refuses_to_truncate_input() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = temp.child("file_list.txt");
        input.write_str("A.mkv\n").unwrap();

        let result = MapperConfig::builder()
            .input_path(input.path())
            .output_path(input.path())
            .build();

        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_refiner_requires_all_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("repeats.txt").write_str("a\tb\n").unwrap();
        temp.child("notes.txt").write_str("fix it").unwrap();

        let result = RefinerConfig::builder()
            .flawed_path(temp.path().join("repeats.txt"))
            .notes_path(temp.path().join("notes.txt"))
            .map_path(temp.path().join("missing.txt"))
            .build();

        assert!(result.unwrap_err().is_missing_file());
    }

    #[test]
    fn test_refiner_backup_enabled_by_default() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("repeats.txt").write_str("a\tb\n").unwrap();
        temp.child("notes.txt").write_str("fix it").unwrap();
        temp.child("map.txt").write_str("a\tb\n").unwrap();

        let config = RefinerConfig::builder()
            .flawed_path(temp.path().join("repeats.txt"))
            .notes_path(temp.path().join("notes.txt"))
            .map_path(temp.path().join("map.txt"))
            .build()
            .unwrap();

        assert!(config.backup_existing);
    }

    #[test]
    fn test_stripper_default_extensions() {
        let config = StripperConfig::builder().build().unwrap();
        assert_eq!(config.extensions, vec!["mkv", "mp4"]);
    }

    #[test]
    fn test_stripper_extension_normalized() {
        let config = StripperConfig::builder()
            .extension(".AVI")
            .build()
            .unwrap();
        assert_eq!(config.extensions, vec!["avi"]);
    }

    #[test]
    fn test_stripper_rejects_quote_in_extension() {
        let result = StripperConfig::builder().extension("mkv' or '1").build();
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_gemini_config_requires_key() {
        assert!(GeminiConfig::new("  ").unwrap_err().is_config());
    }

    #[test]
    fn test_gemini_config_redacts_key() {
        let config = GeminiConfig::new("secret-key")
            .unwrap()
            .with_endpoint("http://localhost:8080/");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert_eq!(config.endpoint, "http://localhost:8080");
    }
}
