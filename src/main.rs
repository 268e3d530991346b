use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rename_forge::{GeminiConfig, MapperConfig, RefinerConfig, StripperConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "rename-forge",
    version,
    author,
    about = "LLM-assisted rename plans for media libraries",
    long_about = "Build and repair rename plans for a media library with Gemini, \
    and strip colons from filenames stored in Google Drive.\n\n\
    USAGE EXAMPLES:\n  \
      # Map every filename in file_list.txt to a canonical name\n  \
      rename-forge map --input file_list.txt --output renamemap.txt\n\n  \
      # Fix flagged lines in the authoritative map using notes\n  \
      rename-forge refine --flawed repeats.txt --notes notes.txt --map renamemap_purified.txt\n\n  \
      # Preview colon removal in Google Drive\n  \
      rename-forge strip-colons --dry-run"
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request rename plans for a filename list, batch by batch
    Map(MapArgs),

    /// Correct flagged mapping lines using human notes
    Refine(RefineArgs),

    /// Replace ':' with ' -' in Google Drive filenames
    StripColons(StripArgs),
}

#[derive(Args, Debug)]
struct GeminiArgs {
    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Model identifier
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-pro")]
    model: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 300, value_name = "SECS")]
    timeout: u64,
}

impl GeminiArgs {
    fn into_config(self) -> anyhow::Result<GeminiConfig> {
        Ok(GeminiConfig::new(self.api_key)?
            .with_model(self.model)
            .with_timeout(Duration::from_secs(self.timeout)))
    }
}

#[derive(Args, Debug)]
struct MapArgs {
    /// Newline-delimited list of filenames
    #[arg(short, long, default_value = "file_list.txt", value_name = "FILE")]
    input: PathBuf,

    /// Mapping file to write (original<TAB>perfected)
    #[arg(short, long, default_value = "renamemap.txt", value_name = "FILE")]
    output: PathBuf,

    /// File collecting filenames that got no mapping
    #[arg(long, default_value = "gemini_failures.txt", value_name = "FILE")]
    failures: PathBuf,

    /// Filenames per request
    #[arg(short, long, default_value_t = 150)]
    batch_size: usize,

    /// Render prompts without sending them or writing files
    #[arg(long)]
    dry_run: bool,

    /// Path to custom Tera template file
    ///
    /// The template must reference `filenames`; `examples`, `batch_index`
    /// and `total_batches` are also available under `ctx`.
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,

    #[command(flatten)]
    gemini: GeminiArgs,
}

#[derive(Args, Debug)]
struct RefineArgs {
    /// Flagged mapping lines to correct
    #[arg(long, default_value = "repeats.txt", value_name = "FILE")]
    flawed: PathBuf,

    /// Human notes describing the corrections
    #[arg(long, default_value = "notes.txt", value_name = "FILE")]
    notes: PathBuf,

    /// Authoritative mapping file, rewritten in place
    #[arg(long, default_value = "renamemap_purified.txt", value_name = "FILE")]
    map: PathBuf,

    /// Don't keep a timestamped backup of the mapping file
    #[arg(long)]
    no_backup: bool,

    /// Send the request and report the merge without rewriting the map
    #[arg(long)]
    dry_run: bool,

    /// Path to custom Tera template file (must reference `flawed` and `notes`)
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,

    #[command(flatten)]
    gemini: GeminiArgs,
}

#[derive(Args, Debug)]
struct StripArgs {
    /// Persisted OAuth token
    #[arg(long, default_value = "token.json", value_name = "FILE")]
    token: PathBuf,

    /// Installed-app client secrets for first-time authorization
    #[arg(long, default_value = "client_secrets.json", value_name = "FILE")]
    client_secrets: PathBuf,

    /// Eligible file extension (repeatable; default mkv and mp4)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Report intended renames without applying them
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    setup_tracing(cli.verbose)?;

    match cli.command {
        Command::Map(args) => run_map(args),
        Command::Refine(args) => run_refine(args),
        Command::StripColons(args) => run_strip(args),
    }
}

fn run_map(args: MapArgs) -> anyhow::Result<()> {
    let mut builder = MapperConfig::builder()
        .input_path(args.input)
        .output_path(args.output)
        .failure_log_path(args.failures)
        .batch_size(args.batch_size)
        .dry_run(args.dry_run);

    if let Some(template_path) = args.template {
        builder = builder.template_path(template_path);
    }

    let config = builder.build().context("Failed to build configuration")?;
    let gemini = args.gemini.into_config()?;

    let stats = rename_forge::run_mapper(config, gemini).context("Mapping failed")?;
    stats.print_summary();

    Ok(())
}

fn run_refine(args: RefineArgs) -> anyhow::Result<()> {
    let mut builder = RefinerConfig::builder()
        .flawed_path(args.flawed)
        .notes_path(args.notes)
        .map_path(args.map)
        .backup_existing(!args.no_backup)
        .dry_run(args.dry_run);

    if let Some(template_path) = args.template {
        builder = builder.template_path(template_path);
    }

    let config = builder.build().context("Failed to build configuration")?;
    let gemini = args.gemini.into_config()?;

    let stats = rename_forge::run_refiner(config, gemini).context("Refinement failed")?;
    stats.print_summary();

    Ok(())
}

fn run_strip(args: StripArgs) -> anyhow::Result<()> {
    let mut builder = StripperConfig::builder()
        .token_path(args.token)
        .client_secrets_path(args.client_secrets)
        .dry_run(args.dry_run);

    for ext in args.extensions {
        builder = builder.extension(ext);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let stats = rename_forge::run_stripper(config).context("Colon stripping failed")?;
    stats.print_summary();

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("rename_forge=info"),
        1 => EnvFilter::new("rename_forge=debug"),
        _ => EnvFilter::new("rename_forge=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
