//! # rename-forge
//!
//! LLM-assisted rename plans for media libraries.
//!
//! ## Features
//!
//! - Batch mapping of raw filenames to canonical names through Gemini
//! - Note-driven correction of flagged mapping lines, merged atomically
//! - Colon removal for files stored in Google Drive, with dry-run support
//!
//! ## Quick Start
//!
//! ```no_run
//! use rename_forge::{GeminiConfig, MapperConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = MapperConfig::builder()
//!     .input_path("file_list.txt")
//!     .output_path("renamemap.txt")
//!     .batch_size(150)
//!     .build()?;
//!
//! let stats = rename_forge::run_mapper(config, GeminiConfig::new("api-key")?)?;
//! stats.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Each workflow is a small pipeline:
//! 1. **Batch Mapper**: read list, split into batches, render prompt, request,
//!    reconcile, append to the mapping file and failure log
//! 2. **Map Refiner**: read flagged lines and notes, request corrections,
//!    splice them into the mapping file
//! 3. **Colon Stripper**: authorize, page through matching files, rename

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod batch;
mod config;
mod error;
mod gemini;
mod mapper;
mod refiner;
mod stripper;
mod template;
mod template_validator;
mod writer;

pub mod auth;
pub mod drive;
pub mod mapping;
pub mod prompt;

pub use batch::{Batch, Batcher};
pub use config::{
    GeminiConfig, MapperConfig, MapperConfigBuilder, RefinerConfig, RefinerConfigBuilder,
    StripperConfig, StripperConfigBuilder,
};
pub use drive::{DriveClient, DriveFile, FilePage, StorageService, build_query};
pub use error::{Error, Result};
pub use gemini::{GeminiClient, TextGenerator};
pub use mapper::{BatchMapper, MapperStats};
pub use mapping::MappingEntry;
pub use refiner::{MapRefiner, RefineStats};
pub use stripper::{ColonStripper, StripStats, strip_colons};

/// Runs the Batch Mapper against Gemini.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The input list doesn't exist
/// - The output files cannot be written
///
/// Failed batches are not errors; they land in the failure log.
pub fn run_mapper(config: MapperConfig, gemini: GeminiConfig) -> Result<MapperStats> {
    BatchMapper::new(config, GeminiClient::new(gemini)?)?.run()
}

/// Runs the Map Refiner against Gemini.
///
/// # Errors
///
/// Returns an error if an input file is missing, the correction request
/// fails, or the mapping file cannot be rewritten.
pub fn run_refiner(config: RefinerConfig, gemini: GeminiConfig) -> Result<RefineStats> {
    MapRefiner::new(config, GeminiClient::new(gemini)?)?.run()
}

/// Authorizes against Google Drive and runs the Colon Stripper.
///
/// # Errors
///
/// Returns an error if authorization fails or a listing page cannot be
/// fetched.
pub fn run_stripper(config: StripperConfig) -> Result<StripStats> {
    let access_token = auth::load_or_authorize(&config)?;
    let client = DriveClient::new(access_token)?;
    ColonStripper::new(config, client)?.run()
}
