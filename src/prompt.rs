//! Few-shot demonstrations embedded in rename requests.
//!
//! Each demonstration pairs a messy source filename with the name the
//! service is expected to return, one per target naming convention.

use once_cell::sync::Lazy;
use serde::Serialize;

/// Target naming convention a demonstration illustrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingConvention {
    /// `Series - SxxExx.ext`
    Episode,
    /// `Title (Year).ext`
    Feature,
}

impl NamingConvention {
    /// Returns the human-readable label used in prompts.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Episode => "TV Show",
            Self::Feature => "Movie",
        }
    }

    /// Returns the target pattern shown in prompts.
    #[must_use]
    pub const fn pattern(self) -> &'static str {
        match self {
            Self::Episode => "Show Name - SXXEXX.mkv",
            Self::Feature => "Movie Name (YYYY).mkv",
        }
    }
}

/// A worked input/output pair.
#[derive(Debug, Clone, Serialize)]
pub struct FewShotExample {
    /// Convention this pair demonstrates
    pub convention: NamingConvention,
    /// Label for the convention, e.g. `TV Show`
    pub label: &'static str,
    /// Source filename
    pub input: &'static str,
    /// Expected perfected filename
    pub output: &'static str,
    /// Expected TSV output line
    pub line: String,
}

impl FewShotExample {
    fn new(convention: NamingConvention, input: &'static str, output: &'static str) -> Self {
        Self {
            convention,
            label: convention.label(),
            input,
            output,
            line: format!("{input}\t{output}"),
        }
    }
}

static BUILTIN_EXAMPLES: Lazy<Vec<FewShotExample>> = Lazy::new(|| {
    vec![
        FewShotExample::new(
            NamingConvention::Episode,
            "[Kayoanime] Claymore - 01 - Great Sword.mkv",
            "Claymore - S01E01.mkv",
        ),
        FewShotExample::new(
            NamingConvention::Feature,
            "1a. Ghost in the Shell - The Movie (1995 - 1080p DUAL Audio).mkv",
            "Ghost in the Shell (1995).mkv",
        ),
        FewShotExample::new(
            NamingConvention::Episode,
            "Eureka Seven AO - 01.mkv",
            "Eureka Seven AO - S01E01.mkv",
        ),
    ]
});

/// Returns the built-in demonstrations, in prompt order.
#[must_use]
pub fn builtin_examples() -> &'static [FewShotExample] {
    &BUILTIN_EXAMPLES
}
