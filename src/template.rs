use crate::{
    batch::Batch,
    error::{Error, Result},
    prompt::{FewShotExample, NamingConvention, builtin_examples},
};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tera::{Context, Tera};

const MAP_TEMPLATE: &str = "map";
const REFINE_TEMPLATE: &str = "refine";

#[derive(Serialize)]
struct MapContext<'a> {
    batch_index: usize,
    total_batches: usize,
    filenames: &'a [String],
    examples: &'a [FewShotExample],
    episode_pattern: &'static str,
    feature_pattern: &'static str,
}

#[derive(Serialize)]
struct RefineContext<'a> {
    flawed: &'a str,
    notes: &'a str,
}

/// Which request a template renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromptKind {
    /// Batch rename plan
    Map,
    /// Correction of flagged lines
    Refine,
}

impl PromptKind {
    const fn template_name(self) -> &'static str {
        match self {
            Self::Map => MAP_TEMPLATE,
            Self::Refine => REFINE_TEMPLATE,
        }
    }
}

/// Renders request prompts for the text-generation service.
pub(crate) struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Creates an engine with the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in template fails to compile.
    pub(crate) fn new() -> Result<Self> {
        let mut tera = Tera::default();
        Self::register_builtin_templates(&mut tera)?;
        Ok(Self { tera })
    }

    /// Creates an engine whose `kind` template is read from `path`.
    ///
    /// The file is expected to have passed
    /// [`TemplateValidator`](crate::template_validator::TemplateValidator) already.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or doesn't compile.
    pub(crate) fn with_override(kind: PromptKind, path: Option<&Path>) -> Result<Self> {
        let mut engine = Self::new()?;

        if let Some(path) = path {
            let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            engine
                .tera
                .add_raw_template(kind.template_name(), &content)
                .map_err(|e| Error::template(path.display().to_string(), e))?;
            tracing::debug!(
                "Using custom {} template from {}",
                kind.template_name(),
                path.display()
            );
        }

        Ok(engine)
    }

    fn register_builtin_templates(tera: &mut Tera) -> Result<()> {
        tera.add_raw_template(MAP_TEMPLATE, include_str!("../templates/map.tera"))
            .map_err(|e| Error::template(MAP_TEMPLATE, e))?;

        tera.add_raw_template(REFINE_TEMPLATE, include_str!("../templates/refine.tera"))
            .map_err(|e| Error::template(REFINE_TEMPLATE, e))?;

        Ok(())
    }

    /// Renders the rename request for one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub(crate) fn render_map(&self, batch: &Batch, total_batches: usize) -> Result<String> {
        let context = MapContext {
            batch_index: batch.index + 1,
            total_batches,
            filenames: &batch.filenames,
            examples: builtin_examples(),
            episode_pattern: NamingConvention::Episode.pattern(),
            feature_pattern: NamingConvention::Feature.pattern(),
        };

        self.render(MAP_TEMPLATE, &context)
    }

    /// Renders the correction request for flagged lines.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub(crate) fn render_refine(&self, flawed: &str, notes: &str) -> Result<String> {
        let context = RefineContext {
            flawed: flawed.trim(),
            notes: notes.trim(),
        };

        self.render(REFINE_TEMPLATE, &context)
    }

    fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        let mut tera_context = Context::new();
        tera_context.insert("ctx", context);

        self.tera
            .render(template_name, &tera_context)
            .map_err(|e| Error::template(template_name, e))
    }
}
