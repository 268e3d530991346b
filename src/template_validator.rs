use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tera::Tera;

/// Maximum template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Variables every prompt template may use but is not required to
const OPTIONAL_VARIABLES: &[&str] = &["examples", "batch_index", "total_batches"];

/// Validates external prompt templates
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates an external template file
    ///
    /// Performs the following checks:
    /// 1. File exists and is readable
    /// 2. File size is within limits
    /// 3. Template syntax is valid (can be compiled by Tera)
    /// 4. Template references every variable in `required`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File doesn't exist or can't be read
    /// - File is too large
    /// - Template has syntax errors
    /// - Template is missing required variables
    pub(crate) fn validate_template(path: &Path, required: &[&str]) -> Result<()> {
        if !path.exists() {
            return Err(Error::missing_file(path));
        }

        if !path.is_file() {
            return Err(Error::template_validation(
                path.to_string_lossy().to_string(),
                "Path is not a file",
            ));
        }

        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                path.to_string_lossy().to_string(),
                format!(
                    "Template file too large: {} bytes (max: {} bytes)",
                    metadata.len(),
                    MAX_TEMPLATE_SIZE
                ),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        if content.trim().is_empty() {
            return Err(Error::template_validation(
                path.to_string_lossy().to_string(),
                "Template file is empty",
            ));
        }

        let mut temp_tera = Tera::default();
        temp_tera
            .add_raw_template("validation", &content)
            .map_err(|e| {
                Error::template_validation(
                    path.to_string_lossy().to_string(),
                    format!("Template syntax error: {}", e),
                )
            })?;

        Self::check_required_variables(&content, path, required)?;
        Self::check_optional_variables(&content);

        Ok(())
    }

    /// Returns true if the template appears to reference `var`.
    ///
    /// Plain substring heuristic over the usual access forms
    /// (`{{ ctx.var }}`, `{% for x in ctx.var %}`, `ctx.var | join`).
    fn references(content: &str, var: &str) -> bool {
        let patterns = [
            format!("ctx.{}", var),
            format!("{{{{{} ", var),
            format!("{{{{ {}", var),
            format!("in {}", var),
        ];

        patterns.iter().any(|pattern| content.contains(pattern))
    }

    fn check_required_variables(content: &str, path: &Path, required: &[&str]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|var| !Self::references(content, var))
            .copied()
            .collect();

        if !missing.is_empty() {
            return Err(Error::template_validation(
                path.to_string_lossy().to_string(),
                format!(
                    "Template may be missing required variables: {}. \n\
                    Prompt templates should access: {}. \n\
                    See built-in templates for reference.",
                    missing.join(", "),
                    required.join(", ")
                ),
            ));
        }

        Ok(())
    }

    fn check_optional_variables(content: &str) {
        for var in OPTIONAL_VARIABLES {
            if !Self::references(content, var) {
                tracing::debug!("Template does not use optional variable: {}", var);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_validate_valid_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("map.tera");
        template_file
            .write_str(
                "Rename these:\n\
                {% for name in ctx.filenames %}{{ name }}\n{% endfor %}",
            )
            .unwrap();

        let result = TemplateValidator::validate_template(template_file.path(), &["filenames"]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let result = TemplateValidator::validate_template(
            Path::new("/nonexistent/template.tera"),
            &["filenames"],
        );
        assert!(result.unwrap_err().is_missing_file());
    }

    #[test]
    fn test_validate_empty_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("empty.tera");
        template_file.write_str("   \n  \n  ").unwrap();

        let result = TemplateValidator::validate_template(template_file.path(), &["filenames"]);
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_syntax_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("invalid.tera");
        template_file
            .write_str("{% if ctx.filenames %}\nUnclosed if")
            .unwrap();

        let result = TemplateValidator::validate_template(template_file.path(), &["filenames"]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Template syntax error"));
    }

    #[test]
    fn test_validate_missing_required_vars() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("refine.tera");
        template_file
            .write_str("Fix these:\n{{ ctx.flawed }}")
            .unwrap();

        let result =
            TemplateValidator::validate_template(template_file.path(), &["flawed", "notes"]);
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("missing required variables: notes"));
    }

    #[test]
    fn test_validate_file_too_large() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("large.tera");

        let large_content = "x".repeat((MAX_TEMPLATE_SIZE + 1) as usize);
        template_file.write_str(&large_content).unwrap();

        let result = TemplateValidator::validate_template(template_file.path(), &["filenames"]);
        assert!(result.unwrap_err().to_string().contains("too large"));
    }
}
