//! Template schema validation.
//!
//! Schema field keys become Lua local bindings in compiled modules, so they
//! must be identifier-shaped and unique. Validation runs on create and on
//! every schema update, before anything reaches the compiler.

use crate::core::PagewrightError;
use crate::template::model::TemplateSchema;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("key pattern is valid")
    })
}

/// Validate that every field key is present, identifier-shaped, and unique.
pub fn validate_schema(schema: &TemplateSchema) -> Result<(), PagewrightError> {
    let mut seen = HashSet::new();

    for field in &schema.fields {
        if field.key.is_empty() {
            return Err(PagewrightError::InvalidSchema {
                reason: "field key is required".to_string(),
            });
        }

        if !key_pattern().is_match(&field.key) {
            return Err(PagewrightError::InvalidSchema {
                reason: format!(
                    "invalid key \"{}\": must start with a letter or underscore and contain only alphanumerics and underscores",
                    field.key
                ),
            });
        }

        if !seen.insert(field.key.as_str()) {
            return Err(PagewrightError::InvalidSchema {
                reason: format!("duplicate key: {}", field.key),
            });
        }
    }

    Ok(())
}
