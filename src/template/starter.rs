//! Seed content for newly created templates.
//!
//! New templates start from a small working section so authors edit
//! something that already compiles and renders.

use crate::template::model::{SchemaField, TemplateSchema};
use serde_json::{Value, json};

/// Starter component source for a new template.
pub const STARTER_SOURCE: &str = r#"<script>
local heading = props.heading
local body = props.body
</script>

<section class="pw-section">
  <h2>{heading}</h2>
  {#if body}
    <p>{body}</p>
  {/if}
</section>

<style>
.pw-section { padding: 2rem 0; }
.pw-section h2 { margin-bottom: 0.5rem; }
</style>
"#;

/// Schema matching [`STARTER_SOURCE`].
#[must_use]
pub fn starter_schema() -> TemplateSchema {
    TemplateSchema {
        fields: vec![
            SchemaField {
                key: "heading".to_string(),
                field_type: "text".to_string(),
                label: "Heading".to_string(),
                required: true,
            },
            SchemaField {
                key: "body".to_string(),
                field_type: "text".to_string(),
                label: "Body".to_string(),
                required: false,
            },
        ],
    }
}

/// Preview data matching [`STARTER_SOURCE`].
#[must_use]
pub fn starter_sample_data() -> Value {
    json!({
        "heading": "New section",
        "body": "Describe this section here.",
    })
}
