//! Block list validation.
//!
//! Pages and layout regions store ordered block lists. Before saving, every
//! non-sentinel template reference must resolve against the tenant's visible
//! templates. At resolution time unresolved references are merely dropped;
//! this check exists so the editor can reject them up front.

use crate::constants::FORM_BLOCK_SENTINEL;
use crate::core::PagewrightError;
use crate::template::model::{Block, Template};
use std::collections::HashSet;

/// Validate that every block references an existing template or the
/// reserved form sentinel.
pub fn validate_blocks(blocks: &[Block], templates: &[Template]) -> Result<(), PagewrightError> {
    let ids: HashSet<&str> = templates.iter().map(|t| t.id.as_str()).collect();

    for block in blocks {
        if block.template_id.is_empty() || block.template_id == FORM_BLOCK_SENTINEL {
            continue;
        }
        if !ids.contains(block.template_id.as_str()) {
            return Err(PagewrightError::UnknownTemplateReference {
                reference: block.template_id.clone(),
            });
        }
    }

    Ok(())
}
