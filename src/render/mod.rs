//! Rendering: output sanitization, static markup extraction, and block
//! resolution.

pub mod extract;
pub mod resolve;
pub mod sanitize;

pub use extract::{extract_markup, extract_style_block};
pub use resolve::{BlockResolver, NATIVE_SECTION_TYPES, ResolveResult, ResolvedBlock};
pub use sanitize::sanitize_rendered_html;
