//! Template domain model, validation, persistence, and publish lifecycle.

pub mod blocks;
pub mod model;
pub mod repository;
pub mod schema;
pub mod starter;
pub mod store;

pub use blocks::validate_blocks;
pub use model::{Block, SchemaField, Template, TemplateCategory, TemplateSchema, TemplateState};
pub use repository::{NewTemplate, TemplateRepository};
pub use schema::validate_schema;
pub use store::{MemoryStore, TemplateStore};
