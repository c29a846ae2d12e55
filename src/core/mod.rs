//! Core types shared across the pagewright pipeline.

pub mod error;

pub use error::{ErrorContext, PagewrightError, user_friendly_error};
