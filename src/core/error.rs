//! Error handling for the pagewright template pipeline.
//!
//! The error system is built around two types:
//! - [`PagewrightError`] - strongly typed errors for every failure mode in
//!   the compile, bundle, sandbox, and composition pipeline
//! - [`ErrorContext`] - a wrapper that adds user-facing suggestions and
//!   details for CLI display
//!
//! # Propagation policy
//!
//! Compile and bundle failures never escape the compiler service; they are
//! recorded on the template as `compile_error`. Sandbox failures always
//! resolve to a structured result value. The typed errors here cover the
//! cases that do propagate: missing templates, ownership violations, invalid
//! schemas, and infrastructure failures.
//!
//! Use [`user_friendly_error`] at the CLI boundary to convert any
//! [`anyhow::Error`] into a displayable [`ErrorContext`] with actionable
//! suggestions.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for pagewright operations.
#[derive(Error, Debug)]
pub enum PagewrightError {
    /// The component compiler rejected the template source.
    ///
    /// Carries the collaborator's message and, where available, a 1-based
    /// source line.
    #[error("compile error: {message}")]
    Compile {
        /// Description of what the compiler rejected
        message: String,
        /// 1-based source line of the failure, when known
        line: Option<usize>,
    },

    /// The bundler could not resolve an import.
    ///
    /// An import that is neither a virtual internal module nor a reference
    /// to the shared runtime is an error, never a silent omission.
    #[error("cannot resolve import '{import}': {reason}")]
    BundleResolution {
        /// The import path that failed to resolve
        import: String,
        /// Why resolution failed
        reason: String,
    },

    /// A referenced template slug had no compiled source available during
    /// dependency resolution.
    #[error("missing dependency '{slug}': no compiled source available")]
    MissingDependency {
        /// Slug of the unresolvable dependency
        slug: String,
    },

    /// A sandbox execution step exceeded its time budget.
    #[error("sandbox step '{step}' exceeded its {timeout_ms}ms budget")]
    SandboxTimeout {
        /// Which step timed out: "runtime-load", "bundle-load", or "render"
        step: String,
        /// The budget that was exceeded, in milliseconds
        timeout_ms: u64,
    },

    /// Code running inside the sandbox raised an error.
    #[error("sandbox execution failed: {message}")]
    SandboxRuntime {
        /// The error raised by the isolated code
        message: String,
    },

    /// A block referenced a template that does not exist.
    #[error("unknown template reference '{reference}'")]
    UnknownTemplateReference {
        /// The unresolvable template id
        reference: String,
    },

    /// No template with the given id exists.
    #[error("template '{id}' not found")]
    TemplateNotFound {
        /// The id that was looked up
        id: String,
    },

    /// Core templates reject edits and deletes.
    #[error("core template '{slug}' cannot be modified")]
    CoreTemplateImmutable {
        /// Slug of the core template
        slug: String,
    },

    /// The acting tenant does not own the template.
    #[error("template '{slug}' belongs to another tenant")]
    NotTemplateOwner {
        /// Slug of the template
        slug: String,
    },

    /// A template schema failed validation.
    #[error("invalid template schema: {reason}")]
    InvalidSchema {
        /// Why the schema was rejected
        reason: String,
    },

    /// A template slug is already taken within the owner scope.
    #[error("slug '{slug}' is already in use")]
    SlugInUse {
        /// The conflicting slug
        slug: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

/// Error context wrapper that provides user-friendly error information.
///
/// Wraps a [`PagewrightError`] with optional suggestions and details. When
/// displayed in a terminal the error is red, details yellow, and the
/// suggestion green.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: PagewrightError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: PagewrightError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add an actionable suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining why the error occurred.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`] for CLI display.
///
/// Recognized [`PagewrightError`] variants receive tailored suggestions;
/// everything else is rendered with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    match error.downcast::<PagewrightError>() {
        Ok(err) => contextualize(err),
        Err(error) => {
            let mut message = error.to_string();
            let chain: Vec<String> =
                error.chain().skip(1).map(std::string::ToString::to_string).collect();

            if !chain.is_empty() {
                message.push_str("\n\nCaused by:");
                for (i, cause) in chain.iter().enumerate() {
                    message.push_str(&format!("\n  {}: {}", i + 1, cause));
                }
            }

            ErrorContext::new(PagewrightError::Other {
                message,
            })
        }
    }
}

/// Attach suggestions and details appropriate for each error variant.
fn contextualize(error: PagewrightError) -> ErrorContext {
    let (suggestion, details): (Option<&str>, Option<String>) = match &error {
        PagewrightError::Compile {
            line, ..
        } => (
            Some("Fix the reported issue in the template source and publish again"),
            line.map(|l| format!("The compiler reported the failure at line {l}")),
        ),

        PagewrightError::BundleResolution {
            import, ..
        } => (
            Some("Imports must be '@lib/<module>', '@templates/<slug>', or 'runtime'"),
            Some(format!("The import '{import}' matched none of the resolvable forms")),
        ),

        PagewrightError::MissingDependency {
            slug,
        } => (
            Some("Publish the referenced template first, or remove the reference"),
            Some(format!(
                "The template references '@templates/{slug}' but no template with that slug has compilable source"
            )),
        ),

        PagewrightError::SandboxTimeout {
            ..
        } => (
            Some("Check the template for unbounded loops or very large data sets"),
            Some("Each sandbox step runs under its own deadline and is terminated when it expires".to_string()),
        ),

        PagewrightError::CoreTemplateImmutable {
            slug,
        } => (
            Some("Fork the template to get an editable tenant-owned copy"),
            Some(format!("'{slug}' is a shared core template and cannot be edited or deleted")),
        ),

        PagewrightError::InvalidSchema {
            ..
        } => (
            Some("Field keys must be unique and match [A-Za-z_][A-Za-z0-9_]*"),
            None,
        ),

        _ => (None, None),
    };

    let mut ctx = ErrorContext::new(error);
    if let Some(suggestion) = suggestion {
        ctx = ctx.with_suggestion(suggestion);
    }
    if let Some(details) = details {
        ctx = ctx.with_details(details);
    }
    ctx
}
