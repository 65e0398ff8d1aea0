/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing, loading and merging.
//!
//! Only parse failures, missing resources and failing host callables stop a
//! merge. Everything else (unresolved references, null assignments, loops over
//! non-collections) is reported as a diagnostic and rendering continues.

use thiserror::Error;

/// Errors that can occur during template operations.
#[derive(Debug, Error)]
pub enum VtlError {
    /// The template text could not be parsed.
    #[error("Parse error in {template} at line {line}, column {column}: {message}")]
    Parse {
        template: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// No resource loader could supply the named resource.
    #[error("Unable to find resource '{name}'")]
    ResourceNotFound { name: String },

    /// A host method or property accessor failed while being invoked.
    #[error(
        "Invocation of method '{method}' in {reference} threw an exception at {template}[line {line}, column {column}]: {source}"
    )]
    MethodInvocation {
        method: String,
        reference: String,
        template: String,
        line: usize,
        column: usize,
        #[source]
        source: anyhow::Error,
    },

    /// `#break` was reached with no enclosing `#foreach`.
    #[error("#break at {template}[line {line}, column {column}] is not inside a #foreach loop")]
    BreakOutsideLoop {
        template: String,
        line: usize,
        column: usize,
    },

    /// Macro expansion nested deeper than the configured limit.
    #[error("Velocimacro '{name}' exceeded the maximum call depth of {max_depth}")]
    MacroDepthExceeded { name: String, max_depth: usize },

    /// `#parse` nested deeper than the configured limit.
    #[error("#parse of '{name}' exceeded the maximum depth of {max_depth}")]
    ParseDepthExceeded { name: String, max_depth: usize },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while reading a resource or configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for template operations.
pub type VtlResult<T> = Result<T, VtlError>;
