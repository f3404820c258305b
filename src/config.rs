//! Hierarchical configuration flattened into dotted paths.
//!
//! A configuration [`Document`] of nested objects is flattened so that
//! `{"server": {"port": 8080}}` defines the variable `server.port`. Variables
//! may also be registered in code with a default value. A value observed in
//! a document always wins over the default, and once observed it can never be
//! replaced.

use std::{io, path::PathBuf};

mod document;
pub use document::{Document, Format};

mod node;
pub use node::Transform;

mod source;
pub use source::{ConfigSource, DEFAULT_BASE_DIR};

mod tree;
pub use tree::ConfigTree;

/// The scalar value held by a configuration variable.
pub use serde_json::Value;

/// Errors raised while loading or querying a [`ConfigTree`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file could not be created or read.
    #[error("Failed to access config file '{}': {source}", path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying failure.
        source: io::Error,
    },

    /// The document is not valid JSON or TOML.
    #[error("Failed to parse {format} document: {message}")]
    Parse {
        /// The format the document was parsed as.
        format: Format,
        /// The parser's description of the problem.
        message: String,
    },

    /// The document contains an array.
    #[error("Arrays are not supported in configuration documents (found at '{path}')")]
    UnsupportedNodeType {
        /// The dotted path of the array.
        path: String,
    },

    /// The document defines the same dotted path more than once.
    #[error("Configuration path '{0}' is defined more than once")]
    DuplicatePath(String),

    /// An attempt was made to replace an observed value.
    #[error("Configuration variable '{0}' is locked to its observed value")]
    NodeLocked(String),

    /// No variable exists at the path.
    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    /// The variable's value cannot be converted to the requested type.
    #[error("Variable '{path}' holds {found}, which is not a valid {expected}")]
    TypeMismatch {
        /// The dotted path of the variable.
        path: String,
        /// The requested type.
        expected: &'static str,
        /// The resolved value.
        found: String,
    },
}
