use std::path::PathBuf;

use stepline_core::TreeError;

/// Wiring problems found before any step runs.
///
/// Step failures and faults are never `RunError`s: they are recorded as
/// outcomes in the execution result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// A node that needs a handler has none registered under its key.
    #[error("no handler registered for {kind} step '{key}'")]
    MissingHandler { key: String, kind: String },

    /// The handler registered under a key cannot serve that node's kind.
    #[error("handler registered for '{key}' cannot serve a {kind} step")]
    HandlerMismatch { key: String, kind: String },
}

/// Problems loading a declarative pipeline file.
#[derive(Debug, thiserror::Error)]
pub enum DeclError {
    #[error("error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML pipeline: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON pipeline: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported pipeline format '{extension}' (expected .toml or .json)")]
    UnsupportedFormat { extension: String },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Failure to simulate a declared pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SimulateError {
    #[error(transparent)]
    Decl(#[from] DeclError),

    #[error(transparent)]
    Run(#[from] RunError),
}
