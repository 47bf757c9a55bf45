//! Unified error types for the gridmap workspace
//!
//! [`GridMapError`] separates the three failure families of a mapping run:
//! configuration mistakes (fatal before any point is evaluated), inconsistent
//! network data detected while evaluating, and I/O failures at the file
//! boundaries (network export, delta files, logs).
//!
//! # Example
//!
//! ```ignore
//! use gridmap_core::{GridMapError, GridMapResult};
//!
//! fn check_kind(id: &str) -> GridMapResult<()> {
//!     Err(GridMapError::Config(format!("unknown equipment '{id}'")))
//! }
//! ```

use thiserror::Error;

/// Error type shared by every gridmap crate.
#[derive(Error, Debug)]
pub enum GridMapError {
    /// I/O errors (file access, export targets)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration errors: incompatible variable, unknown equipment, bad distribution key
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while mapping values (non-finite series value, invalid limits)
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Network model errors (missing variant, missing equipment)
    #[error("Network error: {0}")]
    Network(String),

    /// Snapshot or delta export failures
    #[error("Export error: {0}")]
    Export(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GridMapError.
pub type GridMapResult<T> = Result<T, GridMapError>;

impl From<anyhow::Error> for GridMapError {
    fn from(err: anyhow::Error) -> Self {
        GridMapError::Other(format!("{err:#}"))
    }
}

impl From<String> for GridMapError {
    fn from(s: String) -> Self {
        GridMapError::Other(s)
    }
}

impl From<&str> for GridMapError {
    fn from(s: &str) -> Self {
        GridMapError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for GridMapError {
    fn from(err: serde_json::Error) -> Self {
        GridMapError::Parse(err.to_string())
    }
}

impl GridMapError {
    /// True for errors that must abort a run before any point is produced.
    pub fn is_config(&self) -> bool {
        matches!(self, GridMapError::Config(_))
    }
}
