//! Error types for biomesh.
//!
//! This module defines all error types used throughout the library.
//! Recoverable stage outcomes (an empty isosurface, a coarsening pass that
//! found nothing to collapse) are reported as status values by the stages
//! themselves and never appear here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur while building, repairing or exporting meshes.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Malformed or empty atom/grid/mesh data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A face references a vertex index outside the vertex array.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// Adjacency was used while missing, stale or corrupted.
    #[error("topology inconsistent: {0}")]
    TopologyInconsistent(String),

    /// The tetrahedralization backend rejected the geometry.
    #[error("tetrahedralization failed: {0}")]
    ExternalMesherFailure(String),

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension or format tag.
        extension: String,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading data from file.
    #[error("failed to load {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving data to file.
    #[error("failed to save {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        MeshError::InvalidInput(message.into())
    }

    /// Create a topology error.
    pub fn topology(message: impl Into<String>) -> Self {
        MeshError::TopologyInconsistent(message.into())
    }

    pub(crate) fn load(path: &std::path::Path, message: impl Into<String>) -> Self {
        MeshError::LoadError {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}
