//! Error types for CAD kernel operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or meshing a CAD document.
#[derive(Error, Debug)]
pub enum KernelError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file could not be decoded by the kernel.
    #[error("Failed to read STEP: {path}: {message}")]
    Read {
        /// File being read.
        path: PathBuf,
        /// Kernel message.
        message: String,
    },

    /// The decoded data could not be transferred into a labelled document.
    #[error("Failed to transfer STEP into document: {path}: {message}")]
    Transfer {
        /// File being read.
        path: PathBuf,
        /// Kernel message.
        message: String,
    },

    /// Invalid topology (e.g., a shell whose faces cannot be rebuilt).
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// The shape handle does not belong to this document.
    #[error("Unknown shape: {0}")]
    UnknownShape(String),
}

impl KernelError {
    /// Create a read error.
    pub fn read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a transfer error.
    pub fn transfer(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Transfer {
            path: path.into(),
            message: message.into(),
        }
    }
}
