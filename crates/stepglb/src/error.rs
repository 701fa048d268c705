//! Error type for the conversion pipeline.

use std::fmt::Display;

use stepglb_kernel::KernelError;
use stepglb_kernel_tessellate::TessellateError;
use thiserror::Error;

/// Errors that abort the conversion of one file.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The kernel could not read or transfer the STEP file.
    #[error("Failed to read STEP file: {0}")]
    ReadFailure(#[source] KernelError),

    /// A shape produced no triangulation.
    #[error("No triangulation produced for shape {0}")]
    EmptyGeometry(String),

    /// A shape could not be tessellated.
    #[error("Tessellation of shape {shape} failed: {source}")]
    Tessellation {
        /// Base-shape identity.
        shape: String,
        /// Underlying failure.
        source: TessellateError,
    },

    /// Every occurrence was skipped, so the scene has no geometry.
    #[error("No geometry added (occurrence-shape export).")]
    NoInstancesExported,

    /// Building, writing or post-processing the GLB failed.
    #[error("GLB encoding failed: {0}")]
    EncodingFailure(String),

    /// A configuration file or value was rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Create an encoding error.
    pub fn encoding(message: impl Display) -> Self {
        Self::EncodingFailure(message.to_string())
    }

    /// Attribute a tessellation failure to `shape`. A shape without
    /// triangles becomes [`ConvertError::EmptyGeometry`].
    pub fn tessellation(shape: impl Display, err: TessellateError) -> Self {
        match err {
            TessellateError::EmptyGeometry => Self::EmptyGeometry(shape.to_string()),
            source => Self::Tessellation {
                shape: shape.to_string(),
                source,
            },
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Display) -> Self {
        Self::Config(message.to_string())
    }
}

impl From<KernelError> for ConvertError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::Io(io) => Self::Io(io),
            other => Self::ReadFailure(other),
        }
    }
}
