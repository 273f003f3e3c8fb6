//! Error categories raised while building or generating a material.
//!
//! Errors travel as `anyhow::Error`; callers that need to tell the categories
//! apart use `err.downcast_ref::<GenerateError>()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// Invalid construction parameters or an impossible request. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// A deliberately unimplemented branch was reached.
    #[error("not implemented: {0}")]
    Unsupported(String),

    /// A rasterizer or raymarcher found nothing to draw.
    #[error("missing geometry: {0}")]
    MissingGeometry(String),
}

impl GenerateError {
    pub fn config(msg: impl Into<String>) -> anyhow::Error {
        GenerateError::Config(msg.into()).into()
    }

    pub fn unsupported(msg: impl Into<String>) -> anyhow::Error {
        GenerateError::Unsupported(msg.into()).into()
    }
}
