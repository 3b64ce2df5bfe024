//! Pipeline-level error kinds.
//!
//! Only three conditions abort a request; everything upstream of them is
//! absorbed inside its stage and reflected in response metadata.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Request failed validation at the boundary (HTTP 400 at the surface).
    #[error("invalid request: {}", .0.join("; "))]
    InvalidRequest(Vec<String>),

    /// Stage 3 ended with zero providers producing recommendations
    /// (HTTP 503 at the surface).
    #[error("no providers produced recommendations")]
    NoProviders,

    /// The request-scoped cancellation token tripped (HTTP 504 at the
    /// surface).
    #[error("request cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Status the out-of-scope HTTP surface maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NoProviders => 503,
            Self::Cancelled => 504,
        }
    }
}
