//! Error kinds for the translation kernel.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors the kernel can raise while translating requests, responses, or streams.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The source request/response violates one of the data-model invariants
    /// (bad block ordering, a `tool_result` with no matching `tool_use`, a
    /// named `tool_choice` naming a tool that isn't in `tools`).
    #[error("invalid shape: {reason}")]
    InvalidShape { reason: String },

    /// The destination protocol has no faithful way to express a source shape.
    #[error("unsupported feature translating {src} -> {dst}: {feature}")]
    UnsupportedFeature { src: &'static str, dst: &'static str, feature: String },

    /// The upstream stream violated its own protocol's grammar (e.g. a
    /// tool-call fragment referencing a block index that was never opened).
    #[error("upstream protocol violation: {0}")]
    UpstreamProtocol(String),

    /// The upstream iterator yielded a transport-level error.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// Something the kernel did not expect; caught at the streaming
    /// boundary and downgraded to a best-effort error frame.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::InvalidShape { reason: format!("malformed JSON: {err}") }
    }
}

impl KernelError {
    /// A short machine-readable tag, used when framing protocol error events
    /// and in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::InvalidShape { .. } => "invalid_shape",
            KernelError::UnsupportedFeature { .. } => "unsupported_feature",
            KernelError::UpstreamProtocol(_) => "upstream_protocol",
            KernelError::UpstreamTransport(_) => "upstream_transport",
            KernelError::Internal(_) => "internal",
        }
    }
}
