//! Error types and handling
//!
//! Every failure of an issuance surfaces as a single [`IssuerError`]. The
//! issuers never retry internally; retry and backoff belong to the caller.

use thiserror::Error;

/// Issuance error types
#[derive(Debug, Error)]
pub enum IssuerError {
    /// Required backend identity, credential, role or CA identifier is
    /// missing or malformed. Raised before any network call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The CSR builder failed
    #[error("CSR build error: {0}")]
    CsrBuild(String),

    /// Network or TLS failure reaching the CA
    #[error("Transport error: {0}")]
    Transport(String),

    /// The CA answered with a payload that cannot be interpreted
    #[error("CA protocol error: {0}")]
    CaProtocol(String),

    /// The CA answered with an error status or a service error
    #[error("CA request failed: {0}")]
    CaRequest(String),

    /// The CA explicitly rejected or failed the issuance request
    #[error("Issuance denied: {0}")]
    IssuanceDenied(String),

    /// The deadline elapsed or the caller cancelled before completion
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The private key does not match the leaf certificate's public key
    #[error("Key pairing error: {0}")]
    Pairing(String),
}

impl IssuerError {
    /// Short machine-readable identifier, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            IssuerError::Config(_) => "config",
            IssuerError::CsrBuild(_) => "csr_build",
            IssuerError::Transport(_) => "transport",
            IssuerError::CaProtocol(_) => "ca_protocol",
            IssuerError::CaRequest(_) => "ca_request",
            IssuerError::IssuanceDenied(_) => "issuance_denied",
            IssuerError::Timeout(_) => "timeout",
            IssuerError::Pairing(_) => "pairing",
        }
    }

    /// True for the deadline/cancellation outcome
    pub fn is_timeout(&self) -> bool {
        matches!(self, IssuerError::Timeout(_))
    }
}

impl From<reqwest::Error> for IssuerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IssuerError::CaProtocol(err.to_string())
        } else {
            IssuerError::Transport(err.to_string())
        }
    }
}

/// Result type alias for issuance operations
pub type IssuerResult<T> = Result<T, IssuerError>;
