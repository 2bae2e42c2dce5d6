//! The uniform issuance contract

use async_trait::async_trait;

use crate::models::{CertificateSpec, IssuedCertificate};
use crate::services::context::IssueContext;
use crate::utils::error::IssuerError;

/// A certificate authority backend
///
/// `Ok(None)` is a defined, non-error outcome meaning the CA holds no
/// certificate for the request; only the Vault backend produces it.
#[async_trait]
pub trait Issuer: Send + Sync {
    async fn issue(
        &self,
        ctx: &IssueContext,
        common_name: &str,
        spec: &CertificateSpec,
    ) -> Result<Option<IssuedCertificate>, IssuerError>;
}
