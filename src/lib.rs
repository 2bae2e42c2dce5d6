//! Certify Issuers
//!
//! Obtains X.509 certificates from a HashiCorp Vault PKI engine or an AWS ACM
//! Private CA behind a single [`Issuer`] contract.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{AcmPcaConfig, CertifyConfig, VaultConfig};
pub use models::{CertificateSpec, IssuedCertificate, KeyAlgorithm, KeyGenerator, LeafCertificate};
pub use services::{AcmPcaIssuer, IssueContext, Issuer, VaultIssuer};
pub use utils::{IssuerError, IssuerResult};
