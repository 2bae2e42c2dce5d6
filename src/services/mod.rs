//! Certificate issuance services

pub mod acm_pca;
pub mod assembler;
pub mod context;
pub mod csr;
pub mod issuer;
pub mod vault;

pub use acm_pca::{AcmPcaClient, AcmPcaIssuer, FetchedCertificate, PcaIssueRequest, PrivateCa};
pub use assembler::assemble;
pub use context::IssueContext;
pub use csr::{CsrBuilder, CsrBundle, RcgenCsrBuilder};
pub use issuer::Issuer;
pub use vault::{SignRequest, SignedCertificate, VaultClient, VaultIssuer, VaultSecret, VaultSigner};
