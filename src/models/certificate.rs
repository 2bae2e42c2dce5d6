//! Certificate request and issued certificate models

use chrono::{DateTime, Utc};
use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384, PKCS_ED25519};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Produces the private key for one issuance
pub trait KeyGenerator: Send + Sync + fmt::Debug {
    /// Generate a fresh key pair
    fn generate(&self) -> Result<KeyPair, rcgen::Error>;
}

/// Built-in key generation strategies
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlgorithm {
    /// ECDSA on NIST P-256
    #[default]
    EcdsaP256,
    /// ECDSA on NIST P-384
    EcdsaP384,
    /// Ed25519
    Ed25519,
}

impl KeyGenerator for KeyAlgorithm {
    fn generate(&self) -> Result<KeyPair, rcgen::Error> {
        let alg = match self {
            KeyAlgorithm::EcdsaP256 => &PKCS_ECDSA_P256_SHA256,
            KeyAlgorithm::EcdsaP384 => &PKCS_ECDSA_P384_SHA384,
            KeyAlgorithm::Ed25519 => &PKCS_ED25519,
        };
        KeyPair::generate_for(alg)
    }
}

/// Logical description of the certificate to issue
///
/// The common name is passed separately to the issuer; it is not repeated in
/// `dns_names`.
#[derive(Debug, Clone)]
pub struct CertificateSpec {
    /// DNS subject alternative names, in order
    pub dns_names: Vec<String>,
    /// IP subject alternative names, in order
    pub ip_addresses: Vec<IpAddr>,
    /// Email subject alternative names
    pub email_addresses: Vec<String>,
    /// URI subject alternative names
    pub uris: Vec<String>,
    /// Custom OID/UTF8 SANs in OpenSSL form: `<oid>;UTF8:<value>`
    pub other_sans: Vec<String>,
    /// Requested validity; the issuer's configured default applies when unset
    pub validity: Option<Duration>,
    /// Key generation strategy
    pub key_generator: Arc<dyn KeyGenerator>,
}

impl Default for CertificateSpec {
    fn default() -> Self {
        Self {
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            email_addresses: Vec::new(),
            uris: Vec::new(),
            other_sans: Vec::new(),
            validity: None,
            key_generator: Arc::new(KeyAlgorithm::default()),
        }
    }
}

impl CertificateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ip_addresses(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.ip_addresses = ips.into_iter().collect();
        self
    }

    pub fn with_email_addresses<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.email_addresses = emails.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_uris<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uris = uris.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_other_sans<I, S>(mut self, sans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.other_sans = sans.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = Some(validity);
        self
    }

    pub fn with_key_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = generator;
        self
    }
}

/// Identity and validity fields of a parsed leaf certificate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeafCertificate {
    /// Subject common name, if present
    pub common_name: Option<String>,
    /// Full subject distinguished name
    pub subject: String,
    /// Full issuer distinguished name
    pub issuer: String,
    /// Serial number (colon separated hex)
    pub serial: String,
    /// Not valid before timestamp
    pub not_before: DateTime<Utc>,
    /// Not valid after timestamp
    pub not_after: DateTime<Utc>,
    /// DNS alternative names
    #[serde(default)]
    pub dns_names: Vec<String>,
    /// IP alternative names
    #[serde(default)]
    pub ip_addresses: Vec<IpAddr>,
    /// Email alternative names
    #[serde(default)]
    pub email_addresses: Vec<String>,
    /// URI alternative names
    #[serde(default)]
    pub uris: Vec<String>,
}

/// A certificate ready for use in a TLS configuration
///
/// `chain[0]` is always the leaf, followed by the CA-supplied certificates in
/// the order the CA returned them. The private key pairs with the leaf.
#[derive(Debug)]
pub struct IssuedCertificate {
    pub(crate) chain: Vec<CertificateDer<'static>>,
    pub(crate) private_key: PrivateKeyDer<'static>,
    pub(crate) leaf: LeafCertificate,
}

impl IssuedCertificate {
    /// DER-encoded chain, leaf first
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// DER-encoded private key
    pub fn private_key(&self) -> &PrivateKeyDer<'static> {
        &self.private_key
    }

    /// Parsed leaf certificate
    pub fn leaf(&self) -> &LeafCertificate {
        &self.leaf
    }

    /// PEM encoding of the chain, leaf first
    pub fn chain_pem(&self) -> String {
        let blocks: Vec<pem::Pem> = self
            .chain
            .iter()
            .map(|der| pem::Pem::new("CERTIFICATE", der.as_ref().to_vec()))
            .collect();
        pem::encode_many(&blocks)
    }

    /// Split into the parts a `rustls` server or client config expects
    pub fn into_parts(
        self,
    ) -> (
        Vec<CertificateDer<'static>>,
        PrivateKeyDer<'static>,
        LeafCertificate,
    ) {
        (self.chain, self.private_key, self.leaf)
    }
}

impl Clone for IssuedCertificate {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            private_key: self.private_key.clone_key(),
            leaf: self.leaf.clone(),
        }
    }
}
