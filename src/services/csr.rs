//! Certificate signing request construction

use rcgen::string::Ia5String;
use rcgen::{CertificateParams, DnType, OtherNameValue, SanType};
use tracing::debug;

use crate::models::CertificateSpec;
use crate::utils::error::IssuerError;
use crate::utils::validation::validate_other_san;

/// PEM-encoded CSR and the matching private key
#[derive(Debug, Clone)]
pub struct CsrBundle {
    /// PEM-encoded certificate signing request
    pub csr_pem: String,
    /// PEM-encoded private key (PKCS#8)
    pub private_key_pem: String,
}

/// Builds a CSR and private key from a certificate specification
pub trait CsrBuilder: Send + Sync {
    fn build(&self, common_name: &str, spec: &CertificateSpec) -> Result<CsrBundle, IssuerError>;
}

/// Default CSR builder backed by rcgen
///
/// The subject carries only the common name. SANs are added in the order the
/// spec lists them (DNS, IP, email, URI, then custom OID/UTF8 names); the
/// common name itself is not repeated as a SAN.
#[derive(Debug, Clone, Copy, Default)]
pub struct RcgenCsrBuilder;

impl CsrBuilder for RcgenCsrBuilder {
    fn build(&self, common_name: &str, spec: &CertificateSpec) -> Result<CsrBundle, IssuerError> {
        let key_pair = spec
            .key_generator
            .generate()
            .map_err(|e| IssuerError::CsrBuild(format!("key generation failed: {}", e)))?;

        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| IssuerError::CsrBuild(format!("failed to create params: {}", e)))?;
        params
            .distinguished_name
            .push(DnType::CommonName, common_name.to_string());
        params.subject_alt_names = subject_alt_names(spec)?;

        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| IssuerError::CsrBuild(format!("CSR serialization failed: {}", e)))?;
        let csr_pem = csr
            .pem()
            .map_err(|e| IssuerError::CsrBuild(format!("CSR PEM encoding failed: {}", e)))?;

        debug!(
            common_name,
            sans = params.subject_alt_names.len(),
            "Built certificate signing request"
        );

        Ok(CsrBundle {
            csr_pem,
            private_key_pem: key_pair.serialize_pem(),
        })
    }
}

fn subject_alt_names(spec: &CertificateSpec) -> Result<Vec<SanType>, IssuerError> {
    let mut sans = Vec::with_capacity(
        spec.dns_names.len()
            + spec.ip_addresses.len()
            + spec.email_addresses.len()
            + spec.uris.len()
            + spec.other_sans.len(),
    );
    for name in &spec.dns_names {
        sans.push(SanType::DnsName(ia5("DNS", name)?));
    }
    for ip in &spec.ip_addresses {
        sans.push(SanType::IpAddress(*ip));
    }
    for email in &spec.email_addresses {
        sans.push(SanType::Rfc822Name(ia5("email", email)?));
    }
    for uri in &spec.uris {
        sans.push(SanType::URI(ia5("URI", uri)?));
    }
    for other in &spec.other_sans {
        let (oid, value) = parse_other_san(other)?;
        sans.push(SanType::OtherName((oid, OtherNameValue::Utf8String(value))));
    }
    Ok(sans)
}

/// Reject malformed custom SANs before any key is generated
pub fn check_other_sans<'a>(sans: impl IntoIterator<Item = &'a String>) -> Result<(), IssuerError> {
    match sans.into_iter().find(|s| !validate_other_san(s)) {
        Some(bad) => Err(IssuerError::Config(format!(
            "Invalid other SAN {:?}: expected <oid>;UTF8:<value>",
            bad
        ))),
        None => Ok(()),
    }
}

/// Split an OpenSSL-style `<oid>;UTF8:<value>` SAN into OID arcs and value
pub fn parse_other_san(san: &str) -> Result<(Vec<u64>, String), IssuerError> {
    let invalid = || IssuerError::CsrBuild(format!("invalid other SAN {:?}: expected <oid>;UTF8:<value>", san));

    let (oid, typed_value) = san.split_once(';').ok_or_else(invalid)?;
    let value = typed_value
        .strip_prefix("UTF8:")
        .or_else(|| typed_value.strip_prefix("UTF-8:"))
        .ok_or_else(invalid)?;

    let arcs = oid
        .split('.')
        .map(|arc| arc.parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    if arcs.len() < 2 {
        return Err(invalid());
    }

    Ok((arcs, value.to_string()))
}

fn ia5(kind: &str, value: &str) -> Result<Ia5String, IssuerError> {
    Ia5String::try_from(value.to_string())
        .map_err(|e| IssuerError::CsrBuild(format!("invalid {} SAN {:?}: {}", kind, value, e)))
}
