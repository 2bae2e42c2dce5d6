//! Certificate assembly
//!
//! Turns a PEM chain (leaf first) and a PEM private key into an
//! [`IssuedCertificate`], after checking that the key belongs to the leaf.

use chrono::{DateTime, Utc};
use rcgen::KeyPair;
use rustls::pki_types::CertificateDer;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

use crate::models::{IssuedCertificate, LeafCertificate};
use crate::utils::error::IssuerError;

/// Assemble an issued certificate from PEM inputs.
///
/// Chain order is preserved exactly as supplied.
pub fn assemble(chain_pem: &[u8], private_key_pem: &[u8]) -> Result<IssuedCertificate, IssuerError> {
    let chain = rustls_pemfile::certs(&mut &chain_pem[..])
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .map_err(|e| IssuerError::CaProtocol(format!("Failed to read certificate chain: {}", e)))?;

    let leaf_der = chain
        .first()
        .ok_or_else(|| IssuerError::CaProtocol("No certificate found in CA response".to_string()))?;

    let (_, leaf) = parse_x509_certificate(leaf_der.as_ref())
        .map_err(|e| IssuerError::CaProtocol(format!("Failed to parse leaf certificate: {}", e)))?;

    let private_key = rustls_pemfile::private_key(&mut &private_key_pem[..])
        .map_err(|e| IssuerError::Pairing(format!("Failed to read private key: {}", e)))?
        .ok_or_else(|| IssuerError::Pairing("No private key found".to_string()))?;

    verify_pairing(&leaf, private_key_pem)?;

    let leaf = describe_leaf(&leaf)?;
    debug!(
        common_name = ?leaf.common_name,
        chain_len = chain.len(),
        not_after = %leaf.not_after,
        "Assembled issued certificate"
    );

    Ok(IssuedCertificate {
        chain,
        private_key,
        leaf,
    })
}

fn verify_pairing(leaf: &X509Certificate<'_>, private_key_pem: &[u8]) -> Result<(), IssuerError> {
    let key_pem = std::str::from_utf8(private_key_pem)
        .map_err(|e| IssuerError::Pairing(format!("Private key is not valid PEM: {}", e)))?;
    let key_pair = KeyPair::from_pem(key_pem)
        .map_err(|e| IssuerError::Pairing(format!("Unsupported private key: {}", e)))?;

    let cert_public_key = leaf
        .tbs_certificate
        .subject_pki
        .subject_public_key
        .data
        .as_ref();

    if cert_public_key != key_pair.public_key_raw() {
        return Err(IssuerError::Pairing(
            "private key does not match leaf certificate public key".to_string(),
        ));
    }
    Ok(())
}

fn describe_leaf(cert: &X509Certificate<'_>) -> Result<LeafCertificate, IssuerError> {
    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    let mut leaf = LeafCertificate {
        common_name,
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: timestamp(cert.validity().not_before.timestamp(), "not_before")?,
        not_after: timestamp(cert.validity().not_after.timestamp(), "not_after")?,
        dns_names: Vec::new(),
        ip_addresses: Vec::new(),
        email_addresses: Vec::new(),
        uris: Vec::new(),
    };

    let san = cert
        .subject_alternative_name()
        .map_err(|e| IssuerError::CaProtocol(format!("Invalid SAN extension: {}", e)))?;
    if let Some(san) = san {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => leaf.dns_names.push(dns.to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = parse_ip_bytes(bytes) {
                        leaf.ip_addresses.push(ip);
                    }
                }
                GeneralName::RFC822Name(email) => leaf.email_addresses.push(email.to_string()),
                GeneralName::URI(uri) => leaf.uris.push(uri.to_string()),
                _ => {}
            }
        }
    }

    Ok(leaf)
}

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, IssuerError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| IssuerError::CaProtocol(format!("invalid {} timestamp", field)))
}

fn parse_ip_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}
