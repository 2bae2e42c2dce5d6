//! Mock certificate authorities
//!
//! [`VaultSignResponder`] plays the Vault `sign` endpoint behind wiremock;
//! [`MockPrivateCa`] plays ACM PCA through the `PrivateCa` trait.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::{Request, Respond, ResponseTemplate};

use certify_issuers::services::{FetchedCertificate, PcaIssueRequest, PrivateCa};
use certify_issuers::IssuerError;

use super::fixtures::TestCa;

/// How the Vault responder reports the issuing chain
#[derive(Debug, Clone, Copy)]
pub enum VaultChain {
    /// `issuing_ca` only
    IssuingCa,
    /// `issuing_ca` plus a `ca_chain` with the CA repeated n times
    CaChain(usize),
    /// Neither field
    LeafOnly,
}

/// Signs the CSR of a Vault `sign` request with a [`TestCa`]
pub struct VaultSignResponder {
    ca: Arc<TestCa>,
    chain: VaultChain,
    status: u16,
    warnings: Vec<String>,
}

impl VaultSignResponder {
    pub fn new(ca: Arc<TestCa>) -> Self {
        Self {
            ca,
            chain: VaultChain::IssuingCa,
            status: 200,
            warnings: Vec::new(),
        }
    }

    pub fn with_chain(mut self, chain: VaultChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_warning(mut self, warning: &str) -> Self {
        self.warnings.push(warning.to_string());
        self
    }
}

impl Respond for VaultSignResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400).set_body_json(json!({ "errors": ["bad body"] })),
        };

        let ttl = body["ttl"]
            .as_str()
            .and_then(|t| t.trim_end_matches('s').parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));
        let certificate = self.ca.sign_csr(body["csr"].as_str().unwrap_or_default(), ttl);

        let mut data = json!({
            "certificate": certificate,
            "serial_number": "1a:2b:3c",
            "expiration": 0,
        });
        match self.chain {
            VaultChain::IssuingCa => {
                data["issuing_ca"] = json!(self.ca.cert_pem());
            }
            VaultChain::CaChain(n) => {
                data["issuing_ca"] = json!(self.ca.cert_pem());
                data["ca_chain"] = json!(vec![self.ca.cert_pem(); n]);
            }
            VaultChain::LeafOnly => {}
        }

        let warnings = if self.warnings.is_empty() {
            Value::Null
        } else {
            json!(self.warnings)
        };

        ResponseTemplate::new(self.status).set_body_json(json!({
            "request_id": "6f2c0c4e-0000-4000-8000-000000000001",
            "lease_id": "",
            "lease_duration": 0,
            "renewable": false,
            "data": data,
            "warnings": warnings,
        }))
    }
}

/// Scripted behaviour of [`MockPrivateCa`] after a certificate is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcaBehavior {
    /// Issue immediately
    Issue,
    /// Never finish issuing
    PendingForever,
    /// Refuse the request
    Denied,
}

/// In-memory ACM Private CA
pub struct MockPrivateCa {
    ca: TestCa,
    behavior: PcaBehavior,
    certificate_arn: String,
    issued: Mutex<Option<String>>,
    requests: Mutex<Vec<PcaIssueRequest>>,
    lookups: Mutex<Vec<(String, String)>>,
    pub issue_calls: AtomicUsize,
    pub wait_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl MockPrivateCa {
    pub fn new(behavior: PcaBehavior, certificate_arn: &str) -> Self {
        Self {
            ca: TestCa::new(),
            behavior,
            certificate_arn: certificate_arn.to_string(),
            issued: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
            issue_calls: AtomicUsize::new(0),
            wait_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    pub fn ca(&self) -> &TestCa {
        &self.ca
    }

    /// Every IssueCertificate request received, in order
    pub fn requests(&self) -> Vec<PcaIssueRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `(ca_arn, certificate_arn)` of every wait and fetch call, in order
    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.lock().unwrap().clone()
    }

    fn record_lookup(&self, ca_arn: &str, certificate_arn: &str) {
        self.lookups
            .lock()
            .unwrap()
            .push((ca_arn.to_string(), certificate_arn.to_string()));
    }
}

#[async_trait]
impl PrivateCa for MockPrivateCa {
    async fn issue_certificate(&self, request: &PcaIssueRequest) -> Result<String, IssuerError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let validity = Duration::from_secs(u64::from(request.validity_days) * 86_400);
        let certificate = self.ca.sign_csr(&request.csr_pem, validity);
        *self.issued.lock().unwrap() = Some(certificate);

        Ok(self.certificate_arn.clone())
    }

    async fn wait_until_issued(
        &self,
        ca_arn: &str,
        certificate_arn: &str,
    ) -> Result<(), IssuerError> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        self.record_lookup(ca_arn, certificate_arn);

        match self.behavior {
            PcaBehavior::Issue => Ok(()),
            PcaBehavior::PendingForever => std::future::pending().await,
            PcaBehavior::Denied => Err(IssuerError::IssuanceDenied(format!(
                "request for {} failed",
                certificate_arn
            ))),
        }
    }

    async fn get_certificate(
        &self,
        ca_arn: &str,
        certificate_arn: &str,
    ) -> Result<FetchedCertificate, IssuerError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.record_lookup(ca_arn, certificate_arn);

        let certificate = self
            .issued
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| IssuerError::CaRequest("no such certificate".to_string()))?;

        Ok(FetchedCertificate {
            certificate,
            certificate_chain: self.ca.cert_pem().to_string(),
        })
    }
}
