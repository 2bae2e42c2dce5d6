//! ACM PCA issuer tests against a scripted private CA

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use certify_issuers::config::SigningAlgorithm;
use certify_issuers::{AcmPcaConfig, AcmPcaIssuer, CertificateSpec, IssueContext, Issuer, IssuerError};

use crate::common::{MockPrivateCa, PcaBehavior, TEST_CA_NAME};

const CA_ARN: &str = "someARN";
const CERT_ARN: &str = "anotherARN";

fn config() -> AcmPcaConfig {
    AcmPcaConfig {
        ca_arn: CA_ARN.to_string(),
        ..AcmPcaConfig::default()
    }
}

fn issuer(mock: &Arc<MockPrivateCa>, config: AcmPcaConfig) -> AcmPcaIssuer {
    AcmPcaIssuer::new(mock.clone(), config).unwrap()
}

#[tokio::test]
async fn test_acm_pca_issues_certificate() {
    let mock = Arc::new(MockPrivateCa::new(PcaBehavior::Issue, CERT_ARN));
    let issuer = issuer(&mock, config());
    let spec = CertificateSpec::new()
        .with_dns_names(["extraname.com"])
        .with_validity(Duration::from_secs(25 * 86_400));

    let issued = issuer
        .issue(&IssueContext::background(), "somename.com", &spec)
        .await
        .unwrap()
        .expect("ACM PCA always returns a certificate");

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].ca_arn, CA_ARN);
    assert_eq!(requests[0].validity_days, 25);
    assert_eq!(requests[0].signing_algorithm, SigningAlgorithm::Sha256WithRsa);
    assert!(requests[0].csr_pem.contains("BEGIN CERTIFICATE REQUEST"));

    assert_eq!(
        mock.lookups(),
        vec![
            (CA_ARN.to_string(), CERT_ARN.to_string()),
            (CA_ARN.to_string(), CERT_ARN.to_string()),
        ]
    );

    let leaf = issued.leaf();
    assert_eq!(leaf.common_name.as_deref(), Some("somename.com"));
    assert_eq!(leaf.dns_names, vec!["extraname.com".to_string()]);
    assert!(leaf.issuer.contains(TEST_CA_NAME));

    let expected = Utc::now() + chrono::Duration::days(25);
    let drift = (leaf.not_after - expected).num_seconds().abs();
    assert!(drift <= 5, "NotAfter off by {drift}s");

    assert_eq!(issued.chain().len(), 2);
}

#[tokio::test]
async fn test_acm_pca_uses_configured_validity() {
    let mock = Arc::new(MockPrivateCa::new(PcaBehavior::Issue, CERT_ARN));
    let mut config = config();
    config.validity_days = 7;
    config.signing_algorithm = SigningAlgorithm::Sha256WithEcdsa;

    issuer(&mock, config)
        .issue(&IssueContext::background(), "week.example.com", &CertificateSpec::new())
        .await
        .unwrap();

    let request = &mock.requests()[0];
    assert_eq!(request.validity_days, 7);
    assert_eq!(request.signing_algorithm, SigningAlgorithm::Sha256WithEcdsa);
}

#[tokio::test]
async fn test_acm_pca_timeout_skips_fetch() {
    let mock = Arc::new(MockPrivateCa::new(PcaBehavior::PendingForever, CERT_ARN));
    let issuer = issuer(&mock, config());

    let ctx = IssueContext::with_timeout(Duration::from_millis(200));
    let err = issuer
        .issue(&ctx, "slow.example.com", &CertificateSpec::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(mock.issue_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.wait_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.get_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_acm_pca_max_wait_bounds_issuance() {
    let mock = Arc::new(MockPrivateCa::new(PcaBehavior::PendingForever, CERT_ARN));
    let mut config = config();
    config.max_wait_secs = 1;

    let err = issuer(&mock, config)
        .issue(&IssueContext::background(), "slow.example.com", &CertificateSpec::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IssuerError::Timeout(_)));
    assert_eq!(mock.get_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_acm_pca_denied_request() {
    let mock = Arc::new(MockPrivateCa::new(PcaBehavior::Denied, CERT_ARN));

    let err = issuer(&mock, config())
        .issue(&IssueContext::background(), "denied.example.com", &CertificateSpec::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IssuerError::IssuanceDenied(_)));
    assert_eq!(mock.get_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_acm_pca_cancelled_while_waiting() {
    let mock = Arc::new(MockPrivateCa::new(PcaBehavior::PendingForever, CERT_ARN));
    let issuer = issuer(&mock, config());

    let token = CancellationToken::new();
    let ctx = IssueContext::with_cancellation(token.clone());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = issuer
        .issue(&ctx, "cancelled.example.com", &CertificateSpec::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(mock.get_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_acm_pca_requires_ca_arn() {
    let mock = Arc::new(MockPrivateCa::new(PcaBehavior::Issue, CERT_ARN));
    let result = AcmPcaIssuer::new(mock.clone(), AcmPcaConfig::default());

    assert!(matches!(result, Err(IssuerError::Config(_))));
    assert_eq!(mock.issue_calls.load(Ordering::SeqCst), 0);
}
