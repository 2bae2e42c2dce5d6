//! Integration tests for the certificate issuers

mod acm_pca_tests;
