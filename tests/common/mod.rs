//! Common test utilities and helpers
//!
//! - A throwaway certificate authority
//! - A Vault sign endpoint responder for wiremock
//! - A scripted ACM Private CA

pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
