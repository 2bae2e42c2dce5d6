//! Data models

pub mod certificate;

pub use certificate::*;
