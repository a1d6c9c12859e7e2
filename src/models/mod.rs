//! Data models for Shelfscan

pub mod scan;
pub mod scan_token;

pub use scan::{ScanQuery, WriteTagRequest};
pub use scan_token::ScanClaims;
