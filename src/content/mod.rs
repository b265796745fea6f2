//! Test content module
//!
//! This module provides functions for:
//! - Generating random printable payloads for test files
//! - Computing MD5 fingerprints of payloads and files

pub mod checksum;
pub mod generator;

pub use checksum::{
    digest, digest_file, digest_reader, fingerprint, fingerprint_file, fingerprint_reader, RawDigest,
    FINGERPRINT_LEN,
};
pub use generator::ContentGenerator;
