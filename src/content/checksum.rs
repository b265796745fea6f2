//! Content fingerprints using MD5
//!
//! MD5 is used only as a fast content fingerprint to detect mismatches between
//! what was written and what is read back. It gives no security guarantee.
//!
//! Fingerprints are always 32 lowercase hex characters. Every byte of the
//! digest is rendered as two digits, so digests with leading zero bytes keep
//! their full width and compare equal across the in-memory and file forms.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Length of a fingerprint string (128-bit hash = 16 bytes = 32 hex chars)
pub const FINGERPRINT_LEN: usize = 32;

/// Raw MD5 digest, kept in this form wherever many digests are held at once
pub type RawDigest = [u8; 16];

/// Read buffer size for incremental hashing
const READ_BUF_SIZE: usize = 8 * 1024;

/// Compute the fingerprint of an in-memory byte sequence
///
/// # Example
///
/// ```
/// use fater::content::checksum::fingerprint;
///
/// let hash = fingerprint(b"");
/// assert_eq!(hash, "d41d8cd98f00b204e9800998ecf8427e");
/// ```
pub fn fingerprint(content: &[u8]) -> String {
    hex::encode(digest(content))
}

/// Compute the fingerprint of everything a reader yields, reading incrementally
///
/// Produces the same string as [`fingerprint`] over the same bytes.
pub fn fingerprint_reader<R: Read>(reader: R) -> io::Result<String> {
    digest_reader(reader).map(hex::encode)
}

/// Compute the fingerprint of a file's full content
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    digest_file(path).map(hex::encode)
}

/// Raw digest of an in-memory byte sequence
pub fn digest(content: &[u8]) -> RawDigest {
    Md5::digest(content).into()
}

/// Raw digest of everything a reader yields
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<RawDigest> {
    let mut hasher = Md5::new();
    let mut buffer = [0u8; READ_BUF_SIZE];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

/// Raw digest of a file's full content
pub fn digest_file(path: &Path) -> io::Result<RawDigest> {
    let file = File::open(path)?;
    digest_reader(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn is_lower_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(fingerprint(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(fingerprint(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            fingerprint(b"The quick brown fox jumps over the lazy dog"),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_leading_zero_digest_keeps_width() {
        // MD5("jk8ssl") = 00000000 18e6137a c2caab16 074784a6
        let hash = fingerprint(b"jk8ssl");
        assert_eq!(hash, "0000000018e6137ac2caab16074784a6");
        assert_eq!(hash.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_format_is_fixed_width_lower_hex() {
        for n in 0..200u32 {
            let hash = fingerprint(n.to_string().as_bytes());
            assert_eq!(hash.len(), FINGERPRINT_LEN);
            assert!(is_lower_hex(&hash), "not lowercase hex: {}", hash);
        }
    }

    #[test]
    fn test_reader_matches_memory() {
        // Spans several read buffers with a ragged tail
        let data: Vec<u8> = (0..(READ_BUF_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let from_reader = fingerprint_reader(Cursor::new(&data)).unwrap();
        assert_eq!(from_reader, fingerprint(&data));
    }

    #[test]
    fn test_file_matches_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.txt");
        let data = vec![b'x'; 100_000];

        let mut file = File::create(&path).unwrap();
        file.write_all(&data).unwrap();
        drop(file);

        assert_eq!(fingerprint_file(&path).unwrap(), fingerprint(&data));
    }

    #[test]
    fn test_raw_digest_matches_fingerprint() {
        let raw = digest(b"jk8ssl");
        assert_eq!(raw[..4], [0, 0, 0, 0]);
        assert_eq!(hex::encode(raw), fingerprint(b"jk8ssl"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(fingerprint_file(&dir.path().join("nope.txt")).is_err());
    }
}
