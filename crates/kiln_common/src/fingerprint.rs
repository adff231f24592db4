//! Content fingerprints for cache invalidation.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// A 20-byte SHA-1 content digest used to detect changed dependencies.
///
/// Two inputs with the same `Fingerprint` are assumed to have identical
/// content. The compilation cache records one fingerprint per dependency at
/// write time and compares them against the current inputs at read time;
/// any mismatch invalidates the cached program.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    /// Computes the fingerprint of a byte slice.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Wraps a digest computed elsewhere.
    pub const fn from_raw(raw: [u8; 20]) -> Self {
        Self(raw)
    }

    /// Returns the raw 20 digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = Fingerprint::of_bytes(b"define i32 @main()");
        let b = Fingerprint::of_bytes(b"define i32 @main()");
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let a = Fingerprint::of_bytes(b"module a");
        let b = Fingerprint::of_bytes(b"module b");
        assert_ne!(a, b);
    }

    #[test]
    fn known_digest() {
        // SHA-1 of the empty input.
        let h = Fingerprint::of_bytes(b"");
        assert_eq!(format!("{h}"), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn raw_roundtrip() {
        let h = Fingerprint::of_bytes(b"payload");
        let back = Fingerprint::from_raw(*h.as_bytes());
        assert_eq!(h, back);
    }

    #[test]
    fn display_format() {
        let h = Fingerprint::of_bytes(b"test");
        let s = format!("{h}");
        assert_eq!(s.len(), 40, "Display should be 40 hex chars");
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_abbreviated() {
        let h = Fingerprint::of_bytes(b"test");
        let s = format!("{h:?}");
        assert!(s.starts_with("Fingerprint("));
        assert!(s.ends_with(")"));
    }

    #[test]
    fn serde_roundtrip() {
        let h = Fingerprint::of_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
