//! Output fingerprints and the determinism verdict.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};

/// SHA-256 fingerprint of one artifact's raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigestValue([u8; 32]);

impl DigestValue {
    /// Compute the SHA-256 digest of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestValue({})", &self.to_hex()[..12])
    }
}

/// Error returned when parsing a hex digest.
#[derive(Debug, thiserror::Error)]
#[error("invalid digest hex: {0}")]
pub struct InvalidDigest(pub String);

impl FromStr for DigestValue {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidDigest(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| InvalidDigest(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl Serialize for DigestValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DigestValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fingerprint the full byte stream of the file at `path`.
///
/// The file is streamed through the hasher, so telemetry files of any size are fine.
pub fn fingerprint(path: &Path) -> io::Result<DigestValue> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    Ok(DigestValue(bytes))
}

/// Binary outcome of a determinism check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeterminismVerdict {
    Pass,
    Fail,
}

impl DeterminismVerdict {
    /// Pass iff every digest equals the first one.
    pub fn from_digests(digests: &[DigestValue]) -> Self {
        match digests.split_first() {
            Some((first, rest)) if rest.iter().any(|d| d != first) => DeterminismVerdict::Fail,
            _ => DeterminismVerdict::Pass,
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, DeterminismVerdict::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickData.csv");
        let data = b"iteration,liveAgents,frameTime,tickTime\n1,10,0.1,0.2\n";
        std::fs::write(&path, data).unwrap();

        assert_eq!(fingerprint(&path).unwrap(), DigestValue::compute(data));
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = fingerprint(&dir.path().join("absent.csv")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_hex_roundtrip() {
        let digest = DigestValue::compute(b"simbench");
        let parsed: DigestValue = digest.to_hex().parse().unwrap();
        assert_eq!(parsed, digest);
        assert_eq!(digest.to_hex().len(), 64);
    }

    #[test]
    fn test_rejects_short_hex() {
        assert!("abcd".parse::<DigestValue>().is_err());
        assert!("zz".repeat(32).parse::<DigestValue>().is_err());
    }

    #[test]
    fn test_verdict_identical_digests_pass() {
        let d = DigestValue::compute(b"same");
        assert_eq!(
            DeterminismVerdict::from_digests(&[d, d, d, d, d]),
            DeterminismVerdict::Pass
        );
    }

    #[test]
    fn test_verdict_single_difference_fails() {
        let d = DigestValue::compute(b"same");
        let other = DigestValue::compute(b"sane");
        let verdict = DeterminismVerdict::from_digests(&[d, d, other, d]);
        assert_eq!(verdict, DeterminismVerdict::Fail);
        assert!(!verdict.passed());
    }

    #[test]
    fn test_digest_serializes_as_hex_string() {
        let d = DigestValue::compute(b"x");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        let back: DigestValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
