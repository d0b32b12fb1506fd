//! Passcode hashing.
//!
//! Passcodes are stored and compared only as lowercase SHA-256 hex digests.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a hex-encoded SHA-256 digest.
pub const PASSCODE_HASH_LEN: usize = 64;

/// Hash a plaintext passcode into its stored form.
pub fn hash_passcode(passcode: &str) -> String {
    hex::encode(Sha256::digest(passcode.as_bytes()))
}

/// Compare two stored-form hashes in constant time.
pub fn hashes_match(stored: &str, candidate: &str) -> bool {
    stored.len() == candidate.len() && bool::from(stored.as_bytes().ct_eq(candidate.as_bytes()))
}
