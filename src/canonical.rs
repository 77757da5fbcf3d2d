//! Canonical hashing for partition fingerprints.
//!
//! Values are serialized to compact JSON and hashed with xxh64 (seed 0).
//! Only ordered collections (`Vec`, `BTreeMap`, `BTreeSet`) may be hashed;
//! a `HashMap` would make fingerprints vary between runs.

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Compute the canonical xxh64 hash of a serializable value.
///
/// Values that fail to serialize hash as the empty byte string. None of the
/// crate's hashed types can fail: they are plain integers in sequences.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    xxh64(&bytes, 0)
}

/// Canonical hash as a 16-digit lowercase hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}
