#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};

/// Deterministic content hash over NUL-separated parts.
/// Not a security hash: it builds idempotency keys and audit references.
pub fn content_hash_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
