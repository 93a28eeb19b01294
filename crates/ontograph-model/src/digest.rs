//! Deterministic, non-cryptographic digests for element and cache identities.
//!
//! Overlay elements, pseudo-import nodes and equivalence edges are recreated on
//! every overlay refresh, so their ids must be a pure function of their inputs.
//! The same digest suffixes on-disk cache file names so two keys that sanitize
//! to the same text never collide.
//!
//! - algorithm: **FNV-1a 64-bit**
//! - output: `"fnv1a64:<16 lowercase hex digits>"`

/// Prefix used in serialized digests.
pub const DIGEST_PREFIX: &str = "fnv1a64:";

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

fn fnv1a64(hash: &mut u64, bytes: &[u8]) {
    for b in bytes {
        *hash ^= (*b) as u64;
        *hash = hash.wrapping_mul(FNV_PRIME);
    }
}

/// Compute a digest (FNV-1a 64-bit) over arbitrary bytes.
pub fn fnv1a64_digest_bytes(bytes: &[u8]) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    fnv1a64(&mut hash, bytes);
    format!("{DIGEST_PREFIX}{hash:016x}")
}

/// Digest of an ordered list of string parts.
///
/// Parts are length-prefixed, so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn parts_digest(parts: &[&str]) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for part in parts {
        fnv1a64(&mut hash, &(part.len() as u64).to_le_bytes());
        fnv1a64(&mut hash, part.as_bytes());
    }
    format!("{hash:016x}")
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_id_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}
