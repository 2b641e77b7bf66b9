//! Deterministic digest over canonical trees and whole archives.
//!
//! The byte contract (part of the format, reproduce exactly):
//! - object members are hashed sorted by name, name bytes then value;
//! - array elements are hashed in the given order;
//! - strings contribute UTF-8 bytes with CRLF normalized to LF;
//! - numbers contribute their f64 little-endian bytes;
//! - `false` and `null` each contribute one zero byte, `true` one one byte.

use crate::canonical::{parse, CanonicalValue};
use sha2::{Digest, Sha256};

pub const DIGEST_LEN: usize = 32;

pub type EntryDigest = [u8; DIGEST_LEN];

/// Digest one canonical tree.
pub fn digest_value(value: &CanonicalValue) -> EntryDigest {
    let mut hasher = Sha256::new();
    update_value(&mut hasher, value);
    hasher.finalize().into()
}

/// Digest one archive entry. Entries named `*.json` are canonicalized so
/// formatting and member order do not affect the digest; anything else (and
/// JSON that fails to parse) is hashed as raw bytes.
pub fn digest_entry(name: &str, bytes: &[u8]) -> EntryDigest {
    if name.ends_with(".json") {
        if let Ok(value) = parse(bytes) {
            return digest_value(&value);
        }
    }
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Combine per-entry digests into a whole-archive digest: entry digests are
/// hashed again in filename-sorted order, names included.
pub fn digest_archive<'a>(entries: impl Iterator<Item = (&'a str, &'a [u8])>) -> EntryDigest {
    let mut digests: Vec<(&str, EntryDigest)> = entries
        .map(|(name, bytes)| (name, digest_entry(name, bytes)))
        .collect();
    digests.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, digest) in digests {
        hasher.update(name.as_bytes());
        hasher.update(digest);
    }
    hasher.finalize().into()
}

fn update_value(hasher: &mut Sha256, value: &CanonicalValue) {
    match value {
        CanonicalValue::Null | CanonicalValue::Bool(false) => hasher.update([0u8]),
        CanonicalValue::Bool(true) => hasher.update([1u8]),
        CanonicalValue::Number(n) => hasher.update(n.to_le_bytes()),
        CanonicalValue::String(s) => hasher.update(normalize_line_endings(s).as_bytes()),
        CanonicalValue::Array(items) => {
            for item in items {
                update_value(hasher, item);
            }
        }
        CanonicalValue::Object(members) => {
            let mut sorted: Vec<&(String, CanonicalValue)> = members.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, member) in sorted {
                hasher.update(name.as_bytes());
                update_value(hasher, member);
            }
        }
    }
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}
