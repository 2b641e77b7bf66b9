//! Archive comparison. Reports every differing entry rather than stopping
//! at the first, so a failed round trip lists everything that moved.

use crate::digest::digest_entry;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchKind {
    OnlyInLeft,
    OnlyInRight,
    ContentDiffers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMismatch {
    pub entry: String,
    pub kind: MismatchKind,
}

impl fmt::Display for EntryMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MismatchKind::OnlyInLeft => write!(f, "{}: missing from right archive", self.entry),
            MismatchKind::OnlyInRight => write!(f, "{}: missing from left archive", self.entry),
            MismatchKind::ContentDiffers => write!(f, "{}: content differs", self.entry),
        }
    }
}

/// Compare two archives entry by entry under the canonical digest.
/// An empty result means the archives are checksum-equal.
pub fn compare_archives(
    left: &BTreeMap<String, Vec<u8>>,
    right: &BTreeMap<String, Vec<u8>>,
) -> Vec<EntryMismatch> {
    let mut mismatches = Vec::new();

    for (name, bytes) in left {
        match right.get(name) {
            None => mismatches.push(EntryMismatch {
                entry: name.clone(),
                kind: MismatchKind::OnlyInLeft,
            }),
            Some(other) => {
                if digest_entry(name, bytes) != digest_entry(name, other) {
                    mismatches.push(EntryMismatch {
                        entry: name.clone(),
                        kind: MismatchKind::ContentDiffers,
                    });
                }
            }
        }
    }
    for name in right.keys() {
        if !left.contains_key(name) {
            mismatches.push(EntryMismatch {
                entry: name.clone(),
                kind: MismatchKind::OnlyInRight,
            });
        }
    }
    mismatches
}
