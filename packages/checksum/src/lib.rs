pub mod canonical;
pub mod compare;
pub mod digest;

pub use canonical::{parse, CanonicalValue};
pub use compare::{compare_archives, EntryMismatch, MismatchKind};
pub use digest::{digest_archive, digest_entry, digest_value, EntryDigest, DIGEST_LEN};
