pub mod conflict;
pub mod document;
pub mod tree;

pub use conflict::MergeConflict;
pub use document::{merge_documents, MergeOutcome};
pub use tree::merge_forest;
