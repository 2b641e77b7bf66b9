use std::fmt;

/// A place where both branches changed the same thing differently. Conflicts
/// are never fatal: the merged result keeps the first branch's version and
/// records one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    /// Dotted path to the conflicting node, e.g. `Screen1.Label1.Text`.
    pub path: String,
    pub message: String,
}

impl MergeConflict {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
