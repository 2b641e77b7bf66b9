//! In-memory containers for the two physical representations: the packed
//! archive and the readable source tree. Both are flat maps from
//! forward-slash entry names to bytes; persistence is the caller's concern.

use crate::error::{DocError, DocResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Entry names of the packed archive.
pub mod archive_layout {
    pub const HEADER: &str = "Header.json";
    pub const PROPERTIES: &str = "Properties.json";
    pub const CONTROLS_PREFIX: &str = "Controls/";
    pub const COMPONENTS_PREFIX: &str = "Components/";
    pub const DATA_SOURCES: &str = "References/DataSources.json";
    pub const TEMPLATES: &str = "References/Templates.json";
    pub const THEMES: &str = "References/Themes.json";
}

/// File names of the unpacked source tree.
pub mod source_layout {
    pub const MANIFEST: &str = "Manifest.json";
    pub const ENTROPY: &str = "Entropy/Entropy.json";
    pub const SRC_PREFIX: &str = "Src/";
    pub const SRC_SUFFIX: &str = ".cml";
    pub const EDITOR_STATE_PREFIX: &str = "Src/EditorState/";
    pub const EDITOR_STATE_SUFFIX: &str = ".editorstate.json";
    pub const DATA_SOURCE_PREFIX: &str = "DataSources/";
    pub const OTHER_PREFIX: &str = "Other/";
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Archive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, Vec<u8>>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(name.into(), bytes);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn into_entries(self) -> BTreeMap<String, Vec<u8>> {
        self.entries
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> DocResult<Option<T>> {
        match self.entries.get(name) {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| DocError::json(name, e)),
        }
    }

    pub fn write_json<T: Serialize>(&mut self, name: impl Into<String>, value: &T) -> DocResult<()> {
        let name = name.into();
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| DocError::json(&name, e))?;
        self.entries.insert(name, bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(name.into(), bytes);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in name order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> DocResult<Option<T>> {
        match self.files.get(name) {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| DocError::json(name, e)),
        }
    }

    pub fn write_json<T: Serialize>(&mut self, name: impl Into<String>, value: &T) -> DocResult<()> {
        let name = name.into();
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| DocError::json(&name, e))?;
        self.files.insert(name, bytes);
        Ok(())
    }

    pub fn read_text(&self, name: &str) -> DocResult<Option<&str>> {
        match self.files.get(name) {
            None => Ok(None),
            Some(bytes) => std::str::from_utf8(bytes)
                .map(Some)
                .map_err(|_| DocError::structural(format!("{name}: not valid UTF-8"))),
        }
    }
}
