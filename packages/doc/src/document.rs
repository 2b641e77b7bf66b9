//! The unpacked document: everything a source tree holds, in memory.

use crate::archive::{source_layout, SourceTree};
use crate::control::DataSourceRecord;
use crate::editor_state::{EditorStateStore, TopParentState};
use crate::entropy::Entropy;
use crate::error::{DocError, DocResult};
use crate::templates::TemplateStore;
use canvasml_common::{Diagnostic, Diagnostics};
use canvasml_parser::{parse_source, write_block, BlockNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Non-volatile document metadata that has no home in the readable sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Manifest {
    pub header: Value,
    pub properties: Value,
    pub templates: TemplateStore,
    pub themes: Value,
}

/// A whole document in source form: IR trees plus the three side-channel
/// stores and the opaque leftovers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceDocument {
    pub manifest: Manifest,
    /// Top-level control trees in source file name order.
    pub controls: Vec<BlockNode>,
    pub editor_state: EditorStateStore,
    pub entropy: Entropy,
    pub data_sources: BTreeMap<String, DataSourceRecord>,
    /// Archive entries carried byte for byte, keyed by original entry name.
    pub other: BTreeMap<String, Vec<u8>>,
}

impl SourceDocument {
    /// Load a document from a source tree. A missing entropy store is fine
    /// (that is its contract); a missing manifest is not.
    pub fn load(tree: &SourceTree) -> DocResult<(Self, Diagnostics)> {
        use source_layout::*;

        let mut diagnostics = Diagnostics::new();

        let manifest: Manifest = tree.read_json(MANIFEST)?.ok_or_else(|| {
            DocError::integrity(vec![Diagnostic::error(format!("{MANIFEST} is missing"))])
        })?;

        let entropy = match tree.read_json::<Entropy>(ENTROPY)? {
            Some(entropy) => entropy,
            None => {
                diagnostics.push(Diagnostic::warning(
                    "entropy store missing; the packed archive will be semantically \
                     equal but byte-different",
                ));
                Entropy::default()
            }
        };

        let mut editor_state = EditorStateStore::new();
        let mut controls = Vec::new();
        let mut data_sources = BTreeMap::new();
        let mut other = BTreeMap::new();

        for (file, bytes) in tree.files() {
            if file == MANIFEST || file == ENTROPY {
                continue;
            }
            if file.starts_with(EDITOR_STATE_PREFIX) && file.ends_with(EDITOR_STATE_SUFFIX) {
                let state: TopParentState = tree
                    .read_json(file)?
                    .ok_or_else(|| DocError::structural(format!("{file}: unreadable")))?;
                editor_state.extend_from(state)?;
                continue;
            }
            if file.starts_with(SRC_PREFIX) && file.ends_with(SRC_SUFFIX) {
                let text = tree
                    .read_text(file)?
                    .ok_or_else(|| DocError::structural(format!("{file}: unreadable")))?;
                let parsed =
                    parse_source(text).map_err(|e| DocError::parse(file.to_string(), e))?;
                diagnostics.extend(parsed.diagnostics);
                if parsed.blocks.len() != 1 {
                    return Err(DocError::structural(format!(
                        "{file}: expected exactly one top-level control, found {}",
                        parsed.blocks.len()
                    )));
                }
                let block = parsed.blocks.into_iter().next().ok_or_else(|| {
                    DocError::structural(format!("{file}: expected one top-level control"))
                })?;
                let stem = &file[SRC_PREFIX.len()..file.len() - SRC_SUFFIX.len()];
                if stem != block.name.identifier {
                    diagnostics.push(Diagnostic::warning(format!(
                        "{file}: file name does not match control '{}'",
                        block.name.identifier
                    )));
                }
                controls.push(block);
                continue;
            }
            if file.starts_with(DATA_SOURCE_PREFIX) && file.ends_with(".json") {
                let record: DataSourceRecord = tree
                    .read_json(file)?
                    .ok_or_else(|| DocError::structural(format!("{file}: unreadable")))?;
                data_sources.insert(record.name.clone(), record);
                continue;
            }
            if let Some(path) = file.strip_prefix(OTHER_PREFIX) {
                other.insert(path.to_string(), bytes.to_vec());
                continue;
            }
            diagnostics.push(Diagnostic::warning(format!("{file}: unrecognized file ignored")));
        }

        Ok((
            Self {
                manifest,
                controls,
                editor_state,
                entropy,
                data_sources,
                other,
            },
            diagnostics,
        ))
    }

    /// Write the document out as a source tree. The inverse of [`load`];
    /// output is deterministic for a given document.
    ///
    /// [`load`]: SourceDocument::load
    pub fn save(&self) -> DocResult<SourceTree> {
        use source_layout::*;

        let mut tree = SourceTree::new();
        tree.write_json(MANIFEST, &self.manifest)?;
        if !self.entropy.is_empty() {
            tree.write_json(ENTROPY, &self.entropy)?;
        }
        for block in &self.controls {
            let text = write_block(block)?;
            tree.insert(
                format!("{SRC_PREFIX}{}{SRC_SUFFIX}", block.name.identifier),
                text.into_bytes(),
            );
        }
        for group in self.editor_state.to_top_parent_states() {
            tree.write_json(
                format!(
                    "{EDITOR_STATE_PREFIX}{}{EDITOR_STATE_SUFFIX}",
                    group.top_parent_name
                ),
                &group,
            )?;
        }
        for (name, record) in &self.data_sources {
            tree.write_json(format!("{DATA_SOURCE_PREFIX}{name}.json"), record)?;
        }
        for (path, bytes) in &self.other {
            tree.insert(format!("{OTHER_PREFIX}{path}"), bytes.clone());
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load_round_trips() {
        let mut document = SourceDocument::default();
        document.manifest.header = serde_json::json!({"DocVersion": "1.3"});
        document
            .controls
            .push(parse_source("Screen1 As screen:\n    X: =1\n").unwrap().blocks.remove(0));
        document.entropy.record_control_id("Screen1", "4");
        document
            .other
            .insert("Assets/logo.png".into(), vec![0x89, 0x50]);

        let tree = document.save().unwrap();
        assert!(tree.contains("Src/Screen1.cml"));
        assert!(tree.contains("Other/Assets/logo.png"));

        let (loaded, diagnostics) = SourceDocument::load(&tree).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(loaded.manifest.header, document.manifest.header);
        assert_eq!(loaded.entropy, document.entropy);
        assert_eq!(loaded.other, document.other);
        assert_eq!(
            loaded.controls[0].without_spans(),
            document.controls[0].without_spans()
        );
    }

    #[test]
    fn test_missing_manifest_is_an_integrity_error() {
        let tree = SourceTree::new();
        assert!(matches!(
            SourceDocument::load(&tree),
            Err(DocError::Integrity { .. })
        ));
    }

    #[test]
    fn test_missing_entropy_is_tolerated_with_a_warning() {
        let mut document = SourceDocument::default();
        document.entropy.record_control_id("Screen1", "4");
        let mut tree = document.save().unwrap();
        tree.remove(source_layout::ENTROPY);

        let (loaded, diagnostics) = SourceDocument::load(&tree).unwrap();
        assert!(loaded.entropy.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }
}
