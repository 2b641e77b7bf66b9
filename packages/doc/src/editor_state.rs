//! The editor-state store: authoring metadata lifted off the formula tree
//! during a split. Unlike the entropy store this data is semantic; it is
//! grouped per top-level parent so edits to one screen touch one file.

use crate::control::RuleRecord;
use crate::error::{DocError, DocResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A recorded rule position. The combiner restores the archive's original
/// rule order from the sequence of these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PropertyState {
    pub property_name: String,
    pub category: String,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

/// A dynamically-added property together with its full rule, which has no
/// textual representation and round-trips through this store alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DynamicPropertyState {
    pub property_name: String,
    pub rule: Option<RuleRecord>,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

/// Authoring metadata of one control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ControlState {
    pub name: String,
    pub top_parent_name: String,
    /// Parent-relative order index.
    pub index: f64,
    pub style_name: String,
    /// Every rule of the original record, in original order, including rules
    /// that have no property line in the sources.
    pub properties: Vec<PropertyState>,
    pub dynamic_properties: Vec<DynamicPropertyState>,
    pub is_group_control: bool,
    pub has_dynamic_properties: bool,
    pub is_component_definition: bool,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

impl ControlState {
    pub fn property(&self, name: &str) -> Option<&PropertyState> {
        self.properties.iter().find(|p| p.property_name == name)
    }
}

/// On-disk shape of one editor-state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TopParentState {
    pub top_parent_name: String,
    pub controls: Vec<ControlState>,
}

/// All control states of a document, keyed by control name. Control names
/// are unique document-wide, so the key needs no qualification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorStateStore {
    controls: BTreeMap<String, ControlState>,
}

impl EditorStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: ControlState) -> DocResult<()> {
        let name = state.name.clone();
        if self.controls.insert(name.clone(), state).is_some() {
            return Err(DocError::structural(format!(
                "control name '{name}' appears more than once in the document"
            )));
        }
        Ok(())
    }

    pub fn get(&self, control: &str) -> Option<&ControlState> {
        self.controls.get(control)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlState> {
        self.controls.values()
    }

    /// Group states into per-top-parent files, controls sorted by name.
    pub fn to_top_parent_states(&self) -> Vec<TopParentState> {
        let mut grouped: BTreeMap<&str, Vec<ControlState>> = BTreeMap::new();
        for state in self.controls.values() {
            grouped
                .entry(state.top_parent_name.as_str())
                .or_default()
                .push(state.clone());
        }
        grouped
            .into_iter()
            .map(|(top_parent_name, controls)| TopParentState {
                top_parent_name: top_parent_name.to_string(),
                controls,
            })
            .collect()
    }

    pub fn extend_from(&mut self, file: TopParentState) -> DocResult<()> {
        for state in file.controls {
            self.insert(state)?;
        }
        Ok(())
    }
}
