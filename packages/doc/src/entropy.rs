//! The entropy store: volatile values lifted out of the archive so the
//! readable sources stay diffable, kept only to reproduce the original
//! archive bytes. Deleting this store must never change document semantics,
//! so every accessor has a deterministic fallback at the call site.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Entropy {
    /// Control name to numeric unique id, for ids that look like counters.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub control_counter_ids: BTreeMap<String, u32>,
    /// Control name to opaque unique id, for everything else.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub control_unique_ids: BTreeMap<String, String>,
    /// Control name to the inlined template copy observed on that instance,
    /// recorded only when it differs from the canonical template.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub template_echoes: BTreeMap<String, Value>,
    /// `"Control.Parameter"` to the generated parameter rule's script, when
    /// it differs from the scope-rule default.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub function_param_scripts: BTreeMap<String, String>,
    /// Original position of each entry in the data source reference list.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data_source_order: BTreeMap<String, u32>,
    /// Original position of each entry in the template reference list.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub template_order: BTreeMap<String, u32>,
    /// Whether the archive carried a data source reference list at all; an
    /// empty list is still an entry and must come back on pack.
    #[serde(skip_serializing_if = "is_false")]
    pub data_source_list_present: bool,
    /// Whether the archive carried a template reference list at all.
    #[serde(skip_serializing_if = "is_false")]
    pub template_list_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_last_saved: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_file_name: Option<Value>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl Entropy {
    pub fn is_empty(&self) -> bool {
        *self == Entropy::default()
    }

    /// Record a control's unique id, classifying all-digit ids as counters.
    pub fn record_control_id(&mut self, control: &str, id: &str) {
        let looks_numeric = !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit());
        if looks_numeric {
            if let Ok(counter) = id.parse::<u32>() {
                self.control_counter_ids.insert(control.to_string(), counter);
                return;
            }
        }
        self.control_unique_ids
            .insert(control.to_string(), id.to_string());
    }

    pub fn control_id(&self, control: &str) -> Option<String> {
        if let Some(counter) = self.control_counter_ids.get(control) {
            return Some(counter.to_string());
        }
        self.control_unique_ids.get(control).cloned()
    }

    /// Mint a fresh counter id: one past the highest recorded counter.
    pub fn assign_control_id(&mut self, control: &str) -> u32 {
        let next = self
            .control_counter_ids
            .values()
            .max()
            .map_or(1, |max| max.saturating_add(1));
        self.control_counter_ids.insert(control.to_string(), next);
        next
    }

    pub fn set_template_echo(&mut self, control: &str, template: Value) {
        self.template_echoes.insert(control.to_string(), template);
    }

    pub fn template_echo(&self, control: &str) -> Option<&Value> {
        self.template_echoes.get(control)
    }

    fn param_key(control: &str, parameter: &str) -> String {
        format!("{control}.{parameter}")
    }

    pub fn record_param_script(&mut self, control: &str, parameter: &str, script: String) {
        self.function_param_scripts
            .insert(Self::param_key(control, parameter), script);
    }

    pub fn param_script(&self, control: &str, parameter: &str) -> Option<&str> {
        self.function_param_scripts
            .get(&Self::param_key(control, parameter))
            .map(String::as_str)
    }

    pub fn set_data_source_order(&mut self, name: &str, position: u32) {
        self.data_source_order.insert(name.to_string(), position);
    }

    pub fn data_source_order(&self, name: &str) -> Option<u32> {
        self.data_source_order.get(name).copied()
    }

    pub fn set_template_order(&mut self, name: &str, position: u32) {
        self.template_order.insert(name.to_string(), position);
    }

    pub fn template_order(&self, name: &str) -> Option<u32> {
        self.template_order.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_digit_ids_are_counters() {
        let mut entropy = Entropy::default();
        entropy.record_control_id("Label1", "12");
        entropy.record_control_id("Label2", "a1b2");

        assert_eq!(entropy.control_counter_ids.get("Label1"), Some(&12));
        assert_eq!(
            entropy.control_unique_ids.get("Label2"),
            Some(&"a1b2".to_string())
        );
        assert_eq!(entropy.control_id("Label1"), Some("12".to_string()));
    }

    #[test]
    fn test_fresh_id_is_one_past_the_max() {
        let mut entropy = Entropy::default();
        entropy.record_control_id("A", "3");
        entropy.record_control_id("B", "9");
        assert_eq!(entropy.assign_control_id("C"), 10);
        assert_eq!(entropy.control_id("C"), Some("10".to_string()));
    }

    #[test]
    fn test_fresh_id_on_empty_store_is_one() {
        let mut entropy = Entropy::default();
        assert_eq!(entropy.assign_control_id("A"), 1);
    }

    #[test]
    fn test_empty_store_serializes_to_empty_object() {
        let json = serde_json::to_string(&Entropy::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_param_scripts_keyed_by_control_and_parameter() {
        let mut entropy = Entropy::default();
        entropy.record_param_script("Comp1", "x", "42".into());
        assert_eq!(entropy.param_script("Comp1", "x"), Some("42"));
        assert_eq!(entropy.param_script("Comp2", "x"), None);
    }
}
