//! Archive-side control records.
//!
//! Every record keeps unmodeled members in `extension_data` so entries the
//! converter does not understand still round trip under the canonical
//! checksum. Modeled members use the archive's PascalCase spelling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Template name of automatically grouped containers. The archive flags
/// grouped controls with a boolean the sources re-derive from this name.
pub const GROUP_TEMPLATE: &str = "group";

/// Kind discriminator of a function-valued custom property.
pub const FUNCTION_PROPERTY_KIND: &str = "Function";

/// One control, with its rules and child subtrees inlined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ControlRecord {
    pub name: String,
    #[serde(rename = "ControlUniqueId")]
    pub control_unique_id: String,
    pub template: TemplateRecord,
    pub rules: Vec<RuleRecord>,
    pub children: Vec<ControlRecord>,
    pub style_name: String,
    pub is_group_control: bool,
    pub has_dynamic_properties: bool,
    pub dynamic_properties: Vec<DynamicPropertyRecord>,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

impl ControlRecord {
    pub fn rule(&self, property: &str) -> Option<&RuleRecord> {
        self.rules.iter().find(|r| r.property == property)
    }

    pub fn child(&self, name: &str) -> Option<&ControlRecord> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// One named formula on a control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RuleRecord {
    pub property: String,
    pub invariant_script: String,
    pub category: String,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

/// A dynamic-property descriptor. The rule carrying its formula lives in the
/// control's ordinary rule list; this record only marks the property as
/// dynamically added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DynamicPropertyRecord {
    pub property_name: String,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

/// The template a control instantiates, inlined per instance in the archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub variant: Option<String>,
    pub is_component_definition: bool,
    pub is_component_template: bool,
    pub per_instance: bool,
    pub custom_properties: Vec<CustomPropertyRecord>,
    /// Nested template list, carried opaquely.
    pub nested_templates: Vec<Value>,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

impl TemplateRecord {
    pub fn custom_property(&self, name: &str) -> Option<&CustomPropertyRecord> {
        self.custom_properties.iter().find(|p| p.name == name)
    }

    pub fn custom_property_mut(&mut self, name: &str) -> Option<&mut CustomPropertyRecord> {
        self.custom_properties.iter_mut().find(|p| p.name == name)
    }

    pub fn function_properties(&self) -> impl Iterator<Item = &CustomPropertyRecord> {
        self.custom_properties.iter().filter(|p| p.is_function())
    }
}

/// A custom property declared by a component definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CustomPropertyRecord {
    pub name: String,
    pub property_kind: String,
    pub data_type: String,
    pub default_script: String,
    pub scope_rules: Vec<ScopeRuleRecord>,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

impl CustomPropertyRecord {
    pub fn is_function(&self) -> bool {
        self.property_kind == FUNCTION_PROPERTY_KIND
    }

    /// Parameter scope rules in parameter order. The "this" rule (negative
    /// index) is excluded.
    pub fn parameter_scope_rules(&self) -> Vec<&ScopeRuleRecord> {
        let mut rules: Vec<&ScopeRuleRecord> = self
            .scope_rules
            .iter()
            .filter(|r| r.parameter_index >= 0)
            .collect();
        rules.sort_by_key(|r| r.parameter_index);
        rules
    }

    /// The scope rule describing the function's own result, if declared.
    pub fn this_scope_rule(&self) -> Option<&ScopeRuleRecord> {
        self.scope_rules.iter().find(|r| r.parameter_index < 0)
    }
}

/// Per-parameter metadata on a function-valued custom property.
/// `parameter_index` is the zero-based position, or -1 for the rule that
/// describes the function result itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ScopeRuleRecord {
    pub name: String,
    pub default_script: String,
    pub parameter_index: i32,
    pub property_name: String,
    pub data_type: String,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

/// One external data source reference, carried opaquely apart from its name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DataSourceRecord {
    pub name: String,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_members_round_trip_through_extension_data() {
        let raw = r#"{
            "Name": "Label1",
            "ControlUniqueId": "7",
            "ZIndex": 3,
            "LayoutName": "vertical"
        }"#;
        let record: ControlRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.name, "Label1");
        assert_eq!(record.extension_data.get("ZIndex"), Some(&Value::from(3)));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back.get("LayoutName"), Some(&Value::from("vertical")));
    }

    #[test]
    fn test_parameter_scope_rules_sorted_by_index() {
        let property = CustomPropertyRecord {
            name: "Compute".into(),
            property_kind: FUNCTION_PROPERTY_KIND.into(),
            scope_rules: vec![
                ScopeRuleRecord {
                    name: "Compute".into(),
                    parameter_index: -1,
                    ..Default::default()
                },
                ScopeRuleRecord {
                    name: "b".into(),
                    parameter_index: 1,
                    ..Default::default()
                },
                ScopeRuleRecord {
                    name: "a".into(),
                    parameter_index: 0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let params: Vec<&str> = property
            .parameter_scope_rules()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(params, vec!["a", "b"]);
        assert_eq!(property.this_scope_rule().map(|r| r.name.as_str()), Some("Compute"));
    }
}
