//! The template store: canonical template records shared by every instance,
//! plus per-instance templates that are keyed by host control name instead.

use crate::control::TemplateRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TemplateStore {
    /// Shared templates, keyed by template name. First sighting wins; later
    /// instances that differ are echoed into the entropy store instead.
    templates: BTreeMap<String, TemplateRecord>,
    /// Per-instance templates, keyed by the host control's name.
    per_instance_templates: BTreeMap<String, TemplateRecord>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty() && self.per_instance_templates.is_empty()
    }

    /// Record a template seen on a control during a split. Returns the
    /// canonical record this instance will be compared against.
    pub fn observe(&mut self, control: &str, template: &TemplateRecord) -> &TemplateRecord {
        if template.per_instance {
            self.per_instance_templates
                .insert(control.to_string(), template.clone());
            &self.per_instance_templates[control]
        } else {
            self.templates
                .entry(template.name.clone())
                .or_insert_with(|| template.clone())
        }
    }

    /// Overwrite the stored record for a template resolved while combining,
    /// so later instances see repopulated metadata.
    pub fn store_resolved(&mut self, control: &str, template: &TemplateRecord) {
        if template.per_instance {
            self.per_instance_templates
                .insert(control.to_string(), template.clone());
        } else {
            self.templates
                .insert(template.name.clone(), template.clone());
        }
    }

    pub fn template(&self, name: &str) -> Option<&TemplateRecord> {
        self.templates.get(name)
    }

    pub fn per_instance_template(&self, control: &str) -> Option<&TemplateRecord> {
        self.per_instance_templates.get(control)
    }

    pub fn insert_template(&mut self, template: TemplateRecord) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn shared_templates(&self) -> impl Iterator<Item = &TemplateRecord> {
        self.templates.values()
    }

    pub fn per_instance_entries(&self) -> impl Iterator<Item = (&str, &TemplateRecord)> {
        self.per_instance_templates
            .iter()
            .map(|(control, template)| (control.as_str(), template))
    }

    pub fn insert_per_instance(&mut self, control: impl Into<String>, template: TemplateRecord) {
        self.per_instance_templates.insert(control.into(), template);
    }
}
