//! The two top-level conversions: packed archive to readable source tree
//! and back. Both directions are deterministic; `pack(unpack(a))` is
//! checksum-equal to `a` as long as the stores produced by `unpack` survive.

use crate::archive::{archive_layout, Archive, SourceTree};
use crate::combiner::{combine_control, CombineContext};
use crate::control::{ControlRecord, DataSourceRecord, TemplateRecord};
use crate::document::{Manifest, SourceDocument};
use crate::editor_state::EditorStateStore;
use crate::entropy::Entropy;
use crate::error::{DocError, DocResult};
use crate::splitter::{split_control, SplitContext};
use crate::templates::TemplateStore;
use canvasml_common::{Diagnostic, Diagnostics};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Member lifted from `Header.json` into the entropy store.
const LAST_SAVED: &str = "LastSavedDateTimeUTC";
/// Member lifted from `Properties.json` into the entropy store.
const LOGO_FILE_NAME: &str = "LogoFileName";

/// On-disk shape of `References/DataSources.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DataSourcesFile {
    data_sources: Vec<DataSourceRecord>,
}

#[derive(Debug, Clone)]
pub struct Unpacked {
    pub source: SourceTree,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct Packed {
    pub archive: Archive,
    pub diagnostics: Vec<Diagnostic>,
}

/// Convert a packed archive into the readable source tree.
pub fn unpack(archive: &Archive) -> DocResult<Unpacked> {
    use archive_layout::*;

    let mut diagnostics = Diagnostics::new();
    let mut problems = Vec::new();

    let mut header: Value = match archive.read_json(HEADER)? {
        Some(value) => value,
        None => {
            problems.push(Diagnostic::error(format!("{HEADER} is missing")));
            Value::Null
        }
    };
    let mut properties: Value = match archive.read_json(PROPERTIES)? {
        Some(value) => value,
        None => {
            problems.push(Diagnostic::error(format!("{PROPERTIES} is missing")));
            Value::Null
        }
    };
    if !problems.is_empty() {
        return Err(DocError::integrity(problems));
    }

    let mut entropy = Entropy::default();
    if let Some(members) = header.as_object_mut() {
        entropy.header_last_saved = members.remove(LAST_SAVED);
    }
    if let Some(members) = properties.as_object_mut() {
        entropy.logo_file_name = members.remove(LOGO_FILE_NAME);
    }

    let mut data_sources = BTreeMap::new();
    if let Some(file) = archive.read_json::<DataSourcesFile>(DATA_SOURCES)? {
        entropy.data_source_list_present = true;
        for (position, record) in file.data_sources.into_iter().enumerate() {
            entropy.set_data_source_order(&record.name, position as u32);
            data_sources.insert(record.name.clone(), record);
        }
    }

    let mut templates = TemplateStore::new();
    if let Some(list) = archive.read_json::<Vec<TemplateRecord>>(TEMPLATES)? {
        entropy.template_list_present = true;
        for (position, template) in list.into_iter().enumerate() {
            entropy.set_template_order(&template.name, position as u32);
            templates.insert_template(template);
        }
    }

    let themes: Value = archive.read_json(THEMES)?.unwrap_or(Value::Null);

    let mut editor_state = EditorStateStore::new();
    let mut controls = Vec::new();
    let mut other = BTreeMap::new();
    {
        let mut ctx = SplitContext {
            templates: &mut templates,
            entropy: &mut entropy,
            editor_state: &mut editor_state,
            diagnostics: &mut diagnostics,
        };
        let mut position = 0usize;
        for (entry, bytes) in archive.entries() {
            let is_control = entry.starts_with(CONTROLS_PREFIX)
                || entry.starts_with(COMPONENTS_PREFIX);
            if is_control && entry.ends_with(".json") {
                let record: ControlRecord =
                    serde_json::from_slice(bytes).map_err(|e| DocError::json(entry, e))?;
                debug!(entry, control = %record.name, "splitting top-level control");
                controls.push(split_control(&record, &record.name, position, &mut ctx)?);
                position += 1;
                continue;
            }
            if matches!(entry, HEADER | PROPERTIES | DATA_SOURCES | TEMPLATES | THEMES) {
                continue;
            }
            other.insert(entry.to_string(), bytes.to_vec());
        }
    }

    let problems = check_connections(&properties, &data_sources);
    if !problems.is_empty() {
        return Err(DocError::integrity(problems));
    }

    let document = SourceDocument {
        manifest: Manifest {
            header,
            properties,
            templates,
            themes,
        },
        controls,
        editor_state,
        entropy,
        data_sources,
        other,
    };
    let source = document.save()?;
    Ok(Unpacked {
        source,
        diagnostics: diagnostics.into_vec(),
    })
}

/// Convert a readable source tree back into a packed archive.
pub fn pack(tree: &SourceTree) -> DocResult<Packed> {
    use archive_layout::*;

    let (mut document, mut diagnostics) = SourceDocument::load(tree)?;
    let mut archive = Archive::new();

    {
        let mut ctx = CombineContext {
            templates: &mut document.manifest.templates,
            entropy: &mut document.entropy,
            editor_state: &document.editor_state,
            diagnostics: &mut diagnostics,
        };
        let mut combined = Vec::with_capacity(document.controls.len());
        for (position, block) in document.controls.iter().enumerate() {
            combined.push(combine_control(block, position, &mut ctx)?);
        }
        combined.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        for (record, _) in combined {
            let prefix = if record.template.is_component_definition {
                COMPONENTS_PREFIX
            } else {
                CONTROLS_PREFIX
            };
            debug!(control = %record.name, id = %record.control_unique_id, "combined control");
            archive.write_json(format!("{prefix}{}.json", record.control_unique_id), &record)?;
        }
    }

    let mut header = document.manifest.header.clone();
    if let (Some(members), Some(last_saved)) =
        (header.as_object_mut(), &document.entropy.header_last_saved)
    {
        members.insert(LAST_SAVED.to_string(), last_saved.clone());
    }
    archive.write_json(HEADER, &header)?;

    let mut properties = document.manifest.properties.clone();
    if let (Some(members), Some(logo)) =
        (properties.as_object_mut(), &document.entropy.logo_file_name)
    {
        members.insert(LOGO_FILE_NAME.to_string(), logo.clone());
    }
    let problems = check_connections(&properties, &document.data_sources);
    if !problems.is_empty() {
        return Err(DocError::integrity(problems));
    }
    archive.write_json(PROPERTIES, &properties)?;

    if !document.data_sources.is_empty() || document.entropy.data_source_list_present {
        let mut ordered: Vec<&DataSourceRecord> = document.data_sources.values().collect();
        ordered.sort_by_key(|record| {
            (
                document
                    .entropy
                    .data_source_order(&record.name)
                    .unwrap_or(u32::MAX),
                record.name.clone(),
            )
        });
        let file = DataSourcesFile {
            data_sources: ordered.into_iter().cloned().collect(),
        };
        archive.write_json(DATA_SOURCES, &file)?;
    }

    if document.entropy.template_list_present || !document.entropy.template_order.is_empty() {
        // Only the templates of the original reference list go back; store
        // entries observed on controls stay inlined on the controls alone.
        let mut listed: Vec<&TemplateRecord> = document
            .manifest
            .templates
            .shared_templates()
            .filter(|t| document.entropy.template_order(&t.name).is_some())
            .collect();
        listed.sort_by_key(|t| {
            (
                document.entropy.template_order(&t.name).unwrap_or(u32::MAX),
                t.name.clone(),
            )
        });
        archive.write_json(TEMPLATES, &listed)?;
    }

    if document.manifest.themes != Value::Null {
        archive.write_json(THEMES, &document.manifest.themes)?;
    }

    for (path, bytes) in &document.other {
        archive.insert(path.clone(), bytes.clone());
    }

    Ok(Packed {
        archive,
        diagnostics: diagnostics.into_vec(),
    })
}

/// Every data source a connection references must exist.
fn check_connections(
    properties: &Value,
    data_sources: &BTreeMap<String, DataSourceRecord>,
) -> Vec<Diagnostic> {
    let mut problems = Vec::new();
    let Some(connections) = properties.get("Connections").and_then(Value::as_object) else {
        return problems;
    };
    for (connection, value) in connections {
        let Some(referenced) = value.get("DataSources").and_then(Value::as_array) else {
            continue;
        };
        for name in referenced.iter().filter_map(Value::as_str) {
            if !data_sources.contains_key(name) {
                problems.push(Diagnostic::error(format!(
                    "connection '{connection}' references missing data source '{name}'"
                )));
            }
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(archive: &mut Archive, name: &str, value: serde_json::Value) {
        archive.write_json(name, &value).unwrap();
    }

    fn minimal_archive() -> Archive {
        let mut archive = Archive::new();
        entry(
            &mut archive,
            "Header.json",
            serde_json::json!({"DocVersion": "1.3", "LastSavedDateTimeUTC": "2024-05-01T10:00:00Z"}),
        );
        entry(&mut archive, "Properties.json", serde_json::json!({"Name": "My App"}));
        entry(
            &mut archive,
            "Controls/1.json",
            serde_json::json!({
                "Name": "Screen1",
                "ControlUniqueId": "1",
                "Template": {"Id": "template://screen", "Name": "screen", "Version": "1.0"},
                "Rules": [
                    {"Property": "Fill", "InvariantScript": "Color.White", "Category": "Design"}
                ]
            }),
        );
        archive
    }

    #[test]
    fn test_unpack_lifts_volatile_header_members() {
        let unpacked = unpack(&minimal_archive()).unwrap();
        let manifest: Manifest = unpacked
            .source
            .read_json("Manifest.json")
            .unwrap()
            .unwrap();
        assert_eq!(manifest.header.get("LastSavedDateTimeUTC"), None);

        let entropy: Entropy = unpacked
            .source
            .read_json("Entropy/Entropy.json")
            .unwrap()
            .unwrap();
        assert_eq!(
            entropy.header_last_saved,
            Some(serde_json::json!("2024-05-01T10:00:00Z"))
        );
    }

    #[test]
    fn test_missing_header_and_properties_both_reported() {
        let error = unpack(&Archive::new()).unwrap_err();
        match error {
            DocError::Integrity { problems } => assert_eq!(problems.len(), 2),
            other => panic!("expected integrity error, got {other}"),
        }
    }

    #[test]
    fn test_dangling_connection_is_an_integrity_error() {
        let mut archive = minimal_archive();
        entry(
            &mut archive,
            "Properties.json",
            serde_json::json!({
                "Name": "My App",
                "Connections": {"conn1": {"DataSources": ["Orders"]}}
            }),
        );
        assert!(matches!(unpack(&archive), Err(DocError::Integrity { .. })));
    }

    #[test]
    fn test_empty_reference_lists_survive_round_trip() {
        let mut archive = minimal_archive();
        entry(
            &mut archive,
            "References/DataSources.json",
            serde_json::json!({"DataSources": []}),
        );
        entry(&mut archive, "References/Templates.json", serde_json::json!([]));

        let unpacked = unpack(&archive).unwrap();
        let packed = pack(&unpacked.source).unwrap();

        let data_sources: DataSourcesFile = packed
            .archive
            .read_json("References/DataSources.json")
            .unwrap()
            .unwrap();
        assert!(data_sources.data_sources.is_empty());
        let templates: Vec<TemplateRecord> = packed
            .archive
            .read_json("References/Templates.json")
            .unwrap()
            .unwrap();
        assert!(templates.is_empty());
    }

    #[test]
    fn test_absent_reference_lists_stay_absent() {
        let unpacked = unpack(&minimal_archive()).unwrap();
        let packed = pack(&unpacked.source).unwrap();
        assert!(!packed.archive.contains("References/DataSources.json"));
        assert!(!packed.archive.contains("References/Templates.json"));
    }

    #[test]
    fn test_unknown_entries_survive_as_other_files() {
        let mut archive = minimal_archive();
        archive.insert("Assets/logo.png", vec![0x89, 0x50, 0x4e, 0x47]);

        let unpacked = unpack(&archive).unwrap();
        assert_eq!(
            unpacked.source.get("Other/Assets/logo.png"),
            Some([0x89, 0x50, 0x4e, 0x47].as_slice())
        );

        let packed = pack(&unpacked.source).unwrap();
        assert_eq!(
            packed.archive.get("Assets/logo.png"),
            Some([0x89, 0x50, 0x4e, 0x47].as_slice())
        );
    }
}
