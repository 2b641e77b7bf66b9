//! Three-way merge of whole documents: the IR forest plus every
//! side-channel store. Placement-derived metadata (order indexes, top-parent
//! names, group flags) is re-derived from the merged tree afterwards instead
//! of being merged on its own, since it is redundant with placement.

use crate::conflict::MergeConflict;
use crate::tree::{merge_entry, merge_forest};
use canvasml_doc::{
    ControlState, DocResult, EditorStateStore, Entropy, Manifest, SourceDocument, TemplateStore,
    GROUP_TEMPLATE,
};
use canvasml_parser::BlockNode;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document: SourceDocument,
    pub conflicts: Vec<MergeConflict>,
}

/// Merge two branches of a document against their common base. Conflicts are
/// resolved (first branch preferred), recorded, and logged as warnings.
pub fn merge_documents(
    base: &SourceDocument,
    ours: &SourceDocument,
    theirs: &SourceDocument,
) -> DocResult<MergeOutcome> {
    let mut conflicts = Vec::new();

    let strip = |doc: &SourceDocument| -> Vec<BlockNode> {
        doc.controls.iter().map(|b| b.without_spans()).collect()
    };
    let controls = merge_forest("", &strip(base), &strip(ours), &strip(theirs), &mut conflicts);

    let manifest = Manifest {
        header: merge_scalar(
            "Header",
            &base.manifest.header,
            &ours.manifest.header,
            &theirs.manifest.header,
            &mut conflicts,
        ),
        properties: merge_scalar(
            "Properties",
            &base.manifest.properties,
            &ours.manifest.properties,
            &theirs.manifest.properties,
            &mut conflicts,
        ),
        templates: merge_templates(
            &base.manifest.templates,
            &ours.manifest.templates,
            &theirs.manifest.templates,
            &mut conflicts,
        ),
        themes: merge_scalar(
            "Themes",
            &base.manifest.themes,
            &ours.manifest.themes,
            &theirs.manifest.themes,
            &mut conflicts,
        ),
    };

    let entropy = merge_entropy(&base.entropy, &ours.entropy, &theirs.entropy, &mut conflicts);
    let data_sources = merge_map(
        "DataSources",
        &base.data_sources,
        &ours.data_sources,
        &theirs.data_sources,
        &mut conflicts,
    );
    let other = merge_map("Other", &base.other, &ours.other, &theirs.other, &mut conflicts);

    // Control states merge by name, then placement metadata is re-derived.
    let mut states = merge_states(base, ours, theirs, &mut conflicts);
    let mut kept = HashSet::new();
    for (position, top) in controls.iter().enumerate() {
        let top_name = top.name.identifier.clone();
        rederive_placement(top, &top_name, position, &mut states, &mut kept);
    }
    states.retain(|name, _| kept.contains(name));
    let mut editor_state = EditorStateStore::new();
    for (_, state) in states {
        editor_state.insert(state)?;
    }

    for conflict in &conflicts {
        warn!(path = %conflict.path, "merge conflict: {}", conflict.message);
    }

    Ok(MergeOutcome {
        document: SourceDocument {
            manifest,
            controls,
            editor_state,
            entropy,
            data_sources,
            other,
        },
        conflicts,
    })
}

fn merge_scalar<T: PartialEq + Clone>(
    path: &str,
    base: &T,
    ours: &T,
    theirs: &T,
    conflicts: &mut Vec<MergeConflict>,
) -> T {
    let (merged, conflict) = merge_entry(Some(base), Some(ours), Some(theirs));
    if conflict {
        conflicts.push(MergeConflict::new(
            path,
            "both branches changed this value; kept the first branch's",
        ));
    }
    merged.unwrap_or_else(|| ours.clone())
}

fn merge_map<T: PartialEq + Clone>(
    path: &str,
    base: &BTreeMap<String, T>,
    ours: &BTreeMap<String, T>,
    theirs: &BTreeMap<String, T>,
    conflicts: &mut Vec<MergeConflict>,
) -> BTreeMap<String, T> {
    let keys: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
    let mut merged = BTreeMap::new();
    for key in keys {
        let (value, conflict) = merge_entry(base.get(key), ours.get(key), theirs.get(key));
        if conflict {
            conflicts.push(MergeConflict::new(
                format!("{path}.{key}"),
                "both branches changed this entry; kept the first branch's",
            ));
        }
        if let Some(value) = value {
            merged.insert(key.clone(), value);
        }
    }
    merged
}

fn merge_option<T: PartialEq + Clone>(
    path: &str,
    base: &Option<T>,
    ours: &Option<T>,
    theirs: &Option<T>,
    conflicts: &mut Vec<MergeConflict>,
) -> Option<T> {
    let (merged, conflict) = merge_entry(base.as_ref(), ours.as_ref(), theirs.as_ref());
    if conflict {
        conflicts.push(MergeConflict::new(
            path,
            "both branches changed this value; kept the first branch's",
        ));
    }
    merged
}

fn merge_templates(
    base: &TemplateStore,
    ours: &TemplateStore,
    theirs: &TemplateStore,
    conflicts: &mut Vec<MergeConflict>,
) -> TemplateStore {
    let mut merged = TemplateStore::new();

    let shared_names: BTreeSet<&str> = base
        .shared_templates()
        .chain(ours.shared_templates())
        .chain(theirs.shared_templates())
        .map(|t| t.name.as_str())
        .collect();
    for name in shared_names {
        let (template, conflict) =
            merge_entry(base.template(name), ours.template(name), theirs.template(name));
        if conflict {
            conflicts.push(MergeConflict::new(
                format!("Templates.{name}"),
                "both branches changed this template; kept the first branch's",
            ));
        }
        if let Some(template) = template {
            merged.insert_template(template);
        }
    }

    let hosts: BTreeSet<&str> = base
        .per_instance_entries()
        .chain(ours.per_instance_entries())
        .chain(theirs.per_instance_entries())
        .map(|(control, _)| control)
        .collect();
    for control in hosts {
        let (template, conflict) = merge_entry(
            base.per_instance_template(control),
            ours.per_instance_template(control),
            theirs.per_instance_template(control),
        );
        if conflict {
            conflicts.push(MergeConflict::new(
                format!("Templates.{control}"),
                "both branches changed this per-instance template; kept the first branch's",
            ));
        }
        if let Some(template) = template {
            merged.insert_per_instance(control, template);
        }
    }
    merged
}

fn merge_entropy(
    base: &Entropy,
    ours: &Entropy,
    theirs: &Entropy,
    conflicts: &mut Vec<MergeConflict>,
) -> Entropy {
    Entropy {
        control_counter_ids: merge_map(
            "Entropy.ControlCounterIds",
            &base.control_counter_ids,
            &ours.control_counter_ids,
            &theirs.control_counter_ids,
            conflicts,
        ),
        control_unique_ids: merge_map(
            "Entropy.ControlUniqueIds",
            &base.control_unique_ids,
            &ours.control_unique_ids,
            &theirs.control_unique_ids,
            conflicts,
        ),
        template_echoes: merge_map(
            "Entropy.TemplateEchoes",
            &base.template_echoes,
            &ours.template_echoes,
            &theirs.template_echoes,
            conflicts,
        ),
        function_param_scripts: merge_map(
            "Entropy.FunctionParamScripts",
            &base.function_param_scripts,
            &ours.function_param_scripts,
            &theirs.function_param_scripts,
            conflicts,
        ),
        data_source_order: merge_map(
            "Entropy.DataSourceOrder",
            &base.data_source_order,
            &ours.data_source_order,
            &theirs.data_source_order,
            conflicts,
        ),
        template_order: merge_map(
            "Entropy.TemplateOrder",
            &base.template_order,
            &ours.template_order,
            &theirs.template_order,
            conflicts,
        ),
        data_source_list_present: merge_scalar(
            "Entropy.DataSourceListPresent",
            &base.data_source_list_present,
            &ours.data_source_list_present,
            &theirs.data_source_list_present,
            conflicts,
        ),
        template_list_present: merge_scalar(
            "Entropy.TemplateListPresent",
            &base.template_list_present,
            &ours.template_list_present,
            &theirs.template_list_present,
            conflicts,
        ),
        header_last_saved: merge_option(
            "Entropy.HeaderLastSaved",
            &base.header_last_saved,
            &ours.header_last_saved,
            &theirs.header_last_saved,
            conflicts,
        ),
        logo_file_name: merge_option(
            "Entropy.LogoFileName",
            &base.logo_file_name,
            &ours.logo_file_name,
            &theirs.logo_file_name,
            conflicts,
        ),
    }
}

fn merge_states(
    base: &SourceDocument,
    ours: &SourceDocument,
    theirs: &SourceDocument,
    conflicts: &mut Vec<MergeConflict>,
) -> BTreeMap<String, ControlState> {
    // Placement-derived fields are zeroed before comparison: they are
    // re-derived from the merged tree and must not trigger conflicts.
    let to_map = |doc: &SourceDocument| -> BTreeMap<String, ControlState> {
        doc.editor_state
            .iter()
            .map(|s| {
                let mut state = s.clone();
                state.top_parent_name = String::new();
                state.index = 0.0;
                state.is_group_control = false;
                (state.name.clone(), state)
            })
            .collect()
    };
    merge_map(
        "EditorState",
        &to_map(base),
        &to_map(ours),
        &to_map(theirs),
        conflicts,
    )
}

fn rederive_placement(
    block: &BlockNode,
    top_parent: &str,
    position: usize,
    states: &mut BTreeMap<String, ControlState>,
    kept: &mut HashSet<String>,
) {
    let name = block.name.identifier.clone();
    if let Some(state) = states.get_mut(&name) {
        state.top_parent_name = top_parent.to_string();
        state.index = position as f64;
        state.is_group_control = block
            .name
            .template
            .as_ref()
            .is_some_and(|t| t.name == GROUP_TEMPLATE);
    }
    kept.insert(name);
    for (child_position, child) in block.children.iter().enumerate() {
        rederive_placement(child, top_parent, child_position, states, kept);
    }
}
