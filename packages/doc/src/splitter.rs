//! Archive record to formula tree. The splitter peels authoring metadata off
//! a `ControlRecord` into the side-channel stores and keeps only formula
//! content in the returned `BlockNode`. Splitting never loses information:
//! everything removed from the tree lands in exactly one store.

use crate::control::{ControlRecord, ScopeRuleRecord};
use crate::editor_state::{ControlState, DynamicPropertyState, EditorStateStore, PropertyState};
use crate::entropy::Entropy;
use crate::error::{DocError, DocResult};
use crate::templates::TemplateStore;
use canvasml_common::Diagnostics;
use canvasml_parser::{
    ArgMetadataBlock, BlockNode, Expression, FunctionNode, PropertyNode, TemplateName, TypedName,
    THIS_PROPERTY,
};
use std::collections::{HashMap, HashSet};

pub struct SplitContext<'a> {
    pub templates: &'a mut TemplateStore,
    pub entropy: &'a mut Entropy,
    pub editor_state: &'a mut EditorStateStore,
    pub diagnostics: &'a mut Diagnostics,
}

/// Split one control subtree, bottom-up. `position` is the control's index
/// within its parent's child list; `top_parent` names the top-level ancestor
/// whose editor-state file receives this control's metadata.
pub fn split_control(
    record: &ControlRecord,
    top_parent: &str,
    position: usize,
    ctx: &mut SplitContext<'_>,
) -> DocResult<BlockNode> {
    if record.name.is_empty() {
        return Err(DocError::structural("control record with an empty name"));
    }

    let mut children = Vec::with_capacity(record.children.len());
    let mut seen_children = HashSet::new();
    for (child_position, child) in record.children.iter().enumerate() {
        if !seen_children.insert(child.name.as_str()) {
            return Err(DocError::structural(format!(
                "duplicate child control '{}' under '{}'",
                child.name, record.name
            )));
        }
        children.push(split_control(child, top_parent, child_position, ctx)?);
    }

    ctx.entropy.record_control_id(&record.name, &record.control_unique_id);

    // First sighting of a shared template becomes canonical; later instances
    // that drifted are echoed so their bytes still round trip.
    let canonical = ctx.templates.observe(&record.name, &record.template).clone();
    if !record.template.per_instance && record.template != canonical {
        let echoed = serde_json::to_value(&record.template)
            .map_err(|e| DocError::json(format!("template of control '{}'", record.name), e))?;
        ctx.entropy.set_template_echo(&record.name, echoed);
    }

    let is_definition = record.template.is_component_definition;
    let is_instance = record.template.is_component_template && !is_definition;

    // Function-valued custom properties: on definitions the body rule is
    // lifted into a FunctionNode; on both definitions and instances the
    // generated parameter rules are suppressed from the property list.
    let mut functions = Vec::new();
    let mut hidden_params: HashMap<&str, &ScopeRuleRecord> = HashMap::new();
    let mut lifted_bodies: HashSet<&str> = HashSet::new();
    if is_definition || is_instance {
        for property in record.template.function_properties() {
            for scope_rule in property.parameter_scope_rules() {
                hidden_params.insert(scope_rule.name.as_str(), scope_rule);
            }
            if is_definition {
                functions.push(lift_function(record, property)?);
                lifted_bodies.insert(property.name.as_str());
            }
        }
    }

    // Parameter rules whose script drifted from the scope-rule default keep
    // their script in the entropy store.
    for (param_name, scope_rule) in &hidden_params {
        if let Some(rule) = record.rule(param_name) {
            if rule.invariant_script != scope_rule.default_script {
                ctx.entropy.record_param_script(
                    &record.name,
                    param_name,
                    rule.invariant_script.clone(),
                );
            }
        }
    }

    let dynamic_names: HashSet<&str> = record
        .dynamic_properties
        .iter()
        .map(|p| p.property_name.as_str())
        .collect();

    // Partition the flat rule list. Every rule's position, category and
    // extension members are recorded so the combiner can rebuild the list in
    // original order.
    let mut properties = Vec::new();
    let mut property_states = Vec::new();
    let mut dynamic_states = Vec::new();
    let mut seen_rules = HashSet::new();
    for rule in &record.rules {
        if !seen_rules.insert(rule.property.as_str()) {
            return Err(DocError::structural(format!(
                "duplicate rule '{}' on control '{}'",
                rule.property, record.name
            )));
        }
        property_states.push(PropertyState {
            property_name: rule.property.clone(),
            category: rule.category.clone(),
            extension_data: rule.extension_data.clone(),
        });
        if lifted_bodies.contains(rule.property.as_str())
            || hidden_params.contains_key(rule.property.as_str())
        {
            continue;
        }
        if dynamic_names.contains(rule.property.as_str()) {
            let descriptor_ext = record
                .dynamic_properties
                .iter()
                .find(|p| p.property_name == rule.property)
                .map(|p| p.extension_data.clone())
                .unwrap_or_default();
            dynamic_states.push(DynamicPropertyState {
                property_name: rule.property.clone(),
                rule: Some(rule.clone()),
                extension_data: descriptor_ext,
            });
            continue;
        }
        properties.push(PropertyNode {
            identifier: rule.property.clone(),
            expression: Expression::new(rule.invariant_script.clone()),
            span: None,
        });
    }
    // Descriptors without a backing rule are metadata-only but still kept.
    for descriptor in &record.dynamic_properties {
        let already = dynamic_states
            .iter()
            .any(|s| s.property_name == descriptor.property_name);
        if !already {
            dynamic_states.push(DynamicPropertyState {
                property_name: descriptor.property_name.clone(),
                rule: None,
                extension_data: descriptor.extension_data.clone(),
            });
        }
    }

    ctx.editor_state.insert(ControlState {
        name: record.name.clone(),
        top_parent_name: top_parent.to_string(),
        index: position as f64,
        style_name: record.style_name.clone(),
        properties: property_states,
        dynamic_properties: dynamic_states,
        is_group_control: record.is_group_control,
        has_dynamic_properties: record.has_dynamic_properties,
        is_component_definition: is_definition,
        extension_data: record.extension_data.clone(),
    })?;

    let template_name = TemplateName {
        name: record.template.name.clone(),
        variant: record.template.variant.clone(),
    };
    let mut block = BlockNode::new(TypedName::with_template(record.name.clone(), template_name));
    block.properties = properties;
    block.functions = functions;
    block.children = children;
    Ok(block)
}

/// Build the FunctionNode for one function-valued custom property of a
/// component definition. The body comes from the control's rule of the same
/// name; parameter metadata comes from the scope rules.
fn lift_function(
    record: &ControlRecord,
    property: &crate::control::CustomPropertyRecord,
) -> DocResult<FunctionNode> {
    let body_rule = record.rule(&property.name).ok_or_else(|| {
        DocError::structural(format!(
            "component definition '{}' has no rule for function property '{}'",
            record.name, property.name
        ))
    })?;

    let mut parameters = Vec::new();
    let mut metadata = Vec::new();
    for scope_rule in property.parameter_scope_rules() {
        parameters.push(TypedName::with_template(
            scope_rule.name.clone(),
            TemplateName::new(scope_rule.data_type.clone()),
        ));
        metadata.push(ArgMetadataBlock {
            identifier: scope_rule.name.clone(),
            default_script: Some(Expression::new(scope_rule.default_script.clone())),
            span: None,
        });
    }
    let this_default = property
        .this_scope_rule()
        .map(|r| r.default_script.clone())
        .unwrap_or_else(|| property.default_script.clone());
    metadata.push(ArgMetadataBlock {
        identifier: THIS_PROPERTY.to_string(),
        default_script: Some(Expression::new(this_default)),
        span: None,
    });

    Ok(FunctionNode {
        identifier: property.name.clone(),
        parameters,
        metadata,
        body: Expression::new(body_rule.invariant_script.clone()),
        span: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{
        CustomPropertyRecord, RuleRecord, TemplateRecord, FUNCTION_PROPERTY_KIND,
    };

    fn context<'a>(
        templates: &'a mut TemplateStore,
        entropy: &'a mut Entropy,
        editor_state: &'a mut EditorStateStore,
        diagnostics: &'a mut Diagnostics,
    ) -> SplitContext<'a> {
        SplitContext {
            templates,
            entropy,
            editor_state,
            diagnostics,
        }
    }

    fn rule(property: &str, script: &str) -> RuleRecord {
        RuleRecord {
            property: property.into(),
            invariant_script: script.into(),
            category: "Data".into(),
            ..Default::default()
        }
    }

    fn label(name: &str, id: &str) -> ControlRecord {
        ControlRecord {
            name: name.into(),
            control_unique_id: id.into(),
            template: TemplateRecord {
                id: "template://label".into(),
                name: "label".into(),
                version: "2.5.0".into(),
                ..Default::default()
            },
            rules: vec![rule("Text", "\"Hello\"")],
            ..Default::default()
        }
    }

    #[test]
    fn test_split_moves_metadata_to_stores() {
        let mut screen = ControlRecord {
            name: "Screen1".into(),
            control_unique_id: "1".into(),
            template: TemplateRecord {
                name: "screen".into(),
                ..Default::default()
            },
            style_name: "defaultScreen".into(),
            ..Default::default()
        };
        screen.children.push(label("Label1", "7"));

        let mut templates = TemplateStore::new();
        let mut entropy = Entropy::default();
        let mut editor_state = EditorStateStore::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = context(&mut templates, &mut entropy, &mut editor_state, &mut diagnostics);

        let block = split_control(&screen, "Screen1", 0, &mut ctx).unwrap();

        assert_eq!(block.name.identifier, "Screen1");
        assert_eq!(block.children.len(), 1);
        assert_eq!(
            block.children[0].property("Text").map(|p| p.expression.text.as_str()),
            Some("\"Hello\"")
        );

        assert_eq!(entropy.control_id("Label1"), Some("7".to_string()));
        assert!(templates.template("label").is_some());
        let state = editor_state.get("Screen1").unwrap();
        assert_eq!(state.style_name, "defaultScreen");
        assert_eq!(state.top_parent_name, "Screen1");
        assert_eq!(editor_state.get("Label1").unwrap().index, 0.0);
    }

    #[test]
    fn test_drifted_template_copy_is_echoed() {
        let mut screen = ControlRecord {
            name: "Screen1".into(),
            control_unique_id: "1".into(),
            template: TemplateRecord {
                name: "screen".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        screen.children.push(label("Label1", "2"));
        let mut drifted = label("Label2", "3");
        drifted.template.version = "9.9.9".into();
        screen.children.push(drifted);

        let mut templates = TemplateStore::new();
        let mut entropy = Entropy::default();
        let mut editor_state = EditorStateStore::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = context(&mut templates, &mut entropy, &mut editor_state, &mut diagnostics);
        split_control(&screen, "Screen1", 0, &mut ctx).unwrap();

        // First sighting stays canonical, the drifted copy is echoed.
        assert_eq!(templates.template("label").unwrap().version, "2.5.0");
        assert!(entropy.template_echo("Label1").is_none());
        let echo = entropy.template_echo("Label2").unwrap();
        assert_eq!(echo.get("Version"), Some(&serde_json::json!("9.9.9")));
    }

    #[test]
    fn test_function_property_lifted_from_definition() {
        let definition = ControlRecord {
            name: "Component1".into(),
            control_unique_id: "5".into(),
            template: TemplateRecord {
                name: "Component1".into(),
                is_component_definition: true,
                custom_properties: vec![CustomPropertyRecord {
                    name: "Double".into(),
                    property_kind: FUNCTION_PROPERTY_KIND.into(),
                    data_type: "Number".into(),
                    default_script: "0".into(),
                    scope_rules: vec![
                        ScopeRuleRecord {
                            name: "Double".into(),
                            default_script: "0".into(),
                            parameter_index: -1,
                            property_name: "Double".into(),
                            data_type: "Number".into(),
                            ..Default::default()
                        },
                        ScopeRuleRecord {
                            name: "x".into(),
                            default_script: "1".into(),
                            parameter_index: 0,
                            property_name: "Double".into(),
                            data_type: "Number".into(),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }],
                ..Default::default()
            },
            rules: vec![rule("Double", "x * 2"), rule("x", "1"), rule("Fill", "Color.Red")],
            ..Default::default()
        };

        let mut templates = TemplateStore::new();
        let mut entropy = Entropy::default();
        let mut editor_state = EditorStateStore::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = context(&mut templates, &mut entropy, &mut editor_state, &mut diagnostics);
        let block = split_control(&definition, "Component1", 0, &mut ctx).unwrap();

        // Exactly one function, body from the lifted rule.
        assert_eq!(block.functions.len(), 1);
        let function = &block.functions[0];
        assert_eq!(function.identifier, "Double");
        assert_eq!(function.body.text, "x * 2");
        assert_eq!(function.parameters.len(), 1);
        assert_eq!(function.parameters[0].identifier, "x");
        assert_eq!(
            function.this_metadata().and_then(|m| m.default_script.as_ref()).map(|e| e.text.as_str()),
            Some("0")
        );

        // Body and generated parameter rules do not appear as properties.
        assert!(block.property("Double").is_none());
        assert!(block.property("x").is_none());
        assert!(block.property("Fill").is_some());

        // The full original rule order is still recorded.
        let state = editor_state.get("Component1").unwrap();
        let recorded: Vec<&str> = state
            .properties
            .iter()
            .map(|p| p.property_name.as_str())
            .collect();
        assert_eq!(recorded, vec!["Double", "x", "Fill"]);
    }

    #[test]
    fn test_parameter_script_drift_goes_to_entropy() {
        let instance = ControlRecord {
            name: "Comp1".into(),
            control_unique_id: "6".into(),
            template: TemplateRecord {
                name: "Component1".into(),
                is_component_template: true,
                custom_properties: vec![CustomPropertyRecord {
                    name: "Double".into(),
                    property_kind: FUNCTION_PROPERTY_KIND.into(),
                    scope_rules: vec![ScopeRuleRecord {
                        name: "x".into(),
                        default_script: "1".into(),
                        parameter_index: 0,
                        property_name: "Double".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            },
            rules: vec![rule("x", "42")],
            ..Default::default()
        };

        let mut templates = TemplateStore::new();
        let mut entropy = Entropy::default();
        let mut editor_state = EditorStateStore::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = context(&mut templates, &mut entropy, &mut editor_state, &mut diagnostics);
        let block = split_control(&instance, "Screen1", 0, &mut ctx).unwrap();

        assert!(block.property("x").is_none());
        assert!(block.functions.is_empty());
        assert_eq!(entropy.param_script("Comp1", "x"), Some("42"));
    }

    #[test]
    fn test_dynamic_property_rule_goes_to_editor_state() {
        let mut record = label("Label1", "7");
        record.has_dynamic_properties = true;
        record.dynamic_properties.push(crate::control::DynamicPropertyRecord {
            property_name: "CustomThing".into(),
            ..Default::default()
        });
        record.rules.push(rule("CustomThing", "123"));

        let mut templates = TemplateStore::new();
        let mut entropy = Entropy::default();
        let mut editor_state = EditorStateStore::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = context(&mut templates, &mut entropy, &mut editor_state, &mut diagnostics);
        let block = split_control(&record, "Screen1", 0, &mut ctx).unwrap();

        assert!(block.property("CustomThing").is_none());
        let state = editor_state.get("Label1").unwrap();
        assert_eq!(state.dynamic_properties.len(), 1);
        assert_eq!(
            state.dynamic_properties[0]
                .rule
                .as_ref()
                .map(|r| r.invariant_script.as_str()),
            Some("123")
        );
    }

    #[test]
    fn test_duplicate_child_names_are_rejected() {
        let mut screen = ControlRecord {
            name: "Screen1".into(),
            control_unique_id: "1".into(),
            ..Default::default()
        };
        screen.children.push(label("Label1", "2"));
        screen.children.push(label("Label1", "3"));

        let mut templates = TemplateStore::new();
        let mut entropy = Entropy::default();
        let mut editor_state = EditorStateStore::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = context(&mut templates, &mut entropy, &mut editor_state, &mut diagnostics);
        assert!(split_control(&screen, "Screen1", 0, &mut ctx).is_err());
    }
}
