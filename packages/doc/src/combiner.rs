//! Formula tree back to archive record. The combiner is the splitter's
//! inverse: it resolves the template through the echo/store precedence
//! chain, regenerates suppressed rules, and restores rule order and
//! authoring metadata from the editor-state store. Every store lookup has a
//! deterministic fallback, so a deleted store degrades the output to
//! byte-different but semantically equal.

use crate::control::{ControlRecord, DynamicPropertyRecord, RuleRecord, TemplateRecord, GROUP_TEMPLATE};
use crate::editor_state::{ControlState, EditorStateStore};
use crate::entropy::Entropy;
use crate::error::{DocError, DocResult};
use crate::templates::TemplateStore;
use canvasml_common::{Diagnostic, Diagnostics};
use canvasml_parser::{BlockNode, TemplateName, THIS_PROPERTY};
use serde_json::Map;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub struct CombineContext<'a> {
    pub templates: &'a mut TemplateStore,
    pub entropy: &'a mut Entropy,
    pub editor_state: &'a EditorStateStore,
    pub diagnostics: &'a mut Diagnostics,
}

/// Combine one control subtree, bottom-up. Returns the record and its
/// parent-relative order index. `position` is the fallback index when the
/// editor-state store has no entry for this control.
pub fn combine_control(
    block: &BlockNode,
    position: usize,
    ctx: &mut CombineContext<'_>,
) -> DocResult<(ControlRecord, f64)> {
    let name = block.name.identifier.as_str();

    let mut combined: Vec<(ControlRecord, f64)> = Vec::with_capacity(block.children.len());
    for (child_position, child) in block.children.iter().enumerate() {
        combined.push(combine_control(child, child_position, ctx)?);
    }
    // Stable by construction: ties keep source order.
    combined.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    let children: Vec<ControlRecord> = combined.into_iter().map(|(record, _)| record).collect();

    let template_name = block.name.template.as_ref().ok_or_else(|| {
        DocError::structural(format!("control '{name}' has no template reference"))
    })?;

    let state = ctx.editor_state.get(name);
    let mut template = resolve_template(name, template_name, ctx);
    template.variant = template_name.variant.clone();

    let mut rules: Vec<RuleRecord> = Vec::new();
    let mut rule_names: HashSet<String> = HashSet::new();
    let push_rule = |rules: &mut Vec<RuleRecord>,
                         rule_names: &mut HashSet<String>,
                         rule: RuleRecord|
     -> DocResult<()> {
        if !rule_names.insert(rule.property.clone()) {
            return Err(DocError::structural(format!(
                "rule '{}' generated more than once on control '{name}'",
                rule.property
            )));
        }
        rules.push(rule);
        Ok(())
    };

    // Function nodes exist only on component definitions. Each one rebuilds
    // its body rule, its generated parameter rules, and the scope-rule
    // metadata on the template entry.
    for function in &block.functions {
        let property_name = function.identifier.clone();
        let template_label = template.name.clone();
        let Some(property) = template.custom_property_mut(&property_name) else {
            return Err(DocError::unsupported(format!(
                "function '{property_name}' on control '{name}' declares a custom property \
                 unknown to template '{template_label}'; adding custom properties through \
                 source files is not supported"
            )));
        };
        if !property.is_function() {
            return Err(DocError::structural(format!(
                "custom property '{property_name}' of template '{template_label}' is not \
                 function-valued"
            )));
        }
        let this_block = function.this_metadata().ok_or_else(|| {
            DocError::structural(format!(
                "function '{property_name}' on control '{name}' has no '{THIS_PROPERTY}' block"
            ))
        })?;

        // Repopulate scope-rule metadata from the signature and metadata
        // blocks. A parameter without a scope rule cannot be represented.
        for (index, parameter) in function.parameters.iter().enumerate() {
            let Some(scope_rule) = property
                .scope_rules
                .iter_mut()
                .find(|r| r.name == parameter.identifier)
            else {
                return Err(DocError::structural(format!(
                    "parameter '{}' of function '{property_name}' on control '{name}' has no \
                     scope rule on template '{template_label}'",
                    parameter.identifier
                )));
            };
            scope_rule.parameter_index = index as i32;
            scope_rule.property_name = property_name.clone();
            if let Some(data_type) = &parameter.template {
                scope_rule.data_type = data_type.name.clone();
            }
            if let Some(script) = function
                .metadata_for(&parameter.identifier)
                .and_then(|m| m.default_script.as_ref())
            {
                scope_rule.default_script = script.text.clone();
            }
        }
        // A parsed function's "this" block is synthesized from its body, so
        // a script equal to the body carries no information and must not
        // clobber the stored defaults.
        if let Some(this_script) = &this_block.default_script {
            if this_script.text != function.body.text {
                property.default_script = this_script.text.clone();
                if let Some(this_rule) = property
                    .scope_rules
                    .iter_mut()
                    .find(|r| r.parameter_index < 0)
                {
                    this_rule.default_script = this_script.text.clone();
                    this_rule.property_name = property_name.clone();
                }
            }
        }

        let parameters: Vec<(String, String)> = property
            .parameter_scope_rules()
            .iter()
            .map(|r| (r.name.clone(), r.default_script.clone()))
            .collect();

        push_rule(
            &mut rules,
            &mut rule_names,
            make_rule(state, &property_name, function.body.text.clone()),
        )?;
        for (param_name, default_script) in parameters {
            let script = ctx
                .entropy
                .param_script(name, &param_name)
                .map(str::to_string)
                .unwrap_or(default_script);
            push_rule(&mut rules, &mut rule_names, make_rule(state, &param_name, script))?;
        }
    }

    if template.is_component_definition {
        // A definition that lost a function node cannot rebuild its body
        // rule, so the sources are structurally incomplete.
        for property in template.function_properties() {
            if block.function(&property.name).is_none() {
                return Err(DocError::structural(format!(
                    "component definition '{name}' has no function block for custom \
                     property '{}'",
                    property.name
                )));
            }
        }
    } else {
        // Instances regenerate the suppressed parameter rules from scope
        // rule defaults and entropy overrides.
        for property in template.function_properties() {
            for scope_rule in property.parameter_scope_rules() {
                let script = ctx
                    .entropy
                    .param_script(name, &scope_rule.name)
                    .map(str::to_string)
                    .unwrap_or_else(|| scope_rule.default_script.clone());
                push_rule(&mut rules, &mut rule_names, make_rule(state, &scope_rule.name, script))?;
            }
        }
    }

    for property in &block.properties {
        push_rule(
            &mut rules,
            &mut rule_names,
            make_rule(state, &property.identifier, property.expression.text.clone()),
        )?;
    }

    // Dynamic properties live entirely in the editor-state store.
    let mut dynamic_properties = Vec::new();
    if let Some(state) = state {
        for dynamic in &state.dynamic_properties {
            dynamic_properties.push(DynamicPropertyRecord {
                property_name: dynamic.property_name.clone(),
                extension_data: dynamic.extension_data.clone(),
            });
            if let Some(rule) = &dynamic.rule {
                push_rule(&mut rules, &mut rule_names, rule.clone())?;
            }
        }
    }

    // Restore the archive's original rule order; rules without a recorded
    // position keep generation order at the end.
    if let Some(state) = state {
        let order: HashMap<&str, usize> = state
            .properties
            .iter()
            .enumerate()
            .map(|(index, p)| (p.property_name.as_str(), index))
            .collect();
        rules.sort_by_key(|rule| order.get(rule.property.as_str()).copied().unwrap_or(usize::MAX));
    }

    let control_unique_id = match ctx.entropy.control_id(name) {
        Some(id) => id,
        None => {
            let minted = ctx.entropy.assign_control_id(name).to_string();
            ctx.diagnostics.push(Diagnostic::warning(format!(
                "control '{name}' has no recorded unique id, assigned {minted}"
            )));
            minted
        }
    };

    ctx.templates.store_resolved(name, &template);

    let index = state.map_or(position as f64, |s| s.index);
    let is_group_control = state.map_or(template.name == GROUP_TEMPLATE, |s| s.is_group_control);
    let record = ControlRecord {
        name: name.to_string(),
        control_unique_id,
        template,
        rules,
        children,
        style_name: state.map(|s| s.style_name.clone()).unwrap_or_default(),
        is_group_control,
        has_dynamic_properties: state.map_or(!dynamic_properties.is_empty(), |s| {
            s.has_dynamic_properties
        }),
        dynamic_properties,
        extension_data: state.map(|s| s.extension_data.clone()).unwrap_or_default(),
    };
    Ok((record, index))
}

/// Template resolution precedence: entropy echo, then per-instance store
/// entry, then shared store entry, then a synthesized record.
fn resolve_template(
    control: &str,
    template_name: &TemplateName,
    ctx: &mut CombineContext<'_>,
) -> TemplateRecord {
    if let Some(echo) = ctx.entropy.template_echo(control) {
        match serde_json::from_value::<TemplateRecord>(echo.clone()) {
            Ok(template) => return template,
            Err(error) => {
                ctx.diagnostics.push(Diagnostic::warning(format!(
                    "ignoring unreadable template echo for control '{control}': {error}"
                )));
            }
        }
    }
    if let Some(template) = ctx.templates.per_instance_template(control) {
        return template.clone();
    }
    if let Some(template) = ctx.templates.template(&template_name.name) {
        return template.clone();
    }
    synthesize_template(template_name)
}

fn synthesize_template(template_name: &TemplateName) -> TemplateRecord {
    TemplateRecord {
        id: format!("template://{}", template_name.name),
        name: template_name.name.clone(),
        version: "1.0".to_string(),
        variant: template_name.variant.clone(),
        ..Default::default()
    }
}

fn make_rule(state: Option<&ControlState>, property: &str, script: String) -> RuleRecord {
    let recorded = state.and_then(|s| s.property(property));
    RuleRecord {
        property: property.to_string(),
        invariant_script: script,
        category: recorded
            .map(|p| p.category.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| default_category(property)),
        extension_data: recorded
            .map(|p| p.extension_data.clone())
            .unwrap_or_else(Map::new),
    }
}

/// Default category for rules with no recorded position: behavior rules are
/// conventionally named `On*`.
fn default_category(property: &str) -> String {
    if property.starts_with("On") {
        "Behavior".to_string()
    } else {
        "Data".to_string()
    }
}
