//! Three-way merge over IR control forests. Matching is by name across all
//! three snapshots; every decision follows one rule set:
//!
//! - identical on both branches: take it;
//! - changed on one branch only: take the changed side;
//! - changed differently on both: prefer the first branch and record a
//!   conflict (a compatibility policy, applied uniformly);
//! - deleted on one branch, modified on the other: the modification wins.
//!
//! Trees are expected span-free (`BlockNode::without_spans`), so plain
//! equality means content equality.

use crate::conflict::MergeConflict;
use canvasml_parser::{BlockNode, Expression, PropertyNode, TypedName};
use std::collections::{HashMap, HashSet};

/// The scalar merge rule. `None` means absent; returns the merged entry and
/// whether a conflict was recorded.
pub(crate) fn merge_entry<T: PartialEq + Clone>(
    base: Option<&T>,
    ours: Option<&T>,
    theirs: Option<&T>,
) -> (Option<T>, bool) {
    match (base, ours, theirs) {
        (_, None, None) => (None, false),
        (None, Some(added), None) | (None, None, Some(added)) => (Some(added.clone()), false),
        (Some(original), Some(kept), None) => {
            if original == kept {
                (None, false)
            } else {
                (Some(kept.clone()), false)
            }
        }
        (Some(original), None, Some(kept)) => {
            if original == kept {
                (None, false)
            } else {
                (Some(kept.clone()), false)
            }
        }
        (base, Some(ours), Some(theirs)) => {
            if ours == theirs {
                (Some(ours.clone()), false)
            } else if base == Some(ours) {
                (Some(theirs.clone()), false)
            } else if base == Some(theirs) {
                (Some(ours.clone()), false)
            } else {
                (Some(ours.clone()), true)
            }
        }
    }
}

fn child_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn find<'a>(blocks: &'a [BlockNode], name: &str) -> Option<&'a BlockNode> {
    blocks.iter().find(|b| b.name.identifier == name)
}

fn property_text<'a>(block: Option<&'a BlockNode>, name: &str) -> Option<&'a String> {
    block.and_then(|b| b.property(name)).map(|p| &p.expression.text)
}

fn names_in_union<'a>(ours: &'a [BlockNode], theirs: &'a [BlockNode]) -> Vec<&'a str> {
    let mut names: Vec<&str> = ours.iter().map(|b| b.name.identifier.as_str()).collect();
    for block in theirs {
        if !names.contains(&block.name.identifier.as_str()) {
            names.push(block.name.identifier.as_str());
        }
    }
    names
}

/// Merge two branches of a control forest against their common base.
pub fn merge_forest(
    path: &str,
    base: &[BlockNode],
    ours: &[BlockNode],
    theirs: &[BlockNode],
    conflicts: &mut Vec<MergeConflict>,
) -> Vec<BlockNode> {
    let mut merged: Vec<BlockNode> = Vec::new();
    for name in names_in_union(ours, theirs) {
        let base_block = find(base, name);
        let result = match (find(ours, name), find(theirs, name)) {
            (Some(a), Some(b)) => {
                if a == b {
                    Some(a.clone())
                } else if base_block == Some(a) {
                    Some(b.clone())
                } else if base_block == Some(b) {
                    Some(a.clone())
                } else {
                    Some(merge_block(&child_path(path, name), base_block, a, b, conflicts))
                }
            }
            (Some(kept), None) | (None, Some(kept)) => match base_block {
                // Addition.
                None => Some(kept.clone()),
                // Clean deletion on the other branch.
                Some(original) if original == kept => None,
                // Modified here, deleted there: the modification wins.
                Some(_) => Some(kept.clone()),
            },
            (None, None) => None,
        };
        if let Some(block) = result {
            merged.push(block);
        }
    }

    apply_order(path, base, ours, theirs, &mut merged, conflicts);
    merged
}

/// Child order merges by the same rule, as a sequence-of-names value.
fn apply_order(
    path: &str,
    base: &[BlockNode],
    ours: &[BlockNode],
    theirs: &[BlockNode],
    merged: &mut Vec<BlockNode>,
    conflicts: &mut Vec<MergeConflict>,
) {
    let kept: HashSet<&str> = merged.iter().map(|b| b.name.identifier.as_str()).collect();
    let sequence = |blocks: &[BlockNode]| -> Vec<String> {
        blocks
            .iter()
            .map(|b| b.name.identifier.clone())
            .filter(|n| kept.contains(n.as_str()))
            .collect()
    };
    let base_seq = sequence(base);
    let our_seq = sequence(ours);
    let their_seq = sequence(theirs);

    let (order, conflict) = merge_entry(Some(&base_seq), Some(&our_seq), Some(&their_seq));
    if conflict {
        conflicts.push(MergeConflict::new(
            path,
            "both branches reordered the children differently; kept the first branch's order",
        ));
    }
    let Some(order) = order else { return };
    let positions: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    merged.sort_by_key(|b| {
        positions
            .get(b.name.identifier.as_str())
            .copied()
            .unwrap_or(usize::MAX)
    });
}

/// Merge one control present in all snapshots but edited on both branches.
fn merge_block(
    path: &str,
    base: Option<&BlockNode>,
    ours: &BlockNode,
    theirs: &BlockNode,
    conflicts: &mut Vec<MergeConflict>,
) -> BlockNode {
    let (template, conflict) = merge_entry(
        base.and_then(|b| b.name.template.as_ref()),
        ours.name.template.as_ref(),
        theirs.name.template.as_ref(),
    );
    if conflict {
        conflicts.push(MergeConflict::new(
            path,
            "both branches changed the template reference; kept the first branch's",
        ));
    }

    // Properties, by name, in our order with the other branch's additions
    // appended.
    let mut property_names: Vec<&str> = ours
        .properties
        .iter()
        .map(|p| p.identifier.as_str())
        .collect();
    for property in &theirs.properties {
        if !property_names.contains(&property.identifier.as_str()) {
            property_names.push(property.identifier.as_str());
        }
    }
    let mut properties = Vec::new();
    for name in property_names {
        let (text, conflict) = merge_entry(
            property_text(base, name),
            property_text(Some(ours), name),
            property_text(Some(theirs), name),
        );
        if conflict {
            conflicts.push(MergeConflict::new(
                child_path(path, name),
                "both branches changed this formula; kept the first branch's",
            ));
        }
        if let Some(text) = text {
            properties.push(PropertyNode {
                identifier: name.to_string(),
                expression: Expression::new(text),
                span: None,
            });
        }
    }

    // Functions merge as whole values: signature and body together.
    let mut function_names: Vec<&str> =
        ours.functions.iter().map(|f| f.identifier.as_str()).collect();
    for function in &theirs.functions {
        if !function_names.contains(&function.identifier.as_str()) {
            function_names.push(function.identifier.as_str());
        }
    }
    let mut functions = Vec::new();
    for name in function_names {
        let (function, conflict) = merge_entry(
            base.and_then(|b| b.function(name)),
            ours.function(name),
            theirs.function(name),
        );
        if conflict {
            conflicts.push(MergeConflict::new(
                child_path(path, name),
                "both branches changed this function; kept the first branch's",
            ));
        }
        if let Some(function) = function {
            functions.push(function);
        }
    }

    let children = merge_forest(
        path,
        base.map(|b| b.children.as_slice()).unwrap_or(&[]),
        &ours.children,
        &theirs.children,
        conflicts,
    );

    BlockNode {
        name: TypedName {
            identifier: ours.name.identifier.clone(),
            template,
            span: None,
        },
        properties,
        functions,
        children,
        span: None,
    }
}
