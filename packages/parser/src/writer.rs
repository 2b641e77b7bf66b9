//! Source writer: the structural inverse of the lexer.
//!
//! The writer always emits 4-space indentation and picks, per property, the
//! weakest escape that reproduces the value exactly: single-line `=` when
//! the value has no line breaks, otherwise a block scalar whose chomping
//! indicator matches the exact trailing-newline count.

use crate::ast::{BlockNode, FunctionNode, TypedName};
use crate::error::WriteError;

pub const INDENT: &str = "    ";

pub struct SourceWriter {
    out: String,
    depth: usize,
}

impl SourceWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    pub fn object_start(&mut self, name: &str) -> Result<(), WriteError> {
        check_name(name)?;
        self.write_indent();
        self.out.push_str(name);
        self.out.push_str(":\n");
        self.depth += 1;
        Ok(())
    }

    pub fn object_end(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn property(&mut self, name: &str, value: &str) -> Result<(), WriteError> {
        check_name(name)?;
        if !value.contains('\n') && !value.contains('\r') {
            self.write_indent();
            self.out.push_str(name);
            self.out.push_str(": =");
            self.out.push_str(value);
            self.out.push('\n');
            return Ok(());
        }

        let trailing = value.len() - value.trim_end_matches('\n').len();
        let core = value.trim_end_matches('\n');
        let mut lines: Vec<&str> = core.split('\n').collect();
        let extra_blanks = trailing.saturating_sub(1);
        for _ in 0..extra_blanks {
            lines.push("");
        }
        // A value whose last remaining line is blank cannot be told apart
        // from insignificant whitespace when read back, and a blank-looking
        // line loses its CR on the blank-line path.
        if lines.last().is_some_and(|l| !l.is_empty() && looks_blank(l))
            || lines.iter().all(|l| looks_blank(l))
            || lines.iter().any(|l| l.ends_with('\r') && looks_blank(l))
        {
            return Err(WriteError::UnwritableValue(name.to_string()));
        }

        let indicator = match trailing {
            0 => "|-",
            1 => "|",
            _ => "|+",
        };
        self.write_indent();
        self.out.push_str(name);
        self.out.push_str(": ");
        self.out.push_str(indicator);
        self.out.push('\n');
        for line in lines {
            if line.is_empty() {
                self.out.push('\n');
            } else {
                for _ in 0..=self.depth {
                    self.out.push_str(INDENT);
                }
                self.out.push_str(line);
                self.out.push('\n');
            }
        }
        Ok(())
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn write_indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }
}

impl Default for SourceWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Lines the lexer would treat as blank, ignoring a trailing CR.
fn looks_blank(line: &str) -> bool {
    line.trim_end_matches('\r').chars().all(|c| c == ' ')
}

fn check_name(name: &str) -> Result<(), WriteError> {
    if name.is_empty()
        || name.contains(':')
        || name.contains('\n')
        || name.contains('\r')
        || name.starts_with('#')
        || name.starts_with(' ')
        || name.ends_with(' ')
    {
        return Err(WriteError::UnwritableName(name.to_string()));
    }
    Ok(())
}

fn typed_name_key(name: &TypedName) -> String {
    match &name.template {
        Some(template) => match &template.variant {
            Some(variant) => format!("{} As {}.{}", name.identifier, template.name, variant),
            None => format!("{} As {}", name.identifier, template.name),
        },
        None => name.identifier.clone(),
    }
}

fn function_key(function: &FunctionNode) -> String {
    let params: Vec<String> = function.parameters.iter().map(typed_name_key).collect();
    format!("{}({})", function.identifier, params.join(", "))
}

/// Serialize one IR block tree to source text. Properties, then functions,
/// then children, in IR order.
pub fn write_block(block: &BlockNode) -> Result<String, WriteError> {
    let mut writer = SourceWriter::new();
    write_block_into(block, &mut writer)?;
    Ok(writer.finish())
}

fn write_block_into(block: &BlockNode, writer: &mut SourceWriter) -> Result<(), WriteError> {
    writer.object_start(&typed_name_key(&block.name))?;
    for property in &block.properties {
        writer.property(&property.identifier, &property.expression.text)?;
    }
    for function in &block.functions {
        writer.property(&function_key(function), &function.body.text)?;
    }
    for child in &block.children {
        write_block_into(child, writer)?;
    }
    writer.object_end();
    Ok(())
}
