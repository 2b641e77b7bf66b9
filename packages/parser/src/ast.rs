use serde::{Deserialize, Serialize};

/// Name of the synthesized metadata block that carries a function's own
/// ("this") default script.
pub const THIS_PROPERTY: &str = "ThisProperty";

/// Source position of a parsed node. Line and column are 1-based.
///
/// Synthesized nodes (built by the splitter rather than read from text)
/// carry no span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A control's template reference: `Name` or `Name.Variant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateName {
    pub name: String,
    pub variant: Option<String>,
}

impl TemplateName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: None,
        }
    }

    pub fn with_variant(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: Some(variant.into()),
        }
    }
}

/// An identifier with an optional template: `Label1 As label` in block
/// position, or `x As Number` in a function parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedName {
    pub identifier: String,
    pub template: Option<TemplateName>,
    pub span: Option<Span>,
}

impl TypedName {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            template: None,
            span: None,
        }
    }

    pub fn with_template(identifier: impl Into<String>, template: TemplateName) -> Self {
        Self {
            identifier: identifier.into(),
            template: Some(template),
            span: None,
        }
    }
}

/// Opaque formula text. Formula bodies are never interpreted; the only
/// contract is that their text is preserved byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    pub text: String,
    pub span: Option<Span>,
}

impl Expression {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            span: None,
        }
    }

    pub fn at(text: impl Into<String>, span: Span) -> Self {
        Self {
            text: text.into(),
            span: Some(span),
        }
    }
}

/// A named formula on a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyNode {
    pub identifier: String,
    pub expression: Expression,
    pub span: Option<Span>,
}

/// Per-parameter (or "this") metadata attached to a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgMetadataBlock {
    pub identifier: String,
    pub default_script: Option<Expression>,
    pub span: Option<Span>,
}

/// A function-valued custom property lifted out of a component definition's
/// flat rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub identifier: String,
    pub parameters: Vec<TypedName>,
    pub metadata: Vec<ArgMetadataBlock>,
    pub body: Expression,
    pub span: Option<Span>,
}

impl FunctionNode {
    /// The metadata block named [`THIS_PROPERTY`], if present.
    pub fn this_metadata(&self) -> Option<&ArgMetadataBlock> {
        self.metadata.iter().find(|m| m.identifier == THIS_PROPERTY)
    }

    pub fn metadata_for(&self, identifier: &str) -> Option<&ArgMetadataBlock> {
        self.metadata.iter().find(|m| m.identifier == identifier)
    }
}

/// One control subtree's formula content, free of authoring metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub name: TypedName,
    pub properties: Vec<PropertyNode>,
    pub functions: Vec<FunctionNode>,
    pub children: Vec<BlockNode>,
    pub span: Option<Span>,
}

impl BlockNode {
    pub fn new(name: TypedName) -> Self {
        Self {
            name,
            properties: Vec::new(),
            functions: Vec::new(),
            children: Vec::new(),
            span: None,
        }
    }

    pub fn property(&self, identifier: &str) -> Option<&PropertyNode> {
        self.properties.iter().find(|p| p.identifier == identifier)
    }

    pub fn function(&self, identifier: &str) -> Option<&FunctionNode> {
        self.functions.iter().find(|f| f.identifier == identifier)
    }

    pub fn child(&self, identifier: &str) -> Option<&BlockNode> {
        self.children.iter().find(|c| c.name.identifier == identifier)
    }

    /// Clone with every span removed, recursively. Used where trees from
    /// different files are compared for equality.
    pub fn without_spans(&self) -> BlockNode {
        BlockNode {
            name: TypedName {
                identifier: self.name.identifier.clone(),
                template: self.name.template.clone(),
                span: None,
            },
            properties: self
                .properties
                .iter()
                .map(|p| PropertyNode {
                    identifier: p.identifier.clone(),
                    expression: Expression::new(p.expression.text.clone()),
                    span: None,
                })
                .collect(),
            functions: self
                .functions
                .iter()
                .map(|f| FunctionNode {
                    identifier: f.identifier.clone(),
                    parameters: f
                        .parameters
                        .iter()
                        .map(|p| TypedName {
                            identifier: p.identifier.clone(),
                            template: p.template.clone(),
                            span: None,
                        })
                        .collect(),
                    metadata: f
                        .metadata
                        .iter()
                        .map(|m| ArgMetadataBlock {
                            identifier: m.identifier.clone(),
                            default_script: m
                                .default_script
                                .as_ref()
                                .map(|e| Expression::new(e.text.clone())),
                            span: None,
                        })
                        .collect(),
                    body: Expression::new(f.body.text.clone()),
                    span: None,
                })
                .collect(),
            children: self.children.iter().map(|c| c.without_spans()).collect(),
            span: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_helpers() {
        let mut block = BlockNode::new(TypedName::with_template(
            "Screen1",
            TemplateName::new("screen"),
        ));
        block.properties.push(PropertyNode {
            identifier: "Fill".into(),
            expression: Expression::new("Color.White"),
            span: None,
        });
        block
            .children
            .push(BlockNode::new(TypedName::with_template(
                "Label1",
                TemplateName::new("label"),
            )));

        assert!(block.property("Fill").is_some());
        assert!(block.property("fill").is_none());
        assert_eq!(
            block.child("Label1").map(|c| c.name.identifier.as_str()),
            Some("Label1")
        );
    }

    #[test]
    fn test_without_spans_strips_recursively() {
        let mut block = BlockNode::new(TypedName::new("Screen1"));
        block.span = Some(Span::new(1, 1));
        block.properties.push(PropertyNode {
            identifier: "Fill".into(),
            expression: Expression::at("Color.White", Span::new(2, 5)),
            span: Some(Span::new(2, 5)),
        });

        let stripped = block.without_spans();
        assert!(stripped.span.is_none());
        assert!(stripped.properties[0].span.is_none());
        assert!(stripped.properties[0].expression.span.is_none());
        // Content survives.
        assert_eq!(stripped.properties[0].expression.text, "Color.White");
    }
}
