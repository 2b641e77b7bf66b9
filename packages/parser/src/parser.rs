use crate::ast::{
    ArgMetadataBlock, BlockNode, Expression, FunctionNode, PropertyNode, Span, TemplateName,
    TypedName, THIS_PROPERTY,
};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{Lexer, Token};
use canvasml_common::Diagnostics;

/// Result of parsing one source file: top-level IR blocks plus the warnings
/// the lexer gathered on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSource {
    pub blocks: Vec<BlockNode>,
    pub diagnostics: Diagnostics,
}

/// Parse source text in the restricted grammar into IR block trees.
pub fn parse_source(source: &str) -> ParseResult<ParsedSource> {
    let mut parser = Parser::new(source);
    let blocks = parser.parse_document()?;
    Ok(ParsedSource {
        blocks,
        diagnostics: parser.lexer.take_diagnostics(),
    })
}

pub struct Parser<'src> {
    lexer: Lexer<'src>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            lexer: Lexer::new(source),
        }
    }

    fn parse_document(&mut self) -> ParseResult<Vec<BlockNode>> {
        let mut blocks = Vec::new();
        loop {
            match self.lexer.read() {
                Token::StartObject { name, span } => {
                    blocks.push(self.parse_block(&name, span)?);
                }
                Token::Property { name, span, .. } => {
                    return Err(ParseError::unexpected_token(
                        format!("property '{}'", name),
                        "only objects are allowed at the top level",
                        span,
                    ));
                }
                Token::EndObject { span } => {
                    return Err(ParseError::unexpected_token(
                        "end of object",
                        "unbalanced scope",
                        span,
                    ));
                }
                Token::EndOfFile { .. } => return Ok(blocks),
                Token::Error { message, span } => return Err(ParseError::lex(message, span)),
            }
        }
    }

    fn parse_block(&mut self, key: &str, span: Span) -> ParseResult<BlockNode> {
        let mut block = BlockNode::new(parse_typed_name(key, span)?);
        block.span = Some(span);
        loop {
            match self.lexer.read() {
                Token::StartObject { name, span } => {
                    block.children.push(self.parse_block(&name, span)?);
                }
                Token::Property { name, value, span } => {
                    if looks_like_signature(&name) {
                        block.functions.push(parse_function(&name, value, span)?);
                    } else {
                        check_identifier(&name, span)?;
                        block.properties.push(PropertyNode {
                            identifier: name,
                            expression: Expression::at(value, span),
                            span: Some(span),
                        });
                    }
                }
                Token::EndObject { .. } => return Ok(block),
                Token::EndOfFile { span } => {
                    // The lexer synthesizes EndObjects before EndOfFile, so
                    // this indicates a lexer/parser mismatch.
                    return Err(ParseError::unexpected_token(
                        "end of file",
                        "unclosed scope",
                        span,
                    ));
                }
                Token::Error { message, span } => return Err(ParseError::lex(message, span)),
            }
        }
    }
}

/// `Ident`, `Ident As Template` or `Ident As Template.Variant`.
pub fn parse_typed_name(key: &str, span: Span) -> ParseResult<TypedName> {
    let (identifier, template) = match key.split_once(" As ") {
        Some((ident, template)) => (ident.trim(), Some(template.trim())),
        None => (key.trim(), None),
    };
    check_identifier(identifier, span)?;
    let template = match template {
        Some(text) => {
            if text.is_empty() {
                return Err(ParseError::invalid_name(
                    key,
                    "expected a template name after 'As'",
                    span,
                ));
            }
            Some(match text.split_once('.') {
                Some((name, variant)) => {
                    if name.is_empty() || variant.is_empty() {
                        return Err(ParseError::invalid_name(
                            key,
                            "malformed template variant",
                            span,
                        ));
                    }
                    TemplateName::with_variant(name, variant)
                }
                None => TemplateName::new(text),
            })
        }
        None => None,
    };
    Ok(TypedName {
        identifier: identifier.to_string(),
        template,
        span: Some(span),
    })
}

fn looks_like_signature(name: &str) -> bool {
    name.contains('(') && name.ends_with(')')
}

/// `Ident(x As Number, y As Text)` with the property value as the body.
/// The parsed function gets a synthesized "this" metadata block holding its
/// body; parameter metadata is rebuilt from the template store on combine.
fn parse_function(signature: &str, body: String, span: Span) -> ParseResult<FunctionNode> {
    let open = match signature.find('(') {
        Some(i) => i,
        None => {
            return Err(ParseError::invalid_signature(
                signature,
                "expected '('",
                span,
            ))
        }
    };
    let identifier = signature[..open].trim();
    check_identifier(identifier, span)?;
    let inner = &signature[open + 1..signature.len() - 1];

    let mut parameters = Vec::new();
    if !inner.trim().is_empty() {
        for part in inner.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(ParseError::invalid_signature(
                    signature,
                    "empty parameter",
                    span,
                ));
            }
            let param = parse_typed_name(part, span)?;
            if parameters
                .iter()
                .any(|p: &TypedName| p.identifier == param.identifier)
            {
                return Err(ParseError::invalid_signature(
                    signature,
                    format!("duplicate parameter '{}'", param.identifier),
                    span,
                ));
            }
            parameters.push(param);
        }
    }

    let body = Expression::at(body, span);
    Ok(FunctionNode {
        identifier: identifier.to_string(),
        parameters,
        metadata: vec![ArgMetadataBlock {
            identifier: THIS_PROPERTY.to_string(),
            default_script: Some(body.clone()),
            span: None,
        }],
        body,
        span: Some(span),
    })
}

fn check_identifier(identifier: &str, span: Span) -> ParseResult<()> {
    if identifier.is_empty() {
        return Err(ParseError::invalid_name(
            identifier,
            "empty identifier",
            span,
        ));
    }
    if identifier
        .chars()
        .any(|c| c == ':' || c == '(' || c == ')' || c == '\n' || c == '\r')
    {
        return Err(ParseError::invalid_name(
            identifier,
            "identifiers must not contain ':', parentheses or line breaks",
            span,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> BlockNode {
        let parsed = parse_source(source).expect("parse failed");
        assert_eq!(parsed.blocks.len(), 1);
        parsed.blocks.into_iter().next().expect("one block")
    }

    #[test]
    fn test_parse_screen_with_label() {
        let block = parse_one(
            "Screen1 As screen:\n    Label1 As label:\n        Text: =\"Hello\"\n",
        );
        assert_eq!(block.name.identifier, "Screen1");
        assert_eq!(
            block.name.template.as_ref().map(|t| t.name.as_str()),
            Some("screen")
        );
        let label = block.child("Label1").expect("child");
        assert_eq!(label.property("Text").map(|p| p.expression.text.as_str()), Some("\"Hello\""));
    }

    #[test]
    fn test_parse_template_variant() {
        let block = parse_one("Gallery1 As gallery.variableTemplateHeight:\n    X: =0\n");
        let template = block.name.template.expect("template");
        assert_eq!(template.name, "gallery");
        assert_eq!(template.variant.as_deref(), Some("variableTemplateHeight"));
    }

    #[test]
    fn test_parse_function_signature() {
        let block = parse_one(
            "Component1 As CanvasComponent:\n    Scale(x As Number, factor As Number): =x * factor\n",
        );
        let function = block.function("Scale").expect("function");
        assert_eq!(function.parameters.len(), 2);
        assert_eq!(function.parameters[0].identifier, "x");
        assert_eq!(
            function.parameters[1]
                .template
                .as_ref()
                .map(|t| t.name.as_str()),
            Some("Number")
        );
        assert_eq!(function.body.text, "x * factor");
        // Parsed functions always carry a synthesized "this" block.
        let this = function.this_metadata().expect("this metadata");
        assert_eq!(
            this.default_script.as_ref().map(|e| e.text.as_str()),
            Some("x * factor")
        );
    }

    #[test]
    fn test_parse_function_without_parameters() {
        let block = parse_one("C As CanvasComponent:\n    Now(): =1\n");
        let function = block.function("Now").expect("function");
        assert!(function.parameters.is_empty());
    }

    #[test]
    fn test_duplicate_function_parameter_rejected() {
        let err = parse_source("C As CanvasComponent:\n    F(x As Number, x As Number): =x\n")
            .expect_err("should fail");
        assert!(matches!(err, ParseError::InvalidSignature { .. }));
    }

    #[test]
    fn test_top_level_property_rejected() {
        let err = parse_source("Text: =1\n").expect_err("should fail");
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_lex_error_carries_position() {
        let err = parse_source("A:\n    X: plain\n").expect_err("should fail");
        let span = err.span();
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 5);
    }

    #[test]
    fn test_spans_present_when_parsed() {
        let block = parse_one("A:\n    X: =1\n");
        assert!(block.span.is_some());
        assert!(block.properties[0].span.is_some());
    }

    #[test]
    fn test_multiple_top_level_blocks() {
        let parsed = parse_source("A:\n    X: =1\nB:\n    Y: =2\n").expect("parse");
        assert_eq!(parsed.blocks.len(), 2);
    }
}
