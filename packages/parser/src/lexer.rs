//! Single-pass lexer for the restricted source grammar.
//!
//! The grammar is a deliberately narrow, unambiguous subset of the familiar
//! indented-key style: spaces-only indentation, `Name:` opens an object,
//! `Name: =formula` is a single-line property, and `Name: |` / `|-` / `|+`
//! introduce a multi-line property whose body is indented strictly deeper
//! than the key. Quoted scalars, unprefixed scalars, tabs and document
//! markers are rejected rather than guessed at.
//!
//! The lexer is driven by an explicit stack of indentation frames. Each
//! frame records its own indent, the indent its children settled on (fixed
//! by the first child, so any consistent width is accepted) and the set of
//! key names already seen at that level. A multi-level dedent yields one
//! `EndObject` per `read` call; end of input with open scopes synthesizes
//! the remaining `EndObject`s before `EndOfFile`.

use crate::ast::Span;
use canvasml_common::{Diagnostic, Diagnostics, SourceLocation};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    StartObject { name: String, span: Span },
    Property { name: String, value: String, span: Span },
    EndObject { span: Span },
    EndOfFile { span: Span },
    Error { message: String, span: Span },
}

impl Token {
    pub fn span(&self) -> Span {
        match self {
            Token::StartObject { span, .. }
            | Token::Property { span, .. }
            | Token::EndObject { span }
            | Token::EndOfFile { span }
            | Token::Error { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Chomp {
    /// `|-`: no trailing newline.
    Strip,
    /// `|`: exactly one trailing newline.
    Clip,
    /// `|+`: every trailing newline preserved.
    Keep,
}

struct Frame {
    indent: usize,
    /// Indent of this frame's children, fixed by the first child.
    child_indent: Option<usize>,
    /// Key names already used at this level. Comparison is case-sensitive.
    seen: HashSet<String>,
}

pub struct Lexer<'src> {
    lines: Vec<&'src str>,
    pos: usize,
    stack: Vec<Frame>,
    lookahead: Option<Token>,
    fatal: Option<Token>,
    diagnostics: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        // "a\n" splits into ["a", ""]; drop the artifact so every element
        // stands for one line, whether or not the source ends in a newline.
        let mut lines: Vec<&str> = source.split('\n').collect();
        if source.ends_with('\n') {
            lines.pop();
        }
        Self {
            lines,
            pos: 0,
            stack: vec![Frame {
                indent: 0,
                child_indent: Some(0),
                seen: HashSet::new(),
            }],
            lookahead: None,
            fatal: None,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Consume and return the next token.
    pub fn read(&mut self) -> Token {
        match self.lookahead.take() {
            Some(token) => token,
            None => self.advance(),
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek(&mut self) -> &Token {
        if self.lookahead.is_none() {
            let token = self.advance();
            self.lookahead = Some(token);
        }
        match self.lookahead.as_ref() {
            Some(token) => token,
            None => unreachable!("lookahead filled above"),
        }
    }

    /// Warnings gathered while lexing (stripped comments).
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    fn advance(&mut self) -> Token {
        if let Some(error) = &self.fatal {
            return error.clone();
        }
        loop {
            let Some(line) = self.lines.get(self.pos).copied() else {
                let span = Span::new(self.lines.len() as u32 + 1, 1);
                if self.stack.len() > 1 {
                    self.stack.pop();
                    return Token::EndObject { span };
                }
                return Token::EndOfFile { span };
            };
            let line_no = self.pos as u32 + 1;
            if is_blank(line) {
                self.pos += 1;
                continue;
            }
            let indent = match leading_indent(line) {
                Ok(n) => n,
                Err(col) => {
                    return self.fail(
                        "tabs are not allowed in indentation",
                        Span::new(line_no, col as u32 + 1),
                    )
                }
            };
            let content = strip_cr(&line[indent..]);
            let span = Span::new(line_no, indent as u32 + 1);
            if content.starts_with('#') {
                tracing::warn!(line = line_no, "comment stripped; comments are not preserved");
                self.diagnostics.push(
                    Diagnostic::warning("comment stripped; comments are not preserved")
                        .at(SourceLocation::new(span.line, span.column)),
                );
                self.pos += 1;
                continue;
            }

            let Some(top) = self.stack.last_mut() else {
                return self.fail("scope stack underflow", span);
            };
            match top.child_indent {
                None => {
                    if indent > top.indent {
                        top.child_indent = Some(indent);
                    } else {
                        // The object just opened turned out to be empty.
                        self.stack.pop();
                        return Token::EndObject { span };
                    }
                }
                Some(expected) => {
                    if indent < expected {
                        self.stack.pop();
                        return Token::EndObject { span };
                    }
                    if indent > expected {
                        return self.fail(
                            format!(
                                "unexpected indentation: expected {} spaces, found {}",
                                expected, indent
                            ),
                            span,
                        );
                    }
                }
            }
            return self.lex_entry(indent, content, span);
        }
    }

    fn lex_entry(&mut self, indent: usize, content: &str, span: Span) -> Token {
        if content.starts_with("---") {
            return self.fail("multi-document markers are not supported", span);
        }
        let Some(colon) = content.find(':') else {
            return self.fail("expected ':' after a name", span);
        };
        let name = content[..colon].trim_end();
        if name.is_empty() {
            return self.fail("expected a name before ':'", span);
        }
        {
            let Some(top) = self.stack.last_mut() else {
                return self.fail("scope stack underflow", span);
            };
            if !top.seen.insert(name.to_string()) {
                return self.fail(format!("duplicate name '{}' in the same scope", name), span);
            }
        }

        let rest = content[colon + 1..].trim_start();
        if rest.is_empty() {
            self.stack.push(Frame {
                indent,
                child_indent: None,
                seen: HashSet::new(),
            });
            self.pos += 1;
            return Token::StartObject {
                name: name.to_string(),
                span,
            };
        }
        if let Some(value) = rest.strip_prefix('=') {
            self.pos += 1;
            return Token::Property {
                name: name.to_string(),
                value: value.to_string(),
                span,
            };
        }
        let chomp = match rest {
            "|" => Some(Chomp::Clip),
            "|-" => Some(Chomp::Strip),
            "|+" => Some(Chomp::Keep),
            _ => None,
        };
        if let Some(chomp) = chomp {
            self.pos += 1;
            return match self.read_block_value(indent, chomp, span) {
                Ok(value) => Token::Property {
                    name: name.to_string(),
                    value,
                    span,
                },
                Err(error) => error,
            };
        }
        if rest.starts_with('"') || rest.starts_with('\'') {
            return self.fail("quoted values are not supported", span);
        }
        self.fail(
            "property values must be formulas: expected '=', '|', '|-' or '|+'",
            span,
        )
    }

    /// Read the indented body of a block scalar. Content lines keep any
    /// embedded `\r` bytes verbatim; structural decisions look at `\n` only.
    fn read_block_value(
        &mut self,
        key_indent: usize,
        chomp: Chomp,
        key_span: Span,
    ) -> Result<String, Token> {
        let mut body_indent: Option<usize> = None;
        let mut out: Vec<String> = Vec::new();
        let mut pending_blanks: Vec<&str> = Vec::new();

        loop {
            let Some(line) = self.lines.get(self.pos).copied() else {
                break;
            };
            if is_blank(line) {
                pending_blanks.push(strip_cr(line));
                self.pos += 1;
                continue;
            }
            let line_no = self.pos as u32 + 1;
            let indent = match leading_indent(line) {
                Ok(n) => n,
                Err(col) => {
                    return Err(self.fail(
                        "tabs are not allowed in indentation",
                        Span::new(line_no, col as u32 + 1),
                    ))
                }
            };
            let bi = match body_indent {
                None => {
                    if indent <= key_indent {
                        break;
                    }
                    body_indent = Some(indent);
                    indent
                }
                Some(bi) => {
                    if indent < bi {
                        break;
                    }
                    bi
                }
            };
            for blank in pending_blanks.drain(..) {
                out.push(blank_content(blank, bi));
            }
            out.push(line[bi..].to_string());
            self.pos += 1;
        }

        let Some(bi) = body_indent else {
            return Err(self.fail(
                "a multi-line value needs at least one non-blank line",
                key_span,
            ));
        };
        Ok(match chomp {
            Chomp::Strip => out.join("\n").trim_end_matches('\n').to_string(),
            Chomp::Clip => format!("{}\n", out.join("\n").trim_end_matches('\n')),
            Chomp::Keep => {
                for blank in pending_blanks.drain(..) {
                    out.push(blank_content(blank, bi));
                }
                format!("{}\n", out.join("\n"))
            }
        })
    }

    fn fail(&mut self, message: impl Into<String>, span: Span) -> Token {
        let token = Token::Error {
            message: message.into(),
            span,
        };
        self.fatal = Some(token.clone());
        token
    }
}

/// Read every token up to `EndOfFile` or the first `Error`. Convenience for
/// callers that do not need incremental reads.
pub fn tokenize(source: &str) -> (Vec<Token>, Diagnostics) {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.read();
        let done = matches!(token, Token::EndOfFile { .. } | Token::Error { .. });
        tokens.push(token);
        if done {
            break;
        }
    }
    (tokens, lexer.take_diagnostics())
}

fn is_blank(line: &str) -> bool {
    strip_cr(line).chars().all(|c| c == ' ')
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Count leading spaces; a tab in the leading whitespace is an error and
/// yields its column.
fn leading_indent(line: &str) -> Result<usize, usize> {
    for (i, c) in line.char_indices() {
        match c {
            ' ' => {}
            '\t' => return Err(i),
            _ => return Ok(i),
        }
    }
    Ok(line.len())
}

fn blank_content(line: &str, body_indent: usize) -> String {
    if line.len() > body_indent {
        line[body_indent..].to_string()
    } else {
        String::new()
    }
}
