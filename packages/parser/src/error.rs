use crate::ast::Span;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{message} at {}:{}", span.line, span.column)]
    Lex { message: String, span: Span },

    #[error("invalid name '{name}' at {}:{}: {message}", span.line, span.column)]
    InvalidName {
        name: String,
        message: String,
        span: Span,
    },

    #[error("invalid function signature '{signature}' at {}:{}: {message}", span.line, span.column)]
    InvalidSignature {
        signature: String,
        message: String,
        span: Span,
    },

    #[error("unexpected {found} at {}:{}: {message}", span.line, span.column)]
    UnexpectedToken {
        found: String,
        message: String,
        span: Span,
    },
}

impl ParseError {
    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        Self::Lex {
            message: message.into(),
            span,
        }
    }

    pub fn invalid_name(name: impl Into<String>, message: impl Into<String>, span: Span) -> Self {
        Self::InvalidName {
            name: name.into(),
            message: message.into(),
            span,
        }
    }

    pub fn invalid_signature(
        signature: impl Into<String>,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::InvalidSignature {
            signature: signature.into(),
            message: message.into(),
            span,
        }
    }

    pub fn unexpected_token(
        found: impl Into<String>,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            found: found.into(),
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Lex { span, .. }
            | Self::InvalidName { span, .. }
            | Self::InvalidSignature { span, .. }
            | Self::UnexpectedToken { span, .. } => *span,
        }
    }
}

/// Errors raised by the source writer when a value or name has no
/// representation in the restricted grammar.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    #[error("name '{0}' cannot be written: names must not contain ':' or line breaks")]
    UnwritableName(String),

    #[error("value for '{0}' cannot be written: multi-line values need at least one non-blank line")]
    UnwritableValue(String),
}
