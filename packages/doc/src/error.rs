use canvasml_common::Diagnostic;
use canvasml_parser::error::{ParseError, WriteError};
use thiserror::Error;

pub type DocResult<T> = Result<T, DocError>;

#[derive(Error, Debug)]
pub enum DocError {
    #[error("{file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },

    #[error("{entry}: invalid JSON: {source}")]
    Json {
        entry: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("structural error: {message}")]
    Structural { message: String },

    #[error("integrity check failed with {} problem(s)", problems.len())]
    Integrity { problems: Vec<Diagnostic> },

    #[error("unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl DocError {
    pub fn parse(file: impl Into<String>, source: ParseError) -> Self {
        Self::Parse {
            file: file.into(),
            source,
        }
    }

    pub fn json(entry: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            entry: entry.into(),
            source,
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    pub fn integrity(problems: Vec<Diagnostic>) -> Self {
        Self::Integrity { problems }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}
