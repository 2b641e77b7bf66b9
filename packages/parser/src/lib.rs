pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod writer;

pub use ast::{
    ArgMetadataBlock, BlockNode, Expression, FunctionNode, PropertyNode, Span, TemplateName,
    TypedName, THIS_PROPERTY,
};
pub use error::{ParseError, ParseResult, WriteError};
pub use lexer::{tokenize, Lexer, Token};
pub use parser::{parse_source, parse_typed_name, ParsedSource, Parser};
pub use writer::{write_block, SourceWriter};
