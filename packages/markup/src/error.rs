use crate::tree::NodeId;
use thiserror::Error;

pub type MarkupResult<T> = Result<T, MarkupError>;

/// Errors raised while reading markup or structural paths
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarkupError {
    #[error("Unexpected token at {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of input at {pos}")]
    UnexpectedEof { pos: usize },

    #[error("Invalid syntax at {pos}: {message}")]
    InvalidSyntax { pos: usize, message: String },

    #[error("Lexer error at {pos}")]
    LexerError { pos: usize },

    #[error("Mismatched closing tag at {pos}: expected </{expected}>, found </{found}>")]
    MismatchedTag {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },
}

impl MarkupError {
    pub fn unexpected_token(pos: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(pos: usize) -> Self {
        Self::UnexpectedEof { pos }
    }

    pub fn invalid_syntax(pos: usize, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            pos,
            message: message.into(),
        }
    }

    pub fn lexer_error(pos: usize) -> Self {
        Self::LexerError { pos }
    }

    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by structural edits on an [`XmlDocument`](crate::XmlDocument)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node is not an element: {0}")]
    NotAnElement(NodeId),

    #[error("Node is not text: {0}")]
    NotText(NodeId),

    #[error("Would create cycle")]
    CycleDetected,

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
}
