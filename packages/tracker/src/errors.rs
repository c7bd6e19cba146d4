//! Error types for the action tracker

use crate::registry::ModelId;
use crate::remote::SaveTicket;
use crate::undo_data::CommandId;
use actionlog_markup::{MarkupError, MutationError};
use thiserror::Error;

/// A node reference could not be written out or reconstructed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SerializationError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown model id: {0}")]
    UnknownModelId(ModelId),

    #[error("Node {0} does not exist in its model")]
    MissingNode(String),

    #[error("Detached text node {0} cannot carry a lookup id")]
    Unidentifiable(String),

    #[error("Lookup id '{0}' has no cached subtree and no inline markup")]
    UnknownLookup(String),

    #[error("Relative path '{0}' has no lookup id")]
    MissingContext(String),

    #[error("Path '{0}' does not resolve")]
    PathNotFound(String),

    #[error("Envelope holds node references but no args model")]
    MissingArgsModel,

    #[error("References span models '{first}' and '{other}'; one args model per command is supported")]
    ModelMismatch { first: String, other: String },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action '{action}' expects {expected} arguments, found {found}")]
    Arity {
        action: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid argument {index} for '{action}': {message}")]
    InvalidArgument {
        action: String,
        index: usize,
        message: String,
    },

    #[error("Command {0} has no journal record")]
    NotJournaled(String),

    #[error("Markup error: {0}")]
    Markup(#[from] MarkupError),
}

impl SerializationError {
    pub fn invalid_argument(action: &str, index: usize, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            action: action.to_string(),
            index,
            message: message.into(),
        }
    }
}

/// A data instruction is malformed or cannot be bound
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstructionError {
    #[error("Invalid data instruction '{instruction}' at {pos}: {message}")]
    Syntax {
        instruction: String,
        pos: usize,
        message: String,
    },

    #[error("Placeholder '{{{placeholder}}}' in '{instruction}' has no binding")]
    Unbound {
        instruction: String,
        placeholder: String,
    },

    #[error("Data instruction '{0}' needs a node to bind against")]
    MissingContext(String),
}

impl InstructionError {
    pub fn syntax(instruction: &str, pos: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            instruction: instruction.to_string(),
            pos,
            message: message.into(),
        }
    }
}

/// The remote save reported failure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Remote save failed: {message}")]
pub struct RemoteSaveError {
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl RemoteSaveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<InstructionError> for RemoteSaveError {
    fn from(e: InstructionError) -> Self {
        RemoteSaveError::new(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Instruction error: {0}")]
    Instruction(#[from] InstructionError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Unknown model id: {0}")]
    UnknownModel(ModelId),

    #[error("Nodes from different models cannot be combined: {0} and {1}")]
    CrossModel(ModelId, ModelId),

    #[error("Tracker is blocked by failed command {0}")]
    Blocked(CommandId),

    #[error("No transaction is open")]
    NoTransaction,

    #[error("Cannot {0} while a transaction is open")]
    TransactionOpen(&'static str),

    #[error("No save is waiting for receipt {0}")]
    UnexpectedReceipt(SaveTicket),

    #[error("No failed command to resolve")]
    NoFailedCommand,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid envelope on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
