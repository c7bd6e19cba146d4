//! # Actionlog Markup
//!
//! The tree data model behind tracked documents.
//!
//! ```text
//! markup text ──tokenize──▶ tokens ──parse──▶ XmlDocument arena
//!      ▲                                           │
//!      └───────────────── serialize ◀──────────────┘
//! ```
//!
//! [`NodePath`] gives every node a positional address that can be written
//! out and resolved again after the document went through a serialization
//! boundary.

pub mod error;
pub mod parser;
pub mod path;
pub mod serializer;
pub mod tokenizer;
pub mod tree;

pub use error::{MarkupError, MarkupResult, MutationError};
pub use parser::Parser;
pub use path::{NodePath, PathTarget, Step};
pub use serializer::{serialize, Serializer};
pub use tokenizer::{tokenize, Token};
pub use tree::{NodeId, NodeKind, XmlDocument};
