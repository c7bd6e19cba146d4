//! # Model Registry
//!
//! Explicit name → model table. Trackers and resolvers receive it as an
//! argument instead of looking models up in a process-wide name server.

use crate::errors::{SerializationError, TrackerError};
use actionlog_markup::{NodeId, XmlDocument};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(usize);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// Live reference to a node (or one of its attributes) inside a model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub model: ModelId,
    pub node: NodeId,
    pub attribute: Option<String>,
}

impl NodeRef {
    pub fn new(model: ModelId, node: NodeId) -> Self {
        Self {
            model,
            node,
            attribute: None,
        }
    }

    pub fn attribute(model: ModelId, node: NodeId, name: impl Into<String>) -> Self {
        Self {
            model,
            node,
            attribute: Some(name.into()),
        }
    }

    pub fn is_attribute(&self) -> bool {
        self.attribute.is_some()
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.node)?;
        if let Some(attr) = &self.attribute {
            write!(f, "/@{}", attr)?;
        }
        Ok(())
    }
}

/// A named data model
#[derive(Debug)]
pub struct Model {
    pub name: String,
    pub document: XmlDocument,
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<Model>,
    by_name: HashMap<String, ModelId>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model; an existing model of the same name is replaced
    pub fn register(&mut self, name: impl Into<String>, document: XmlDocument) -> ModelId {
        let name = name.into();
        if let Some(id) = self.by_name.get(&name) {
            self.models[id.0].document = document;
            return *id;
        }
        let id = ModelId(self.models.len());
        self.by_name.insert(name.clone(), id);
        self.models.push(Model { name, document });
        id
    }

    pub fn lookup(&self, name: &str) -> Option<ModelId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id.0)
    }

    pub fn name(&self, id: ModelId) -> Option<&str> {
        self.get(id).map(|m| m.name.as_str())
    }

    pub fn document(&self, id: ModelId) -> Option<&XmlDocument> {
        self.get(id).map(|m| &m.document)
    }

    pub fn document_mut(&mut self, id: ModelId) -> Option<&mut XmlDocument> {
        self.models.get_mut(id.0).map(|m| &mut m.document)
    }

    /// Reference to a model's root element
    pub fn root(&self, id: ModelId) -> Option<NodeRef> {
        self.document(id).map(|doc| NodeRef::new(id, doc.root()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelId, &Model)> {
        self.models.iter().enumerate().map(|(i, m)| (ModelId(i), m))
    }

    pub(crate) fn doc_for_export(&mut self, id: ModelId) -> Result<&mut XmlDocument, SerializationError> {
        self.document_mut(id)
            .ok_or(SerializationError::UnknownModelId(id))
    }

    pub(crate) fn doc_for_edit(&mut self, id: ModelId) -> Result<&mut XmlDocument, TrackerError> {
        self.document_mut(id).ok_or(TrackerError::UnknownModel(id))
    }
}
