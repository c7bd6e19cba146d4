//! # Document Tree
//!
//! Arena-backed XML tree used as the data model of a tracked document.
//!
//! Nodes are never freed. Removing a node only detaches it from its parent,
//! so an undo can put the very same node back. Nodes created through
//! [`XmlDocument::create_element`] or [`XmlDocument::parse_fragment`] start
//! out detached and belong to the document until they are inserted.
//!
//! ```text
//! root (attached)          detached subtree
//!  ├── book                 item  ← topmost disconnected ancestor
//!  │    └── "Dune"           └── label
//!  └── book
//! ```

use crate::error::{MarkupResult, MutationError};
use crate::parser::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node inside its document's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payload of a tree node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// XML document with a single root element
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl XmlDocument {
    /// Create a document holding an empty root element
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.create_element(root_name);
        doc
    }

    /// Parse a document from markup source
    pub fn parse(source: &str) -> MarkupResult<Self> {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        doc.root = Parser::new(source)?.parse_root(&mut doc)?;
        Ok(doc)
    }

    /// Parse markup into a new detached subtree of this document
    pub fn parse_fragment(&mut self, source: &str) -> MarkupResult<NodeId> {
        Parser::new(source)?.parse_root(self)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.push(NodeKind::Element {
            name: name.into(),
            attributes: Vec::new(),
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&NodeData, MutationError> {
        self.nodes.get(id.0).ok_or(MutationError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, MutationError> {
        self.nodes.get_mut(id.0).ok_or(MutationError::NodeNotFound(id))
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Element { .. }))
    }

    /// Tag name of an element
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text(_) => None,
        }
    }

    /// Content of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    /// Concatenated text of a node and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => out.push_str(text),
            Some(NodeKind::Element { .. }) => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings.get(pos + 1).copied()
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match self.kind(id) {
            Some(NodeKind::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, returning its previous value
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<Option<String>, MutationError> {
        let value = value.into();
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => {
                if let Some(slot) = attributes.iter_mut().find(|(n, _)| n == name) {
                    Ok(Some(std::mem::replace(&mut slot.1, value)))
                } else {
                    attributes.push((name.to_string(), value));
                    Ok(None)
                }
            }
            NodeKind::Text(_) => Err(MutationError::NotAnElement(id)),
        }
    }

    /// Remove an attribute, returning its previous value
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<Option<String>, MutationError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => {
                let pos = attributes.iter().position(|(n, _)| n == name);
                Ok(pos.map(|p| attributes.remove(p).1))
            }
            NodeKind::Text(_) => Err(MutationError::NotAnElement(id)),
        }
    }

    /// Replace the content of a text node, returning the old content
    pub fn set_text(&mut self, id: NodeId, value: impl Into<String>) -> Result<String, MutationError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Text(text) => Ok(std::mem::replace(text, value.into())),
            NodeKind::Element { .. } => Err(MutationError::NotText(id)),
        }
    }

    /// Insert `child` into `parent` before `before` (or last).
    ///
    /// The child is detached from its current position first.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> Result<(), MutationError> {
        self.node(child)?;
        if !self.is_element(parent) {
            self.node(parent)?;
            return Err(MutationError::NotAnElement(parent));
        }
        if child == self.root {
            return Err(MutationError::InvalidStructure(
                "Root element cannot be moved".to_string(),
            ));
        }
        if parent == child || self.is_descendant_of(parent, child) {
            return Err(MutationError::CycleDetected);
        }
        if let Some(before) = before {
            if before == child || self.parent(before) != Some(parent) {
                return Err(MutationError::InvalidStructure(format!(
                    "{} is not a child of {}",
                    before, parent
                )));
            }
        }

        self.unlink(child);

        let children = &mut self.node_mut(parent)?.children;
        let index = before
            .and_then(|b| children.iter().position(|c| *c == b))
            .unwrap_or(children.len());
        children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), MutationError> {
        self.insert_before(parent, child, None)
    }

    /// Detach a node from its parent.
    ///
    /// Returns the former parent and next sibling so the position can be
    /// restored.
    pub fn detach(&mut self, id: NodeId) -> Result<Option<(NodeId, Option<NodeId>)>, MutationError> {
        self.node(id)?;
        if id == self.root {
            return Err(MutationError::InvalidStructure(
                "Root element cannot be removed".to_string(),
            ));
        }
        let position = self.parent(id).map(|p| (p, self.next_sibling(id)));
        self.unlink(id);
        Ok(position)
    }

    /// Put `new` where `old` is and detach `old`
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), MutationError> {
        let parent = self.parent(old).ok_or_else(|| {
            MutationError::InvalidStructure(format!("{} has no parent", old))
        })?;
        if old == new {
            return Ok(());
        }
        self.insert_before(parent, new, Some(old))?;
        self.unlink(old);
        Ok(())
    }

    fn unlink(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Whether `id` is strictly below `ancestor`
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Whether the node is the root or connected to it
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.is_descendant_of(id, self.root)
    }

    /// Walk up to the node that has no parent
    pub fn topmost_ancestor(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Find the first element (attached or not) carrying `name="value"`
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        (0..self.nodes.len())
            .map(NodeId)
            .find(|id| self.attribute(*id, name) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> XmlDocument {
        XmlDocument::parse(r#"<library><book id="a">Dune</book><book id="b"/></library>"#).unwrap()
    }

    #[test]
    fn test_new_document_has_root() {
        let doc = XmlDocument::new("data");
        assert_eq!(doc.name(doc.root()), Some("data"));
        assert!(doc.is_attached(doc.root()));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_set_attribute_returns_previous() {
        let mut doc = library();
        let book = doc.children(doc.root())[0];

        let old = doc.set_attribute(book, "id", "z").unwrap();
        assert_eq!(old, Some("a".to_string()));
        assert_eq!(doc.attribute(book, "id"), Some("z"));

        let none = doc.set_attribute(book, "lang", "en").unwrap();
        assert_eq!(none, None);

        let removed = doc.remove_attribute(book, "lang").unwrap();
        assert_eq!(removed, Some("en".to_string()));
        assert_eq!(doc.attribute(book, "lang"), None);
    }

    #[test]
    fn test_detach_and_reinsert_restores_position() {
        let mut doc = library();
        let root = doc.root();
        let first = doc.children(root)[0];
        let second = doc.children(root)[1];

        let position = doc.detach(first).unwrap();
        assert_eq!(position, Some((root, Some(second))));
        assert!(!doc.is_attached(first));
        assert_eq!(doc.children(root), &[second]);

        doc.insert_before(root, first, Some(second)).unwrap();
        assert_eq!(doc.children(root), &[first, second]);
    }

    #[test]
    fn test_cycle_detection() {
        let mut doc = library();
        let book = doc.children(doc.root())[0];
        let text = doc.children(book)[0];

        let wrapper = doc.create_element("wrapper");
        doc.append_child(book, wrapper).unwrap();

        assert_eq!(doc.append_child(wrapper, book), Err(MutationError::CycleDetected));
        assert_eq!(doc.append_child(text, wrapper), Err(MutationError::NotAnElement(text)));
    }

    #[test]
    fn test_root_cannot_be_detached() {
        let mut doc = library();
        let root = doc.root();
        assert!(matches!(doc.detach(root), Err(MutationError::InvalidStructure(_))));
    }

    #[test]
    fn test_topmost_ancestor_of_detached_branch() {
        let mut doc = library();
        let item = doc.create_element("item");
        let label = doc.create_element("label");
        doc.append_child(item, label).unwrap();

        assert_eq!(doc.topmost_ancestor(label), item);
        assert!(!doc.is_attached(label));
    }

    #[test]
    fn test_replace_swaps_nodes() {
        let mut doc = library();
        let root = doc.root();
        let first = doc.children(root)[0];
        let fresh = doc.create_element("magazine");

        doc.replace(first, fresh).unwrap();
        assert_eq!(doc.children(root)[0], fresh);
        assert_eq!(doc.parent(first), None);
    }

    #[test]
    fn test_text_content() {
        let doc = library();
        assert_eq!(doc.text_content(doc.root()), "Dune");
    }
}
