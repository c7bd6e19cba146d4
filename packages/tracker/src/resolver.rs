//! # Document Reference Resolver
//!
//! Converts live [`NodeRef`]s into [`NodeDescriptor`]s that survive
//! serialization, and back.
//!
//! ## Descriptor shapes
//!
//! - **Attached** node (or attribute of an attached element): absolute path
//!   from the model root plus the node's stable id, no inline markup.
//! - **Detached** node: path relative to the topmost disconnected ancestor,
//!   the ancestor's stable id, and the ancestor's markup the first time that
//!   id is seen in a batch.
//!
//! A relative descriptor finds its context in the lookup cache first, then
//! through its inline markup. Inline markup whose id already names an element
//! of the target document resolves to that element instead of a copy.
//!
//! The lookup cache is owned by the resolver. Use one resolver per export or
//! import batch, or call [`Resolver::clear`] between batches.

use crate::errors::SerializationError;
use crate::registry::{ModelId, ModelRegistry, NodeRef};
use actionlog_markup::{serialize, NodePath};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Attribute holding a node's stable id
pub const DEFAULT_ID_ATTRIBUTE: &str = "a_id";

/// Serialized location of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeDescriptor {
    pub xpath: String,
    #[serde(default)]
    pub lookup_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_xml: Option<String>,
}

#[derive(Debug)]
pub struct Resolver {
    id_attribute: String,
    counter: u64,
    lookup: HashMap<String, NodeRef>,
}

impl Resolver {
    pub fn new(id_attribute: impl Into<String>) -> Self {
        Self {
            id_attribute: id_attribute.into(),
            counter: 0,
            lookup: HashMap::new(),
        }
    }

    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// Forget cached subtrees; the id counter keeps counting
    pub fn clear(&mut self) {
        self.lookup.clear();
    }

    pub fn cached(&self, lookup_id: &str) -> Option<&NodeRef> {
        self.lookup.get(lookup_id)
    }

    pub fn serialize(
        &mut self,
        node: &NodeRef,
        models: &mut ModelRegistry,
    ) -> Result<NodeDescriptor, SerializationError> {
        let doc = models.doc_for_export(node.model)?;
        if !doc.contains(node.node) {
            return Err(SerializationError::MissingNode(node.to_string()));
        }

        if doc.is_attached(node.node) {
            let path = NodePath::between(doc, doc.root(), node.node, node.attribute.as_deref(), true)
                .ok_or_else(|| SerializationError::PathNotFound(node.to_string()))?;
            return Ok(NodeDescriptor {
                xpath: path.to_string(),
                lookup_id: doc.attribute(node.node, &self.id_attribute).map(String::from),
                inline_xml: None,
            });
        }

        let top = doc.topmost_ancestor(node.node);
        if !doc.is_element(top) {
            return Err(SerializationError::Unidentifiable(node.to_string()));
        }

        let lookup_id = match doc.attribute(top, &self.id_attribute) {
            Some(id) => id.to_string(),
            None => {
                let id = loop {
                    let candidate = format!("serialize{}", self.counter);
                    self.counter += 1;
                    if !self.lookup.contains_key(&candidate)
                        && doc.find_by_attribute(&self.id_attribute, &candidate).is_none()
                    {
                        break candidate;
                    }
                };
                doc.set_attribute(top, &self.id_attribute, id.as_str())
                    .map_err(|_| SerializationError::Unidentifiable(node.to_string()))?;
                id
            }
        };

        let path = NodePath::between(doc, top, node.node, node.attribute.as_deref(), false)
            .ok_or_else(|| SerializationError::PathNotFound(node.to_string()))?;

        let inline_xml = if self.lookup.contains_key(&lookup_id) {
            None
        } else {
            debug!(lookup_id = %lookup_id, "Serializing detached subtree");
            self.lookup
                .insert(lookup_id.clone(), NodeRef::new(node.model, top));
            Some(serialize(doc, top))
        };

        Ok(NodeDescriptor {
            xpath: path.to_string(),
            lookup_id: Some(lookup_id),
            inline_xml,
        })
    }

    pub fn deserialize(
        &mut self,
        descriptor: &NodeDescriptor,
        model: ModelId,
        models: &mut ModelRegistry,
    ) -> Result<NodeRef, SerializationError> {
        let path = NodePath::parse(&descriptor.xpath)?;

        let context = if path.absolute {
            let doc = models
                .document(model)
                .ok_or(SerializationError::UnknownModelId(model))?;
            NodeRef::new(model, doc.root())
        } else {
            let lookup_id = descriptor
                .lookup_id
                .as_deref()
                .ok_or_else(|| SerializationError::MissingContext(descriptor.xpath.clone()))?;

            let in_document = models
                .document(model)
                .and_then(|doc| doc.find_by_attribute(&self.id_attribute, lookup_id));

            if let Some(cached) = self.lookup.get(lookup_id) {
                trace!(lookup_id, "Lookup cache hit");
                cached.clone()
            } else if let (Some(node), Some(_)) = (in_document, &descriptor.inline_xml) {
                trace!(lookup_id, "Inline subtree already present in document");
                let reference = NodeRef::new(model, node);
                self.lookup.insert(lookup_id.to_string(), reference.clone());
                reference
            } else if let Some(xml) = &descriptor.inline_xml {
                let doc = models.doc_for_export(model)?;
                let top = doc.parse_fragment(xml)?;
                let key = doc
                    .attribute(top, &self.id_attribute)
                    .unwrap_or(lookup_id)
                    .to_string();
                debug!(lookup_id = %key, "Materialized detached subtree");
                let reference = NodeRef::new(model, top);
                self.lookup.insert(key, reference.clone());
                reference
            } else {
                return Err(SerializationError::UnknownLookup(lookup_id.to_string()));
            }
        };

        let doc = models
            .document(context.model)
            .ok_or(SerializationError::UnknownModelId(context.model))?;
        let target = path
            .resolve(doc, context.node)
            .ok_or_else(|| SerializationError::PathNotFound(descriptor.xpath.clone()))?;

        Ok(NodeRef {
            model: context.model,
            node: target.node,
            attribute: target.attribute,
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_ID_ATTRIBUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionlog_markup::XmlDocument;

    fn setup() -> (ModelRegistry, ModelId) {
        let mut models = ModelRegistry::new();
        let doc = XmlDocument::parse(r#"<library><book a_id="b1" title="Dune"/><book/></library>"#).unwrap();
        let id = models.register("books", doc);
        (models, id)
    }

    #[test]
    fn test_attached_node_has_path_only() {
        let (mut models, id) = setup();
        let doc = models.document(id).unwrap();
        let book = doc.children(doc.root())[0];

        let mut resolver = Resolver::default();
        let d = resolver.serialize(&NodeRef::new(id, book), &mut models).unwrap();
        assert_eq!(d.xpath, "/book[1]");
        assert_eq!(d.lookup_id.as_deref(), Some("b1"));
        assert_eq!(d.inline_xml, None);

        let back = resolver.deserialize(&d, id, &mut models).unwrap();
        assert_eq!(back, NodeRef::new(id, book));
    }

    #[test]
    fn test_attribute_reference() {
        let (mut models, id) = setup();
        let doc = models.document(id).unwrap();
        let book = doc.children(doc.root())[0];

        let mut resolver = Resolver::default();
        let attr = NodeRef::attribute(id, book, "title");
        let d = resolver.serialize(&attr, &mut models).unwrap();
        assert_eq!(d.xpath, "/book[1]/@title");
        assert_eq!(resolver.deserialize(&d, id, &mut models).unwrap(), attr);
    }

    #[test]
    fn test_detached_subtree_inlined_once() {
        let (mut models, id) = setup();
        let doc = models.document_mut(id).unwrap();
        let item = doc.create_element("item");
        let label = doc.create_element("label");
        doc.append_child(item, label).unwrap();

        let mut resolver = Resolver::default();
        let first = resolver.serialize(&NodeRef::new(id, label), &mut models).unwrap();
        assert_eq!(first.xpath, "label[1]");
        assert_eq!(first.lookup_id.as_deref(), Some("serialize0"));
        assert_eq!(
            first.inline_xml.as_deref(),
            Some(r#"<item a_id="serialize0"><label/></item>"#)
        );

        let second = resolver.serialize(&NodeRef::new(id, item), &mut models).unwrap();
        assert_eq!(second.xpath, ".");
        assert_eq!(second.lookup_id.as_deref(), Some("serialize0"));
        assert_eq!(second.inline_xml, None);
    }

    #[test]
    fn test_inline_subtree_materialized_in_fresh_model() {
        let (mut models, id) = setup();
        let doc = models.document_mut(id).unwrap();
        let item = doc.create_element("item");
        doc.set_attribute(item, "kind", "note").unwrap();

        let mut resolver = Resolver::default();
        let d = resolver.serialize(&NodeRef::new(id, item), &mut models).unwrap();

        let mut fresh = ModelRegistry::new();
        let target = fresh.register("books", XmlDocument::new("library"));
        let mut importer = Resolver::default();
        let node = importer.deserialize(&d, target, &mut fresh).unwrap();

        let doc = fresh.document(target).unwrap();
        assert_eq!(doc.name(node.node), Some("item"));
        assert_eq!(doc.attribute(node.node, "kind"), Some("note"));
        assert!(!doc.is_attached(node.node));
        assert!(importer.cached("serialize0").is_some());
    }

    #[test]
    fn test_inline_subtree_reuses_existing_element() {
        let (mut models, id) = setup();
        let descriptor = NodeDescriptor {
            xpath: "@title".to_string(),
            lookup_id: Some("b1".to_string()),
            inline_xml: Some("<book/>".to_string()),
        };
        let before = models.document(id).unwrap().len();

        let mut resolver = Resolver::default();
        let node = resolver.deserialize(&descriptor, id, &mut models).unwrap();
        let doc = models.document(id).unwrap();
        assert_eq!(node, NodeRef::attribute(id, doc.children(doc.root())[0], "title"));
        assert_eq!(doc.len(), before);
    }

    #[test]
    fn test_unknown_lookup_fails() {
        let (mut models, id) = setup();
        let descriptor = NodeDescriptor {
            xpath: "label[1]".to_string(),
            lookup_id: Some("serialize9".to_string()),
            inline_xml: None,
        };
        let mut resolver = Resolver::default();
        assert_eq!(
            resolver.deserialize(&descriptor, id, &mut models),
            Err(SerializationError::UnknownLookup("serialize9".to_string()))
        );
    }

    #[test]
    fn test_generated_ids_skip_existing() {
        let mut models = ModelRegistry::new();
        let doc = XmlDocument::parse(r#"<root><x a_id="serialize0"/></root>"#).unwrap();
        let id = models.register("m", doc);
        let loose = models.document_mut(id).unwrap().create_element("loose");

        let mut resolver = Resolver::default();
        let d = resolver.serialize(&NodeRef::new(id, loose), &mut models).unwrap();
        assert_eq!(d.lookup_id.as_deref(), Some("serialize1"));
    }
}
