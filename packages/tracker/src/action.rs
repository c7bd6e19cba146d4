//! # Actions
//!
//! Closed set of tracked operations. Each variant carries its typed payload;
//! [`Action::args`] projects it onto the positional argument list used by
//! the export envelope and [`Action::from_args`] rebuilds it.
//!
//! | action | args |
//! |---|---|
//! | `insert` | parent, node, before \| null |
//! | `remove` | node |
//! | `move` | node, parent, before \| null |
//! | `replace` | old, new |
//! | `setText` | node, value |
//! | `setProperty` | node, name, value \| null |
//! | `group` | context \| null, members |
//! | `multicall` | calls |
//!
//! Leaf actions record what they need to revert themselves in the command's
//! `extra` map under [`OLD_VALUE`], [`OLD_PARENT`] and [`OLD_BEFORE`].

use crate::errors::{SerializationError, TrackerError};
use crate::registry::{ModelId, ModelRegistry, NodeRef};
use crate::rsb::RemoteOp;
use crate::undo_data::{IdGenerator, UndoData};
use actionlog_markup::{NodeId, NodePath, XmlDocument};
use serde_json::Value;
use std::collections::BTreeMap;

pub const OLD_VALUE: &str = "oldValue";
pub const OLD_PARENT: &str = "oldParent";
pub const OLD_BEFORE: &str = "oldBefore";

/// A positional argument or `extra` entry
#[derive(Debug, PartialEq)]
pub enum Arg {
    Value(Value),
    Node(NodeRef),
    Commands(Vec<UndoData>),
}

impl Arg {
    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Arg::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn view(&self) -> ArgRef<'_> {
        match self {
            Arg::Value(value) => ArgRef::Value(value.clone()),
            Arg::Node(node) => ArgRef::Node(node),
            Arg::Commands(commands) => ArgRef::Commands(commands),
        }
    }

    pub(crate) fn duplicate(&self, ids: &mut IdGenerator) -> Arg {
        match self {
            Arg::Value(value) => Arg::Value(value.clone()),
            Arg::Node(node) => Arg::Node(node.clone()),
            Arg::Commands(commands) => Arg::Commands(
                commands
                    .iter()
                    .map(|c| UndoData::from_existing(c, ids))
                    .collect(),
            ),
        }
    }
}

impl From<NodeRef> for Arg {
    fn from(node: NodeRef) -> Self {
        Arg::Node(node)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

/// Auxiliary values of a command, ordered by key
pub type Extra = BTreeMap<String, Arg>;

/// Borrowed view of one positional argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgRef<'a> {
    Value(Value),
    Node(&'a NodeRef),
    Commands(&'a [UndoData]),
}

#[derive(Debug, PartialEq)]
pub enum Action {
    Insert {
        parent: NodeRef,
        node: NodeRef,
        before: Option<NodeRef>,
    },
    Remove {
        node: NodeRef,
    },
    Move {
        node: NodeRef,
        parent: NodeRef,
        before: Option<NodeRef>,
    },
    Replace {
        old: NodeRef,
        new: NodeRef,
    },
    SetText {
        node: NodeRef,
        value: String,
    },
    /// Set an attribute, or remove it when `value` is `None`
    SetProperty {
        node: NodeRef,
        name: String,
        value: Option<String>,
    },
    Group {
        context: Option<NodeRef>,
        members: Vec<UndoData>,
    },
    Multicall {
        calls: Vec<UndoData>,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Insert { .. } => "insert",
            Action::Remove { .. } => "remove",
            Action::Move { .. } => "move",
            Action::Replace { .. } => "replace",
            Action::SetText { .. } => "setText",
            Action::SetProperty { .. } => "setProperty",
            Action::Group { .. } => "group",
            Action::Multicall { .. } => "multicall",
        }
    }

    pub fn args(&self) -> Vec<ArgRef<'_>> {
        fn optional(node: &Option<NodeRef>) -> ArgRef<'_> {
            node.as_ref().map(ArgRef::Node).unwrap_or(ArgRef::Value(Value::Null))
        }

        match self {
            Action::Insert {
                parent,
                node,
                before,
            } => vec![ArgRef::Node(parent), ArgRef::Node(node), optional(before)],
            Action::Remove { node } => vec![ArgRef::Node(node)],
            Action::Move {
                node,
                parent,
                before,
            } => vec![ArgRef::Node(node), ArgRef::Node(parent), optional(before)],
            Action::Replace { old, new } => vec![ArgRef::Node(old), ArgRef::Node(new)],
            Action::SetText { node, value } => {
                vec![ArgRef::Node(node), ArgRef::Value(Value::from(value.as_str()))]
            }
            Action::SetProperty { node, name, value } => vec![
                ArgRef::Node(node),
                ArgRef::Value(Value::from(name.as_str())),
                ArgRef::Value(value.as_deref().map(Value::from).unwrap_or(Value::Null)),
            ],
            Action::Group { context, members } => vec![optional(context), ArgRef::Commands(members)],
            Action::Multicall { calls } => vec![ArgRef::Commands(calls)],
        }
    }

    /// Rebuild an action from its name and positional arguments
    pub fn from_args(name: &str, args: Vec<Arg>) -> Result<Self, SerializationError> {
        let expected = match name {
            "remove" | "multicall" => 1,
            "replace" | "setText" | "group" => 2,
            "insert" | "move" | "setProperty" => 3,
            _ => return Err(SerializationError::UnknownAction(name.to_string())),
        };
        if args.len() != expected {
            return Err(SerializationError::Arity {
                action: name.to_string(),
                expected,
                found: args.len(),
            });
        }

        let mut args = ArgReader { action: name, args: args.into_iter(), index: 0 };
        let action = match name {
            "insert" => Action::Insert {
                parent: args.node()?,
                node: args.node()?,
                before: args.optional_node()?,
            },
            "remove" => Action::Remove { node: args.node()? },
            "move" => Action::Move {
                node: args.node()?,
                parent: args.node()?,
                before: args.optional_node()?,
            },
            "replace" => Action::Replace {
                old: args.node()?,
                new: args.node()?,
            },
            "setText" => Action::SetText {
                node: args.node()?,
                value: args.string()?,
            },
            "setProperty" => Action::SetProperty {
                node: args.node()?,
                name: args.string()?,
                value: args.optional_string()?,
            },
            "group" => Action::Group {
                context: args.optional_node()?,
                members: args.commands()?,
            },
            _ => Action::Multicall {
                calls: args.commands()?,
            },
        };
        Ok(action)
    }

    /// The node the action operates on
    pub fn primary_node(&self) -> Option<&NodeRef> {
        match self {
            Action::Insert { node, .. }
            | Action::Remove { node }
            | Action::Move { node, .. }
            | Action::SetText { node, .. }
            | Action::SetProperty { node, .. } => Some(node),
            Action::Replace { old, .. } => Some(old),
            Action::Group { context, .. } => context.as_ref(),
            Action::Multicall { calls } => calls.first().and_then(|c| c.action().primary_node()),
        }
    }

    /// Look up an argument by its payload field name
    pub fn named_arg(&self, key: &str) -> Option<ArgRef<'_>> {
        let names: &[&str] = match self {
            Action::Insert { .. } => &["parent", "node", "before"],
            Action::Remove { .. } => &["node"],
            Action::Move { .. } => &["node", "parent", "before"],
            Action::Replace { .. } => &["old", "new"],
            Action::SetText { .. } => &["node", "value"],
            Action::SetProperty { .. } => &["node", "name", "value"],
            Action::Group { .. } => &["context", "members"],
            Action::Multicall { .. } => &["calls"],
        };
        let index = names.iter().position(|n| *n == key)?;
        self.args().into_iter().nth(index)
    }

    /// Member commands of a group or multicall
    pub fn members(&self) -> &[UndoData] {
        match self {
            Action::Group { members, .. } => members,
            Action::Multicall { calls } => calls,
            _ => &[],
        }
    }

    pub(crate) fn members_mut(&mut self) -> &mut [UndoData] {
        match self {
            Action::Group { members, .. } => members,
            Action::Multicall { calls } => calls,
            _ => &mut [],
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Action::Group { .. } | Action::Multicall { .. })
    }

    pub(crate) fn duplicate(&self, ids: &mut IdGenerator) -> Action {
        let copy = |commands: &[UndoData], ids: &mut IdGenerator| -> Vec<UndoData> {
            commands
                .iter()
                .map(|c| UndoData::from_existing(c, ids))
                .collect()
        };
        match self {
            Action::Insert {
                parent,
                node,
                before,
            } => Action::Insert {
                parent: parent.clone(),
                node: node.clone(),
                before: before.clone(),
            },
            Action::Remove { node } => Action::Remove { node: node.clone() },
            Action::Move {
                node,
                parent,
                before,
            } => Action::Move {
                node: node.clone(),
                parent: parent.clone(),
                before: before.clone(),
            },
            Action::Replace { old, new } => Action::Replace {
                old: old.clone(),
                new: new.clone(),
            },
            Action::SetText { node, value } => Action::SetText {
                node: node.clone(),
                value: value.clone(),
            },
            Action::SetProperty { node, name, value } => Action::SetProperty {
                node: node.clone(),
                name: name.clone(),
                value: value.clone(),
            },
            Action::Group { context, members } => Action::Group {
                context: context.clone(),
                members: copy(members, ids),
            },
            Action::Multicall { calls } => Action::Multicall {
                calls: copy(calls, ids),
            },
        }
    }

    /// Perform a leaf action, recording its inverse data in `extra`
    pub(crate) fn apply_leaf(
        &self,
        models: &mut ModelRegistry,
        extra: &mut Extra,
    ) -> Result<RemoteOp, TrackerError> {
        match self {
            Action::Insert {
                parent,
                node,
                before,
            }
            | Action::Move {
                node,
                parent,
                before,
            } => {
                let model = same_model(parent, node)?;
                if let Some(before) = before {
                    same_model(parent, before)?;
                }
                let doc = models.doc_for_edit(model)?;
                let position = position_of(doc, node.node);
                doc.insert_before(parent.node, node.node, before.as_ref().map(|b| b.node))?;
                record_position(extra, model, position);
                Ok(self.op(false, doc, node.node))
            }
            Action::Remove { node } => {
                let doc = models.doc_for_edit(node.model)?;
                let path = absolute_path(doc, node.node);
                let position = doc.detach(node.node)?;
                record_position(extra, node.model, position);
                Ok(RemoteOp::new(self.name(), false, vec![path]))
            }
            Action::Replace { old, new } => {
                let model = same_model(old, new)?;
                let doc = models.doc_for_edit(model)?;
                let path = absolute_path(doc, old.node);
                let position = position_of(doc, new.node);
                doc.replace(old.node, new.node)?;
                record_position(extra, model, position);
                Ok(RemoteOp::new(self.name(), false, vec![path]))
            }
            Action::SetText { node, value } => {
                let doc = models.doc_for_edit(node.model)?;
                let old = doc.set_text(node.node, value.as_str())?;
                extra.insert(OLD_VALUE.to_string(), Arg::Value(Value::from(old)));
                let mut op = self.op(false, doc, node.node);
                op.args.push(Value::from(value.as_str()));
                Ok(op)
            }
            Action::SetProperty { node, name, value } => {
                let doc = models.doc_for_edit(node.model)?;
                let old = match value {
                    Some(value) => doc.set_attribute(node.node, name, value.as_str())?,
                    None => doc.remove_attribute(node.node, name)?,
                };
                extra.insert(
                    OLD_VALUE.to_string(),
                    Arg::Value(old.map(Value::from).unwrap_or(Value::Null)),
                );
                let mut op = self.op(false, doc, node.node);
                op.args.push(Value::from(name.as_str()));
                op.args
                    .push(value.as_deref().map(Value::from).unwrap_or(Value::Null));
                Ok(op)
            }
            Action::Group { .. } | Action::Multicall { .. } => Err(TrackerError::Mutation(
                actionlog_markup::MutationError::InvalidStructure(format!(
                    "'{}' has no leaf effect",
                    self.name()
                )),
            )),
        }
    }

    /// Record the inverse data `apply_leaf` would record, leaving the
    /// documents untouched
    pub(crate) fn record_inverse(&self, models: &ModelRegistry, extra: &mut Extra) {
        match self {
            Action::Insert { node, .. } | Action::Move { node, .. } | Action::Remove { node } => {
                if let Some(doc) = models.document(node.model) {
                    record_position(extra, node.model, position_of(doc, node.node));
                }
            }
            Action::Replace { new, .. } => {
                if let Some(doc) = models.document(new.model) {
                    record_position(extra, new.model, position_of(doc, new.node));
                }
            }
            Action::SetText { node, .. } => {
                if let Some(old) = models.document(node.model).and_then(|doc| doc.text(node.node)) {
                    extra.insert(OLD_VALUE.to_string(), Arg::Value(Value::from(old)));
                }
            }
            Action::SetProperty { node, name, .. } => {
                if let Some(doc) = models.document(node.model) {
                    let old = doc.attribute(node.node, name).map(Value::from);
                    extra.insert(OLD_VALUE.to_string(), Arg::Value(old.unwrap_or(Value::Null)));
                }
            }
            Action::Group { .. } | Action::Multicall { .. } => {}
        }
    }

    /// Undo a leaf action using the inverse data recorded by `apply_leaf`
    pub(crate) fn revert_leaf(
        &self,
        models: &mut ModelRegistry,
        extra: &Extra,
    ) -> Result<RemoteOp, TrackerError> {
        match self {
            Action::Insert { node, .. } | Action::Move { node, .. } | Action::Remove { node } => {
                let doc = models.doc_for_edit(node.model)?;
                let path = absolute_path(doc, node.node);
                restore_position(doc, node.node, recorded_position(extra))?;
                let mut op = self.op(true, doc, node.node);
                op.args.push(path);
                Ok(op)
            }
            Action::Replace { old, new } => {
                let doc = models.doc_for_edit(new.model)?;
                doc.replace(new.node, old.node)?;
                restore_position(doc, new.node, recorded_position(extra))?;
                Ok(self.op(true, doc, old.node))
            }
            Action::SetText { node, .. } => {
                let doc = models.doc_for_edit(node.model)?;
                let old = extra
                    .get(OLD_VALUE)
                    .and_then(Arg::as_value)
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                doc.set_text(node.node, old)?;
                let mut op = self.op(true, doc, node.node);
                op.args.push(Value::from(old));
                Ok(op)
            }
            Action::SetProperty { node, name, .. } => {
                let doc = models.doc_for_edit(node.model)?;
                let old = extra
                    .get(OLD_VALUE)
                    .and_then(Arg::as_value)
                    .and_then(Value::as_str);
                match old {
                    Some(old) => doc.set_attribute(node.node, name, old)?,
                    None => doc.remove_attribute(node.node, name)?,
                };
                let mut op = self.op(true, doc, node.node);
                op.args.push(Value::from(name.as_str()));
                op.args.push(old.map(Value::from).unwrap_or(Value::Null));
                Ok(op)
            }
            Action::Group { .. } | Action::Multicall { .. } => Err(TrackerError::Mutation(
                actionlog_markup::MutationError::InvalidStructure(format!(
                    "'{}' has no leaf effect",
                    self.name()
                )),
            )),
        }
    }

    fn op(&self, undo: bool, doc: &XmlDocument, node: NodeId) -> RemoteOp {
        RemoteOp::new(self.name(), undo, vec![absolute_path(doc, node)])
    }
}

struct ArgReader<'a> {
    action: &'a str,
    args: std::vec::IntoIter<Arg>,
    index: usize,
}

impl ArgReader<'_> {
    fn next(&mut self) -> (usize, Option<Arg>) {
        let index = self.index;
        self.index += 1;
        (index, self.args.next())
    }

    fn node(&mut self) -> Result<NodeRef, SerializationError> {
        match self.next() {
            (_, Some(Arg::Node(node))) => Ok(node),
            (index, _) => Err(SerializationError::invalid_argument(
                self.action,
                index,
                "expected a node reference",
            )),
        }
    }

    fn optional_node(&mut self) -> Result<Option<NodeRef>, SerializationError> {
        match self.next() {
            (_, Some(Arg::Node(node))) => Ok(Some(node)),
            (_, Some(Arg::Value(Value::Null))) => Ok(None),
            (index, _) => Err(SerializationError::invalid_argument(
                self.action,
                index,
                "expected a node reference or null",
            )),
        }
    }

    fn string(&mut self) -> Result<String, SerializationError> {
        match self.next() {
            (_, Some(Arg::Value(Value::String(s)))) => Ok(s),
            (index, _) => Err(SerializationError::invalid_argument(
                self.action,
                index,
                "expected a string",
            )),
        }
    }

    fn optional_string(&mut self) -> Result<Option<String>, SerializationError> {
        match self.next() {
            (_, Some(Arg::Value(Value::String(s)))) => Ok(Some(s)),
            (_, Some(Arg::Value(Value::Null))) => Ok(None),
            (index, _) => Err(SerializationError::invalid_argument(
                self.action,
                index,
                "expected a string or null",
            )),
        }
    }

    fn commands(&mut self) -> Result<Vec<UndoData>, SerializationError> {
        match self.next() {
            (_, Some(Arg::Commands(commands))) => Ok(commands),
            (_, Some(Arg::Value(Value::Array(items)))) if items.is_empty() => Ok(Vec::new()),
            (index, _) => Err(SerializationError::invalid_argument(
                self.action,
                index,
                "expected a command list",
            )),
        }
    }
}

fn same_model(a: &NodeRef, b: &NodeRef) -> Result<ModelId, TrackerError> {
    if a.model == b.model {
        Ok(a.model)
    } else {
        Err(TrackerError::CrossModel(a.model, b.model))
    }
}

pub(crate) fn absolute_path(doc: &XmlDocument, node: NodeId) -> Value {
    NodePath::between(doc, doc.root(), node, None, true)
        .map(|p| Value::from(p.to_string()))
        .unwrap_or(Value::Null)
}

fn position_of(doc: &XmlDocument, node: NodeId) -> Option<(NodeId, Option<NodeId>)> {
    doc.parent(node).map(|parent| (parent, doc.next_sibling(node)))
}

fn record_position(extra: &mut Extra, model: ModelId, position: Option<(NodeId, Option<NodeId>)>) {
    let (parent, before) = match position {
        Some((parent, before)) => (
            Arg::Node(NodeRef::new(model, parent)),
            before
                .map(|b| Arg::Node(NodeRef::new(model, b)))
                .unwrap_or(Arg::Value(Value::Null)),
        ),
        None => (Arg::Value(Value::Null), Arg::Value(Value::Null)),
    };
    extra.insert(OLD_PARENT.to_string(), parent);
    extra.insert(OLD_BEFORE.to_string(), before);
}

fn recorded_position(extra: &Extra) -> Option<(NodeId, Option<NodeId>)> {
    let parent = extra.get(OLD_PARENT).and_then(Arg::as_node)?;
    let before = extra.get(OLD_BEFORE).and_then(Arg::as_node).map(|b| b.node);
    Some((parent.node, before))
}

/// Put `node` back at a recorded position, or detach it when it had none.
///
/// A recorded next sibling that moved elsewhere in the meantime degrades to
/// appending.
fn restore_position(
    doc: &mut XmlDocument,
    node: NodeId,
    position: Option<(NodeId, Option<NodeId>)>,
) -> Result<(), TrackerError> {
    match position {
        Some((parent, before)) => {
            let before = before.filter(|b| *b != node && doc.parent(*b) == Some(parent));
            doc.insert_before(parent, node, before)?;
        }
        None => {
            doc.detach(node)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ModelRegistry, ModelId) {
        let mut models = ModelRegistry::new();
        let doc = XmlDocument::parse(r#"<list><item n="1"/><item n="2"/><note>hi</note></list>"#).unwrap();
        let id = models.register("list", doc);
        (models, id)
    }

    fn child(models: &ModelRegistry, model: ModelId, index: usize) -> NodeRef {
        let doc = models.document(model).unwrap();
        NodeRef::new(model, doc.children(doc.root())[index])
    }

    fn markup(models: &ModelRegistry, model: ModelId) -> String {
        let doc = models.document(model).unwrap();
        actionlog_markup::serialize(doc, doc.root())
    }

    #[test]
    fn test_remove_and_revert_restores_position() {
        let (mut models, id) = setup();
        let first = child(&models, id, 0);
        let action = Action::Remove { node: first };
        let mut extra = Extra::new();

        let op = action.apply_leaf(&mut models, &mut extra).unwrap();
        assert_eq!(op.args, vec![Value::from("/item[1]")]);
        assert_eq!(markup(&models, id), r#"<list><item n="2"/><note>hi</note></list>"#);

        action.revert_leaf(&mut models, &extra).unwrap();
        assert_eq!(
            markup(&models, id),
            r#"<list><item n="1"/><item n="2"/><note>hi</note></list>"#
        );
    }

    #[test]
    fn test_insert_detached_then_revert_detaches() {
        let (mut models, id) = setup();
        let root = models.root(id).unwrap();
        let fresh = models.document_mut(id).unwrap().create_element("item");
        let action = Action::Insert {
            parent: root,
            node: NodeRef::new(id, fresh),
            before: None,
        };
        let mut extra = Extra::new();

        action.apply_leaf(&mut models, &mut extra).unwrap();
        assert!(models.document(id).unwrap().is_attached(fresh));
        assert_eq!(extra.get(OLD_PARENT), Some(&Arg::Value(Value::Null)));

        action.revert_leaf(&mut models, &extra).unwrap();
        assert!(!models.document(id).unwrap().is_attached(fresh));
    }

    #[test]
    fn test_record_inverse_matches_apply() {
        let (mut models, id) = setup();
        let actions = [
            Action::Remove { node: child(&models, id, 1) },
            Action::SetProperty {
                node: child(&models, id, 0),
                name: "n".to_string(),
                value: None,
            },
        ];

        for action in actions {
            let mut recorded = Extra::new();
            action.record_inverse(&models, &mut recorded);
            assert_eq!(markup(&models, id), r#"<list><item n="1"/><item n="2"/><note>hi</note></list>"#);

            let mut applied = Extra::new();
            action.apply_leaf(&mut models, &mut applied).unwrap();
            assert_eq!(recorded, applied);
            action.revert_leaf(&mut models, &applied).unwrap();
        }
    }

    #[test]
    fn test_set_property_and_text() {
        let (mut models, id) = setup();
        let item = child(&models, id, 0);
        let set = Action::SetProperty {
            node: item.clone(),
            name: "n".to_string(),
            value: Some("9".to_string()),
        };
        let mut extra = Extra::new();
        set.apply_leaf(&mut models, &mut extra).unwrap();
        assert_eq!(extra.get(OLD_VALUE), Some(&Arg::Value(Value::from("1"))));
        set.revert_leaf(&mut models, &extra).unwrap();
        assert_eq!(models.document(id).unwrap().attribute(item.node, "n"), Some("1"));

        let note = child(&models, id, 2);
        let text = models.document(id).unwrap().children(note.node)[0];
        let edit = Action::SetText {
            node: NodeRef::new(id, text),
            value: "bye".to_string(),
        };
        let mut extra = Extra::new();
        edit.apply_leaf(&mut models, &mut extra).unwrap();
        assert_eq!(models.document(id).unwrap().text(text), Some("bye"));
        edit.revert_leaf(&mut models, &extra).unwrap();
        assert_eq!(models.document(id).unwrap().text(text), Some("hi"));
    }

    #[test]
    fn test_replace_round_trip() {
        let (mut models, id) = setup();
        let old = child(&models, id, 1);
        let new = NodeRef::new(id, models.document_mut(id).unwrap().create_element("gone"));
        let action = Action::Replace { old: old.clone(), new: new.clone() };
        let mut extra = Extra::new();

        action.apply_leaf(&mut models, &mut extra).unwrap();
        assert_eq!(markup(&models, id), r#"<list><item n="1"/><gone/><note>hi</note></list>"#);
        action.revert_leaf(&mut models, &extra).unwrap();
        assert_eq!(
            markup(&models, id),
            r#"<list><item n="1"/><item n="2"/><note>hi</note></list>"#
        );
        assert!(!models.document(id).unwrap().is_attached(new.node));
    }

    #[test]
    fn test_from_args_checks_arity_and_types() {
        let (models, id) = setup();
        let node = models.root(id).unwrap();

        assert_eq!(
            Action::from_args("remove", vec![]),
            Err(SerializationError::Arity {
                action: "remove".to_string(),
                expected: 1,
                found: 0
            })
        );
        assert!(matches!(
            Action::from_args("setText", vec![Arg::Node(node.clone()), Arg::Value(Value::from(3))]),
            Err(SerializationError::InvalidArgument { index: 1, .. })
        ));
        assert!(matches!(
            Action::from_args("explode", vec![]),
            Err(SerializationError::UnknownAction(_))
        ));

        let action = Action::from_args(
            "setProperty",
            vec![Arg::Node(node.clone()), Arg::Value(Value::from("x")), Arg::Value(Value::Null)],
        )
        .unwrap();
        assert_eq!(
            action,
            Action::SetProperty {
                node,
                name: "x".to_string(),
                value: None
            }
        );
    }

    #[test]
    fn test_named_arg() {
        let (models, id) = setup();
        let item = child(&models, id, 0);
        let action = Action::SetProperty {
            node: item.clone(),
            name: "n".to_string(),
            value: Some("3".to_string()),
        };
        assert_eq!(action.named_arg("value"), Some(ArgRef::Value(Value::from("3"))));
        assert_eq!(action.named_arg("node"), Some(ArgRef::Node(&item)));
        assert_eq!(action.named_arg("missing"), None);
    }
}
