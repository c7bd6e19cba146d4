//! # Structural Paths
//!
//! Positional, XPath-like locations that survive serialization.
//!
//! - Absolute paths start at the document root element: `/`, `/book[2]`,
//!   `/book[2]/@title`, `/book[1]/text()[1]`
//! - Relative paths start at a context node: `.`, `label[1]`, `@x`
//!
//! Element steps are counted among same-name element siblings, text steps
//! among text siblings, both 1-based.

use crate::error::{MarkupError, MarkupResult};
use crate::tree::{NodeId, NodeKind, XmlDocument};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Element { name: String, index: usize },
    Text { index: usize },
    Attribute(String),
}

/// Parsed structural path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

/// Location a path resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTarget {
    pub node: NodeId,
    pub attribute: Option<String>,
}

impl NodePath {
    pub fn parse(raw: &str) -> MarkupResult<Self> {
        let (absolute, body) = match raw.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if raw.is_empty() {
            return Err(MarkupError::invalid_path(raw, "empty path"));
        }
        if body.is_empty() || (!absolute && body == ".") {
            return Ok(Self {
                absolute,
                steps: Vec::new(),
            });
        }

        let parts: Vec<&str> = body.split('/').collect();
        let mut steps = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let step = parse_step(raw, part)?;
            if matches!(step, Step::Attribute(_)) && i + 1 != parts.len() {
                return Err(MarkupError::invalid_path(raw, "attribute step must be last"));
            }
            steps.push(step);
        }
        Ok(Self { absolute, steps })
    }

    /// Compute the path from `context` to `target`.
    ///
    /// Returns `None` when the target is neither the context nor below it.
    pub fn between(
        doc: &XmlDocument,
        context: NodeId,
        target: NodeId,
        attribute: Option<&str>,
        absolute: bool,
    ) -> Option<Self> {
        let mut steps = Vec::new();
        if let Some(attr) = attribute {
            steps.push(Step::Attribute(attr.to_string()));
        }

        let mut current = target;
        while current != context {
            let parent = doc.parent(current)?;
            steps.push(step_for(doc, parent, current)?);
            current = parent;
        }
        steps.reverse();
        Some(Self { absolute, steps })
    }

    /// Walk the path from `context`
    pub fn resolve(&self, doc: &XmlDocument, context: NodeId) -> Option<PathTarget> {
        let mut node = context;
        let mut attribute = None;
        for step in &self.steps {
            match step {
                Step::Element { name, index } => {
                    node = doc
                        .children(node)
                        .iter()
                        .copied()
                        .filter(|c| doc.name(*c) == Some(name.as_str()))
                        .nth(index.checked_sub(1)?)?;
                }
                Step::Text { index } => {
                    node = doc
                        .children(node)
                        .iter()
                        .copied()
                        .filter(|c| doc.text(*c).is_some())
                        .nth(index.checked_sub(1)?)?;
                }
                Step::Attribute(name) => {
                    doc.attribute(node, name)?;
                    attribute = Some(name.clone());
                }
            }
        }
        Some(PathTarget { node, attribute })
    }
}

fn step_for(doc: &XmlDocument, parent: NodeId, child: NodeId) -> Option<Step> {
    let siblings = doc.children(parent);
    match doc.kind(child)? {
        NodeKind::Element { name, .. } => {
            let index = siblings
                .iter()
                .take_while(|c| **c != child)
                .filter(|c| doc.name(**c) == Some(name.as_str()))
                .count()
                + 1;
            Some(Step::Element {
                name: name.clone(),
                index,
            })
        }
        NodeKind::Text(_) => {
            let index = siblings
                .iter()
                .take_while(|c| **c != child)
                .filter(|c| doc.text(**c).is_some())
                .count()
                + 1;
            Some(Step::Text { index })
        }
    }
}

fn parse_step(raw: &str, part: &str) -> MarkupResult<Step> {
    if let Some(attr) = part.strip_prefix('@') {
        if attr.is_empty() {
            return Err(MarkupError::invalid_path(raw, "empty attribute name"));
        }
        return Ok(Step::Attribute(attr.to_string()));
    }

    let (name, index) = match part.find('[') {
        Some(open) => {
            let digits = part[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| MarkupError::invalid_path(raw, "unclosed index"))?;
            let index: usize = digits
                .parse()
                .map_err(|_| MarkupError::invalid_path(raw, format!("bad index '{}'", digits)))?;
            if index == 0 {
                return Err(MarkupError::invalid_path(raw, "indexes are 1-based"));
            }
            (&part[..open], index)
        }
        None => (part, 1),
    };

    match name {
        "" => Err(MarkupError::invalid_path(raw, "empty step")),
        "text()" => Ok(Step::Text { index }),
        _ => Ok(Step::Element {
            name: name.to_string(),
            index,
        }),
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str(if self.absolute { "/" } else { "." });
        }
        for (i, step) in self.steps.iter().enumerate() {
            if self.absolute || i > 0 {
                f.write_str("/")?;
            }
            match step {
                Step::Element { name, index } => write!(f, "{}[{}]", name, index)?,
                Step::Text { index } => write!(f, "text()[{}]", index)?,
                Step::Attribute(name) => write!(f, "@{}", name)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> XmlDocument {
        XmlDocument::parse(r#"<lib><book t="x">one</book><mag/><book t="y">two</book></lib>"#).unwrap()
    }

    #[test]
    fn test_absolute_path_between() {
        let doc = doc();
        let second_book = doc.children(doc.root())[2];
        let path = NodePath::between(&doc, doc.root(), second_book, Some("t"), true).unwrap();
        assert_eq!(path.to_string(), "/book[2]/@t");

        let target = path.resolve(&doc, doc.root()).unwrap();
        assert_eq!(target.node, second_book);
        assert_eq!(target.attribute.as_deref(), Some("t"));
    }

    #[test]
    fn test_text_step() {
        let doc = doc();
        let book = doc.children(doc.root())[0];
        let text = doc.children(book)[0];
        let path = NodePath::between(&doc, doc.root(), text, None, true).unwrap();
        assert_eq!(path.to_string(), "/book[1]/text()[1]");
        assert_eq!(NodePath::parse("/book[1]/text()[1]").unwrap(), path);
    }

    #[test]
    fn test_context_paths() {
        let doc = doc();
        let root_path = NodePath::between(&doc, doc.root(), doc.root(), None, true).unwrap();
        assert_eq!(root_path.to_string(), "/");

        let self_path = NodePath::between(&doc, doc.root(), doc.root(), None, false).unwrap();
        assert_eq!(self_path.to_string(), ".");
        assert_eq!(NodePath::parse(".").unwrap(), self_path);
    }

    #[test]
    fn test_unrelated_target() {
        let mut doc = doc();
        let loose = doc.create_element("loose");
        assert!(NodePath::between(&doc, doc.root(), loose, None, true).is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(NodePath::parse("").is_err());
        assert!(NodePath::parse("/a[0]").is_err());
        assert!(NodePath::parse("/@x/a").is_err());
        assert!(NodePath::parse("/a[2").is_err());
    }

    #[test]
    fn test_resolve_missing_step() {
        let doc = doc();
        let path = NodePath::parse("/book[3]").unwrap();
        assert!(path.resolve(&doc, doc.root()).is_none());
        let missing_attr = NodePath::parse("/mag[1]/@t").unwrap();
        assert!(missing_attr.resolve(&doc, doc.root()).is_none());
    }
}
