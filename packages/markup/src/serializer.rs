use crate::tree::{NodeId, NodeKind, XmlDocument};

/// Serializer writes a subtree back to compact markup.
///
/// Output is stable: attribute order is preserved and no whitespace is
/// added, so parsing the result and serializing again yields the same text.
pub struct Serializer<'doc> {
    doc: &'doc XmlDocument,
}

impl<'doc> Serializer<'doc> {
    pub fn new(doc: &'doc XmlDocument) -> Self {
        Self { doc }
    }

    pub fn serialize(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.serialize_node(id, &mut output);
        output
    }

    fn serialize_node(&self, id: NodeId, output: &mut String) {
        match self.doc.kind(id) {
            Some(NodeKind::Text(text)) => escape_into(text, false, output),
            Some(NodeKind::Element { name, attributes }) => {
                output.push('<');
                output.push_str(name);
                for (attr, value) in attributes {
                    output.push(' ');
                    output.push_str(attr);
                    output.push_str("=\"");
                    escape_into(value, true, output);
                    output.push('"');
                }

                let children = self.doc.children(id);
                if children.is_empty() {
                    output.push_str("/>");
                    return;
                }

                output.push('>');
                for child in children {
                    self.serialize_node(*child, output);
                }
                output.push_str("</");
                output.push_str(name);
                output.push('>');
            }
            None => {}
        }
    }
}

/// Serialize a node and its descendants
pub fn serialize(doc: &XmlDocument, id: NodeId) -> String {
    Serializer::new(doc).serialize(id)
}

fn escape_into(raw: &str, attribute: bool, output: &mut String) {
    for c in raw.chars() {
        match c {
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '&' => output.push_str("&amp;"),
            '"' if attribute => output.push_str("&quot;"),
            _ => output.push(c),
        }
    }
}
