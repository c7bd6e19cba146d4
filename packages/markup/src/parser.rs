use crate::error::{MarkupError, MarkupResult};
use crate::tokenizer::{tokenize, unescape, Token};
use crate::tree::{NodeId, XmlDocument};
use std::ops::Range;

/// Recursive-descent parser writing nodes straight into a document arena.
///
/// Whitespace-only character data between elements is dropped.
pub struct Parser<'src> {
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    end: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> MarkupResult<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            end: source.len(),
        })
    }

    /// Parse exactly one root element; the returned node is detached
    pub fn parse_root(&mut self, doc: &mut XmlDocument) -> MarkupResult<NodeId> {
        self.skip_whitespace()?;
        let root = self.parse_element(doc)?;
        self.skip_whitespace()?;
        if let Some((token, span)) = self.peek() {
            return Err(MarkupError::unexpected_token(
                span.start,
                "end of input",
                format!("{:?}", token),
            ));
        }
        Ok(root)
    }

    fn parse_element(&mut self, doc: &mut XmlDocument) -> MarkupResult<NodeId> {
        self.expect(Token::Open, "'<'")?;
        let name = self.expect_name()?;
        let element = doc.create_element(name);

        loop {
            match self.advance()? {
                (Token::Name(attr), span) => {
                    self.expect(Token::Equals, "'='")?;
                    let value = match self.advance()? {
                        (Token::Value(v), _) => unescape(v),
                        (other, span) => {
                            return Err(MarkupError::unexpected_token(
                                span.start,
                                "attribute value",
                                format!("{:?}", other),
                            ))
                        }
                    };
                    if doc.attribute(element, attr).is_some() {
                        return Err(MarkupError::invalid_syntax(
                            span.start,
                            format!("Duplicate attribute '{}'", attr),
                        ));
                    }
                    doc.set_attribute(element, attr, value)
                        .map_err(|e| MarkupError::invalid_syntax(span.start, e.to_string()))?;
                }
                (Token::SelfEnd, _) => return Ok(element),
                (Token::End, _) => break,
                (other, span) => {
                    return Err(MarkupError::unexpected_token(
                        span.start,
                        "attribute or '>'",
                        format!("{:?}", other),
                    ))
                }
            }
        }

        loop {
            match self.peek() {
                Some((Token::Text(text), _)) => {
                    self.pos += 1;
                    if !text.trim().is_empty() {
                        let node = doc.create_text(unescape(text));
                        self.attach(doc, element, node)?;
                    }
                }
                Some((Token::Open, _)) => {
                    let child = self.parse_element(doc)?;
                    self.attach(doc, element, child)?;
                }
                Some((Token::OpenClose, span)) => {
                    let pos = span.start;
                    self.pos += 1;
                    let closing = self.expect_name()?;
                    if closing != name {
                        return Err(MarkupError::MismatchedTag {
                            pos,
                            expected: name.to_string(),
                            found: closing.to_string(),
                        });
                    }
                    self.expect(Token::End, "'>'")?;
                    return Ok(element);
                }
                Some((other, span)) => {
                    return Err(MarkupError::unexpected_token(
                        span.start,
                        "content",
                        format!("{:?}", other),
                    ))
                }
                None => return Err(MarkupError::unexpected_eof(self.end)),
            }
        }
    }

    fn attach(&self, doc: &mut XmlDocument, parent: NodeId, child: NodeId) -> MarkupResult<()> {
        doc.append_child(parent, child)
            .map_err(|e| MarkupError::invalid_syntax(self.end, e.to_string()))
    }

    fn skip_whitespace(&mut self) -> MarkupResult<()> {
        while let Some((Token::Text(text), span)) = self.peek() {
            if !text.trim().is_empty() {
                return Err(MarkupError::invalid_syntax(
                    span.start,
                    "Text outside of the root element",
                ));
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn peek(&self) -> Option<(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos).cloned()
    }

    fn advance(&mut self) -> MarkupResult<(Token<'src>, Range<usize>)> {
        let token = self
            .peek()
            .ok_or_else(|| MarkupError::unexpected_eof(self.end))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token<'src>, label: &str) -> MarkupResult<()> {
        match self.advance()? {
            (token, _) if token == expected => Ok(()),
            (token, span) => Err(MarkupError::unexpected_token(
                span.start,
                label,
                format!("{:?}", token),
            )),
        }
    }

    fn expect_name(&mut self) -> MarkupResult<&'src str> {
        match self.advance()? {
            (Token::Name(name), _) => Ok(name),
            (token, span) => Err(MarkupError::unexpected_token(
                span.start,
                "name",
                format!("{:?}", token),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let doc = XmlDocument::parse(
            r#"
            <library>
                <book id="a" title="Dune &amp; more">Dune</book>
                <book id="b"/>
            </library>
        "#,
        )
        .unwrap();

        let root = doc.root();
        assert_eq!(doc.name(root), Some("library"));
        let books = doc.children(root);
        assert_eq!(books.len(), 2);
        assert_eq!(doc.attribute(books[0], "title"), Some("Dune & more"));
        assert_eq!(doc.text_content(books[0]), "Dune");
        assert!(doc.children(books[1]).is_empty());
    }

    #[test]
    fn test_mismatched_closing_tag() {
        let result = XmlDocument::parse("<a><b></a></b>");
        assert!(matches!(result, Err(MarkupError::MismatchedTag { .. })));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let result = XmlDocument::parse(r#"<a x="1" x="2"/>"#);
        assert!(matches!(result, Err(MarkupError::InvalidSyntax { .. })));
    }

    #[test]
    fn test_trailing_content_rejected() {
        let result = XmlDocument::parse("<a/><b/>");
        assert!(matches!(result, Err(MarkupError::UnexpectedToken { .. })));
    }

    #[test]
    fn test_fragment_is_detached() {
        let mut doc = XmlDocument::parse("<root/>").unwrap();
        let fragment = doc.parse_fragment(r#"<item a_id="serialize0"><label/></item>"#).unwrap();

        assert!(!doc.is_attached(fragment));
        assert_eq!(doc.attribute(fragment, "a_id"), Some("serialize0"));
        assert_eq!(doc.children(fragment).len(), 1);
    }
}
