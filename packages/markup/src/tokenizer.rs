use crate::error::{MarkupError, MarkupResult};
use logos::{Lexer, Logos};
use std::ops::Range;

/// Tokens between tags
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum ContentToken<'src> {
    #[token("<")]
    Open,

    #[token("</")]
    OpenClose,

    #[regex(r"<!--([^-]|-[^-])*-->", logos::skip)]
    #[regex(r"<\?[^?]*\?>", logos::skip)]
    #[regex(r"<![A-Z][^>]*>", logos::skip)]
    Ignored,

    #[regex(r"[^<]+", |lex| lex.slice())]
    Text(&'src str),
}

/// Tokens inside `<...>`
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum TagToken<'src> {
    #[regex(r"[A-Za-z_][A-Za-z0-9_:.\-]*", |lex| lex.slice())]
    Name(&'src str),

    #[token("=")]
    Equals,

    #[regex(r#""[^"]*""#, |lex| unquote(lex.slice()))]
    #[regex(r"'[^']*'", |lex| unquote(lex.slice()))]
    Value(&'src str),

    #[token(">")]
    End,

    #[token("/>")]
    SelfEnd,
}

fn unquote(s: &str) -> &str {
    &s[1..s.len() - 1]
}

/// Markup token with borrowed text
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'src> {
    /// `<`
    Open,
    /// `</`
    OpenClose,
    /// Character data, still escaped
    Text(&'src str),
    Name(&'src str),
    Equals,
    /// Attribute value without quotes, still escaped
    Value(&'src str),
    /// `>`
    End,
    /// `/>`
    SelfEnd,
}

impl<'src> From<TagToken<'src>> for Token<'src> {
    fn from(token: TagToken<'src>) -> Self {
        match token {
            TagToken::Name(s) => Token::Name(s),
            TagToken::Equals => Token::Equals,
            TagToken::Value(s) => Token::Value(s),
            TagToken::End => Token::End,
            TagToken::SelfEnd => Token::SelfEnd,
        }
    }
}

/// Split markup into tokens, switching lexers at tag boundaries
pub fn tokenize(source: &str) -> MarkupResult<Vec<(Token<'_>, Range<usize>)>> {
    let mut tokens = Vec::new();
    let mut content = ContentToken::lexer(source);

    while let Some(next) = content.next() {
        let span = content.span();
        match next {
            Ok(ContentToken::Text(text)) => tokens.push((Token::Text(text), span)),
            Ok(ContentToken::Ignored) => {}
            Ok(open @ (ContentToken::Open | ContentToken::OpenClose)) => {
                let token = if open == ContentToken::Open {
                    Token::Open
                } else {
                    Token::OpenClose
                };
                tokens.push((token, span));

                let mut tag: Lexer<'_, TagToken<'_>> = content.morph();
                loop {
                    match tag.next() {
                        Some(Ok(token)) => {
                            let closes = matches!(token, TagToken::End | TagToken::SelfEnd);
                            tokens.push((token.into(), tag.span()));
                            if closes {
                                break;
                            }
                        }
                        Some(Err(())) => return Err(MarkupError::lexer_error(tag.span().start)),
                        None => return Err(MarkupError::unexpected_eof(source.len())),
                    }
                }
                content = tag.morph();
            }
            Err(()) => return Err(MarkupError::lexer_error(span.start)),
        }
    }

    Ok(tokens)
}

/// Decode the predefined and numeric character references
pub fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        tokenize(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_tokenize_element_with_attributes() {
        let tokens = kinds(r#"<a x="1" y='two'>hi</a>"#);
        assert_eq!(
            tokens,
            vec![
                Token::Open,
                Token::Name("a"),
                Token::Name("x"),
                Token::Equals,
                Token::Value("1"),
                Token::Name("y"),
                Token::Equals,
                Token::Value("two"),
                Token::End,
                Token::Text("hi"),
                Token::OpenClose,
                Token::Name("a"),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_comments_and_declarations_skipped() {
        let tokens = kinds(r#"<?xml version="1.0"?><!-- note --><a/>"#);
        assert_eq!(tokens, vec![Token::Open, Token::Name("a"), Token::SelfEnd]);
    }

    #[test]
    fn test_unterminated_tag() {
        assert!(matches!(tokenize("<a x=\"1\""), Err(MarkupError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a &lt;b&gt; &amp; &quot;c&quot;"), "a <b> & \"c\"");
        assert_eq!(unescape("&#65;&#x42;"), "AB");
        assert_eq!(unescape("fish & chips"), "fish & chips");
    }
}
