//! # Data Instructions
//!
//! Declarative descriptors telling the remote-save collaborator how to
//! persist an action:
//!
//! ```text
//! scheme:target(arg, arg, ...)
//!
//! rpc:books.setTitle({@a_id}, {$value})
//! url:/api/books/save({xpath}, {text()}, "draft", 3)
//! local:noop
//! ```
//!
//! | placeholder | bound to |
//! |---|---|
//! | `{@name}` | attribute of the context node |
//! | `{$name}` | named action argument or `extra` entry |
//! | `{text()}` | text content of the context node |
//! | `{xpath}` | absolute path of the context node |
//!
//! The `local` scheme needs no remote round trip and completes at once.

use crate::errors::InstructionError;
use actionlog_markup::{NodeId, NodePath, XmlDocument};
use logos::Logos;
use serde_json::Value;

pub const LOCAL_SCHEME: &str = "local";

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum ArgToken<'src> {
    #[token(",")]
    Comma,

    #[regex(r"\{[^{}]*\}", |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    Placeholder(&'src str),

    #[regex(r#""[^"]*""#, |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    #[regex(r"'[^']*'", |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    Str(&'src str),

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Word(&'src str),
}

/// One argument of a data instruction
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionArg {
    Attribute(String),
    Named(String),
    Text,
    Path,
    Literal(Value),
}

impl InstructionArg {
    /// Whether binding needs a context node
    pub fn needs_context(&self) -> bool {
        matches!(
            self,
            InstructionArg::Attribute(_) | InstructionArg::Text | InstructionArg::Path
        )
    }
}

/// Parsed data instruction
#[derive(Debug, Clone, PartialEq)]
pub struct DataInstruction {
    pub raw: String,
    pub scheme: String,
    pub target: String,
    pub args: Vec<InstructionArg>,
}

impl DataInstruction {
    pub fn parse(raw: &str) -> Result<Self, InstructionError> {
        let colon = raw
            .find(':')
            .ok_or_else(|| InstructionError::syntax(raw, 0, "missing scheme"))?;
        let scheme = raw[..colon].trim();
        if scheme.is_empty()
            || !scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            || !scheme.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(InstructionError::syntax(raw, 0, "invalid scheme"));
        }

        let rest = &raw[colon + 1..];
        let (target, args) = match rest.find('(') {
            Some(open) => {
                let body_start = colon + 1 + open + 1;
                let body = rest[open + 1..]
                    .trim_end()
                    .strip_suffix(')')
                    .ok_or_else(|| InstructionError::syntax(raw, raw.len(), "expected ')'"))?;
                (&rest[..open], parse_args(raw, body, body_start)?)
            }
            None => (rest, Vec::new()),
        };

        let target = target.trim();
        if target.is_empty() {
            return Err(InstructionError::syntax(raw, colon + 1, "missing target"));
        }

        Ok(Self {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
            target: target.to_string(),
            args,
        })
    }

    pub fn is_local(&self) -> bool {
        self.scheme == LOCAL_SCHEME
    }

    /// Check every placeholder has a binding source
    pub fn check_bindings(
        &self,
        has_context: bool,
        has_named: impl Fn(&str) -> bool,
    ) -> Result<(), InstructionError> {
        for arg in &self.args {
            if arg.needs_context() && !has_context {
                return Err(InstructionError::MissingContext(self.raw.clone()));
            }
            if let InstructionArg::Named(name) = arg {
                if !has_named(name) {
                    return Err(InstructionError::Unbound {
                        instruction: self.raw.clone(),
                        placeholder: format!("${}", name),
                    });
                }
            }
        }
        Ok(())
    }

    /// Produce the payload by evaluating every argument.
    ///
    /// `context` is the node placeholders like `{@id}` read from; `named`
    /// supplies `{$name}` values.
    pub fn bind(
        &self,
        context: Option<(&XmlDocument, NodeId)>,
        named: impl Fn(&str) -> Option<Value>,
    ) -> Result<Vec<Value>, InstructionError> {
        let missing = || InstructionError::MissingContext(self.raw.clone());
        self.args
            .iter()
            .map(|arg| match arg {
                InstructionArg::Literal(value) => Ok(value.clone()),
                InstructionArg::Named(name) => named(name).ok_or_else(|| InstructionError::Unbound {
                    instruction: self.raw.clone(),
                    placeholder: format!("${}", name),
                }),
                InstructionArg::Attribute(name) => {
                    let (doc, node) = context.ok_or_else(missing)?;
                    Ok(doc.attribute(node, name).map(Value::from).unwrap_or(Value::Null))
                }
                InstructionArg::Text => {
                    let (doc, node) = context.ok_or_else(missing)?;
                    Ok(Value::from(doc.text_content(node)))
                }
                InstructionArg::Path => {
                    let (doc, node) = context.ok_or_else(missing)?;
                    Ok(NodePath::between(doc, doc.root(), node, None, true)
                        .map(|p| Value::from(p.to_string()))
                        .unwrap_or(Value::Null))
                }
            })
            .collect()
    }
}

fn parse_args(raw: &str, body: &str, offset: usize) -> Result<Vec<InstructionArg>, InstructionError> {
    let mut args = Vec::new();
    let mut expect_arg = true;
    let mut lexer = ArgToken::lexer(body);

    while let Some(token) = lexer.next() {
        let pos = offset + lexer.span().start;
        let token = token.map_err(|_| InstructionError::syntax(raw, pos, "unexpected character"))?;

        if let ArgToken::Comma = token {
            if expect_arg {
                return Err(InstructionError::syntax(raw, pos, "empty argument"));
            }
            expect_arg = true;
            continue;
        }
        if !expect_arg {
            return Err(InstructionError::syntax(raw, pos, "expected ','"));
        }

        let arg = match token {
            ArgToken::Placeholder(inner) => parse_placeholder(raw, inner, pos)?,
            ArgToken::Str(s) => InstructionArg::Literal(Value::from(s)),
            ArgToken::Number(n) => InstructionArg::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            ),
            ArgToken::Word("true") => InstructionArg::Literal(Value::Bool(true)),
            ArgToken::Word("false") => InstructionArg::Literal(Value::Bool(false)),
            ArgToken::Word("null") => InstructionArg::Literal(Value::Null),
            ArgToken::Word(word) => {
                return Err(InstructionError::syntax(
                    raw,
                    pos,
                    format!("bare word '{}'", word),
                ))
            }
            ArgToken::Comma => continue,
        };
        args.push(arg);
        expect_arg = false;
    }

    if expect_arg && !args.is_empty() {
        return Err(InstructionError::syntax(raw, offset + body.len(), "trailing ','"));
    }
    Ok(args)
}

fn parse_placeholder(raw: &str, inner: &str, pos: usize) -> Result<InstructionArg, InstructionError> {
    let inner = inner.trim();
    let arg = match inner {
        "text()" => InstructionArg::Text,
        "xpath" => InstructionArg::Path,
        _ => {
            if let Some(attr) = inner.strip_prefix('@') {
                InstructionArg::Attribute(attr.to_string())
            } else if let Some(name) = inner.strip_prefix('$') {
                InstructionArg::Named(name.to_string())
            } else {
                return Err(InstructionError::syntax(
                    raw,
                    pos,
                    format!("unknown placeholder '{{{}}}'", inner),
                ));
            }
        }
    };
    match &arg {
        InstructionArg::Attribute(name) | InstructionArg::Named(name) if name.is_empty() => Err(
            InstructionError::syntax(raw, pos, "empty placeholder name"),
        ),
        _ => Ok(arg),
    }
}
