//! Instance notation, a textual form of values.
//!
//! ```text
//! 42  -1  "text"  true  false  null  [1, 2, 3]
//! Red                                  -- variant of a simple sum
//! Binary(Add, left = Const(1), right = Const(2))
//! point(1, 2)  (x = 1, y = 2)          -- products
//! ```
//!
//! Parsing is directed by the expected type, so constructor names only need
//! to be unique within their sum. Omitted sequence fields default to `[]` and
//! omitted optional fields to `null`.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use logos::Logos;
use std::fmt;
use std::ops::Range;

use crate::core::value::Value;
use crate::core::{DeclId, DeclKind, Desc, Field, TypeLookup};
use crate::files::FileId;
use crate::source::{BytePos, ByteRange};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Logos)]
enum TokenKind {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,
    #[regex(r"-?[0-9]+")]
    Int,
    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,

    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,

    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"--[^\n]*", logos::skip)]
    Error,
}

impl TokenKind {
    fn description(&self) -> &'static str {
        match self {
            TokenKind::Name => "name",
            TokenKind::Int => "integer",
            TokenKind::Str => "string",
            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::OpenBracket => "[",
            TokenKind::CloseBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Equals => "=",
            TokenKind::Error => "error",
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Token<'source> {
    kind: TokenKind,
    text: &'source str,
    range: ByteRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    UnexpectedCharacter {
        range: ByteRange,
    },
    UnexpectedToken {
        range: ByteRange,
        found: String,
        expected: String,
    },
    UnexpectedEof {
        range: ByteRange,
        expected: String,
    },
    InvalidInt {
        range: ByteRange,
    },
    InvalidEscape {
        range: ByteRange,
    },
    UnknownVariant {
        range: ByteRange,
        name: String,
        sum: String,
    },
    UnknownField {
        range: ByteRange,
        name: String,
        record: String,
    },
    DuplicateField {
        range: ByteRange,
        name: String,
    },
    MissingField {
        range: ByteRange,
        name: String,
        record: String,
    },
    TooManyArguments {
        range: ByteRange,
        record: String,
        expected: usize,
    },
    PositionalAfterKeyword {
        range: ByteRange,
    },
}

impl InstanceError {
    pub fn range(&self) -> ByteRange {
        match self {
            InstanceError::UnexpectedCharacter { range }
            | InstanceError::UnexpectedToken { range, .. }
            | InstanceError::UnexpectedEof { range, .. }
            | InstanceError::InvalidInt { range }
            | InstanceError::InvalidEscape { range }
            | InstanceError::UnknownVariant { range, .. }
            | InstanceError::UnknownField { range, .. }
            | InstanceError::DuplicateField { range, .. }
            | InstanceError::MissingField { range, .. }
            | InstanceError::TooManyArguments { range, .. }
            | InstanceError::PositionalAfterKeyword { range } => *range,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<FileId> {
        let range = self.range();
        Diagnostic::error()
            .with_message(self.to_string())
            .with_labels(vec![Label::primary(range.file_id(), range)])
    }
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceError::UnexpectedCharacter { .. } => write!(f, "unexpected character"),
            InstanceError::UnexpectedToken {
                found, expected, ..
            } => write!(f, "expected {expected}, found `{found}`"),
            InstanceError::UnexpectedEof { expected, .. } => {
                write!(f, "expected {expected}, found the end of the input")
            }
            InstanceError::InvalidInt { .. } => write!(f, "integer literal is out of range"),
            InstanceError::InvalidEscape { .. } => write!(f, "invalid escape sequence"),
            InstanceError::UnknownVariant { name, sum, .. } => {
                write!(f, "`{name}` is not a constructor of `{sum}`")
            }
            InstanceError::UnknownField { name, record, .. } => {
                write!(f, "`{record}` has no field named `{name}`")
            }
            InstanceError::DuplicateField { name, .. } => {
                write!(f, "field `{name}` is given more than once")
            }
            InstanceError::MissingField { name, record, .. } => {
                write!(f, "missing field `{name}` of `{record}`")
            }
            InstanceError::TooManyArguments {
                record, expected, ..
            } => write!(f, "`{record}` takes at most {expected} arguments"),
            InstanceError::PositionalAfterKeyword { .. } => {
                write!(f, "positional arguments must come before named arguments")
            }
        }
    }
}

impl std::error::Error for InstanceError {}

/// Parse a value of the type described by `desc`.
pub fn parse_value(
    lookup: &TypeLookup,
    file_id: FileId,
    source: &str,
    desc: &Desc,
) -> Result<Value, InstanceError> {
    let mut tokens = Vec::new();
    for (kind, range) in TokenKind::lexer(source).spanned() {
        let range = ByteRange::new(file_id, range.start as BytePos, range.end as BytePos);
        match kind {
            TokenKind::Error => return Err(InstanceError::UnexpectedCharacter { range }),
            kind => tokens.push(Token {
                kind,
                text: &source[Range::<usize>::from(range)],
                range,
            }),
        }
    }

    let end = source.len() as BytePos;
    let mut parser = Parser {
        lookup,
        tokens,
        position: 0,
        eof_range: ByteRange::new(file_id, end, end),
    };

    let value = parser.value(desc)?;
    match parser.peek() {
        None => Ok(value),
        Some(token) => Err(InstanceError::UnexpectedToken {
            range: token.range,
            found: token.text.to_owned(),
            expected: "the end of the input".to_owned(),
        }),
    }
}

struct Parser<'a, 'source> {
    lookup: &'a TypeLookup,
    tokens: Vec<Token<'source>>,
    position: usize,
    eof_range: ByteRange,
}

impl<'a, 'source> Parser<'a, 'source> {
    fn peek(&self) -> Option<Token<'source>> {
        self.tokens.get(self.position).copied()
    }

    fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.position + offset).map(|token| token.kind)
    }

    fn next(&mut self, expected: &str) -> Result<Token<'source>, InstanceError> {
        match self.peek() {
            Some(token) => {
                self.position += 1;
                Ok(token)
            }
            None => Err(InstanceError::UnexpectedEof {
                range: self.eof_range,
                expected: expected.to_owned(),
            }),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'source>, InstanceError> {
        let expected = format!("`{}`", kind.description());
        let token = self.next(&expected)?;
        match token.kind == kind {
            true => Ok(token),
            false => Err(unexpected(token, expected)),
        }
    }

    fn value(&mut self, desc: &Desc) -> Result<Value, InstanceError> {
        match desc {
            Desc::Int | Desc::User(_) => {
                let token = self.next("an integer")?;
                match token.kind {
                    TokenKind::Int => match token.text.parse() {
                        Ok(n) => Ok(Value::Int(n)),
                        Err(_) => Err(InstanceError::InvalidInt { range: token.range }),
                    },
                    _ => Err(unexpected(token, "an integer")),
                }
            }
            Desc::Bool => {
                let token = self.next("`true` or `false`")?;
                match (token.kind, token.text) {
                    (TokenKind::Name, "true") => Ok(Value::Bool(true)),
                    (TokenKind::Name, "false") => Ok(Value::Bool(false)),
                    _ => Err(unexpected(token, "`true` or `false`")),
                }
            }
            Desc::Str => {
                let token = self.next("a string")?;
                match token.kind {
                    TokenKind::Str => unescape(token).map(Value::Str),
                    _ => Err(unexpected(token, "a string")),
                }
            }
            Desc::Array(elem) => {
                self.expect(TokenKind::OpenBracket)?;
                let mut elems = Vec::new();
                while self.peek_kind(0) != Some(TokenKind::CloseBracket) {
                    elems.push(self.value(elem)?);
                    if self.peek_kind(0) != Some(TokenKind::Comma) {
                        break;
                    }
                    self.expect(TokenKind::Comma)?;
                }
                self.expect(TokenKind::CloseBracket)?;
                Ok(Value::Array(elems))
            }
            Desc::Maybe(elem) => match self.peek() {
                Some(token) if token.kind == TokenKind::Name && token.text == "null" => {
                    self.position += 1;
                    Ok(Value::Maybe(None))
                }
                _ => Ok(Value::Maybe(Some(Box::new(self.value(elem)?)))),
            },
            Desc::Sum(id) => self.sum(*id),
            Desc::Product(id) => self.product(*id),
        }
    }

    fn sum(&mut self, id: DeclId) -> Result<Value, InstanceError> {
        let decl = self.lookup.decl(id);
        let sum = match &decl.kind {
            DeclKind::Sum(sum) => sum,
            DeclKind::Product(_) => return self.product(id),
        };

        let token = self.next("a constructor name")?;
        if token.kind != TokenKind::Name {
            return Err(unexpected(token, "a constructor name"));
        }
        let variant = match sum.variant_by_name(token.text) {
            Some(variant) => variant,
            None => {
                return Err(InstanceError::UnknownVariant {
                    range: token.range,
                    name: token.text.to_owned(),
                    sum: decl.name.clone(),
                })
            }
        };

        if sum.is_simple {
            return Ok(Value::Enum {
                decl: id,
                tag: variant.tag,
            });
        }

        let fields = match self.peek_kind(0) {
            Some(TokenKind::OpenParen) => self.arguments(&variant.name, &variant.fields)?,
            _ => self.defaults(token.range, &variant.name, &variant.fields, Vec::new())?,
        };

        Ok(Value::Record {
            decl: id,
            variant: Some(variant.tag),
            fields,
        })
    }

    fn product(&mut self, id: DeclId) -> Result<Value, InstanceError> {
        let decl = self.lookup.decl(id);
        let fields = match &decl.kind {
            DeclKind::Product(product) => &product.fields,
            DeclKind::Sum(_) => return self.sum(id),
        };

        // The type name is optional
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Name {
                if token.text != decl.name {
                    return Err(unexpected(token, format!("`{}` or `(`", decl.name)));
                }
                self.position += 1;
            }
        }

        let fields = self.arguments(&decl.name, fields)?;
        Ok(Value::Record {
            decl: id,
            variant: None,
            fields,
        })
    }

    /// Parse a parenthesised argument list, returning one value per field.
    fn arguments(&mut self, record: &str, fields: &[Field]) -> Result<Vec<Value>, InstanceError> {
        let open = self.expect(TokenKind::OpenParen)?;
        let mut values: Vec<Option<Value>> = vec![None; fields.len()];
        let mut position = 0;
        let mut seen_keyword = false;

        while self.peek_kind(0) != Some(TokenKind::CloseParen) {
            let is_keyword = self.peek_kind(0) == Some(TokenKind::Name)
                && self.peek_kind(1) == Some(TokenKind::Equals);

            if is_keyword {
                seen_keyword = true;
                let name = self.next("a field name")?;
                self.expect(TokenKind::Equals)?;
                let index = match fields.iter().position(|field| field.name == name.text) {
                    Some(index) => index,
                    None => {
                        return Err(InstanceError::UnknownField {
                            range: name.range,
                            name: name.text.to_owned(),
                            record: record.to_owned(),
                        })
                    }
                };
                if values[index].is_some() {
                    return Err(InstanceError::DuplicateField {
                        range: name.range,
                        name: name.text.to_owned(),
                    });
                }
                values[index] = Some(self.value(&fields[index].desc)?);
            } else {
                let range = self.peek().map_or(self.eof_range, |token| token.range);
                if seen_keyword {
                    return Err(InstanceError::PositionalAfterKeyword { range });
                }
                if position >= fields.len() {
                    return Err(InstanceError::TooManyArguments {
                        range,
                        record: record.to_owned(),
                        expected: fields.len(),
                    });
                }
                values[position] = Some(self.value(&fields[position].desc)?);
                position += 1;
            }

            if self.peek_kind(0) != Some(TokenKind::Comma) {
                break;
            }
            self.expect(TokenKind::Comma)?;
        }
        self.expect(TokenKind::CloseParen)?;

        self.defaults(open.range, record, fields, values)
    }

    /// Fill in omitted sequence and optional fields.
    fn defaults(
        &self,
        range: ByteRange,
        record: &str,
        fields: &[Field],
        mut values: Vec<Option<Value>>,
    ) -> Result<Vec<Value>, InstanceError> {
        values.resize(fields.len(), None);

        (fields.iter().zip(values))
            .map(|(field, value)| match (value, &field.desc) {
                (Some(value), _) => Ok(value),
                (None, Desc::Array(_)) => Ok(Value::Array(Vec::new())),
                (None, Desc::Maybe(_)) => Ok(Value::Maybe(None)),
                (None, _) => Err(InstanceError::MissingField {
                    range,
                    name: field.name.clone(),
                    record: record.to_owned(),
                }),
            })
            .collect()
    }
}

fn unexpected(token: Token<'_>, expected: impl Into<String>) -> InstanceError {
    InstanceError::UnexpectedToken {
        range: token.range,
        found: token.text.to_owned(),
        expected: expected.into(),
    }
}

fn unescape(token: Token<'_>) -> Result<String, InstanceError> {
    let invalid = || InstanceError::InvalidEscape { range: token.range };
    let contents = &token.text[1..token.text.len() - 1];

    let mut output = String::with_capacity(contents.len());
    let mut chars = contents.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        match chars.next().ok_or_else(invalid)? {
            '"' => output.push('"'),
            '\'' => output.push('\''),
            '\\' => output.push('\\'),
            'n' => output.push('\n'),
            'r' => output.push('\r'),
            't' => output.push('\t'),
            '0' => output.push('\0'),
            'u' => {
                if chars.next() != Some('{') {
                    return Err(invalid());
                }
                let hex: String = chars.by_ref().take_while(|&ch| ch != '}').collect();
                let ch = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(invalid)?;
                output.push(ch);
            }
            _ => return Err(invalid()),
        }
    }

    Ok(output)
}
