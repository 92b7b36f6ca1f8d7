//! A recursive descent parser for schema modules.
//!
//! ```text
//! module      := 'module' Id '{' { use } definitions '}'
//! use         := 'use' Id '{' TypeId { [','] TypeId } '}'
//! definitions := { TypeId '=' type }
//! type        := product | sum
//! product     := fields [ 'attributes' fields ]
//! sum         := constructor { '|' constructor } [ 'attributes' fields ]
//! constructor := ConstructorId [ fields ]
//! fields      := '(' field { ',' field } ')'
//! field       := TypeId [ '?' | '*' ] [ Id ]
//! ```
//!
//! `Id` is either a `TypeId` or a `ConstructorId`. The parser uses a single
//! token of lookahead.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use itertools::Itertools;
use std::fmt;

use crate::files::FileId;
use crate::source::{BytePos, ByteRange, Ranged};
use crate::surface::lexer::{self, Token, TokenKind};
use crate::surface::{Constructor, Field, Module, Product, Quantifier, Sum, Type, TypeDecl, Use};

const ID: &[TokenKind] = &[TokenKind::TypeId, TokenKind::ConstructorId];

#[derive(Clone, Debug)]
pub enum SyntaxError {
    Lexer(lexer::Error),
    UnexpectedToken {
        range: ByteRange,
        line: u32,
        found: String,
        expected: Vec<&'static str>,
    },
    UnexpectedEof {
        range: ByteRange,
        line: u32,
        expected: Vec<&'static str>,
    },
    ExtraToken {
        range: ByteRange,
        line: u32,
        found: String,
    },
    SeqAndOpt {
        range: ByteRange,
        line: u32,
    },
}

impl SyntaxError {
    pub fn line(&self) -> u32 {
        match self {
            SyntaxError::Lexer(error) => error.line(),
            SyntaxError::UnexpectedToken { line, .. }
            | SyntaxError::UnexpectedEof { line, .. }
            | SyntaxError::ExtraToken { line, .. }
            | SyntaxError::SeqAndOpt { line, .. } => *line,
        }
    }

    pub fn range(&self) -> ByteRange {
        match self {
            SyntaxError::Lexer(error) => error.range(),
            SyntaxError::UnexpectedToken { range, .. }
            | SyntaxError::UnexpectedEof { range, .. }
            | SyntaxError::ExtraToken { range, .. }
            | SyntaxError::SeqAndOpt { range, .. } => *range,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<FileId> {
        let range = self.range();
        match self {
            SyntaxError::Lexer(error) => error.to_diagnostic(),
            SyntaxError::UnexpectedToken { found, expected, .. } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![Label::primary(range.file_id(), range)
                    .with_message(format!("unexpected `{found}`"))])
                .with_notes(vec![format_expected(expected)]),
            SyntaxError::UnexpectedEof { expected, .. } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![
                    Label::primary(range.file_id(), range).with_message("unexpected end of file")
                ])
                .with_notes(vec![format_expected(expected)]),
            SyntaxError::ExtraToken { .. } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![Label::primary(range.file_id(), range)
                    .with_message("expected the end of the file")]),
            SyntaxError::SeqAndOpt { .. } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![
                    Label::primary(range.file_id(), range).with_message("conflicting quantifiers")
                ])
                .with_notes(vec!["use either `*` or `?`, not both".to_owned()]),
        }
    }
}

fn format_expected(expected: &[&str]) -> String {
    format!(
        "expected {}",
        expected.iter().map(|kind| format!("`{kind}`")).format(" or ")
    )
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Syntax error on line {}: ", self.line())?;
        match self {
            SyntaxError::Lexer(_) => write!(f, "invalid operator"),
            SyntaxError::UnexpectedToken {
                found, expected, ..
            } => write!(f, "{}, got `{found}`", format_expected(expected)),
            SyntaxError::UnexpectedEof { expected, .. } => {
                write!(f, "{}, got end of file", format_expected(expected))
            }
            SyntaxError::ExtraToken { found, .. } => {
                write!(f, "unexpected `{found}` after the module")
            }
            SyntaxError::SeqAndOpt { .. } => {
                write!(f, "a field cannot be both a sequence and optional")
            }
        }
    }
}

impl std::error::Error for SyntaxError {}

impl From<lexer::Error> for SyntaxError {
    fn from(error: lexer::Error) -> SyntaxError {
        SyntaxError::Lexer(error)
    }
}

type Tokens<'source> = Box<dyn Iterator<Item = Result<Token<'source>, lexer::Error>> + 'source>;

pub struct Parser<'source> {
    file_id: FileId,
    source_len: BytePos,
    tokens: Tokens<'source>,
    current: Option<Token<'source>>,
    last_line: u32,
}

impl<'source> Parser<'source> {
    pub fn new(file_id: FileId, source: &'source str) -> Parser<'source> {
        Parser {
            file_id,
            source_len: source.len() as BytePos,
            tokens: Box::new(lexer::tokens(file_id, source)),
            current: None,
            last_line: 1,
        }
    }

    pub fn parse_module(mut self) -> Result<Module, SyntaxError> {
        self.advance()?;

        self.expect_keyword("module")?;
        let name = self.expect_one_of(ID)?;
        self.expect(TokenKind::OpenBrace)?;

        let mut uses = Vec::new();
        while self.at_keyword("use") {
            uses.push(self.parse_use()?);
        }

        let mut decls = Vec::new();
        while self.peek() == Some(TokenKind::TypeId) {
            let name = self.expect(TokenKind::TypeId)?;
            self.expect(TokenKind::Equals)?;
            let r#type = self.parse_type()?;
            decls.push(TypeDecl {
                name: ranged(name),
                r#type,
            });
        }

        self.expect_one_of(&[TokenKind::CloseBrace, TokenKind::TypeId])?;

        match self.current {
            None => Ok(Module {
                name: ranged(name),
                uses,
                decls,
            }),
            Some(token) => Err(SyntaxError::ExtraToken {
                range: token.range,
                line: token.line,
                found: token.text.to_owned(),
            }),
        }
    }

    fn parse_use(&mut self) -> Result<Use, SyntaxError> {
        self.expect_keyword("use")?;
        let module_name = self.expect_one_of(ID)?;
        self.expect(TokenKind::OpenBrace)?;

        let mut type_names = vec![ranged(self.expect(TokenKind::TypeId)?)];
        while self.peek() != Some(TokenKind::CloseBrace) {
            if self.peek() == Some(TokenKind::Comma) {
                self.advance()?;
            }
            type_names.push(ranged(self.expect(TokenKind::TypeId)?));
        }
        self.expect(TokenKind::CloseBrace)?;

        Ok(Use {
            module_name: ranged(module_name),
            type_names,
        })
    }

    fn parse_type(&mut self) -> Result<Type, SyntaxError> {
        if self.peek() == Some(TokenKind::OpenParen) {
            let fields = self.parse_fields()?;
            let attributes = self.parse_optional_attributes()?;
            return Ok(Type::Product(Product { fields, attributes }));
        }

        let mut constructors = Vec::new();
        loop {
            let name = self.expect(TokenKind::ConstructorId)?;
            let fields = match self.peek() {
                Some(TokenKind::OpenParen) => self.parse_fields()?,
                _ => Vec::new(),
            };
            constructors.push(Constructor {
                name: ranged(name),
                fields,
            });

            if self.peek() != Some(TokenKind::Pipe) {
                break;
            }
            self.advance()?;
        }
        let attributes = self.parse_optional_attributes()?;

        Ok(Type::Sum(Sum {
            constructors,
            attributes,
        }))
    }

    fn parse_fields(&mut self) -> Result<Vec<Field>, SyntaxError> {
        self.expect(TokenKind::OpenParen)?;

        let mut fields = vec![self.parse_field()?];
        while self.peek() == Some(TokenKind::Comma) {
            self.advance()?;
            fields.push(self.parse_field()?);
        }
        self.expect(TokenKind::CloseParen)?;

        Ok(fields)
    }

    fn parse_field(&mut self) -> Result<Field, SyntaxError> {
        let type_name = self.expect(TokenKind::TypeId)?;

        let quantifier = match self.peek() {
            Some(TokenKind::Star) => Quantifier::Seq,
            Some(TokenKind::Question) => Quantifier::Opt,
            _ => Quantifier::One,
        };
        if quantifier != Quantifier::One {
            let marker = self.advance()?;
            if let Some(token) = self.current {
                if matches!(token.kind, TokenKind::Star | TokenKind::Question) {
                    let start = marker.map_or(token.range, |marker| marker.range);
                    return Err(SyntaxError::SeqAndOpt {
                        range: start.merge(&token.range).unwrap_or(token.range),
                        line: token.line,
                    });
                }
            }
        }

        let name = match self.peek() {
            Some(TokenKind::TypeId | TokenKind::ConstructorId) => self.advance()?.map(ranged),
            _ => None,
        };

        Ok(Field {
            type_name: ranged(type_name),
            name,
            quantifier,
        })
    }

    fn parse_optional_attributes(&mut self) -> Result<Vec<Field>, SyntaxError> {
        if self.at_keyword("attributes") {
            self.advance()?;
            self.parse_fields()
        } else {
            Ok(Vec::new())
        }
    }

    /// Move to the next token, returning the previous one.
    fn advance(&mut self) -> Result<Option<Token<'source>>, SyntaxError> {
        let next = self.tokens.next().transpose()?;
        if let Some(token) = &next {
            self.last_line = token.line;
        }
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn peek(&self) -> Option<TokenKind> {
        self.current.map(|token| token.kind)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.current,
            Some(token) if token.kind == TokenKind::TypeId && token.text == keyword
        )
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'source>, SyntaxError> {
        self.expect_one_of(&[kind])
    }

    /// Check that the current token has one of the given kinds, returning it
    /// and moving on to the next token.
    fn expect_one_of(&mut self, kinds: &[TokenKind]) -> Result<Token<'source>, SyntaxError> {
        match self.current {
            Some(token) if kinds.contains(&token.kind) => {
                self.advance()?;
                Ok(token)
            }
            _ => Err(self.unexpected(kinds.iter().map(TokenKind::description).collect())),
        }
    }

    fn expect_keyword(&mut self, keyword: &'static str) -> Result<Token<'source>, SyntaxError> {
        match self.current {
            Some(token) if self.at_keyword(keyword) => {
                self.advance()?;
                Ok(token)
            }
            _ => Err(self.unexpected(vec![keyword])),
        }
    }

    fn unexpected(&self, expected: Vec<&'static str>) -> SyntaxError {
        match self.current {
            Some(token) => SyntaxError::UnexpectedToken {
                range: token.range,
                line: token.line,
                found: token.text.to_owned(),
                expected,
            },
            None => SyntaxError::UnexpectedEof {
                range: ByteRange::new(self.file_id, self.source_len, self.source_len),
                line: self.last_line,
                expected,
            },
        }
    }
}

fn ranged(token: Token<'_>) -> Ranged<String> {
    Ranged::new(token.range, token.text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Module, SyntaxError> {
        Module::parse(FileId::try_from(1).unwrap(), source)
    }

    #[test]
    fn sum_with_attributes() {
        let module = parse(
            "module M {
                TypeName = Ctor1(field1, field2*) | Ctor2(field3?) attributes (int* spid)
                OtherType = (string a, int b)
            }",
        );
        // `TypeName` starts with a capital letter, so it is not a type name
        assert!(module.is_err());

        let module = parse(
            "module M {
                type_name = Ctor1(field1, field2*) | Ctor2(field3?) attributes (int* spid)
                other_type = (string a, int b)
            }",
        )
        .unwrap();

        match &module.decls[0].r#type {
            Type::Sum(sum) => {
                assert_eq!(sum.constructors.len(), 2);
                assert_eq!(sum.constructors[0].fields[1].quantifier, Quantifier::Seq);
                assert_eq!(sum.constructors[1].fields[0].quantifier, Quantifier::Opt);
                assert_eq!(sum.attributes.len(), 1);
                assert_eq!(sum.attributes[0].label(), "spid");
            }
            Type::Product(_) => panic!("expected a sum"),
        }
        assert!(matches!(module.decls[1].r#type, Type::Product(_)));
    }

    #[test]
    fn product_attributes() {
        let module = parse("module M { token = (string val) attributes (int line) }").unwrap();
        match &module.decls[0].r#type {
            Type::Product(product) => assert_eq!(product.attributes[0].label(), "line"),
            Type::Sum(_) => panic!("expected a product"),
        }
    }

    #[test]
    fn use_clauses() {
        let module = parse("module M { use syntax { word, command } t = (word w) }").unwrap();
        assert_eq!(module.uses.len(), 1);
        assert_eq!(module.uses[0].module_name.as_str(), "syntax");
        let names: Vec<_> = module.uses[0].type_names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, ["word", "command"]);
    }

    #[test]
    fn empty_module() {
        let module = parse("module empty {}").unwrap();
        assert!(module.decls.is_empty());
    }

    #[test]
    fn seq_and_opt_is_rejected() {
        for source in ["module M { t = (int*? x) }", "module M { t = (int?* x) }"] {
            match parse(source) {
                Err(SyntaxError::SeqAndOpt { line, .. }) => assert_eq!(line, 1),
                result => panic!("unexpected result: {result:?}"),
            }
        }
    }

    #[test]
    fn missing_module_keyword() {
        let error = parse("modul M {}").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Syntax error on line 1: expected `module`, got `modul`",
        );
    }

    #[test]
    fn unexpected_token_names_expected_and_line() {
        let error = parse("module M {\n  t = (int x,\n  )\n}").unwrap_err();
        assert_eq!(error.line(), 3);
        assert_eq!(
            error.to_string(),
            "Syntax error on line 3: expected `type name`, got `)`",
        );
    }

    #[test]
    fn unexpected_eof() {
        let error = parse("module M {\n  t = A |").unwrap_err();
        assert!(matches!(error, SyntaxError::UnexpectedEof { line: 2, .. }));
    }

    #[test]
    fn invalid_operator_reports_line() {
        let error = parse("module M {\n  t = A\n  u = B ; C\n}").unwrap_err();
        assert!(matches!(error, SyntaxError::Lexer(_)));
        assert_eq!(error.line(), 3);
        assert_eq!(error.to_string(), "Syntax error on line 3: invalid operator");
        assert_eq!(error.to_diagnostic().message, error.to_string());
    }

    #[test]
    fn trailing_tokens() {
        let error = parse("module M { } extra").unwrap_err();
        assert!(matches!(error, SyntaxError::ExtraToken { .. }));
    }

    #[test]
    fn empty_field_list_is_rejected() {
        assert!(parse("module M { t = A() }").is_err());
    }
}
