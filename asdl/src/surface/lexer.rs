use codespan_reporting::diagnostic::{Diagnostic, Label};
use logos::Logos;

use crate::files::FileId;
use crate::source::{BytePos, ByteRange};

/// Token classes of the schema language.
///
/// Words are classified by their first character: capitalised words name
/// constructors, lowercase words name types. Words like `module` and
/// `attributes` are only treated as keywords by the parser, in context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Logos)]
pub enum TokenKind {
    #[regex(r"[A-Z][a-zA-Z0-9_]*")]
    ConstructorId,
    #[regex(r"[a-z][a-zA-Z0-9_]*")]
    TypeId,

    #[token("=")]
    Equals,
    #[token(",")]
    Comma,
    #[token("?")]
    Question,
    #[token("|")]
    Pipe,
    #[token("*")]
    Star,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,

    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"--[^\n]*", logos::skip)]
    Error,
}

impl TokenKind {
    pub fn description(&self) -> &'static str {
        match self {
            TokenKind::ConstructorId => "constructor name",
            TokenKind::TypeId => "type name",
            TokenKind::Equals => "=",
            TokenKind::Comma => ",",
            TokenKind::Question => "?",
            TokenKind::Pipe => "|",
            TokenKind::Star => "*",
            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::OpenBrace => "{",
            TokenKind::CloseBrace => "}",
            TokenKind::Error => "error",
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Token<'source> {
    pub kind: TokenKind,
    pub text: &'source str,
    pub range: ByteRange,
    /// 1-based line number.
    pub line: u32,
}

#[derive(Clone, Debug)]
pub enum Error {
    UnexpectedCharacter { range: ByteRange, line: u32 },
}

impl Error {
    pub fn range(&self) -> ByteRange {
        match self {
            Error::UnexpectedCharacter { range, .. } => *range,
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            Error::UnexpectedCharacter { line, .. } => *line,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<FileId> {
        match self {
            Error::UnexpectedCharacter { range, line } => Diagnostic::error()
                .with_message(format!("Syntax error on line {line}: invalid operator"))
                .with_labels(vec![
                    Label::primary(range.file_id(), *range).with_message("invalid operator")
                ])
                .with_notes(vec![
                    "expected one of `= , ? | * ( ) { }`, a name, or a `--` comment".to_owned(),
                ]),
        }
    }
}

/// Lazily tokenize a schema. The iterator is single-pass; comments and
/// whitespace are dropped.
pub fn tokens(
    file_id: FileId,
    source: &str,
) -> impl Iterator<Item = Result<Token<'_>, Error>> {
    assert!(
        source.len() <= u32::MAX as usize,
        "`source` must be less than 4GiB in length"
    );

    let mut line = 1;
    let mut line_pos = 0;

    TokenKind::lexer(source)
        .spanned()
        .map(move |(kind, range)| {
            line += source[line_pos..range.start].matches('\n').count() as u32;
            line_pos = range.start;

            let byte_range = ByteRange::new(file_id, range.start as BytePos, range.end as BytePos);
            match kind {
                TokenKind::Error => Err(Error::UnexpectedCharacter {
                    range: byte_range,
                    line,
                }),
                kind => Ok(Token {
                    kind,
                    text: &source[range],
                    range: byte_range,
                    line,
                }),
            }
        })
}
