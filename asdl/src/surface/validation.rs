//! Structural checks on a parsed module that do not need name resolution.
//!
//! All violations are collected before returning.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use fxhash::FxHashMap;
use std::fmt;

use crate::files::FileId;
use crate::source::{ByteRange, Ranged};
use crate::surface::{Field, Module, Type};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationMessage {
    /// Constructors of compound sums share one namespace across the module.
    DuplicateConstructor {
        name: String,
        range: ByteRange,
        previous_range: ByteRange,
    },
    DuplicateType {
        name: String,
        range: ByteRange,
        previous_range: ByteRange,
    },
    DuplicateField {
        owner: String,
        name: String,
        range: ByteRange,
        previous_range: ByteRange,
    },
}

impl ValidationMessage {
    pub fn range(&self) -> ByteRange {
        match self {
            ValidationMessage::DuplicateConstructor { range, .. }
            | ValidationMessage::DuplicateType { range, .. }
            | ValidationMessage::DuplicateField { range, .. } => *range,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<FileId> {
        let primary_label = |range: &ByteRange| Label::primary(range.file_id(), *range);
        let secondary_label = |range: &ByteRange| Label::secondary(range.file_id(), *range);

        match self {
            ValidationMessage::DuplicateConstructor {
                range,
                previous_range,
                ..
            } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![
                    primary_label(range).with_message("redefined here"),
                    secondary_label(previous_range).with_message("previously defined here"),
                ])
                .with_notes(vec![
                    "constructors of compound sums must be unique across the module".to_owned(),
                ]),
            ValidationMessage::DuplicateType {
                range,
                previous_range,
                ..
            } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![
                    primary_label(range).with_message("redefined here"),
                    secondary_label(previous_range).with_message("previously defined here"),
                ]),
            ValidationMessage::DuplicateField {
                range,
                previous_range,
                ..
            } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![
                    primary_label(range).with_message("duplicate field"),
                    secondary_label(previous_range).with_message("first declared here"),
                ]),
        }
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMessage::DuplicateConstructor { name, .. } => {
                write!(f, "redefinition of constructor `{name}`")
            }
            ValidationMessage::DuplicateType { name, .. } => {
                write!(f, "redefinition of type `{name}`")
            }
            ValidationMessage::DuplicateField { owner, name, .. } => {
                write!(f, "field `{name}` is declared more than once in `{owner}`")
            }
        }
    }
}

/// Check a module for redefinitions.
pub fn check(module: &Module) -> Result<(), Vec<ValidationMessage>> {
    let mut messages = Vec::new();
    let mut types = FxHashMap::<&str, ByteRange>::default();
    let mut constructors = FxHashMap::<&str, ByteRange>::default();

    for decl in &module.decls {
        if let Some(previous_range) = types.insert(decl.name.as_str(), decl.name.range) {
            messages.push(ValidationMessage::DuplicateType {
                name: decl.name.to_string(),
                range: decl.name.range,
                previous_range,
            });
        }

        match &decl.r#type {
            Type::Product(product) => {
                let fields = product.fields.iter().chain(&product.attributes);
                check_fields(&decl.name, fields, &mut messages);
            }
            Type::Sum(sum) => {
                // Variants of simple sums are scoped to their enum
                if !sum.is_simple() {
                    for cons in &sum.constructors {
                        let name = &cons.name;
                        if let Some(previous_range) = constructors.insert(name.as_str(), name.range)
                        {
                            messages.push(ValidationMessage::DuplicateConstructor {
                                name: name.to_string(),
                                range: name.range,
                                previous_range,
                            });
                        }
                    }
                }

                for cons in &sum.constructors {
                    let fields = cons.fields.iter().chain(&sum.attributes);
                    check_fields(&cons.name, fields, &mut messages);
                }
            }
        }
    }

    match messages.is_empty() {
        true => Ok(()),
        false => Err(messages),
    }
}

fn check_fields<'a>(
    owner: &Ranged<String>,
    fields: impl Iterator<Item = &'a Field>,
    messages: &mut Vec<ValidationMessage>,
) {
    let mut labels = FxHashMap::<&str, ByteRange>::default();

    for field in fields {
        let range = field_range(field);
        if let Some(previous_range) = labels.insert(field.label(), range) {
            messages.push(ValidationMessage::DuplicateField {
                owner: owner.to_string(),
                name: field.label().to_owned(),
                range,
                previous_range,
            });
        }
    }
}

fn field_range(field: &Field) -> ByteRange {
    match &field.name {
        Some(name) => name.range,
        None => field.type_name.range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_source(source: &str) -> Result<(), Vec<ValidationMessage>> {
        check(&Module::parse(FileId::try_from(1).unwrap(), source).unwrap())
    }

    #[test]
    fn valid_module() {
        let result = check_source(
            "module M {
                color = Red | Green
                paint = Red | Green
                expr = Const(int i) | Neg(expr e) attributes (int line)
            }",
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn constructors_share_a_flat_namespace() {
        let messages = check_source(
            "module M {
                expr = Const(int i) | Var(string name)
                stmt = Expr(expr e) | Var(string name, expr init)
            }",
        )
        .unwrap_err();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to_string(), "redefinition of constructor `Var`");
    }

    #[test]
    fn all_violations_are_reported() {
        let messages = check_source(
            "module M {
                t = (int x, string x)
                t = (int y)
                u = A(int a) | B(int line) attributes (int line)
            }",
        )
        .unwrap_err();

        let messages: Vec<_> = messages.iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            [
                "field `x` is declared more than once in `t`",
                "redefinition of type `t`",
                "field `line` is declared more than once in `B`",
            ],
        );
    }

    #[test]
    fn unnamed_fields_clash_by_type_name() {
        let messages = check_source("module M { pair = (expr, expr) }").unwrap_err();
        assert!(matches!(
            &messages[..],
            [ValidationMessage::DuplicateField { name, .. }] if name == "expr",
        ));
    }
}
