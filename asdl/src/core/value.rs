//! Instances of schema types.

use std::fmt;

use crate::core::{DeclId, DeclKind, Field, TypeLookup};

/// A value of some [descriptor][crate::core::Desc]. Values are owned trees,
/// so they can never contain cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Integers, and values of external types.
    Int(i64),
    Bool(bool),
    Str(String),
    Array(Vec<Value>),
    Maybe(Option<Box<Value>>),
    /// A variant of a simple sum.
    Enum { decl: DeclId, tag: u32 },
    /// A product, or a constructor of a compound sum. Field values follow the
    /// resolved field order.
    Record {
        decl: DeclId,
        variant: Option<u32>,
        fields: Vec<Value>,
    },
}

impl Value {
    /// Display the value in instance notation.
    pub fn display<'a>(&'a self, lookup: &'a TypeLookup) -> DisplayValue<'a> {
        DisplayValue {
            lookup,
            value: self,
        }
    }

    /// Whether printing can leave out this field value, because it is the
    /// default for its field.
    fn is_default(&self) -> bool {
        match self {
            Value::Array(elems) => elems.is_empty(),
            Value::Maybe(value) => value.is_none(),
            _ => false,
        }
    }
}

pub struct DisplayValue<'a> {
    lookup: &'a TypeLookup,
    value: &'a Value,
}

impl<'a> DisplayValue<'a> {
    fn nested(&self, value: &'a Value) -> DisplayValue<'a> {
        value.display(self.lookup)
    }

    fn fmt_record(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        field_descs: &[Field],
        fields: &[Value],
    ) -> fmt::Result {
        write!(f, "{name}")?;
        if field_descs.is_empty() {
            return Ok(());
        }

        write!(f, "(")?;
        let mut first = true;
        for (field, value) in field_descs.iter().zip(fields) {
            if value.is_default() {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{} = {}", field.name, self.nested(value))?;
        }
        write!(f, ")")
    }
}

impl<'a> fmt::Display for DisplayValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(elems) => {
                write!(f, "[")?;
                for (index, elem) in elems.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.nested(elem))?;
                }
                write!(f, "]")
            }
            Value::Maybe(None) => write!(f, "null"),
            Value::Maybe(Some(value)) => write!(f, "{}", self.nested(value)),
            Value::Enum { decl, tag } => match &self.lookup.decl(*decl).kind {
                DeclKind::Sum(sum) => match sum.variant(*tag) {
                    Some(variant) => write!(f, "{}", variant.name),
                    None => write!(f, "#invalid-tag({tag})"),
                },
                DeclKind::Product(_) => write!(f, "#invalid-enum"),
            },
            Value::Record {
                decl,
                variant,
                fields,
            } => {
                let decl = self.lookup.decl(*decl);
                match (&decl.kind, variant) {
                    (DeclKind::Product(product), None) => {
                        // Products always take parentheses, even without fields
                        if product.fields.is_empty() {
                            return write!(f, "{}()", decl.name);
                        }
                        self.fmt_record(f, &decl.name, &product.fields, fields)
                    }
                    (DeclKind::Sum(sum), Some(tag)) => match sum.variant(*tag) {
                        Some(variant) => self.fmt_record(f, &variant.name, &variant.fields, fields),
                        None => write!(f, "#invalid-tag({tag})"),
                    },
                    _ => write!(f, "#invalid-record"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileId;
    use crate::surface::{elaboration, Module};

    #[test]
    fn display_in_instance_notation() {
        let module = Module::parse(
            FileId::try_from(1).unwrap(),
            "module M {
                expr = Const(int i) | Binary(string op, expr left, expr right) | Nil
                color = Red | Green
            }",
        )
        .unwrap();
        let lookup = elaboration::elaborate(&module, &[]).unwrap();
        let (expr, _) = lookup.by_constructor("expr", "Const").unwrap();
        let (color, _) = lookup.by_constructor("color", "Green").unwrap();

        let spids = || Value::Array(Vec::new());
        let constant = |i| Value::Record {
            decl: expr,
            variant: Some(1),
            fields: vec![Value::Int(i), spids()],
        };
        let value = Value::Record {
            decl: expr,
            variant: Some(2),
            fields: vec![
                Value::Str("+\"".to_owned()),
                constant(1),
                Value::Record {
                    decl: expr,
                    variant: Some(3),
                    fields: Vec::new(),
                },
                Value::Array(vec![Value::Int(7)]),
            ],
        };

        assert_eq!(
            value.display(&lookup).to_string(),
            r#"Binary(op = "+\"", left = Const(i = 1), right = Nil, spids = [7])"#,
        );
        assert_eq!(
            Value::Enum { decl: color, tag: 2 }.display(&lookup).to_string(),
            "Green",
        );
    }
}
