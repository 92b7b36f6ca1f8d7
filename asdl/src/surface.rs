//! Surface language: the meta-AST of an ASDL schema as written in the source.

use crate::files::FileId;
use crate::source::Ranged;

pub mod lexer;
pub mod parser;
pub mod pretty;

pub mod elaboration;
pub mod instance;
pub mod validation;

pub use self::parser::SyntaxError;

/// A schema module: `module name { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: Ranged<String>,
    pub uses: Vec<Use>,
    pub decls: Vec<TypeDecl>,
}

/// Types imported from another schema: `use module { name1 name2 }`.
///
/// Imported types are opaque to this module.
#[derive(Debug, Clone, PartialEq)]
pub struct Use {
    pub module_name: Ranged<String>,
    pub type_names: Vec<Ranged<String>>,
}

/// A named type declaration: `name = type`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: Ranged<String>,
    pub r#type: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Sum(Sum),
    Product(Product),
}

/// A tagged union: `A(...) | B | C(...) attributes (...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sum {
    pub constructors: Vec<Constructor>,
    pub attributes: Vec<Field>,
}

impl Sum {
    /// A sum is simple if none of its constructors have fields, eg.
    /// `op = Plus | Minus`.
    pub fn is_simple(&self) -> bool {
        self.constructors.iter().all(|cons| cons.fields.is_empty())
    }
}

/// One variant of a sum type.
#[derive(Debug, Clone, PartialEq)]
pub struct Constructor {
    pub name: Ranged<String>,
    pub fields: Vec<Field>,
}

/// A record: `(...) attributes (...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub fields: Vec<Field>,
    pub attributes: Vec<Field>,
}

/// A field declaration, eg. `expr* args`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub type_name: Ranged<String>,
    pub name: Option<Ranged<String>>,
    pub quantifier: Quantifier,
}

impl Field {
    /// The name the field is accessed by. Unnamed fields are named after
    /// their type.
    pub fn label(&self) -> &str {
        match &self.name {
            Some(name) => name.as_str(),
            None => self.type_name.as_str(),
        }
    }

    pub fn is_seq(&self) -> bool {
        self.quantifier == Quantifier::Seq
    }

    pub fn is_opt(&self) -> bool {
        self.quantifier == Quantifier::Opt
    }
}

/// Field multiplicity. A field is never both a sequence and optional.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Quantifier {
    One,
    /// `*`
    Seq,
    /// `?`
    Opt,
}

impl Module {
    /// Parse a module from the `source` string.
    pub fn parse(file_id: FileId, source: &str) -> Result<Module, SyntaxError> {
        parser::Parser::new(file_id, source).parse_module()
    }

    /// Look up a type declaration by name.
    pub fn decl(&self, name: &str) -> Option<&TypeDecl> {
        self.decls.iter().find(|decl| decl.name.as_str() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        Module::parse(FileId::try_from(1).unwrap(), source).unwrap()
    }

    #[test]
    fn point_is_product_with_two_int_fields() {
        let module = parse("module M { point = (int x, int y) }");

        assert_eq!(module.name.as_str(), "M");
        assert_eq!(module.decls.len(), 1);
        match &module.decls[0].r#type {
            Type::Product(product) => {
                let labels: Vec<_> = product.fields.iter().map(Field::label).collect();
                assert_eq!(labels, ["x", "y"]);
                for field in &product.fields {
                    assert_eq!(field.type_name.as_str(), "int");
                    assert_eq!(field.quantifier, Quantifier::One);
                }
                assert!(product.attributes.is_empty());
            }
            Type::Sum(_) => panic!("expected a product"),
        }
    }

    #[test]
    fn simple_sums() {
        let module = parse(
            "module M {
                color = Red | Green | Blue
                expr = Const(int i) | Nil
            }",
        );

        let is_simple = |name| match &module.decl(name).unwrap().r#type {
            Type::Sum(sum) => sum.is_simple(),
            Type::Product(_) => panic!("expected a sum"),
        };
        assert!(is_simple("color"));
        assert!(!is_simple("expr"));
    }

    #[test]
    fn unnamed_fields_are_labelled_by_type() {
        let module = parse("module M { pair = (expr, string? s) }");
        match &module.decls[0].r#type {
            Type::Product(product) => {
                assert_eq!(product.fields[0].label(), "expr");
                assert_eq!(product.fields[1].label(), "s");
                assert!(product.fields[1].is_opt());
            }
            Type::Sum(_) => panic!("expected a product"),
        }
    }
}
