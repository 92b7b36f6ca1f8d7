//! Resolved schemas.
//!
//! A [`TypeLookup`] is produced from a [surface module][crate::surface::Module]
//! by [elaboration][crate::surface::elaboration] and is read-only from then
//! on. Declared types live in an arena and refer to each other through
//! [`DeclId`]s, so recursive and mutually recursive types need no cycles of
//! ownership.

use fxhash::FxHashMap;
use std::fmt;

use crate::surface;

pub mod binary;
pub mod value;
pub mod visit;

/// Types available in every schema.
pub const BUILTIN_TYPES: &[(&str, Desc)] = &[
    ("string", Desc::Str),
    ("int", Desc::Int),
    ("bool", Desc::Bool),
];

/// The name of the synthetic source-position field.
pub const SPIDS: &str = "spids";

/// Stable key of a declared type in a [`TypeLookup`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeclId(u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Type descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desc {
    Str,
    Int,
    Bool,
    /// `T*`
    Array(Box<Desc>),
    /// `T?`
    Maybe(Box<Desc>),
    /// A type defined outside of the schema, either supplied by the
    /// application or imported with `use`.
    User(String),
    Sum(DeclId),
    Product(DeclId),
}

impl Desc {
    /// The descriptor of a field, wrapped according to its quantifier.
    pub fn with_quantifier(self, quantifier: surface::Quantifier) -> Desc {
        match quantifier {
            surface::Quantifier::One => self,
            surface::Quantifier::Seq => Desc::Array(Box::new(self)),
            surface::Quantifier::Opt => Desc::Maybe(Box::new(self)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub kind: DeclKind,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    Sum(SumType),
    Product(ProductType),
}

impl Decl {
    /// Whether this is a sum with no fields in any constructor, ie. an enum.
    pub fn is_simple_sum(&self) -> bool {
        matches!(&self.kind, DeclKind::Sum(sum) if sum.is_simple)
    }
}

#[derive(Debug, Clone)]
pub struct SumType {
    pub is_simple: bool,
    pub variants: Vec<Variant>,
}

impl SumType {
    /// Look up a variant by its 1-based tag.
    pub fn variant(&self, tag: u32) -> Option<&Variant> {
        let index = usize::try_from(tag).ok()?.checked_sub(1)?;
        self.variants.get(index)
    }

    pub fn variant_by_name(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.name == name)
    }
}

/// A constructor of a sum type.
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: String,
    /// Dense and 1-based, in declaration order.
    pub tag: u32,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub struct ProductType {
    pub fields: Vec<Field>,
}

/// A resolved field. Attributes and the synthetic `spids` field follow the
/// declared fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub desc: Desc,
}

/// The resolved schema: every name a field may refer to, and the declared
/// types they describe.
#[derive(Debug, Clone)]
pub struct TypeLookup {
    module_name: String,
    decls: Vec<Decl>,
    names: FxHashMap<String, Desc>,
    constructors: FxHashMap<(String, String), (DeclId, u32)>,
}

impl TypeLookup {
    /// A lookup containing only the builtin types.
    pub fn new(module_name: String) -> TypeLookup {
        let names = BUILTIN_TYPES
            .iter()
            .map(|(name, desc)| (name.to_string(), desc.clone()))
            .collect();

        TypeLookup {
            module_name,
            decls: Vec::new(),
            names,
            constructors: FxHashMap::default(),
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Bind a name to a descriptor, replacing any previous binding.
    pub(crate) fn insert_name(&mut self, name: String, desc: Desc) {
        self.names.insert(name, desc);
    }

    /// Allocate a declaration in the arena. Field lists may be filled in
    /// later with [`TypeLookup::decl_mut`].
    pub(crate) fn push_decl(&mut self, decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);

        let desc = match &decl.kind {
            DeclKind::Sum(sum) => {
                for variant in &sum.variants {
                    let key = (decl.name.clone(), variant.name.clone());
                    self.constructors.insert(key, (id, variant.tag));
                }
                Desc::Sum(id)
            }
            DeclKind::Product(_) => Desc::Product(id),
        };
        self.names.insert(decl.name.clone(), desc);
        self.decls.push(decl);

        id
    }

    pub(crate) fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    /// Declared types, in declaration order.
    pub fn decls(&self) -> impl ExactSizeIterator<Item = (DeclId, &Decl)> {
        (self.decls.iter().enumerate()).map(|(index, decl)| (DeclId(index as u32), decl))
    }

    pub fn by_type_name(&self, name: &str) -> Option<&Desc> {
        self.names.get(name)
    }

    /// The descriptor of a field as declared in the source.
    pub fn by_field_instance(&self, field: &surface::Field) -> Option<Desc> {
        let desc = self.by_type_name(field.type_name.as_str())?;
        Some(desc.clone().with_quantifier(field.quantifier))
    }

    pub fn by_constructor(&self, sum_name: &str, cons_name: &str) -> Option<(DeclId, &Variant)> {
        let key = (sum_name.to_owned(), cons_name.to_owned());
        let (id, tag) = *self.constructors.get(&key)?;
        match &self.decl(id).kind {
            DeclKind::Sum(sum) => Some((id, sum.variant(tag)?)),
            DeclKind::Product(_) => None,
        }
    }

    /// Iterate over the names bound in the lookup. The order is unspecified.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Display a descriptor the way it would be written in a schema.
    pub fn display_desc<'a>(&'a self, desc: &'a Desc) -> DisplayDesc<'a> {
        DisplayDesc { lookup: self, desc }
    }
}

pub struct DisplayDesc<'a> {
    lookup: &'a TypeLookup,
    desc: &'a Desc,
}

impl<'a> fmt::Display for DisplayDesc<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.desc {
            Desc::Str => write!(f, "string"),
            Desc::Int => write!(f, "int"),
            Desc::Bool => write!(f, "bool"),
            Desc::Array(elem) => write!(f, "{}*", self.lookup.display_desc(elem)),
            Desc::Maybe(elem) => write!(f, "{}?", self.lookup.display_desc(elem)),
            Desc::User(name) => write!(f, "{name}"),
            Desc::Sum(id) | Desc::Product(id) => write!(f, "{}", self.lookup.decl(*id).name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_lookup() -> TypeLookup {
        let mut lookup = TypeLookup::new("m".to_owned());
        let variants = ["Red", "Green", "Blue"].iter().zip(1..);
        lookup.push_decl(Decl {
            name: "color".to_owned(),
            kind: DeclKind::Sum(SumType {
                is_simple: true,
                variants: (variants)
                    .map(|(name, tag)| Variant {
                        name: name.to_string(),
                        tag,
                        fields: Vec::new(),
                    })
                    .collect(),
            }),
        });
        lookup
    }

    #[test]
    fn builtins_are_bound() {
        let lookup = TypeLookup::new("m".to_owned());
        assert_eq!(lookup.by_type_name("string"), Some(&Desc::Str));
        assert_eq!(lookup.by_type_name("int"), Some(&Desc::Int));
        assert_eq!(lookup.by_type_name("bool"), Some(&Desc::Bool));
        assert_eq!(lookup.by_type_name("float"), None);
    }

    #[test]
    fn variants_by_tag() {
        let lookup = color_lookup();
        let (id, green) = lookup.by_constructor("color", "Green").unwrap();
        assert_eq!(green.tag, 2);
        assert!(lookup.decl(id).is_simple_sum());

        match &lookup.decl(id).kind {
            DeclKind::Sum(sum) => {
                assert_eq!(sum.variant(1).unwrap().name, "Red");
                assert!(sum.variant(0).is_none());
                assert!(sum.variant(4).is_none());
            }
            DeclKind::Product(_) => panic!("expected a sum"),
        }
    }

    #[test]
    fn display_nested_desc() {
        let lookup = color_lookup();
        let desc = Desc::Maybe(Box::new(Desc::Array(Box::new(Desc::Sum(DeclId(0))))));
        assert_eq!(lookup.display_desc(&desc).to_string(), "color*?");
    }
}
