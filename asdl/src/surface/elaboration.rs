//! Name resolution, turning a [surface module][Module] into a [`TypeLookup`].
//!
//! Types may be mutually recursive, so this happens in two passes. The first
//! allocates a [`Decl`] for every declared type, the second resolves the
//! fields of every product and constructor against the complete namespace.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use std::fmt;

use crate::core::{self, Decl, DeclId, DeclKind, Desc, ProductType, SumType, TypeLookup, Variant};
use crate::files::FileId;
use crate::source::ByteRange;
use crate::surface::{self, Module, Type};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A field refers to a name that is not a type.
    UnknownType {
        range: ByteRange,
        name: String,
        owner: String,
        suggestion: Option<String>,
    },
}

impl ResolveError {
    pub fn range(&self) -> ByteRange {
        match self {
            ResolveError::UnknownType { range, .. } => *range,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<FileId> {
        match self {
            ResolveError::UnknownType {
                range, suggestion, ..
            } => {
                let notes = (suggestion.iter())
                    .map(|name| format!("help: a type with a similar name exists: `{name}`"))
                    .collect();

                Diagnostic::error()
                    .with_message(self.to_string())
                    .with_labels(vec![
                        Label::primary(range.file_id(), *range).with_message("unknown type")
                    ])
                    .with_notes(notes)
            }
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UnknownType { name, owner, .. } => {
                write!(f, "cannot find type `{name}` used in `{owner}`")
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Resolve every field type of a module.
///
/// `app_types` are types supplied by the application, which are opaque to
/// the schema like types imported with `use`.
pub fn elaborate(module: &Module, app_types: &[String]) -> Result<TypeLookup, ResolveError> {
    let mut lookup = TypeLookup::new(module.name.to_string());

    for name in app_types {
        lookup.insert_name(name.clone(), Desc::User(name.clone()));
    }
    for r#use in &module.uses {
        for name in &r#use.type_names {
            lookup.insert_name(name.to_string(), Desc::User(name.to_string()));
        }
    }

    let ids: Vec<DeclId> = (module.decls.iter())
        .map(|decl| lookup.push_decl(declare(decl)))
        .collect();

    for (decl, id) in module.decls.iter().zip(ids) {
        match &decl.r#type {
            Type::Product(product) => {
                let fields =
                    resolve_fields(&lookup, &decl.name, &product.fields, &product.attributes)?;
                if let DeclKind::Product(product) = &mut lookup.decl_mut(id).kind {
                    product.fields = fields;
                }
            }
            Type::Sum(sum) => {
                let mut resolved = Vec::with_capacity(sum.constructors.len());
                for cons in &sum.constructors {
                    resolved.push(resolve_fields(
                        &lookup,
                        &cons.name,
                        &cons.fields,
                        &sum.attributes,
                    )?);
                }
                if let DeclKind::Sum(sum) = &mut lookup.decl_mut(id).kind {
                    for (variant, fields) in sum.variants.iter_mut().zip(resolved) {
                        variant.fields = fields;
                    }
                }
            }
        }
    }

    tracing::debug!(
        module = lookup.module_name(),
        decls = lookup.decls().len(),
        "resolved schema"
    );

    Ok(lookup)
}

/// A declaration with names and tags in place but no fields yet.
fn declare(decl: &surface::TypeDecl) -> Decl {
    let kind = match &decl.r#type {
        Type::Product(_) => DeclKind::Product(ProductType { fields: Vec::new() }),
        Type::Sum(sum) => DeclKind::Sum(SumType {
            is_simple: sum.is_simple(),
            variants: (sum.constructors.iter().zip(1..))
                .map(|(cons, tag)| Variant {
                    name: cons.name.to_string(),
                    tag,
                    fields: Vec::new(),
                })
                .collect(),
        }),
    };

    Decl {
        name: decl.name.to_string(),
        kind,
    }
}

fn resolve_fields(
    lookup: &TypeLookup,
    owner: &str,
    fields: &[surface::Field],
    attributes: &[surface::Field],
) -> Result<Vec<core::Field>, ResolveError> {
    let mut resolved = Vec::with_capacity(fields.len() + attributes.len() + 1);

    for field in fields.iter().chain(attributes) {
        let desc = match lookup.by_field_instance(field) {
            Some(desc) => desc,
            None => return Err(unknown_type(lookup, owner, field)),
        };
        resolved.push(core::Field {
            name: field.label().to_owned(),
            desc,
        });
    }

    if !fields.is_empty() && !resolved.iter().any(|field| field.name == core::SPIDS) {
        resolved.push(core::Field {
            name: core::SPIDS.to_owned(),
            desc: Desc::Array(Box::new(Desc::Int)),
        });
    }

    Ok(resolved)
}

fn unknown_type(lookup: &TypeLookup, owner: &str, field: &surface::Field) -> ResolveError {
    let name = field.type_name.as_str();

    ResolveError::UnknownType {
        range: field.type_name.range,
        name: name.to_owned(),
        owner: owner.to_owned(),
        suggestion: suggest_name(name, lookup.names()),
    }
}

/// The closest candidate to `name`, if any is close enough to be a typo.
fn suggest_name<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let max_distance = std::cmp::max(1, name.len() / 3);

    candidates
        .map(|candidate| (levenshtein::levenshtein(name, candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        // Break ties by name, since lookup order is unspecified
        .min_by(|(d1, c1), (d2, c2)| d1.cmp(d2).then_with(|| c1.cmp(c2)))
        .map(|(_, candidate)| candidate.to_owned())
}
