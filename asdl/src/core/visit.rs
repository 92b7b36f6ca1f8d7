//! Traversal of resolved schemas, shared by the code generators.

use crate::core::{Decl, DeclKind, ProductType, SumType, TypeLookup, Variant};

/// Hooks called by [`walk_module`] for each declaration. Every hook does
/// nothing by default, so backends only override what they emit.
pub trait Visitor {
    /// A sum whose constructors carry no fields.
    fn visit_simple_sum(&mut self, decl: &Decl, sum: &SumType) {
        let _ = (decl, sum);
    }

    /// A sum with at least one constructor carrying fields. Visits each
    /// constructor by default.
    fn visit_compound_sum(&mut self, decl: &Decl, sum: &SumType) {
        walk_constructors(self, decl, sum);
    }

    fn visit_constructor(&mut self, decl: &Decl, variant: &Variant) {
        let _ = (decl, variant);
    }

    fn visit_product(&mut self, decl: &Decl, product: &ProductType) {
        let _ = (decl, product);
    }

    /// Called once after every declaration has been visited.
    fn emit_footer(&mut self) {}
}

/// Visit the declarations of a schema in order.
pub fn walk_module<V: Visitor + ?Sized>(visitor: &mut V, lookup: &TypeLookup) {
    for (_, decl) in lookup.decls() {
        match &decl.kind {
            DeclKind::Sum(sum) if sum.is_simple => visitor.visit_simple_sum(decl, sum),
            DeclKind::Sum(sum) => visitor.visit_compound_sum(decl, sum),
            DeclKind::Product(product) => visitor.visit_product(decl, product),
        }
    }
    visitor.emit_footer();
}

pub fn walk_constructors<V: Visitor + ?Sized>(visitor: &mut V, decl: &Decl, sum: &SumType) {
    for variant in &sum.variants {
        visitor.visit_constructor(decl, variant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileId;
    use crate::surface::{elaboration, Module};

    #[derive(Default)]
    struct Trace(Vec<String>);

    impl Visitor for Trace {
        fn visit_simple_sum(&mut self, decl: &Decl, _: &SumType) {
            self.0.push(format!("simple {}", decl.name));
        }

        fn visit_constructor(&mut self, decl: &Decl, variant: &Variant) {
            self.0.push(format!("constructor {}.{}", decl.name, variant.name));
        }

        fn visit_product(&mut self, decl: &Decl, _: &ProductType) {
            self.0.push(format!("product {}", decl.name));
        }

        fn emit_footer(&mut self) {
            self.0.push("footer".to_owned());
        }
    }

    #[test]
    fn walk_in_declaration_order() {
        let module = Module::parse(
            FileId::try_from(1).unwrap(),
            "module M { op = Add | Sub  expr = Num(int n) | Neg  pos = (int line) }",
        )
        .unwrap();
        let lookup = elaboration::elaborate(&module, &[]).unwrap();

        let mut trace = Trace::default();
        walk_module(&mut trace, &lookup);

        assert_eq!(
            trace.0,
            [
                "simple op",
                "constructor expr.Num",
                "constructor expr.Neg",
                "product pos",
                "footer",
            ],
        );
    }
}
