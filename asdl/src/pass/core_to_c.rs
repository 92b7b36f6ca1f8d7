//! Preprocessor constants for the tags of simple sums, for C code that can't
//! use the C++ enums.

use crate::core::visit::{self, Visitor};
use crate::core::{Decl, SumType, TypeLookup};
use crate::pass::Emitter;

pub fn from_lookup(lookup: &TypeLookup) -> String {
    let mut context = Context {
        emitter: Emitter::new(0),
    };
    emit!(context.emitter, "// Generated from the `{}` schema. Do not edit.", lookup.module_name());
    emit!(context.emitter);

    visit::walk_module(&mut context, lookup);
    context.emitter.finish()
}

struct Context {
    emitter: Emitter,
}

impl Visitor for Context {
    fn visit_simple_sum(&mut self, decl: &Decl, sum: &SumType) {
        // C enums aren't namespaced
        for variant in &sum.variants {
            emit!(self.emitter, "#define {}__{} {}", decl.name, variant.name, variant.tag);
        }
        emit!(self.emitter);
    }

    // Compound sums and products have no C rendering
    fn visit_compound_sum(&mut self, _: &Decl, _: &SumType) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileId;
    use crate::pass::{core_to_cpp, core_to_python};
    use crate::surface::{elaboration, Module};

    fn lookup(source: &str) -> TypeLookup {
        let module = Module::parse(FileId::try_from(1).unwrap(), source).unwrap();
        elaboration::elaborate(&module, &[]).unwrap()
    }

    #[test]
    fn simple_sum_defines() {
        let lookup = lookup("module M { color = Red | Green  expr = Num(int n) | Nil }");

        assert_eq!(
            from_lookup(&lookup),
            "// Generated from the `M` schema. Do not edit.\n\
             \n\
             #define color__Red 1\n\
             #define color__Green 2\n\
             \n",
        );
    }

    #[test]
    fn backends_agree_on_numbering() {
        let lookup = lookup("module M { color = Red | Green | Blue }");

        let python = core_to_python::from_lookup(&lookup);
        let cpp = core_to_cpp::from_lookup(&lookup, "M.asdl.h");
        let c = from_lookup(&lookup);

        for (name, tag) in [("Red", 1), ("Green", 2), ("Blue", 3)] {
            assert!(python.contains(&format!("{name} = color_t({tag}, '{name}')")));
            assert!(cpp.header.contains(&format!("{name} = {tag}")));
            assert!(c.contains(&format!("#define color__{name} {tag}")));
        }
        assert!(cpp.header.contains("enum class color_e {Red = 1, Green = 2, Blue = 3};"));
    }

    #[test]
    fn backends_agree_on_simplicity() {
        let lookup = lookup("module M { color = Red | Blue  expr = Num(int n) | Nil }");

        let python = core_to_python::from_lookup(&lookup);
        let cpp = core_to_cpp::from_lookup(&lookup, "M.asdl.h");

        assert!(python.contains("class color_t(pybase.SimpleObj):"));
        assert!(python.contains("class expr_t(pybase.CompoundObj):"));
        assert!(cpp.header.contains("typedef color_e color_t;"));
        assert!(cpp.header.contains("class expr_t;"));
        assert!(!from_lookup(&lookup).contains("expr"));
    }
}
