//! Dynamic Python classes for a schema.
//!
//! Simple sums become a `X_t` class with one singleton per variant in the
//! `X_e` namespace. Compound sums become a tag enumeration `X_e`, an abstract
//! base `X_t`, one `X__Ctor` subclass per constructor and a namespace `X`
//! aliasing the subclasses. Products become a single class.

use itertools::Itertools;

use crate::core::visit::{self, Visitor};
use std::borrow::Cow;

use crate::core::{Decl, Desc, Field, ProductType, SumType, TypeLookup, Variant, SPIDS};
use crate::pass::Emitter;

const INDENT_WIDTH: usize = 2;

pub fn from_lookup(lookup: &TypeLookup) -> String {
    let mut context = Context {
        lookup,
        emitter: Emitter::new(INDENT_WIDTH),
    };

    emit!(
        context.emitter,
        "\"\"\"Generated from the `{}` schema. Do not edit.\"\"\"",
        lookup.module_name(),
    );
    emit!(context.emitter, "from __future__ import print_function");
    emit!(context.emitter);
    emit!(context.emitter, "from asdl import meta");
    emit!(context.emitter, "from asdl import pybase");
    emit!(context.emitter, "from asdl.pybase import PrettyArray, PrettyLeaf, PrettyNode");
    emit!(context.emitter);
    emit!(context.emitter, "from typing import List, Optional");
    emit!(context.emitter);

    visit::walk_module(&mut context, lookup);
    context.emitter.finish()
}

struct Context<'a> {
    lookup: &'a TypeLookup,
    emitter: Emitter,
}

impl<'a> Context<'a> {
    /// The MyPy type of a field, before making it optional.
    fn mypy_type(&self, desc: &Desc) -> String {
        match desc {
            Desc::Str => "str".to_owned(),
            Desc::Int => "int".to_owned(),
            Desc::Bool => "bool".to_owned(),
            Desc::Array(elem) => format!("List[{}]", self.mypy_type(elem)),
            Desc::Maybe(elem) => self.mypy_type(elem),
            Desc::User(name) => name.clone(),
            Desc::Sum(id) => format!("{}_t", self.lookup.decl(*id).name),
            Desc::Product(id) => py_name(&self.lookup.decl(*id).name).into_owned(),
        }
    }

    /// The runtime descriptor of a field.
    fn meta_type(&self, desc: &Desc) -> String {
        match desc {
            Desc::Str => "meta.StrType()".to_owned(),
            Desc::Int => "meta.IntType()".to_owned(),
            Desc::Bool => "meta.BoolType()".to_owned(),
            Desc::Array(elem) => format!("meta.ArrayType({})", self.meta_type(elem)),
            Desc::Maybe(elem) => format!("meta.MaybeType({})", self.meta_type(elem)),
            Desc::User(name) => format!("meta.UserType({})", py_str(name)),
            Desc::Sum(id) => {
                let decl = self.lookup.decl(*id);
                format!("meta.SumType({}, {})", py_str(&decl.name), py_bool(decl.is_simple_sum()))
            }
            Desc::Product(id) => {
                format!("meta.CompoundType({})", py_str(&self.lookup.decl(*id).name))
            }
        }
    }

    /// Class with slots, field descriptors, a constructor and pretty tree
    /// builders, for products and constructors of compound sums.
    fn emit_class(
        &mut self,
        class_name: &str,
        node_name: &str,
        super_name: &str,
        tag: Option<u32>,
        fields: &[Field],
    ) {
        emit!(self.emitter, "class {class_name}({super_name}):");
        self.emitter.indent();

        if let Some(tag) = tag {
            emit!(self.emitter, "tag = {tag}");
        }
        let slots = fields.iter().map(|field| py_str(&py_name(&field.name)));
        emit!(self.emitter, "__slots__ = {}", py_tuple(slots));
        emit!(self.emitter);

        if fields.is_empty() {
            emit!(self.emitter, "FIELD_TYPES = {{}}");
        } else {
            emit!(self.emitter, "FIELD_TYPES = {{");
            self.emitter.indent();
            for field in fields {
                let name = py_name(&field.name);
                emit!(self.emitter, "{}: {},", py_str(&name), self.meta_type(&field.desc));
            }
            self.emitter.dedent();
            emit!(self.emitter, "}}");
        }
        emit!(self.emitter);

        let params = (fields.iter())
            .map(|field| format!(", {}=None", py_name(&field.name)))
            .join("");
        emit!(self.emitter, "def __init__(self{params}):");
        self.emitter.indent();

        let arg_types = (fields.iter())
            .map(|field| format!("Optional[{}]", self.mypy_type(&field.desc)))
            .join(", ");
        emit!(self.emitter, "# type: ({arg_types}) -> None");

        if fields.is_empty() {
            emit!(self.emitter, "pass");
        }
        for field in fields {
            let name = py_name(&field.name);
            match &field.desc {
                Desc::Maybe(elem) if **elem == Desc::Int => emit!(
                    self.emitter,
                    "self.{name} = {name} if {name} is not None else pybase.NO_INTEGER",
                ),
                Desc::Array(_) => {
                    emit!(self.emitter, "self.{name} = {name} if {name} is not None else []")
                }
                _ => emit!(self.emitter, "self.{name} = {name}"),
            }
        }
        self.emitter.dedent();
        emit!(self.emitter);

        self.emit_tree_method("PrettyTree", node_name, fields, false);
        self.emit_tree_method("_AbbreviatedTree", node_name, fields, true);

        emit!(self.emitter, "def AbbreviatedTree(self):");
        self.emitter.indent();
        emit!(self.emitter, "# type: () -> PrettyNode");
        emit!(self.emitter, "return self._AbbreviatedTree()");
        self.emitter.dedent();

        self.emitter.dedent();
        emit!(self.emitter);
    }

    /// A method building a `PrettyNode` from the fields of an object.
    /// Abbreviated trees leave out `spids`.
    fn emit_tree_method(
        &mut self,
        method_name: &str,
        node_name: &str,
        fields: &[Field],
        abbreviated: bool,
    ) {
        let child_method = match abbreviated {
            true => "AbbreviatedTree",
            false => "PrettyTree",
        };

        emit!(self.emitter, "def {method_name}(self):");
        self.emitter.indent();
        emit!(self.emitter, "# type: () -> PrettyNode");
        emit!(self.emitter, "out_node = PrettyNode({})", py_str(node_name));
        emit!(self.emitter, "L = out_node.fields");
        emit!(self.emitter);

        for (index, field) in fields.iter().enumerate() {
            if abbreviated && field.name == SPIDS {
                continue;
            }
            self.emit_tree_field(child_method, field, index);
            emit!(self.emitter);
        }

        emit!(self.emitter, "return out_node");
        self.emitter.dedent();
        emit!(self.emitter);
    }

    fn emit_tree_field(&mut self, child_method: &str, field: &Field, index: usize) {
        let label = py_str(&field.name);
        let attr = format!("self.{}", py_name(&field.name));
        let out = format!("x{index}");

        match &field.desc {
            Desc::Array(elem) => {
                let iter = format!("i{index}");
                let (child, _) = self.tree_snippet(child_method, &iter, elem);
                emit!(self.emitter, "if {attr}:  # ArrayType");
                self.emitter.indent();
                emit!(self.emitter, "{out} = PrettyArray()");
                emit!(self.emitter, "for {iter} in {attr}:");
                self.emitter.indent();
                emit!(self.emitter, "{out}.children.append({child})");
                self.emitter.dedent();
                emit!(self.emitter, "L.append(({label}, {out}))");
                self.emitter.dedent();
            }
            Desc::Maybe(elem) => {
                let (child, _) = self.tree_snippet(child_method, &attr, elem);
                emit!(self.emitter, "if {attr} is not None:  # MaybeType");
                self.emitter.indent();
                emit!(self.emitter, "{out} = {child}");
                emit!(self.emitter, "L.append(({label}, {out}))");
                self.emitter.dedent();
            }
            desc => {
                let (child, none_guard) = self.tree_snippet(child_method, &attr, desc);
                if none_guard {
                    emit!(self.emitter, "assert {attr} is not None");
                }
                emit!(self.emitter, "{out} = {child}");
                emit!(self.emitter, "L.append(({label}, {out}))");
            }
        }
    }

    /// An expression converting `var` to a pretty tree, and whether `var`
    /// must be checked against `None` first.
    fn tree_snippet(&self, child_method: &str, var: &str, desc: &Desc) -> (String, bool) {
        let leaf = |value: String, color: &str| {
            (format!("PrettyLeaf({value}, pybase.{color})"), false)
        };

        match desc {
            Desc::Bool => leaf(format!("'T' if {var} else 'F'"), "Color_OtherConst"),
            Desc::Int => leaf(format!("str({var})"), "Color_OtherConst"),
            Desc::Str => leaf(var.to_owned(), "Color_StringConst"),
            Desc::User(_) => leaf(format!("repr({var})"), "Color_UserType"),
            Desc::Sum(id) if self.lookup.decl(*id).is_simple_sum() => {
                (format!("PrettyLeaf({var}.name, pybase.Color_TypeName)"), true)
            }
            Desc::Sum(_) | Desc::Product(_) => (format!("{var}.{child_method}()"), true),
            // Quantifiers do not nest
            Desc::Array(_) | Desc::Maybe(_) => leaf(format!("repr({var})"), "Color_OtherConst"),
        }
    }
}

impl<'a> Visitor for Context<'a> {
    fn visit_simple_sum(&mut self, decl: &Decl, sum: &SumType) {
        let name = &decl.name;

        emit!(self.emitter, "class {name}_t(pybase.SimpleObj):");
        self.emitter.indent();
        emit!(self.emitter, "pass");
        self.emitter.dedent();
        emit!(self.emitter);

        emit!(self.emitter, "class {name}_e(object):");
        self.emitter.indent();
        for variant in &sum.variants {
            emit!(
                self.emitter,
                "{} = {name}_t({}, {})",
                variant.name,
                variant.tag,
                py_str(&variant.name),
            );
        }
        self.emitter.dedent();
        emit!(self.emitter);
    }

    fn visit_compound_sum(&mut self, decl: &Decl, sum: &SumType) {
        let name = &decl.name;

        emit!(self.emitter, "class {name}_e(object):");
        self.emitter.indent();
        for variant in &sum.variants {
            emit!(self.emitter, "{} = {}", variant.name, variant.tag);
        }
        self.emitter.dedent();
        emit!(self.emitter);

        emit!(self.emitter, "class {name}_t(pybase.CompoundObj):");
        self.emitter.indent();
        emit!(self.emitter, "pass");
        self.emitter.dedent();
        emit!(self.emitter);

        visit::walk_constructors(self, decl, sum);

        // Namespace, so constructors can be written as `expr.Const(...)`
        emit!(self.emitter, "class {}(object):", py_name(name));
        self.emitter.indent();
        for variant in &sum.variants {
            emit!(self.emitter, "{} = {name}__{}", variant.name, variant.name);
        }
        self.emitter.dedent();
        emit!(self.emitter);
    }

    fn visit_constructor(&mut self, decl: &Decl, variant: &Variant) {
        let class_name = format!("{}__{}", decl.name, variant.name);
        let node_name = format!("{}.{}", decl.name, variant.name);
        let super_name = format!("{}_t", decl.name);
        self.emit_class(&class_name, &node_name, &super_name, Some(variant.tag), &variant.fields);
    }

    fn visit_product(&mut self, decl: &Decl, product: &ProductType) {
        let class_name = py_name(&decl.name);
        self.emit_class(&class_name, &decl.name, "pybase.CompoundObj", None, &product.fields);
    }
}

/// Words that cannot name an attribute or a parameter of `__init__`. The
/// `tag` class attribute of constructors would conflict with a slot.
const RESERVED_NAMES: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "exec", "finally", "for", "from",
    "global", "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "print",
    "raise", "return", "self", "tag", "try", "while", "with", "yield",
];

/// The Python name of a field or of a class without a suffix, with a `_`
/// suffix on reserved words.
fn py_name(name: &str) -> Cow<'_, str> {
    match RESERVED_NAMES.contains(&name) {
        true => Cow::Owned(format!("{name}_")),
        false => Cow::Borrowed(name),
    }
}

fn py_str(s: &str) -> String {
    format!("'{s}'")
}

fn py_bool(b: bool) -> &'static str {
    match b {
        true => "True",
        false => "False",
    }
}

fn py_tuple(elems: impl Iterator<Item = String>) -> String {
    let elems: Vec<_> = elems.collect();
    match elems.as_slice() {
        [elem] => format!("({elem},)"),
        elems => format!("({})", elems.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileId;
    use crate::surface::{elaboration, Module};

    fn generate(source: &str) -> String {
        let module = Module::parse(FileId::try_from(1).unwrap(), source).unwrap();
        let lookup = elaboration::elaborate(&module, &["id".to_owned()]).unwrap();
        from_lookup(&lookup)
    }

    #[test]
    fn simple_sum_singletons() {
        let output = generate("module M { color = Red | Green | Blue }");

        assert!(output.contains("class color_t(pybase.SimpleObj):\n  pass\n"));
        assert!(output.contains(
            "class color_e(object):\n  \
               Red = color_t(1, 'Red')\n  \
               Green = color_t(2, 'Green')\n  \
               Blue = color_t(3, 'Blue')\n"
        ));
    }

    #[test]
    fn compound_sum_classes() {
        let output = generate("module M { expr = Const(int i) | Nil }");

        assert!(output.contains("class expr_e(object):\n  Const = 1\n  Nil = 2\n"));
        assert!(output.contains("class expr_t(pybase.CompoundObj):\n  pass\n"));
        assert!(output.contains(
            "class expr__Const(expr_t):\n  tag = 1\n  __slots__ = ('i', 'spids')\n"
        ));
        assert!(output.contains("  def __init__(self, i=None, spids=None):\n"));
        assert!(output.contains("    # type: (Optional[int], Optional[List[int]]) -> None\n"));
        assert!(output.contains("    self.spids = spids if spids is not None else []\n"));
        assert!(output.contains(
            "class expr__Nil(expr_t):\n  tag = 2\n  __slots__ = ()\n\n  FIELD_TYPES = {}\n"
        ));
        assert!(output.contains("class expr(object):\n  Const = expr__Const\n  Nil = expr__Nil\n"));
    }

    #[test]
    fn product_field_types_and_defaults() {
        let output =
            generate("module M { color = Red  tok = (id kind, int? line, color c, tok? next) }");

        assert!(output.contains("class tok(pybase.CompoundObj):\n"));
        assert!(output.contains("    'kind': meta.UserType('id'),\n"));
        assert!(output.contains("    'line': meta.MaybeType(meta.IntType()),\n"));
        assert!(output.contains("    'c': meta.SumType('color', True),\n"));
        assert!(output.contains("    'next': meta.MaybeType(meta.CompoundType('tok')),\n"));
        assert!(output.contains(
            "    # type: (Optional[id], Optional[int], Optional[color_t], Optional[tok], \
             Optional[List[int]]) -> None\n"
        ));
        assert!(
            output.contains("    self.line = line if line is not None else pybase.NO_INTEGER\n")
        );
        assert!(output.contains("    self.next = next\n"));
    }

    #[test]
    fn pretty_tree_methods() {
        let output = generate(
            "module M {
                color = Red | Blue
                expr = Num(int n) | Call(string name, expr* args, color? c)
            }",
        );

        assert!(output.contains("from asdl.pybase import PrettyArray, PrettyLeaf, PrettyNode\n"));
        assert!(output.contains(
            "  def PrettyTree(self):\n    \
               # type: () -> PrettyNode\n    \
               out_node = PrettyNode('expr.Call')\n    \
               L = out_node.fields\n\n    \
               x0 = PrettyLeaf(self.name, pybase.Color_StringConst)\n    \
               L.append(('name', x0))\n\n    \
               if self.args:  # ArrayType\n      \
                 x1 = PrettyArray()\n      \
                 for i1 in self.args:\n        \
                   x1.children.append(i1.PrettyTree())\n      \
                 L.append(('args', x1))\n\n    \
               if self.c is not None:  # MaybeType\n      \
                 x2 = PrettyLeaf(self.c.name, pybase.Color_TypeName)\n      \
                 L.append(('c', x2))\n\n"
        ));
        assert!(output.contains(
            "    x3 = PrettyArray()\n      for i3 in self.spids:\n        \
             x3.children.append(PrettyLeaf(str(i3), pybase.Color_OtherConst))\n"
        ));
    }

    #[test]
    fn abbreviated_trees_leave_out_spids() {
        let output = generate("module M { expr = Num(int n) | Neg(expr e) }");
        let abbreviated = output
            .split("  def _AbbreviatedTree(self):\n")
            .nth(2)
            .unwrap();
        let abbreviated = &abbreviated[..abbreviated.find("  def AbbreviatedTree").unwrap()];

        assert!(abbreviated.contains("    out_node = PrettyNode('expr.Neg')\n"));
        assert!(abbreviated
            .contains("    assert self.e is not None\n    x0 = self.e.AbbreviatedTree()\n"));
        assert!(!abbreviated.contains("spids"));
        assert!(output.contains(
            "  def AbbreviatedTree(self):\n    \
               # type: () -> PrettyNode\n    \
               return self._AbbreviatedTree()\n"
        ));
    }

    #[test]
    fn reserved_field_names_are_escaped() {
        let output = generate(
            "module M {
                import = (string from, int tag, int count)
                stmt = Pass | Import(import)
            }",
        );

        assert!(output.contains("class import_(pybase.CompoundObj):\n"));
        assert!(output.contains("  __slots__ = ('from_', 'tag_', 'count', 'spids')\n"));
        assert!(output.contains("    'from_': meta.StrType(),\n"));
        assert!(output
            .contains("  def __init__(self, from_=None, tag_=None, count=None, spids=None):\n"));
        assert!(output.contains("    self.from_ = from_\n"));
        assert!(output.contains(
            "    x0 = PrettyLeaf(self.from_, pybase.Color_StringConst)\n    \
             L.append(('from', x0))\n"
        ));
        assert!(output.contains("out_node = PrettyNode('import')\n"));

        assert!(output.contains("    'import_': meta.CompoundType('import'),\n"));
        assert!(output.contains("    # type: (Optional[import_], Optional[List[int]]) -> None\n"));
        assert!(output.contains("    self.import_ = import_\n"));
    }
}
