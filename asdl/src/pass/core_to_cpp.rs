//! Static C++ declarations for a schema.
//!
//! The header is built in two passes over the declarations, so that class
//! definitions may refer to any type regardless of declaration order:
//!
//! 1. forward declarations of every enum and class
//! 2. the enums and class definitions themselves
//!
//! A third pass writes the source file with the tag-to-name functions, the
//! checked downcasts from sum base classes to their constructors and the
//! `PrettyTree` builders. Pretty trees are made of the `hnode` classes of the
//! runtime header, and fields of application types `x` are printed with an
//! `x_str` function supplied by the application.

use itertools::Itertools;
use std::borrow::Cow;

use crate::core::visit::{self, Visitor};
use crate::core::{Decl, DeclKind, Desc, Field, ProductType, SumType, TypeLookup, Variant, SPIDS};
use crate::pass::Emitter;

const INDENT_WIDTH: usize = 2;

/// The generated header and source files.
#[derive(Debug, Clone)]
pub struct CppOutput {
    pub header: String,
    pub source: String,
}

/// Generate C++ for a schema. `header_name` is the name the source file uses
/// to include the header.
pub fn from_lookup(lookup: &TypeLookup, header_name: &str) -> CppOutput {
    let namespace = format!("{}_asdl", lookup.module_name());
    let guard = format!("{}_ASDL_H", lookup.module_name().to_uppercase());

    let mut header = Emitter::new(INDENT_WIDTH);
    emit!(header, "// Generated from the `{}` schema. Do not edit.", lookup.module_name());
    emit!(header);
    emit!(header, "#ifndef {guard}");
    emit!(header, "#define {guard}");
    emit!(header);
    for include in ["<optional>", "<string>", "<utility>", "<vector>"] {
        emit!(header, "#include {include}");
    }
    emit!(header);
    emit!(header, "#include \"asdl/hnode.h\"");
    emit!(header);
    emit!(header, "namespace {namespace} {{");
    emit!(header);

    let mut forward = ForwardDecls { emitter: header };
    visit::walk_module(&mut forward, lookup);
    let mut classes = ClassDefs {
        lookup,
        emitter: forward.emitter,
    };
    emit!(classes.emitter);
    visit::walk_module(&mut classes, lookup);

    let mut header = classes.emitter;
    emit!(header, "}}  // namespace {namespace}");
    emit!(header);
    emit!(header, "#endif  // {guard}");

    let mut source = Emitter::new(INDENT_WIDTH);
    emit!(source, "// Generated from the `{}` schema. Do not edit.", lookup.module_name());
    emit!(source);
    emit!(source, "#include \"{header_name}\"");
    emit!(source);
    emit!(source, "namespace {namespace} {{");
    emit!(source);
    let mut methods = MethodDefs {
        lookup,
        emitter: source,
    };
    visit::walk_module(&mut methods, lookup);
    let mut source = methods.emitter;
    emit!(source, "}}  // namespace {namespace}");

    CppOutput {
        header: header.finish(),
        source: source.finish(),
    }
}

/// The C++ type of a field.
fn cpp_type(lookup: &TypeLookup, desc: &Desc) -> String {
    match desc {
        Desc::Str => "std::string".to_owned(),
        Desc::Int => "int".to_owned(),
        Desc::Bool => "bool".to_owned(),
        Desc::Array(elem) => format!("std::vector<{}>", cpp_type(lookup, elem)),
        Desc::Maybe(elem) => match is_pointer(lookup, elem) {
            true => cpp_type(lookup, elem),
            false => format!("std::optional<{}>", cpp_type(lookup, elem)),
        },
        Desc::User(name) => format!("{name}_t"),
        Desc::Sum(id) => {
            let decl = lookup.decl(*id);
            match decl.is_simple_sum() {
                true => format!("{}_t", decl.name),
                false => format!("{}_t*", decl.name),
            }
        }
        Desc::Product(id) => format!("{}*", class_name(&lookup.decl(*id).name)),
    }
}

/// Records are held by pointer, so they are nullable without `std::optional`.
fn is_pointer(lookup: &TypeLookup, desc: &Desc) -> bool {
    match desc {
        Desc::Product(_) => true,
        Desc::Sum(id) => !lookup.decl(*id).is_simple_sum(),
        _ => false,
    }
}

const KEYWORDS: &[&str] = &[
    "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "bool", "break",
    "case", "catch", "char", "char16_t", "char32_t", "char8_t", "class", "compl", "concept",
    "const", "const_cast", "consteval", "constexpr", "constinit", "continue", "co_await",
    "co_return", "co_yield", "decltype", "default", "delete", "do", "double", "dynamic_cast",
    "else", "enum", "explicit", "export", "extern", "false", "float", "for", "friend", "goto",
    "if", "inline", "int", "long", "mutable", "namespace", "new", "noexcept", "not", "not_eq",
    "nullptr", "operator", "or", "or_eq", "private", "protected", "public", "register",
    "reinterpret_cast", "requires", "return", "short", "signed", "sizeof", "static",
    "static_assert", "static_cast", "struct", "switch", "template", "this", "thread_local",
    "throw", "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using",
    "virtual", "void", "volatile", "wchar_t", "while", "xor", "xor_eq",
];

/// The class of a product, with a `_` suffix on keywords.
fn class_name(name: &str) -> Cow<'_, str> {
    match KEYWORDS.contains(&name) {
        true => Cow::Owned(format!("{name}_")),
        false => Cow::Borrowed(name),
    }
}

/// The data member of a field. Members may not be keywords, share a name with
/// a product class or hide `tag()`, so they are suffixed with `_` until they
/// are free.
fn member_name(lookup: &TypeLookup, name: &str) -> String {
    let is_product_class = |member: &str| {
        (lookup.decls()).any(|(_, decl)| {
            matches!(decl.kind, DeclKind::Product(_)) && class_name(&decl.name) == member
        })
    };

    let mut member = name.to_owned();
    while member == "tag" || KEYWORDS.contains(&member.as_str()) || is_product_class(&member) {
        member.push('_');
    }
    member
}

struct ForwardDecls {
    emitter: Emitter,
}

impl Visitor for ForwardDecls {
    fn visit_simple_sum(&mut self, decl: &Decl, _: &SumType) {
        emit!(self.emitter, "enum class {}_e;", decl.name);
        emit!(self.emitter, "typedef {0}_e {0}_t;", decl.name);
    }

    fn visit_compound_sum(&mut self, decl: &Decl, _: &SumType) {
        emit!(self.emitter, "class {}_t;", decl.name);
    }

    fn visit_product(&mut self, decl: &Decl, _: &ProductType) {
        emit!(self.emitter, "class {};", class_name(&decl.name));
    }
}

struct ClassDefs<'a> {
    lookup: &'a TypeLookup,
    emitter: Emitter,
}

impl<'a> ClassDefs<'a> {
    /// A class with public fields and a constructor taking each of them.
    /// Subclasses of a sum pass their `(base, tag)` to the base constructor.
    fn emit_fields_class(
        &mut self,
        class_name: &str,
        base: Option<(&str, &str)>,
        fields: &[Field],
    ) {
        match base {
            Some((base, _)) => emit!(self.emitter, "class {class_name} : public {base} {{"),
            None => emit!(self.emitter, "class {class_name} {{"),
        }
        emit!(self.emitter, " public:");
        self.emitter.indent();

        let members: Vec<_> = (fields.iter())
            .map(|field| {
                let field_type = cpp_type(self.lookup, &field.desc);
                (field_type, member_name(self.lookup, &field.name))
            })
            .collect();
        let params = (members.iter())
            .map(|(field_type, member)| format!("{field_type} {member}"))
            .join(", ");
        let explicit = if fields.len() == 1 { "explicit " } else { "" };

        let mut inits = Vec::with_capacity(fields.len() + 1);
        if let Some((base, tag)) = base {
            inits.push(format!("{base}({tag})"));
        }
        inits.extend(members.iter().map(|(_, member)| format!("{member}(std::move({member}))")));

        match inits.is_empty() {
            true => emit!(self.emitter, "{explicit}{class_name}({params}) {{}}"),
            false => {
                emit!(self.emitter, "{explicit}{class_name}({params})");
                emit!(self.emitter, "    : {} {{}}", inits.join(", "));
            }
        }

        emit!(self.emitter);
        match base {
            Some(_) => emit!(self.emitter, "hnode::Node* PrettyTree(bool abbrev) const override;"),
            None => emit!(self.emitter, "hnode::Node* PrettyTree(bool abbrev) const;"),
        }

        if !fields.is_empty() {
            emit!(self.emitter);
        }
        for (field_type, member) in &members {
            emit!(self.emitter, "{field_type} {member};");
        }

        self.emitter.dedent();
        emit!(self.emitter, "}};");
        emit!(self.emitter);
    }
}

impl<'a> Visitor for ClassDefs<'a> {
    fn visit_simple_sum(&mut self, decl: &Decl, sum: &SumType) {
        let variants = (sum.variants.iter())
            .map(|variant| format!("{} = {}", variant.name, variant.tag))
            .join(", ");
        emit!(self.emitter, "enum class {}_e {{{variants}}};", decl.name);
        emit!(self.emitter);
        emit!(self.emitter, "const char* {0}_str({0}_e tag);", decl.name);
        emit!(self.emitter);
    }

    fn visit_compound_sum(&mut self, decl: &Decl, sum: &SumType) {
        let name = &decl.name;

        // Unscoped so that tags convert to the `int` returned by `tag()`
        emit!(self.emitter, "struct {name}_e {{");
        self.emitter.indent();
        let variants = (sum.variants.iter())
            .map(|variant| format!("{} = {}", variant.name, variant.tag))
            .join(", ");
        emit!(self.emitter, "enum no_name {{ {variants} }};");
        self.emitter.dedent();
        emit!(self.emitter, "}};");
        emit!(self.emitter);
        emit!(self.emitter, "const char* {name}_str(int tag);");
        emit!(self.emitter);

        for variant in &sum.variants {
            emit!(self.emitter, "class {name}__{};", variant.name);
        }
        emit!(self.emitter);

        emit!(self.emitter, "class {name}_t {{");
        emit!(self.emitter, " public:");
        self.emitter.indent();
        emit!(self.emitter, "virtual ~{name}_t() {{}}");
        emit!(self.emitter, "int tag() const {{ return tag_; }}");
        emit!(self.emitter);
        for variant in &sum.variants {
            emit!(self.emitter, "{name}__{0}* As{0}();", variant.name);
        }
        emit!(self.emitter);
        emit!(self.emitter, "virtual hnode::Node* PrettyTree(bool abbrev) const = 0;");
        self.emitter.dedent();
        emit!(self.emitter);
        emit!(self.emitter, " protected:");
        self.emitter.indent();
        emit!(self.emitter, "explicit {name}_t(int tag) : tag_(tag) {{}}");
        self.emitter.dedent();
        emit!(self.emitter);
        emit!(self.emitter, " private:");
        self.emitter.indent();
        emit!(self.emitter, "int tag_;");
        self.emitter.dedent();
        emit!(self.emitter, "}};");
        emit!(self.emitter);

        visit::walk_constructors(self, decl, sum);
    }

    fn visit_constructor(&mut self, decl: &Decl, variant: &Variant) {
        let class_name = format!("{}__{}", decl.name, variant.name);
        let base = format!("{}_t", decl.name);
        let tag = format!("{}_e::{}", decl.name, variant.name);
        self.emit_fields_class(&class_name, Some((&base, &tag)), &variant.fields);
    }

    fn visit_product(&mut self, decl: &Decl, product: &ProductType) {
        self.emit_fields_class(&class_name(&decl.name), None, &product.fields);
    }
}

struct MethodDefs<'a> {
    lookup: &'a TypeLookup,
    emitter: Emitter,
}

impl<'a> MethodDefs<'a> {
    fn emit_str_function(&mut self, name: &str, param: &str, cases: &[(String, &str)]) {
        emit!(self.emitter, "const char* {name}_str({param} tag) {{");
        self.emitter.indent();
        emit!(self.emitter, "switch (tag) {{");
        for (case, variant) in cases {
            emit!(self.emitter, "case {case}:");
            self.emitter.indent();
            emit!(self.emitter, "return \"{name}.{variant}\";");
            self.emitter.dedent();
        }
        emit!(self.emitter, "default:");
        self.emitter.indent();
        emit!(self.emitter, "return \"{name}.<invalid>\";");
        self.emitter.dedent();
        emit!(self.emitter, "}}");
        self.emitter.dedent();
        emit!(self.emitter, "}}");
        emit!(self.emitter);
    }

    /// The `PrettyTree` method of a class with fields. Abbreviated trees
    /// leave out `spids`.
    fn emit_pretty_tree(&mut self, class_name: &str, node_name: &str, fields: &[Field]) {
        emit!(self.emitter, "hnode::Node* {class_name}::PrettyTree(bool abbrev) const {{");
        self.emitter.indent();
        emit!(self.emitter, "hnode::Record* out_node = new hnode::Record(\"{node_name}\");");
        emit!(self.emitter);

        for (index, field) in fields.iter().enumerate() {
            self.emit_tree_field(field, index);
        }

        emit!(self.emitter, "return out_node;");
        self.emitter.dedent();
        emit!(self.emitter, "}}");
        emit!(self.emitter);
    }

    fn emit_tree_field(&mut self, field: &Field, index: usize) {
        let label = &field.name;
        let member = format!("this->{}", member_name(self.lookup, &field.name));

        let mut guards = Vec::new();
        if field.name == SPIDS {
            guards.push("!abbrev".to_owned());
        }
        match &field.desc {
            Desc::Array(_) => guards.push(format!("!{member}.empty()")),
            // Both pointers and `std::optional` test as `bool`
            Desc::Maybe(_) => guards.push(member.clone()),
            _ => {}
        }

        if !guards.is_empty() {
            emit!(self.emitter, "if ({}) {{", guards.join(" && "));
            self.emitter.indent();
        }
        match &field.desc {
            Desc::Array(elem) => {
                let out = format!("x{index}");
                emit!(self.emitter, "hnode::Array* {out} = new hnode::Array();");
                emit!(self.emitter, "for (const auto& v : {member}) {{");
                self.emitter.indent();
                emit!(self.emitter, "{out}->children.push_back({});", self.tree_expr("v", elem));
                self.emitter.dedent();
                emit!(self.emitter, "}}");
                emit!(self.emitter, "out_node->fields.emplace_back(\"{label}\", {out});");
            }
            Desc::Maybe(elem) => {
                let value = match is_pointer(self.lookup, elem) {
                    true => member,
                    false => format!("*{member}"),
                };
                let expr = self.tree_expr(&value, elem);
                emit!(self.emitter, "out_node->fields.emplace_back(\"{label}\", {expr});");
            }
            desc => {
                let expr = self.tree_expr(&member, desc);
                emit!(self.emitter, "out_node->fields.emplace_back(\"{label}\", {expr});");
            }
        }
        if !guards.is_empty() {
            self.emitter.dedent();
            emit!(self.emitter, "}}");
        }
        emit!(self.emitter);
    }

    /// An expression converting `var` to a pretty tree.
    fn tree_expr(&self, var: &str, desc: &Desc) -> String {
        match desc {
            Desc::Str | Desc::Int | Desc::Bool => format!("hnode::ToPretty({var})"),
            Desc::User(name) => {
                format!("new hnode::Leaf({name}_str({var}), hnode::Color::UserType)")
            }
            Desc::Sum(id) if self.lookup.decl(*id).is_simple_sum() => {
                let name = &self.lookup.decl(*id).name;
                format!("new hnode::Leaf({name}_str({var}), hnode::Color::TypeName)")
            }
            Desc::Sum(_) | Desc::Product(_) => format!("{var}->PrettyTree(abbrev)"),
            // Quantifiers do not nest
            Desc::Array(_) | Desc::Maybe(_) => format!("hnode::ToPretty({var})"),
        }
    }
}

impl<'a> Visitor for MethodDefs<'a> {
    fn visit_simple_sum(&mut self, decl: &Decl, sum: &SumType) {
        let cases: Vec<_> = (sum.variants.iter())
            .map(|variant| (format!("{}_e::{}", decl.name, variant.name), variant.name.as_str()))
            .collect();
        self.emit_str_function(&decl.name, &format!("{}_e", decl.name), &cases);
    }

    fn visit_compound_sum(&mut self, decl: &Decl, sum: &SumType) {
        let cases: Vec<_> = (sum.variants.iter())
            .map(|variant| (format!("{}_e::{}", decl.name, variant.name), variant.name.as_str()))
            .collect();
        self.emit_str_function(&decl.name, "int", &cases);

        visit::walk_constructors(self, decl, sum);
    }

    fn visit_constructor(&mut self, decl: &Decl, variant: &Variant) {
        let (name, ctor) = (&decl.name, &variant.name);

        emit!(self.emitter, "{name}__{ctor}* {name}_t::As{ctor}() {{");
        self.emitter.indent();
        emit!(self.emitter, "if (tag_ == {name}_e::{ctor}) {{");
        self.emitter.indent();
        emit!(self.emitter, "return static_cast<{name}__{ctor}*>(this);");
        self.emitter.dedent();
        emit!(self.emitter, "}}");
        emit!(self.emitter, "return nullptr;");
        self.emitter.dedent();
        emit!(self.emitter, "}}");
        emit!(self.emitter);

        let class_name = format!("{name}__{ctor}");
        self.emit_pretty_tree(&class_name, &format!("{name}.{ctor}"), &variant.fields);
    }

    fn visit_product(&mut self, decl: &Decl, product: &ProductType) {
        self.emit_pretty_tree(&class_name(&decl.name), &decl.name, &product.fields);
    }
}
