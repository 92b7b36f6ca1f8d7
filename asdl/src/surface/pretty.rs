//! Canonical printing of schema modules.

use pretty::{Arena, DocAllocator, DocBuilder};

use crate::surface::{Constructor, Field, Module, Quantifier, Type, TypeDecl, Use};

const INDENT: isize = 2;

pub struct Context<'arena> {
    arena: &'arena Arena<'arena>,
}

type Doc<'arena> = DocBuilder<'arena, Arena<'arena>>;

impl<'arena> Context<'arena> {
    pub fn new(arena: &'arena Arena<'arena>) -> Context<'arena> {
        Context { arena }
    }

    pub fn module(&self, module: &Module) -> Doc<'arena> {
        let alloc = self.arena;
        let header = alloc.concat([
            alloc.text("module"),
            alloc.space(),
            alloc.text(module.name.to_string()),
            alloc.space(),
            alloc.text("{"),
        ]);

        if module.uses.is_empty() && module.decls.is_empty() {
            return alloc.concat([header, alloc.text("}")]);
        }

        let items = (module.uses.iter().map(|r#use| self.r#use(r#use)))
            .chain(module.decls.iter().map(|decl| self.type_decl(decl)));
        let separator = alloc.concat([alloc.hardline(), alloc.hardline()]);

        alloc.concat([
            header,
            alloc
                .concat([alloc.hardline(), alloc.intersperse(items, separator)])
                .nest(INDENT),
            alloc.hardline(),
            alloc.text("}"),
        ])
    }

    fn r#use(&self, r#use: &Use) -> Doc<'arena> {
        let alloc = self.arena;
        alloc.concat([
            alloc.text("use"),
            alloc.space(),
            alloc.text(r#use.module_name.to_string()),
            alloc.space(),
            alloc.text("{"),
            alloc.space(),
            alloc.intersperse(
                r#use.type_names.iter().map(|name| alloc.text(name.to_string())),
                alloc.space(),
            ),
            alloc.space(),
            alloc.text("}"),
        ])
    }

    pub fn type_decl(&self, decl: &TypeDecl) -> Doc<'arena> {
        let alloc = self.arena;
        let (body, attributes) = match &decl.r#type {
            Type::Product(product) => (
                alloc.concat([alloc.text("="), alloc.space(), self.fields(&product.fields)]),
                &product.attributes,
            ),
            Type::Sum(sum) => {
                let constructors = sum.constructors.iter().enumerate().map(|(index, cons)| {
                    let separator = if index == 0 { "=" } else { "|" };
                    let doc = alloc.concat([
                        alloc.text(separator),
                        alloc.space(),
                        self.constructor(cons),
                    ]);
                    match index {
                        0 => doc,
                        _ => alloc.concat([alloc.line(), doc]),
                    }
                });
                (alloc.concat(constructors), &sum.attributes)
            }
        };

        let attributes = match attributes.as_slice() {
            [] => alloc.nil(),
            attributes => alloc.concat([
                alloc.line(),
                alloc.text("attributes"),
                alloc.space(),
                self.fields(attributes),
            ]),
        };

        alloc
            .concat([
                alloc.text(decl.name.to_string()),
                alloc.concat([alloc.line(), body, attributes]).nest(INDENT),
            ])
            .group()
    }

    fn constructor(&self, cons: &Constructor) -> Doc<'arena> {
        let alloc = self.arena;
        match cons.fields.as_slice() {
            [] => alloc.text(cons.name.to_string()),
            fields => alloc.concat([alloc.text(cons.name.to_string()), self.fields(fields)]),
        }
    }

    fn fields(&self, fields: &[Field]) -> Doc<'arena> {
        let alloc = self.arena;
        alloc.concat([
            alloc.text("("),
            alloc.intersperse(fields.iter().map(|field| self.field(field)), alloc.text(", ")),
            alloc.text(")"),
        ])
    }

    fn field(&self, field: &Field) -> Doc<'arena> {
        let alloc = self.arena;
        let quantifier = match field.quantifier {
            Quantifier::One => "",
            Quantifier::Seq => "*",
            Quantifier::Opt => "?",
        };
        let name = match &field.name {
            Some(name) => alloc.concat([alloc.space(), alloc.text(name.to_string())]),
            None => alloc.nil(),
        };
        alloc.concat([alloc.text(field.type_name.to_string()), alloc.text(quantifier), name])
    }
}

/// Render a module in canonical form, wrapping sums wider than `width`.
pub fn module_to_string(module: &Module, width: usize) -> String {
    let arena = Arena::new();
    let context = Context::new(&arena);
    let DocBuilder(_, doc) = context.module(module);

    // Blank lines between declarations pick up the nesting indent.
    let mut output = String::new();
    for line in doc.pretty(width).to_string().lines() {
        output.push_str(line.trim_end());
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileId;

    fn parse(source: &str) -> Module {
        Module::parse(FileId::try_from(1).unwrap(), source).unwrap()
    }

    const ARITH: &str = "
        module arith {
          use other { word  command }
          -- operators
          op = Plus | Minus
          expr = Const(int i) | Binary(op, expr left, expr right)
               | Call(string name, expr* args, string? doc)
               attributes (int spid)
          point = (int x, int y) attributes (int line)
        }";

    #[test]
    fn narrow_output() {
        let module = parse("module m { op = Plus | Minus point = (int x, int y) }");
        assert_eq!(
            module_to_string(&module, 80),
            "module m {\n  op = Plus | Minus\n\n  point = (int x, int y)\n}\n",
        );
    }

    #[test]
    fn blank_lines_are_not_indented() {
        let printed = module_to_string(&parse(ARITH), 80);
        assert!(printed.contains("\n\n  op = Plus | Minus\n"), "{printed}");
        assert!(printed.lines().all(|line| line == line.trim_end()), "{printed}");
    }

    #[test]
    fn wide_sums_are_broken_over_lines() {
        let module = parse("module m { op = Plus | Minus | Times | Divide }");
        assert_eq!(
            module_to_string(&module, 12),
            "module m {\n  op\n    = Plus\n    | Minus\n    | Times\n    | Divide\n}\n",
        );
    }

    #[test]
    fn empty_module() {
        assert_eq!(module_to_string(&parse("module m {}"), 80), "module m {}\n");
    }

    #[test]
    fn printing_is_idempotent() {
        for width in [20, 80] {
            let module = parse(ARITH);
            let printed = module_to_string(&module, width);
            let reparsed = parse(&printed);

            assert_eq!(module, reparsed);
            assert_eq!(printed, module_to_string(&reparsed, width));
        }
    }
}
