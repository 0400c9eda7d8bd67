//! Canonical IR serialization.
//!
//! Line-oriented: one `(module …)` header per module, then one line per
//! item with the fixed field order `(item <kind> @<id> (vis …)
//! (effects …) (type …) (body …))`. Two runs over the same program
//! produce byte-identical text.

use crate::parser::ast::PatternConst;
use crate::typechecker::types::Type;

use super::sexpr::Sexpr;
use super::{IrArm, IrExpr, IrItem, IrModule, IrPattern, IrProgram, IrTypeKind};

pub fn render_program(program: &IrProgram) -> String {
    let mut out = String::new();
    for module in &program.modules {
        render_module(module, &mut out);
    }
    out
}

fn render_module(module: &IrModule, out: &mut String) {
    out.push_str(&format!("(module {} {})\n", module.path, module.version));
    for item in &module.items {
        out.push_str(&item_sexpr(item).to_string());
        out.push('\n');
    }
}

fn vis_sexpr(public: bool) -> Sexpr {
    Sexpr::tagged("vis", [Sexpr::atom(if public { "pub" } else { "priv" })])
}

fn directives_sexprs(directives: &[(String, String)]) -> Vec<Sexpr> {
    directives
        .iter()
        .map(|(name, payload)| {
            Sexpr::tagged(
                "ai-directive",
                [Sexpr::atom(name.clone()), Sexpr::string(payload.clone())],
            )
        })
        .collect()
}

pub fn type_sexpr(t: &Type) -> Sexpr {
    match t {
        Type::Int(kind) => Sexpr::atom(kind.name().to_ascii_lowercase()),
        Type::Float(kind) => Sexpr::atom(kind.name().to_ascii_lowercase()),
        Type::Boolean => Sexpr::atom("bool"),
        Type::Character => Sexpr::atom("char"),
        Type::String => Sexpr::atom("str"),
        Type::Unit => Sexpr::atom("unit"),
        Type::Never => Sexpr::atom("never"),
        Type::Named { name, args } => {
            if args.is_empty() {
                Sexpr::atom(name.clone())
            } else {
                let mut list = vec![Sexpr::atom("named"), Sexpr::atom(name.clone())];
                list.extend(args.iter().map(type_sexpr));
                Sexpr::List(list)
            }
        }
        Type::Generic(name) => Sexpr::tagged("generic", [Sexpr::atom(name.clone())]),
        Type::Function {
            params,
            return_value,
            ..
        } => Sexpr::tagged(
            "func",
            [
                Sexpr::list(params.iter().map(type_sexpr)),
                type_sexpr(return_value),
            ],
        ),
        Type::Tuple(elements) => Sexpr::tagged("tuple", elements.iter().map(type_sexpr)),
        Type::Array(element, length) => Sexpr::tagged(
            "array",
            [type_sexpr(element), Sexpr::atom(length.to_string())],
        ),
        Type::Slice(element) => Sexpr::tagged("slice", [type_sexpr(element)]),
        Type::Reference { inner, mutable } => Sexpr::tagged(
            if *mutable { "mut-ref" } else { "ref" },
            [type_sexpr(inner)],
        ),
        Type::DynBehavior(name) => Sexpr::tagged("dyn", [Sexpr::atom(name.clone())]),
        Type::Var(var) => Sexpr::atom(format!("?{}", var.0)),
        Type::Error => Sexpr::atom("{error}"),
    }
}

fn item_sexpr(item: &IrItem) -> Sexpr {
    match item {
        IrItem::Const(item) => {
            let mut list = vec![
                Sexpr::atom("item"),
                Sexpr::atom("const"),
                Sexpr::atom(item.stable_id.clone()),
                Sexpr::atom(item.name.clone()),
                vis_sexpr(item.public),
                Sexpr::tagged("type", [type_sexpr(&item.ty)]),
                Sexpr::tagged("body", [expr_sexpr(&item.value)]),
            ];
            list.extend(directives_sexprs(&item.directives));
            Sexpr::List(list)
        }
        IrItem::Type(item) => {
            let kind = match &item.kind {
                IrTypeKind::Struct(fields) => Sexpr::tagged(
                    "struct",
                    fields.iter().map(|(name, ty)| {
                        Sexpr::tagged("field", [Sexpr::atom(name.clone()), type_sexpr(ty)])
                    }),
                ),
                IrTypeKind::Enum(variants) => Sexpr::tagged(
                    "enum",
                    variants.iter().map(|(name, payload)| {
                        let mut variant = vec![Sexpr::atom("variant"), Sexpr::atom(name.clone())];
                        variant.extend(payload.iter().map(type_sexpr));
                        Sexpr::List(variant)
                    }),
                ),
                IrTypeKind::Alias(target) => Sexpr::tagged("alias", [type_sexpr(target)]),
            };
            let mut list = vec![
                Sexpr::atom("item"),
                Sexpr::atom("type"),
                Sexpr::atom(item.stable_id.clone()),
                Sexpr::atom(item.name.clone()),
                vis_sexpr(item.public),
            ];
            if !item.generics.is_empty() {
                list.push(Sexpr::tagged(
                    "generics",
                    item.generics.iter().map(|g| Sexpr::atom(g.clone())),
                ));
            }
            list.push(kind);
            list.extend(directives_sexprs(&item.directives));
            Sexpr::List(list)
        }
        IrItem::Behavior(item) => {
            let mut list = vec![
                Sexpr::atom("item"),
                Sexpr::atom("behavior"),
                Sexpr::atom(item.stable_id.clone()),
                Sexpr::atom(item.name.clone()),
                vis_sexpr(item.public),
            ];
            if !item.associated_types.is_empty() {
                list.push(Sexpr::tagged(
                    "assoc",
                    item.associated_types.iter().map(|a| Sexpr::atom(a.clone())),
                ));
            }
            list.push(Sexpr::tagged(
                "methods",
                item.methods.iter().map(|(name, params, ret)| {
                    Sexpr::tagged(
                        "method",
                        [
                            Sexpr::atom(name.clone()),
                            Sexpr::list(params.iter().map(type_sexpr)),
                            type_sexpr(ret),
                        ],
                    )
                }),
            ));
            Sexpr::List(list)
        }
        IrItem::Func(item) => {
            // Field order is the serialization contract: type, effects,
            // vis, body.
            let mut list = vec![
                Sexpr::atom("item"),
                Sexpr::atom(if item.is_async { "async-func" } else { "func" }),
                Sexpr::atom(item.stable_id.clone()),
                Sexpr::atom(item.name.clone()),
            ];
            if !item.generics.is_empty() {
                list.push(Sexpr::tagged(
                    "generics",
                    item.generics.iter().map(|g| Sexpr::atom(g.clone())),
                ));
            }
            list.push(Sexpr::tagged(
                "type",
                [
                    Sexpr::list(item.params.iter().map(|(name, ty)| {
                        Sexpr::tagged("param", [Sexpr::atom(name.clone()), type_sexpr(ty)])
                    })),
                    type_sexpr(&item.return_type),
                ],
            ));
            list.push(Sexpr::tagged(
                "effects",
                item.effects
                    .render()
                    .split(' ')
                    .map(|effect| Sexpr::atom(effect))
                    .collect::<Vec<_>>(),
            ));
            list.push(vis_sexpr(item.public));
            list.push(Sexpr::tagged("body", [expr_sexpr(&item.body)]));
            list.extend(directives_sexprs(&item.directives));
            Sexpr::List(list)
        }
    }
}

fn pattern_const_sexpr(value: &PatternConst) -> Sexpr {
    match value {
        PatternConst::Int(v) => Sexpr::atom(v.to_string()),
        PatternConst::Float(v) => Sexpr::atom(format!("{v:?}")),
        PatternConst::Bool(v) => Sexpr::atom(v.to_string()),
        PatternConst::Char(v) => Sexpr::atom(format!("'{}'", v.escape_default())),
        PatternConst::Str(v) => Sexpr::string(v.clone()),
    }
}

fn pattern_sexpr(pattern: &IrPattern) -> Sexpr {
    match pattern {
        IrPattern::Wildcard => Sexpr::atom("_"),
        IrPattern::Const(value) => Sexpr::tagged("const", [pattern_const_sexpr(value)]),
        IrPattern::Binding(name, ty) => {
            Sexpr::tagged("bind", [Sexpr::atom(name.clone()), type_sexpr(ty)])
        }
        IrPattern::Range { lo, hi, inclusive } => Sexpr::tagged(
            if *inclusive { "range-incl" } else { "range" },
            [pattern_const_sexpr(lo), pattern_const_sexpr(hi)],
        ),
        IrPattern::Variant {
            variant,
            tag,
            subs,
            ..
        } => {
            let mut list = vec![
                Sexpr::atom("variant"),
                Sexpr::atom(variant.clone()),
                Sexpr::atom(tag.to_string()),
            ];
            list.extend(subs.iter().map(pattern_sexpr));
            Sexpr::List(list)
        }
        IrPattern::Tuple(subs) => Sexpr::tagged("tuple", subs.iter().map(pattern_sexpr)),
        IrPattern::Struct { name, fields } => {
            let mut list = vec![Sexpr::atom("struct"), Sexpr::atom(name.clone())];
            list.extend(fields.iter().map(|(field, sub)| {
                Sexpr::tagged("field", [Sexpr::atom(field.clone()), pattern_sexpr(sub)])
            }));
            Sexpr::List(list)
        }
        IrPattern::Array { subs, rest } => {
            let mut list = vec![Sexpr::atom("array")];
            list.extend(subs.iter().map(pattern_sexpr));
            if let Some(rest) = rest {
                list.push(Sexpr::tagged("rest", [Sexpr::atom(rest.clone())]));
            }
            Sexpr::List(list)
        }
        IrPattern::Or(subs) => Sexpr::tagged("or", subs.iter().map(pattern_sexpr)),
    }
}

fn drops_sexpr(drops: &[String]) -> Option<Sexpr> {
    if drops.is_empty() {
        None
    } else {
        Some(Sexpr::tagged(
            "drops",
            drops.iter().map(|name| Sexpr::atom(name.clone())),
        ))
    }
}

pub fn expr_sexpr(expr: &IrExpr) -> Sexpr {
    match expr {
        IrExpr::Unit => Sexpr::atom("unit"),
        IrExpr::Int { value, ty } => {
            Sexpr::tagged("int", [Sexpr::atom(value.to_string()), type_sexpr(ty)])
        }
        IrExpr::Float { value, ty } => {
            Sexpr::tagged("float", [Sexpr::atom(format!("{value:?}")), type_sexpr(ty)])
        }
        IrExpr::Bool(value) => Sexpr::tagged("bool", [Sexpr::atom(value.to_string())]),
        IrExpr::Char(value) => {
            Sexpr::tagged("char", [Sexpr::atom(format!("'{}'", value.escape_default()))])
        }
        IrExpr::Str(value) => Sexpr::tagged("str", [Sexpr::string(value.clone())]),
        IrExpr::Local { name, .. } => Sexpr::tagged("local", [Sexpr::atom(name.clone())]),
        IrExpr::Global { name, .. } => Sexpr::tagged("global", [Sexpr::atom(name.clone())]),
        IrExpr::LetBind {
            name,
            mutable,
            ty,
            value,
        } => {
            let mut list = vec![Sexpr::atom("let")];
            if *mutable {
                list.push(Sexpr::atom("mut"));
            }
            list.push(Sexpr::atom(name.clone()));
            list.push(type_sexpr(ty));
            list.push(expr_sexpr(value));
            Sexpr::List(list)
        }
        IrExpr::Assign { target, value } => {
            Sexpr::tagged("assign", [expr_sexpr(target), expr_sexpr(value)])
        }
        IrExpr::Call { callee, args, .. } => {
            let mut list = vec![Sexpr::atom("call"), expr_sexpr(callee)];
            list.extend(args.iter().map(expr_sexpr));
            Sexpr::List(list)
        }
        IrExpr::DynCall {
            receiver,
            behavior,
            method,
            slot,
            args,
            ..
        } => {
            let mut list = vec![
                Sexpr::atom("dyn-call"),
                Sexpr::atom(format!("{behavior}::{method}")),
                Sexpr::atom(slot.to_string()),
                expr_sexpr(receiver),
            ];
            list.extend(args.iter().map(expr_sexpr));
            Sexpr::List(list)
        }
        IrExpr::Binary { op, left, right, .. } => Sexpr::tagged(
            op.ir_name(),
            [expr_sexpr(left), expr_sexpr(right)],
        ),
        IrExpr::Unary { op, operand, .. } => {
            let name = match op {
                crate::parser::ast::UnaryOp::Neg => "neg",
                crate::parser::ast::UnaryOp::Not => "not",
                crate::parser::ast::UnaryOp::BitNot => "bit-not",
            };
            Sexpr::tagged(name, [expr_sexpr(operand)])
        }
        IrExpr::Block { body, drops, .. } => {
            let mut list = vec![Sexpr::atom("block")];
            list.extend(body.iter().map(expr_sexpr));
            list.extend(drops_sexpr(drops));
            Sexpr::List(list)
        }
        IrExpr::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            let mut list = vec![
                Sexpr::atom("if"),
                expr_sexpr(condition),
                expr_sexpr(then_branch),
            ];
            if let Some(else_branch) = else_branch {
                list.push(expr_sexpr(else_branch));
            }
            Sexpr::List(list)
        }
        IrExpr::When {
            scrutinee, arms, ..
        } => {
            let mut list = vec![Sexpr::atom("when"), expr_sexpr(scrutinee)];
            list.extend(arms.iter().map(|IrArm { pattern, value }| {
                Sexpr::tagged("arm", [pattern_sexpr(pattern), expr_sexpr(value)])
            }));
            Sexpr::List(list)
        }
        IrExpr::While { condition, body } => {
            Sexpr::tagged("while", [expr_sexpr(condition), expr_sexpr(body)])
        }
        IrExpr::Loop { body } => Sexpr::tagged("loop", [expr_sexpr(body)]),
        IrExpr::IterNext { source, .. } => Sexpr::tagged("iter-next", [expr_sexpr(source)]),
        IrExpr::Break { drops } => {
            let mut list = vec![Sexpr::atom("break")];
            list.extend(drops_sexpr(drops));
            Sexpr::List(list)
        }
        IrExpr::Continue { drops } => {
            let mut list = vec![Sexpr::atom("continue")];
            list.extend(drops_sexpr(drops));
            Sexpr::List(list)
        }
        IrExpr::Return { value, drops } => {
            let mut list = vec![Sexpr::atom("return")];
            if let Some(value) = value {
                list.push(expr_sexpr(value));
            }
            list.extend(drops_sexpr(drops));
            Sexpr::List(list)
        }
        IrExpr::Borrow {
            target, mutable, ..
        } => Sexpr::tagged(
            if *mutable { "borrow-mut" } else { "borrow" },
            [expr_sexpr(target)],
        ),
        IrExpr::Deref { target, .. } => Sexpr::tagged("deref", [expr_sexpr(target)]),
        IrExpr::Field { receiver, name, .. } => {
            Sexpr::tagged("field", [expr_sexpr(receiver), Sexpr::atom(name.clone())])
        }
        IrExpr::Index {
            receiver, index, ..
        } => Sexpr::tagged("index", [expr_sexpr(receiver), expr_sexpr(index)]),
        IrExpr::TupleNew { elements, .. } => {
            Sexpr::tagged("tuple-new", elements.iter().map(expr_sexpr))
        }
        IrExpr::ArrayNew { elements, .. } => {
            Sexpr::tagged("array-new", elements.iter().map(expr_sexpr))
        }
        IrExpr::ArrayRepeat { value, count, .. } => Sexpr::tagged(
            "array-repeat",
            [expr_sexpr(value), Sexpr::atom(count.to_string())],
        ),
        IrExpr::StructNew { name, fields, .. } => {
            let mut list = vec![Sexpr::atom("struct-new"), Sexpr::atom(name.clone())];
            list.extend(fields.iter().map(|(field, value)| {
                Sexpr::tagged("field", [Sexpr::atom(field.clone()), expr_sexpr(value)])
            }));
            Sexpr::List(list)
        }
        IrExpr::EnumNew {
            variant,
            tag,
            payload,
            ..
        } => {
            let mut list = vec![
                Sexpr::atom("enum-new"),
                Sexpr::atom(variant.clone()),
                Sexpr::atom(tag.to_string()),
            ];
            list.extend(payload.iter().map(expr_sexpr));
            Sexpr::List(list)
        }
        IrExpr::StrConcat { parts } => {
            Sexpr::tagged("str-concat", parts.iter().map(expr_sexpr))
        }
        IrExpr::ToStr { value, from } => {
            Sexpr::tagged("to-str", [expr_sexpr(value), type_sexpr(from)])
        }
        IrExpr::Closure {
            params,
            captures,
            body,
            ..
        } => {
            let mut list = vec![Sexpr::atom("closure")];
            list.push(Sexpr::list(params.iter().map(|(name, ty)| {
                Sexpr::tagged("param", [Sexpr::atom(name.clone()), type_sexpr(ty)])
            })));
            if !captures.is_empty() {
                list.push(Sexpr::tagged(
                    "captures",
                    captures.iter().map(|capture| {
                        let mode = match capture.mode {
                            crate::ownership::state::CaptureMode::Shared => "shared",
                            crate::ownership::state::CaptureMode::Exclusive => "exclusive",
                            crate::ownership::state::CaptureMode::Move => "move",
                        };
                        Sexpr::tagged(mode, [Sexpr::atom(capture.name.clone())])
                    }),
                ));
            }
            list.push(expr_sexpr(body));
            Sexpr::List(list)
        }
        IrExpr::AsDyn {
            value,
            behavior,
            concrete,
            ..
        } => Sexpr::tagged(
            "as-dyn",
            [
                expr_sexpr(value),
                Sexpr::atom(concrete.clone()),
                Sexpr::atom(behavior.clone()),
            ],
        ),
        IrExpr::Await { value, .. } => Sexpr::tagged("await", [expr_sexpr(value)]),
        IrExpr::Propagate { value, .. } => Sexpr::tagged("propagate", [expr_sexpr(value)]),
        IrExpr::Cast { value, to, .. } => {
            Sexpr::tagged("cast", [expr_sexpr(value), type_sexpr(to)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::canonicalize_source;
    use super::*;

    #[test]
    fn test_header_and_item_shape() {
        let (_, program) =
            canonicalize_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        let rendered = render_program(&program);
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("(module main 0.4.1)"));
        let item = lines.next().unwrap();
        assert!(item.starts_with("(item func @"));
        assert!(item.contains("(param a i32)"));
        assert!(item.contains("(effects pure)"));
        assert!(item.contains("(vis priv)"));
        assert!(item.contains("(add (local a) (local b))"));
    }

    #[test]
    fn test_stable_id_format_in_output() {
        let (_, program) = canonicalize_source("func f() { }");
        let rendered = render_program(&program);
        let id_start = rendered.find('@').expect("an ID is printed");
        let id = &rendered[id_start + 1..id_start + 9];
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_canonicalization_is_deterministic() {
        let src = "type Maybe[T] = Just(T) | Nothing;\n\
                   const LIMIT: I32 = 9;\n\
                   func pick(m: Maybe[I32]) -> I32 { when m { Just(x) -> x, Nothing -> LIMIT } }\n\
                   func tally(n: I32) -> I32 { let mut total = 0; for i in 0 to n { total += i; } return total }";
        let (_, first) = canonicalize_source(src);
        let (_, second) = canonicalize_source(src);
        assert_eq!(render_program(&first), render_program(&second));
    }

    #[test]
    fn test_ai_directive_survives_to_ir() {
        let (_, program) = canonicalize_source(
            "// @ai: intent \"fast path\"\nfunc f() { }",
        );
        let rendered = render_program(&program);
        assert!(rendered.contains("(ai-directive intent \"fast path\")"));
    }
}
