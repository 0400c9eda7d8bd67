//! Textual LLVM IR emission.
//!
//! Lowers canonical IR to an LLVM 17 module: target header, named struct
//! types, interned string globals, vtable globals for every
//! `(concrete type, behavior)` impl, one `define` per function (one per
//! monomorphic instance for generics), auxiliary closure/thunk
//! functions, the runtime shim declarations actually used, and the loop
//! metadata nodes. Output is written into a `String`; the driver sends
//! it to a file or keeps it in memory.

pub mod context;
mod func;
pub mod types;

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::ir::{IrFunc, IrItem, IrProgram};
use crate::session::Session;
use crate::typechecker::types::Type;
use crate::typechecker::CheckedProgram;

use self::context::{build_symbol_table, llvm_symbol, ModuleState};
use self::func::{AuxJob, FunctionEmitter};
use self::types::Layout;

const DATA_LAYOUT: &str =
    "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128";

/// Emit the whole program as one LLVM module.
pub fn emit_program(session: &Session, program: &IrProgram, checked: &CheckedProgram) -> String {
    let layout = Layout::new(&checked.ctx.definitions);
    let symbols = build_symbol_table(program);

    let mut funcs: BTreeMap<String, IrFunc> = BTreeMap::new();
    for module in &program.modules {
        for item in &module.items {
            if let IrItem::Func(func) = item {
                funcs.insert(func.symbol.clone(), func.clone());
            }
        }
    }

    // Module constants become LLVM globals; bodies load them by name.
    let mut consts: BTreeMap<String, (String, String)> = BTreeMap::new();
    let mut const_globals = String::new();
    for module in &program.modules {
        for item in &module.items {
            let IrItem::Const(item) = item else {
                continue;
            };
            let symbol = format!("{}::{}", module.path, item.name);
            let lty = layout.llvm_type(&item.ty);
            let initializer = match &item.value {
                crate::ir::IrExpr::Int { value, .. } => value.to_string(),
                crate::ir::IrExpr::Float { value, .. } => format!("{value:e}"),
                crate::ir::IrExpr::Bool(value) => if *value { "1" } else { "0" }.to_string(),
                crate::ir::IrExpr::Char(value) => (*value as u32).to_string(),
                _ => "zeroinitializer".to_string(),
            };
            const_globals.push_str(&format!(
                "{} = internal constant {lty} {initializer}\n",
                llvm_symbol(&symbol)
            ));
            consts
                .entry(item.name.clone())
                .or_insert((symbol.clone(), lty.clone()));
            consts.entry(symbol.clone()).or_insert((symbol, lty));
        }
    }

    let mut state = ModuleState::new();
    let mut jobs: Vec<AuxJob> = vec![];
    let mut defines = String::new();

    for module in &program.modules {
        for item in &module.items {
            let IrItem::Func(func) = item else {
                continue;
            };
            if func.generics.is_empty() {
                let symbol = symbols
                    .get(&func.symbol)
                    .cloned()
                    .unwrap_or_else(|| func.symbol.clone());
                defines.push_str(&emit_one(
                    session, &layout, &mut state, &symbols, &funcs, &consts, &mut jobs, func,
                    &symbol, HashMap::new(),
                ));
                defines.push('\n');
            } else {
                // One define per monomorphic instance; a generic with no
                // instantiations has no object code.
                for instance in checked.mono.instances_of(&func.symbol) {
                    let mut subst = HashMap::new();
                    for (generic, argument) in func.generics.iter().zip(&instance.type_args) {
                        subst.insert(generic.clone(), argument.clone());
                    }
                    defines.push_str(&emit_one(
                        session,
                        &layout,
                        &mut state,
                        &symbols,
                        &funcs,
                        &consts,
                        &mut jobs,
                        func,
                        &instance.mangled,
                        subst,
                    ));
                    defines.push('\n');
                }
            }
        }
    }

    // Closures and thunks synthesized above; these may queue more.
    let mut auxiliary_defines = String::new();
    let mut queue = std::mem::take(&mut jobs);
    while !queue.is_empty() {
        for job in queue.drain(..) {
            match job {
                AuxJob::Closure {
                    symbol,
                    params,
                    captures,
                    body,
                    return_type,
                    subst,
                } => {
                    let emitter = FunctionEmitter::new(
                        session,
                        &layout,
                        &mut state,
                        &symbols,
                        &funcs,
                        &consts,
                        &mut jobs,
                        subst,
                        return_type,
                        false,
                        String::new(),
                        crate::source::Span::default(),
                    );
                    auxiliary_defines.push_str(&emitter.emit(
                        &symbol,
                        &params,
                        &body,
                        true,
                        Some(&captures),
                    ));
                    auxiliary_defines.push('\n');
                }
                AuxJob::Thunk {
                    symbol,
                    target,
                    params,
                    return_type,
                } => {
                    auxiliary_defines.push_str(&emit_thunk(
                        &layout,
                        &symbol,
                        &target,
                        &params,
                        &return_type,
                    ));
                    auxiliary_defines.push('\n');
                }
            }
        }
        queue = std::mem::take(&mut jobs);
    }

    let mut out = String::new();
    out.push_str("; TML compiler output\n");
    out.push_str(&format!("target datalayout = \"{DATA_LAYOUT}\"\n"));
    out.push_str(&format!(
        "target triple = \"{}\"\n\n",
        session.options.target_triple
    ));

    let struct_defs = layout.named_struct_defs();
    if !struct_defs.is_empty() {
        out.push_str(&struct_defs);
        out.push('\n');
    }

    if !const_globals.is_empty() {
        out.push_str(&const_globals);
        out.push('\n');
    }

    let strings = state.render_strings();
    if !strings.is_empty() {
        out.push_str(&strings);
        out.push('\n');
    }

    out.push_str(&emit_vtables(&layout, checked, &symbols));
    out.push_str(&defines);
    out.push_str(&auxiliary_defines);
    out.push_str(&state.render_declarations());

    for line in &state.auxiliary {
        out.push_str(line);
        out.push('\n');
    }

    debug!("emitted LLVM module ({} bytes)", out.len());
    out
}

#[allow(clippy::too_many_arguments)]
fn emit_one(
    session: &Session,
    layout: &Layout,
    state: &mut ModuleState,
    symbols: &BTreeMap<String, String>,
    funcs: &BTreeMap<String, IrFunc>,
    consts: &BTreeMap<String, (String, String)>,
    jobs: &mut Vec<AuxJob>,
    func: &IrFunc,
    symbol: &str,
    subst: HashMap<String, Type>,
) -> String {
    let emitter = FunctionEmitter::new(
        session,
        layout,
        state,
        symbols,
        funcs,
        consts,
        jobs,
        subst,
        func.return_type.clone(),
        func.is_async,
        func.stable_id.clone(),
        func.span,
    );
    emitter.emit(symbol, &func.params, &func.body, false, None)
}

/// One vtable global per `(concrete type, behavior)` impl, slots in
/// alphabetical method order.
fn emit_vtables(
    layout: &Layout,
    checked: &CheckedProgram,
    symbols: &BTreeMap<String, String>,
) -> String {
    let mut out = String::new();
    for ((concrete, behavior), _) in layout.defs.all_impls() {
        let Some(behavior_def) = checked.ctx.definitions.get_behavior(&behavior) else {
            continue;
        };
        let mut method_names: Vec<String> =
            behavior_def.methods.iter().map(|m| m.name.clone()).collect();
        method_names.sort_unstable();

        let slots: Vec<String> = method_names
            .iter()
            .map(|method| {
                let key = format!("{concrete}::{method}");
                match symbols.get(&key) {
                    Some(symbol) => format!("ptr {}", llvm_symbol(symbol)),
                    None => "ptr null".to_string(),
                }
            })
            .collect();
        out.push_str(&format!(
            "@\"vtable.{concrete}.{behavior}\" = internal constant [{} x ptr] [{}]\n",
            slots.len(),
            slots.join(", ")
        ));
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn emit_thunk(
    layout: &Layout,
    symbol: &str,
    target: &str,
    params: &[Type],
    return_type: &Type,
) -> String {
    let ret_lty = layout.llvm_type(return_type);
    let mut sig_params = vec!["ptr %env".to_string()];
    let mut call_args = vec![];
    for (index, ty) in params.iter().enumerate() {
        let lty = layout.llvm_type(ty);
        sig_params.push(format!("{lty} %p{index}"));
        call_args.push(format!("{lty} %p{index}"));
    }

    let call_target = if target.starts_with("tml_") {
        format!("@{target}")
    } else {
        llvm_symbol(target)
    };

    let mut out = format!(
        "define internal {ret_lty} {}({}) {{\nentry:\n",
        llvm_symbol(symbol),
        sig_params.join(", ")
    );
    if ret_lty == "void" {
        out.push_str(&format!("  call void {call_target}({})\n", call_args.join(", ")));
        out.push_str("  ret void\n");
    } else {
        out.push_str(&format!(
            "  %r = call {ret_lty} {call_target}({})\n",
            call_args.join(", ")
        ));
        out.push_str(&format!("  ret {ret_lty} %r\n"));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::test_helpers::check_source;

    fn emit_source(src: &str) -> (Session, String) {
        let (session, checked) = check_source(src);
        assert!(
            !session.has_errors(),
            "errors before emission: {:?}",
            session.diagnostics.entries()
        );
        let ownership = crate::ownership::analyze(&session, &checked);
        let effects = crate::effects::EffectTable::new();
        let program = crate::ir::canonicalize(&session, &checked, &ownership, &effects);
        let text = emit_program(&session, &program, &checked);
        (session, text)
    }

    #[test]
    fn test_integer_function_shape() {
        let (session, text) = emit_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        assert!(!session.has_errors());
        assert!(text.contains("target triple = \"x86_64-unknown-linux-gnu\""));
        assert!(text.contains("define i32 @\"main::add\"(i32 %arg.a, i32 %arg.b)"));
        assert!(text.contains("add nsw i32"));
        assert_eq!(text.matches("ret i32").count(), 1);
    }

    #[test]
    fn test_enum_layout_and_tag_comparison() {
        let (_, text) = emit_source(
            "type Maybe[T] = Just(T) | Nothing;\n\
             func unwrap_or(m: Maybe[I64], d: I64) -> I64 {\n\
                 when m { Just(x) -> x, Nothing -> d }\n\
             }",
        );
        // Payload blob sized by the largest variant (I64 = 8 bytes).
        assert!(text.contains("{ i32, [8 x i8] }"));
        // Source order fixes the tags: Just = 0, Nothing = 1.
        assert!(text.contains("i32 0, label"));
        assert!(text.contains("i32 1, label"));
    }

    #[test]
    fn test_loop_has_canonical_shape() {
        let (_, text) = emit_source(
            "func count(n: I32) -> I32 {\n\
                 let mut total = 0;\n\
                 while total < n { total += 1; }\n\
                 return total\n\
             }",
        );
        assert!(text.contains("wh.preheader"));
        assert!(text.contains("wh.header"));
        assert!(text.contains("wh.body"));
        assert!(text.contains("wh.latch"));
        assert!(text.contains("!llvm.loop !0"));
        assert!(text.contains("!0 = distinct !{!0}"));
    }

    #[test]
    fn test_allocas_hoisted_to_entry() {
        let (_, text) = emit_source(
            "func f(c: Bool) -> I32 { if c { let a = 1; return a } else { let b = 2; return b } }",
        );
        let entry_index = text.find("entry:").unwrap();
        let first_label_after = text[entry_index..]
            .find("if.then")
            .map(|offset| entry_index + offset)
            .unwrap();
        // Every alloca sits between `entry:` and the first branch target.
        let mut last_alloca = 0;
        let mut search_from = 0;
        while let Some(found) = text[search_from..].find("alloca") {
            last_alloca = search_from + found;
            search_from = last_alloca + 1;
        }
        assert!(last_alloca < first_label_after);
    }

    #[test]
    fn test_dyn_dispatch_emits_vtable_and_indirect_call() {
        let (_, text) = emit_source(
            "behavior Reader { func read(this) -> I32; }\n\
             type MemA = { a: I32 };\n\
             type MemB = { b: I32 };\n\
             extend MemA with Reader { func read(this) -> I32 { return 1 } }\n\
             extend MemB with Reader { func read(this) -> I32 { return 2 } }\n\
             func drain(r: dyn Reader) -> I32 { return r.read() }",
        );
        assert!(text.contains("@\"vtable.MemA.Reader\" = internal constant [1 x ptr]"));
        assert!(text.contains("@\"vtable.MemB.Reader\" = internal constant [1 x ptr]"));
        // Fat pointer unpack + indirect call at the use site.
        assert!(text.contains("extractvalue { ptr, ptr }"));
        assert!(text.contains("load ptr, ptr"));
    }

    #[test]
    fn test_dyn_coercion_builds_fat_pointer() {
        let (_, text) = emit_source(
            "behavior Reader { func read(this) -> I32; }\n\
             type Mem = { data: I32 };\n\
             extend Mem with Reader { func read(this) -> I32 { return this.data } }\n\
             func open() -> dyn Reader { let m = Mem { data: 1 }; return m }",
        );
        assert!(text.contains("insertvalue { ptr, ptr } undef, ptr"));
        assert!(text.contains("ptr @\"vtable.Mem.Reader\", 1"));
    }

    #[test]
    fn test_drop_calls_emitted_on_exit() {
        let (_, text) = emit_source("func f() { let s = \"x\"; }");
        assert!(text.contains("call ptr @tml_str_new"));
        assert!(text.contains("call void @tml_str_free"));
        assert!(text.contains("llvm.lifetime.start"));
        assert!(text.contains("llvm.lifetime.end"));
    }

    #[test]
    fn test_monomorphized_instances_emitted() {
        let (_, text) = emit_source(
            "func id[T](value: T) -> T { return value }\n\
             func main() { id(1i64); id(2i32); }",
        );
        assert!(text.contains("@\"main::id$I64\""));
        assert!(text.contains("@\"main::id$I32\""));
    }

    #[test]
    fn test_closure_emits_impl_and_env() {
        let (_, text) = emit_source(
            "func make() -> I64 { let s = \"hi\"; let get = do() s.len(); return get() }",
        );
        assert!(text.contains("define internal i64 @\"lambda.0\"(ptr %env)"));
        // Capturing closure stores its environment pointer.
        assert!(text.contains("insertvalue { ptr, ptr }"));
    }

    #[test]
    fn test_async_function_returns_poll() {
        let (_, text) = emit_source(
            "async func fetch() -> I64 { return 7 }\n\
             async func run() -> I64 { let v = await fetch(); return v }",
        );
        // Poll-wrapped return: { i32 tag, payload } with tag 0 = Ready.
        assert!(text.contains("define { i32, [8 x i8] } @\"main::fetch\"()"));
        assert!(text.contains("store i32 0, ptr"));
    }

    #[test]
    fn test_interpolation_calls_runtime_concat() {
        let (_, text) = emit_source("func f(x: I32) -> Str { return \"v=${x}\" }");
        assert!(text.contains("call ptr @tml_str_concat"));
        assert!(text.contains("call ptr @tml_str_from_int"));
        assert!(text.contains("declare ptr @tml_str_concat(ptr, ptr)"));
    }

    #[test]
    fn test_emission_is_deterministic() {
        let src = "type Maybe[T] = Just(T) | Nothing;\n\
                   func pick(m: Maybe[I32]) -> I32 { when m { Just(x) -> x, Nothing -> 0 } }\n\
                   func main() -> I32 { return pick(Just(3)) }";
        let (_, first) = emit_source(src);
        let (_, second) = emit_source(src);
        assert_eq!(first, second);
    }

    #[test]
    fn test_enum_tag_switch_within_domain() {
        let (_, text) = emit_source(
            "type Color = Red | Green | Blue;\n\
             func code(c: Color) -> I32 { when c { Red -> 0, Green -> 1, Blue -> 2 } }",
        );
        // Tags 0..=2 only; nothing outside the variant count domain.
        assert!(text.contains("i32 0, label"));
        assert!(text.contains("i32 2, label"));
        assert!(!text.contains("i32 3, label"));
    }
}
