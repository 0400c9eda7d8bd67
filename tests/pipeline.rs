//! End-to-end pipeline tests: source text in, diagnostics and artifacts
//! out, through the public library API.

use std::path::Path;

use tml::resolver::MemoryFileProvider;
use tml::session::Session;
use tml::CompileOutput;

fn compile_files(files: &[(&str, &str)]) -> (Session, CompileOutput) {
    let mut provider = MemoryFileProvider::new();
    for (path, src) in files {
        provider.add(*path, *src);
    }
    let mut session = Session::default();
    let output = tml::compile(&mut session, &provider, Path::new(files[0].0));
    (session, output)
}

fn compile_source(src: &str) -> (Session, CompileOutput) {
    compile_files(&[("main.tml", src)])
}

fn error_codes(session: &Session) -> Vec<String> {
    session
        .diagnostics
        .entries()
        .iter()
        .filter(|d| d.severity == tml::diagnostics::Severity::Error)
        .map(|d| d.code.clone())
        .collect()
}

#[test]
fn integer_function_compiles_to_expected_shape() {
    let (session, output) =
        compile_source("func add(a: I32, b: I32) -> I32 { return a + b }");
    assert!(!session.has_errors(), "{:?}", error_codes(&session));

    let ir = output.canonical_ir.expect("canonical IR");
    // One function item with an @-prefixed eight-hex-digit stable ID.
    let id_at = ir.find("(item func @").expect("a function item") + "(item func @".len();
    let id = &ir[id_at..id_at + 8];
    assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let llvm = output.llvm_ir.expect("LLVM IR");
    assert!(llvm.contains("define i32 @\"main::add\"(i32 %arg.a, i32 %arg.b)"));
    assert!(llvm.contains("add nsw i32"));
    assert_eq!(llvm.matches("\n  ret i32").count(), 1);
}

#[test]
fn enum_pattern_layout_and_tags() {
    let (session, output) = compile_source(
        "type Maybe[T] = Just(T) | Nothing;\n\
         func unwrap_or(m: Maybe[I64], d: I64) -> I64 {\n\
             when m { Just(x) -> x, Nothing -> d }\n\
         }",
    );
    assert!(!session.has_errors(), "{:?}", error_codes(&session));

    let ir = output.canonical_ir.expect("canonical IR");
    // Source order governs variant tags: Just is 0, Nothing is 1.
    assert!(ir.contains("(variant Just"));
    assert!(ir.contains("(arm (variant Just 0"));
    assert!(ir.contains("(arm (variant Nothing 1"));

    let llvm = output.llvm_ir.expect("LLVM IR");
    assert!(llvm.contains("{ i32, [8 x i8] }"));
}

#[test]
fn exclusive_aliased_borrow_is_rejected_with_note() {
    let (session, output) = compile_source(
        "func f() { let mut v = \"x\"; let r = &mut v; let r2 = &v; r.push('a'); }",
    );
    assert!(output.llvm_ir.is_none());

    let diagnostic = session
        .diagnostics
        .entries()
        .into_iter()
        .find(|d| d.code == "E-BORROW-EXCLUSIVE-ALIASED")
        .expect("the aliasing diagnostic");
    // The error points at the second borrow; the first borrow is a note.
    assert_eq!(diagnostic.labels.len(), 1);

    let map = &session.source_map;
    let primary = map.snippet(diagnostic.primary);
    let note = map.snippet(diagnostic.labels[0].span);
    assert!(primary.contains("&v"), "primary was `{primary}`");
    assert!(note.contains("&mut v"), "note was `{note}`");
}

#[test]
fn effect_propagation_accepts_covered_calls() {
    let (session, _) = compile_source(
        "caps: [io.file.read];\n\
         func read_it(f: ref File) uses io.file.read {\n\
             File::read(f);\n\
         }",
    );
    assert!(
        error_codes(&session)
            .iter()
            .all(|code| code != "E0601" && code != "E0602"),
        "{:?}",
        error_codes(&session)
    );
}

#[test]
fn capability_envelope_violation_reported() {
    let (session, _) = compile_source(
        "caps: [io.file.read];\n\
         func write_it(f: mut ref File) uses io.file.write { File::write(f, 1); }",
    );
    assert!(error_codes(&session).contains(&"E0602".to_string()));
}

#[test]
fn deterministic_ir_across_fresh_runs() {
    let src = "type Shape = Circle(F64) | Square(F64) | Dot;\n\
               func area(s: Shape) -> F64 {\n\
                   when s {\n\
                       Circle(r) -> 3.14159 * r * r,\n\
                       Square(w) -> w * w,\n\
                       Dot -> 0.0,\n\
                   }\n\
               }\n\
               func double(x: F64) -> F64 { return x * 2.0 }\n\
               func main() -> F64 { return double(area(Dot)) }";

    let (_, first) = compile_source(src);
    let (_, second) = compile_source(src);
    assert_eq!(first.canonical_ir, second.canonical_ir);
    assert_eq!(first.llvm_ir, second.llvm_ir);
}

#[test]
fn dyn_dispatch_emits_vtables_and_indirect_call() {
    let (session, output) = compile_source(
        "behavior Reader { func read(this) -> I32; }\n\
         type MemA = { a: I32 };\n\
         type MemB = { b: I32 };\n\
         extend MemA with Reader { func read(this) -> I32 { return 1 } }\n\
         extend MemB with Reader { func read(this) -> I32 { return 2 } }\n\
         func pick(which: Bool) -> dyn Reader {\n\
             if which { return MemA { a: 1 } } else { return MemB { b: 2 } }\n\
         }\n\
         func drain(r: dyn Reader) -> I32 { return r.read() }",
    );
    assert!(!session.has_errors(), "{:?}", error_codes(&session));

    let llvm = output.llvm_ir.expect("LLVM IR");
    assert!(llvm.contains("@\"vtable.MemA.Reader\" = internal constant [1 x ptr] [ptr @\"main::MemA::read\"]"));
    assert!(llvm.contains("@\"vtable.MemB.Reader\""));
    assert!(llvm.contains("insertvalue { ptr, ptr }"));
    assert!(llvm.contains("extractvalue { ptr, ptr }"));
}

// ---- boundary behaviors ------------------------------------------------

#[test]
fn empty_module_compiles() {
    let (session, output) = compile_source("");
    assert!(!session.has_errors());
    let ir = output.canonical_ir.expect("canonical IR");
    assert!(ir.starts_with("(module main "));
}

#[test]
fn module_with_only_types_compiles() {
    let (session, output) = compile_source(
        "type Point = { x: I32, y: I32 };\ntype Flag = On | Off;",
    );
    assert!(!session.has_errors());
    let ir = output.canonical_ir.expect("canonical IR");
    assert!(ir.contains("(item type"));
    assert!(!ir.contains("(item func"));
}

#[test]
fn deeply_nested_generics_compile() {
    let (session, _) = compile_source(
        "type Maybe[T] = Just(T) | Nothing;\n\
         func main() {\n\
             let deep: Maybe[Maybe[Maybe[Maybe[Maybe[Maybe[I32]]]]]] =\n\
                 Just(Just(Just(Just(Just(Just(1))))));\n\
         }",
    );
    assert!(!session.has_errors(), "{:?}", error_codes(&session));
}

#[test]
fn mixed_payload_enum_layout_uses_largest_variant() {
    let (session, output) = compile_source(
        "type Packet = Empty | Small(U8) | Wide(I64, I64) | Tag(Bool);\n\
         func kind(p: Packet) -> I32 {\n\
             when p { Empty -> 0, Small(_) -> 1, Wide(a, b) -> 2, Tag(_) -> 3 }\n\
         }",
    );
    assert!(!session.has_errors(), "{:?}", error_codes(&session));
    let llvm = output.llvm_ir.expect("LLVM IR");
    // Wide(I64, I64) is 16 bytes, the largest payload.
    assert!(llvm.contains("{ i32, [16 x i8] }"));
}

#[test]
fn closure_capturing_mutably_across_loop_body() {
    let (session, _) = compile_source(
        "func f() {\n\
             let mut count = 0;\n\
             let bump = do() { count = count + 1; };\n\
             bump();\n\
             bump();\n\
         }",
    );
    assert!(!session.has_errors(), "{:?}", error_codes(&session));
}

#[test]
fn never_returning_function_usable_in_either_branch() {
    let (session, _) = compile_source(
        "func fail(msg: Str) -> Never { panic(msg); loop { } }\n\
         func f(c: Bool) -> I32 { if c then 1 else fail(\"no\") }",
    );
    assert!(!session.has_errors(), "{:?}", error_codes(&session));
}

#[test]
fn zero_sized_tuple_is_unit() {
    let (session, _) = compile_source("func f() -> () { return () }");
    assert!(!session.has_errors(), "{:?}", error_codes(&session));
}

#[test]
fn cross_module_compilation() {
    let (session, output) = compile_files(&[
        (
            "app.tml",
            "mod mathx;\nuse app::mathx::square;\nfunc main() -> I32 { return square(4) }",
        ),
        ("mathx.tml", "pub func square(x: I32) -> I32 { return x * x }"),
    ]);
    assert!(!session.has_errors(), "{:?}", error_codes(&session));
    let ir = output.canonical_ir.expect("canonical IR");
    assert!(ir.contains("(module app "));
    assert!(ir.contains("(module app::mathx "));
}

#[test]
fn json_diagnostics_render() {
    let (session, _) = compile_source("func f() -> I32 { return true }");
    let rendered = tml::diagnostics::render_json(
        &session.source_map,
        &session.diagnostics.entries(),
    );
    let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(parsed[0]["severity"], "error");
    assert_eq!(parsed[0]["span"]["file"], "main.tml");
}
