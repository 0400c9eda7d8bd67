//! Invariant tests over the pipeline: determinism, stable-ID stability,
//! effect monotonicity, borrow safety, exhaustiveness and enum tag
//! domains.

use std::path::Path;

use tml::lexer::Lexer;
use tml::parser::parse_module;
use tml::resolver::MemoryFileProvider;
use tml::session::Session;

fn compile_source(src: &str) -> (Session, tml::CompileOutput) {
    let mut provider = MemoryFileProvider::new();
    provider.add("main.tml", src);
    let mut session = Session::default();
    let output = tml::compile(&mut session, &provider, Path::new("main.tml"));
    (session, output)
}

fn stable_id_of(ir: &str, name: &str) -> String {
    for line in ir.lines() {
        if line.starts_with("(item func @") && line.contains(&format!("{name} ")) {
            let start = line.find('@').unwrap();
            return line[start..start + 9].to_string();
        }
    }
    panic!("no function named {name} in IR:\n{ir}");
}

const PROGRAM: &str = "type Maybe[T] = Just(T) | Nothing;\n\
                       func head(m: Maybe[I32]) -> I32 { when m { Just(x) -> x, Nothing -> 0 } }\n\
                       func twice(n: I32) -> I32 { return n + n }";

#[test]
fn parsing_is_structurally_deterministic() {
    let parse = |src: &str| {
        let mut session = Session::default();
        let file = session.source_map.add_file("main.tml", src);
        let tokens = Lexer::new(&session, file).lex();
        parse_module(&session, file, tokens, vec!["main".to_string()])
    };
    assert_eq!(parse(PROGRAM), parse(PROGRAM));
}

#[test]
fn canonicalization_is_byte_deterministic() {
    let (_, first) = compile_source(PROGRAM);
    let (_, second) = compile_source(PROGRAM);
    assert_eq!(
        first.canonical_ir.expect("IR"),
        second.canonical_ir.expect("IR")
    );
}

#[test]
fn stable_id_survives_parameter_rename() {
    let (_, before) = compile_source("func twice(n: I32) -> I32 { return n + n }");
    let (_, after) = compile_source("func twice(value: I32) -> I32 { return value + value }");
    assert_eq!(
        stable_id_of(&before.canonical_ir.unwrap(), "twice"),
        stable_id_of(&after.canonical_ir.unwrap(), "twice")
    );
}

#[test]
fn stable_id_survives_unrelated_additions() {
    let (_, before) = compile_source("func twice(n: I32) -> I32 { return n + n }");
    let (_, after) = compile_source(
        "func twice(n: I32) -> I32 { return n + n }\nfunc other() { }",
    );
    assert_eq!(
        stable_id_of(&before.canonical_ir.unwrap(), "twice"),
        stable_id_of(&after.canonical_ir.unwrap(), "twice")
    );
}

#[test]
fn stable_id_changes_with_signature() {
    let (_, before) = compile_source("func twice(n: I32) -> I32 { return n + n }");
    let (_, after) = compile_source("func twice(n: I64) -> I64 { return n + n }");
    assert_ne!(
        stable_id_of(&before.canonical_ir.unwrap(), "twice"),
        stable_id_of(&after.canonical_ir.unwrap(), "twice")
    );
}

#[test]
fn pinned_stable_id_is_honored() {
    let (_, output) = compile_source("@deadbeef func f() { }");
    assert_eq!(stable_id_of(&output.canonical_ir.unwrap(), "f"), "@deadbeef");
}

#[test]
fn inferred_effects_bounded_by_declared() {
    // Accepted: the declared row covers everything inferred.
    let (session, _) = compile_source(
        "caps: [io];\nfunc log_it(s: Str) uses io { print(s); }",
    );
    assert!(!session.has_errors());

    // Rejected: the body performs an effect the declaration omits.
    let (session, _) = compile_source("func sneaky() uses io.time { Rand::next(); }");
    assert!(session.has_errors());
}

#[test]
fn module_caps_bound_function_rows() {
    let (session, _) = compile_source(
        "caps: [crypto];\nfunc roll() uses crypto.random { Rand::next(); }",
    );
    assert!(!session.has_errors());

    let (session, _) = compile_source(
        "caps: [crypto.hash];\nfunc roll() uses crypto.random { Rand::next(); }",
    );
    assert!(session.has_errors());
}

#[test]
fn accepted_programs_have_no_use_after_move() {
    // The analyzer accepts this program, so by construction every use
    // precedes the move.
    let (session, _) = compile_source(
        "func take(s: Str) { }\n\
         func f() { let s = \"x\"; let n = s.len(); take(s); }",
    );
    assert!(!session.has_errors());

    // Flipping the order makes the use follow the move and is rejected.
    let (session, _) = compile_source(
        "func take(s: Str) { }\n\
         func f() { let s = \"x\"; take(s); let n = s.len(); }",
    );
    assert!(session.has_errors());
}

#[test]
fn borrow_regions_end_at_last_use() {
    let (session, _) = compile_source(
        "func f() {\n\
             let mut v = \"x\";\n\
             let shared = &v;\n\
             let n = shared.len();\n\
             let exclusive = &mut v;\n\
             exclusive.push('a');\n\
         }",
    );
    assert!(!session.has_errors());
}

#[test]
fn exhaustive_when_accepted_missing_arm_rejected() {
    let (session, _) = compile_source(
        "type Flag = On | Off;\n\
         func flip(f: Flag) -> Flag { when f { On -> Off, Off -> On } }",
    );
    assert!(!session.has_errors());

    let (session, _) = compile_source(
        "type Flag = On | Off;\n\
         func broken(f: Flag) -> Flag { when f { On -> Off } }",
    );
    assert!(session
        .diagnostics
        .entries()
        .iter()
        .any(|d| d.code == "E0208"));
}

#[test]
fn emitted_enum_tags_stay_in_domain() {
    let (_, output) = compile_source(
        "type Tri = A | B | C;\n\
         func pick(t: Tri) -> I32 { when t { A -> 0, B -> 1, C -> 2 } }",
    );
    let llvm = output.llvm_ir.expect("LLVM IR");
    // Every tag comparison or switch case uses a value in [0, 3).
    for line in llvm.lines() {
        if let Some(idx) = line.find("icmp eq i32") {
            if line.contains("%tag") {
                let rest = &line[idx..];
                let tag: i64 = rest
                    .rsplit(',')
                    .next()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0);
                assert!((0..3).contains(&tag), "tag out of domain in `{line}`");
            }
        }
    }
    assert!(llvm.contains("i32 2, label"));
    assert!(!llvm.contains("i32 3, label"));
}

#[test]
fn effect_rows_render_deterministically_in_ir() {
    let (_, output) = compile_source(
        "caps: [io, crypto];\n\
         func both(s: Str) uses io.file.read, crypto.random { }",
    );
    let ir = output.canonical_ir.expect("IR");
    // BTreeSet ordering: crypto.random before io.file.read.
    assert!(ir.contains("(effects crypto.random io.file.read)"));
}
