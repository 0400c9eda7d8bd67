//! The TML compiler core: lexer → parser → name resolution → type &
//! effect checking → ownership analysis → canonical IR → LLVM IR.
//!
//! [`compile`] drives the passes in order. Every pass that can produce
//! independent diagnostics still runs after earlier errors; passes whose
//! inputs were not produced are skipped (no IR is canonicalized or
//! emitted once any error-severity diagnostic exists).

pub mod codegen;
pub mod diagnostics;
pub mod effects;
pub mod ir;
pub mod lexer;
pub mod ownership;
pub mod parser;
pub mod resolver;
pub mod session;
pub mod source;
pub mod typechecker;

use std::path::Path;

use log::debug;

use resolver::FileProvider;
use session::Session;

/// Artifacts of a compilation. Both are `None` when any error was
/// recorded before the corresponding pass could run.
#[derive(Debug, Default)]
pub struct CompileOutput {
    pub canonical_ir: Option<String>,
    pub llvm_ir: Option<String>,
}

/// Run the full pipeline on a source tree rooted at `root`.
/// Diagnostics accumulate in the session; the caller renders them and
/// picks the exit code.
pub fn compile(session: &mut Session, provider: &dyn FileProvider, root: &Path) -> CompileOutput {
    debug!("compiling {}", root.display());

    let graph = resolver::load_modules(session, provider, root);
    if graph.modules.is_empty() {
        return CompileOutput::default();
    }

    let resolution = resolver::resolve(session, &graph);
    let effect_table = effects::check_effects(session, &graph);
    let checked = typechecker::check_modules(session, &graph, &resolution);

    if session.has_errors() {
        // Ownership analysis still runs when only effect/resolve errors
        // exist and the typed tree is intact; without clean types its
        // judgments would be noise.
        return CompileOutput::default();
    }

    let ownership = ownership::analyze(session, &checked);
    if session.has_errors() {
        return CompileOutput::default();
    }

    let program = ir::canonicalize(session, &checked, &ownership, &effect_table);
    let canonical_ir = ir::render_program(&program);
    let llvm_ir = codegen::emit_program(session, &program, &checked);

    if session.has_errors() {
        // Emission-time internal errors invalidate the artifacts.
        return CompileOutput {
            canonical_ir: Some(canonical_ir),
            llvm_ir: None,
        };
    }

    CompileOutput {
        canonical_ir: Some(canonical_ir),
        llvm_ir: Some(llvm_ir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryFileProvider;

    fn compile_source(src: &str) -> (Session, CompileOutput) {
        let mut provider = MemoryFileProvider::new();
        provider.add("main.tml", src);
        let mut session = Session::default();
        let output = compile(&mut session, &provider, Path::new("main.tml"));
        (session, output)
    }

    #[test]
    fn test_clean_program_produces_both_artifacts() {
        let (session, output) =
            compile_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        assert!(!session.has_errors());
        assert!(output.canonical_ir.is_some());
        assert!(output.llvm_ir.is_some());
    }

    #[test]
    fn test_type_error_blocks_emission() {
        let (session, output) = compile_source("func f() -> I32 { return true }");
        assert!(session.has_errors());
        assert!(output.canonical_ir.is_none());
        assert!(output.llvm_ir.is_none());
    }

    #[test]
    fn test_borrow_error_blocks_emission() {
        let (session, output) = compile_source(
            "func f() { let mut v = \"x\"; let r = &mut v; let r2 = &v; r.push('a'); }",
        );
        assert!(session.has_errors());
        assert!(output.llvm_ir.is_none());
    }

    #[test]
    fn test_parse_error_still_reports_later_independent_errors() {
        // The malformed function becomes an error node; the effect
        // checker still validates the second function's declared row.
        let (session, _) = compile_source(
            "func broken( { }\nfunc f() uses io.quantum { }",
        );
        let codes: Vec<String> = session
            .diagnostics
            .entries()
            .iter()
            .map(|d| d.code.clone())
            .collect();
        assert!(codes.contains(&"E0100".to_string()));
        assert!(codes.contains(&"E0600".to_string()));
    }
}
