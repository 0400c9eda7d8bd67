//! Effect rows and the capability checker.
//!
//! Effects form a lattice rooted at `pure`. A dotted path names a node;
//! subeffects flow upward, so `io.file.read ⊑ io.file ⊑ io`. A function's
//! inferred row is the union of its callees' rows plus any primitive
//! effectful operations; the checker verifies `inferred ⊑ declared` and
//! that every declared row fits inside the module's capability envelope.
//! Inference over the call graph runs to a fixed point, which makes
//! (mutual) recursion converge: rows only ever grow and the lattice is
//! finite per program.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::parser::ast::{
    Declaration, EffectPath, Expression, FunctionDecl, Module, Statement,
};
use crate::resolver::ModuleGraph;
use crate::session::Session;

/// One node of the effect lattice, as a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Effect {
    segments: Vec<String>,
}

impl Effect {
    pub fn new(segments: Vec<String>) -> Self {
        Effect { segments }
    }

    pub fn parse(dotted: &str) -> Self {
        Effect {
            segments: dotted.split('.').map(str::to_string).collect(),
        }
    }

    pub fn from_path(path: &EffectPath) -> Self {
        Effect {
            segments: path.segments.clone(),
        }
    }

    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }

    /// `self` covers `other` when `self` is a prefix of `other`:
    /// `io.file` covers `io.file.read`.
    pub fn covers(&self, other: &Effect) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments == other.segments[..self.segments.len()]
    }
}

/// The built-in effect tree. User programs may add their own leaves under
/// fresh roots; paths under a built-in root must exist in the tree.
static BUILTIN_EFFECTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "io",
        "io.file",
        "io.file.read",
        "io.file.write",
        "io.network",
        "io.process",
        "io.time",
        "system",
        "system.ffi",
        "system.alloc",
        "system.unsafe",
        "crypto",
        "crypto.random",
        "crypto.hash",
        "crypto.encrypt",
    ]
});

static BUILTIN_ROOTS: &[&str] = &["io", "system", "crypto"];

/// Validate an effect path written in source. Returns false (and emits a
/// diagnostic) for unknown nodes under a built-in root.
pub fn validate_effect_path(session: &Session, path: &EffectPath) -> bool {
    let dotted = path.dotted();
    let root = &path.segments[0];
    if BUILTIN_ROOTS.contains(&root.as_str()) && !BUILTIN_EFFECTS.contains(&dotted.as_str()) {
        session.emit(Diagnostic::error(
            "E0600",
            format!("unknown effect `{dotted}`"),
            path.position,
        ));
        false
    } else {
        true
    }
}

/// An ordered set of effects. Ordering keeps rendering deterministic for
/// the canonical IR.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectRow {
    effects: BTreeSet<Effect>,
}

impl EffectRow {
    /// The empty row, i.e. `pure`.
    pub fn pure() -> Self {
        EffectRow::default()
    }

    pub fn from_paths(paths: &[EffectPath]) -> Self {
        let mut row = EffectRow::pure();
        for path in paths {
            row.insert(Effect::from_path(path));
        }
        row
    }

    pub fn is_pure(&self) -> bool {
        self.effects.is_empty()
    }

    /// Insert, collapsing redundancy: an effect already covered by the row
    /// is dropped, and inserting an ancestor swallows its descendants.
    pub fn insert(&mut self, effect: Effect) {
        if self.effects.iter().any(|held| held.covers(&effect)) {
            return;
        }
        self.effects.retain(|held| !effect.covers(held));
        self.effects.insert(effect);
    }

    pub fn union_with(&mut self, other: &EffectRow) -> bool {
        let before = self.effects.len();
        let snapshot: Vec<Effect> = other.effects.iter().cloned().collect();
        for effect in snapshot {
            self.insert(effect);
        }
        self.effects.len() != before
    }

    /// Does some effect in the row cover `effect`?
    pub fn covers(&self, effect: &Effect) -> bool {
        self.effects.iter().any(|held| held.covers(effect))
    }

    /// `self ⊑ other`: every effect of `self` is covered by `other`.
    pub fn is_subrow_of(&self, other: &EffectRow) -> bool {
        self.effects.iter().all(|effect| other.covers(effect))
    }

    /// Effects of `self` that `other` does not cover, for diagnostics.
    pub fn uncovered_by(&self, other: &EffectRow) -> Vec<Effect> {
        self.effects
            .iter()
            .filter(|effect| !other.covers(effect))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    /// Canonical rendering: `pure` or sorted dotted names.
    pub fn render(&self) -> String {
        if self.is_pure() {
            "pure".to_string()
        } else {
            self.effects
                .iter()
                .map(Effect::dotted)
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

/// Effects of runtime primitives reachable by path call.
static PRIMITIVE_EFFECTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("File::open", "io.file"),
        ("File::read", "io.file.read"),
        ("File::write", "io.file.write"),
        ("File::close", "io.file"),
        ("Net::connect", "io.network"),
        ("Net::send", "io.network"),
        ("Net::recv", "io.network"),
        ("Process::spawn", "io.process"),
        ("Time::now", "io.time"),
        ("Rand::next", "crypto.random"),
        ("Hash::digest", "crypto.hash"),
        ("Crypt::encrypt", "crypto.encrypt"),
        ("Crypt::decrypt", "crypto.encrypt"),
        ("Ffi::call", "system.ffi"),
        ("Mem::alloc", "system.alloc"),
        ("Mem::free", "system.alloc"),
    ])
});

/// Inferred effect rows keyed by qualified function name
/// (`module::path::name`), produced by [`check_effects`] and consumed by
/// the canonicalizer.
pub type EffectTable = HashMap<String, EffectRow>;

struct FunctionInfo<'m> {
    function: &'m FunctionDecl<()>,
    module_index: usize,
    qualified: String,
}

/// Run effect inference and all capability checks over the module graph.
pub fn check_effects(session: &Session, graph: &ModuleGraph) -> EffectTable {
    let mut functions: Vec<FunctionInfo> = vec![];
    for (module_index, loaded) in graph.modules.iter().enumerate() {
        if let Some(caps) = &loaded.module.caps {
            for path in &caps.effects {
                validate_effect_path(session, path);
            }
        }
        collect_functions(&loaded.module, module_index, &mut functions);
    }

    for info in &functions {
        if let Some(declared) = &info.function.declared_effects {
            for path in declared {
                validate_effect_path(session, path);
            }
        }
    }

    // Map local function names to their qualified names per module so
    // call-site lookups work without type information.
    let mut local_index: HashMap<(usize, String), usize> = HashMap::new();
    for (idx, info) in functions.iter().enumerate() {
        local_index.insert(
            (info.module_index, info.function.name.name.clone()),
            idx,
        );
    }

    // Fixed point: rows only grow, so iteration terminates.
    let mut inferred: Vec<EffectRow> = vec![EffectRow::pure(); functions.len()];
    loop {
        let mut changed = false;
        for (idx, info) in functions.iter().enumerate() {
            let mut row = inferred[idx].clone();
            collect_block_effects(
                &info.function.body.statements,
                info.module_index,
                &local_index,
                &functions,
                &inferred,
                &mut row,
            );
            if row != inferred[idx] {
                inferred[idx] = row;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // Verify inferred ⊑ declared and declared ⊑ module caps.
    let mut table = EffectTable::new();
    for (idx, info) in functions.iter().enumerate() {
        let inferred_row = &inferred[idx];
        let declared_row = match &info.function.declared_effects {
            Some(paths) => {
                let declared = EffectRow::from_paths(paths);
                for effect in inferred_row.uncovered_by(&declared) {
                    session.emit(Diagnostic::error(
                        "E0601",
                        format!(
                            "function `{}` performs `{}` but does not declare it",
                            info.function.name.name,
                            effect.dotted()
                        ),
                        info.function.position,
                    ));
                }
                declared
            }
            None if info.function.visibility.is_public() => {
                // Public functions without a `uses` clause promise purity.
                for effect in inferred_row.iter() {
                    session.emit(Diagnostic::error(
                        "E0601",
                        format!(
                            "public function `{}` performs `{}`; add a `uses` clause",
                            info.function.name.name,
                            effect.dotted()
                        ),
                        info.function.position,
                    ));
                }
                inferred_row.clone()
            }
            // Private functions get their declared row inferred.
            None => inferred_row.clone(),
        };

        let module = &graph.modules[info.module_index].module;
        if let Some(caps) = &module.caps {
            let envelope = EffectRow::from_paths(&caps.effects);
            for effect in declared_row.uncovered_by(&envelope) {
                session.emit(
                    Diagnostic::error(
                        "E0602",
                        format!(
                            "effect `{}` is outside the capability envelope of module `{}`",
                            effect.dotted(),
                            module.path_string()
                        ),
                        info.function.position,
                    )
                    .with_label(caps.position, "envelope declared here"),
                );
            }
        }

        table.insert(info.qualified.clone(), declared_row);
    }

    check_child_envelopes(session, graph);
    table
}

/// Child-module envelopes must be subsets of their parent's.
fn check_child_envelopes(session: &Session, graph: &ModuleGraph) {
    for loaded in &graph.modules {
        let Some(parent_index) = loaded.parent else {
            continue;
        };
        let parent = &graph.modules[parent_index].module;
        let Some(parent_caps) = &parent.caps else {
            // No parent envelope means unrestricted.
            continue;
        };
        let Some(child_caps) = &loaded.module.caps else {
            continue;
        };
        let parent_row = EffectRow::from_paths(&parent_caps.effects);
        let child_row = EffectRow::from_paths(&child_caps.effects);
        for effect in child_row.uncovered_by(&parent_row) {
            session.emit(
                Diagnostic::error(
                    "E0603",
                    format!(
                        "module `{}` declares cap `{}` not granted by its parent `{}`",
                        loaded.module.path_string(),
                        effect.dotted(),
                        parent.path_string()
                    ),
                    child_caps.position,
                )
                .with_label(parent_caps.position, "parent envelope declared here"),
            );
        }
    }
}

fn collect_functions<'m>(
    module: &'m Module<()>,
    module_index: usize,
    into: &mut Vec<FunctionInfo<'m>>,
) {
    for declaration in &module.declarations {
        match declaration {
            Declaration::Function(function) => into.push(FunctionInfo {
                function,
                module_index,
                qualified: format!("{}::{}", module.path_string(), function.name.name),
            }),
            Declaration::Extend(extend) => {
                for method in &extend.methods {
                    into.push(FunctionInfo {
                        function: method,
                        module_index,
                        qualified: format!(
                            "{}::{}::{}",
                            module.path_string(),
                            extend.target,
                            method.name.name
                        ),
                    });
                }
            }
            _ => {}
        }
    }
}

fn collect_block_effects(
    statements: &[Statement<()>],
    module_index: usize,
    local_index: &HashMap<(usize, String), usize>,
    functions: &[FunctionInfo],
    inferred: &[EffectRow],
    row: &mut EffectRow,
) {
    for statement in statements {
        collect_statement_effects(statement, module_index, local_index, functions, inferred, row);
    }
}

fn collect_statement_effects(
    statement: &Statement<()>,
    module_index: usize,
    local_index: &HashMap<(usize, String), usize>,
    functions: &[FunctionInfo],
    inferred: &[EffectRow],
    row: &mut EffectRow,
) {
    let mut on_expr = |expression: &Expression<()>| {
        collect_expression_effects(expression, module_index, local_index, functions, inferred, row)
    };
    match statement {
        Statement::Let(s) => on_expr(&s.value),
        Statement::Assignment(s) => {
            on_expr(&s.target);
            on_expr(&s.value);
        }
        Statement::Return(s) => {
            if let Some(value) = &s.value {
                on_expr(value);
            }
        }
        Statement::Break(_) | Statement::Continue(_) | Statement::Error(_) => {}
        Statement::WhileLoop(s) => {
            on_expr(&s.condition);
            collect_block_effects(
                &s.body.statements,
                module_index,
                local_index,
                functions,
                inferred,
                row,
            );
        }
        Statement::Loop(s) => collect_block_effects(
            &s.body.statements,
            module_index,
            local_index,
            functions,
            inferred,
            row,
        ),
        Statement::ForLoop(s) => {
            on_expr(&s.iterable);
            collect_block_effects(
                &s.body.statements,
                module_index,
                local_index,
                functions,
                inferred,
                row,
            );
        }
        Statement::Expression(e) | Statement::YieldingExpression(e) => on_expr(e),
    }
}

fn collect_expression_effects(
    expression: &Expression<()>,
    module_index: usize,
    local_index: &HashMap<(usize, String), usize>,
    functions: &[FunctionInfo],
    inferred: &[EffectRow],
    row: &mut EffectRow,
) {
    match expression {
        Expression::Call(call) => {
            if let Expression::Path(path) = &call.callee {
                let joined = path.joined();
                if let Some(effect) = PRIMITIVE_EFFECTS.get(joined.as_str()) {
                    row.insert(Effect::parse(effect));
                } else if let Some(&callee) =
                    local_index.get(&(module_index, path.last().to_string()))
                {
                    let callee_row = match &functions[callee].function.declared_effects {
                        Some(paths) => EffectRow::from_paths(paths),
                        None => inferred[callee].clone(),
                    };
                    row.union_with(&callee_row);
                }
            } else {
                collect_expression_effects(&call.callee, module_index, local_index, functions, inferred, row);
            }
            for argument in &call.arguments {
                collect_expression_effects(argument, module_index, local_index, functions, inferred, row);
            }
        }
        Expression::MethodCall(call) => {
            collect_expression_effects(&call.receiver, module_index, local_index, functions, inferred, row);
            if let Some(&callee) = local_index.get(&(module_index, call.method.name.clone())) {
                let callee_row = match &functions[callee].function.declared_effects {
                    Some(paths) => EffectRow::from_paths(paths),
                    None => inferred[callee].clone(),
                };
                row.union_with(&callee_row);
            }
            for argument in &call.arguments {
                collect_expression_effects(argument, module_index, local_index, functions, inferred, row);
            }
        }
        Expression::Literal(_) | Expression::Path(_) | Expression::Error(..) => {}
        Expression::Interpolation(interp) => {
            for hole in &interp.holes {
                collect_expression_effects(hole, module_index, local_index, functions, inferred, row);
            }
        }
        Expression::Unary(e) => collect_expression_effects(&e.operand, module_index, local_index, functions, inferred, row),
        Expression::Binary(e) => {
            collect_expression_effects(&e.left, module_index, local_index, functions, inferred, row);
            collect_expression_effects(&e.right, module_index, local_index, functions, inferred, row);
        }
        Expression::FieldAccess(e) => collect_expression_effects(&e.receiver, module_index, local_index, functions, inferred, row),
        Expression::Index(e) => {
            collect_expression_effects(&e.receiver, module_index, local_index, functions, inferred, row);
            collect_expression_effects(&e.index, module_index, local_index, functions, inferred, row);
        }
        Expression::Tuple(e) => {
            for element in &e.elements {
                collect_expression_effects(element, module_index, local_index, functions, inferred, row);
            }
        }
        Expression::Array(array) => match array {
            crate::parser::ast::ArrayLiteral::List { elements, .. } => {
                for element in elements {
                    collect_expression_effects(element, module_index, local_index, functions, inferred, row);
                }
            }
            crate::parser::ast::ArrayLiteral::Repeat { value, length, .. } => {
                collect_expression_effects(value, module_index, local_index, functions, inferred, row);
                collect_expression_effects(length, module_index, local_index, functions, inferred, row);
            }
        },
        Expression::StructInit(init) => {
            for field in &init.fields {
                collect_expression_effects(&field.value, module_index, local_index, functions, inferred, row);
            }
        }
        Expression::If(e) => {
            collect_expression_effects(&e.condition, module_index, local_index, functions, inferred, row);
            collect_expression_effects(&e.then_branch, module_index, local_index, functions, inferred, row);
            if let Some(else_branch) = &e.else_branch {
                collect_expression_effects(else_branch, module_index, local_index, functions, inferred, row);
            }
        }
        Expression::When(e) => {
            collect_expression_effects(&e.scrutinee, module_index, local_index, functions, inferred, row);
            for arm in &e.arms {
                collect_expression_effects(&arm.value, module_index, local_index, functions, inferred, row);
            }
        }
        Expression::Block(block) => collect_block_effects(
            &block.statements,
            module_index,
            local_index,
            functions,
            inferred,
            row,
        ),
        Expression::Closure(closure) => collect_expression_effects(&closure.body, module_index, local_index, functions, inferred, row),
        Expression::Range(e) => {
            collect_expression_effects(&e.low, module_index, local_index, functions, inferred, row);
            collect_expression_effects(&e.high, module_index, local_index, functions, inferred, row);
        }
        Expression::Borrow(e) => collect_expression_effects(&e.target, module_index, local_index, functions, inferred, row),
        Expression::Deref(e) => collect_expression_effects(&e.target, module_index, local_index, functions, inferred, row),
        Expression::Await(e) => collect_expression_effects(&e.target, module_index, local_index, functions, inferred, row),
        Expression::Propagate(e) => collect_expression_effects(&e.target, module_index, local_index, functions, inferred, row),
        Expression::Cast(e) => collect_expression_effects(&e.value, module_index, local_index, functions, inferred, row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{load_modules, MemoryFileProvider};
    use std::path::Path;

    fn check(files: &[(&str, &str)]) -> (Session, EffectTable) {
        let mut provider = MemoryFileProvider::new();
        for (path, src) in files {
            provider.add(*path, *src);
        }
        let mut session = Session::default();
        let graph = load_modules(&mut session, &provider, Path::new(files[0].0));
        let table = check_effects(&session, &graph);
        (session, table)
    }

    #[test]
    fn test_suborder_of_lattice() {
        let io = Effect::parse("io");
        let io_file = Effect::parse("io.file");
        let io_file_read = Effect::parse("io.file.read");
        assert!(io.covers(&io_file_read));
        assert!(io_file.covers(&io_file_read));
        assert!(!io_file_read.covers(&io_file));
        assert!(!io_file.covers(&Effect::parse("io.network")));
    }

    #[test]
    fn test_row_collapses_covered_effects() {
        let mut row = EffectRow::pure();
        row.insert(Effect::parse("io.file.read"));
        row.insert(Effect::parse("io.file"));
        // The ancestor swallowed the leaf.
        assert_eq!(row.render(), "io.file");
        assert!(row.covers(&Effect::parse("io.file.write")));
    }

    #[test]
    fn test_primitive_call_infers_effect() {
        let (session, table) = check(&[(
            "app.tml",
            "caps: [io.file];\nfunc read_it() uses io.file.read { File::read(); }",
        )]);
        assert!(!session.has_errors());
        assert_eq!(table["app::read_it"].render(), "io.file.read");
    }

    #[test]
    fn test_undeclared_effect_rejected() {
        let (session, _) = check(&[(
            "app.tml",
            "func quiet() uses io.time { File::read(); }",
        )]);
        assert!(session.has_errors());
    }

    #[test]
    fn test_effect_propagates_through_calls() {
        let (session, table) = check(&[(
            "app.tml",
            "caps: [io.file];\n\
             func low() uses io.file.read { File::read(); }\n\
             func high() uses io.file.read { low(); }",
        )]);
        assert!(!session.has_errors());
        assert_eq!(table["app::high"].render(), "io.file.read");
    }

    #[test]
    fn test_capability_envelope_violation() {
        let (session, _) = check(&[(
            "app.tml",
            "caps: [io.file.read];\n\
             func naughty() uses io.file.write { File::write(); }",
        )]);
        assert!(session.has_errors());
    }

    #[test]
    fn test_child_caps_must_be_subset() {
        let (session, _) = check(&[
            ("app.tml", "caps: [io.file];\nmod child;"),
            ("child.tml", "caps: [io.network];"),
        ]);
        assert!(session.has_errors());
    }

    #[test]
    fn test_public_function_defaults_to_pure() {
        let (session, _) = check(&[(
            "app.tml",
            "caps: [io.file];\npub func leaky() { File::read(); }",
        )]);
        assert!(session.has_errors());
    }

    #[test]
    fn test_private_function_infers_declared_row() {
        let (session, table) = check(&[(
            "app.tml",
            "caps: [crypto.random];\nfunc roll() -> I32 { Rand::next(); return 4 }",
        )]);
        assert!(!session.has_errors());
        assert_eq!(table["app::roll"].render(), "crypto.random");
    }

    #[test]
    fn test_unknown_effect_under_builtin_root_rejected() {
        let (session, _) = check(&[("app.tml", "func f() uses io.quantum { }")]);
        assert!(session.has_errors());
    }

    #[test]
    fn test_recursive_functions_reach_fixed_point() {
        let (session, table) = check(&[(
            "app.tml",
            "caps: [io.time];\n\
             func ping(n: I32) { Time::now(); pong(n); }\n\
             func pong(n: I32) { ping(n); }",
        )]);
        assert!(!session.has_errors());
        assert_eq!(table["app::ping"].render(), "io.time");
        assert_eq!(table["app::pong"].render(), "io.time");
    }
}
