//! Ownership and borrow analysis with drop-point insertion.
//!
//! Runs after type checking, over the typed tree with resolved type
//! slots. The analyzer walks each function in evaluation order, numbers
//! every step as a program point, and records per-binding use events and
//! borrow regions. Conflicts are then detected pairwise on the regions
//! ([`liveness`]); regions end at the last use of whatever binding holds
//! the borrow, not at scope end.
//!
//! The walker also computes, for every block exit edge and every early
//! `return`/`break`/`continue`, the set of still-owned heap resources to
//! drop, in reverse declaration order. That schedule lands in a side
//! table keyed by [`NodeId`] — the emitter reads it verbatim, so the two
//! passes cannot disagree about drop order. Closure capture modes
//! (shared / exclusive / move) are inferred here as well.

pub mod error;
pub mod liveness;
pub mod state;

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::parser::ast::*;
use crate::session::Session;
use crate::source::Span;
use crate::typechecker::behavior::MethodDef;
use crate::typechecker::context::Context;
use crate::typechecker::types::Type;
use crate::typechecker::{expression_info, CheckedProgram, TypeInformation};

use self::error::*;
use self::liveness::{BorrowRecord, UseEvent, UseKind};
use self::state::{is_copy, needs_drop, Capture, CaptureMode};

/// Side tables produced by the analysis, consumed by the emitter.
#[derive(Debug, Default)]
pub struct OwnershipAnalysis {
    /// Block / `return` / `break` / `continue` node → binding names to
    /// drop on that exit edge, already in reverse declaration order.
    pub drops: HashMap<NodeId, Vec<String>>,
    /// Closure node → captured variables with their modes.
    pub captures: HashMap<NodeId, Vec<Capture>>,
}

pub fn analyze(session: &Session, checked: &CheckedProgram) -> OwnershipAnalysis {
    let mut analysis = OwnershipAnalysis::default();
    for module in &checked.modules {
        for declaration in &module.declarations {
            match declaration {
                Declaration::Function(function) => {
                    FunctionAnalyzer::run(session, &checked.ctx, function, &mut analysis);
                }
                Declaration::Extend(extend) => {
                    for method in &extend.methods {
                        FunctionAnalyzer::run(session, &checked.ctx, method, &mut analysis);
                    }
                }
                _ => {}
            }
        }
    }
    debug!(
        "ownership analysis: {} drop edge(s), {} closure(s)",
        analysis.drops.len(),
        analysis.captures.len()
    );
    analysis
}

struct BindingData {
    name: String,
    span: Span,
    needs_drop: bool,
    copy: bool,
    is_param: bool,
}

struct ScopeFrame {
    bindings: Vec<usize>,
    is_loop_body: bool,
}

struct FunctionAnalyzer<'a> {
    session: &'a Session,
    ctx: &'a Context,
    point: u32,
    bindings: Vec<BindingData>,
    by_name: HashMap<String, Vec<usize>>,
    scopes: Vec<ScopeFrame>,
    events: HashMap<usize, Vec<UseEvent>>,
    borrows: Vec<BorrowRecord>,
    /// Reference-holding bindings → the borrows they keep alive.
    holders: HashMap<usize, Vec<usize>>,
    moved: HashMap<usize, Span>,
    reported: HashSet<usize>,
    loop_stack: Vec<u32>,
    loop_regions: Vec<(u32, u32)>,
}

impl<'a> FunctionAnalyzer<'a> {
    fn run(
        session: &'a Session,
        ctx: &'a Context,
        function: &FunctionDecl<TypeInformation>,
        analysis: &mut OwnershipAnalysis,
    ) {
        let mut analyzer = FunctionAnalyzer {
            session,
            ctx,
            point: 0,
            bindings: vec![],
            by_name: HashMap::new(),
            scopes: vec![ScopeFrame {
                bindings: vec![],
                is_loop_body: false,
            }],
            events: HashMap::new(),
            borrows: vec![],
            holders: HashMap::new(),
            moved: HashMap::new(),
            reported: HashSet::new(),
            loop_stack: vec![],
            loop_regions: vec![],
        };

        if function.this_param.is_some() {
            analyzer.declare(
                "this",
                &Type::reference(Type::Error, false),
                function.position,
                true,
            );
        }
        for parameter in &function.parameters {
            analyzer.declare(
                &parameter.name.name,
                &parameter.name.info.resolved(),
                parameter.name.position,
                true,
            );
        }

        analyzer.walk_block(&function.body, analysis, false);

        let mut borrows = std::mem::take(&mut analyzer.borrows);
        liveness::expand_for_loops(&mut borrows, &analyzer.loop_regions);
        analyzer.report_conflicts(&borrows);
    }

    fn tick(&mut self) -> u32 {
        self.point += 1;
        self.point
    }

    fn declare(&mut self, name: &str, ty: &Type, span: Span, is_param: bool) -> usize {
        let index = self.bindings.len();
        self.bindings.push(BindingData {
            name: name.to_string(),
            span,
            needs_drop: needs_drop(ty),
            copy: is_copy(ty),
            is_param,
        });
        self.by_name.entry(name.to_string()).or_default().push(index);
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .bindings
            .push(index);
        index
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).and_then(|stack| stack.last()).copied()
    }

    fn use_binding(&mut self, index: usize, kind: UseKind, span: Span) {
        let point = self.tick();

        if kind == UseKind::Write {
            self.moved.remove(&index);
        } else if let Some(moved_at) = self.moved.get(&index).copied() {
            if self.reported.insert(index) {
                self.session.emit(
                    OwnershipError::UseAfterMove(
                        UseAfterMove {
                            name: self.bindings[index].name.clone(),
                            moved_at,
                        },
                        span,
                    )
                    .to_diagnostic(),
                );
            }
        }

        if kind == UseKind::Move && !self.bindings[index].copy {
            self.moved.insert(index, span);
        }

        self.events
            .entry(index)
            .or_default()
            .push(UseEvent { point, span, kind });

        // Using a reference binding keeps its borrows alive.
        if let Some(borrow_indices) = self.holders.get(&index).cloned() {
            for borrow_index in borrow_indices {
                self.borrows[borrow_index].last_use_point = point;
            }
        }
    }

    /// Resolve a place expression to its root binding and field path.
    fn root_of_place(
        &self,
        expression: &Expression<TypeInformation>,
    ) -> Option<(usize, Vec<String>)> {
        match expression {
            Expression::Path(path) if path.segments.len() == 1 => {
                self.lookup(&path.segments[0]).map(|index| (index, vec![]))
            }
            Expression::FieldAccess(access) => {
                let (root, mut path) = self.root_of_place(&access.receiver)?;
                path.push(access.field.name.clone());
                Some((root, path))
            }
            Expression::Index(index) => {
                let (root, mut path) = self.root_of_place(&index.receiver)?;
                path.push("[]".to_string());
                Some((root, path))
            }
            _ => None,
        }
    }

    fn record_borrow(
        &mut self,
        root: usize,
        path: Vec<String>,
        mutable: bool,
        span: Span,
    ) -> usize {
        let point = self.tick();
        self.events.entry(root).or_default().push(UseEvent {
            point,
            span,
            kind: UseKind::Read,
        });
        if let Some(moved_at) = self.moved.get(&root).copied() {
            if self.reported.insert(root) {
                self.session.emit(
                    OwnershipError::UseAfterMove(
                        UseAfterMove {
                            name: self.bindings[root].name.clone(),
                            moved_at,
                        },
                        span,
                    )
                    .to_diagnostic(),
                );
            }
        }
        self.borrows.push(BorrowRecord {
            root,
            path,
            mutable,
            created_point: point,
            created_span: span,
            last_use_point: point,
        });
        self.borrows.len() - 1
    }

    /// Look up the `this` mutability of a method for implicit receiver
    /// borrows at call sites.
    fn method_this(&self, receiver: &Type, name: &str) -> Option<bool> {
        let head = self
            .ctx
            .shape_of(receiver)
            .peel_references()
            .head_name()?
            .to_string();
        let inherent: Option<MethodDef> = self.ctx.definitions.inherent_method(&head, name);
        if let Some(method) = inherent {
            return method.this_param;
        }
        let candidates = self.ctx.definitions.behavior_methods_for(&head, name);
        candidates.first().and_then(|(_, method)| method.this_param)
    }

    // ---- expression walk ---------------------------------------------

    /// Walk an expression in evaluation order. `consume` marks value
    /// positions (call arguments, initializers, returns); affine roots
    /// used there move. The returned indices are borrows the resulting
    /// value keeps alive.
    fn walk_expr(
        &mut self,
        expression: &Expression<TypeInformation>,
        analysis: &mut OwnershipAnalysis,
        consume: bool,
    ) -> Vec<usize> {
        match expression {
            Expression::Literal(_) | Expression::Error(..) => vec![],
            Expression::Path(path) => {
                if path.segments.len() == 1 {
                    if let Some(index) = self.lookup(&path.segments[0]) {
                        let kind = if consume && !self.bindings[index].copy {
                            UseKind::Move
                        } else {
                            UseKind::Read
                        };
                        self.use_binding(index, kind, path.position);
                        return self.holders.get(&index).cloned().unwrap_or_default();
                    }
                }
                vec![]
            }
            Expression::Interpolation(interp) => {
                for hole in &interp.holes {
                    self.walk_expr(hole, analysis, false);
                }
                vec![]
            }
            Expression::Unary(unary) => {
                self.walk_expr(&unary.operand, analysis, false);
                vec![]
            }
            Expression::Binary(binary) => {
                self.walk_expr(&binary.left, analysis, false);
                self.walk_expr(&binary.right, analysis, false);
                vec![]
            }
            Expression::Borrow(borrow) => {
                // Walk index sub-expressions inside the place first.
                self.walk_place_subexpressions(&borrow.target, analysis);
                match self.root_of_place(&borrow.target) {
                    Some((root, path)) => {
                        let index =
                            self.record_borrow(root, path, borrow.mutable, borrow.position);
                        vec![index]
                    }
                    None => {
                        self.walk_expr(&borrow.target, analysis, false);
                        vec![]
                    }
                }
            }
            Expression::Deref(deref) => self.walk_expr(&deref.target, analysis, false),
            Expression::Call(call) => {
                self.walk_expr(&call.callee, analysis, false);
                for argument in &call.arguments {
                    self.walk_expr(argument, analysis, true);
                }
                vec![]
            }
            Expression::MethodCall(call) => {
                let receiver_type = expression_info(&call.receiver).resolved();
                let this = self.method_this(&receiver_type, &call.method.name);
                self.walk_place_subexpressions(&call.receiver, analysis);
                match (this, self.root_of_place(&call.receiver)) {
                    (Some(mutable), Some((root, path))) => {
                        // Receiver of a `this` method is an implicit
                        // borrow for the duration of the call.
                        if matches!(receiver_type, Type::Reference { .. }) {
                            // Calling through an existing reference uses
                            // the reference, extending its borrows.
                            self.use_binding(root, UseKind::Read, call.receiver.position());
                        } else {
                            self.record_borrow(root, path, mutable, call.receiver.position());
                        }
                    }
                    _ => {
                        let receiver_consumed = this.is_none()
                            && !is_copy(&receiver_type)
                            && !matches!(receiver_type, Type::Reference { .. });
                        self.walk_expr(&call.receiver, analysis, receiver_consumed);
                    }
                }
                for argument in &call.arguments {
                    self.walk_expr(argument, analysis, true);
                }
                vec![]
            }
            Expression::FieldAccess(_) | Expression::Index(_) => {
                self.walk_place_subexpressions(expression, analysis);
                if let Some((root, _)) = self.root_of_place(expression) {
                    let field_type = expression_info(expression).resolved();
                    let kind = if consume && !is_copy(&field_type) {
                        // Moving a field out consumes the whole owner for
                        // this analysis' purposes.
                        UseKind::Move
                    } else {
                        UseKind::Read
                    };
                    self.use_binding(root, kind, expression.position());
                }
                vec![]
            }
            Expression::Tuple(tuple) => {
                for element in &tuple.elements {
                    self.walk_expr(element, analysis, true);
                }
                vec![]
            }
            Expression::Array(ArrayLiteral::List { elements, .. }) => {
                for element in elements {
                    self.walk_expr(element, analysis, true);
                }
                vec![]
            }
            Expression::Array(ArrayLiteral::Repeat { value, length, .. }) => {
                self.walk_expr(value, analysis, true);
                self.walk_expr(length, analysis, false);
                vec![]
            }
            Expression::StructInit(init) => {
                for field in &init.fields {
                    self.walk_expr(&field.value, analysis, true);
                }
                vec![]
            }
            Expression::If(if_expr) => {
                self.walk_expr(&if_expr.condition, analysis, false);
                // Conservative join: a move in either branch counts.
                let borrows_then = self.walk_expr(&if_expr.then_branch, analysis, consume);
                let mut result = borrows_then;
                if let Some(else_branch) = &if_expr.else_branch {
                    result.extend(self.walk_expr(else_branch, analysis, consume));
                }
                result
            }
            Expression::When(when) => {
                let scrutinee_type = expression_info(&when.scrutinee).resolved();
                self.walk_expr(&when.scrutinee, analysis, !is_copy(&scrutinee_type));
                let mut result = vec![];
                for arm in &when.arms {
                    self.enter_scope(false);
                    self.declare_pattern_binders(&arm.pattern);
                    result.extend(self.walk_expr(&arm.value, analysis, consume));
                    self.exit_scope_untracked();
                }
                result
            }
            Expression::Block(block) => {
                self.walk_block(block, analysis, consume);
                vec![]
            }
            Expression::Closure(closure) => self.walk_closure(closure, analysis),
            Expression::Range(range) => {
                self.walk_expr(&range.low, analysis, false);
                self.walk_expr(&range.high, analysis, false);
                vec![]
            }
            Expression::Await(await_expr) => self.walk_expr(&await_expr.target, analysis, consume),
            Expression::Propagate(propagate) => {
                self.walk_expr(&propagate.target, analysis, true)
            }
            Expression::Cast(cast) => {
                self.walk_expr(&cast.value, analysis, false);
                vec![]
            }
        }
    }

    /// Index expressions nested inside a place are ordinary reads.
    fn walk_place_subexpressions(
        &mut self,
        place: &Expression<TypeInformation>,
        analysis: &mut OwnershipAnalysis,
    ) {
        match place {
            Expression::FieldAccess(access) => {
                self.walk_place_subexpressions(&access.receiver, analysis)
            }
            Expression::Index(index) => {
                self.walk_place_subexpressions(&index.receiver, analysis);
                self.walk_expr(&index.index, analysis, false);
            }
            _ => {}
        }
    }

    fn declare_pattern_binders(&mut self, pattern: &Pattern<TypeInformation>) {
        match pattern {
            Pattern::Binding(binding) => {
                self.declare(
                    &binding.name.name,
                    &binding.name.info.resolved(),
                    binding.name.position,
                    false,
                );
            }
            Pattern::EnumVariant(variant) => {
                for sub in &variant.payload {
                    self.declare_pattern_binders(sub);
                }
            }
            Pattern::Tuple(tuple) => {
                for sub in &tuple.elements {
                    self.declare_pattern_binders(sub);
                }
            }
            Pattern::Struct(struct_pattern) => {
                for field in &struct_pattern.fields {
                    self.declare_pattern_binders(&field.pattern);
                }
            }
            Pattern::Array(array) => {
                for sub in &array.elements {
                    self.declare_pattern_binders(sub);
                }
                if let Some(rest) = &array.rest {
                    self.declare(&rest.name, &rest.info.resolved(), rest.position, false);
                }
            }
            Pattern::Or(or) => {
                // Alternatives bind the same names; the first declares.
                if let Some(first) = or.alternatives.first() {
                    self.declare_pattern_binders(first);
                }
            }
            Pattern::Wildcard(_) | Pattern::Literal(_) | Pattern::Range(_) => {}
        }
    }

    // ---- closures -----------------------------------------------------

    /// Returns the capture borrows so a binding holding the closure
    /// keeps them alive (non-lexically) through its own uses.
    fn walk_closure(
        &mut self,
        closure: &Closure<TypeInformation>,
        analysis: &mut OwnershipAnalysis,
    ) -> Vec<usize> {
        let mut locals: HashSet<String> = closure
            .parameters
            .iter()
            .map(|p| p.name.name.clone())
            .collect();
        let mut free = vec![];
        collect_free_variables(&closure.body, &mut locals, &mut free);

        // The body's own uses happen through the environment, so they
        // are walked before the capture borrows exist; otherwise every
        // body read of an exclusively captured variable would look like
        // an owner use inside its own borrow region.
        self.enter_scope(false);
        for parameter in &closure.parameters {
            self.declare(
                &parameter.name.name,
                &parameter.name.info.resolved(),
                parameter.name.position,
                true,
            );
        }
        self.walk_expr(&closure.body, analysis, false);
        self.exit_scope_untracked();

        let mut captures = vec![];
        let mut capture_borrows = vec![];
        for (name, mutated) in dedupe_free(free) {
            let Some(index) = self.lookup(&name) else {
                continue;
            };
            let mode = if closure.transfer {
                CaptureMode::Move
            } else if mutated {
                CaptureMode::Exclusive
            } else {
                CaptureMode::Shared
            };
            match mode {
                CaptureMode::Move => {
                    let kind = if self.bindings[index].copy {
                        UseKind::Read
                    } else {
                        UseKind::Move
                    };
                    self.use_binding(index, kind, closure.position);
                }
                CaptureMode::Shared => {
                    capture_borrows.push(self.record_borrow(
                        index,
                        vec![],
                        false,
                        closure.position,
                    ));
                }
                CaptureMode::Exclusive => {
                    capture_borrows.push(self.record_borrow(
                        index,
                        vec![],
                        true,
                        closure.position,
                    ));
                }
            }
            captures.push(Capture { name, mode });
        }
        analysis.captures.insert(closure.id, captures);
        capture_borrows
    }

    // ---- statements and blocks ---------------------------------------

    fn enter_scope(&mut self, is_loop_body: bool) {
        self.scopes.push(ScopeFrame {
            bindings: vec![],
            is_loop_body,
        });
    }

    /// Pop a scope without computing drops (closure bodies, when arms —
    /// their drops belong to the enclosing structures).
    fn exit_scope_untracked(&mut self) {
        let frame = self.scopes.pop().expect("scope stack is never empty");
        for index in frame.bindings {
            let name = self.bindings[index].name.clone();
            if let Some(stack) = self.by_name.get_mut(&name) {
                stack.pop();
            }
        }
    }

    /// Bindings of the given scopes still owned here, innermost first,
    /// reverse declaration order within each scope.
    fn live_drops(&self, frames: &[ScopeFrame]) -> Vec<String> {
        let mut names = vec![];
        for frame in frames.iter().rev() {
            for index in frame.bindings.iter().rev() {
                let binding = &self.bindings[*index];
                if binding.needs_drop && !binding.is_param && !self.moved.contains_key(index) {
                    names.push(binding.name.clone());
                }
            }
        }
        names
    }

    fn walk_block(
        &mut self,
        block: &Block<TypeInformation>,
        analysis: &mut OwnershipAnalysis,
        consume_tail: bool,
    ) {
        self.enter_scope(false);
        for statement in &block.statements {
            self.walk_statement(statement, analysis, consume_tail);
        }

        // Fall-through edge: drop what this scope still owns.
        let frame = self.scopes.last().expect("scope stack is never empty");
        let drops = self.live_drops(std::slice::from_ref(frame));
        if !drops.is_empty() {
            analysis.drops.insert(block.id, drops);
        }
        self.exit_scope_untracked();
    }

    fn walk_statement(
        &mut self,
        statement: &Statement<TypeInformation>,
        analysis: &mut OwnershipAnalysis,
        consume_tail: bool,
    ) {
        match statement {
            Statement::Let(let_stmt) => {
                let carried = self.walk_expr(&let_stmt.value, analysis, true);
                let index = self.declare(
                    &let_stmt.name.name,
                    &let_stmt.name.info.resolved(),
                    let_stmt.name.position,
                    false,
                );
                if !carried.is_empty() {
                    self.holders.insert(index, carried);
                }
            }
            Statement::Assignment(assignment) => {
                self.walk_expr(&assignment.value, analysis, true);
                self.walk_place_subexpressions(&assignment.target, analysis);
                if let Some((root, _)) = self.root_of_place(&assignment.target) {
                    self.use_binding(root, UseKind::Write, assignment.target.position());
                } else {
                    self.walk_expr(&assignment.target, analysis, false);
                }
            }
            Statement::Return(ret) => {
                if let Some(value) = &ret.value {
                    self.check_dangling_return(value);
                    self.walk_expr(value, analysis, true);
                }
                let frames: Vec<_> = self.scopes.iter().collect();
                let drops = {
                    let mut names = vec![];
                    for frame in frames.iter().rev() {
                        for index in frame.bindings.iter().rev() {
                            let binding = &self.bindings[*index];
                            if binding.needs_drop && !self.moved.contains_key(index) {
                                names.push(binding.name.clone());
                            }
                        }
                    }
                    names
                };
                if !drops.is_empty() {
                    analysis.drops.insert(ret.id, drops);
                }
            }
            Statement::Break(break_stmt) => {
                let drops = self.drops_to_loop_boundary();
                if !drops.is_empty() {
                    analysis.drops.insert(break_stmt.id, drops);
                }
            }
            Statement::Continue(continue_stmt) => {
                let drops = self.drops_to_loop_boundary();
                if !drops.is_empty() {
                    analysis.drops.insert(continue_stmt.id, drops);
                }
            }
            Statement::WhileLoop(while_loop) => {
                self.walk_expr(&while_loop.condition, analysis, false);
                self.walk_loop_body(&while_loop.body, analysis);
            }
            Statement::Loop(loop_stmt) => {
                self.walk_loop_body(&loop_stmt.body, analysis);
            }
            Statement::ForLoop(for_loop) => {
                self.walk_expr(&for_loop.iterable, analysis, false);
                self.enter_scope(true);
                self.declare(
                    &for_loop.binder.name,
                    &for_loop.binder.info.resolved(),
                    for_loop.binder.position,
                    false,
                );
                let start = self.point;
                for statement in &for_loop.body.statements {
                    self.walk_statement(statement, analysis, false);
                }
                self.loop_regions.push((start, self.point));
                let frame = self.scopes.last().expect("scope stack is never empty");
                let drops = self.live_drops(std::slice::from_ref(frame));
                if !drops.is_empty() {
                    analysis.drops.insert(for_loop.body.id, drops);
                }
                self.exit_scope_untracked();
            }
            Statement::Expression(expression) => {
                self.walk_expr(expression, analysis, false);
            }
            Statement::YieldingExpression(expression) => {
                self.walk_expr(expression, analysis, consume_tail);
            }
            Statement::Error(_) => {}
        }
    }

    fn walk_loop_body(&mut self, body: &Block<TypeInformation>, analysis: &mut OwnershipAnalysis) {
        let start = self.point;
        self.loop_stack.push(start);
        self.enter_scope(true);
        for statement in &body.statements {
            self.walk_statement(statement, analysis, false);
        }
        let frame = self.scopes.last().expect("scope stack is never empty");
        let drops = self.live_drops(std::slice::from_ref(frame));
        if !drops.is_empty() {
            analysis.drops.insert(body.id, drops);
        }
        self.exit_scope_untracked();
        self.loop_stack.pop();
        self.loop_regions.push((start, self.point));
    }

    /// Scopes between here and the innermost loop body, for `break` and
    /// `continue` drop preludes.
    fn drops_to_loop_boundary(&self) -> Vec<String> {
        let mut frames: Vec<&ScopeFrame> = vec![];
        for frame in self.scopes.iter().rev() {
            frames.push(frame);
            if frame.is_loop_body {
                break;
            }
        }
        let mut names = vec![];
        for frame in &frames {
            for index in frame.bindings.iter().rev() {
                let binding = &self.bindings[*index];
                if binding.needs_drop && !binding.is_param && !self.moved.contains_key(index) {
                    names.push(binding.name.clone());
                }
            }
        }
        names
    }

    /// A returned reference must trace to a parameter; a borrow of a
    /// local (or a binding holding one) cannot leave the function.
    fn check_dangling_return(&mut self, value: &Expression<TypeInformation>) {
        match value {
            Expression::Borrow(borrow) => {
                if let Some((root, _)) = self.root_of_place(&borrow.target) {
                    if !self.bindings[root].is_param {
                        self.session.emit(
                            OwnershipError::DanglingReturn(
                                DanglingReturn {
                                    name: self.bindings[root].name.clone(),
                                    local_declared: self.bindings[root].span,
                                },
                                borrow.position,
                            )
                            .to_diagnostic(),
                        );
                    }
                }
            }
            Expression::Path(path) if path.segments.len() == 1 => {
                if let Some(index) = self.lookup(&path.segments[0]) {
                    if let Some(borrow_indices) = self.holders.get(&index) {
                        for borrow_index in borrow_indices.clone() {
                            let root = self.borrows[borrow_index].root;
                            if !self.bindings[root].is_param {
                                self.session.emit(
                                    OwnershipError::DanglingReturn(
                                        DanglingReturn {
                                            name: self.bindings[root].name.clone(),
                                            local_declared: self.bindings[root].span,
                                        },
                                        path.position,
                                    )
                                    .to_diagnostic(),
                                );
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // ---- conflict reporting ------------------------------------------

    fn report_conflicts(&self, borrows: &[BorrowRecord]) {
        for conflict in liveness::find_conflicts(borrows) {
            match conflict {
                liveness::Conflict::DoubleExclusive { first, second } => {
                    let name = self.bindings[borrows[second].root].name.clone();
                    self.session.emit(
                        OwnershipError::DoubleBorrow(
                            DoubleBorrow {
                                name,
                                first_borrow: borrows[first].created_span,
                            },
                            borrows[second].created_span,
                        )
                        .to_diagnostic(),
                    );
                }
                liveness::Conflict::SharedVsExclusive { exclusive, other } => {
                    // Report at the later borrow; the earlier one is the
                    // note.
                    let (at, note) = if borrows[exclusive].created_point
                        > borrows[other].created_point
                    {
                        (exclusive, other)
                    } else {
                        (other, exclusive)
                    };
                    let name = self.bindings[borrows[at].root].name.clone();
                    self.session.emit(
                        OwnershipError::ExclusiveAliased(
                            ExclusiveAliased {
                                name,
                                first_borrow: borrows[note].created_span,
                            },
                            borrows[at].created_span,
                        )
                        .to_diagnostic(),
                    );
                }
            }
        }

        // Owner uses inside an exclusive region suspend the owner.
        for borrow in borrows.iter().filter(|b| b.mutable) {
            if let Some(events) = self.events.get(&borrow.root) {
                for event in liveness::owner_uses_during(borrow, events) {
                    match event.kind {
                        UseKind::Move => {
                            self.session.emit(
                                OwnershipError::LifetimeTooShort(
                                    LifetimeTooShort {
                                        name: self.bindings[borrow.root].name.clone(),
                                    },
                                    event.span,
                                )
                                .to_diagnostic(),
                            );
                        }
                        UseKind::Read | UseKind::Write => {
                            self.session.emit(
                                OwnershipError::MutableAliasing(
                                    MutableAliasing {
                                        name: self.bindings[borrow.root].name.clone(),
                                        borrow_at: borrow.created_span,
                                    },
                                    event.span,
                                )
                                .to_diagnostic(),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Free-variable collection for capture inference. `locals` accumulates
/// names bound inside the closure; everything else read or written is
/// free.
fn collect_free_variables(
    expression: &Expression<TypeInformation>,
    locals: &mut HashSet<String>,
    free: &mut Vec<(String, bool)>,
) {
    match expression {
        Expression::Path(path) => {
            if path.segments.len() == 1 && !locals.contains(&path.segments[0]) {
                free.push((path.segments[0].clone(), false));
            }
        }
        Expression::Borrow(borrow) => {
            if let Expression::Path(path) = &borrow.target {
                if path.segments.len() == 1 && !locals.contains(&path.segments[0]) {
                    free.push((path.segments[0].clone(), borrow.mutable));
                    return;
                }
            }
            collect_free_variables(&borrow.target, locals, free);
        }
        Expression::Block(block) => {
            for statement in &block.statements {
                collect_free_statement(statement, locals, free);
            }
        }
        Expression::Closure(closure) => {
            let mut inner = locals.clone();
            for parameter in &closure.parameters {
                inner.insert(parameter.name.name.clone());
            }
            collect_free_variables(&closure.body, &mut inner, free);
        }
        Expression::Interpolation(interp) => {
            for hole in &interp.holes {
                collect_free_variables(hole, locals, free);
            }
        }
        Expression::Unary(e) => collect_free_variables(&e.operand, locals, free),
        Expression::Binary(e) => {
            collect_free_variables(&e.left, locals, free);
            collect_free_variables(&e.right, locals, free);
        }
        Expression::Call(e) => {
            collect_free_variables(&e.callee, locals, free);
            for argument in &e.arguments {
                collect_free_variables(argument, locals, free);
            }
        }
        Expression::MethodCall(e) => {
            collect_free_variables(&e.receiver, locals, free);
            for argument in &e.arguments {
                collect_free_variables(argument, locals, free);
            }
        }
        Expression::FieldAccess(e) => collect_free_variables(&e.receiver, locals, free),
        Expression::Index(e) => {
            collect_free_variables(&e.receiver, locals, free);
            collect_free_variables(&e.index, locals, free);
        }
        Expression::Tuple(e) => {
            for element in &e.elements {
                collect_free_variables(element, locals, free);
            }
        }
        Expression::Array(ArrayLiteral::List { elements, .. }) => {
            for element in elements {
                collect_free_variables(element, locals, free);
            }
        }
        Expression::Array(ArrayLiteral::Repeat { value, length, .. }) => {
            collect_free_variables(value, locals, free);
            collect_free_variables(length, locals, free);
        }
        Expression::StructInit(e) => {
            for field in &e.fields {
                collect_free_variables(&field.value, locals, free);
            }
        }
        Expression::If(e) => {
            collect_free_variables(&e.condition, locals, free);
            collect_free_variables(&e.then_branch, locals, free);
            if let Some(else_branch) = &e.else_branch {
                collect_free_variables(else_branch, locals, free);
            }
        }
        Expression::When(e) => {
            collect_free_variables(&e.scrutinee, locals, free);
            for arm in &e.arms {
                let mut inner = locals.clone();
                for name in arm.pattern.bound_names() {
                    inner.insert(name.to_string());
                }
                collect_free_variables(&arm.value, &mut inner, free);
            }
        }
        Expression::Range(e) => {
            collect_free_variables(&e.low, locals, free);
            collect_free_variables(&e.high, locals, free);
        }
        Expression::Deref(e) => collect_free_variables(&e.target, locals, free),
        Expression::Await(e) => collect_free_variables(&e.target, locals, free),
        Expression::Propagate(e) => collect_free_variables(&e.target, locals, free),
        Expression::Cast(e) => collect_free_variables(&e.value, locals, free),
        Expression::Literal(_) | Expression::Error(..) => {}
    }
}

fn collect_free_statement(
    statement: &Statement<TypeInformation>,
    locals: &mut HashSet<String>,
    free: &mut Vec<(String, bool)>,
) {
    match statement {
        Statement::Let(let_stmt) => {
            collect_free_variables(&let_stmt.value, locals, free);
            locals.insert(let_stmt.name.name.clone());
        }
        Statement::Assignment(assignment) => {
            collect_free_variables(&assignment.value, locals, free);
            if let Expression::Path(path) = &assignment.target {
                if path.segments.len() == 1 && !locals.contains(&path.segments[0]) {
                    free.push((path.segments[0].clone(), true));
                    return;
                }
            }
            collect_free_variables(&assignment.target, locals, free);
        }
        Statement::Return(ret) => {
            if let Some(value) = &ret.value {
                collect_free_variables(value, locals, free);
            }
        }
        Statement::Break(_) | Statement::Continue(_) | Statement::Error(_) => {}
        Statement::WhileLoop(while_loop) => {
            collect_free_variables(&while_loop.condition, locals, free);
            for statement in &while_loop.body.statements {
                collect_free_statement(statement, locals, free);
            }
        }
        Statement::Loop(loop_stmt) => {
            for statement in &loop_stmt.body.statements {
                collect_free_statement(statement, locals, free);
            }
        }
        Statement::ForLoop(for_loop) => {
            collect_free_variables(&for_loop.iterable, locals, free);
            let mut inner = locals.clone();
            inner.insert(for_loop.binder.name.clone());
            for statement in &for_loop.body.statements {
                collect_free_statement(statement, &mut inner, free);
            }
        }
        Statement::Expression(e) | Statement::YieldingExpression(e) => {
            collect_free_variables(e, locals, free)
        }
    }
}

/// Merge duplicate free-variable mentions, keeping "mutated" sticky.
fn dedupe_free(free: Vec<(String, bool)>) -> Vec<(String, bool)> {
    let mut order: Vec<String> = vec![];
    let mut mutated: HashMap<String, bool> = HashMap::new();
    for (name, is_mut) in free {
        if !mutated.contains_key(&name) {
            order.push(name.clone());
        }
        let entry = mutated.entry(name).or_insert(false);
        *entry = *entry || is_mut;
    }
    order
        .into_iter()
        .map(|name| {
            let is_mut = mutated[&name];
            (name, is_mut)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::test_helpers::check_source;

    fn analyze_source(src: &str) -> (Session, OwnershipAnalysis) {
        let (session, checked) = check_source(src);
        assert!(
            !session.has_errors(),
            "type errors before ownership analysis: {:?}",
            session.diagnostics.entries()
        );
        let analysis = analyze(&session, &checked);
        (session, analysis)
    }

    fn codes(session: &Session) -> Vec<String> {
        session
            .diagnostics
            .entries()
            .iter()
            .map(|d| d.code.clone())
            .collect()
    }

    #[test]
    fn test_exclusive_then_shared_borrow_rejected() {
        let (session, _) = analyze_source(
            "func f() { let mut v = \"x\"; let r = &mut v; let r2 = &v; r.push('a'); }",
        );
        assert!(codes(&session).contains(&"E-BORROW-EXCLUSIVE-ALIASED".to_string()));
    }

    #[test]
    fn test_nll_allows_disjoint_borrow_regions() {
        let (session, _) = analyze_source(
            "func f() uses io {\n\
                 let mut v = \"x\";\n\
                 let r = &v;\n\
                 print(*r);\n\
                 let r2 = &mut v;\n\
                 r2.push('a');\n\
             }",
        );
        assert!(!session.has_errors(), "{:?}", codes(&session));
    }

    #[test]
    fn test_use_after_move_rejected() {
        let (session, _) = analyze_source(
            "func take(s: Str) { }\n\
             func f() { let s = \"x\"; take(s); take(s); }",
        );
        assert!(codes(&session).contains(&"E-MOVE-USE-AFTER".to_string()));
    }

    #[test]
    fn test_copy_scalars_never_move() {
        let (session, _) = analyze_source(
            "func take(n: I32) { }\n\
             func f() { let n = 1; take(n); take(n); }",
        );
        assert!(!session.has_errors(), "{:?}", codes(&session));
    }

    #[test]
    fn test_double_exclusive_borrow_rejected() {
        let (session, _) = analyze_source(
            "func f() { let mut v = \"x\"; let a = &mut v; let b = &mut v; a.push('x'); b.push('y'); }",
        );
        assert!(codes(&session).contains(&"E-BORROW-DOUBLE-EXCLUSIVE".to_string()));
    }

    #[test]
    fn test_owner_suspended_during_exclusive_borrow() {
        let (session, _) = analyze_source(
            "func g(s: ref Str) -> I64 { return 0 }\n\
             func f() { let mut v = \"x\"; let r = &mut v; g(&v); r.push('a'); }",
        );
        // The shared borrow for the call aliases the live exclusive one.
        assert!(codes(&session)
            .iter()
            .any(|code| code.starts_with("E-BORROW")));
    }

    #[test]
    fn test_dangling_return_rejected() {
        let (session, _) = analyze_source(
            "func f() -> ref Str { let local = \"x\"; return &local }",
        );
        assert!(codes(&session).contains(&"E-BORROW-DANGLING-RETURN".to_string()));
    }

    #[test]
    fn test_returning_parameter_reference_is_fine() {
        let (session, _) = analyze_source("func f(s: ref Str) -> ref Str { return s }");
        assert!(!session.has_errors(), "{:?}", codes(&session));
    }

    #[test]
    fn test_drop_scheduled_for_owned_string() {
        let (_, analysis) = analyze_source("func f() { let s = \"x\"; let n = 1; }");
        let drops: Vec<_> = analysis.drops.values().cloned().collect();
        assert_eq!(drops, vec![vec!["s".to_string()]]);
    }

    #[test]
    fn test_drops_in_reverse_declaration_order() {
        let (_, analysis) =
            analyze_source("func f() { let a = \"a\"; let b = \"b\"; }");
        let drops: Vec<_> = analysis.drops.values().cloned().collect();
        assert_eq!(drops, vec![vec!["b".to_string(), "a".to_string()]]);
    }

    #[test]
    fn test_moved_binding_not_dropped() {
        let (_, analysis) = analyze_source(
            "func f() -> Str { let s = \"x\"; return s }",
        );
        // `s` is consumed by the return; nothing to drop on any edge.
        assert!(analysis.drops.values().all(|names| !names.contains(&"s".to_string())));
    }

    #[test]
    fn test_break_gets_its_own_drop_prelude() {
        let (_, analysis) = analyze_source(
            "func f() { loop { let s = \"x\"; break; } }",
        );
        assert!(analysis
            .drops
            .values()
            .any(|names| names.contains(&"s".to_string())));
    }

    #[test]
    fn test_closure_capture_modes() {
        let (_, analysis) = analyze_source(
            "func f() -> I64 { let s = \"hi\"; let get = do() s.len(); return get() }",
        );
        let captures: Vec<_> = analysis.captures.values().flatten().collect();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].name, "s");
        assert_eq!(captures[0].mode, CaptureMode::Shared);
    }

    #[test]
    fn test_transfer_closure_moves_captures() {
        let (session, analysis) = analyze_source(
            "func f() { let s = \"hi\"; let give = transfer do() s.len(); give(); }",
        );
        assert!(!session.has_errors());
        let captures: Vec<_> = analysis.captures.values().flatten().collect();
        assert_eq!(captures[0].mode, CaptureMode::Move);
    }

    #[test]
    fn test_mutating_capture_is_exclusive() {
        let (_, analysis) = analyze_source(
            "func f() { let mut n = 1; let bump = do() { n = n + 1; }; bump(); }",
        );
        let captures: Vec<_> = analysis.captures.values().flatten().collect();
        assert_eq!(captures[0].mode, CaptureMode::Exclusive);
    }

    #[test]
    fn test_borrow_held_across_loop_conflicts() {
        let (session, _) = analyze_source(
            "func f() {\n\
                 let mut v = \"x\";\n\
                 let r = &v;\n\
                 loop { let n = r.len(); v.push('a'); break; }\n\
             }",
        );
        assert!(codes(&session)
            .iter()
            .any(|code| code.starts_with("E-BORROW")));
    }

    #[test]
    fn test_disjoint_struct_fields_borrow_independently() {
        let (session, _) = analyze_source(
            "type Pair = { left: Str, right: Str };\n\
             func f(p: Pair) {\n\
                 let mut q = p;\n\
                 let a = &mut q.left;\n\
                 let b = &mut q.right;\n\
                 a.push('x');\n\
                 b.push('y');\n\
             }",
        );
        assert!(!session.has_errors(), "{:?}", codes(&session));
    }
}
