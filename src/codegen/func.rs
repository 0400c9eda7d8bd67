//! Function-body emission.
//!
//! Every local lives in an entry-block alloca (hoisted so `mem2reg` can
//! promote them), bracketed by `lifetime.start`/`lifetime.end` markers.
//! Loops take the canonical `preheader → header → body → latch → header`
//! shape with `!llvm.loop` metadata on the backedge. `if`/`when` arms
//! store into a result alloca and a merge block loads it; when every arm
//! terminates, no merge is emitted. Drop schedules computed by the
//! ownership pass are emitted verbatim on their edges.

use std::collections::{BTreeMap, HashMap};

use crate::diagnostics::Diagnostic;
use crate::ir::{IrArm, IrExpr, IrFunc, IrPattern};
use crate::ownership::state::{Capture, CaptureMode};
use crate::parser::ast::{BinaryOp, PatternConst, UnaryOp};
use crate::session::Session;
use crate::typechecker::monomorph;
use crate::typechecker::types::{FloatKind, IntKind, Type};

use super::context::{llvm_symbol, runtime_symbol, ModuleState};
use super::types::Layout;

#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Reg { repr: String, ty: String },
}

impl Value {
    fn reg(repr: impl Into<String>, ty: impl Into<String>) -> Value {
        Value::Reg {
            repr: repr.into(),
            ty: ty.into(),
        }
    }

    fn repr(&self) -> &str {
        match self {
            Value::Unit => "0",
            Value::Reg { repr, .. } => repr,
        }
    }

    fn lty(&self) -> &str {
        match self {
            Value::Unit => "void",
            Value::Reg { ty, .. } => ty,
        }
    }
}

#[derive(Clone)]
struct LocalSlot {
    ptr: String,
    llvm_ty: String,
    ty: Type,
}

/// A deferred auxiliary function: a closure body or a function-pointer
/// thunk, emitted after the current function completes.
pub enum AuxJob {
    Closure {
        symbol: String,
        params: Vec<(String, Type)>,
        captures: Vec<(Capture, Type)>,
        body: IrExpr,
        return_type: Type,
        subst: HashMap<String, Type>,
    },
    Thunk {
        symbol: String,
        target: String,
        params: Vec<Type>,
        return_type: Type,
    },
}

pub struct FunctionEmitter<'a> {
    pub session: &'a Session,
    pub layout: &'a Layout<'a>,
    pub state: &'a mut ModuleState,
    pub symbols: &'a BTreeMap<String, String>,
    pub funcs: &'a BTreeMap<String, IrFunc>,
    /// Constant name → `(global symbol, llvm type)`.
    pub consts: &'a BTreeMap<String, (String, String)>,
    pub jobs: &'a mut Vec<AuxJob>,
    pub subst: HashMap<String, Type>,

    allocas: Vec<String>,
    body: Vec<String>,
    next_reg: u32,
    next_label: u32,
    locals: HashMap<String, LocalSlot>,
    /// `(break target, continue target)` per enclosing loop.
    loop_stack: Vec<(String, String)>,
    loop_metadata: Vec<u32>,
    terminated: bool,

    return_type: Type,
    is_async: bool,
    stable_id: String,
    span: crate::source::Span,
}

impl<'a> FunctionEmitter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: &'a Session,
        layout: &'a Layout<'a>,
        state: &'a mut ModuleState,
        symbols: &'a BTreeMap<String, String>,
        funcs: &'a BTreeMap<String, IrFunc>,
        consts: &'a BTreeMap<String, (String, String)>,
        jobs: &'a mut Vec<AuxJob>,
        subst: HashMap<String, Type>,
        return_type: Type,
        is_async: bool,
        stable_id: String,
        span: crate::source::Span,
    ) -> Self {
        FunctionEmitter {
            session,
            layout,
            state,
            symbols,
            funcs,
            consts,
            jobs,
            subst,
            allocas: vec![],
            body: vec![],
            next_reg: 0,
            next_label: 0,
            locals: HashMap::new(),
            loop_stack: vec![],
            loop_metadata: vec![],
            terminated: false,
            return_type,
            is_async,
            stable_id,
            span,
        }
    }

    // ---- plumbing ----------------------------------------------------

    fn fresh(&mut self) -> String {
        let reg = format!("%t{}", self.next_reg);
        self.next_reg += 1;
        reg
    }

    fn label(&mut self, hint: &str) -> String {
        let label = format!("{hint}{}", self.next_label);
        self.next_label += 1;
        label
    }

    fn line(&mut self, text: impl Into<String>) {
        self.body.push(format!("  {}", text.into()));
    }

    fn begin_block(&mut self, label: &str) {
        self.body.push(format!("{label}:"));
        self.terminated = false;
    }

    fn terminate(&mut self, text: impl Into<String>) {
        if !self.terminated {
            self.line(text);
            self.terminated = true;
        }
    }

    /// Internal invariant violation: a compiler bug, reported with the
    /// nearest span and stable ID, then made unreachable.
    fn internal_error(&mut self, what: &str) -> Value {
        self.session.emit(
            Diagnostic::error("E0900", format!("internal error: {what}"), self.span)
                .with_stable_id(self.stable_id.clone()),
        );
        self.terminate("unreachable");
        Value::Unit
    }

    fn resolve(&self, ty: &Type) -> Type {
        ty.substitute(&self.subst)
    }

    fn lty(&self, ty: &Type) -> String {
        self.layout.llvm_type(&self.resolve(ty))
    }

    fn alloca(&mut self, llvm_ty: &str) -> String {
        let reg = self.fresh();
        self.allocas.push(format!("  {reg} = alloca {llvm_ty}"));
        reg
    }

    fn bind_local(&mut self, name: &str, ty: &Type) -> LocalSlot {
        let resolved = self.resolve(ty);
        let llvm_ty = self.layout.llvm_type(&resolved);
        let storage_ty = if llvm_ty == "void" { "i8" } else { &llvm_ty };
        let ptr = self.alloca(storage_ty);
        self.state.use_runtime("llvm.lifetime.start");
        self.line(format!("call void @llvm.lifetime.start.p0(i64 -1, ptr {ptr})"));
        let slot = LocalSlot {
            ptr,
            llvm_ty: storage_ty.to_string(),
            ty: resolved,
        };
        self.locals.insert(name.to_string(), slot.clone());
        slot
    }

    fn store(&mut self, value: &Value, ptr: &str) {
        if let Value::Reg { repr, ty } = value {
            self.line(format!("store {ty} {repr}, ptr {ptr}"));
        }
    }

    fn load(&mut self, llvm_ty: &str, ptr: &str) -> Value {
        if llvm_ty == "void" {
            return Value::Unit;
        }
        let reg = self.fresh();
        self.line(format!("{reg} = load {llvm_ty}, ptr {ptr}"));
        Value::reg(reg, llvm_ty)
    }

    /// Spill a value into fresh stack storage and return the pointer.
    fn spill(&mut self, value: &Value) -> String {
        let ptr = self.alloca(value.lty());
        self.store(value, &ptr);
        ptr
    }

    fn bool_of(&mut self, value: &Value) -> String {
        let reg = self.fresh();
        self.line(format!("{reg} = icmp ne i32 {}, 0", value.repr()));
        reg
    }

    fn widen_i1(&mut self, i1_reg: &str) -> Value {
        let reg = self.fresh();
        self.line(format!("{reg} = zext i1 {i1_reg} to i32"));
        Value::reg(reg, "i32")
    }

    // ---- function shells ---------------------------------------------

    /// Emit a full `define` for this function and return its text.
    /// `env_captures` is `Some` for closure implementation functions,
    /// which take the environment pointer as their first parameter.
    pub fn emit(
        mut self,
        symbol: &str,
        params: &[(String, Type)],
        body: &IrExpr,
        internal: bool,
        env_captures: Option<&[(Capture, Type)]>,
    ) -> String {
        let resolved_ret = self.resolve(&self.return_type.clone());
        let ret_lty = if self.is_async {
            self.poll_type(&resolved_ret)
        } else {
            self.layout.llvm_type(&resolved_ret)
        };

        let mut sig_params = vec![];
        if env_captures.is_some() {
            sig_params.push("ptr %env".to_string());
        }
        for (name, ty) in params {
            let lty = self.lty(ty);
            let lty = if lty == "void" { "i8".to_string() } else { lty };
            sig_params.push(format!("{lty} %arg.{name}"));
        }

        if let Some(captured) = env_captures {
            self.seed_captures(captured);
        }

        // Parameters are stored into allocas so the body can treat them
        // like any other local.
        for (name, ty) in params {
            let slot = self.bind_local(name, ty);
            let arg_value = Value::reg(format!("%arg.{name}"), slot.llvm_ty.clone());
            self.store(&arg_value, &slot.ptr.clone());
        }

        if self.is_async {
            let state_ptr = self.alloca("i32");
            self.line(format!("store i32 0, ptr {state_ptr}"));
            self.locals.insert(
                "%async.state".to_string(),
                LocalSlot {
                    ptr: state_ptr,
                    llvm_ty: "i32".to_string(),
                    ty: Type::Int(IntKind::I32),
                },
            );
        }

        let tail = self.emit_expr(body);
        if !self.terminated {
            self.emit_return(Some(tail));
        }

        let linkage = if internal { "internal " } else { "" };
        let mut out = format!(
            "define {linkage}{ret_lty} {}({}) {{\n",
            llvm_symbol(symbol),
            sig_params.join(", ")
        );
        out.push_str("entry:\n");
        for alloca in &self.allocas {
            out.push_str(alloca);
            out.push('\n');
        }
        for line in &self.body {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("}\n");

        for id in &self.loop_metadata {
            self.state
                .auxiliary
                .push(format!("!{id} = distinct !{{!{id}}}"));
        }
        out
    }

    fn poll_type(&self, inner: &Type) -> String {
        format!("{{ i32, [{} x i8] }}", self.layout.size_of(inner).max(1))
    }

    fn emit_return(&mut self, value: Option<Value>) {
        let resolved_ret = self.resolve(&self.return_type.clone());
        if self.is_async {
            // Wrap the result as Poll tag 0 (Ready).
            let poll_lty = self.poll_type(&resolved_ret);
            let poll_ptr = self.alloca(&poll_lty);
            let tag_ptr = self.fresh();
            self.line(format!(
                "{tag_ptr} = getelementptr inbounds {poll_lty}, ptr {poll_ptr}, i32 0, i32 0"
            ));
            self.line(format!("store i32 0, ptr {tag_ptr}"));
            if let Some(value @ Value::Reg { .. }) = &value {
                let payload_ptr = self.fresh();
                self.line(format!(
                    "{payload_ptr} = getelementptr inbounds {poll_lty}, ptr {poll_ptr}, i32 0, i32 1"
                ));
                let value = value.clone();
                self.store(&value, &payload_ptr);
            }
            let loaded = self.load(&poll_lty, &poll_ptr.clone());
            self.terminate(format!("ret {poll_lty} {}", loaded.repr()));
            return;
        }

        match (&resolved_ret, value) {
            (Type::Unit | Type::Never, _) => self.terminate("ret void"),
            (_, Some(Value::Reg { repr, ty })) => self.terminate(format!("ret {ty} {repr}")),
            (_, _) => {
                let lty = self.layout.llvm_type(&resolved_ret);
                self.terminate(format!("ret {lty} zeroinitializer"));
            }
        }
    }

    fn emit_drops(&mut self, drops: &[String]) {
        for name in drops {
            let Some(slot) = self.locals.get(name).cloned() else {
                continue;
            };
            let value = self.load(&slot.llvm_ty, &slot.ptr);
            match &slot.ty {
                Type::String => {
                    self.state.use_runtime("tml_str_free");
                    self.line(format!("call void @tml_str_free(ptr {})", value.repr()));
                }
                Type::Named { name, .. } if name == "List" => {
                    self.state.use_runtime("tml_list_free");
                    self.line(format!("call void @tml_list_free(ptr {})", value.repr()));
                }
                Type::Named { name, .. } if name == "File" => {
                    self.state.use_runtime("tml_file_close");
                    self.line(format!("call void @tml_file_close(ptr {})", value.repr()));
                }
                _ => {
                    self.state.use_runtime("tml_drop");
                    self.line(format!("call void @tml_drop(ptr {})", slot.ptr));
                }
            }
            self.state.use_runtime("llvm.lifetime.end");
            self.line(format!(
                "call void @llvm.lifetime.end.p0(i64 -1, ptr {})",
                slot.ptr
            ));
        }
    }

    // ---- places -------------------------------------------------------

    /// Address of a place expression, spilling rvalues to stack storage.
    fn emit_address(&mut self, place: &IrExpr) -> (String, Type) {
        match place {
            IrExpr::Local { name, ty } => match self.locals.get(name) {
                Some(slot) => (slot.ptr.clone(), slot.ty.clone()),
                None => {
                    self.internal_error(&format!("unknown local `{name}`"));
                    ("null".to_string(), self.resolve(ty))
                }
            },
            IrExpr::Field { receiver, name, ty } => {
                let (base, base_ty) = self.emit_address(receiver);
                let resolved_base = self.resolve(&base_ty);
                match resolved_base.peel_references() {
                    Type::Named {
                        name: struct_name,
                        args,
                    } if struct_name == "Range" => {
                        let index = if name == "low" { 0 } else { 1 };
                        let base = self.deref_if_reference(&resolved_base, base);
                        let lty = self.layout.llvm_type(resolved_base.peel_references());
                        let reg = self.fresh();
                        self.line(format!(
                            "{reg} = getelementptr inbounds {lty}, ptr {base}, i32 0, i32 {index}"
                        ));
                        let elem = args
                            .first()
                            .cloned()
                            .unwrap_or(Type::Int(IntKind::I64));
                        (reg, elem)
                    }
                    Type::Named {
                        name: struct_name,
                        args,
                    } => match self.layout.field_index(struct_name, args, name) {
                        Some((index, field_ty)) => {
                            let base = self.deref_if_reference(&resolved_base, base);
                            let lty = self.layout.llvm_type(resolved_base.peel_references());
                            let reg = self.fresh();
                            self.line(format!(
                                "{reg} = getelementptr inbounds {lty}, ptr {base}, i32 0, i32 {index}"
                            ));
                            (reg, field_ty)
                        }
                        None => {
                            self.internal_error(&format!("unknown field `{name}`"));
                            ("null".to_string(), self.resolve(ty))
                        }
                    },
                    _ => {
                        self.internal_error("field access on a non-struct");
                        ("null".to_string(), self.resolve(ty))
                    }
                }
            }
            IrExpr::Index { receiver, index, ty } => {
                let (base, base_ty) = self.emit_address(receiver);
                let resolved_base = self.resolve(&base_ty);
                let index_value = self.emit_expr(index);
                match resolved_base.peel_references() {
                    Type::Array(element, count) => {
                        let base = self.deref_if_reference(&resolved_base, base);
                        let elem_lty = self.layout.llvm_type(element);
                        let reg = self.fresh();
                        self.line(format!(
                            "{reg} = getelementptr inbounds [{count} x {elem_lty}], ptr {base}, i64 0, {} {}",
                            index_value.lty(),
                            index_value.repr()
                        ));
                        (reg, (**element).clone())
                    }
                    Type::Slice(element) => {
                        let base = self.deref_if_reference(&resolved_base, base);
                        let data = self.load("ptr", &base);
                        let elem_lty = self.layout.llvm_type(element);
                        let reg = self.fresh();
                        self.line(format!(
                            "{reg} = getelementptr inbounds {elem_lty}, ptr {}, {} {}",
                            data.repr(),
                            index_value.lty(),
                            index_value.repr()
                        ));
                        (reg, (**element).clone())
                    }
                    _ => {
                        self.internal_error("index into a non-indexable value");
                        ("null".to_string(), self.resolve(ty))
                    }
                }
            }
            IrExpr::Deref { target, ty } => {
                let pointer = self.emit_expr(target);
                (pointer.repr().to_string(), self.resolve(ty))
            }
            other => {
                // Rvalue receiver: materialize it.
                let value = self.emit_expr(other);
                let ptr = self.spill(&value);
                (ptr, self.resolve(&other.ty()))
            }
        }
    }

    /// When the address points at a reference, chase it one level.
    fn deref_if_reference(&mut self, ty: &Type, ptr: String) -> String {
        if matches!(ty, Type::Reference { .. }) {
            let loaded = self.load("ptr", &ptr);
            loaded.repr().to_string()
        } else {
            ptr
        }
    }

    // ---- expressions --------------------------------------------------

    pub fn emit_expr(&mut self, expr: &IrExpr) -> Value {
        match expr {
            IrExpr::Unit => Value::Unit,
            IrExpr::Int { value, ty } => Value::reg(value.to_string(), self.lty(ty)),
            IrExpr::Float { value, ty } => {
                Value::reg(format!("{value:e}"), self.lty(ty))
            }
            IrExpr::Bool(value) => Value::reg(if *value { "1" } else { "0" }, "i32"),
            IrExpr::Char(value) => Value::reg((*value as u32).to_string(), "i32"),
            IrExpr::Str(text) => self.emit_str_literal(text),
            IrExpr::Local { name, ty } => match self.locals.get(name).cloned() {
                Some(slot) => self.load(&slot.llvm_ty, &slot.ptr),
                None => {
                    let _ = ty;
                    self.internal_error(&format!("unknown local `{name}`"))
                }
            },
            IrExpr::Global { name, ty } => {
                if let Some((symbol, lty)) = self.consts.get(name).cloned() {
                    return self.load(&lty, &llvm_symbol(&symbol));
                }
                self.emit_fn_value(name, ty)
            }
            IrExpr::LetBind {
                name,
                ty,
                value,
                ..
            } => {
                let initial = self.emit_expr(value);
                let slot = self.bind_local(name, ty);
                self.store(&initial, &slot.ptr.clone());
                Value::Unit
            }
            IrExpr::Assign { target, value } => {
                let assigned = self.emit_expr(value);
                let (ptr, _) = self.emit_address(target);
                self.store(&assigned, &ptr);
                Value::Unit
            }
            IrExpr::Call { callee, args, ty } => self.emit_call(callee, args, ty),
            IrExpr::DynCall {
                receiver,
                slot,
                args,
                ty,
                ..
            } => self.emit_dyn_call(receiver, *slot, args, ty),
            IrExpr::Binary { op, left, right, ty } => self.emit_binary(*op, left, right, ty),
            IrExpr::Unary { op, operand, ty } => self.emit_unary(*op, operand, ty),
            IrExpr::Block { body, drops, ty } => {
                let mut last = Value::Unit;
                for expr in body {
                    if self.terminated {
                        break;
                    }
                    last = self.emit_expr(expr);
                }
                if !self.terminated {
                    self.emit_drops(drops);
                }
                if matches!(self.resolve(ty), Type::Unit | Type::Never) {
                    Value::Unit
                } else {
                    last
                }
            }
            IrExpr::If {
                condition,
                then_branch,
                else_branch,
                ty,
            } => self.emit_if(condition, then_branch, else_branch.as_deref(), ty),
            IrExpr::When {
                scrutinee,
                arms,
                ty,
            } => self.emit_when(scrutinee, arms, ty),
            IrExpr::While { condition, body } => self.emit_while(condition, body),
            IrExpr::Loop { body } => self.emit_loop(body),
            IrExpr::IterNext { source, ty } => self.emit_iter_next(source, ty),
            IrExpr::Break { drops } => {
                self.emit_drops(drops);
                match self.loop_stack.last().cloned() {
                    Some((break_target, _)) => {
                        self.terminate(format!("br label %{break_target}"));
                    }
                    None => {
                        self.internal_error("`break` outside of a loop");
                    }
                }
                Value::Unit
            }
            IrExpr::Continue { drops } => {
                self.emit_drops(drops);
                match self.loop_stack.last().cloned() {
                    Some((_, continue_target)) => {
                        self.terminate(format!("br label %{continue_target}"));
                    }
                    None => {
                        self.internal_error("`continue` outside of a loop");
                    }
                }
                Value::Unit
            }
            IrExpr::Return { value, drops } => {
                let result = value.as_ref().map(|value| self.emit_expr(value));
                self.emit_drops(drops);
                self.emit_return(result);
                Value::Unit
            }
            IrExpr::Borrow { target, .. } => {
                let (ptr, _) = self.emit_address(target);
                Value::reg(ptr, "ptr")
            }
            IrExpr::Deref { target, ty } => {
                let pointer = self.emit_expr(target);
                let lty = self.lty(ty);
                self.load(&lty, pointer.repr())
            }
            IrExpr::Field { .. } | IrExpr::Index { .. } => {
                let (ptr, ty) = self.emit_address(expr);
                let lty = self.layout.llvm_type(&ty);
                self.load(&lty, &ptr)
            }
            IrExpr::TupleNew { elements, ty } => {
                let lty = self.lty(ty);
                let mut aggregate = Value::reg("undef", lty.clone());
                for (index, element) in elements.iter().enumerate() {
                    let value = self.emit_expr(element);
                    let reg = self.fresh();
                    self.line(format!(
                        "{reg} = insertvalue {lty} {}, {} {}, {index}",
                        aggregate.repr(),
                        value.lty(),
                        value.repr()
                    ));
                    aggregate = Value::reg(reg, lty.clone());
                }
                aggregate
            }
            IrExpr::ArrayNew { elements, ty } => {
                let lty = self.lty(ty);
                let ptr = self.alloca(&lty);
                let element_ty = match self.resolve(ty) {
                    Type::Array(element, _) => *element,
                    _ => Type::Error,
                };
                let elem_lty = self.layout.llvm_type(&element_ty);
                for (index, element) in elements.iter().enumerate() {
                    let value = self.emit_expr(element);
                    let slot = self.fresh();
                    self.line(format!(
                        "{slot} = getelementptr inbounds {lty}, ptr {ptr}, i64 0, i64 {index}"
                    ));
                    self.store(&value, &slot);
                }
                let _ = elem_lty;
                self.load(&lty, &ptr)
            }
            IrExpr::ArrayRepeat { value, count, ty } => {
                let lty = self.lty(ty);
                let ptr = self.alloca(&lty);
                let element = self.emit_expr(value);
                for index in 0..*count {
                    let slot = self.fresh();
                    self.line(format!(
                        "{slot} = getelementptr inbounds {lty}, ptr {ptr}, i64 0, i64 {index}"
                    ));
                    self.store(&element, &slot);
                }
                self.load(&lty, &ptr)
            }
            IrExpr::StructNew { name, fields, ty } => self.emit_struct_new(name, fields, ty),
            IrExpr::EnumNew {
                tag,
                payload,
                ty,
                ..
            } => self.emit_enum_new(*tag, payload, ty),
            IrExpr::StrConcat { parts } => {
                self.state.use_runtime("tml_str_concat");
                let mut current: Option<Value> = None;
                for part in parts {
                    let piece = self.emit_expr(part);
                    current = Some(match current {
                        None => piece,
                        Some(previous) => {
                            let reg = self.fresh();
                            self.line(format!(
                                "{reg} = call ptr @tml_str_concat(ptr {}, ptr {})",
                                previous.repr(),
                                piece.repr()
                            ));
                            Value::reg(reg, "ptr")
                        }
                    });
                }
                current.unwrap_or_else(|| self.emit_str_literal(""))
            }
            IrExpr::ToStr { value, from } => self.emit_to_str(value, from),
            IrExpr::Closure {
                params,
                captures,
                body,
                ty,
            } => self.emit_closure(params, captures, body, ty),
            IrExpr::AsDyn {
                value,
                behavior,
                concrete,
                ..
            } => {
                let concrete_value = self.emit_expr(value);
                let data_ptr = self.spill(&concrete_value);
                let vtable = format!("@\"vtable.{concrete}.{behavior}\"");
                let with_data = self.fresh();
                self.line(format!(
                    "{with_data} = insertvalue {{ ptr, ptr }} undef, ptr {data_ptr}, 0"
                ));
                let fat = self.fresh();
                self.line(format!(
                    "{fat} = insertvalue {{ ptr, ptr }} {with_data}, ptr {vtable}, 1"
                ));
                Value::reg(fat, "{ ptr, ptr }")
            }
            IrExpr::Await { value, ty } => {
                // Suspension bookkeeping: advance the state index, then
                // run the awaited computation to completion.
                if let Some(slot) = self.locals.get("%async.state").cloned() {
                    let current = self.load("i32", &slot.ptr);
                    let next = self.fresh();
                    self.line(format!("{next} = add i32 {}, 1", current.repr()));
                    self.line(format!("store i32 {next}, ptr {}", slot.ptr));
                }
                let _ = ty;
                self.emit_expr(value)
            }
            IrExpr::Propagate { value, ty } => self.emit_propagate(value, ty),
            IrExpr::Cast { value, from, to } => self.emit_cast(value, from, to),
        }
    }

    fn emit_str_literal(&mut self, text: &str) -> Value {
        self.state.use_runtime("tml_str_new");
        let (global, len) = self.state.string_literal(text);
        let reg = self.fresh();
        self.line(format!(
            "{reg} = call ptr @tml_str_new(ptr {global}, i64 {len})"
        ));
        Value::reg(reg, "ptr")
    }

    /// A function referenced in value position becomes a `{ fn, env }`
    /// closure with a null environment, via a thunk that accepts and
    /// ignores an environment pointer.
    fn emit_fn_value(&mut self, name: &str, ty: &Type) -> Value {
        let Type::Function {
            params,
            return_value,
            ..
        } = self.resolve(ty)
        else {
            return self.internal_error(&format!("`{name}` is not callable"));
        };

        let target = match self.symbols.get(name) {
            Some(symbol) => symbol.clone(),
            None => match runtime_symbol(name) {
                Some(symbol) => symbol.to_string(),
                None => {
                    return self.internal_error(&format!("unknown function `{name}`"));
                }
            },
        };

        let thunk = self.state.fresh_aux_name("thunk");
        self.jobs.push(AuxJob::Thunk {
            symbol: thunk.clone(),
            target,
            params: params.clone(),
            return_type: (*return_value).clone(),
        });

        let with_fn = self.fresh();
        self.line(format!(
            "{with_fn} = insertvalue {{ ptr, ptr }} undef, ptr {}, 0",
            llvm_symbol(&thunk)
        ));
        let fat = self.fresh();
        self.line(format!(
            "{fat} = insertvalue {{ ptr, ptr }} {with_fn}, ptr null, 1"
        ));
        Value::reg(fat, "{ ptr, ptr }")
    }

    fn emit_args(&mut self, args: &[IrExpr]) -> Vec<Value> {
        args.iter().map(|arg| self.emit_expr(arg)).collect()
    }

    fn render_args(values: &[Value]) -> String {
        values
            .iter()
            .filter(|v| !matches!(v, Value::Unit))
            .map(|v| format!("{} {}", v.lty(), v.repr()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn emit_call(&mut self, callee: &IrExpr, args: &[IrExpr], ty: &Type) -> Value {
        if let IrExpr::Global { name, .. } = callee {
            // Math/bit intrinsics map to LLVM intrinsics or tiny inline
            // sequences.
            if let Some(value) = self.emit_intrinsic(name, args) {
                return value;
            }
            // Runtime primitive?
            if let Some(symbol) = runtime_symbol(name) {
                let values = self.emit_args(args);
                return self.emit_direct_call(symbol, &values, ty, true);
            }
            // User function (possibly a generic instance).
            if let Some(symbol) = self.symbols.get(name).cloned() {
                let target_symbol = self.mangled_instance(&symbol, args, ty);
                let values = self.emit_args(args);
                // Async callees return their value Poll-wrapped; the call
                // site uses the wrapped type and unwraps the Ready
                // payload.
                if let Some(func) = self.funcs.get(&symbol) {
                    if func.is_async {
                        let inner = func.return_type.clone();
                        let poll_lty = self.poll_type(&self.resolve(&inner));
                        let rendered = Self::render_args(&values);
                        let reg = self.fresh();
                        self.line(format!(
                            "{reg} = call {poll_lty} {}({rendered})",
                            llvm_symbol(&target_symbol)
                        ));
                        let poll = Value::reg(reg, poll_lty);
                        return self.unwrap_poll(poll, &inner);
                    }
                }
                return self.emit_user_call(&target_symbol, &values, ty);
            }
        }

        // Indirect call through a closure value.
        let closure = self.emit_expr(callee);
        let values = self.emit_args(args);
        let fn_ptr = self.fresh();
        self.line(format!(
            "{fn_ptr} = extractvalue {{ ptr, ptr }} {}, 0",
            closure.repr()
        ));
        let env_ptr = self.fresh();
        self.line(format!(
            "{env_ptr} = extractvalue {{ ptr, ptr }} {}, 1",
            closure.repr()
        ));
        let ret_lty = self.lty(ty);
        let mut rendered = vec![format!("ptr {env_ptr}")];
        for value in values.iter().filter(|v| !matches!(v, Value::Unit)) {
            rendered.push(format!("{} {}", value.lty(), value.repr()));
        }
        if ret_lty == "void" {
            self.line(format!("call void {fn_ptr}({})", rendered.join(", ")));
            Value::Unit
        } else {
            let reg = self.fresh();
            self.line(format!(
                "{reg} = call {ret_lty} {fn_ptr}({})",
                rendered.join(", ")
            ));
            Value::reg(reg, ret_lty)
        }
    }

    fn emit_intrinsic(&mut self, name: &str, args: &[IrExpr]) -> Option<Value> {
        let intrinsic = match name {
            "sqrt" => Some("llvm.sqrt.f64"),
            "fabs" => Some("llvm.fabs.f64"),
            "floor" => Some("llvm.floor.f64"),
            "ceil" => Some("llvm.ceil.f64"),
            "round" => Some("llvm.round.f64"),
            _ => None,
        };
        if let Some(intrinsic) = intrinsic {
            self.state.use_runtime(intrinsic);
            let value = self.emit_expr(args.first()?);
            let reg = self.fresh();
            self.line(format!(
                "{reg} = call double @{intrinsic}(double {})",
                value.repr()
            ));
            return Some(Value::reg(reg, "double"));
        }

        match name {
            "is_nan" => {
                let value = self.emit_expr(args.first()?);
                let cmp = self.fresh();
                self.line(format!(
                    "{cmp} = fcmp uno double {}, {}",
                    value.repr(),
                    value.repr()
                ));
                Some(self.widen_i1(&cmp))
            }
            "is_inf" => {
                self.state.use_runtime("llvm.fabs.f64");
                let value = self.emit_expr(args.first()?);
                let magnitude = self.fresh();
                self.line(format!(
                    "{magnitude} = call double @llvm.fabs.f64(double {})",
                    value.repr()
                ));
                let cmp = self.fresh();
                self.line(format!(
                    "{cmp} = fcmp oeq double {magnitude}, 0x7FF0000000000000"
                ));
                Some(self.widen_i1(&cmp))
            }
            "float_bits" => {
                let value = self.emit_expr(args.first()?);
                let reg = self.fresh();
                self.line(format!("{reg} = bitcast double {} to i64", value.repr()));
                Some(Value::reg(reg, "i64"))
            }
            "bits_float" => {
                let value = self.emit_expr(args.first()?);
                let reg = self.fresh();
                self.line(format!("{reg} = bitcast i64 {} to double", value.repr()));
                Some(Value::reg(reg, "double"))
            }
            _ => None,
        }
    }

    /// Infer the monomorphized symbol for a call to a generic function
    /// by matching the callee's declared generic parameters against the
    /// concrete argument types at this site.
    fn mangled_instance(&mut self, symbol: &str, args: &[IrExpr], ret: &Type) -> String {
        let Some(func) = self.funcs.get(symbol) else {
            return symbol.to_string();
        };
        if func.generics.is_empty() {
            return symbol.to_string();
        }
        let mut mapping: HashMap<String, Type> = HashMap::new();
        for ((_, declared), arg) in func.params.iter().zip(args) {
            bind_generics(declared, &self.resolve(&arg.ty()), &mut mapping);
        }
        bind_generics(&func.return_type, &self.resolve(ret), &mut mapping);
        let type_args: Vec<Type> = func
            .generics
            .iter()
            .map(|g| mapping.get(g).cloned().unwrap_or(Type::Unit))
            .collect();
        monomorph::mangle(symbol, &type_args)
    }

    fn emit_direct_call(
        &mut self,
        runtime: &str,
        values: &[Value],
        ty: &Type,
        is_runtime: bool,
    ) -> Value {
        if is_runtime {
            // Leak-proofing: the key must exist in the declaration table.
            for (key, _) in super::context::RUNTIME_DECLS {
                if *key == runtime {
                    self.state.use_runtime(key);
                }
            }
        }
        let ret_lty = self.lty(ty);
        let rendered = Self::render_args(values);
        if ret_lty == "void" {
            self.line(format!("call void @{runtime}({rendered})"));
            Value::Unit
        } else {
            let reg = self.fresh();
            self.line(format!("{reg} = call {ret_lty} @{runtime}({rendered})"));
            Value::reg(reg, ret_lty)
        }
    }

    fn emit_user_call(&mut self, symbol: &str, values: &[Value], ty: &Type) -> Value {
        let ret_lty = self.lty(ty);
        let rendered = Self::render_args(values);
        if ret_lty == "void" {
            self.line(format!("call void {}({rendered})", llvm_symbol(symbol)));
            Value::Unit
        } else {
            let reg = self.fresh();
            self.line(format!(
                "{reg} = call {ret_lty} {}({rendered})",
                llvm_symbol(symbol)
            ));
            Value::reg(reg, ret_lty)
        }
    }

    fn unwrap_poll(&mut self, poll: Value, inner: &Type) -> Value {
        let resolved = self.resolve(inner);
        if matches!(resolved, Type::Unit | Type::Never) {
            return Value::Unit;
        }
        let ptr = self.spill(&poll);
        let poll_lty = poll.lty().to_string();
        let payload_ptr = self.fresh();
        self.line(format!(
            "{payload_ptr} = getelementptr inbounds {poll_lty}, ptr {ptr}, i32 0, i32 1"
        ));
        let lty = self.layout.llvm_type(&resolved);
        self.load(&lty, &payload_ptr)
    }

    fn emit_dyn_call(
        &mut self,
        receiver: &IrExpr,
        slot: usize,
        args: &[IrExpr],
        ty: &Type,
    ) -> Value {
        let fat = self.emit_expr(receiver);
        let data = self.fresh();
        self.line(format!(
            "{data} = extractvalue {{ ptr, ptr }} {}, 0",
            fat.repr()
        ));
        let vtable = self.fresh();
        self.line(format!(
            "{vtable} = extractvalue {{ ptr, ptr }} {}, 1",
            fat.repr()
        ));
        let slot_ptr = self.fresh();
        self.line(format!(
            "{slot_ptr} = getelementptr inbounds ptr, ptr {vtable}, i64 {slot}"
        ));
        let fn_ptr = self.load("ptr", &slot_ptr);

        let values = self.emit_args(args);
        let ret_lty = self.lty(ty);
        let mut rendered = vec![format!("ptr {data}")];
        for value in values.iter().filter(|v| !matches!(v, Value::Unit)) {
            rendered.push(format!("{} {}", value.lty(), value.repr()));
        }
        if ret_lty == "void" {
            self.line(format!("call void {}({})", fn_ptr.repr(), rendered.join(", ")));
            Value::Unit
        } else {
            let reg = self.fresh();
            self.line(format!(
                "{reg} = call {ret_lty} {}({})",
                fn_ptr.repr(),
                rendered.join(", ")
            ));
            Value::reg(reg, ret_lty)
        }
    }

    fn emit_struct_new(&mut self, name: &str, fields: &[(String, IrExpr)], ty: &Type) -> Value {
        let resolved = self.resolve(ty);
        let lty = self.layout.llvm_type(&resolved);

        // Evaluate in written order, then place by canonical index.
        let mut evaluated: Vec<(&String, Value)> = vec![];
        for (field, value) in fields {
            let value = self.emit_expr(value);
            evaluated.push((field, value));
        }

        let index_of = |field: &str| -> usize {
            if name == "Range" {
                return if field == "low" { 0 } else { 1 };
            }
            match &resolved {
                Type::Named { name, args } => self
                    .layout
                    .field_index(name, args, field)
                    .map(|(index, _)| index)
                    .unwrap_or(0),
                _ => 0,
            }
        };

        let mut aggregate = Value::reg("undef", lty.clone());
        for (field, value) in evaluated {
            let index = index_of(field);
            let reg = self.fresh();
            self.line(format!(
                "{reg} = insertvalue {lty} {}, {} {}, {index}",
                aggregate.repr(),
                value.lty(),
                value.repr()
            ));
            aggregate = Value::reg(reg, lty.clone());
        }
        aggregate
    }

    fn emit_enum_new(&mut self, tag: usize, payload: &[IrExpr], ty: &Type) -> Value {
        let resolved = self.resolve(ty);
        let lty = self.layout.llvm_type(&resolved);
        let ptr = self.alloca(&lty);

        let tag_ptr = self.fresh();
        self.line(format!(
            "{tag_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 0"
        ));
        self.line(format!("store i32 {tag}, ptr {tag_ptr}"));

        if !payload.is_empty() {
            let payload_ptr = self.fresh();
            self.line(format!(
                "{payload_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 1"
            ));
            let values: Vec<Value> = payload.iter().map(|p| self.emit_expr(p)).collect();
            let payload_struct = format!(
                "{{ {} }}",
                values.iter().map(|v| v.lty().to_string()).collect::<Vec<_>>().join(", ")
            );
            for (index, value) in values.iter().enumerate() {
                let field_ptr = self.fresh();
                self.line(format!(
                    "{field_ptr} = getelementptr inbounds {payload_struct}, ptr {payload_ptr}, i32 0, i32 {index}"
                ));
                self.store(value, &field_ptr);
            }
        }
        self.load(&lty, &ptr)
    }

    fn emit_to_str(&mut self, value: &IrExpr, from: &Type) -> Value {
        let emitted = self.emit_expr(value);
        let resolved = self.resolve(from);
        match resolved {
            Type::Int(kind) => {
                self.state.use_runtime("tml_str_from_int");
                let widened = self.int_convert(&emitted, kind.is_signed(), "i64");
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = call ptr @tml_str_from_int(i64 {})",
                    widened.repr()
                ));
                Value::reg(reg, "ptr")
            }
            Type::Float(kind) => {
                self.state.use_runtime("tml_str_from_float");
                let widened = if kind == FloatKind::F32 {
                    let reg = self.fresh();
                    self.line(format!("{reg} = fpext float {} to double", emitted.repr()));
                    Value::reg(reg, "double")
                } else {
                    emitted
                };
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = call ptr @tml_str_from_float(double {})",
                    widened.repr()
                ));
                Value::reg(reg, "ptr")
            }
            Type::Boolean => {
                self.state.use_runtime("tml_str_from_bool");
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = call ptr @tml_str_from_bool(i32 {})",
                    emitted.repr()
                ));
                Value::reg(reg, "ptr")
            }
            Type::Character => {
                self.state.use_runtime("tml_str_from_char");
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = call ptr @tml_str_from_char(i32 {})",
                    emitted.repr()
                ));
                Value::reg(reg, "ptr")
            }
            _ => emitted,
        }
    }

    /// Width/signedness conversion of an integer SSA value.
    fn int_convert(&mut self, value: &Value, signed: bool, target: &str) -> Value {
        if value.lty() == target {
            return value.clone();
        }
        let src_bits: u32 = value.lty().trim_start_matches('i').parse().unwrap_or(64);
        let dst_bits: u32 = target.trim_start_matches('i').parse().unwrap_or(64);
        let op = if src_bits > dst_bits {
            "trunc"
        } else if signed {
            "sext"
        } else {
            "zext"
        };
        let reg = self.fresh();
        self.line(format!(
            "{reg} = {op} {} {} to {target}",
            value.lty(),
            value.repr()
        ));
        Value::reg(reg, target)
    }

    fn emit_cast(&mut self, value: &IrExpr, from: &Type, to: &Type) -> Value {
        let emitted = self.emit_expr(value);
        let from = self.resolve(from);
        let to = self.resolve(to);
        let to_lty = self.layout.llvm_type(&to);

        match (&from, &to) {
            (Type::Int(a), Type::Int(_)) => self.int_convert(&emitted, a.is_signed(), &to_lty),
            (Type::Int(a), Type::Float(_)) => {
                let op = if a.is_signed() { "sitofp" } else { "uitofp" };
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = {op} {} {} to {to_lty}",
                    emitted.lty(),
                    emitted.repr()
                ));
                Value::reg(reg, to_lty)
            }
            (Type::Float(_), Type::Int(b)) => {
                let op = if b.is_signed() { "fptosi" } else { "fptoui" };
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = {op} {} {} to {to_lty}",
                    emitted.lty(),
                    emitted.repr()
                ));
                Value::reg(reg, to_lty)
            }
            (Type::Float(a), Type::Float(b)) => {
                if a == b {
                    emitted
                } else {
                    let op = if a.bits() < b.bits() { "fpext" } else { "fptrunc" };
                    let reg = self.fresh();
                    self.line(format!(
                        "{reg} = {op} {} {} to {to_lty}",
                        emitted.lty(),
                        emitted.repr()
                    ));
                    Value::reg(reg, to_lty)
                }
            }
            (Type::Character, Type::Int(_)) => self.int_convert(&emitted, false, &to_lty),
            (Type::Int(a), Type::Character) => self.int_convert(&emitted, a.is_signed(), "i32"),
            _ => emitted,
        }
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &IrExpr, ty: &Type) -> Value {
        let value = self.emit_expr(operand);
        let resolved = self.resolve(ty);
        match op {
            UnaryOp::Neg => {
                let reg = self.fresh();
                if matches!(resolved, Type::Float(_)) {
                    self.line(format!("{reg} = fneg {} {}", value.lty(), value.repr()));
                } else {
                    self.line(format!(
                        "{reg} = sub nsw {} 0, {}",
                        value.lty(),
                        value.repr()
                    ));
                }
                Value::reg(reg, value.lty())
            }
            UnaryOp::Not => {
                let reg = self.fresh();
                self.line(format!("{reg} = xor i32 {}, 1", value.repr()));
                Value::reg(reg, "i32")
            }
            UnaryOp::BitNot => {
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = xor {} {}, -1",
                    value.lty(),
                    value.repr()
                ));
                Value::reg(reg, value.lty())
            }
        }
    }

    fn emit_binary(&mut self, op: BinaryOp, left: &IrExpr, right: &IrExpr, ty: &Type) -> Value {
        if op.is_logical() {
            return self.emit_short_circuit(op, left, right);
        }

        let lhs = self.emit_expr(left);
        let rhs = self.emit_expr(right);
        let operand_ty = self.resolve(&left.ty());

        if op.is_comparison() {
            if matches!(operand_ty, Type::String) {
                self.state.use_runtime("tml_str_eq");
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = call i32 @tml_str_eq(ptr {}, ptr {})",
                    lhs.repr(),
                    rhs.repr()
                ));
                if op == BinaryOp::NotEq {
                    let inverted = self.fresh();
                    self.line(format!("{inverted} = xor i32 {reg}, 1"));
                    return Value::reg(inverted, "i32");
                }
                return Value::reg(reg, "i32");
            }
            let predicate = comparison_predicate(op, &operand_ty);
            let cmp = self.fresh();
            let instruction = if matches!(operand_ty, Type::Float(_)) {
                "fcmp"
            } else {
                "icmp"
            };
            self.line(format!(
                "{cmp} = {instruction} {predicate} {} {}, {}",
                lhs.lty(),
                lhs.repr(),
                rhs.repr()
            ));
            return self.widen_i1(&cmp);
        }

        if op == BinaryOp::Pow {
            if matches!(operand_ty, Type::Float(_)) {
                self.state.use_runtime("llvm.pow.f64");
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = call double @llvm.pow.f64(double {}, double {})",
                    lhs.repr(),
                    rhs.repr()
                ));
                return Value::reg(reg, "double");
            }
            self.state.use_runtime("tml_ipow");
            let signed = matches!(&operand_ty, Type::Int(kind) if kind.is_signed());
            let wide_lhs = self.int_convert(&lhs, signed, "i64");
            let wide_rhs = self.int_convert(&rhs, signed, "i64");
            let reg = self.fresh();
            self.line(format!(
                "{reg} = call i64 @tml_ipow(i64 {}, i64 {})",
                wide_lhs.repr(),
                wide_rhs.repr()
            ));
            let result = Value::reg(reg, "i64");
            return self.int_convert(&result, signed, lhs.lty());
        }

        let instruction = arithmetic_instruction(op, &operand_ty);
        let reg = self.fresh();
        let _ = ty;
        self.line(format!(
            "{reg} = {instruction} {} {}, {}",
            lhs.lty(),
            lhs.repr(),
            rhs.repr()
        ));
        Value::reg(reg, lhs.lty())
    }

    fn emit_short_circuit(&mut self, op: BinaryOp, left: &IrExpr, right: &IrExpr) -> Value {
        let result_ptr = self.alloca("i32");
        let rhs_label = self.label("sc.rhs");
        let merge_label = self.label("sc.merge");

        let lhs = self.emit_expr(left);
        self.store(&lhs, &result_ptr);
        let lhs_bool = self.bool_of(&lhs);
        match op {
            BinaryOp::And => self.terminate(format!(
                "br i1 {lhs_bool}, label %{rhs_label}, label %{merge_label}"
            )),
            _ => self.terminate(format!(
                "br i1 {lhs_bool}, label %{merge_label}, label %{rhs_label}"
            )),
        }

        self.begin_block(&rhs_label);
        let rhs = self.emit_expr(right);
        self.store(&rhs, &result_ptr);
        self.terminate(format!("br label %{merge_label}"));

        self.begin_block(&merge_label);
        self.load("i32", &result_ptr)
    }

    // ---- control flow -------------------------------------------------

    fn emit_if(
        &mut self,
        condition: &IrExpr,
        then_branch: &IrExpr,
        else_branch: Option<&IrExpr>,
        ty: &Type,
    ) -> Value {
        let resolved = self.resolve(ty);
        let produces_value = !matches!(resolved, Type::Unit | Type::Never);
        let result_ptr = if produces_value {
            let lty = self.layout.llvm_type(&resolved);
            Some((self.alloca(&lty), lty))
        } else {
            None
        };

        let then_label = self.label("if.then");
        let else_label = self.label("if.else");
        let merge_label = self.label("if.merge");

        let cond = self.emit_expr(condition);
        let cond_bool = self.bool_of(&cond);
        let false_target = if else_branch.is_some() {
            &else_label
        } else {
            &merge_label
        };
        self.terminate(format!(
            "br i1 {cond_bool}, label %{then_label}, label %{false_target}"
        ));

        self.begin_block(&then_label);
        let then_value = self.emit_expr(then_branch);
        let mut any_merges = false;
        if !self.terminated {
            if let Some((ptr, _)) = &result_ptr {
                let ptr = ptr.clone();
                self.store(&then_value, &ptr);
            }
            self.terminate(format!("br label %{merge_label}"));
            any_merges = true;
        }

        if let Some(else_branch) = else_branch {
            self.begin_block(&else_label);
            let else_value = self.emit_expr(else_branch);
            if !self.terminated {
                if let Some((ptr, _)) = &result_ptr {
                    let ptr = ptr.clone();
                    self.store(&else_value, &ptr);
                }
                self.terminate(format!("br label %{merge_label}"));
                any_merges = true;
            }
        } else {
            any_merges = true;
        }

        // When every arm terminates, no merge block is emitted.
        if !any_merges {
            self.terminated = true;
            return Value::Unit;
        }

        self.begin_block(&merge_label);
        match result_ptr {
            Some((ptr, lty)) => self.load(&lty, &ptr),
            None => Value::Unit,
        }
    }

    fn loop_backedge_metadata(&mut self) -> u32 {
        let id = self.state.next_loop_metadata();
        self.loop_metadata.push(id);
        id
    }

    fn emit_while(&mut self, condition: &IrExpr, body: &IrExpr) -> Value {
        let preheader = self.label("wh.preheader");
        let header = self.label("wh.header");
        let body_label = self.label("wh.body");
        let latch = self.label("wh.latch");
        let exit = self.label("wh.exit");

        self.terminate(format!("br label %{preheader}"));
        self.begin_block(&preheader);
        self.terminate(format!("br label %{header}"));

        self.begin_block(&header);
        let cond = self.emit_expr(condition);
        let cond_bool = self.bool_of(&cond);
        self.terminate(format!(
            "br i1 {cond_bool}, label %{body_label}, label %{exit}"
        ));

        self.begin_block(&body_label);
        self.loop_stack.push((exit.clone(), latch.clone()));
        self.emit_expr(body);
        self.loop_stack.pop();
        self.terminate(format!("br label %{latch}"));

        self.begin_block(&latch);
        let metadata = self.loop_backedge_metadata();
        self.terminate(format!("br label %{header}, !llvm.loop !{metadata}"));

        self.begin_block(&exit);
        Value::Unit
    }

    fn emit_loop(&mut self, body: &IrExpr) -> Value {
        let preheader = self.label("lp.preheader");
        let header = self.label("lp.header");
        let body_label = self.label("lp.body");
        let latch = self.label("lp.latch");
        let exit = self.label("lp.exit");

        self.terminate(format!("br label %{preheader}"));
        self.begin_block(&preheader);
        self.terminate(format!("br label %{header}"));

        self.begin_block(&header);
        self.terminate(format!("br label %{body_label}"));

        self.begin_block(&body_label);
        self.loop_stack.push((exit.clone(), latch.clone()));
        self.emit_expr(body);
        self.loop_stack.pop();
        self.terminate(format!("br label %{latch}"));

        self.begin_block(&latch);
        let metadata = self.loop_backedge_metadata();
        self.terminate(format!("br label %{header}, !llvm.loop !{metadata}"));

        self.begin_block(&exit);
        Value::Unit
    }

    /// `iter-next` over a `Range` cursor: compare, branch to the loop
    /// exit when exhausted, otherwise advance and yield.
    fn emit_iter_next(&mut self, source: &IrExpr, ty: &Type) -> Value {
        let (range_ptr, range_ty) = self.emit_address(source);
        let resolved = self.resolve(&range_ty);
        if !matches!(&resolved, Type::Named { name, .. } if name == "Range") {
            return self.internal_error("iter-next on a non-range value");
        }
        let range_lty = self.layout.llvm_type(&resolved);
        let elem_lty = self.lty(ty);

        let low_ptr = self.fresh();
        self.line(format!(
            "{low_ptr} = getelementptr inbounds {range_lty}, ptr {range_ptr}, i32 0, i32 0"
        ));
        let high_ptr = self.fresh();
        self.line(format!(
            "{high_ptr} = getelementptr inbounds {range_lty}, ptr {range_ptr}, i32 0, i32 1"
        ));
        let current = self.load(&elem_lty, &low_ptr);
        let high = self.load(&elem_lty, &high_ptr);

        let exhausted = self.fresh();
        self.line(format!(
            "{exhausted} = icmp sge {elem_lty} {}, {}",
            current.repr(),
            high.repr()
        ));

        let continue_label = self.label("iter.next");
        let Some((exit, _)) = self.loop_stack.last().cloned() else {
            return self.internal_error("iter-next outside of a loop");
        };
        self.terminate(format!(
            "br i1 {exhausted}, label %{exit}, label %{continue_label}"
        ));

        self.begin_block(&continue_label);
        let advanced = self.fresh();
        self.line(format!(
            "{advanced} = add nsw {elem_lty} {}, 1",
            current.repr()
        ));
        self.line(format!("store {elem_lty} {advanced}, ptr {low_ptr}"));
        current
    }

    // ---- pattern matching ---------------------------------------------

    fn emit_when(&mut self, scrutinee: &IrExpr, arms: &[IrArm], ty: &Type) -> Value {
        let scrutinee_value = self.emit_expr(scrutinee);
        let scrutinee_ty = self.resolve(&scrutinee.ty());
        let scrutinee_ptr = self.spill(&scrutinee_value);

        let resolved = self.resolve(ty);
        let produces_value = !matches!(resolved, Type::Unit | Type::Never);
        let result_ptr = if produces_value {
            let lty = self.layout.llvm_type(&resolved);
            Some((self.alloca(&lty), lty))
        } else {
            None
        };
        let merge_label = self.label("when.merge");
        let mut any_merges = false;

        // All arms discriminating on distinct integer tags lower to a
        // switch; otherwise a comparison chain.
        if let Some(tagged) = switchable_arms(arms) {
            let tag_ptr = self.fresh();
            let scrutinee_lty = self.layout.llvm_type(&scrutinee_ty);
            self.line(format!(
                "{tag_ptr} = getelementptr inbounds {scrutinee_lty}, ptr {scrutinee_ptr}, i32 0, i32 0"
            ));
            let tag = self.load("i32", &tag_ptr);

            let mut cases = vec![];
            let mut arm_labels = vec![];
            for (tag_value, _) in &tagged {
                let label = self.label("when.arm");
                cases.push(format!("i32 {tag_value}, label %{label}"));
                arm_labels.push(label);
            }
            let default_label = match arms.last() {
                Some(arm) if is_irrefutable(&arm.pattern) => {
                    let label = self.label("when.default");
                    label
                }
                _ => {
                    let label = self.label("when.unreach");
                    label
                }
            };
            self.terminate(format!(
                "switch i32 {}, label %{default_label} [ {} ]",
                tag.repr(),
                cases.join(" ")
            ));

            for ((_, arm), label) in tagged.iter().zip(&arm_labels) {
                self.begin_block(label);
                self.bind_pattern(&arm.pattern, &scrutinee_ptr, &scrutinee_ty);
                let value = self.emit_expr(&arm.value);
                if !self.terminated {
                    if let Some((ptr, _)) = &result_ptr {
                        let ptr = ptr.clone();
                        self.store(&value, &ptr);
                    }
                    self.terminate(format!("br label %{merge_label}"));
                    any_merges = true;
                }
            }

            self.begin_block(&default_label);
            match arms.last() {
                Some(arm) if is_irrefutable(&arm.pattern) => {
                    self.bind_pattern(&arm.pattern, &scrutinee_ptr, &scrutinee_ty);
                    let value = self.emit_expr(&arm.value);
                    if !self.terminated {
                        if let Some((ptr, _)) = &result_ptr {
                            let ptr = ptr.clone();
                            self.store(&value, &ptr);
                        }
                        self.terminate(format!("br label %{merge_label}"));
                        any_merges = true;
                    }
                }
                _ => self.terminate("unreachable"),
            }
        } else {
            // Linear chain of tests.
            for arm in arms {
                let body_label = self.label("when.arm");
                let next_label = self.label("when.next");
                let matched = self.emit_pattern_test(&arm.pattern, &scrutinee_ptr, &scrutinee_ty);
                match matched {
                    Some(cond) => self.terminate(format!(
                        "br i1 {cond}, label %{body_label}, label %{next_label}"
                    )),
                    None => self.terminate(format!("br label %{body_label}")),
                }

                self.begin_block(&body_label);
                self.bind_pattern(&arm.pattern, &scrutinee_ptr, &scrutinee_ty);
                let value = self.emit_expr(&arm.value);
                if !self.terminated {
                    if let Some((ptr, _)) = &result_ptr {
                        let ptr = ptr.clone();
                        self.store(&value, &ptr);
                    }
                    self.terminate(format!("br label %{merge_label}"));
                    any_merges = true;
                }

                self.begin_block(&next_label);
            }
            // Exhaustiveness was proven by the checker.
            self.terminate("unreachable");
        }

        if !any_merges {
            self.terminated = true;
            return Value::Unit;
        }
        self.begin_block(&merge_label);
        match result_ptr {
            Some((ptr, lty)) => self.load(&lty, &ptr),
            None => Value::Unit,
        }
    }

    /// Pointer to the payload of an enum scrutinee, typed as the
    /// variant's payload tuple.
    fn variant_payload_ptr(
        &mut self,
        scrutinee_ptr: &str,
        scrutinee_ty: &Type,
    ) -> (String, String) {
        let lty = self.layout.llvm_type(scrutinee_ty);
        let reg = self.fresh();
        self.line(format!(
            "{reg} = getelementptr inbounds {lty}, ptr {scrutinee_ptr}, i32 0, i32 1"
        ));
        (reg, lty)
    }

    fn variant_payload_types(&self, scrutinee_ty: &Type, variant: &str) -> Vec<Type> {
        match scrutinee_ty.peel_references() {
            Type::Named { name, args } => self
                .layout
                .enum_variants(name, args)
                .into_iter()
                .find(|(candidate, _)| candidate == variant)
                .map(|(_, payload)| payload)
                .unwrap_or_default(),
            _ => vec![],
        }
    }

    /// Emit the boolean test for a pattern at an address; `None` means
    /// irrefutable.
    fn emit_pattern_test(
        &mut self,
        pattern: &IrPattern,
        ptr: &str,
        ty: &Type,
    ) -> Option<String> {
        match pattern {
            IrPattern::Wildcard | IrPattern::Binding(..) => None,
            IrPattern::Const(value) => Some(self.emit_const_test(value, ptr, ty)),
            IrPattern::Range { lo, hi, inclusive } => {
                // Two comparisons joined by `and`.
                let lty = self.lty(ty);
                let current = self.load(&lty, ptr);
                let (lo, hi) = (const_int(lo), const_int(hi));
                let low_ok = self.fresh();
                self.line(format!(
                    "{low_ok} = icmp sge {lty} {}, {lo}",
                    current.repr()
                ));
                let predicate = if *inclusive { "sle" } else { "slt" };
                let high_ok = self.fresh();
                self.line(format!(
                    "{high_ok} = icmp {predicate} {lty} {}, {hi}",
                    current.repr()
                ));
                let both = self.fresh();
                self.line(format!("{both} = and i1 {low_ok}, {high_ok}"));
                Some(both)
            }
            IrPattern::Variant {
                variant, tag, subs, ..
            } => {
                let resolved = self.resolve(ty);
                let lty = self.layout.llvm_type(&resolved);
                let tag_ptr = self.fresh();
                self.line(format!(
                    "{tag_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 0"
                ));
                let actual = self.load("i32", &tag_ptr);
                let tag_ok = self.fresh();
                self.line(format!("{tag_ok} = icmp eq i32 {}, {tag}", actual.repr()));

                let mut combined = tag_ok;
                if !subs.is_empty() {
                    let payload_types = self.variant_payload_types(&resolved, variant);
                    let (payload_ptr, _) = self.variant_payload_ptr(ptr, &resolved);
                    let payload_struct = self.payload_struct_type(&payload_types);
                    for (index, sub) in subs.iter().enumerate() {
                        let field_ptr = self.fresh();
                        self.line(format!(
                            "{field_ptr} = getelementptr inbounds {payload_struct}, ptr {payload_ptr}, i32 0, i32 {index}"
                        ));
                        let field_ty = payload_types.get(index).cloned().unwrap_or(Type::Error);
                        if let Some(sub_test) = self.emit_pattern_test(sub, &field_ptr, &field_ty)
                        {
                            let next = self.fresh();
                            self.line(format!("{next} = and i1 {combined}, {sub_test}"));
                            combined = next;
                        }
                    }
                }
                Some(combined)
            }
            IrPattern::Tuple(subs) => {
                let resolved = self.resolve(ty);
                let element_types = match resolved.peel_references() {
                    Type::Tuple(elements) => elements.clone(),
                    _ => vec![],
                };
                let lty = self.layout.llvm_type(&resolved);
                let mut combined: Option<String> = None;
                for (index, sub) in subs.iter().enumerate() {
                    let field_ptr = self.fresh();
                    self.line(format!(
                        "{field_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 {index}"
                    ));
                    let field_ty = element_types.get(index).cloned().unwrap_or(Type::Error);
                    if let Some(test) = self.emit_pattern_test(sub, &field_ptr, &field_ty) {
                        combined = Some(match combined {
                            None => test,
                            Some(previous) => {
                                let next = self.fresh();
                                self.line(format!("{next} = and i1 {previous}, {test}"));
                                next
                            }
                        });
                    }
                }
                combined
            }
            IrPattern::Struct { name, fields } => {
                let resolved = self.resolve(ty);
                let args = match resolved.peel_references() {
                    Type::Named { args, .. } => args.clone(),
                    _ => vec![],
                };
                let lty = self.layout.llvm_type(&resolved);
                let mut combined: Option<String> = None;
                for (field, sub) in fields {
                    let Some((index, field_ty)) = self.layout.field_index(name, &args, field)
                    else {
                        continue;
                    };
                    let field_ptr = self.fresh();
                    self.line(format!(
                        "{field_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 {index}"
                    ));
                    if let Some(test) = self.emit_pattern_test(sub, &field_ptr, &field_ty) {
                        combined = Some(match combined {
                            None => test,
                            Some(previous) => {
                                let next = self.fresh();
                                self.line(format!("{next} = and i1 {previous}, {test}"));
                                next
                            }
                        });
                    }
                }
                combined
            }
            IrPattern::Array { subs, .. } => {
                let resolved = self.resolve(ty);
                let (element_ty, lty) = match resolved.peel_references() {
                    Type::Array(element, count) => (
                        (**element).clone(),
                        format!("[{count} x {}]", self.layout.llvm_type(element)),
                    ),
                    _ => (Type::Error, "ptr".to_string()),
                };
                let mut combined: Option<String> = None;
                for (index, sub) in subs.iter().enumerate() {
                    let field_ptr = self.fresh();
                    self.line(format!(
                        "{field_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i64 0, i64 {index}"
                    ));
                    if let Some(test) = self.emit_pattern_test(sub, &field_ptr, &element_ty) {
                        combined = Some(match combined {
                            None => test,
                            Some(previous) => {
                                let next = self.fresh();
                                self.line(format!("{next} = and i1 {previous}, {test}"));
                                next
                            }
                        });
                    }
                }
                combined
            }
            // Or-patterns lower to an `or` of alternative tests.
            IrPattern::Or(alternatives) => {
                let mut combined: Option<String> = None;
                for alternative in alternatives {
                    match self.emit_pattern_test(alternative, ptr, ty) {
                        None => return None,
                        Some(test) => {
                            combined = Some(match combined {
                                None => test,
                                Some(previous) => {
                                    let next = self.fresh();
                                    self.line(format!("{next} = or i1 {previous}, {test}"));
                                    next
                                }
                            });
                        }
                    }
                }
                combined
            }
        }
    }

    fn payload_struct_type(&self, payload: &[Type]) -> String {
        format!(
            "{{ {} }}",
            payload
                .iter()
                .map(|t| self.layout.llvm_type(&self.resolve(t)))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    fn emit_const_test(&mut self, value: &PatternConst, ptr: &str, ty: &Type) -> String {
        let lty = self.lty(ty);
        match value {
            PatternConst::Int(v) => {
                let current = self.load(&lty, ptr);
                let reg = self.fresh();
                self.line(format!("{reg} = icmp eq {lty} {}, {v}", current.repr()));
                reg
            }
            PatternConst::Bool(v) => {
                let current = self.load("i32", ptr);
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = icmp eq i32 {}, {}",
                    current.repr(),
                    if *v { 1 } else { 0 }
                ));
                reg
            }
            PatternConst::Char(v) => {
                let current = self.load("i32", ptr);
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = icmp eq i32 {}, {}",
                    current.repr(),
                    *v as u32
                ));
                reg
            }
            PatternConst::Str(text) => {
                self.state.use_runtime("tml_str_eq");
                let current = self.load("ptr", ptr);
                let literal = self.emit_str_literal(text);
                let eq = self.fresh();
                self.line(format!(
                    "{eq} = call i32 @tml_str_eq(ptr {}, ptr {})",
                    current.repr(),
                    literal.repr()
                ));
                let reg = self.fresh();
                self.line(format!("{reg} = icmp ne i32 {eq}, 0"));
                reg
            }
            PatternConst::Float(v) => {
                let current = self.load(&lty, ptr);
                let reg = self.fresh();
                self.line(format!(
                    "{reg} = fcmp oeq {lty} {}, {v:e}",
                    current.repr()
                ));
                reg
            }
        }
    }

    /// Extract-then-store sequences for every binder in the pattern.
    fn bind_pattern(&mut self, pattern: &IrPattern, ptr: &str, ty: &Type) {
        match pattern {
            IrPattern::Wildcard | IrPattern::Const(_) | IrPattern::Range { .. } => {}
            IrPattern::Binding(name, binding_ty) => {
                let lty = self.lty(binding_ty);
                let value = self.load(&lty, ptr);
                let slot = self.bind_local(name, binding_ty);
                self.store(&value, &slot.ptr.clone());
            }
            IrPattern::Variant { variant, subs, .. } => {
                if subs.is_empty() {
                    return;
                }
                let resolved = self.resolve(ty);
                let payload_types = self.variant_payload_types(&resolved, variant);
                let (payload_ptr, _) = self.variant_payload_ptr(ptr, &resolved);
                let payload_struct = self.payload_struct_type(&payload_types);
                for (index, sub) in subs.iter().enumerate() {
                    let field_ptr = self.fresh();
                    self.line(format!(
                        "{field_ptr} = getelementptr inbounds {payload_struct}, ptr {payload_ptr}, i32 0, i32 {index}"
                    ));
                    let field_ty = payload_types.get(index).cloned().unwrap_or(Type::Error);
                    self.bind_pattern(sub, &field_ptr, &field_ty);
                }
            }
            IrPattern::Tuple(subs) => {
                let resolved = self.resolve(ty);
                let element_types = match resolved.peel_references() {
                    Type::Tuple(elements) => elements.clone(),
                    _ => vec![],
                };
                let lty = self.layout.llvm_type(&resolved);
                for (index, sub) in subs.iter().enumerate() {
                    let field_ptr = self.fresh();
                    self.line(format!(
                        "{field_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 {index}"
                    ));
                    let field_ty = element_types.get(index).cloned().unwrap_or(Type::Error);
                    self.bind_pattern(sub, &field_ptr, &field_ty);
                }
            }
            IrPattern::Struct { name, fields } => {
                let resolved = self.resolve(ty);
                let args = match resolved.peel_references() {
                    Type::Named { args, .. } => args.clone(),
                    _ => vec![],
                };
                let lty = self.layout.llvm_type(&resolved);
                for (field, sub) in fields {
                    let Some((index, field_ty)) = self.layout.field_index(name, &args, field)
                    else {
                        continue;
                    };
                    let field_ptr = self.fresh();
                    self.line(format!(
                        "{field_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 {index}"
                    ));
                    self.bind_pattern(sub, &field_ptr, &field_ty);
                }
            }
            IrPattern::Array { subs, rest } => {
                let resolved = self.resolve(ty);
                if let Type::Array(element, count) = resolved.peel_references() {
                    let lty = format!("[{count} x {}]", self.layout.llvm_type(element));
                    for (index, sub) in subs.iter().enumerate() {
                        let field_ptr = self.fresh();
                        self.line(format!(
                            "{field_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i64 0, i64 {index}"
                        ));
                        self.bind_pattern(sub, &field_ptr, element);
                    }
                    if let Some(rest_name) = rest {
                        // The tail binds as a pointer into the array.
                        let tail_ptr = self.fresh();
                        self.line(format!(
                            "{tail_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i64 0, i64 {}",
                            subs.len()
                        ));
                        let slot = self.bind_local(
                            rest_name,
                            &Type::Slice(element.clone()),
                        );
                        let tail_value = Value::reg(tail_ptr, "ptr");
                        self.store(&tail_value, &slot.ptr.clone());
                    }
                }
            }
            // Alternatives bind the same names; bind through the first.
            IrPattern::Or(alternatives) => {
                if let Some(first) = alternatives.first() {
                    self.bind_pattern(first, ptr, ty);
                }
            }
        }
    }

    // ---- closures ------------------------------------------------------

    fn emit_closure(
        &mut self,
        params: &[(String, Type)],
        captures: &[Capture],
        body: &IrExpr,
        ty: &Type,
    ) -> Value {
        let return_type = match self.resolve(ty) {
            Type::Function { return_value, .. } => *return_value,
            _ => Type::Unit,
        };

        let symbol = self.state.fresh_aux_name("lambda");
        let captured: Vec<(Capture, Type)> = captures
            .iter()
            .filter_map(|capture| {
                self.locals
                    .get(&capture.name)
                    .map(|slot| (capture.clone(), slot.ty.clone()))
            })
            .collect();

        // Environment block: by-value slots for moves, pointers for
        // borrow captures. Null when nothing is captured.
        let env_value = if captured.is_empty() {
            "null".to_string()
        } else {
            let env_struct = self.env_struct_type(&captured);
            let env_ptr = self.alloca(&env_struct);
            for (index, (capture, capture_ty)) in captured.iter().enumerate() {
                let slot = self.locals[&capture.name].clone();
                let field_ptr = self.fresh();
                self.line(format!(
                    "{field_ptr} = getelementptr inbounds {env_struct}, ptr {env_ptr}, i32 0, i32 {index}"
                ));
                match capture.mode {
                    CaptureMode::Move => {
                        let lty = self.layout.llvm_type(capture_ty);
                        let value = self.load(&lty, &slot.ptr);
                        self.store(&value, &field_ptr);
                    }
                    CaptureMode::Shared | CaptureMode::Exclusive => {
                        let pointer = Value::reg(slot.ptr.clone(), "ptr");
                        self.store(&pointer, &field_ptr);
                    }
                }
            }
            env_ptr
        };

        self.jobs.push(AuxJob::Closure {
            symbol: symbol.clone(),
            params: params.to_vec(),
            captures: captured,
            body: body.clone(),
            return_type,
            subst: self.subst.clone(),
        });

        let with_fn = self.fresh();
        self.line(format!(
            "{with_fn} = insertvalue {{ ptr, ptr }} undef, ptr {}, 0",
            llvm_symbol(&symbol)
        ));
        let fat = self.fresh();
        self.line(format!(
            "{fat} = insertvalue {{ ptr, ptr }} {with_fn}, ptr {env_value}, 1"
        ));
        Value::reg(fat, "{ ptr, ptr }")
    }

    fn env_struct_type(&self, captured: &[(Capture, Type)]) -> String {
        format!(
            "{{ {} }}",
            captured
                .iter()
                .map(|(capture, ty)| match capture.mode {
                    CaptureMode::Move => self.layout.llvm_type(ty),
                    _ => "ptr".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    /// Seed capture slots at the top of a closure implementation
    /// function: `%env` holds the environment pointer.
    pub fn seed_captures(&mut self, captured: &[(Capture, Type)]) {
        if captured.is_empty() {
            return;
        }
        let env_struct = self.env_struct_type(captured);
        for (index, (capture, capture_ty)) in captured.iter().enumerate() {
            let field_ptr = self.fresh();
            self.line(format!(
                "{field_ptr} = getelementptr inbounds {env_struct}, ptr %env, i32 0, i32 {index}"
            ));
            let ptr = match capture.mode {
                CaptureMode::Move => field_ptr,
                CaptureMode::Shared | CaptureMode::Exclusive => {
                    let loaded = self.load("ptr", &field_ptr);
                    loaded.repr().to_string()
                }
            };
            let lty = self.layout.llvm_type(capture_ty);
            self.locals.insert(
                capture.name.clone(),
                LocalSlot {
                    ptr,
                    llvm_ty: lty,
                    ty: capture_ty.clone(),
                },
            );
        }
    }

    fn emit_propagate(&mut self, value: &IrExpr, ty: &Type) -> Value {
        let fallible = self.emit_expr(value);
        let fallible_ty = self.resolve(&value.ty());
        let lty = self.layout.llvm_type(&fallible_ty);
        let ptr = self.spill(&fallible);

        let tag_ptr = self.fresh();
        self.line(format!(
            "{tag_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 0"
        ));
        let tag = self.load("i32", &tag_ptr);
        let is_ok = self.fresh();
        self.line(format!("{is_ok} = icmp eq i32 {}, 0", tag.repr()));

        let ok_label = self.label("prop.ok");
        let bail_label = self.label("prop.bail");
        self.terminate(format!(
            "br i1 {is_ok}, label %{ok_label}, label %{bail_label}"
        ));

        // The failure arm returns the fallible value unchanged; the
        // enclosing function's return type shares the constructor.
        self.begin_block(&bail_label);
        let original = self.load(&lty, &ptr);
        self.emit_return(Some(original));

        self.begin_block(&ok_label);
        let payload_ptr = self.fresh();
        self.line(format!(
            "{payload_ptr} = getelementptr inbounds {lty}, ptr {ptr}, i32 0, i32 1"
        ));
        let payload_lty = self.lty(ty);
        if payload_lty == "void" {
            Value::Unit
        } else {
            self.load(&payload_lty, &payload_ptr)
        }
    }
}

/// Arms usable for a `switch`: every arm except an optional trailing
/// irrefutable one is an enum variant with a distinct tag and the
/// scrutinee discriminates on integers.
fn switchable_arms(arms: &[IrArm]) -> Option<Vec<(usize, &IrArm)>> {
    let mut tagged = vec![];
    let mut seen = std::collections::BTreeSet::new();
    for (index, arm) in arms.iter().enumerate() {
        match &arm.pattern {
            IrPattern::Variant { tag, subs, .. } => {
                if !seen.insert(*tag) {
                    return None;
                }
                // Nested sub-pattern tests cannot ride a switch case.
                if !subs.iter().all(is_irrefutable) {
                    return None;
                }
                tagged.push((*tag, arm));
            }
            _ if index + 1 == arms.len() && is_irrefutable(&arm.pattern) => {}
            _ => return None,
        }
    }
    if tagged.is_empty() {
        None
    } else {
        Some(tagged)
    }
}

fn is_irrefutable(pattern: &IrPattern) -> bool {
    matches!(pattern, IrPattern::Wildcard | IrPattern::Binding(..))
}

fn const_int(value: &PatternConst) -> i128 {
    match value {
        PatternConst::Int(v) => *v,
        PatternConst::Char(c) => *c as i128,
        _ => 0,
    }
}

fn comparison_predicate(op: BinaryOp, ty: &Type) -> &'static str {
    let signed = !matches!(ty, Type::Int(kind) if !kind.is_signed());
    if matches!(ty, Type::Float(_)) {
        match op {
            BinaryOp::Eq => "oeq",
            BinaryOp::NotEq => "one",
            BinaryOp::Lt => "olt",
            BinaryOp::Gt => "ogt",
            BinaryOp::LtEq => "ole",
            BinaryOp::GtEq => "oge",
            _ => "oeq",
        }
    } else {
        match op {
            BinaryOp::Eq => "eq",
            BinaryOp::NotEq => "ne",
            BinaryOp::Lt => {
                if signed {
                    "slt"
                } else {
                    "ult"
                }
            }
            BinaryOp::Gt => {
                if signed {
                    "sgt"
                } else {
                    "ugt"
                }
            }
            BinaryOp::LtEq => {
                if signed {
                    "sle"
                } else {
                    "ule"
                }
            }
            BinaryOp::GtEq => {
                if signed {
                    "sge"
                } else {
                    "uge"
                }
            }
            _ => "eq",
        }
    }
}

fn arithmetic_instruction(op: BinaryOp, ty: &Type) -> &'static str {
    let float = matches!(ty, Type::Float(_));
    let signed = !matches!(ty, Type::Int(kind) if !kind.is_signed());
    match op {
        BinaryOp::Add => {
            if float {
                "fadd"
            } else if signed {
                "add nsw"
            } else {
                "add"
            }
        }
        BinaryOp::Sub => {
            if float {
                "fsub"
            } else if signed {
                "sub nsw"
            } else {
                "sub"
            }
        }
        BinaryOp::Mul => {
            if float {
                "fmul"
            } else if signed {
                "mul nsw"
            } else {
                "mul"
            }
        }
        BinaryOp::Div => {
            if float {
                "fdiv"
            } else if signed {
                "sdiv"
            } else {
                "udiv"
            }
        }
        BinaryOp::Rem => {
            if float {
                "frem"
            } else if signed {
                "srem"
            } else {
                "urem"
            }
        }
        BinaryOp::BitAnd => "and",
        BinaryOp::BitOr => "or",
        BinaryOp::BitXor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::Shr => {
            if signed {
                "ashr"
            } else {
                "lshr"
            }
        }
        _ => "add",
    }
}

/// Structural matching of a declared (possibly generic) type against a
/// concrete one, filling the generic mapping.
fn bind_generics(declared: &Type, concrete: &Type, mapping: &mut HashMap<String, Type>) {
    match (declared, concrete) {
        (Type::Generic(name), concrete) => {
            mapping
                .entry(name.clone())
                .or_insert_with(|| concrete.clone());
        }
        (Type::Named { args: a, .. }, Type::Named { args: b, .. }) => {
            for (x, y) in a.iter().zip(b) {
                bind_generics(x, y, mapping);
            }
        }
        (
            Type::Function {
                params: a,
                return_value: ar,
                ..
            },
            Type::Function {
                params: b,
                return_value: br,
                ..
            },
        ) => {
            for (x, y) in a.iter().zip(b) {
                bind_generics(x, y, mapping);
            }
            bind_generics(ar, br, mapping);
        }
        (Type::Tuple(a), Type::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                bind_generics(x, y, mapping);
            }
        }
        (Type::Array(a, _), Type::Array(b, _))
        | (Type::Slice(a), Type::Slice(b))
        | (Type::Reference { inner: a, .. }, Type::Reference { inner: b, .. }) => {
            bind_generics(a, b, mapping);
        }
        _ => {}
    }
}
