//! Canonical IR.
//!
//! A distinct, sugar-free, fully typed tree between the checked AST and
//! the LLVM emitter. Sugar cannot be represented here: compound
//! assignment arrives as assign-of-op, `for` as `loop` + `iter-next`,
//! method calls as static calls with an explicit receiver, string
//! interpolation as a `str-concat` chain. Drop schedules and `dyn`
//! coercions computed by earlier passes are materialized as explicit
//! nodes, so the emitter never re-derives them.
//!
//! The same structure serializes to a byte-deterministic S-expression
//! stream: module header `(module <path> <version>)`, then one line per
//! item, `(item <kind> @<stable-id> (vis …) (effects …) (type …)
//! (body …))`. Items are ordered const < type < behavior < extend <
//! func and alphabetically within each kind; struct fields are
//! alphabetized. Enum variants keep source order — the variant index is
//! the runtime tag, and IR consumers must not assume alphabetical order.
//! Parameter, generic-parameter and tuple element orders are preserved.

pub mod sexpr;
pub mod stable_id;

mod print;

pub use print::render_program;
pub use stable_id::{derive_stable_id, StableIdRegistry};

use std::collections::HashMap;

use log::debug;

use crate::effects::{EffectRow, EffectTable};
use crate::ownership::state::Capture;
use crate::ownership::OwnershipAnalysis;
use crate::parser::ast::*;
use crate::session::Session;
use crate::source::Span;
use crate::typechecker::behavior::TypeDefKind;
use crate::typechecker::context::Context;
use crate::typechecker::types::Type;
use crate::typechecker::{expression_info, CheckedProgram, TypeInformation};

// ---- structured IR ---------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct IrProgram {
    pub modules: Vec<IrModule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrModule {
    pub path: String,
    pub version: String,
    pub items: Vec<IrItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrItem {
    Const(IrConst),
    Type(IrTypeDef),
    Behavior(IrBehavior),
    Func(IrFunc),
}

impl IrItem {
    /// Ordering rank: const < type < behavior < extend-func < func.
    fn kind_rank(&self) -> u8 {
        match self {
            IrItem::Const(_) => 0,
            IrItem::Type(_) => 1,
            IrItem::Behavior(_) => 2,
            IrItem::Func(func) if func.from_extend => 3,
            IrItem::Func(_) => 4,
        }
    }

    fn name(&self) -> &str {
        match self {
            IrItem::Const(item) => &item.name,
            IrItem::Type(item) => &item.name,
            IrItem::Behavior(item) => &item.name,
            IrItem::Func(item) => &item.name,
        }
    }

    pub fn stable_id(&self) -> &str {
        match self {
            IrItem::Const(item) => &item.stable_id,
            IrItem::Type(item) => &item.stable_id,
            IrItem::Behavior(item) => &item.stable_id,
            IrItem::Func(item) => &item.stable_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrConst {
    pub stable_id: String,
    pub name: String,
    pub public: bool,
    pub ty: Type,
    pub value: IrExpr,
    pub directives: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrTypeKind {
    /// Fields alphabetized; this order is also the memory layout order.
    Struct(Vec<(String, Type)>),
    /// Variants in source order; the index is the tag.
    Enum(Vec<(String, Vec<Type>)>),
    Alias(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrTypeDef {
    pub stable_id: String,
    pub name: String,
    pub public: bool,
    pub generics: Vec<String>,
    pub kind: IrTypeKind,
    pub directives: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrBehavior {
    pub stable_id: String,
    pub name: String,
    pub public: bool,
    pub associated_types: Vec<String>,
    /// `(name, params, return)` — alphabetical by name; also the vtable
    /// slot order.
    pub methods: Vec<(String, Vec<Type>, Type)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunc {
    pub stable_id: String,
    /// Display name: `add` or `File::read` for extend methods.
    pub name: String,
    /// Link symbol base: `module::path::name`.
    pub symbol: String,
    pub public: bool,
    pub is_async: bool,
    pub from_extend: bool,
    pub generics: Vec<String>,
    pub params: Vec<(String, Type)>,
    pub return_type: Type,
    pub effects: EffectRow,
    pub body: IrExpr,
    pub directives: Vec<(String, String)>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrArm {
    pub pattern: IrPattern,
    pub value: IrExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrPattern {
    Wildcard,
    Const(PatternConst),
    Binding(String, Type),
    Range {
        lo: PatternConst,
        hi: PatternConst,
        inclusive: bool,
    },
    Variant {
        enum_name: String,
        variant: String,
        tag: usize,
        subs: Vec<IrPattern>,
    },
    Tuple(Vec<IrPattern>),
    Struct {
        name: String,
        /// `(field, sub)` in the canonical (alphabetical) field order.
        fields: Vec<(String, IrPattern)>,
    },
    Array {
        subs: Vec<IrPattern>,
        rest: Option<String>,
    },
    Or(Vec<IrPattern>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrExpr {
    Unit,
    Int { value: i128, ty: Type },
    Float { value: f64, ty: Type },
    Bool(bool),
    Char(char),
    Str(String),
    Local { name: String, ty: Type },
    /// Reference to an item: a function, constant or runtime primitive.
    Global { name: String, ty: Type },
    LetBind {
        name: String,
        mutable: bool,
        ty: Type,
        value: Box<IrExpr>,
    },
    Assign {
        target: Box<IrExpr>,
        value: Box<IrExpr>,
    },
    Call {
        callee: Box<IrExpr>,
        args: Vec<IrExpr>,
        ty: Type,
    },
    /// Indirect call through a `dyn Behavior` fat pointer: load the
    /// vtable slot, call with the data pointer as receiver.
    DynCall {
        receiver: Box<IrExpr>,
        behavior: String,
        method: String,
        /// Vtable slot index (behavior methods in alphabetical order).
        slot: usize,
        args: Vec<IrExpr>,
        ty: Type,
    },
    Binary {
        op: BinaryOp,
        left: Box<IrExpr>,
        right: Box<IrExpr>,
        ty: Type,
    },
    Unary {
        op: UnaryOp,
        operand: Box<IrExpr>,
        ty: Type,
    },
    Block {
        body: Vec<IrExpr>,
        /// Drop calls on the fall-through edge, already ordered.
        drops: Vec<String>,
        ty: Type,
    },
    If {
        condition: Box<IrExpr>,
        then_branch: Box<IrExpr>,
        else_branch: Option<Box<IrExpr>>,
        ty: Type,
    },
    When {
        scrutinee: Box<IrExpr>,
        arms: Vec<IrArm>,
        ty: Type,
    },
    While {
        condition: Box<IrExpr>,
        body: Box<IrExpr>,
    },
    Loop {
        body: Box<IrExpr>,
    },
    /// Next element of an iterable; terminates the enclosing loop when
    /// the source is exhausted.
    IterNext {
        source: Box<IrExpr>,
        ty: Type,
    },
    Break { drops: Vec<String> },
    Continue { drops: Vec<String> },
    Return {
        value: Option<Box<IrExpr>>,
        drops: Vec<String>,
    },
    Borrow {
        target: Box<IrExpr>,
        mutable: bool,
        ty: Type,
    },
    Deref {
        target: Box<IrExpr>,
        ty: Type,
    },
    Field {
        receiver: Box<IrExpr>,
        name: String,
        ty: Type,
    },
    Index {
        receiver: Box<IrExpr>,
        index: Box<IrExpr>,
        ty: Type,
    },
    TupleNew {
        elements: Vec<IrExpr>,
        ty: Type,
    },
    ArrayNew {
        elements: Vec<IrExpr>,
        ty: Type,
    },
    ArrayRepeat {
        value: Box<IrExpr>,
        count: u64,
        ty: Type,
    },
    StructNew {
        name: String,
        /// `(field, value)` in written order — initializer operand order
        /// is evaluation order and therefore preserved. Only the type
        /// declaration's field list is canonicalized.
        fields: Vec<(String, IrExpr)>,
        ty: Type,
    },
    EnumNew {
        enum_name: String,
        variant: String,
        tag: usize,
        payload: Vec<IrExpr>,
        ty: Type,
    },
    StrConcat { parts: Vec<IrExpr> },
    /// Convert a printable primitive to a string (interpolation holes).
    ToStr { value: Box<IrExpr>, from: Type },
    Closure {
        params: Vec<(String, Type)>,
        captures: Vec<Capture>,
        body: Box<IrExpr>,
        ty: Type,
    },
    /// Materialize a `dyn Behavior` fat pointer from a concrete value.
    AsDyn {
        value: Box<IrExpr>,
        behavior: String,
        concrete: String,
        ty: Type,
    },
    Await {
        value: Box<IrExpr>,
        ty: Type,
    },
    Propagate {
        value: Box<IrExpr>,
        ty: Type,
    },
    Cast {
        value: Box<IrExpr>,
        from: Type,
        to: Type,
    },
}

impl IrExpr {
    pub fn ty(&self) -> Type {
        match self {
            IrExpr::Unit
            | IrExpr::LetBind { .. }
            | IrExpr::Assign { .. }
            | IrExpr::While { .. }
            | IrExpr::Loop { .. } => Type::Unit,
            IrExpr::Break { .. } | IrExpr::Continue { .. } | IrExpr::Return { .. } => Type::Never,
            IrExpr::Int { ty, .. }
            | IrExpr::Float { ty, .. }
            | IrExpr::Local { ty, .. }
            | IrExpr::Global { ty, .. }
            | IrExpr::Call { ty, .. }
            | IrExpr::DynCall { ty, .. }
            | IrExpr::Binary { ty, .. }
            | IrExpr::Unary { ty, .. }
            | IrExpr::Block { ty, .. }
            | IrExpr::If { ty, .. }
            | IrExpr::When { ty, .. }
            | IrExpr::IterNext { ty, .. }
            | IrExpr::Borrow { ty, .. }
            | IrExpr::Deref { ty, .. }
            | IrExpr::Field { ty, .. }
            | IrExpr::Index { ty, .. }
            | IrExpr::TupleNew { ty, .. }
            | IrExpr::ArrayNew { ty, .. }
            | IrExpr::ArrayRepeat { ty, .. }
            | IrExpr::StructNew { ty, .. }
            | IrExpr::EnumNew { ty, .. }
            | IrExpr::Closure { ty, .. }
            | IrExpr::AsDyn { ty, .. }
            | IrExpr::Await { ty, .. }
            | IrExpr::Propagate { ty, .. } => ty.clone(),
            IrExpr::Bool(_) => Type::Boolean,
            IrExpr::Char(_) => Type::Character,
            IrExpr::Str(_) | IrExpr::StrConcat { .. } | IrExpr::ToStr { .. } => Type::String,
            IrExpr::Cast { to, .. } => to.clone(),
        }
    }
}

// ---- canonicalization ------------------------------------------------

/// Lower the checked program to canonical IR. Deterministic by
/// construction: all orderings are fixed, no iteration over hash maps.
pub fn canonicalize(
    session: &Session,
    checked: &CheckedProgram,
    ownership: &OwnershipAnalysis,
    effects: &EffectTable,
) -> IrProgram {
    let mut canonicalizer = Canonicalizer {
        ctx: &checked.ctx,
        ownership,
        effects,
        ids: StableIdRegistry::new(),
        version: session.options.ir_version.clone(),
        current_return: None,
    };
    let modules = checked
        .modules
        .iter()
        .map(|module| canonicalizer.module(module))
        .collect();
    debug!("canonicalized {} module(s)", checked.modules.len());
    IrProgram { modules }
}

struct Canonicalizer<'a> {
    ctx: &'a Context,
    ownership: &'a OwnershipAnalysis,
    effects: &'a EffectTable,
    ids: StableIdRegistry,
    version: String,
    /// Return type of the function being lowered; `return` values coerce
    /// against it.
    current_return: Option<Type>,
}

fn directive_pairs(directives: &[AiDirective]) -> Vec<(String, String)> {
    directives
        .iter()
        .map(|d| (d.name.clone(), d.payload.clone()))
        .collect()
}

impl<'a> Canonicalizer<'a> {
    fn module(&mut self, module: &Module<TypeInformation>) -> IrModule {
        let module_path = module.path_string();
        let mut items: Vec<IrItem> = vec![];

        for declaration in &module.declarations {
            match declaration {
                Declaration::Const(decl) => {
                    let ty = decl.info.resolved();
                    let stable_id = self.ids.assign(
                        &module_path,
                        &decl.name.name,
                        &format!("const {ty}"),
                        decl.stable_id.as_deref(),
                    );
                    items.push(IrItem::Const(IrConst {
                        stable_id,
                        name: decl.name.name.clone(),
                        public: decl.visibility.is_public(),
                        ty,
                        value: self.expr(&decl.value),
                        directives: directive_pairs(&decl.directives),
                    }));
                }
                Declaration::Type(decl) => items.push(self.type_item(&module_path, decl)),
                Declaration::Behavior(decl) => items.push(self.behavior_item(&module_path, decl)),
                Declaration::Function(function) => {
                    items.push(IrItem::Func(self.func_item(
                        &module_path,
                        function,
                        None,
                    )));
                }
                Declaration::Extend(extend) => {
                    for method in &extend.methods {
                        items.push(IrItem::Func(self.func_item(
                            &module_path,
                            method,
                            Some(&extend.target),
                        )));
                    }
                }
                Declaration::Use(_) | Declaration::Mod(_) | Declaration::Error(_) => {}
            }
        }

        // Kind order first, then alphabetical within the kind.
        items.sort_by(|a, b| {
            a.kind_rank()
                .cmp(&b.kind_rank())
                .then_with(|| a.name().cmp(b.name()))
        });

        IrModule {
            path: module_path,
            version: self.version.clone(),
            items,
        }
    }

    fn type_item(&mut self, module_path: &str, decl: &TypeDecl) -> IrItem {
        let def = self
            .ctx
            .definitions
            .get_type(&decl.name)
            .expect("registered during type checking");
        let kind = match &def.kind {
            TypeDefKind::Struct(struct_def) => {
                let mut fields: Vec<(String, Type)> = struct_def
                    .fields
                    .iter()
                    .map(|(name, ty, _)| (name.clone(), ty.clone()))
                    .collect();
                fields.sort_by(|(a, _), (b, _)| a.cmp(b));
                IrTypeKind::Struct(fields)
            }
            TypeDefKind::Enum(enum_def) => IrTypeKind::Enum(enum_def.variants.clone()),
            TypeDefKind::Alias(target) => IrTypeKind::Alias(target.clone()),
        };
        let signature = crate::resolver::declaration_signature(&Declaration::<()>::Type(
            decl.clone(),
        ))
        .unwrap_or_default();
        let stable_id = self.ids.assign(
            module_path,
            &decl.name,
            &signature,
            decl.stable_id.as_deref(),
        );
        IrItem::Type(IrTypeDef {
            stable_id,
            name: decl.name.clone(),
            public: decl.visibility.is_public(),
            generics: decl.generics.iter().map(|g| g.name.clone()).collect(),
            kind,
            directives: directive_pairs(&decl.directives),
        })
    }

    fn behavior_item(&mut self, module_path: &str, decl: &BehaviorDecl) -> IrItem {
        let def = self
            .ctx
            .definitions
            .get_behavior(&decl.name)
            .expect("registered during type checking");
        let mut methods: Vec<(String, Vec<Type>, Type)> = def
            .methods
            .iter()
            .map(|m| (m.name.clone(), m.params.clone(), m.return_value.clone()))
            .collect();
        methods.sort_by(|(a, _, _), (b, _, _)| a.cmp(b));

        let signature = crate::resolver::declaration_signature(&Declaration::<()>::Behavior(
            decl.clone(),
        ))
        .unwrap_or_default();
        let stable_id = self.ids.assign(
            module_path,
            &decl.name,
            &signature,
            decl.stable_id.as_deref(),
        );
        IrItem::Behavior(IrBehavior {
            stable_id,
            name: decl.name.clone(),
            public: decl.visibility.is_public(),
            associated_types: decl.associated_types.clone(),
            methods,
        })
    }

    fn func_item(
        &mut self,
        module_path: &str,
        function: &FunctionDecl<TypeInformation>,
        extend_target: Option<&TypeName>,
    ) -> IrFunc {
        let target_type = extend_target
            .map(|target| Type::try_from((target, self.ctx)).unwrap_or(Type::Error));

        let mut params: Vec<(String, Type)> = vec![];
        if let (Some(mutable), Some(target_ty)) = (function.this_param, &target_type) {
            params.push((
                "this".to_string(),
                Type::reference(target_ty.clone(), mutable),
            ));
        }
        params.extend(
            function
                .parameters
                .iter()
                .map(|p| (p.name.name.clone(), p.name.info.resolved())),
        );
        let return_type = match function.info.resolved() {
            Type::Function { return_value, .. } => *return_value,
            _ => Type::Unit,
        };

        let (name, effect_key) = match (extend_target, &target_type) {
            (Some(target), Some(target_ty)) => {
                let target_head = target_ty.head_name().unwrap_or("?").to_string();
                (
                    format!("{target_head}::{}", function.name.name),
                    format!("{module_path}::{target}::{}", function.name.name),
                )
            }
            _ => (
                function.name.name.clone(),
                format!("{module_path}::{}", function.name.name),
            ),
        };

        let effects = self
            .effects
            .get(&effect_key)
            .cloned()
            .or_else(|| {
                function
                    .declared_effects
                    .as_ref()
                    .map(|paths| EffectRow::from_paths(paths))
            })
            .unwrap_or_default();

        // Name-independent signature: parameter renames keep the ID.
        let mut signature = format!(
            "func({})",
            params
                .iter()
                .map(|(_, ty)| ty.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        signature.push_str(&format!(" -> {return_type}"));
        if !effects.is_pure() {
            signature.push_str(&format!(" uses {}", effects.render()));
        }

        let stable_id = self.ids.assign(
            module_path,
            &name,
            &signature,
            function.stable_id.as_deref(),
        );

        self.current_return = Some(return_type.clone());
        let body = self.block(&function.body, !matches!(return_type, Type::Unit));
        self.current_return = None;

        IrFunc {
            stable_id,
            name,
            symbol: effect_key,
            public: function.visibility.is_public(),
            is_async: function.is_async,
            from_extend: extend_target.is_some(),
            generics: function.generics.iter().map(|g| g.name.clone()).collect(),
            params,
            return_type,
            effects,
            body,
            directives: directive_pairs(&function.directives),
            span: function.position,
        }
    }

    // ---- statements --------------------------------------------------

    fn block(&mut self, block: &Block<TypeInformation>, tail_is_value: bool) -> IrExpr {
        let drops = self
            .ownership
            .drops
            .get(&block.id)
            .cloned()
            .unwrap_or_default();
        let ty = block.info.resolved();

        let mut body = vec![];
        let total = block.statements.len();
        for (index, statement) in block.statements.iter().enumerate() {
            let is_tail = index + 1 == total;
            body.push(self.statement(statement, tail_is_value && is_tail));
        }

        IrExpr::Block { body, drops, ty }
    }

    fn statement(&mut self, statement: &Statement<TypeInformation>, _is_value_tail: bool) -> IrExpr {
        match statement {
            Statement::Let(let_stmt) => {
                let ty = let_stmt.name.info.resolved();
                let lowered = self.expr(&let_stmt.value);
                let value = self.coerce(lowered, &ty);
                IrExpr::LetBind {
                    name: let_stmt.name.name.clone(),
                    mutable: let_stmt.mutable,
                    ty,
                    value: Box::new(value),
                }
            }
            Statement::Assignment(assignment) => {
                let target = self.expr(&assignment.target);
                let raw_value = self.expr(&assignment.value);
                // `x += e` canonicalizes to assign-of-add.
                let value = match assignment.op {
                    Some(op) => IrExpr::Binary {
                        op,
                        left: Box::new(target.clone()),
                        right: Box::new(raw_value),
                        ty: target.ty(),
                    },
                    None => self.coerce(raw_value, &target.ty()),
                };
                IrExpr::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                }
            }
            Statement::Return(ret) => {
                let drops = self
                    .ownership
                    .drops
                    .get(&ret.id)
                    .cloned()
                    .unwrap_or_default();
                let expected = self.current_return.clone();
                IrExpr::Return {
                    value: ret.value.as_ref().map(|value| {
                        let lowered = self.expr(value);
                        match &expected {
                            Some(expected) => Box::new(self.coerce(lowered, expected)),
                            None => Box::new(lowered),
                        }
                    }),
                    drops,
                }
            }
            Statement::Break(break_stmt) => IrExpr::Break {
                drops: self
                    .ownership
                    .drops
                    .get(&break_stmt.id)
                    .cloned()
                    .unwrap_or_default(),
            },
            Statement::Continue(continue_stmt) => IrExpr::Continue {
                drops: self
                    .ownership
                    .drops
                    .get(&continue_stmt.id)
                    .cloned()
                    .unwrap_or_default(),
            },
            Statement::WhileLoop(while_loop) => IrExpr::While {
                condition: Box::new(self.expr(&while_loop.condition)),
                body: Box::new(self.block(&while_loop.body, false)),
            },
            Statement::Loop(loop_stmt) => IrExpr::Loop {
                body: Box::new(self.block(&loop_stmt.body, false)),
            },
            Statement::ForLoop(for_loop) => self.lower_for(for_loop),
            Statement::Expression(expression) | Statement::YieldingExpression(expression) => {
                self.expr(expression)
            }
            Statement::Error(_) => IrExpr::Unit,
        }
    }

    /// `for x in it { … }` — ranges become `loop` + `iter-next`; arrays
    /// become an index-cursor `while`.
    fn lower_for(&mut self, for_loop: &ForLoop<TypeInformation>) -> IrExpr {
        let binder_ty = for_loop.binder.info.resolved();
        let iter_ty = expression_info(&for_loop.iterable).resolved();
        let iterable = self.expr(&for_loop.iterable);

        let shape = self.ctx.shape_of(&iter_ty);
        if let Type::Array(element, count) = shape.peel_references() {
            return self.lower_for_array(for_loop, iterable, (**element).clone(), *count);
        }

        let mut body = vec![IrExpr::LetBind {
            name: for_loop.binder.name.clone(),
            mutable: false,
            ty: binder_ty.clone(),
            value: Box::new(IrExpr::IterNext {
                source: Box::new(IrExpr::Local {
                    name: "%iter".to_string(),
                    ty: iter_ty.clone(),
                }),
                ty: binder_ty,
            }),
        }];
        if let IrExpr::Block {
            body: inner,
            drops,
            ..
        } = self.block(&for_loop.body, false)
        {
            body.extend(inner);
            body.push(IrExpr::Block {
                body: vec![],
                drops,
                ty: Type::Unit,
            });
        }

        IrExpr::Block {
            body: vec![
                IrExpr::LetBind {
                    name: "%iter".to_string(),
                    mutable: true,
                    ty: iter_ty,
                    value: Box::new(iterable),
                },
                IrExpr::Loop {
                    body: Box::new(IrExpr::Block {
                        body,
                        drops: vec![],
                        ty: Type::Unit,
                    }),
                },
            ],
            drops: vec![],
            ty: Type::Unit,
        }
    }

    fn lower_for_array(
        &mut self,
        for_loop: &ForLoop<TypeInformation>,
        iterable: IrExpr,
        element: Type,
        count: u64,
    ) -> IrExpr {
        let array_ty = iterable.ty();
        let index_ty = Type::Int(crate::typechecker::types::IntKind::I64);
        let index_local = || IrExpr::Local {
            name: "%idx".to_string(),
            ty: index_ty.clone(),
        };

        let mut while_body = vec![IrExpr::LetBind {
            name: for_loop.binder.name.clone(),
            mutable: false,
            ty: element.clone(),
            value: Box::new(IrExpr::Index {
                receiver: Box::new(IrExpr::Local {
                    name: "%arr".to_string(),
                    ty: array_ty.clone(),
                }),
                index: Box::new(index_local()),
                ty: element,
            }),
        }];
        if let IrExpr::Block { body, drops, .. } = self.block(&for_loop.body, false) {
            while_body.extend(body);
            while_body.push(IrExpr::Block {
                body: vec![],
                drops,
                ty: Type::Unit,
            });
        }
        while_body.push(IrExpr::Assign {
            target: Box::new(index_local()),
            value: Box::new(IrExpr::Binary {
                op: BinaryOp::Add,
                left: Box::new(index_local()),
                right: Box::new(IrExpr::Int {
                    value: 1,
                    ty: index_ty.clone(),
                }),
                ty: index_ty.clone(),
            }),
        });

        IrExpr::Block {
            body: vec![
                IrExpr::LetBind {
                    name: "%arr".to_string(),
                    mutable: false,
                    ty: array_ty,
                    value: Box::new(iterable),
                },
                IrExpr::LetBind {
                    name: "%idx".to_string(),
                    mutable: true,
                    ty: index_ty.clone(),
                    value: Box::new(IrExpr::Int {
                        value: 0,
                        ty: index_ty.clone(),
                    }),
                },
                IrExpr::While {
                    condition: Box::new(IrExpr::Binary {
                        op: BinaryOp::Lt,
                        left: Box::new(index_local()),
                        right: Box::new(IrExpr::Int {
                            value: count as i128,
                            ty: index_ty.clone(),
                        }),
                        ty: Type::Boolean,
                    }),
                    body: Box::new(IrExpr::Block {
                        body: while_body,
                        drops: vec![],
                        ty: Type::Unit,
                    }),
                },
            ],
            drops: vec![],
            ty: Type::Unit,
        }
    }

    // ---- expressions --------------------------------------------------

    /// Insert a `dyn` coercion when the expected type is an existential
    /// and the value is concrete.
    fn coerce(&self, value: IrExpr, expected: &Type) -> IrExpr {
        if let Type::DynBehavior(behavior) = expected {
            let value_ty = value.ty();
            if !matches!(value_ty, Type::DynBehavior(_) | Type::Error) {
                if let Some(concrete) = value_ty.head_name().map(str::to_string) {
                    return IrExpr::AsDyn {
                        value: Box::new(value),
                        behavior: behavior.clone(),
                        concrete,
                        ty: expected.clone(),
                    };
                }
            }
        }
        value
    }

    fn expr(&mut self, expression: &Expression<TypeInformation>) -> IrExpr {
        let ty = expression_info(expression).resolved();
        match expression {
            Expression::Literal(literal) => match &literal.value {
                LiteralValue::Int { value, .. } => IrExpr::Int {
                    value: *value as i128,
                    ty,
                },
                LiteralValue::Float { value, .. } => IrExpr::Float { value: *value, ty },
                LiteralValue::Bool(b) => IrExpr::Bool(*b),
                LiteralValue::Char(c) => IrExpr::Char(*c),
                LiteralValue::Str(s) => IrExpr::Str(s.clone()),
                LiteralValue::Unit => IrExpr::Unit,
            },
            Expression::Path(path) => self.path_expr(path, ty),
            Expression::Interpolation(interp) => {
                let mut parts = vec![];
                for (index, part) in interp.parts.iter().enumerate() {
                    if !part.is_empty() {
                        parts.push(IrExpr::Str(part.clone()));
                    }
                    if let Some(hole) = interp.holes.get(index) {
                        let lowered = self.expr(hole);
                        let from = lowered.ty();
                        if matches!(from, Type::String) {
                            parts.push(lowered);
                        } else {
                            parts.push(IrExpr::ToStr {
                                value: Box::new(lowered),
                                from,
                            });
                        }
                    }
                }
                IrExpr::StrConcat { parts }
            }
            Expression::Unary(unary) => IrExpr::Unary {
                op: unary.op,
                operand: Box::new(self.expr(&unary.operand)),
                ty,
            },
            Expression::Binary(binary) => IrExpr::Binary {
                op: binary.op,
                left: Box::new(self.expr(&binary.left)),
                right: Box::new(self.expr(&binary.right)),
                ty,
            },
            Expression::Call(call) => self.call_expr(call, ty),
            Expression::MethodCall(call) => self.method_call_expr(call, ty),
            Expression::FieldAccess(access) => IrExpr::Field {
                receiver: Box::new(self.expr(&access.receiver)),
                name: access.field.name.clone(),
                ty,
            },
            Expression::Index(index) => IrExpr::Index {
                receiver: Box::new(self.expr(&index.receiver)),
                index: Box::new(self.expr(&index.index)),
                ty,
            },
            Expression::Tuple(tuple) => IrExpr::TupleNew {
                elements: tuple.elements.iter().map(|e| self.expr(e)).collect(),
                ty,
            },
            Expression::Array(ArrayLiteral::List { elements, .. }) => IrExpr::ArrayNew {
                elements: elements.iter().map(|e| self.expr(e)).collect(),
                ty,
            },
            Expression::Array(ArrayLiteral::Repeat { value, .. }) => {
                // The element count was folded into the array type.
                let count = match &ty {
                    Type::Array(_, count) => *count,
                    _ => 0,
                };
                IrExpr::ArrayRepeat {
                    value: Box::new(self.expr(value)),
                    count,
                    ty,
                }
            }
            Expression::StructInit(init) => IrExpr::StructNew {
                name: init.name.last().to_string(),
                fields: init
                    .fields
                    .iter()
                    .map(|field| (field.name.name.clone(), self.expr(&field.value)))
                    .collect(),
                ty,
            },
            Expression::If(if_expr) => IrExpr::If {
                condition: Box::new(self.expr(&if_expr.condition)),
                then_branch: Box::new(self.expr(&if_expr.then_branch)),
                else_branch: if_expr
                    .else_branch
                    .as_ref()
                    .map(|branch| Box::new(self.expr(branch))),
                ty,
            },
            Expression::When(when) => IrExpr::When {
                scrutinee: Box::new(self.expr(&when.scrutinee)),
                arms: when
                    .arms
                    .iter()
                    .map(|arm| IrArm {
                        pattern: self.pattern(&arm.pattern),
                        value: self.expr(&arm.value),
                    })
                    .collect(),
                ty,
            },
            Expression::Block(block) => self.block(block, true),
            Expression::Closure(closure) => {
                let captures = self
                    .ownership
                    .captures
                    .get(&closure.id)
                    .cloned()
                    .unwrap_or_default();
                IrExpr::Closure {
                    params: closure
                        .parameters
                        .iter()
                        .map(|p| (p.name.name.clone(), p.name.info.resolved()))
                        .collect(),
                    captures,
                    body: Box::new(self.expr(&closure.body)),
                    ty,
                }
            }
            Expression::Range(range) => {
                // A range value is a two-field struct; `iter-next` and
                // codegen understand its layout directly. Field order
                // here is evaluation order (low before high), matching
                // the source.
                let low = self.expr(&range.low);
                let mut high = self.expr(&range.high);
                if range.inclusive {
                    let high_ty = high.ty();
                    high = IrExpr::Binary {
                        op: BinaryOp::Add,
                        left: Box::new(high),
                        right: Box::new(IrExpr::Int {
                            value: 1,
                            ty: high_ty.clone(),
                        }),
                        ty: high_ty,
                    };
                }
                IrExpr::StructNew {
                    name: "Range".to_string(),
                    fields: vec![("low".to_string(), low), ("high".to_string(), high)],
                    ty,
                }
            }
            Expression::Borrow(borrow) => IrExpr::Borrow {
                target: Box::new(self.expr(&borrow.target)),
                mutable: borrow.mutable,
                ty,
            },
            Expression::Deref(deref) => IrExpr::Deref {
                target: Box::new(self.expr(&deref.target)),
                ty,
            },
            Expression::Await(await_expr) => IrExpr::Await {
                value: Box::new(self.expr(&await_expr.target)),
                ty,
            },
            Expression::Propagate(propagate) => IrExpr::Propagate {
                value: Box::new(self.expr(&propagate.target)),
                ty,
            },
            Expression::Cast(cast) => {
                let value = self.expr(&cast.value);
                let from = value.ty();
                IrExpr::Cast {
                    value: Box::new(value),
                    from,
                    to: ty,
                }
            }
            Expression::Error(..) => IrExpr::Unit,
        }
    }

    /// A path in value position: local, enum constructor (unit variant),
    /// or a global item reference.
    fn path_expr(&mut self, path: &Path<TypeInformation>, ty: Type) -> IrExpr {
        if path.segments.len() == 1 {
            let name = &path.segments[0];
            if let Some((enum_name, tag)) = self.unit_variant(name, &ty) {
                return IrExpr::EnumNew {
                    enum_name,
                    variant: name.clone(),
                    tag,
                    payload: vec![],
                    ty,
                };
            }
            if path.info.context.scope.is_local_binding(name) {
                return IrExpr::Local {
                    name: name.clone(),
                    ty,
                };
            }
        }
        IrExpr::Global {
            name: path.joined(),
            ty,
        }
    }

    /// Is this bare name a payload-free variant of the expression's enum
    /// type?
    fn unit_variant(&self, name: &str, ty: &Type) -> Option<(String, usize)> {
        let shape = self.ctx.shape_of(ty);
        let Type::Named { name: enum_name, .. } = shape.peel_references() else {
            return None;
        };
        let def = self.ctx.definitions.get_type(enum_name)?;
        let TypeDefKind::Enum(enum_def) = &def.kind else {
            return None;
        };
        let tag = enum_def.tag_of(name)?;
        if enum_def.payload_of(name)?.is_empty() {
            Some((enum_name.clone(), tag))
        } else {
            None
        }
    }

    fn call_expr(&mut self, call: &Call<TypeInformation>, ty: Type) -> IrExpr {
        // Enum constructor calls become `enum-new`.
        if let Expression::Path(path) = &call.callee {
            let last = path.last().to_string();
            let shape = self.ctx.shape_of(&ty);
            if let Type::Named { name: enum_name, .. } = shape.peel_references() {
                if let Some(def) = self.ctx.definitions.get_type(enum_name) {
                    if let TypeDefKind::Enum(enum_def) = &def.kind {
                        if let Some(tag) = enum_def.tag_of(&last) {
                            let payload =
                                call.arguments.iter().map(|a| self.expr(a)).collect();
                            return IrExpr::EnumNew {
                                enum_name: enum_name.clone(),
                                variant: last,
                                tag,
                                payload,
                                ty,
                            };
                        }
                    }
                }
            }
        }

        let callee = self.expr(&call.callee);
        let param_types = match callee.ty() {
            Type::Function { params, .. } => params,
            _ => vec![],
        };
        let args = call
            .arguments
            .iter()
            .enumerate()
            .map(|(index, argument)| {
                let lowered = self.expr(argument);
                match param_types.get(index) {
                    Some(expected) => self.coerce(lowered, expected),
                    None => lowered,
                }
            })
            .collect();
        IrExpr::Call {
            callee: Box::new(callee),
            args,
            ty,
        }
    }

    /// Method calls canonicalize to static calls with the receiver as
    /// the first argument: `x.read()` → `(call File::read x)`. A `dyn`
    /// receiver dispatches through its vtable slot instead.
    fn method_call_expr(&mut self, call: &MethodCall<TypeInformation>, ty: Type) -> IrExpr {
        let receiver = self.expr(&call.receiver);
        let receiver_ty = receiver.ty();
        let shape = self.ctx.shape_of(&receiver_ty);

        if let Type::DynBehavior(behavior) = shape.peel_references() {
            let slot = self
                .ctx
                .definitions
                .get_behavior(behavior)
                .map(|def| {
                    let mut names: Vec<String> =
                        def.methods.iter().map(|m| m.name.clone()).collect();
                    names.sort_unstable();
                    names
                        .iter()
                        .position(|name| *name == call.method.name)
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            return IrExpr::DynCall {
                receiver: Box::new(receiver),
                behavior: behavior.clone(),
                method: call.method.name.clone(),
                slot,
                args: call.arguments.iter().map(|a| self.expr(a)).collect(),
                ty,
            };
        }

        let head = shape
            .peel_references()
            .head_name()
            .unwrap_or("?")
            .to_string();

        let mut args = vec![receiver];
        args.extend(call.arguments.iter().map(|a| self.expr(a)));

        IrExpr::Call {
            callee: Box::new(IrExpr::Global {
                name: format!("{head}::{}", call.method.name),
                ty: Type::Function {
                    params: vec![],
                    return_value: Box::new(ty.clone()),
                    effects: EffectRow::pure(),
                },
            }),
            args,
            ty,
        }
    }

    fn pattern(&mut self, pattern: &Pattern<TypeInformation>) -> IrPattern {
        match pattern {
            Pattern::Wildcard(_) => IrPattern::Wildcard,
            Pattern::Literal(literal) => IrPattern::Const(literal.value.clone()),
            Pattern::Binding(binding) => IrPattern::Binding(
                binding.name.name.clone(),
                binding.name.info.resolved(),
            ),
            Pattern::Range(range) => IrPattern::Range {
                lo: range.low.clone(),
                hi: range.high.clone(),
                inclusive: range.inclusive,
            },
            Pattern::EnumVariant(variant) => {
                let variant_name = variant.path.last().to_string();
                let shape = self.ctx.shape_of(&variant.info.resolved());
                let (enum_name, tag) = match shape.peel_references() {
                    Type::Named { name, .. } => {
                        let tag = self
                            .ctx
                            .definitions
                            .get_type(name)
                            .and_then(|def| match def.kind {
                                TypeDefKind::Enum(enum_def) => enum_def.tag_of(&variant_name),
                                _ => None,
                            })
                            .unwrap_or(0);
                        (name.clone(), tag)
                    }
                    _ => (String::new(), 0),
                };
                IrPattern::Variant {
                    enum_name,
                    variant: variant_name,
                    tag,
                    subs: variant.payload.iter().map(|sub| self.pattern(sub)).collect(),
                }
            }
            Pattern::Tuple(tuple) => IrPattern::Tuple(
                tuple.elements.iter().map(|sub| self.pattern(sub)).collect(),
            ),
            Pattern::Struct(struct_pattern) => {
                let mut fields: Vec<(String, IrPattern)> = struct_pattern
                    .fields
                    .iter()
                    .map(|field| (field.name.name.clone(), self.pattern(&field.pattern)))
                    .collect();
                fields.sort_by(|(a, _), (b, _)| a.cmp(b));
                IrPattern::Struct {
                    name: struct_pattern.name.last().to_string(),
                    fields,
                }
            }
            Pattern::Array(array) => IrPattern::Array {
                subs: array.elements.iter().map(|sub| self.pattern(sub)).collect(),
                rest: array.rest.as_ref().map(|rest| rest.name.clone()),
            },
            Pattern::Or(or) => IrPattern::Or(
                or.alternatives
                    .iter()
                    .map(|sub| self.pattern(sub))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::test_helpers::check_source;

    pub(crate) fn canonicalize_source(src: &str) -> (Session, IrProgram) {
        let (session, checked) = check_source(src);
        assert!(
            !session.has_errors(),
            "errors before canonicalization: {:?}",
            session.diagnostics.entries()
        );
        let ownership = crate::ownership::analyze(&session, &checked);
        let effects = crate::effects::EffectTable::new();
        let program = canonicalize(&session, &checked, &ownership, &effects);
        (session, program)
    }

    fn func_named<'p>(program: &'p IrProgram, name: &str) -> &'p IrFunc {
        program
            .modules
            .iter()
            .flat_map(|m| &m.items)
            .find_map(|item| match item {
                IrItem::Func(func) if func.name == name => Some(func),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no function named {name}"))
    }

    #[test]
    fn test_items_ordered_by_kind_then_name() {
        let (_, program) = canonicalize_source(
            "func zeta() { }\n\
             const OMEGA: I32 = 1;\n\
             type Beta = I32;\n\
             func alpha() { }\n\
             behavior Gamma { func g(this); }",
        );
        let names: Vec<&str> = program.modules[0]
            .items
            .iter()
            .map(|item| item.name())
            .collect();
        assert_eq!(names, vec!["OMEGA", "Beta", "Gamma", "alpha", "zeta"]);
    }

    #[test]
    fn test_struct_fields_alphabetized_enum_variants_not() {
        let (_, program) = canonicalize_source(
            "type Point = { y: I32, x: I32 };\n\
             type Order = Zebra | Apple | Mango;",
        );
        let items = &program.modules[0].items;
        let IrItem::Type(point) = &items[1] else {
            panic!("expected Point second (alphabetical)");
        };
        let IrTypeKind::Struct(fields) = &point.kind else {
            panic!("expected a struct");
        };
        let field_names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(field_names, vec!["x", "y"]);

        let IrItem::Type(order) = &items[0] else {
            panic!("expected Order first");
        };
        let IrTypeKind::Enum(variants) = &order.kind else {
            panic!("expected an enum");
        };
        let variant_names: Vec<&str> = variants.iter().map(|(n, _)| n.as_str()).collect();
        // Source order governs tags, never alphabetical order.
        assert_eq!(variant_names, vec!["Zebra", "Apple", "Mango"]);
    }

    #[test]
    fn test_enum_tags_follow_source_order() {
        let (_, program) = canonicalize_source(
            "type Maybe[T] = Just(T) | Nothing;\n\
             func wrap(x: I32) -> Maybe[I32] { return Just(x) }\n\
             func empty() -> Maybe[I32] { return Nothing }",
        );
        let wrap = func_named(&program, "wrap");
        let IrExpr::Block { body, .. } = &wrap.body else {
            panic!();
        };
        let IrExpr::Return { value: Some(value), .. } = &body[0] else {
            panic!("expected a return");
        };
        assert!(matches!(&**value, IrExpr::EnumNew { tag: 0, .. }));

        let empty = func_named(&program, "empty");
        let IrExpr::Block { body, .. } = &empty.body else {
            panic!();
        };
        let IrExpr::Return { value: Some(value), .. } = &body[0] else {
            panic!("expected a return");
        };
        assert!(matches!(&**value, IrExpr::EnumNew { tag: 1, .. }));
    }

    #[test]
    fn test_compound_assignment_desugars() {
        let (_, program) =
            canonicalize_source("func f() { let mut x = 1; x += 2; }");
        let func = func_named(&program, "f");
        let IrExpr::Block { body, .. } = &func.body else {
            panic!();
        };
        let IrExpr::Assign { value, .. } = &body[1] else {
            panic!("expected an assignment");
        };
        assert!(matches!(
            &**value,
            IrExpr::Binary { op: BinaryOp::Add, .. }
        ));
    }

    #[test]
    fn test_method_call_becomes_static_call() {
        let (_, program) = canonicalize_source(
            "type Counter = { value: I32 };\n\
             extend Counter { func get(this) -> I32 { return this.value } }\n\
             func f(c: Counter) -> I32 { return c.get() }",
        );
        let func = func_named(&program, "f");
        let IrExpr::Block { body, .. } = &func.body else {
            panic!();
        };
        let IrExpr::Return { value: Some(value), .. } = &body[0] else {
            panic!();
        };
        let IrExpr::Call { callee, args, .. } = &**value else {
            panic!("expected a call");
        };
        assert!(matches!(
            &**callee,
            IrExpr::Global { name, .. } if name == "Counter::get"
        ));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_interpolation_becomes_concat() {
        let (_, program) = canonicalize_source(
            "func f(x: I32) -> Str { return \"x = ${x}!\" }",
        );
        let func = func_named(&program, "f");
        let IrExpr::Block { body, .. } = &func.body else {
            panic!();
        };
        let IrExpr::Return { value: Some(value), .. } = &body[0] else {
            panic!();
        };
        let IrExpr::StrConcat { parts } = &**value else {
            panic!("expected str-concat");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[1], IrExpr::ToStr { .. }));
    }

    #[test]
    fn test_for_desugars_to_loop_with_iter_next() {
        let (_, program) = canonicalize_source(
            "func f(n: I32) { for i in 0 to n { let x = i; } }",
        );
        let func = func_named(&program, "f");
        let IrExpr::Block { body, .. } = &func.body else {
            panic!();
        };
        let IrExpr::Block { body: desugared, .. } = &body[0] else {
            panic!("expected the for-block");
        };
        assert!(matches!(&desugared[0], IrExpr::LetBind { name, .. } if name == "%iter"));
        let IrExpr::Loop { body: loop_body } = &desugared[1] else {
            panic!("expected a loop");
        };
        let IrExpr::Block { body: loop_stmts, .. } = &**loop_body else {
            panic!();
        };
        assert!(matches!(
            &loop_stmts[0],
            IrExpr::LetBind { value, .. } if matches!(&**value, IrExpr::IterNext { .. })
        ));
    }

    #[test]
    fn test_dyn_coercion_inserted_at_return() {
        let (_, program) = canonicalize_source(
            "behavior Reader { func read(this) -> I32; }\n\
             type Mem = { data: I32 };\n\
             extend Mem with Reader { func read(this) -> I32 { return this.data } }\n\
             func open() -> dyn Reader { let m = Mem { data: 1 }; return m }",
        );
        let func = func_named(&program, "open");
        fn find_asdyn(expr: &IrExpr) -> bool {
            match expr {
                IrExpr::AsDyn { .. } => true,
                IrExpr::Block { body, .. } => body.iter().any(find_asdyn),
                IrExpr::Return { value: Some(v), .. } => find_asdyn(v),
                _ => false,
            }
        }
        assert!(matches!(func.return_type, Type::DynBehavior(_)));
        assert!(find_asdyn(&func.body), "expected an as-dyn wrapper");
    }

    #[test]
    fn test_drops_attached_to_block() {
        let (_, program) = canonicalize_source("func f() { let s = \"x\"; }");
        let func = func_named(&program, "f");
        let IrExpr::Block { drops, .. } = &func.body else {
            panic!();
        };
        assert_eq!(drops, &vec!["s".to_string()]);
    }

    #[test]
    fn test_stable_ids_survive_parameter_rename() {
        let (_, first) = canonicalize_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        let (_, second) = canonicalize_source("func add(x: I32, y: I32) -> I32 { return x + y }");
        assert_eq!(
            func_named(&first, "add").stable_id,
            func_named(&second, "add").stable_id
        );
    }

    #[test]
    fn test_stable_ids_unaffected_by_unrelated_additions() {
        let (_, first) = canonicalize_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        let (_, second) = canonicalize_source(
            "func add(a: I32, b: I32) -> I32 { return a + b }\n\
             func unrelated() { }",
        );
        assert_eq!(
            func_named(&first, "add").stable_id,
            func_named(&second, "add").stable_id
        );
    }

    #[test]
    fn test_stable_id_changes_with_signature() {
        let (_, first) = canonicalize_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        let (_, second) = canonicalize_source("func add(a: I64, b: I64) -> I64 { return a + b }");
        assert_ne!(
            func_named(&first, "add").stable_id,
            func_named(&second, "add").stable_id
        );
    }
}
