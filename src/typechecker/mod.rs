//! Type checking and inference.
//!
//! The checker transforms `Module<()>` into `Module<TypeInformation>` in
//! three phases, so items can reference each other freely:
//!
//! 1. **Register** — every type, behavior, constant and function
//!    signature across the module graph lands in the shared
//!    [`Definitions`] registry and the signature table.
//! 2. **Extend** — `extend` blocks attach inherent methods and behavior
//!    impls; impl completeness is verified against the behavior.
//! 3. **Check** — function bodies are inferred bidirectionally:
//!    literals, paths and calls synthesize; block tails and `return`s
//!    check against the declared return type. The union-find
//!    [`unify::Unifier`] carries inference variables; a final validation
//!    pass resolves every node's type slot in place and reports anything
//!    still ambiguous.
//!
//! A failed node receives [`Type::Error`], which unifies with everything,
//! so one mistake produces one diagnostic instead of a cascade.

pub mod behavior;
pub mod context;
pub mod error;
pub mod exhaustive;
mod expr;
pub mod monomorph;
mod pattern;
pub mod scope;
mod stmt;
pub mod types;
pub mod unify;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::effects::EffectRow;
use crate::parser::ast::*;
use crate::resolver::{ModuleGraph, Resolution};
use crate::session::Session;
use crate::source::Span;

use self::behavior::{
    BehaviorDef, Definitions, EnumDef, ImplEntry, MethodDef, StructDef, TypeDef, TypeDefKind,
};
use self::context::Context;
use self::error::*;
use self::monomorph::MonoCache;
use self::types::{primitive_type, Type};

/// Stage marker for checked nodes: a shared, mutable type slot plus the
/// scope snapshot the node was checked in. Slots hold inference-variable
/// types until validation zonks them in place.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInformation {
    pub type_id: Rc<RefCell<Option<Type>>>,
    pub context: Context,
}

impl TypeInformation {
    pub fn resolved(&self) -> Type {
        self.type_id
            .borrow()
            .clone()
            .unwrap_or(Type::Error)
    }
}

/// A registered function signature, shared across modules.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub qualified: String,
    /// Generic parameters with their behavior bounds (inline + `where`).
    pub generics: Vec<(String, Vec<String>)>,
    pub this_param: Option<bool>,
    pub params: Vec<Type>,
    pub return_value: Type,
    pub effects: EffectRow,
    pub is_async: bool,
}

impl FunctionSig {
    pub fn function_type(&self) -> Type {
        Type::Function {
            params: self.params.clone(),
            return_value: Box::new(self.return_value.clone()),
            effects: self.effects.clone(),
        }
    }
}

/// A deferred `T: Behavior` obligation, checked once inference settles.
struct Obligation {
    argument: Type,
    param: String,
    bound: String,
    span: Span,
}

pub struct TypeChecker<'a> {
    session: &'a Session,
    pub ctx: Context,
    /// Qualified name → signature, for every function in the graph.
    pub function_sigs: HashMap<String, FunctionSig>,
    /// Per-module local name → qualified function name.
    local_functions: HashMap<String, HashMap<String, String>>,
    /// Behavior bounds of the generics of the function being checked.
    pub(crate) generic_bounds: HashMap<String, Vec<String>>,
    /// Expected return type stack (innermost function last).
    pub(crate) return_types: Vec<Type>,
    pub(crate) in_async: bool,
    pub(crate) this_type: Option<Type>,
    obligations: Vec<Obligation>,
    /// Generic call sites awaiting final types before landing in `mono`.
    pending_monos: Vec<(String, Vec<Type>)>,
    pub mono: MonoCache,
    pub(crate) current_module: String,
}

/// Everything downstream passes need from type checking: the typed
/// modules, the definition registry (enum tags, impls, vtable sources),
/// the monomorphization set and the signature table.
pub struct CheckedProgram {
    pub modules: Vec<Module<TypeInformation>>,
    pub ctx: Context,
    pub mono: MonoCache,
    pub function_sigs: HashMap<String, FunctionSig>,
}

/// Check the whole module graph. Always returns the typed tree; type
/// errors are recorded in the session and poisoned nodes carry
/// `Type::Error`.
pub fn check_modules(
    session: &Session,
    graph: &ModuleGraph,
    resolution: &Resolution,
) -> CheckedProgram {
    let mut checker = TypeChecker::new(session);
    checker.register_builtins();

    for loaded in &graph.modules {
        checker.register_types(&loaded.module);
    }
    for loaded in &graph.modules {
        checker.register_signatures(&loaded.module);
    }
    for loaded in &graph.modules {
        checker.register_extends(&loaded.module);
    }
    checker.seed_imports(resolution);

    let mut checked = vec![];
    for loaded in &graph.modules {
        checked.push(checker.check_module(&loaded.module));
    }

    checker.finish_obligations();
    for module in &checked {
        validate_module(session, &checker.ctx, module);
    }
    debug!(
        "type checking finished: {} module(s), {} monomorphic instance(s)",
        checked.len(),
        checker.mono.len()
    );
    CheckedProgram {
        modules: checked,
        ctx: checker.ctx,
        mono: checker.mono,
        function_sigs: checker.function_sigs,
    }
}

impl<'a> TypeChecker<'a> {
    pub fn new(session: &'a Session) -> Self {
        TypeChecker {
            session,
            ctx: Context::default(),
            function_sigs: HashMap::new(),
            local_functions: HashMap::new(),
            generic_bounds: HashMap::new(),
            return_types: vec![],
            in_async: false,
            this_type: None,
            obligations: vec![],
            pending_monos: vec![],
            mono: MonoCache::new(),
            current_module: String::new(),
        }
    }

    pub(crate) fn record_instantiation(&mut self, qualified: &str, type_args: Vec<Type>) {
        self.pending_monos.push((qualified.to_string(), type_args));
    }

    pub(crate) fn report(&self, error: TypeCheckError) {
        self.session.emit(error.to_diagnostic());
    }

    pub(crate) fn info(&self, type_id: Type) -> TypeInformation {
        TypeInformation {
            type_id: Rc::new(RefCell::new(Some(type_id))),
            context: self.ctx.clone(),
        }
    }

    /// Convert a syntactic type, reporting failures and poisoning.
    pub(crate) fn convert_type(&self, name: &TypeName) -> Type {
        match Type::try_from((name, &self.ctx)) {
            Ok(t) => t,
            Err(error) => {
                self.report(error);
                Type::Error
            }
        }
    }

    pub(crate) fn unify_or_report(&self, expected: &Type, actual: &Type, span: Span) {
        if self.ctx.unify(expected, actual).is_err() {
            if self.coercible(expected, actual) {
                return;
            }
            self.report(TypeCheckError::TypeMismatch(
                TypeMismatch {
                    expected: self.ctx.zonk(expected),
                    actual: self.ctx.zonk(actual),
                },
                span,
            ));
        }
    }

    /// Implicit coercions the language allows where unification alone
    /// fails: `T → dyn Behavior` when `T` implements the behavior, and
    /// `ref [T; N] → ref [T]` (array to slice through a borrow).
    fn coercible(&self, expected: &Type, actual: &Type) -> bool {
        let expected = self.ctx.shape_of(expected);
        let actual = self.ctx.shape_of(actual);

        if let Type::DynBehavior(behavior) = &expected {
            return match actual.peel_references() {
                Type::DynBehavior(other) => other == behavior,
                Type::Generic(param) => self
                    .generic_bounds
                    .get(param)
                    .is_some_and(|bounds| bounds.contains(behavior)),
                other => other
                    .head_name()
                    .is_some_and(|head| self.ctx.definitions.implements(head, behavior)),
            };
        }

        if let (
            Type::Reference {
                inner: expected_inner,
                ..
            },
            Type::Reference {
                inner: actual_inner,
                ..
            },
        ) = (&expected, &actual)
        {
            if let (Type::Slice(element), Type::Array(actual_element, _)) =
                (&**expected_inner, &**actual_inner)
            {
                return self.ctx.unify(element, actual_element).is_ok();
            }
        }
        false
    }

    pub(crate) fn lookup_local_function(&self, name: &str) -> Option<&FunctionSig> {
        let qualified = self
            .local_functions
            .get(&self.current_module)?
            .get(name)?;
        self.function_sigs.get(qualified)
    }

    pub(crate) fn defer_obligation(
        &mut self,
        argument: Type,
        param: &str,
        bound: &str,
        span: Span,
    ) {
        self.obligations.push(Obligation {
            argument,
            param: param.to_string(),
            bound: bound.to_string(),
            span,
        });
    }

    // ---- phase 0: built-ins ------------------------------------------

    /// Built-in nominal types and runtime functions the language exposes
    /// without imports: `List[T]`, `Range[T]`, `Maybe`-free IO handles
    /// and the primitive effectful entry points.
    fn register_builtins(&mut self) {
        let defs = &self.ctx.definitions;
        defs.add_type(TypeDef {
            name: "List".into(),
            generics: vec!["T".into()],
            kind: TypeDefKind::Struct(StructDef { fields: vec![] }),
        });
        defs.add_type(TypeDef {
            name: "Range".into(),
            generics: vec!["T".into()],
            kind: TypeDefKind::Struct(StructDef { fields: vec![] }),
        });
        defs.add_type(TypeDef {
            name: "File".into(),
            generics: vec![],
            kind: TypeDefKind::Struct(StructDef { fields: vec![] }),
        });
        defs.add_type(TypeDef {
            name: "Poll".into(),
            generics: vec!["T".into()],
            kind: TypeDefKind::Enum(EnumDef {
                variants: vec![
                    ("Ready".into(), vec![Type::Generic("T".into())]),
                    ("Pending".into(), vec![]),
                ],
            }),
        });

        for (name, this_param, params, ret) in [
            ("push", Some(true), vec![Type::Generic("T".into())], Type::Unit),
            ("pop", Some(true), vec![], Type::Generic("T".into())),
            ("len", Some(false), vec![], Type::Int(types::IntKind::I64)),
            (
                "get",
                Some(false),
                vec![Type::Int(types::IntKind::I64)],
                Type::Generic("T".into()),
            ),
        ] {
            defs.add_inherent_method(
                "List",
                MethodDef {
                    name: name.into(),
                    this_param,
                    params,
                    return_value: ret,
                    effects: EffectRow::pure(),
                    generics: vec!["T".into()],
                },
            );
        }
        for (name, this_param, params, ret) in [
            (
                "len",
                Some(false),
                vec![],
                Type::Int(types::IntKind::I64),
            ),
            ("push", Some(true), vec![Type::Character], Type::Unit),
        ] {
            defs.add_inherent_method(
                "Str",
                MethodDef {
                    name: name.into(),
                    this_param,
                    params,
                    return_value: ret,
                    effects: EffectRow::pure(),
                    generics: vec![],
                },
            );
        }

        let i64_t = Type::Int(types::IntKind::I64);
        let f64_t = Type::Float(types::FloatKind::F64);
        let builtins: Vec<(&str, Vec<Type>, Type, &str)> = vec![
            ("sqrt", vec![f64_t.clone()], f64_t.clone(), ""),
            ("fabs", vec![f64_t.clone()], f64_t.clone(), ""),
            ("floor", vec![f64_t.clone()], f64_t.clone(), ""),
            ("ceil", vec![f64_t.clone()], f64_t.clone(), ""),
            ("round", vec![f64_t.clone()], f64_t.clone(), ""),
            ("is_nan", vec![f64_t.clone()], Type::Boolean, ""),
            ("is_inf", vec![f64_t.clone()], Type::Boolean, ""),
            ("float_bits", vec![f64_t.clone()], i64_t.clone(), ""),
            ("bits_float", vec![i64_t.clone()], f64_t.clone(), ""),
            ("File::open", vec![Type::String], Type::named("File"), "io.file"),
            (
                "File::read",
                vec![Type::reference(Type::named("File"), false)],
                i64_t.clone(),
                "io.file.read",
            ),
            (
                "File::write",
                vec![Type::reference(Type::named("File"), true), i64_t.clone()],
                Type::Unit,
                "io.file.write",
            ),
            ("Time::now", vec![], i64_t.clone(), "io.time"),
            ("Rand::next", vec![], i64_t.clone(), "crypto.random"),
            ("Hash::digest", vec![Type::String], i64_t.clone(), "crypto.hash"),
            ("print", vec![Type::String], Type::Unit, "io"),
            ("panic", vec![Type::String], Type::Never, ""),
            ("black_box", vec![i64_t.clone()], i64_t.clone(), ""),
        ];
        for (qualified, params, return_value, effect) in builtins {
            let mut effects = EffectRow::pure();
            if !effect.is_empty() {
                effects.insert(crate::effects::Effect::parse(effect));
            }
            self.function_sigs.insert(
                qualified.to_string(),
                FunctionSig {
                    qualified: qualified.to_string(),
                    generics: vec![],
                    this_param: None,
                    params,
                    return_value,
                    effects,
                    is_async: false,
                },
            );
        }
    }

    // ---- phase 1: types, behaviors, constants -------------------------

    fn register_types(&mut self, module: &Module<()>) {
        // Two rounds so mutually recursive nominals resolve: names first,
        // then bodies.
        for declaration in &module.declarations {
            if let Declaration::Type(decl) = declaration {
                self.ctx.definitions.add_type(TypeDef {
                    name: decl.name.clone(),
                    generics: decl.generics.iter().map(|g| g.name.clone()).collect(),
                    kind: TypeDefKind::Struct(StructDef { fields: vec![] }),
                });
            }
        }
        for declaration in &module.declarations {
            if let Declaration::Behavior(decl) = declaration {
                self.register_behavior(decl);
            }
        }
        for declaration in &module.declarations {
            if let Declaration::Type(decl) = declaration {
                self.register_type_body(decl);
            }
        }
    }

    fn with_generics<R>(&mut self, generics: &[GenericParam], f: impl FnOnce(&mut Self) -> R) -> R {
        self.ctx.scope.enter();
        let names: Vec<String> = generics.iter().map(|g| g.name.clone()).collect();
        self.ctx.scope.add_generic_params(&names);
        let result = f(self);
        self.ctx.scope.exit();
        result
    }

    fn register_type_body(&mut self, decl: &TypeDecl) {
        let kind = self.with_generics(&decl.generics, |checker| match &decl.body {
            TypeDeclBody::Struct(fields) => TypeDefKind::Struct(StructDef {
                fields: fields
                    .iter()
                    .map(|f| {
                        (
                            f.name.clone(),
                            checker.convert_type(&f.type_name),
                            f.visibility,
                        )
                    })
                    .collect(),
            }),
            TypeDeclBody::Enum(variants) => TypeDefKind::Enum(EnumDef {
                variants: variants
                    .iter()
                    .map(|v| {
                        (
                            v.name.clone(),
                            v.payload.iter().map(|t| checker.convert_type(t)).collect(),
                        )
                    })
                    .collect(),
            }),
            TypeDeclBody::Alias(target) => TypeDefKind::Alias(checker.convert_type(target)),
        });
        self.ctx.definitions.add_type(TypeDef {
            name: decl.name.clone(),
            generics: decl.generics.iter().map(|g| g.name.clone()).collect(),
            kind,
        });
    }

    fn register_behavior(&mut self, decl: &BehaviorDecl) {
        // Associated types act as generics inside the signatures.
        let assoc_generics: Vec<GenericParam> = decl
            .associated_types
            .iter()
            .map(|name| GenericParam {
                name: name.clone(),
                bounds: vec![],
                position: decl.position,
            })
            .collect();
        let mut all_generics = decl.generics.clone();
        all_generics.extend(assoc_generics);

        let methods = self.with_generics(&all_generics, |checker| {
            decl.methods
                .iter()
                .map(|sig| MethodDef {
                    name: sig.name.clone(),
                    this_param: sig.this_param,
                    params: sig
                        .parameters
                        .iter()
                        .map(|(_, t)| checker.convert_type(t))
                        .collect(),
                    return_value: sig
                        .return_type
                        .as_ref()
                        .map(|t| checker.convert_type(t))
                        .unwrap_or(Type::Unit),
                    effects: sig
                        .declared_effects
                        .as_ref()
                        .map(|e| EffectRow::from_paths(e))
                        .unwrap_or_default(),
                    generics: vec![],
                })
                .collect()
        });

        self.ctx.definitions.add_behavior(BehaviorDef {
            name: decl.name.clone(),
            methods,
            associated_types: decl.associated_types.clone(),
        });
    }

    // ---- phase 2: signatures and extends ------------------------------

    fn register_signatures(&mut self, module: &Module<()>) {
        let module_key = module.path_string();
        for declaration in &module.declarations {
            match declaration {
                Declaration::Function(function) => {
                    let qualified = format!("{module_key}::{}", function.name.name);
                    let sig = self.build_signature(&qualified, function);
                    self.local_functions
                        .entry(module_key.clone())
                        .or_default()
                        .insert(function.name.name.clone(), qualified.clone());
                    self.function_sigs.insert(qualified, sig);
                }
                Declaration::Const(decl) => {
                    let type_id = self.convert_type(&decl.type_annotation);
                    self.ctx.scope.add_constant(&decl.name.name, type_id);
                }
                _ => {}
            }
        }
    }

    pub(crate) fn build_signature(
        &mut self,
        qualified: &str,
        function: &FunctionDecl<()>,
    ) -> FunctionSig {
        let mut bounds: HashMap<String, Vec<String>> = HashMap::new();
        for generic in &function.generics {
            let entry = bounds.entry(generic.name.clone()).or_default();
            for bound in &generic.bounds {
                entry.push(bound.to_string());
            }
        }
        for clause in &function.where_clauses {
            let entry = bounds.entry(clause.param.clone()).or_default();
            for bound in &clause.bounds {
                entry.push(bound.to_string());
            }
        }

        self.with_generics(&function.generics, |checker| FunctionSig {
            qualified: qualified.to_string(),
            generics: function
                .generics
                .iter()
                .map(|g| {
                    (
                        g.name.clone(),
                        bounds.get(&g.name).cloned().unwrap_or_default(),
                    )
                })
                .collect(),
            this_param: function.this_param,
            params: function
                .parameters
                .iter()
                .map(|p| checker.convert_type(&p.type_annotation))
                .collect(),
            return_value: function
                .return_type
                .as_ref()
                .map(|t| checker.convert_type(t))
                .unwrap_or(Type::Unit),
            effects: function
                .declared_effects
                .as_ref()
                .map(|e| EffectRow::from_paths(e))
                .unwrap_or_default(),
            is_async: function.is_async,
        })
    }

    /// Infer the generic parameters of an extend target: type arguments
    /// that resolve to nothing are the block's generics
    /// (`extend List[T] { … }`).
    fn extend_generics(&self, target: &TypeName) -> Vec<GenericParam> {
        let TypeName::Named { args, .. } = target else {
            return vec![];
        };
        args.iter()
            .filter_map(|arg| match arg {
                TypeName::Named {
                    path,
                    args,
                    position,
                } if args.is_empty() && path.len() == 1 => {
                    let name = &path[0];
                    if primitive_type(name).is_none() && !self.ctx.definitions.has_type(name) {
                        Some(GenericParam {
                            name: name.clone(),
                            bounds: vec![],
                            position: *position,
                        })
                    } else {
                        None
                    }
                }
                _ => None,
            })
            .collect()
    }

    fn register_extends(&mut self, module: &Module<()>) {
        for declaration in &module.declarations {
            let Declaration::Extend(extend) = declaration else {
                continue;
            };
            let generics = self.extend_generics(&extend.target);
            let generic_names: Vec<String> = generics.iter().map(|g| g.name.clone()).collect();

            let Some(head) = self.with_generics(&generics, |checker| {
                let target = checker.convert_type(&extend.target);
                target.head_name().map(str::to_string)
            }) else {
                self.session.emit(crate::diagnostics::Diagnostic::error(
                    "E0202",
                    format!("cannot extend type `{}`", extend.target),
                    extend.position,
                ));
                continue;
            };

            let methods: Vec<MethodDef> = self.with_generics(&generics, |checker| {
                extend
                    .methods
                    .iter()
                    .map(|m| {
                        checker.with_generics(&m.generics, |checker| MethodDef {
                            name: m.name.name.clone(),
                            this_param: m.this_param,
                            params: m
                                .parameters
                                .iter()
                                .map(|p| checker.convert_type(&p.type_annotation))
                                .collect(),
                            return_value: m
                                .return_type
                                .as_ref()
                                .map(|t| checker.convert_type(t))
                                .unwrap_or(Type::Unit),
                            effects: m
                                .declared_effects
                                .as_ref()
                                .map(|e| EffectRow::from_paths(e))
                                .unwrap_or_default(),
                            generics: generic_names.clone(),
                        })
                    })
                    .collect()
            });

            match &extend.behavior {
                None => {
                    for method in methods {
                        if !self.ctx.definitions.add_inherent_method(&head, method.clone()) {
                            self.session.emit(crate::diagnostics::Diagnostic::error(
                                "E0203",
                                format!("method `{}` is already defined on `{head}`", method.name),
                                extend.position,
                            ));
                        }
                    }
                }
                Some(behavior_name) => {
                    self.register_behavior_impl(extend, &head, behavior_name, methods);
                }
            }
        }
    }

    fn register_behavior_impl(
        &mut self,
        extend: &ExtendDecl<()>,
        head: &str,
        behavior_name: &TypeName,
        methods: Vec<MethodDef>,
    ) {
        let behavior_key = match behavior_name {
            TypeName::Named { path, .. } => path.last().cloned().unwrap_or_default(),
            other => other.to_string(),
        };
        let Some(behavior) = self.ctx.definitions.get_behavior(&behavior_key) else {
            self.session.emit(crate::diagnostics::Diagnostic::error(
                "E0202",
                format!("unknown behavior `{behavior_key}`"),
                extend.position,
            ));
            return;
        };

        let mut entry = ImplEntry::default();
        for (name, bound) in &extend.associated_bindings {
            entry
                .associated
                .insert(name.clone(), self.convert_type(bound));
        }
        for method in methods {
            entry.methods.insert(method.name.clone(), method);
        }

        let missing: Vec<String> = behavior
            .methods
            .iter()
            .filter(|required| !entry.methods.contains_key(&required.name))
            .map(|required| required.name.clone())
            .collect();
        if !missing.is_empty() {
            self.report(TypeCheckError::UnsatisfiedConstraint(
                UnsatisfiedConstraint {
                    param: head.to_string(),
                    bound: behavior_key.clone(),
                    argument: Type::named(head),
                    missing_methods: missing,
                },
                extend.position,
            ));
        }
        for required in &behavior.methods {
            if let Some(provided) = entry.methods.get(&required.name) {
                if provided.params.len() != required.params.len() {
                    self.report(TypeCheckError::WrongArgumentCount(
                        WrongArgumentCount {
                            expected: required.params.len(),
                            actual: provided.params.len(),
                        },
                        extend.position,
                    ));
                }
            }
        }
        let unbound: Vec<String> = behavior
            .associated_types
            .iter()
            .filter(|name| !entry.associated.contains_key(*name))
            .cloned()
            .collect();
        if !unbound.is_empty() {
            self.session.emit(crate::diagnostics::Diagnostic::error(
                "E0207",
                format!(
                    "impl of `{behavior_key}` for `{head}` does not bind associated type(s) {}",
                    unbound.join(", ")
                ),
                extend.position,
            ));
        }

        if !self.ctx.definitions.add_impl(head, &behavior_key, entry) {
            self.session.emit(crate::diagnostics::Diagnostic::error(
                "E0203",
                format!("`{head}` already implements `{behavior_key}`"),
                extend.position,
            ));
        }
    }

    fn seed_imports(&mut self, resolution: &Resolution) {
        for (module_key, imports) in &resolution.imports {
            for (local_name, symbol) in imports {
                let qualified = symbol.qualified_name();
                if self.function_sigs.contains_key(&qualified) {
                    self.local_functions
                        .entry(module_key.clone())
                        .or_default()
                        .insert(local_name.clone(), qualified);
                }
            }
        }
    }

    // ---- phase 3: bodies ---------------------------------------------

    fn check_module(&mut self, module: &Module<()>) -> Module<TypeInformation> {
        self.current_module = module.path_string();
        let declarations = module
            .declarations
            .iter()
            .map(|declaration| self.check_declaration(declaration))
            .collect();
        Module {
            path: module.path.clone(),
            caps: module.caps.clone(),
            declarations,
            position: module.position,
        }
    }

    fn check_declaration(&mut self, declaration: &Declaration<()>) -> Declaration<TypeInformation> {
        match declaration {
            Declaration::Function(function) => {
                Declaration::Function(self.check_function(function, None))
            }
            Declaration::Extend(extend) => {
                let generics = self.extend_generics(&extend.target);
                let this_type = self.with_generics(&generics, |checker| {
                    checker.convert_type(&extend.target)
                });
                let methods = extend
                    .methods
                    .iter()
                    .map(|method| {
                        self.with_generics(&generics, |checker| {
                            checker.check_function(method, Some(this_type.clone()))
                        })
                    })
                    .collect();
                Declaration::Extend(ExtendDecl {
                    target: extend.target.clone(),
                    behavior: extend.behavior.clone(),
                    associated_bindings: extend.associated_bindings.clone(),
                    methods,
                    directives: extend.directives.clone(),
                    position: extend.position,
                    id: extend.id,
                })
            }
            Declaration::Const(decl) => {
                let expected = self.convert_type(&decl.type_annotation);
                let value = self.check_expression(&decl.value);
                let actual = value_type(&value);
                self.unify_or_report(&expected, &actual, decl.value.position());
                Declaration::Const(ConstDecl {
                    visibility: decl.visibility,
                    name: Ident {
                        name: decl.name.name.clone(),
                        info: self.info(expected.clone()),
                        position: decl.name.position,
                        id: decl.name.id,
                    },
                    type_annotation: decl.type_annotation.clone(),
                    value,
                    stable_id: decl.stable_id.clone(),
                    directives: decl.directives.clone(),
                    info: self.info(expected),
                    position: decl.position,
                    id: decl.id,
                })
            }
            Declaration::Type(decl) => Declaration::Type(decl.clone()),
            Declaration::Behavior(decl) => Declaration::Behavior(decl.clone()),
            Declaration::Use(decl) => Declaration::Use(decl.clone()),
            Declaration::Mod(decl) => Declaration::Mod(decl.clone()),
            Declaration::Error(span) => Declaration::Error(*span),
        }
    }

    pub(crate) fn check_function(
        &mut self,
        function: &FunctionDecl<()>,
        this_type: Option<Type>,
    ) -> FunctionDecl<TypeInformation> {
        self.ctx.scope.enter();
        let generic_names: Vec<String> =
            function.generics.iter().map(|g| g.name.clone()).collect();
        self.ctx.scope.add_generic_params(&generic_names);

        let saved_bounds = std::mem::take(&mut self.generic_bounds);
        for generic in &function.generics {
            self.generic_bounds.insert(
                generic.name.clone(),
                generic.bounds.iter().map(|b| b.to_string()).collect(),
            );
        }
        for clause in &function.where_clauses {
            self.generic_bounds
                .entry(clause.param.clone())
                .or_default()
                .extend(clause.bounds.iter().map(|b| b.to_string()));
        }

        let saved_this = self.this_type.take();
        if let (Some(mutable), Some(target)) = (function.this_param, this_type.as_ref()) {
            let this = Type::reference(target.clone(), mutable);
            self.ctx
                .scope
                .force_variable("this", this.clone(), mutable);
            self.this_type = Some(this);
        }

        let parameters: Vec<Parameter<TypeInformation>> = function
            .parameters
            .iter()
            .map(|parameter| {
                let type_id = self.convert_type(&parameter.type_annotation);
                if let Err(err) = self.ctx.scope.add_variable(
                    &parameter.name.name,
                    type_id.clone(),
                    false,
                    parameter.name.position,
                ) {
                    self.report(TypeCheckError::RedefinedVariable(
                        RedefinedVariable { name: err.name },
                        parameter.name.position,
                    ));
                }
                Parameter {
                    name: Ident {
                        name: parameter.name.name.clone(),
                        info: self.info(type_id),
                        position: parameter.name.position,
                        id: parameter.name.id,
                    },
                    type_annotation: parameter.type_annotation.clone(),
                    position: parameter.position,
                }
            })
            .collect();

        let return_type = function
            .return_type
            .as_ref()
            .map(|t| self.convert_type(t))
            .unwrap_or(Type::Unit);

        let saved_async = self.in_async;
        self.in_async = function.is_async;
        self.return_types.push(return_type.clone());
        let body = self.check_block_expecting(&function.body, Some(&return_type));
        self.return_types.pop();
        self.in_async = saved_async;
        self.this_type = saved_this;
        self.generic_bounds = saved_bounds;
        self.ctx.scope.exit();

        let fn_type = Type::Function {
            params: parameters
                .iter()
                .map(|p| p.name.info.resolved())
                .collect(),
            return_value: Box::new(return_type),
            effects: function
                .declared_effects
                .as_ref()
                .map(|e| EffectRow::from_paths(e))
                .unwrap_or_default(),
        };

        FunctionDecl {
            visibility: function.visibility,
            is_async: function.is_async,
            name: Ident {
                name: function.name.name.clone(),
                info: self.info(fn_type.clone()),
                position: function.name.position,
                id: function.name.id,
            },
            generics: function.generics.clone(),
            this_param: function.this_param,
            parameters,
            return_type: function.return_type.clone(),
            declared_effects: function.declared_effects.clone(),
            where_clauses: function.where_clauses.clone(),
            body,
            stable_id: function.stable_id.clone(),
            directives: function.directives.clone(),
            info: self.info(fn_type),
            position: function.position,
            id: function.id,
        }
    }

    fn finish_obligations(&mut self) {
        // Settle monomorphization records now that inference is done; a
        // call inside a generic body stays generic and is specialized
        // transitively by the emitter.
        let pending = std::mem::take(&mut self.pending_monos);
        for (qualified, type_args) in pending {
            let resolved: Vec<Type> = type_args.iter().map(|t| self.ctx.zonk(t)).collect();
            if resolved.iter().all(type_is_concrete) {
                self.mono.instantiate(&qualified, resolved);
            }
        }

        let obligations = std::mem::take(&mut self.obligations);
        for obligation in obligations {
            let argument = self.ctx.zonk(&obligation.argument);
            if argument.is_error() {
                continue;
            }
            // Generic arguments satisfy the bound when their own bounds
            // carry it; concrete arguments consult the impl table.
            let satisfied = match &argument {
                Type::Generic(name) => self
                    .generic_bounds
                    .get(name)
                    .is_some_and(|bounds| bounds.contains(&obligation.bound)),
                Type::DynBehavior(name) => *name == obligation.bound,
                other => other
                    .head_name()
                    .is_some_and(|head| self.ctx.definitions.implements(head, &obligation.bound)),
            };
            if !satisfied {
                let missing = self
                    .ctx
                    .definitions
                    .get_behavior(&obligation.bound)
                    .map(|behavior| {
                        behavior
                            .methods
                            .iter()
                            .filter(|m| {
                                argument.head_name().map_or(true, |head| {
                                    self.ctx
                                        .definitions
                                        .inherent_method(head, &m.name)
                                        .is_none()
                                })
                            })
                            .map(|m| m.name.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                self.report(TypeCheckError::UnsatisfiedConstraint(
                    UnsatisfiedConstraint {
                        param: obligation.param,
                        bound: obligation.bound,
                        argument,
                        missing_methods: missing,
                    },
                    obligation.span,
                ));
            }
        }
    }
}

/// No inference variables or generic parameters anywhere inside.
fn type_is_concrete(t: &Type) -> bool {
    match t {
        Type::Var(_) | Type::Generic(_) => false,
        Type::Named { args, .. } => args.iter().all(type_is_concrete),
        Type::Function {
            params,
            return_value,
            ..
        } => params.iter().all(type_is_concrete) && type_is_concrete(return_value),
        Type::Tuple(elements) => elements.iter().all(type_is_concrete),
        Type::Array(element, _) | Type::Slice(element) => type_is_concrete(element),
        Type::Reference { inner, .. } => type_is_concrete(inner),
        _ => true,
    }
}

/// Read the (possibly still variable) type of a checked expression.
pub fn value_type(expression: &Expression<TypeInformation>) -> Type {
    expression_info(expression).resolved()
}

pub fn expression_info(expression: &Expression<TypeInformation>) -> TypeInformation {
    match expression {
        Expression::Literal(e) => e.info.clone(),
        Expression::Path(e) => e.info.clone(),
        Expression::Interpolation(e) => e.info.clone(),
        Expression::Unary(e) => e.info.clone(),
        Expression::Binary(e) => e.info.clone(),
        Expression::Call(e) => e.info.clone(),
        Expression::MethodCall(e) => e.info.clone(),
        Expression::FieldAccess(e) => e.info.clone(),
        Expression::Index(e) => e.info.clone(),
        Expression::Tuple(e) => e.info.clone(),
        Expression::Array(crate::parser::ast::ArrayLiteral::List { info, .. }) => info.clone(),
        Expression::Array(crate::parser::ast::ArrayLiteral::Repeat { info, .. }) => info.clone(),
        Expression::StructInit(e) => e.info.clone(),
        Expression::If(e) => e.info.clone(),
        Expression::When(e) => e.info.clone(),
        Expression::Block(e) => e.info.clone(),
        Expression::Closure(e) => e.info.clone(),
        Expression::Range(e) => e.info.clone(),
        Expression::Borrow(e) => e.info.clone(),
        Expression::Deref(e) => e.info.clone(),
        Expression::Await(e) => e.info.clone(),
        Expression::Propagate(e) => e.info.clone(),
        Expression::Cast(e) => e.info.clone(),
        Expression::Error(..) => TypeInformation {
            type_id: Rc::new(RefCell::new(Some(Type::Error))),
            context: Context::default(),
        },
    }
}

/// Validation: zonk every slot in place; report slots whose type is still
/// an unconstrained variable. After this pass all slots are concrete.
fn validate_module(session: &Session, ctx: &Context, module: &Module<TypeInformation>) {
    let mut validator = Validator { session, ctx };
    for declaration in &module.declarations {
        validator.declaration(declaration);
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::resolver::{load_modules, resolve, MemoryFileProvider};
    use std::path::Path;

    /// Lex, parse, resolve and type-check a single-file program.
    pub fn check_source(src: &str) -> (Session, CheckedProgram) {
        let mut provider = MemoryFileProvider::new();
        provider.add("main.tml", src);
        let mut session = Session::default();
        let graph = load_modules(&mut session, &provider, Path::new("main.tml"));
        let resolution = resolve(&session, &graph);
        let checked = check_modules(&session, &graph, &resolution);
        (session, checked)
    }

    pub fn error_codes(session: &Session) -> Vec<String> {
        session
            .diagnostics
            .entries()
            .iter()
            .filter(|d| d.severity == crate::diagnostics::Severity::Error)
            .map(|d| d.code.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use super::*;

    #[test]
    fn test_integer_function_checks() {
        let (session, checked) =
            check_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
        let Declaration::Function(func) = &checked.modules[0].declarations[0] else {
            panic!("expected a function");
        };
        let Type::Function { params, return_value, .. } = func.info.resolved() else {
            panic!("expected a function type");
        };
        assert_eq!(params, vec![Type::Int(types::IntKind::I32); 2]);
        assert_eq!(*return_value, Type::Int(types::IntKind::I32));
    }

    #[test]
    fn test_type_mismatch_reported() {
        let (session, _) = check_source("func f() -> I32 { return true }");
        assert!(error_codes(&session).contains(&"E0200".to_string()));
    }

    #[test]
    fn test_unknown_name_reported() {
        let (session, _) = check_source("func f() -> I32 { return missing }");
        assert!(error_codes(&session).contains(&"E0201".to_string()));
    }

    #[test]
    fn test_literal_defaults() {
        let (session, checked) = check_source("func f() { let x = 42; let y = 1.5; }");
        assert!(!session.has_errors());
        let Declaration::Function(func) = &checked.modules[0].declarations[0] else {
            panic!();
        };
        let Statement::Let(x) = &func.body.statements[0] else {
            panic!();
        };
        assert_eq!(x.name.info.resolved(), Type::Int(types::IntKind::I32));
        let Statement::Let(y) = &func.body.statements[1] else {
            panic!();
        };
        assert_eq!(y.name.info.resolved(), Type::Float(types::FloatKind::F64));
    }

    #[test]
    fn test_annotation_constrains_literal() {
        let (session, checked) = check_source("func f() { let x: U64 = 42; }");
        assert!(!session.has_errors());
        let Declaration::Function(func) = &checked.modules[0].declarations[0] else {
            panic!();
        };
        let Statement::Let(x) = &func.body.statements[0] else {
            panic!();
        };
        assert_eq!(x.name.info.resolved(), Type::Int(types::IntKind::U64));
    }

    #[test]
    fn test_enum_when_checks_and_is_exhaustive() {
        let (session, _) = check_source(
            "type Maybe[T] = Just(T) | Nothing;\n\
             func unwrap_or(m: Maybe[I32], d: I32) -> I32 {\n\
                 when m { Just(x) -> x, Nothing -> d }\n\
             }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
    }

    #[test]
    fn test_non_exhaustive_when_reported() {
        let (session, _) = check_source(
            "type Maybe[T] = Just(T) | Nothing;\n\
             func f(m: Maybe[I32]) -> I32 { when m { Just(x) -> x } }",
        );
        assert!(error_codes(&session).contains(&"E0208".to_string()));
    }

    #[test]
    fn test_unreachable_arm_flagged() {
        let (session, _) = check_source(
            "func f(n: I32) -> I32 { when n { _ -> 0, 1 -> 1 } }",
        );
        let warnings = session
            .diagnostics
            .entries()
            .iter()
            .filter(|d| d.code == "E0209")
            .count();
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_bool_exhaustiveness() {
        let (session, _) = check_source(
            "func f(b: Bool) -> I32 { when b { true -> 1, false -> 0 } }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));

        let (session, _) = check_source("func f(b: Bool) -> I32 { when b { true -> 1 } }");
        assert!(error_codes(&session).contains(&"E0208".to_string()));
    }

    #[test]
    fn test_integer_range_exhaustiveness_gap() {
        let (session, _) = check_source(
            "func f(n: U8) -> I32 { when n { 0 to 100 -> 1, 100 through 255 -> 2 } }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));

        let (session, _) = check_source(
            "func f(n: U8) -> I32 { when n { 0 to 100 -> 1, 101 through 254 -> 2 } }",
        );
        assert!(error_codes(&session).contains(&"E0208".to_string()));
    }

    #[test]
    fn test_generic_function_monomorphized() {
        let (session, checked) = check_source(
            "func id[T](value: T) -> T { return value }\n\
             func main() { id(1i64); id(true); }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
        assert_eq!(checked.mono.instances_of("main::id").len(), 2);
    }

    #[test]
    fn test_where_clause_unsatisfied() {
        let (session, _) = check_source(
            "behavior Show { func show(this) -> Str; }\n\
             func render[T](value: T) -> Str where T: Show { return value.show() }\n\
             func main() { render(42); }",
        );
        assert!(error_codes(&session).contains(&"E0207".to_string()));
    }

    #[test]
    fn test_where_clause_satisfied_by_impl() {
        let (session, _) = check_source(
            "behavior Show { func show(this) -> Str; }\n\
             type Point = { x: I32 };\n\
             extend Point with Show { func show(this) -> Str { return \"point\" } }\n\
             func render[T](value: T) -> Str where T: Show { return value.show() }\n\
             func main() { render(Point { x: 1 }); }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
    }

    #[test]
    fn test_behavior_impl_missing_method() {
        let (session, _) = check_source(
            "behavior Reader { func read(this) -> I32; func close(this); }\n\
             type File2 = { handle: I32 };\n\
             extend File2 with Reader { func read(this) -> I32 { return 0 } }",
        );
        assert!(error_codes(&session).contains(&"E0207".to_string()));
    }

    #[test]
    fn test_dyn_behavior_method_call() {
        let (session, _) = check_source(
            "behavior Reader { func read(this) -> I32; }\n\
             func drain(r: dyn Reader) -> I32 { return r.read() }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
    }

    #[test]
    fn test_inherent_method_via_extend() {
        let (session, _) = check_source(
            "type Counter = { value: I32 };\n\
             extend Counter { func get(this) -> I32 { return this.value } }\n\
             func main() -> I32 { let c = Counter { value: 3 }; return c.get() }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
    }

    #[test]
    fn test_immutable_reassign_rejected() {
        let (session, _) = check_source("func f() { let x = 1; x = 2; }");
        assert!(error_codes(&session).contains(&"E0204".to_string()));
    }

    #[test]
    fn test_mutable_reassign_allowed() {
        let (session, _) = check_source("func f() { let mut x = 1; x = 2; }");
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
    }

    #[test]
    fn test_propagate_on_maybe() {
        let (session, _) = check_source(
            "type Maybe[T] = Just(T) | Nothing;\n\
             func first() -> Maybe[I32] { return Just(1) }\n\
             func second() -> Maybe[I32] { let x = first()!; return Just(x + 1) }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
    }

    #[test]
    fn test_await_outside_async_rejected() {
        let (session, _) = check_source("func f() -> I32 { return await g() }\nfunc g() -> I32 { return 1 }");
        assert!(error_codes(&session).contains(&"E0215".to_string()));
    }

    #[test]
    fn test_closure_parameter_inference() {
        let (session, checked) = check_source(
            "func apply(f: func(I32) -> I32, x: I32) -> I32 { return f(x) }\n\
             func main() -> I32 { return apply(do(n) n * 2, 21) }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
        assert_eq!(checked.modules.len(), 1);
    }

    #[test]
    fn test_deeply_nested_generics() {
        let (session, _) = check_source(
            "type Maybe[T] = Just(T) | Nothing;\n\
             type Pair[A, B] = { first: A, second: B };\n\
             func main() {\n\
                 let deep: Maybe[Maybe[Maybe[Maybe[Maybe[Maybe[I32]]]]]] =\n\
                     Just(Just(Just(Just(Just(Just(1))))));\n\
             }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
    }

    #[test]
    fn test_never_function_usable_anywhere() {
        let (session, _) = check_source(
            "func fail(msg: Str) -> Never { panic(msg); loop { } }\n\
             func f(c: Bool) -> I32 { if c then 1 else fail(\"no\") }",
        );
        assert!(!session.has_errors(), "{:?}", error_codes(&session));
    }
}

struct Validator<'a> {
    session: &'a Session,
    ctx: &'a Context,
}

impl<'a> Validator<'a> {
    fn slot(&mut self, info: &TypeInformation, span: Span) {
        let resolved = {
            let borrow = info.type_id.borrow();
            match borrow.as_ref() {
                Some(t) => self.ctx.zonk(t),
                None => Type::Error,
            }
        };
        if let Type::Var(_) = resolved {
            self.session.emit(
                TypeCheckError::AmbiguousInference(
                    AmbiguousInference {
                        description: "this expression".to_string(),
                    },
                    span,
                )
                .to_diagnostic(),
            );
            *info.type_id.borrow_mut() = Some(Type::Error);
        } else {
            *info.type_id.borrow_mut() = Some(resolved);
        }
    }

    fn declaration(&mut self, declaration: &Declaration<TypeInformation>) {
        match declaration {
            Declaration::Function(function) => self.function(function),
            Declaration::Extend(extend) => {
                for method in &extend.methods {
                    self.function(method);
                }
            }
            Declaration::Const(decl) => {
                self.slot(&decl.info, decl.position);
                self.expression(&decl.value);
            }
            _ => {}
        }
    }

    fn function(&mut self, function: &FunctionDecl<TypeInformation>) {
        self.slot(&function.info, function.position);
        for parameter in &function.parameters {
            self.slot(&parameter.name.info, parameter.position);
        }
        self.block(&function.body);
    }

    fn block(&mut self, block: &Block<TypeInformation>) {
        self.slot(&block.info, block.position);
        for statement in &block.statements {
            self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &Statement<TypeInformation>) {
        match statement {
            Statement::Let(s) => {
                self.slot(&s.info, s.position);
                self.slot(&s.name.info, s.name.position);
                self.expression(&s.value);
            }
            Statement::Assignment(s) => {
                self.slot(&s.info, s.position);
                self.expression(&s.target);
                self.expression(&s.value);
            }
            Statement::Return(s) => {
                self.slot(&s.info, s.position);
                if let Some(value) = &s.value {
                    self.expression(value);
                }
            }
            Statement::Break(_) | Statement::Continue(_) | Statement::Error(_) => {}
            Statement::WhileLoop(s) => {
                self.slot(&s.info, s.position);
                self.expression(&s.condition);
                self.block(&s.body);
            }
            Statement::Loop(s) => {
                self.slot(&s.info, s.position);
                self.block(&s.body);
            }
            Statement::ForLoop(s) => {
                self.slot(&s.info, s.position);
                self.slot(&s.binder.info, s.binder.position);
                self.expression(&s.iterable);
                self.block(&s.body);
            }
            Statement::Expression(e) | Statement::YieldingExpression(e) => self.expression(e),
        }
    }

    fn pattern(&mut self, pattern: &Pattern<TypeInformation>) {
        match pattern {
            Pattern::Wildcard(p) => self.slot(&p.info, p.position),
            Pattern::Literal(p) => self.slot(&p.info, p.position),
            Pattern::Binding(p) => self.slot(&p.name.info, p.name.position),
            Pattern::Range(p) => self.slot(&p.info, p.position),
            Pattern::EnumVariant(p) => {
                self.slot(&p.info, p.position);
                for sub in &p.payload {
                    self.pattern(sub);
                }
            }
            Pattern::Tuple(p) => {
                self.slot(&p.info, p.position);
                for sub in &p.elements {
                    self.pattern(sub);
                }
            }
            Pattern::Struct(p) => {
                self.slot(&p.info, p.position);
                for field in &p.fields {
                    self.pattern(&field.pattern);
                }
            }
            Pattern::Array(p) => {
                self.slot(&p.info, p.position);
                for sub in &p.elements {
                    self.pattern(sub);
                }
                if let Some(rest) = &p.rest {
                    self.slot(&rest.info, rest.position);
                }
            }
            Pattern::Or(p) => {
                self.slot(&p.info, p.position);
                for alternative in &p.alternatives {
                    self.pattern(alternative);
                }
            }
        }
    }

    fn expression(&mut self, expression: &Expression<TypeInformation>) {
        let info = expression_info(expression);
        self.slot(&info, expression.position());
        match expression {
            Expression::Literal(_) | Expression::Path(_) | Expression::Error(..) => {}
            Expression::Interpolation(e) => {
                for hole in &e.holes {
                    self.expression(hole);
                }
            }
            Expression::Unary(e) => self.expression(&e.operand),
            Expression::Binary(e) => {
                self.expression(&e.left);
                self.expression(&e.right);
            }
            Expression::Call(e) => {
                self.expression(&e.callee);
                for argument in &e.arguments {
                    self.expression(argument);
                }
            }
            Expression::MethodCall(e) => {
                self.expression(&e.receiver);
                self.slot(&e.method.info, e.method.position);
                for argument in &e.arguments {
                    self.expression(argument);
                }
            }
            Expression::FieldAccess(e) => {
                self.expression(&e.receiver);
                self.slot(&e.field.info, e.field.position);
            }
            Expression::Index(e) => {
                self.expression(&e.receiver);
                self.expression(&e.index);
            }
            Expression::Tuple(e) => {
                for element in &e.elements {
                    self.expression(element);
                }
            }
            Expression::Array(ArrayLiteral::List { elements, .. }) => {
                for element in elements {
                    self.expression(element);
                }
            }
            Expression::Array(ArrayLiteral::Repeat { value, length, .. }) => {
                self.expression(value);
                self.expression(length);
            }
            Expression::StructInit(e) => {
                for field in &e.fields {
                    self.expression(&field.value);
                }
            }
            Expression::If(e) => {
                self.expression(&e.condition);
                self.expression(&e.then_branch);
                if let Some(else_branch) = &e.else_branch {
                    self.expression(else_branch);
                }
            }
            Expression::When(e) => {
                self.expression(&e.scrutinee);
                for arm in &e.arms {
                    self.pattern(&arm.pattern);
                    self.expression(&arm.value);
                }
            }
            Expression::Block(block) => self.block(block),
            Expression::Closure(e) => self.expression(&e.body),
            Expression::Range(e) => {
                self.expression(&e.low);
                self.expression(&e.high);
            }
            Expression::Borrow(e) => self.expression(&e.target),
            Expression::Deref(e) => self.expression(&e.target),
            Expression::Await(e) => self.expression(&e.target),
            Expression::Propagate(e) => self.expression(&e.target),
            Expression::Cast(e) => self.expression(&e.value),
        }
    }
}
