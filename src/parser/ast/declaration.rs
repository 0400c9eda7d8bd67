//! Top-level declaration nodes.

use serde::{Deserialize, Serialize};

use crate::source::Span;

use super::{AiDirective, Block, Expression, Ident, NodeId, TypeName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Declaration<T> {
    Function(FunctionDecl<T>),
    Type(TypeDecl),
    Behavior(BehaviorDecl),
    Extend(ExtendDecl<T>),
    Const(ConstDecl<T>),
    Use(UseDecl),
    Mod(ModDecl),
    /// Stand-in for a declaration that failed to parse.
    Error(Span),
}

impl<T> Declaration<T> {
    pub fn position(&self) -> Span {
        match self {
            Declaration::Function(d) => d.position,
            Declaration::Type(d) => d.position,
            Declaration::Behavior(d) => d.position,
            Declaration::Extend(d) => d.position,
            Declaration::Const(d) => d.position,
            Declaration::Use(d) => d.position,
            Declaration::Mod(d) => d.position,
            Declaration::Error(position) => *position,
        }
    }

    /// The declared name, where the declaration has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Declaration::Function(d) => Some(&d.name.name),
            Declaration::Type(d) => Some(&d.name),
            Declaration::Behavior(d) => Some(&d.name),
            Declaration::Const(d) => Some(&d.name.name),
            Declaration::Extend(_)
            | Declaration::Use(_)
            | Declaration::Mod(_)
            | Declaration::Error(_) => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// A dotted effect path as written in source: `io.file.read`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectPath {
    pub segments: Vec<String>,
    pub position: Span,
}

impl EffectPath {
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

/// `[T, U: Behavior]` — a generic parameter with optional inline bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericParam {
    pub name: String,
    pub bounds: Vec<TypeName>,
    pub position: Span,
}

/// One `where T: Behavior1 + Behavior2` obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    pub param: String,
    pub bounds: Vec<TypeName>,
    pub position: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter<T> {
    pub name: Ident<T>,
    pub type_annotation: TypeName,
    pub position: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl<T> {
    pub visibility: Visibility,
    pub is_async: bool,
    pub name: Ident<T>,
    pub generics: Vec<GenericParam>,
    /// `Some(mutable)` when the function takes `this` / `mut this`.
    pub this_param: Option<bool>,
    pub parameters: Vec<Parameter<T>>,
    pub return_type: Option<TypeName>,
    /// The `uses` clause; `None` means "infer (private) or pure (public)".
    pub declared_effects: Option<Vec<EffectPath>>,
    pub where_clauses: Vec<WhereClause>,
    pub body: Block<T>,
    /// `@xxxxxxxx` stable-ID annotation written in source, if any.
    pub stable_id: Option<String>,
    pub directives: Vec<AiDirective>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub visibility: Visibility,
    pub name: String,
    pub type_name: TypeName,
    pub position: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    /// Positional payload types; empty for unit variants.
    pub payload: Vec<TypeName>,
    pub position: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDeclBody {
    /// `type P = { x: I32, y: I32 }`
    Struct(Vec<FieldDecl>),
    /// `type Maybe[T] = Just(T) | Nothing`
    Enum(Vec<VariantDecl>),
    /// `type Meters = I32`
    Alias(TypeName),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub visibility: Visibility,
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub body: TypeDeclBody,
    pub stable_id: Option<String>,
    pub directives: Vec<AiDirective>,
    pub position: Span,
    pub id: NodeId,
}

/// A method signature inside a behavior declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSig {
    pub name: String,
    pub this_param: Option<bool>,
    pub parameters: Vec<(String, TypeName)>,
    pub return_type: Option<TypeName>,
    pub declared_effects: Option<Vec<EffectPath>>,
    pub position: Span,
}

/// `behavior Reader { type Item; func read(this) -> I32 }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDecl {
    pub visibility: Visibility,
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub associated_types: Vec<String>,
    pub methods: Vec<MethodSig>,
    pub stable_id: Option<String>,
    pub directives: Vec<AiDirective>,
    pub position: Span,
    pub id: NodeId,
}

/// `extend T { … }` (inherent) or `extend T with B { … }` (behavior impl).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendDecl<T> {
    pub target: TypeName,
    pub behavior: Option<TypeName>,
    /// `type Item = U8;` bindings inside a behavior impl.
    pub associated_bindings: Vec<(String, TypeName)>,
    pub methods: Vec<FunctionDecl<T>>,
    pub directives: Vec<AiDirective>,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl<T> {
    pub visibility: Visibility,
    pub name: Ident<T>,
    pub type_annotation: TypeName,
    pub value: Expression<T>,
    pub stable_id: Option<String>,
    pub directives: Vec<AiDirective>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

/// `use a::b::C` or `use a::b::C as D`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseDecl {
    pub path: Vec<String>,
    pub alias: Option<String>,
    pub position: Span,
    pub id: NodeId,
}

impl UseDecl {
    /// The name this import introduces into scope.
    pub fn local_name(&self) -> &str {
        self.alias
            .as_deref()
            .unwrap_or_else(|| self.path.last().expect("use paths are never empty"))
    }
}

/// `mod child` — loads `child.tml` or `child/mod.tml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModDecl {
    pub name: String,
    pub position: Span,
    pub id: NodeId,
}

/// `caps: [io.file, crypto.random]` — the module's capability envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsDecl {
    pub effects: Vec<EffectPath>,
    pub position: Span,
}
