//! Expression nodes.

use serde::{Deserialize, Serialize};

use crate::lexer::{Base, NumSuffix};
use crate::source::Span;

use super::{Block, Ident, NodeId, Path, Pattern, TypeName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression<T> {
    Literal(Literal<T>),
    Path(Path<T>),
    Interpolation(Interpolation<T>),
    Unary(Box<Unary<T>>),
    Binary(Box<Binary<T>>),
    Call(Box<Call<T>>),
    MethodCall(Box<MethodCall<T>>),
    FieldAccess(Box<FieldAccess<T>>),
    Index(Box<Index<T>>),
    Tuple(TupleExpr<T>),
    Array(ArrayLiteral<T>),
    StructInit(StructInit<T>),
    If(Box<IfExpr<T>>),
    When(Box<WhenExpr<T>>),
    Block(Box<Block<T>>),
    Closure(Box<Closure<T>>),
    Range(Box<RangeExpr<T>>),
    Borrow(Box<Borrow<T>>),
    Deref(Box<Deref<T>>),
    Await(Box<AwaitExpr<T>>),
    Propagate(Box<Propagate<T>>),
    Cast(Box<Cast<T>>),
    /// Stand-in for a malformed sub-expression; parsing continued past it.
    Error(Span, NodeId),
}

impl<T> Expression<T> {
    pub fn position(&self) -> Span {
        match self {
            Expression::Literal(e) => e.position,
            Expression::Path(e) => e.position,
            Expression::Interpolation(e) => e.position,
            Expression::Unary(e) => e.position,
            Expression::Binary(e) => e.position,
            Expression::Call(e) => e.position,
            Expression::MethodCall(e) => e.position,
            Expression::FieldAccess(e) => e.position,
            Expression::Index(e) => e.position,
            Expression::Tuple(e) => e.position,
            Expression::Array(e) => e.position(),
            Expression::StructInit(e) => e.position,
            Expression::If(e) => e.position,
            Expression::When(e) => e.position,
            Expression::Block(e) => e.position,
            Expression::Closure(e) => e.position,
            Expression::Range(e) => e.position,
            Expression::Borrow(e) => e.position,
            Expression::Deref(e) => e.position,
            Expression::Await(e) => e.position,
            Expression::Propagate(e) => e.position,
            Expression::Cast(e) => e.position,
            Expression::Error(position, _) => *position,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Expression::Literal(e) => e.id,
            Expression::Path(e) => e.id,
            Expression::Interpolation(e) => e.id,
            Expression::Unary(e) => e.id,
            Expression::Binary(e) => e.id,
            Expression::Call(e) => e.id,
            Expression::MethodCall(e) => e.id,
            Expression::FieldAccess(e) => e.id,
            Expression::Index(e) => e.id,
            Expression::Tuple(e) => e.id,
            Expression::Array(e) => e.id(),
            Expression::StructInit(e) => e.id,
            Expression::If(e) => e.id,
            Expression::When(e) => e.id,
            Expression::Block(e) => e.id,
            Expression::Closure(e) => e.id,
            Expression::Range(e) => e.id,
            Expression::Borrow(e) => e.id,
            Expression::Deref(e) => e.id,
            Expression::Await(e) => e.id,
            Expression::Propagate(e) => e.id,
            Expression::Cast(e) => e.id,
            Expression::Error(_, id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int {
        value: u128,
        base: Base,
        suffix: Option<NumSuffix>,
    },
    Float {
        value: f64,
        suffix: Option<NumSuffix>,
    },
    Bool(bool),
    Char(char),
    Str(String),
    Unit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal<T> {
    pub value: LiteralValue,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

/// `"x = ${x}"` — alternating literal parts and hole expressions. There is
/// always exactly one more part than holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpolation<T> {
    pub parts: Vec<String>,
    pub holes: Vec<Expression<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-e`
    Neg,
    /// `not e`
    Not,
    /// `~e`
    BitNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unary<T> {
    pub op: UnaryOp,
    pub operand: Expression<T>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    /// Binding power; higher binds tighter. `Pow` is right-associative,
    /// everything else associates left.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::NotEq => 3,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => 4,
            BinaryOp::BitOr => 5,
            BinaryOp::BitXor => 6,
            BinaryOp::BitAnd => 7,
            BinaryOp::Shl | BinaryOp::Shr => 8,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 10,
            BinaryOp::Pow => 11,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, BinaryOp::Pow)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::LtEq
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Canonical IR operator name.
    pub fn ir_name(&self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "eq",
            BinaryOp::NotEq => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Gt => "gt",
            BinaryOp::LtEq => "le",
            BinaryOp::GtEq => "ge",
            BinaryOp::BitOr => "bit-or",
            BinaryOp::BitXor => "bit-xor",
            BinaryOp::BitAnd => "bit-and",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::Pow => "pow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binary<T> {
    pub op: BinaryOp,
    pub left: Expression<T>,
    pub right: Expression<T>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call<T> {
    pub callee: Expression<T>,
    pub arguments: Vec<Expression<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall<T> {
    pub receiver: Expression<T>,
    pub method: Ident<T>,
    pub type_args: Vec<TypeName>,
    pub arguments: Vec<Expression<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAccess<T> {
    pub receiver: Expression<T>,
    pub field: Ident<T>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index<T> {
    pub receiver: Expression<T>,
    pub index: Expression<T>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleExpr<T> {
    pub elements: Vec<Expression<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayLiteral<T> {
    /// `[a, b, c]`
    List {
        elements: Vec<Expression<T>>,
        info: T,
        position: Span,
        id: NodeId,
    },
    /// `[value; length]`
    Repeat {
        value: Box<Expression<T>>,
        length: Box<Expression<T>>,
        info: T,
        position: Span,
        id: NodeId,
    },
}

impl<T> ArrayLiteral<T> {
    pub fn position(&self) -> Span {
        match self {
            ArrayLiteral::List { position, .. } | ArrayLiteral::Repeat { position, .. } => {
                *position
            }
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            ArrayLiteral::List { id, .. } | ArrayLiteral::Repeat { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit<T> {
    pub name: Ident<T>,
    pub value: Expression<T>,
    pub position: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructInit<T> {
    pub name: Path<T>,
    pub fields: Vec<FieldInit<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

/// Both `if c then a else b` and the block form; the parser records which
/// one it saw so the pretty printer can round-trip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfExpr<T> {
    pub condition: Expression<T>,
    pub then_branch: Expression<T>,
    pub else_branch: Option<Expression<T>>,
    pub expression_form: bool,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenArm<T> {
    pub pattern: Pattern<T>,
    pub value: Expression<T>,
    pub position: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenExpr<T> {
    pub scrutinee: Expression<T>,
    pub arms: Vec<WhenArm<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureParameter<T> {
    pub name: Ident<T>,
    pub type_annotation: Option<TypeName>,
    pub position: Span,
}

/// `do(a, b) a + b`, optionally `transfer do(x) …` to force move capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure<T> {
    pub parameters: Vec<ClosureParameter<T>>,
    pub body: Expression<T>,
    pub transfer: bool,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeExpr<T> {
    pub low: Expression<T>,
    pub high: Expression<T>,
    pub inclusive: bool,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Borrow<T> {
    pub target: Expression<T>,
    pub mutable: bool,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deref<T> {
    pub target: Expression<T>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwaitExpr<T> {
    pub target: Expression<T>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

/// `expr!` — propagate the error arm of a fallible value to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Propagate<T> {
    pub target: Expression<T>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cast<T> {
    pub value: Expression<T>,
    pub target: TypeName,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}
