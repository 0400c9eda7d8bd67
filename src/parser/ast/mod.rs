//! AST node definitions.
//!
//! Every node is generic over its stage parameter `T`, which tracks how far
//! the tree has progressed through the pipeline:
//!
//! - `()` — freshly parsed, no semantic information
//! - `TypeInformation` — after inference, types live in shared slots
//! - `ValidatedTypeInformation` — every slot resolved to a concrete type
//!
//! Nodes own their children outright; the tree is single-owner and
//! cycle-free. Passes that need back-references (the ownership analyzer,
//! the effect checker) key side tables by [`NodeId`] instead of storing
//! pointers.

mod declaration;
mod expression;
mod pattern;
mod statement;
mod type_name;

pub use self::declaration::*;
pub use self::expression::*;
pub use self::pattern::*;
pub use self::statement::*;
pub use self::type_name::*;

use serde::{Deserialize, Serialize};

use crate::source::Span;

/// Identifier of an AST node, unique within one compilation. Assigned by
/// the parser in creation order.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// An identifier occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident<T> {
    pub name: String,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

impl Ident<()> {
    pub fn new(name: impl Into<String>, position: Span, id: NodeId) -> Self {
        Ident {
            name: name.into(),
            info: (),
            position,
            id,
        }
    }
}

/// A `::`-separated path such as `x`, `Maybe::Just` or `std::fs::File`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path<T> {
    pub segments: Vec<String>,
    /// Explicit type arguments on the final segment (`Foo[I32]`).
    pub type_args: Vec<TypeName>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

impl<T> Path<T> {
    pub fn last(&self) -> &str {
        self.segments.last().expect("paths are never empty")
    }

    pub fn joined(&self) -> String {
        self.segments.join("::")
    }
}

/// An `// @ai:` directive captured by the lexer and attached to the next
/// declaration. Carried through to canonical IR as metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiDirective {
    pub name: String,
    pub payload: String,
    pub position: Span,
}

/// A parsed source module: one file's worth of declarations plus its
/// capability envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module<T> {
    /// Dotted module path from the compilation root, e.g. `["app", "net"]`.
    pub path: Vec<String>,
    pub caps: Option<CapsDecl>,
    pub declarations: Vec<Declaration<T>>,
    pub position: Span,
}

impl<T> Module<T> {
    pub fn path_string(&self) -> String {
        self.path.join("::")
    }
}
