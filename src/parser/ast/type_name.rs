//! Syntactic type references. These are resolved to semantic
//! [`crate::typechecker::Type`] terms during type checking.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::source::Span;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeName {
    /// `I32`, `Maybe[I32]`, `std::fs::File`
    Named {
        path: Vec<String>,
        args: Vec<TypeName>,
        position: Span,
    },
    /// `func(I32, Str) -> Bool`
    Func {
        params: Vec<TypeName>,
        return_type: Box<TypeName>,
        position: Span,
    },
    /// `(I32, Str)`
    Tuple(Vec<TypeName>, Span),
    /// `[T; 4]`
    Array {
        element: Box<TypeName>,
        length: u64,
        position: Span,
    },
    /// `[T]`
    Slice {
        element: Box<TypeName>,
        position: Span,
    },
    /// `ref T` / `mut ref T`
    Reference {
        inner: Box<TypeName>,
        mutable: bool,
        position: Span,
    },
    /// `dyn Reader`
    Dyn { behavior: Vec<String>, position: Span },
    /// `()`
    Unit(Span),
}

impl TypeName {
    pub fn position(&self) -> Span {
        match self {
            TypeName::Named { position, .. }
            | TypeName::Func { position, .. }
            | TypeName::Array { position, .. }
            | TypeName::Slice { position, .. }
            | TypeName::Reference { position, .. }
            | TypeName::Dyn { position, .. } => *position,
            TypeName::Tuple(_, position) | TypeName::Unit(position) => *position,
        }
    }

    /// Shorthand used by tests and the resolver for plain named types.
    pub fn plain(name: &str, position: Span) -> TypeName {
        TypeName::Named {
            path: vec![name.to_string()],
            args: vec![],
            position,
        }
    }
}

impl Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeName::Named { path, args, .. } => {
                write!(f, "{}", path.join("::"))?;
                if !args.is_empty() {
                    let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "[{}]", rendered.join(", "))?;
                }
                Ok(())
            }
            TypeName::Func {
                params,
                return_type,
                ..
            } => {
                let rendered: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "func({}) -> {return_type}", rendered.join(", "))
            }
            TypeName::Tuple(elements, _) => {
                let rendered: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", rendered.join(", "))
            }
            TypeName::Array {
                element, length, ..
            } => write!(f, "[{element}; {length}]"),
            TypeName::Slice { element, .. } => write!(f, "[{element}]"),
            TypeName::Reference { inner, mutable, .. } => {
                if *mutable {
                    write!(f, "mut ref {inner}")
                } else {
                    write!(f, "ref {inner}")
                }
            }
            TypeName::Dyn { behavior, .. } => write!(f, "dyn {}", behavior.join("::")),
            TypeName::Unit(_) => write!(f, "()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_nested_generics() {
        let name = TypeName::Named {
            path: vec!["Maybe".into()],
            args: vec![TypeName::Named {
                path: vec!["List".into()],
                args: vec![TypeName::plain("I32", Span::default())],
                position: Span::default(),
            }],
            position: Span::default(),
        };
        assert_eq!(name.to_string(), "Maybe[List[I32]]");
    }

    #[test]
    fn test_display_reference_and_func() {
        let name = TypeName::Func {
            params: vec![TypeName::Reference {
                inner: Box::new(TypeName::plain("Str", Span::default())),
                mutable: true,
                position: Span::default(),
            }],
            return_type: Box::new(TypeName::Unit(Span::default())),
            position: Span::default(),
        };
        assert_eq!(name.to_string(), "func(mut ref Str) -> ()");
    }
}
