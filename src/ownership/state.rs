//! Per-binding ownership state and the Copy/Affine split.

use serde::{Deserialize, Serialize};

use crate::source::Span;
use crate::typechecker::types::Type;

/// Where a binding stands at a given program point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipState {
    Owned,
    Moved { at: Span },
    BorrowedShared { count: usize },
    BorrowedExclusive,
    /// Consumed by a call or return; distinct from moved for diagnostics.
    Consumed { at: Span },
    Dropped,
}

impl OwnershipState {
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            OwnershipState::Owned
                | OwnershipState::BorrowedShared { .. }
                | OwnershipState::BorrowedExclusive
        )
    }
}

/// Copy kinds never move: primitive scalars, references, function
/// pointers, and tuples/arrays built only from Copy parts. Everything
/// else is affine.
pub fn is_copy(t: &Type) -> bool {
    match t {
        Type::Int(_)
        | Type::Float(_)
        | Type::Boolean
        | Type::Character
        | Type::Unit
        | Type::Never
        | Type::Reference { .. }
        | Type::Generic(_)
        | Type::Var(_)
        | Type::Error => true,
        Type::Function { .. } => true,
        Type::Tuple(elements) => elements.iter().all(is_copy),
        Type::Array(element, _) => is_copy(element),
        Type::Slice(_) => true,
        Type::String | Type::Named { .. } | Type::DynBehavior(_) => false,
    }
}

/// Affine values that own heap storage get drop calls scheduled; the
/// set matches the runtime shim (strings, lists, files, boxed enums and
/// structs).
pub fn needs_drop(t: &Type) -> bool {
    match t {
        Type::String | Type::DynBehavior(_) => true,
        Type::Named { name, .. } => name != "Range" && name != "Poll",
        Type::Array(element, _) => needs_drop(element),
        Type::Tuple(elements) => elements.iter().any(needs_drop),
        _ => false,
    }
}

/// How a closure captures one of its free variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    Shared,
    Exclusive,
    Move,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub name: String,
    pub mode: CaptureMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::types::IntKind;

    #[test]
    fn test_scalars_and_references_are_copy() {
        assert!(is_copy(&Type::Int(IntKind::I32)));
        assert!(is_copy(&Type::Boolean));
        assert!(is_copy(&Type::reference(Type::String, true)));
        assert!(is_copy(&Type::Tuple(vec![
            Type::Int(IntKind::I8),
            Type::Boolean
        ])));
    }

    #[test]
    fn test_heap_owners_are_affine() {
        assert!(!is_copy(&Type::String));
        assert!(!is_copy(&Type::named("File")));
        assert!(!is_copy(&Type::Tuple(vec![Type::String])));
        assert!(needs_drop(&Type::String));
        assert!(needs_drop(&Type::named("List")));
        assert!(!needs_drop(&Type::Int(IntKind::I64)));
    }
}
