//! Lexical scope stack used during type checking.
//!
//! The `stacks` vector is innermost-at-the-end; lookups walk from the end
//! backwards. Frames are reference counted so snapshotting a scope into a
//! node's `Context` is cheap.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;

use crate::source::Span;

use super::types::Type;

#[derive(Debug, Clone)]
struct StoredVariable {
    type_id: Type,
    mutable: bool,
    declared_at: Span,
}

#[derive(Debug, Default)]
struct Frame {
    variables: HashMap<String, StoredVariable>,
    constants: HashMap<String, Type>,
    generic_params: Vec<String>,
}

type StackFrame = Rc<RefCell<Frame>>;

#[derive(Debug, Clone)]
pub struct Scope {
    stacks: Vec<StackFrame>,
}

impl Default for Scope {
    fn default() -> Self {
        Scope {
            stacks: vec![StackFrame::default()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableAddError {
    pub name: String,
}

impl Display for VariableAddError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "variable `{}` is already declared in this scope",
            self.name
        ))
    }
}

impl std::error::Error for VariableAddError {}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn enter(&mut self) {
        self.stacks.push(StackFrame::default());
    }

    pub fn exit(&mut self) {
        debug_assert!(self.stacks.len() > 1, "cannot exit the root frame");
        self.stacks.pop();
    }

    pub fn add_variable(
        &mut self,
        name: &str,
        type_id: Type,
        mutable: bool,
        declared_at: Span,
    ) -> Result<(), VariableAddError> {
        let frame = self.stacks.last().expect("scope always has a frame");
        let mut frame = frame.borrow_mut();
        if frame.variables.contains_key(name) {
            return Err(VariableAddError {
                name: name.to_string(),
            });
        }
        frame.variables.insert(
            name.to_string(),
            StoredVariable {
                type_id,
                mutable,
                declared_at,
            },
        );
        Ok(())
    }

    /// Overwrite without the redefinition check; used when seeding module
    /// items, which may legally share a frame across passes.
    pub fn force_variable(&mut self, name: &str, type_id: Type, mutable: bool) {
        let frame = self.stacks.last().expect("scope always has a frame");
        frame.borrow_mut().variables.insert(
            name.to_string(),
            StoredVariable {
                type_id,
                mutable,
                declared_at: Span::default(),
            },
        );
    }

    pub fn get_variable(&self, name: &str) -> Option<(Type, bool)> {
        for frame in self.stacks.iter().rev() {
            let frame = frame.borrow();
            if let Some(stored) = frame.variables.get(name) {
                return Some((stored.type_id.clone(), stored.mutable));
            }
            if let Some(constant) = frame.constants.get(name) {
                return Some((constant.clone(), false));
            }
        }
        None
    }

    pub fn variable_span(&self, name: &str) -> Option<Span> {
        for frame in self.stacks.iter().rev() {
            if let Some(stored) = frame.borrow().variables.get(name) {
                return Some(stored.declared_at);
            }
        }
        None
    }

    pub fn add_constant(&mut self, name: &str, type_id: Type) {
        let frame = self.stacks.last().expect("scope always has a frame");
        frame.borrow_mut().constants.insert(name.to_string(), type_id);
    }

    /// Is this name a plain (non-constant) binding? Locals shadow
    /// constants, so the canonicalizer asks this before classifying a
    /// path as a constant reference.
    pub fn is_local_binding(&self, name: &str) -> bool {
        for frame in self.stacks.iter().rev() {
            let frame = frame.borrow();
            if frame.variables.contains_key(name) {
                return true;
            }
            if frame.constants.contains_key(name) {
                return false;
            }
        }
        false
    }

    pub fn get_constant(&self, name: &str) -> Option<Type> {
        for frame in self.stacks.iter().rev() {
            if let Some(constant) = frame.borrow().constants.get(name) {
                return Some(constant.clone());
            }
        }
        None
    }

    pub fn add_generic_params(&mut self, names: &[String]) {
        let frame = self.stacks.last().expect("scope always has a frame");
        frame
            .borrow_mut()
            .generic_params
            .extend(names.iter().cloned());
    }

    pub fn is_generic_param(&self, name: &str) -> bool {
        self.stacks
            .iter()
            .rev()
            .any(|frame| frame.borrow().generic_params.iter().any(|p| p == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::types::IntKind;

    #[test]
    fn test_inner_frame_shadows_outer() {
        let mut scope = Scope::new();
        scope
            .add_variable("x", Type::Boolean, false, Span::default())
            .unwrap();
        scope.enter();
        scope
            .add_variable("x", Type::Int(IntKind::I32), false, Span::default())
            .unwrap();
        assert_eq!(
            scope.get_variable("x"),
            Some((Type::Int(IntKind::I32), false))
        );
        scope.exit();
        assert_eq!(scope.get_variable("x"), Some((Type::Boolean, false)));
    }

    #[test]
    fn test_same_frame_redefinition_rejected() {
        let mut scope = Scope::new();
        scope
            .add_variable("x", Type::Boolean, false, Span::default())
            .unwrap();
        assert!(scope
            .add_variable("x", Type::Boolean, false, Span::default())
            .is_err());
    }

    #[test]
    fn test_generic_params_visible_in_inner_frames() {
        let mut scope = Scope::new();
        scope.add_generic_params(&["T".to_string()]);
        scope.enter();
        assert!(scope.is_generic_param("T"));
        assert!(!scope.is_generic_param("U"));
    }

    #[test]
    fn test_constants_are_immutable() {
        let mut scope = Scope::new();
        scope.add_constant("MAX", Type::Int(IntKind::I64));
        assert_eq!(
            scope.get_variable("MAX"),
            Some((Type::Int(IntKind::I64), false))
        );
    }
}
