//! Inference context threaded through type checking: the lexical scope,
//! the shared definition registry and the unifier. Cloned freely to
//! snapshot scope state into checked nodes; equality is intentionally
//! degenerate because context identity never participates in type
//! equality.

use std::cell::RefCell;
use std::rc::Rc;

use super::behavior::Definitions;
use super::scope::Scope;
use super::unify::{Unifier, VarKind};
use super::types::Type;

#[derive(Debug, Clone)]
pub struct Context {
    pub scope: Scope,
    pub definitions: Rc<Definitions>,
    pub unifier: Rc<RefCell<Unifier>>,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            scope: Scope::new(),
            definitions: Rc::new(Definitions::new()),
            unifier: Rc::new(RefCell::new(Unifier::new())),
        }
    }
}

impl Context {
    pub fn fresh_var(&self) -> Type {
        self.unifier.borrow_mut().fresh(VarKind::General)
    }

    pub fn fresh_int_var(&self) -> Type {
        self.unifier.borrow_mut().fresh(VarKind::Integer)
    }

    pub fn fresh_float_var(&self) -> Type {
        self.unifier.borrow_mut().fresh(VarKind::Float)
    }

    pub fn unify(&self, left: &Type, right: &Type) -> Result<(), (Type, Type)> {
        self.unifier.borrow_mut().unify(left, right)
    }

    pub fn zonk(&self, t: &Type) -> Type {
        self.unifier.borrow().zonk(t)
    }

    /// Head shape after following variable bindings and aliases; what
    /// most structural decisions dispatch on.
    pub fn shape_of(&self, t: &Type) -> Type {
        let shallow = self.unifier.borrow().shallow(t);
        self.definitions.resolve_alias(&shallow)
    }
}

impl PartialEq for Context {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for Context {}
