//! The unifier: union-find over inference variables with occurs check.
//!
//! Variables carry a kind so unsuffixed numeric literals stay flexible
//! during inference and default (`I32` / `F64`) only at zonk time, when
//! no constraint fixed them.

use super::types::{FloatKind, IntKind, Type, TypeVar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    General,
    /// Must resolve to an integer type; defaults to `I32`.
    Integer,
    /// Must resolve to a float type; defaults to `F64`.
    Float,
}

#[derive(Debug, Clone)]
struct VarState {
    binding: Option<Type>,
    kind: VarKind,
}

#[derive(Debug, Default)]
pub struct Unifier {
    vars: Vec<VarState>,
}

impl Unifier {
    pub fn new() -> Self {
        Unifier::default()
    }

    pub fn fresh(&mut self, kind: VarKind) -> Type {
        let var = TypeVar(self.vars.len() as u32);
        self.vars.push(VarState {
            binding: None,
            kind,
        });
        Type::Var(var)
    }

    fn state(&self, var: TypeVar) -> &VarState {
        &self.vars[var.0 as usize]
    }

    /// Follow variable bindings at the head of a type.
    pub fn shallow(&self, t: &Type) -> Type {
        let mut current = t.clone();
        while let Type::Var(var) = current {
            match &self.state(var).binding {
                Some(bound) => current = bound.clone(),
                None => return Type::Var(var),
            }
        }
        current
    }

    fn occurs(&self, var: TypeVar, t: &Type) -> bool {
        match self.shallow(t) {
            Type::Var(other) => other == var,
            Type::Named { args, .. } => args.iter().any(|a| self.occurs(var, a)),
            Type::Function {
                params,
                return_value,
                ..
            } => params.iter().any(|p| self.occurs(var, p)) || self.occurs(var, &return_value),
            Type::Tuple(elements) => elements.iter().any(|e| self.occurs(var, e)),
            Type::Array(element, _) | Type::Slice(element) => self.occurs(var, &element),
            Type::Reference { inner, .. } => self.occurs(var, &inner),
            _ => false,
        }
    }

    fn kind_accepts(kind: VarKind, t: &Type) -> bool {
        match kind {
            VarKind::General => true,
            VarKind::Integer => matches!(t, Type::Int(_) | Type::Error),
            VarKind::Float => matches!(t, Type::Float(_) | Type::Error),
        }
    }

    fn bind(&mut self, var: TypeVar, t: Type) -> Result<(), (Type, Type)> {
        if self.occurs(var, &t) {
            return Err((Type::Var(var), t));
        }
        if !Self::kind_accepts(self.state(var).kind, &t) {
            return Err((Type::Var(var), t));
        }
        self.vars[var.0 as usize].binding = Some(t);
        Ok(())
    }

    /// Merge two unbound variables, keeping the more constrained kind.
    fn merge_vars(&mut self, a: TypeVar, b: TypeVar) {
        if a == b {
            return;
        }
        let kind_a = self.state(a).kind;
        let kind_b = self.state(b).kind;
        let merged = match (kind_a, kind_b) {
            (VarKind::General, other) | (other, VarKind::General) => other,
            (same, _) => same,
        };
        self.vars[b.0 as usize].kind = merged;
        self.vars[a.0 as usize].binding = Some(Type::Var(b));
    }

    /// Structural unification. `Error` absorbs anything (diagnostic
    /// already recorded elsewhere); `Never` flows into any type.
    pub fn unify(&mut self, left: &Type, right: &Type) -> Result<(), (Type, Type)> {
        let left = self.shallow(left);
        let right = self.shallow(right);

        match (&left, &right) {
            (Type::Error, _) | (_, Type::Error) => Ok(()),
            (Type::Never, _) | (_, Type::Never) => Ok(()),
            (Type::Var(a), Type::Var(b)) => {
                self.merge_vars(*a, *b);
                Ok(())
            }
            (Type::Var(var), other) => self.bind(*var, other.clone()),
            (other, Type::Var(var)) => self.bind(*var, other.clone()),
            (Type::Int(a), Type::Int(b)) if a == b => Ok(()),
            (Type::Float(a), Type::Float(b)) if a == b => Ok(()),
            (Type::Boolean, Type::Boolean)
            | (Type::Character, Type::Character)
            | (Type::String, Type::String)
            | (Type::Unit, Type::Unit) => Ok(()),
            (Type::Generic(a), Type::Generic(b)) if a == b => Ok(()),
            (Type::DynBehavior(a), Type::DynBehavior(b)) if a == b => Ok(()),
            (
                Type::Named { name: a, args: xs },
                Type::Named { name: b, args: ys },
            ) if a == b && xs.len() == ys.len() => {
                for (x, y) in xs.iter().zip(ys) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (
                Type::Function {
                    params: xs,
                    return_value: xr,
                    ..
                },
                Type::Function {
                    params: ys,
                    return_value: yr,
                    ..
                },
            ) if xs.len() == ys.len() => {
                for (x, y) in xs.iter().zip(ys) {
                    self.unify(x, y)?;
                }
                self.unify(xr, yr)
            }
            (Type::Tuple(xs), Type::Tuple(ys)) if xs.len() == ys.len() => {
                for (x, y) in xs.iter().zip(ys) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (Type::Array(x, n), Type::Array(y, m)) if n == m => self.unify(x, y),
            (Type::Slice(x), Type::Slice(y)) => self.unify(x, y),
            (
                Type::Reference {
                    inner: x,
                    mutable: mx,
                },
                Type::Reference {
                    inner: y,
                    mutable: my,
                },
            ) if mx == my => self.unify(x, y),
            _ => Err((left, right)),
        }
    }

    /// Fully resolve a type, applying numeric defaults to variables no
    /// constraint ever fixed. General variables stay unresolved and are
    /// reported by validation as ambiguous inference.
    pub fn zonk(&self, t: &Type) -> Type {
        match self.shallow(t) {
            Type::Var(var) => match self.state(var).kind {
                VarKind::Integer => Type::Int(IntKind::I32),
                VarKind::Float => Type::Float(FloatKind::F64),
                VarKind::General => Type::Var(var),
            },
            Type::Named { name, args } => Type::Named {
                name,
                args: args.iter().map(|a| self.zonk(a)).collect(),
            },
            Type::Function {
                params,
                return_value,
                effects,
            } => Type::Function {
                params: params.iter().map(|p| self.zonk(p)).collect(),
                return_value: Box::new(self.zonk(&return_value)),
                effects,
            },
            Type::Tuple(elements) => Type::Tuple(elements.iter().map(|e| self.zonk(e)).collect()),
            Type::Array(element, length) => Type::Array(Box::new(self.zonk(&element)), length),
            Type::Slice(element) => Type::Slice(Box::new(self.zonk(&element))),
            Type::Reference { inner, mutable } => Type::Reference {
                inner: Box::new(self.zonk(&inner)),
                mutable,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unify_var_with_concrete() {
        let mut unifier = Unifier::new();
        let var = unifier.fresh(VarKind::General);
        assert!(unifier.unify(&var, &Type::Boolean).is_ok());
        assert_eq!(unifier.zonk(&var), Type::Boolean);
    }

    #[test]
    fn test_integer_var_defaults_to_i32() {
        let mut unifier = Unifier::new();
        let var = unifier.fresh(VarKind::Integer);
        assert_eq!(unifier.zonk(&var), Type::Int(IntKind::I32));
    }

    #[test]
    fn test_integer_var_rejects_bool() {
        let mut unifier = Unifier::new();
        let var = unifier.fresh(VarKind::Integer);
        assert!(unifier.unify(&var, &Type::Boolean).is_err());
    }

    #[test]
    fn test_integer_var_takes_constraint_over_default() {
        let mut unifier = Unifier::new();
        let var = unifier.fresh(VarKind::Integer);
        assert!(unifier.unify(&Type::Int(IntKind::U64), &var).is_ok());
        assert_eq!(unifier.zonk(&var), Type::Int(IntKind::U64));
    }

    #[test]
    fn test_occurs_check_rejects_recursive_type() {
        let mut unifier = Unifier::new();
        let var = unifier.fresh(VarKind::General);
        let Type::Var(inner) = var.clone() else {
            unreachable!();
        };
        let recursive = Type::Named {
            name: "List".into(),
            args: vec![Type::Var(inner)],
        };
        assert!(unifier.unify(&var, &recursive).is_err());
    }

    #[test]
    fn test_var_merge_keeps_numeric_kind() {
        let mut unifier = Unifier::new();
        let a = unifier.fresh(VarKind::Integer);
        let b = unifier.fresh(VarKind::General);
        assert!(unifier.unify(&a, &b).is_ok());
        // Both resolve through the merged representative.
        assert_eq!(unifier.zonk(&a), Type::Int(IntKind::I32));
        assert_eq!(unifier.zonk(&b), Type::Int(IntKind::I32));
    }

    #[test]
    fn test_never_unifies_with_anything() {
        let mut unifier = Unifier::new();
        assert!(unifier.unify(&Type::Never, &Type::String).is_ok());
        assert!(unifier.unify(&Type::Int(IntKind::I8), &Type::Never).is_ok());
    }

    #[test]
    fn test_mismatched_nominals_fail() {
        let mut unifier = Unifier::new();
        assert!(unifier
            .unify(&Type::named("Foo"), &Type::named("Bar"))
            .is_err());
    }
}
