//! Canonical semantic type representation used throughout inference,
//! validation and code generation.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::effects::EffectRow;
use crate::parser::ast::TypeName;

use super::context::Context;
use super::error::{TypeCheckError, UndefinedType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
}

impl IntKind {
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64 | IntKind::I128
        )
    }

    pub fn bits(&self) -> u32 {
        match self {
            IntKind::I8 | IntKind::U8 => 8,
            IntKind::I16 | IntKind::U16 => 16,
            IntKind::I32 | IntKind::U32 => 32,
            IntKind::I64 | IntKind::U64 => 64,
            IntKind::I128 | IntKind::U128 => 128,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntKind::I8 => "I8",
            IntKind::I16 => "I16",
            IntKind::I32 => "I32",
            IntKind::I64 => "I64",
            IntKind::I128 => "I128",
            IntKind::U8 => "U8",
            IntKind::U16 => "U16",
            IntKind::U32 => "U32",
            IntKind::U64 => "U64",
            IntKind::U128 => "U128",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatKind {
    F32,
    F64,
}

impl FloatKind {
    pub fn bits(&self) -> u32 {
        match self {
            FloatKind::F32 => 32,
            FloatKind::F64 => 64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FloatKind::F32 => "F32",
            FloatKind::F64 => "F64",
        }
    }
}

/// Identifier of an inference variable inside the session's unifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeVar(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int(IntKind),
    Float(FloatKind),
    Boolean,
    Character,
    String,
    Unit,
    /// The type of expressions that never produce a value.
    Never,
    /// A user-defined nominal type with its (possibly empty) argument list.
    Named { name: String, args: Vec<Type> },
    /// An in-scope generic parameter such as `T`.
    Generic(String),
    Function {
        params: Vec<Type>,
        return_value: Box<Type>,
        effects: EffectRow,
    },
    Tuple(Vec<Type>),
    Array(Box<Type>, u64),
    Slice(Box<Type>),
    Reference { inner: Box<Type>, mutable: bool },
    /// `dyn Behavior` existential; a fat pointer at runtime.
    DynBehavior(String),
    /// Unsolved inference variable.
    Var(TypeVar),
    /// Poison type assigned to failed nodes; unifies with everything so a
    /// single mistake does not cascade.
    Error,
}

impl Type {
    pub fn reference(inner: Type, mutable: bool) -> Type {
        Type::Reference {
            inner: Box::new(inner),
            mutable,
        }
    }

    pub fn named(name: impl Into<String>) -> Type {
        Type::Named {
            name: name.into(),
            args: vec![],
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int(_) | Type::Float(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// Head name for impl-table lookups (`Maybe[I32]` → `Maybe`).
    pub fn head_name(&self) -> Option<&str> {
        match self {
            Type::Named { name, .. } => Some(name),
            Type::Int(kind) => Some(kind.name()),
            Type::Float(kind) => Some(kind.name()),
            Type::Boolean => Some("Bool"),
            Type::Character => Some("Char"),
            Type::String => Some("Str"),
            Type::Reference { inner, .. } => inner.head_name(),
            _ => None,
        }
    }

    /// Strip reference layers; method lookup auto-derefs.
    pub fn peel_references(&self) -> &Type {
        match self {
            Type::Reference { inner, .. } => inner.peel_references(),
            other => other,
        }
    }

    /// Substitute generic parameters by name. Used by monomorphization
    /// and by extend-block method instantiation.
    pub fn substitute(&self, mapping: &std::collections::HashMap<String, Type>) -> Type {
        match self {
            Type::Generic(name) => mapping.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Named { name, args } => Type::Named {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(mapping)).collect(),
            },
            Type::Function {
                params,
                return_value,
                effects,
            } => Type::Function {
                params: params.iter().map(|p| p.substitute(mapping)).collect(),
                return_value: Box::new(return_value.substitute(mapping)),
                effects: effects.clone(),
            },
            Type::Tuple(elements) => {
                Type::Tuple(elements.iter().map(|e| e.substitute(mapping)).collect())
            }
            Type::Array(element, length) => {
                Type::Array(Box::new(element.substitute(mapping)), *length)
            }
            Type::Slice(element) => Type::Slice(Box::new(element.substitute(mapping))),
            Type::Reference { inner, mutable } => Type::Reference {
                inner: Box::new(inner.substitute(mapping)),
                mutable: *mutable,
            },
            _ => self.clone(),
        }
    }

    /// Collect free generic parameter names in appearance order.
    pub fn generic_names(&self, into: &mut Vec<String>) {
        match self {
            Type::Generic(name) => {
                if !into.contains(name) {
                    into.push(name.clone());
                }
            }
            Type::Named { args, .. } => {
                for arg in args {
                    arg.generic_names(into);
                }
            }
            Type::Function {
                params,
                return_value,
                ..
            } => {
                for param in params {
                    param.generic_names(into);
                }
                return_value.generic_names(into);
            }
            Type::Tuple(elements) => {
                for element in elements {
                    element.generic_names(into);
                }
            }
            Type::Array(element, _) | Type::Slice(element) => element.generic_names(into),
            Type::Reference { inner, .. } => inner.generic_names(into),
            _ => {}
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int(kind) => f.write_str(kind.name()),
            Type::Float(kind) => f.write_str(kind.name()),
            Type::Boolean => f.write_str("Bool"),
            Type::Character => f.write_str("Char"),
            Type::String => f.write_str("Str"),
            Type::Unit => f.write_str("()"),
            Type::Never => f.write_str("Never"),
            Type::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "[{}]", rendered.join(", "))?;
                }
                Ok(())
            }
            Type::Generic(name) => f.write_str(name),
            Type::Function {
                params,
                return_value,
                ..
            } => {
                let rendered: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "func({}) -> {return_value}", rendered.join(", "))
            }
            Type::Tuple(elements) => {
                let rendered: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", rendered.join(", "))
            }
            Type::Array(element, length) => write!(f, "[{element}; {length}]"),
            Type::Slice(element) => write!(f, "[{element}]"),
            Type::Reference { inner, mutable } => {
                if *mutable {
                    write!(f, "mut ref {inner}")
                } else {
                    write!(f, "ref {inner}")
                }
            }
            Type::DynBehavior(name) => write!(f, "dyn {name}"),
            Type::Var(var) => write!(f, "?{}", var.0),
            Type::Error => f.write_str("{error}"),
        }
    }
}

/// Resolve a primitive type name, if it is one.
pub fn primitive_type(name: &str) -> Option<Type> {
    match name {
        "I8" => Some(Type::Int(IntKind::I8)),
        "I16" => Some(Type::Int(IntKind::I16)),
        "I32" => Some(Type::Int(IntKind::I32)),
        "I64" => Some(Type::Int(IntKind::I64)),
        "I128" => Some(Type::Int(IntKind::I128)),
        "U8" => Some(Type::Int(IntKind::U8)),
        "U16" => Some(Type::Int(IntKind::U16)),
        "U32" => Some(Type::Int(IntKind::U32)),
        "U64" => Some(Type::Int(IntKind::U64)),
        "U128" => Some(Type::Int(IntKind::U128)),
        "F32" => Some(Type::Float(FloatKind::F32)),
        "F64" => Some(Type::Float(FloatKind::F64)),
        "Bool" => Some(Type::Boolean),
        "Char" => Some(Type::Character),
        "Str" => Some(Type::String),
        "Unit" => Some(Type::Unit),
        "Never" => Some(Type::Never),
        _ => None,
    }
}

/// Convert a parsed `TypeName` plus the current context into a semantic
/// `Type`, resolving nested names and validating user-defined references.
impl TryFrom<(&TypeName, &Context)> for Type {
    type Error = TypeCheckError;

    fn try_from((value, ctx): (&TypeName, &Context)) -> Result<Self, TypeCheckError> {
        match value {
            TypeName::Named { path, args, position } => {
                let name = path.last().expect("paths are never empty");
                if args.is_empty() {
                    if let Some(primitive) = primitive_type(name) {
                        return Ok(primitive);
                    }
                    if ctx.scope.is_generic_param(name) {
                        return Ok(Type::Generic(name.clone()));
                    }
                }
                if ctx.definitions.has_behavior(name) {
                    // A bare behavior name in type position is the
                    // existential; `dyn` is only required for clarity.
                    return Ok(Type::DynBehavior(name.clone()));
                }
                if !ctx.definitions.has_type(name) {
                    return Err(TypeCheckError::UndefinedType(
                        UndefinedType {
                            type_name: value.clone(),
                        },
                        *position,
                    ));
                }
                let mut resolved_args = vec![];
                for arg in args {
                    resolved_args.push((arg, ctx).try_into()?);
                }
                Ok(Type::Named {
                    name: name.clone(),
                    args: resolved_args,
                })
            }
            TypeName::Func {
                params,
                return_type,
                ..
            } => {
                let mut resolved = vec![];
                for param in params {
                    resolved.push((param, ctx).try_into()?);
                }
                Ok(Type::Function {
                    params: resolved,
                    return_value: Box::new((return_type.as_ref(), ctx).try_into()?),
                    effects: EffectRow::pure(),
                })
            }
            TypeName::Tuple(elements, _) => {
                let mut resolved = vec![];
                for element in elements {
                    resolved.push((element, ctx).try_into()?);
                }
                Ok(Type::Tuple(resolved))
            }
            TypeName::Array {
                element, length, ..
            } => Ok(Type::Array(
                Box::new((element.as_ref(), ctx).try_into()?),
                *length,
            )),
            TypeName::Slice { element, .. } => {
                Ok(Type::Slice(Box::new((element.as_ref(), ctx).try_into()?)))
            }
            TypeName::Reference { inner, mutable, .. } => Ok(Type::Reference {
                inner: Box::new((inner.as_ref(), ctx).try_into()?),
                mutable: *mutable,
            }),
            TypeName::Dyn { behavior, position } => {
                let name = behavior.last().expect("paths are never empty");
                if !ctx.definitions.has_behavior(name) {
                    return Err(TypeCheckError::UndefinedType(
                        UndefinedType {
                            type_name: value.clone(),
                        },
                        *position,
                    ));
                }
                Ok(Type::DynBehavior(name.clone()))
            }
            TypeName::Unit(_) => Ok(Type::Unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Span;

    #[test]
    fn test_primitive_literals() {
        let ctx = Context::default();
        assert_eq!(
            Type::try_from((&TypeName::plain("I32", Span::default()), &ctx)),
            Ok(Type::Int(IntKind::I32))
        );
        assert_eq!(
            Type::try_from((&TypeName::plain("F64", Span::default()), &ctx)),
            Ok(Type::Float(FloatKind::F64))
        );
        assert_eq!(
            Type::try_from((&TypeName::plain("Never", Span::default()), &ctx)),
            Ok(Type::Never)
        );
    }

    #[test]
    fn test_undefined_type_rejected() {
        let ctx = Context::default();
        assert!(Type::try_from((&TypeName::plain("Mystery", Span::default()), &ctx)).is_err());
    }

    #[test]
    fn test_reference_round_trip() {
        let ctx = Context::default();
        let name = TypeName::Reference {
            inner: Box::new(TypeName::plain("Str", Span::default())),
            mutable: true,
            position: Span::default(),
        };
        assert_eq!(
            Type::try_from((&name, &ctx)),
            Ok(Type::reference(Type::String, true))
        );
    }

    #[test]
    fn test_substitute_generics() {
        let mapping = std::collections::HashMap::from([("T".to_string(), Type::Int(IntKind::I32))]);
        let generic = Type::Named {
            name: "Maybe".into(),
            args: vec![Type::Generic("T".into())],
        };
        assert_eq!(
            generic.substitute(&mapping),
            Type::Named {
                name: "Maybe".into(),
                args: vec![Type::Int(IntKind::I32)],
            }
        );
    }

    #[test]
    fn test_head_name_peels_references() {
        let t = Type::reference(Type::named("File"), false);
        assert_eq!(t.head_name(), Some("File"));
    }
}
