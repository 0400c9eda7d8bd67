//! Type, behavior and impl-table definitions.
//!
//! [`Definitions`] is the registry the whole checker reads: user types
//! (structs, enums, aliases), behaviors, inherent methods from
//! `extend T { … }` blocks and behavior impls from `extend T with B { … }`.
//! The impl table also backs vtable materialization when a value is
//! coerced to `dyn Behavior`.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::effects::EffectRow;
use crate::parser::ast::Visibility;

use super::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    /// Ordered as written; canonical IR reorders alphabetically, layout
    /// in codegen follows the canonical order.
    pub fields: Vec<(String, Type, Visibility)>,
}

impl StructDef {
    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(field, _, _)| field == name)
            .map(|(_, t, _)| t)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    /// Source order is semantic: the index is the runtime tag.
    pub variants: Vec<(String, Vec<Type>)>,
}

impl EnumDef {
    pub fn tag_of(&self, variant: &str) -> Option<usize> {
        self.variants.iter().position(|(name, _)| name == variant)
    }

    pub fn payload_of(&self, variant: &str) -> Option<&[Type]> {
        self.variants
            .iter()
            .find(|(name, _)| name == variant)
            .map(|(_, payload)| payload.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefKind {
    Struct(StructDef),
    Enum(EnumDef),
    Alias(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub generics: Vec<String>,
    pub kind: TypeDefKind,
}

/// A callable attached to a type, either inherent or via a behavior impl.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: String,
    /// `Some(mutable)` when the method takes `this`.
    pub this_param: Option<bool>,
    pub params: Vec<Type>,
    pub return_value: Type,
    pub effects: EffectRow,
    pub generics: Vec<String>,
}

impl MethodDef {
    pub fn function_type(&self) -> Type {
        Type::Function {
            params: self.params.clone(),
            return_value: Box::new(self.return_value.clone()),
            effects: self.effects.clone(),
        }
    }
}

/// A behavior declaration: required method signatures plus associated
/// type names.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorDef {
    pub name: String,
    pub methods: Vec<MethodDef>,
    pub associated_types: Vec<String>,
}

impl BehaviorDef {
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// One `extend T with B` impl: its method table and associated type
/// bindings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImplEntry {
    pub methods: HashMap<String, MethodDef>,
    pub associated: HashMap<String, Type>,
}

/// Append-only definition registry shared through the `Context`.
#[derive(Debug, Default)]
pub struct Definitions {
    types: RefCell<HashMap<String, TypeDef>>,
    behaviors: RefCell<HashMap<String, BehaviorDef>>,
    inherent: RefCell<HashMap<String, HashMap<String, MethodDef>>>,
    impls: RefCell<HashMap<(String, String), ImplEntry>>,
}

impl Definitions {
    pub fn new() -> Self {
        Definitions::default()
    }

    pub fn add_type(&self, def: TypeDef) -> bool {
        self.types
            .borrow_mut()
            .insert(def.name.clone(), def)
            .is_none()
    }

    pub fn get_type(&self, name: &str) -> Option<TypeDef> {
        self.types.borrow().get(name).cloned()
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.borrow().contains_key(name)
    }

    /// All struct names, for named-type emission in the backend.
    pub fn all_struct_names(&self) -> Vec<String> {
        self.types
            .borrow()
            .values()
            .filter(|def| matches!(def.kind, TypeDefKind::Struct(_)))
            .map(|def| def.name.clone())
            .collect()
    }

    /// Names of enums that declare a variant with this name, sorted so
    /// ambiguity diagnostics are deterministic.
    pub fn enums_with_variant(&self, variant: &str) -> Vec<String> {
        let mut matches: Vec<String> = self
            .types
            .borrow()
            .values()
            .filter(|def| match &def.kind {
                TypeDefKind::Enum(enum_def) => enum_def.tag_of(variant).is_some(),
                _ => false,
            })
            .map(|def| def.name.clone())
            .collect();
        matches.sort_unstable();
        matches
    }

    /// Follow alias chains to the underlying type definition name.
    pub fn resolve_alias(&self, t: &Type) -> Type {
        let mut current = t.clone();
        for _ in 0..32 {
            let Type::Named { name, .. } = &current else {
                return current;
            };
            match self.get_type(name) {
                Some(TypeDef {
                    kind: TypeDefKind::Alias(target),
                    ..
                }) => current = target,
                _ => return current,
            }
        }
        current
    }

    pub fn add_behavior(&self, def: BehaviorDef) -> bool {
        self.behaviors
            .borrow_mut()
            .insert(def.name.clone(), def)
            .is_none()
    }

    pub fn get_behavior(&self, name: &str) -> Option<BehaviorDef> {
        self.behaviors.borrow().get(name).cloned()
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.behaviors.borrow().contains_key(name)
    }

    pub fn add_inherent_method(&self, type_head: &str, method: MethodDef) -> bool {
        self.inherent
            .borrow_mut()
            .entry(type_head.to_string())
            .or_default()
            .insert(method.name.clone(), method)
            .is_none()
    }

    pub fn inherent_method(&self, type_head: &str, name: &str) -> Option<MethodDef> {
        self.inherent
            .borrow()
            .get(type_head)
            .and_then(|methods| methods.get(name))
            .cloned()
    }

    pub fn add_impl(&self, type_head: &str, behavior: &str, entry: ImplEntry) -> bool {
        self.impls
            .borrow_mut()
            .insert((type_head.to_string(), behavior.to_string()), entry)
            .is_none()
    }

    pub fn get_impl(&self, type_head: &str, behavior: &str) -> Option<ImplEntry> {
        self.impls
            .borrow()
            .get(&(type_head.to_string(), behavior.to_string()))
            .cloned()
    }

    pub fn implements(&self, type_head: &str, behavior: &str) -> bool {
        self.impls
            .borrow()
            .contains_key(&(type_head.to_string(), behavior.to_string()))
    }

    /// Behavior impls that provide a method with this name, for ambiguity
    /// reporting and behavior-method dispatch.
    pub fn behavior_methods_for(&self, type_head: &str, name: &str) -> Vec<(String, MethodDef)> {
        self.impls
            .borrow()
            .iter()
            .filter(|((impl_type, _), _)| impl_type == type_head)
            .filter_map(|((_, behavior), entry)| {
                entry
                    .methods
                    .get(name)
                    .map(|m| (behavior.clone(), m.clone()))
            })
            .collect()
    }

    /// All impls, keyed `(type_head, behavior)`, in deterministic order.
    /// The emitter materializes one vtable global per entry.
    pub fn all_impls(&self) -> Vec<((String, String), ImplEntry)> {
        let mut entries: Vec<_> = self
            .impls
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::types::IntKind;

    fn i32_type() -> Type {
        Type::Int(IntKind::I32)
    }

    #[test]
    fn test_enum_tags_follow_source_order() {
        let def = EnumDef {
            variants: vec![
                ("Just".to_string(), vec![i32_type()]),
                ("Nothing".to_string(), vec![]),
            ],
        };
        assert_eq!(def.tag_of("Just"), Some(0));
        assert_eq!(def.tag_of("Nothing"), Some(1));
        assert_eq!(def.tag_of("Other"), None);
    }

    #[test]
    fn test_alias_resolution_terminates() {
        let defs = Definitions::new();
        defs.add_type(TypeDef {
            name: "A".into(),
            generics: vec![],
            kind: TypeDefKind::Alias(Type::named("B")),
        });
        defs.add_type(TypeDef {
            name: "B".into(),
            generics: vec![],
            kind: TypeDefKind::Alias(i32_type()),
        });
        assert_eq!(defs.resolve_alias(&Type::named("A")), i32_type());
    }

    #[test]
    fn test_impl_lookup() {
        let defs = Definitions::new();
        let method = MethodDef {
            name: "read".into(),
            this_param: Some(false),
            params: vec![],
            return_value: i32_type(),
            effects: crate::effects::EffectRow::pure(),
            generics: vec![],
        };
        let mut entry = ImplEntry::default();
        entry.methods.insert("read".into(), method);
        assert!(defs.add_impl("File", "Reader", entry));
        assert!(defs.implements("File", "Reader"));
        assert_eq!(defs.behavior_methods_for("File", "read").len(), 1);
        assert!(!defs.implements("File", "Writer"));
    }
}
