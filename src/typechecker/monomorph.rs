//! Monomorphization cache.
//!
//! Generic functions are specialized per call site; the cache is keyed on
//! `(function, type-argument list)` so each concrete instantiation is
//! emitted exactly once. The checker records instantiations as it infers
//! call sites; the canonicalizer and emitter read the finished set.

use std::collections::BTreeMap;

use super::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct MonoInstance {
    /// Qualified name of the generic function.
    pub function: String,
    /// Concrete type arguments in declaration order.
    pub type_args: Vec<Type>,
    /// Symbol name for the emitted specialization.
    pub mangled: String,
}

/// Render a type into a symbol-safe mangle fragment.
fn mangle_type(t: &Type) -> String {
    t.to_string()
        .chars()
        .map(|c| match c {
            '[' | ']' | '(' | ')' | ' ' | ',' | '-' | '>' => '.',
            other => other,
        })
        .collect::<String>()
        .split('.')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

pub fn mangle(function: &str, type_args: &[Type]) -> String {
    if type_args.is_empty() {
        return function.to_string();
    }
    let args: Vec<String> = type_args.iter().map(mangle_type).collect();
    format!("{function}${}", args.join("$"))
}

#[derive(Debug, Default)]
pub struct MonoCache {
    // BTreeMap keeps emission order deterministic.
    entries: BTreeMap<String, MonoInstance>,
}

impl MonoCache {
    pub fn new() -> Self {
        MonoCache::default()
    }

    /// Record an instantiation; returns the mangled symbol name. Hitting
    /// an existing entry is the common case and costs one lookup.
    pub fn instantiate(&mut self, function: &str, type_args: Vec<Type>) -> String {
        let mangled = mangle(function, &type_args);
        self.entries
            .entry(mangled.clone())
            .or_insert_with(|| MonoInstance {
                function: function.to_string(),
                type_args,
                mangled: mangled.clone(),
            });
        mangled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn instances(&self) -> impl Iterator<Item = &MonoInstance> {
        self.entries.values()
    }

    pub fn instances_of(&self, function: &str) -> Vec<&MonoInstance> {
        self.entries
            .values()
            .filter(|instance| instance.function == function)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::types::IntKind;

    #[test]
    fn test_mangle_shapes() {
        assert_eq!(mangle("app::id", &[]), "app::id");
        assert_eq!(
            mangle("app::id", &[Type::Int(IntKind::I32)]),
            "app::id$I32"
        );
        let nested = Type::Named {
            name: "Maybe".into(),
            args: vec![Type::Int(IntKind::I64)],
        };
        assert_eq!(mangle("app::wrap", &[nested]), "app::wrap$Maybe.I64");
    }

    #[test]
    fn test_cache_dedupes_instantiations() {
        let mut cache = MonoCache::new();
        let a = cache.instantiate("app::id", vec![Type::Int(IntKind::I32)]);
        let b = cache.instantiate("app::id", vec![Type::Int(IntKind::I32)]);
        let c = cache.instantiate("app::id", vec![Type::Boolean]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.instances_of("app::id").len(), 2);
    }
}
