//! Stable item identifiers.
//!
//! A stable ID is `@` plus the first eight hex digits of the SHA-256 of
//! `module_path ⧺ item_name ⧺ normalized_signature`. Renaming a
//! parameter or reordering unrelated items does not change it; changing
//! the signature does. Collisions append a two-hex-digit sequence byte.
//! IDs pinned in source with an `@xxxxxxxx` annotation are honored as
//! long as they are free.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

pub fn derive_stable_id(module_path: &str, item_name: &str, signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module_path.as_bytes());
    hasher.update(item_name.as_bytes());
    hasher.update(signature.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest[..4].iter().map(|byte| format!("{byte:02x}")).collect();
    format!("@{hex}")
}

/// Tracks assigned IDs within one compilation and resolves collisions
/// deterministically.
#[derive(Debug, Default)]
pub struct StableIdRegistry {
    assigned: HashMap<String, String>,
}

impl StableIdRegistry {
    pub fn new() -> Self {
        StableIdRegistry::default()
    }

    /// Assign the stable ID for an item. `pinned` is the source
    /// annotation, taken verbatim when available and free.
    pub fn assign(
        &mut self,
        module_path: &str,
        item_name: &str,
        signature: &str,
        pinned: Option<&str>,
    ) -> String {
        let owner = format!("{module_path}::{item_name}");

        if let Some(pinned) = pinned {
            if self
                .assigned
                .get(pinned)
                .map_or(true, |holder| *holder == owner)
            {
                self.assigned.insert(pinned.to_string(), owner);
                return pinned.to_string();
            }
        }

        let base = derive_stable_id(module_path, item_name, signature);
        let mut candidate = base.clone();
        let mut sequence = 0u8;
        while let Some(holder) = self.assigned.get(&candidate) {
            if *holder == owner {
                return candidate;
            }
            sequence = sequence.wrapping_add(1);
            candidate = format!("{base}{sequence:02x}");
        }
        self.assigned.insert(candidate.clone(), owner);
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shape() {
        let id = derive_stable_id("app", "add", "func(I32, I32) -> I32");
        assert_eq!(id.len(), 9);
        assert!(id.starts_with('@'));
        assert!(id[1..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_id_ignores_parameter_names_by_construction() {
        // The signature string is parameter-name free, so two spellings
        // of the same function agree.
        let a = derive_stable_id("app", "add", "func(I32, I32) -> I32");
        let b = derive_stable_id("app", "add", "func(I32, I32) -> I32");
        assert_eq!(a, b);
    }

    #[test]
    fn test_id_changes_with_signature() {
        let a = derive_stable_id("app", "add", "func(I32, I32) -> I32");
        let b = derive_stable_id("app", "add", "func(I64, I64) -> I64");
        assert_ne!(a, b);
    }

    #[test]
    fn test_registry_resolves_collisions() {
        let mut registry = StableIdRegistry::new();
        // Occupy `g`'s derived ID by pinning another item to it first.
        let g_base = derive_stable_id("app", "g", "sig");
        let first = registry.assign("app", "f", "func() -> ()", Some(&g_base));
        assert_eq!(first, g_base);

        let second = registry.assign("app", "g", "sig", None);
        assert_ne!(first, second);
        assert!(second.starts_with(&first));
        assert_eq!(second.len(), first.len() + 2);
    }

    #[test]
    fn test_pinned_id_honored() {
        let mut registry = StableIdRegistry::new();
        let id = registry.assign("app", "f", "func() -> ()", Some("@deadbeef"));
        assert_eq!(id, "@deadbeef");
    }

    #[test]
    fn test_same_item_is_idempotent() {
        let mut registry = StableIdRegistry::new();
        let a = registry.assign("app", "f", "func() -> ()", None);
        let b = registry.assign("app", "f", "func() -> ()", None);
        assert_eq!(a, b);
    }
}
