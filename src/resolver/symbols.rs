//! Resolved top-level symbols.
//!
//! A [`Symbol`] is the pass-independent identity of a declaration: its
//! module path, name, kind, normalized signature and declared effects.
//! The canonicalizer derives stable IDs from exactly these fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::parser::ast::{
    Declaration, EffectPath, FunctionDecl, Module, TypeDeclBody, Visibility,
};
use crate::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Type,
    Behavior,
    Const,
}

impl SymbolKind {
    pub fn describe(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Type => "type",
            SymbolKind::Behavior => "behavior",
            SymbolKind::Const => "constant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub module_path: Vec<String>,
    pub name: String,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    /// Normalized signature text; feeds the stable-ID hash.
    pub signature: String,
    pub declared_effects: Option<Vec<EffectPath>>,
    /// `@xxxxxxxx` annotation from source, if the author pinned one.
    pub pinned_stable_id: Option<String>,
    pub span: Span,
}

impl Symbol {
    pub fn qualified_name(&self) -> String {
        let mut parts = self.module_path.clone();
        parts.push(self.name.clone());
        parts.join("::")
    }
}

/// All top-level symbols of a compilation, addressable by module + name.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_module: HashMap<String, HashMap<String, SymbolId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn insert(&mut self, symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let module_key = symbol.module_path.join("::");
        let entry = self.by_module.entry(module_key).or_default();
        if let Some(existing) = entry.get(&symbol.name) {
            return Err(*existing);
        }
        let id = SymbolId(self.symbols.len() as u32);
        entry.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        Ok(id)
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn lookup(&self, module_path: &[String], name: &str) -> Option<&Symbol> {
        let module_key = module_path.join("::");
        let id = self.by_module.get(&module_key)?.get(name)?;
        Some(self.get(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Render the normalized signature of a function: parameter types,
/// return type and declared effects, independent of parameter names.
pub fn function_signature(function: &FunctionDecl<()>) -> String {
    let mut rendered = String::from("func(");
    if function.this_param.is_some() {
        rendered.push_str("this");
    }
    for (idx, parameter) in function.parameters.iter().enumerate() {
        if idx > 0 || function.this_param.is_some() {
            rendered.push_str(", ");
        }
        rendered.push_str(&parameter.type_annotation.to_string());
    }
    rendered.push_str(") -> ");
    match &function.return_type {
        Some(return_type) => rendered.push_str(&return_type.to_string()),
        None => rendered.push_str("()"),
    }
    if let Some(effects) = &function.declared_effects {
        let mut dotted: Vec<String> = effects.iter().map(|e| e.dotted()).collect();
        dotted.sort_unstable();
        rendered.push_str(&format!(" uses {}", dotted.join(", ")));
    }
    rendered
}

/// Normalized signature of any declaration, used for stable IDs.
pub fn declaration_signature(declaration: &Declaration<()>) -> Option<String> {
    match declaration {
        Declaration::Function(function) => Some(function_signature(function)),
        Declaration::Type(decl) => {
            let rendered = match &decl.body {
                TypeDeclBody::Struct(fields) => {
                    let mut parts: Vec<String> = fields
                        .iter()
                        .map(|f| format!("{}: {}", f.name, f.type_name))
                        .collect();
                    parts.sort_unstable();
                    format!("struct {{ {} }}", parts.join(", "))
                }
                TypeDeclBody::Enum(variants) => {
                    // Variant order is semantic (it fixes tags), so the
                    // signature preserves it.
                    let parts: Vec<String> = variants
                        .iter()
                        .map(|v| {
                            if v.payload.is_empty() {
                                v.name.clone()
                            } else {
                                let payload: Vec<String> =
                                    v.payload.iter().map(|t| t.to_string()).collect();
                                format!("{}({})", v.name, payload.join(", "))
                            }
                        })
                        .collect();
                    format!("enum {}", parts.join(" | "))
                }
                TypeDeclBody::Alias(target) => format!("alias {target}"),
            };
            Some(rendered)
        }
        Declaration::Behavior(decl) => {
            let mut parts: Vec<String> = decl
                .methods
                .iter()
                .map(|m| {
                    let params: Vec<String> =
                        m.parameters.iter().map(|(_, t)| t.to_string()).collect();
                    format!(
                        "{}({}) -> {}",
                        m.name,
                        params.join(", "),
                        m.return_type
                            .as_ref()
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "()".to_string())
                    )
                })
                .collect();
            parts.sort_unstable();
            Some(format!("behavior {{ {} }}", parts.join("; ")))
        }
        Declaration::Const(decl) => Some(format!("const {}", decl.type_annotation)),
        Declaration::Extend(_)
        | Declaration::Use(_)
        | Declaration::Mod(_)
        | Declaration::Error(_) => None,
    }
}

/// Collect the symbols a single module defines.
pub fn collect_module_symbols(module: &Module<()>) -> Vec<Symbol> {
    let mut symbols = vec![];
    for declaration in &module.declarations {
        let (name, kind, visibility, effects, pinned) = match declaration {
            Declaration::Function(f) => (
                f.name.name.clone(),
                SymbolKind::Function,
                f.visibility,
                f.declared_effects.clone(),
                f.stable_id.clone(),
            ),
            Declaration::Type(t) => (
                t.name.clone(),
                SymbolKind::Type,
                t.visibility,
                None,
                t.stable_id.clone(),
            ),
            Declaration::Behavior(b) => (
                b.name.clone(),
                SymbolKind::Behavior,
                b.visibility,
                None,
                b.stable_id.clone(),
            ),
            Declaration::Const(c) => (
                c.name.name.clone(),
                SymbolKind::Const,
                c.visibility,
                None,
                c.stable_id.clone(),
            ),
            _ => continue,
        };
        let signature = declaration_signature(declaration).unwrap_or_default();
        symbols.push(Symbol {
            module_path: module.path.clone(),
            name,
            kind,
            visibility,
            signature,
            declared_effects: effects,
            pinned_stable_id: pinned,
            span: declaration.position(),
        });
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::parse_source;

    #[test]
    fn test_function_signature_ignores_parameter_names() {
        let (_, module_a) = parse_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        let (_, module_b) = parse_source("func add(x: I32, y: I32) -> I32 { return x + y }");
        let sig_a = declaration_signature(&module_a.declarations[0]).unwrap();
        let sig_b = declaration_signature(&module_b.declarations[0]).unwrap();
        assert_eq!(sig_a, sig_b);
        assert_eq!(sig_a, "func(I32, I32) -> I32");
    }

    #[test]
    fn test_enum_signature_preserves_variant_order() {
        let (_, module) = parse_source("type Maybe[T] = Just(T) | Nothing;");
        let signature = declaration_signature(&module.declarations[0]).unwrap();
        assert_eq!(signature, "enum Just(T) | Nothing");
    }

    #[test]
    fn test_symbol_table_rejects_duplicates() {
        let mut table = SymbolTable::new();
        let symbol = Symbol {
            module_path: vec!["main".into()],
            name: "f".into(),
            kind: SymbolKind::Function,
            visibility: Visibility::Private,
            signature: "func() -> ()".into(),
            declared_effects: None,
            pinned_stable_id: None,
            span: Span::default(),
        };
        assert!(table.insert(symbol.clone()).is_ok());
        assert!(table.insert(symbol).is_err());
        assert_eq!(table.len(), 1);
    }
}
