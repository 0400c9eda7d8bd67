//! Name resolution.
//!
//! Collects every top-level symbol across the module graph, rejects
//! duplicate definitions, then validates `use` declarations against the
//! table (existence and visibility) and builds each module's import map.
//! Items may be forward-referenced within a module, so collection runs
//! fully before any lookup. Local `let` bindings are scoped and bound
//! later, inside the type checker's scope stack.

mod modules;
mod symbols;

pub use modules::{
    load_modules, FileProvider, FsFileProvider, LoadedModule, MemoryFileProvider, ModuleGraph,
};
pub use symbols::{
    collect_module_symbols, declaration_signature, function_signature, Symbol, SymbolId,
    SymbolKind, SymbolTable,
};

use std::collections::HashMap;

use log::debug;

use crate::diagnostics::Diagnostic;
use crate::parser::ast::Declaration;
use crate::session::Session;

/// Result of the resolve pass, consumed by the type checker and the
/// canonicalizer.
pub struct Resolution {
    pub table: SymbolTable,
    /// Per-module imports: module key → local name → imported symbol.
    pub imports: HashMap<String, HashMap<String, Symbol>>,
}

pub fn resolve(session: &Session, graph: &ModuleGraph) -> Resolution {
    let mut table = SymbolTable::new();

    for loaded in &graph.modules {
        for symbol in collect_module_symbols(&loaded.module) {
            let span = symbol.span;
            let name = symbol.name.clone();
            let kind = symbol.kind;
            if let Err(existing) = table.insert(symbol) {
                let first = table.get(existing);
                session.emit(
                    Diagnostic::error(
                        "E0302",
                        format!("the {} `{name}` is defined more than once", kind.describe()),
                        span,
                    )
                    .with_label(first.span, "first defined here"),
                );
            }
        }
    }
    debug!("resolved {} top-level symbols", table.len());

    let mut imports: HashMap<String, HashMap<String, Symbol>> = HashMap::new();
    for loaded in &graph.modules {
        let module_key = loaded.module.path.join("::");
        let module_imports = imports.entry(module_key).or_default();

        for declaration in &loaded.module.declarations {
            let Declaration::Use(use_decl) = declaration else {
                continue;
            };
            if use_decl.path.len() < 2 {
                session.emit(Diagnostic::error(
                    "E0300",
                    "`use` needs a module path and an item name",
                    use_decl.position,
                ));
                continue;
            }

            let (item_name, module_path) = use_decl
                .path
                .split_last()
                .expect("length checked above");

            let Some(symbol) = table.lookup(module_path, item_name) else {
                session.emit(Diagnostic::error(
                    "E0300",
                    format!("unresolved import `{}`", use_decl.path.join("::")),
                    use_decl.position,
                ));
                continue;
            };

            let same_module = symbol.module_path == loaded.module.path;
            if !symbol.visibility.is_public() && !same_module {
                session.emit(
                    Diagnostic::error(
                        "E0303",
                        format!(
                            "{} `{}` is private to module `{}`",
                            symbol.kind.describe(),
                            symbol.name,
                            symbol.module_path.join("::")
                        ),
                        use_decl.position,
                    )
                    .with_label(symbol.span, "defined here without `pub`"),
                );
                continue;
            }

            let local = use_decl.local_name().to_string();
            if module_imports.insert(local.clone(), symbol.clone()).is_some() {
                session.emit(Diagnostic::error(
                    "E0305",
                    format!("the name `{local}` is imported more than once"),
                    use_decl.position,
                ));
            }
        }
    }

    Resolution { table, imports }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn resolve_sources(files: &[(&str, &str)]) -> (Session, Resolution) {
        let mut provider = MemoryFileProvider::new();
        for (path, src) in files {
            provider.add(*path, *src);
        }
        let mut session = Session::default();
        let graph = load_modules(&mut session, &provider, Path::new(files[0].0));
        let resolution = resolve(&session, &graph);
        (session, resolution)
    }

    #[test]
    fn test_cross_module_import() {
        let (session, resolution) = resolve_sources(&[
            ("app.tml", "mod net;\nuse app::net::connect;\nfunc main() { }"),
            ("net.tml", "pub func connect() { }"),
        ]);
        assert!(!session.has_errors());
        let imported = &resolution.imports["app"]["connect"];
        assert_eq!(imported.kind, SymbolKind::Function);
        assert_eq!(imported.qualified_name(), "app::net::connect");
    }

    #[test]
    fn test_import_alias() {
        let (session, resolution) = resolve_sources(&[
            ("app.tml", "mod net;\nuse app::net::connect as dial;"),
            ("net.tml", "pub func connect() { }"),
        ]);
        assert!(!session.has_errors());
        assert!(resolution.imports["app"].contains_key("dial"));
    }

    #[test]
    fn test_private_item_not_importable() {
        let (session, _) = resolve_sources(&[
            ("app.tml", "mod net;\nuse app::net::secret;"),
            ("net.tml", "func secret() { }"),
        ]);
        assert!(session.has_errors());
    }

    #[test]
    fn test_unknown_import_reported() {
        let (session, _) =
            resolve_sources(&[("app.tml", "use app::missing::thing;\nfunc main() { }")]);
        assert!(session.has_errors());
    }

    #[test]
    fn test_duplicate_definition_reported() {
        let (session, _) =
            resolve_sources(&[("app.tml", "func f() { }\nfunc f() -> I32 { return 1 }")]);
        assert!(session.has_errors());
    }

    #[test]
    fn test_forward_reference_is_fine() {
        let (session, resolution) = resolve_sources(&[(
            "app.tml",
            "mod util;\nuse app::util::helper;\nfunc main() { }",
        ), ("util.tml", "pub func helper() { }")]);
        assert!(!session.has_errors());
        assert_eq!(resolution.table.len(), 2);
    }
}
