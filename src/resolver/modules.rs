//! Module graph loading.
//!
//! Starting from the root file, `mod child;` declarations pull in
//! `child.tml` or `child/mod.tml` next to the declaring file. Loading is
//! breadth-first, cycles and duplicates are detected by normalized path,
//! and every loaded file is lexed and parsed immediately so the rest of
//! the pipeline sees a flat list of parsed modules.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use log::debug;

use crate::diagnostics::Diagnostic;
use crate::lexer::Lexer;
use crate::parser::ast::{Declaration, Module};
use crate::parser::parse_module;
use crate::session::Session;
use crate::source::{FileId, Span};

/// Source of file contents. The driver uses [`FsFileProvider`]; tests
/// compile straight from memory.
pub trait FileProvider {
    fn read_file(&self, path: &Path) -> anyhow::Result<String>;
}

pub struct FsFileProvider;

impl FileProvider for FsFileProvider {
    fn read_file(&self, path: &Path) -> anyhow::Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

/// In-memory provider keyed by path, used by tests and tooling.
#[derive(Default)]
pub struct MemoryFileProvider {
    files: HashMap<PathBuf, String>,
}

impl MemoryFileProvider {
    pub fn new() -> Self {
        MemoryFileProvider::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>, src: impl Into<String>) {
        self.files.insert(path.into(), src.into());
    }
}

impl FileProvider for MemoryFileProvider {
    fn read_file(&self, path: &Path) -> anyhow::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", path.display()))
    }
}

pub struct LoadedModule {
    pub module: Module<()>,
    pub file: FileId,
    /// Index of the module that declared `mod <this>`; `None` for the root.
    pub parent: Option<usize>,
}

#[derive(Default)]
pub struct ModuleGraph {
    pub modules: Vec<LoadedModule>,
}

impl ModuleGraph {
    pub fn root(&self) -> Option<&LoadedModule> {
        self.modules.first()
    }
}

struct PendingModule {
    path: PathBuf,
    module_path: Vec<String>,
    parent: Option<usize>,
    declared_at: Span,
}

/// Load, lex and parse the root file and everything it reaches through
/// `mod` declarations.
pub fn load_modules(
    session: &mut Session,
    provider: &dyn FileProvider,
    root: &Path,
) -> ModuleGraph {
    let root_name = root
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string());

    let mut graph = ModuleGraph::default();
    let mut visited: HashMap<PathBuf, usize> = HashMap::new();
    let mut queue = vec![PendingModule {
        path: root.to_path_buf(),
        module_path: vec![root_name],
        parent: None,
        declared_at: Span::default(),
    }];

    while let Some(pending) = queue.pop() {
        if visited.contains_key(&pending.path) {
            session.emit(Diagnostic::error(
                "E0304",
                format!(
                    "module `{}` is loaded more than once",
                    pending.module_path.join("::")
                ),
                pending.declared_at,
            ));
            continue;
        }

        let src = match provider.read_file(&pending.path) {
            Ok(src) => src,
            Err(err) => {
                session.emit(Diagnostic::error(
                    "E0301",
                    format!("cannot load module: {err}"),
                    pending.declared_at,
                ));
                continue;
            }
        };

        debug!("loading module {}", pending.module_path.join("::"));
        let file = session
            .source_map
            .add_file(pending.path.to_string_lossy(), src);
        let tokens = Lexer::new(session, file).lex();
        let module = parse_module(session, file, tokens, pending.module_path.clone());

        let index = graph.modules.len();
        visited.insert(pending.path.clone(), index);

        let search_dir = module_search_dir(&pending.path);
        for declaration in &module.declarations {
            if let Declaration::Mod(mod_decl) = declaration {
                match locate_child(provider, &search_dir, &mod_decl.name) {
                    Some(child_path) => {
                        let mut child_module_path = pending.module_path.clone();
                        child_module_path.push(mod_decl.name.clone());
                        queue.push(PendingModule {
                            path: child_path,
                            module_path: child_module_path,
                            parent: Some(index),
                            declared_at: mod_decl.position,
                        });
                    }
                    None => {
                        session.emit(Diagnostic::error(
                            "E0301",
                            format!(
                                "cannot find `{0}.tml` or `{0}/mod.tml` for `mod {0}`",
                                mod_decl.name
                            ),
                            mod_decl.position,
                        ));
                    }
                }
            }
        }

        graph.modules.push(LoadedModule {
            module,
            file,
            parent: pending.parent,
        });
    }

    graph
}

/// Children of `dir/mod.tml` live in `dir/`; children of `name.tml` live
/// next to it.
fn module_search_dir(file: &Path) -> PathBuf {
    file.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn locate_child(provider: &dyn FileProvider, dir: &Path, name: &str) -> Option<PathBuf> {
    let flat = dir.join(format!("{name}.tml"));
    if provider.read_file(&flat).is_ok() {
        return Some(flat);
    }
    let nested = dir.join(name).join("mod.tml");
    if provider.read_file(&nested).is_ok() {
        return Some(nested);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_root_and_child() {
        let mut provider = MemoryFileProvider::new();
        provider.add("app.tml", "mod net;\nfunc main() { }");
        provider.add("net.tml", "pub func connect() { }");

        let mut session = Session::default();
        let graph = load_modules(&mut session, &provider, Path::new("app.tml"));

        assert!(!session.has_errors());
        assert_eq!(graph.modules.len(), 2);
        assert_eq!(graph.modules[0].module.path, vec!["app".to_string()]);
        assert_eq!(
            graph.modules[1].module.path,
            vec!["app".to_string(), "net".to_string()]
        );
        assert_eq!(graph.modules[1].parent, Some(0));
    }

    #[test]
    fn test_load_directory_module() {
        let mut provider = MemoryFileProvider::new();
        provider.add("app.tml", "mod store;");
        provider.add("store/mod.tml", "mod disk;");
        provider.add("store/disk.tml", "pub func flush() { }");

        let mut session = Session::default();
        let graph = load_modules(&mut session, &provider, Path::new("app.tml"));

        assert!(!session.has_errors());
        assert_eq!(graph.modules.len(), 3);
        let paths: Vec<String> = graph
            .modules
            .iter()
            .map(|m| m.module.path.join("::"))
            .collect();
        assert!(paths.contains(&"app::store::disk".to_string()));
    }

    #[test]
    fn test_missing_module_is_reported() {
        let mut provider = MemoryFileProvider::new();
        provider.add("app.tml", "mod ghost;");

        let mut session = Session::default();
        let graph = load_modules(&mut session, &provider, Path::new("app.tml"));

        assert!(session.has_errors());
        assert_eq!(graph.modules.len(), 1);
    }
}
