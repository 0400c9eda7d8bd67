//! The per-compilation [`Session`]: the only piece of near-global state.
//!
//! A session owns the source map, the identifier interner, the diagnostic
//! sink and the compilation options, and is threaded explicitly through
//! every pass. All of its sub-resources are append-only, so passes holding
//! `&Session` can record new facts without any synchronization concerns.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::source::SourceMap;

/// Interned identifier. Cheap to copy and compare; resolved back to text
/// through the session's [`Interner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

/// Append-only string interner. Identifiers, module path segments and
/// effect path segments all intern through here.
#[derive(Debug, Default)]
pub struct Interner {
    names: RefCell<Vec<String>>,
    indices: RefCell<HashMap<String, u32>>,
}

impl Interner {
    pub fn new() -> Self {
        Interner::default()
    }

    pub fn intern(&self, text: &str) -> Name {
        if let Some(&idx) = self.indices.borrow().get(text) {
            return Name(idx);
        }
        let mut names = self.names.borrow_mut();
        let idx = names.len() as u32;
        names.push(text.to_string());
        self.indices.borrow_mut().insert(text.to_string(), idx);
        Name(idx)
    }

    pub fn resolve(&self, name: Name) -> String {
        self.names.borrow()[name.0 as usize].clone()
    }
}

/// Driver-provided configuration the core passes care about.
#[derive(Debug, Clone)]
pub struct Options {
    pub target_triple: String,
    /// Emit diagnostics as JSON instead of colored text.
    pub json_diagnostics: bool,
    /// Language/IR version recorded in the canonical IR module header.
    pub ir_version: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            target_triple: "x86_64-unknown-linux-gnu".to_string(),
            json_diagnostics: false,
            ir_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub struct Session {
    pub source_map: SourceMap,
    pub interner: Interner,
    pub diagnostics: DiagnosticSink,
    pub options: Options,
}

impl Session {
    pub fn new(options: Options) -> Self {
        Session {
            source_map: SourceMap::new(),
            interner: Interner::new(),
            diagnostics: DiagnosticSink::new(),
            options,
        }
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.emit(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(Options::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interner_dedupes() {
        let interner = Interner::new();
        let a = interner.intern("value");
        let b = interner.intern("value");
        let c = interner.intern("other");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(a), "value");
        assert_eq!(interner.resolve(c), "other");
    }

    #[test]
    fn test_session_collects_errors() {
        let session = Session::default();
        assert!(!session.has_errors());
        session.emit(Diagnostic::error(
            "E0001",
            "boom",
            crate::source::Span::default(),
        ));
        assert!(session.has_errors());
    }
}
