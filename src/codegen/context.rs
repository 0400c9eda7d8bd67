//! Module-level emission state: string literal globals, the runtime shim
//! declarations, vtable globals and the call-target symbol table.

use std::collections::BTreeMap;

use crate::ir::{IrItem, IrProgram};

/// Runtime shim functions the emitter may reference. Declared only when
/// used, in this fixed order, so output stays deterministic.
pub const RUNTIME_DECLS: &[(&str, &str)] = &[
    ("tml_alloc", "declare ptr @tml_alloc(i64)"),
    ("tml_free", "declare void @tml_free(ptr)"),
    ("tml_str_new", "declare ptr @tml_str_new(ptr, i64)"),
    ("tml_str_concat", "declare ptr @tml_str_concat(ptr, ptr)"),
    ("tml_str_free", "declare void @tml_str_free(ptr)"),
    ("tml_str_len", "declare i64 @tml_str_len(ptr)"),
    ("tml_str_push", "declare void @tml_str_push(ptr, i32)"),
    ("tml_str_index", "declare i32 @tml_str_index(ptr, i64)"),
    ("tml_str_eq", "declare i32 @tml_str_eq(ptr, ptr)"),
    ("tml_str_from_int", "declare ptr @tml_str_from_int(i64)"),
    ("tml_str_from_float", "declare ptr @tml_str_from_float(double)"),
    ("tml_str_from_bool", "declare ptr @tml_str_from_bool(i32)"),
    ("tml_str_from_char", "declare ptr @tml_str_from_char(i32)"),
    ("tml_list_new", "declare ptr @tml_list_new()"),
    ("tml_list_push", "declare void @tml_list_push(ptr, ptr)"),
    ("tml_list_pop", "declare ptr @tml_list_pop(ptr)"),
    ("tml_list_len", "declare i64 @tml_list_len(ptr)"),
    ("tml_list_get", "declare ptr @tml_list_get(ptr, i64)"),
    ("tml_list_free", "declare void @tml_list_free(ptr)"),
    ("tml_drop", "declare void @tml_drop(ptr)"),
    ("tml_panic", "declare void @tml_panic(ptr)"),
    ("tml_print", "declare void @tml_print(ptr)"),
    ("tml_time_now", "declare i64 @tml_time_now()"),
    ("tml_rand_next", "declare i64 @tml_rand_next()"),
    ("tml_hash_digest", "declare i64 @tml_hash_digest(ptr)"),
    ("tml_file_open", "declare ptr @tml_file_open(ptr)"),
    ("tml_file_read", "declare i64 @tml_file_read(ptr)"),
    ("tml_file_write", "declare void @tml_file_write(ptr, i64)"),
    ("tml_file_close", "declare void @tml_file_close(ptr)"),
    ("tml_black_box", "declare i64 @tml_black_box(i64)"),
    ("tml_ipow", "declare i64 @tml_ipow(i64, i64)"),
    (
        "llvm.lifetime.start",
        "declare void @llvm.lifetime.start.p0(i64, ptr)",
    ),
    (
        "llvm.lifetime.end",
        "declare void @llvm.lifetime.end.p0(i64, ptr)",
    ),
    ("llvm.pow.f64", "declare double @llvm.pow.f64(double, double)"),
    ("llvm.sqrt.f64", "declare double @llvm.sqrt.f64(double)"),
    ("llvm.fabs.f64", "declare double @llvm.fabs.f64(double)"),
    ("llvm.floor.f64", "declare double @llvm.floor.f64(double)"),
    ("llvm.ceil.f64", "declare double @llvm.ceil.f64(double)"),
    ("llvm.round.f64", "declare double @llvm.round.f64(double)"),
];

/// Runtime symbols backing the built-in callables of the language.
pub fn runtime_symbol(name: &str) -> Option<&'static str> {
    match name {
        "print" => Some("tml_print"),
        "panic" => Some("tml_panic"),
        "black_box" => Some("tml_black_box"),
        "Time::now" => Some("tml_time_now"),
        "Rand::next" => Some("tml_rand_next"),
        "Hash::digest" => Some("tml_hash_digest"),
        "File::open" => Some("tml_file_open"),
        "File::read" => Some("tml_file_read"),
        "File::write" => Some("tml_file_write"),
        "File::close" => Some("tml_file_close"),
        "Str::len" => Some("tml_str_len"),
        "Str::push" => Some("tml_str_push"),
        "List::push" => Some("tml_list_push"),
        "List::pop" => Some("tml_list_pop"),
        "List::len" => Some("tml_list_len"),
        "List::get" => Some("tml_list_get"),
        _ => None,
    }
}

/// Shared, append-only module emission state.
#[derive(Default)]
pub struct ModuleState {
    /// Literal text → global name. BTreeMap for stable emission order.
    strings: BTreeMap<String, String>,
    /// Runtime declarations actually used.
    used_decls: std::collections::BTreeSet<&'static str>,
    /// Extra functions synthesized during emission (closures, thunks)
    /// plus loop metadata lines.
    pub auxiliary: Vec<String>,
    next_aux: u32,
    next_loop_metadata: u32,
}

impl ModuleState {
    pub fn new() -> Self {
        ModuleState::default()
    }

    pub fn use_runtime(&mut self, key: &'static str) -> &'static str {
        self.used_decls.insert(key);
        key
    }

    /// Intern a string literal; returns `(global, byte_len)`.
    pub fn string_literal(&mut self, text: &str) -> (String, usize) {
        let len = text.len();
        let next_index = self.strings.len();
        let global = self
            .strings
            .entry(text.to_string())
            .or_insert_with(|| format!("@.str.{next_index}"))
            .clone();
        (global, len)
    }

    pub fn fresh_aux_name(&mut self, hint: &str) -> String {
        let name = format!("{hint}.{}", self.next_aux);
        self.next_aux += 1;
        name
    }

    pub fn next_loop_metadata(&mut self) -> u32 {
        let id = self.next_loop_metadata;
        self.next_loop_metadata += 1;
        id
    }

    pub fn render_strings(&self) -> String {
        let mut out = String::new();
        let mut entries: Vec<(&String, &String)> = self.strings.iter().collect();
        entries.sort_by_key(|(_, global)| global.clone());
        for (text, global) in entries {
            let mut encoded = String::new();
            for byte in text.bytes() {
                match byte {
                    b'"' | b'\\' => encoded.push_str(&format!("\\{byte:02X}")),
                    0x20..=0x7e => encoded.push(byte as char),
                    _ => encoded.push_str(&format!("\\{byte:02X}")),
                }
            }
            out.push_str(&format!(
                "{global} = private unnamed_addr constant [{} x i8] c\"{encoded}\"\n",
                text.len()
            ));
        }
        out
    }

    pub fn render_declarations(&self) -> String {
        let mut out = String::new();
        for (key, decl) in RUNTIME_DECLS {
            if self.used_decls.contains(key) {
                out.push_str(decl);
                out.push('\n');
            }
        }
        out
    }
}

/// Map every callable name form (qualified symbol, short name,
/// `Type::method`) to the emitted symbol. Built once per program in
/// sorted item order, so collisions resolve deterministically (first
/// wins).
pub fn build_symbol_table(program: &IrProgram) -> BTreeMap<String, String> {
    let mut table = BTreeMap::new();
    for module in &program.modules {
        for item in &module.items {
            let IrItem::Func(func) = item else {
                continue;
            };
            let emitted = if func.name == "main" {
                "main".to_string()
            } else {
                func.symbol.clone()
            };
            table.entry(func.symbol.clone()).or_insert(emitted.clone());
            table.entry(func.name.clone()).or_insert(emitted.clone());
        }
    }
    table
}

/// Sanitize a symbol for use as an LLVM identifier.
pub fn llvm_symbol(symbol: &str) -> String {
    if symbol == "main" {
        "@main".to_string()
    } else {
        format!("@\"{symbol}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_literals_are_interned() {
        let mut state = ModuleState::new();
        let (a, len_a) = state.string_literal("hello");
        let (b, _) = state.string_literal("hello");
        let (c, _) = state.string_literal("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(len_a, 5);
        assert!(state.render_strings().contains("c\"hello\""));
    }

    #[test]
    fn test_only_used_declarations_render() {
        let mut state = ModuleState::new();
        state.use_runtime("tml_print");
        let rendered = state.render_declarations();
        assert!(rendered.contains("@tml_print"));
        assert!(!rendered.contains("@tml_list_new"));
    }

    #[test]
    fn test_non_ascii_strings_escaped() {
        let mut state = ModuleState::new();
        state.string_literal("a\nπ");
        let rendered = state.render_strings();
        assert!(rendered.contains("\\0A"));
        assert!(rendered.contains("[5 x i8]"));
    }
}
