//! Machine-readable diagnostic output, one JSON object per diagnostic.
//!
//! Spans are resolved against the source map so consumers get file names
//! and 1-based line/column pairs instead of raw byte offsets.

use serde::Serialize;

use crate::source::{SourceMap, Span};

use super::Diagnostic;

#[derive(Serialize)]
struct JsonSpan<'a> {
    file: &'a str,
    line: usize,
    column: usize,
    end_line: usize,
    end_column: usize,
}

#[derive(Serialize)]
struct JsonLabel<'a> {
    span: JsonSpan<'a>,
    message: &'a str,
}

#[derive(Serialize)]
struct JsonSuggestion<'a> {
    span: JsonSpan<'a>,
    replacement: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: &'a str,
    code: &'a str,
    message: &'a str,
    span: JsonSpan<'a>,
    labels: Vec<JsonLabel<'a>>,
    suggestions: Vec<JsonSuggestion<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stable_id: Option<&'a str>,
}

fn resolve<'a>(map: &'a SourceMap, span: Span) -> JsonSpan<'a> {
    let start = map.loc(span);
    let end = map.end_loc(span);
    JsonSpan {
        file: map.file_name(span.file),
        line: start.line,
        column: start.column,
        end_line: end.line,
        end_column: end.column,
    }
}

/// Render all diagnostics as a JSON array (pretty-printed, stable field
/// order via the struct definitions above).
pub fn render_json(map: &SourceMap, diagnostics: &[Diagnostic]) -> String {
    let entries: Vec<JsonDiagnostic> = diagnostics
        .iter()
        .map(|d| JsonDiagnostic {
            severity: d.severity.as_str(),
            code: &d.code,
            message: &d.message,
            span: resolve(map, d.primary),
            labels: d
                .labels
                .iter()
                .map(|l| JsonLabel {
                    span: resolve(map, l.span),
                    message: &l.message,
                })
                .collect(),
            suggestions: d
                .suggestions
                .iter()
                .map(|s| JsonSuggestion {
                    span: resolve(map, s.span),
                    replacement: &s.replacement,
                    message: &s.message,
                })
                .collect(),
            stable_id: d.stable_id.as_deref(),
        })
        .collect();

    serde_json::to_string_pretty(&entries).expect("diagnostics are always serializable")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;
    use crate::source::SourceMap;

    #[test]
    fn test_json_resolves_locations() {
        let mut map = SourceMap::new();
        let file = map.add_file("lib.tml", "func f() {}\n");
        let json = render_json(
            &map,
            &[Diagnostic::error("E0100", "boom", Span::new(file, 5, 6))],
        );

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["severity"], "error");
        assert_eq!(parsed[0]["span"]["file"], "lib.tml");
        assert_eq!(parsed[0]["span"]["line"], 1);
        assert_eq!(parsed[0]["span"]["column"], 6);
    }
}
