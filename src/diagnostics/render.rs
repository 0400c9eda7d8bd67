//! Textual diagnostic rendering with source excerpts.
//!
//! The layout follows the compiler's usual error shape: a severity header,
//! the file location, a bordered excerpt with the offending range in red
//! and a `^---` marker carrying the message, then any related labels and
//! suggestions.

use colored::Colorize;

use crate::source::{SourceMap, Span};

use super::{Diagnostic, Severity};

fn severity_heading(severity: Severity, code: &str) -> String {
    let heading = format!("{}[{}]", severity.as_str(), code);
    match severity {
        Severity::Error => heading.red().bold().to_string(),
        Severity::Warning => heading.yellow().bold().to_string(),
        Severity::Info => heading.cyan().to_string(),
        Severity::Hint => heading.dimmed().to_string(),
    }
}

/// Render one source excerpt: the line before the span, the spanned lines
/// with the range highlighted, and a marker line with the message.
fn render_excerpt(map: &SourceMap, span: Span, message: &str, out: &mut String) {
    let file = map.file(span.file);
    let start = map.loc(span);
    let end = map.end_loc(span);

    let margin = format!("{}", end.line).len();
    let pad = " ".repeat(margin);

    out.push_str(&format!(
        "{pad}--> {}:{}:{}\n",
        file.name, start.line, start.column
    ));
    out.push_str(&format!("{pad} |\n"));

    if start.line > 1 {
        out.push_str(&format!(
            "{:>margin$} |{}\n",
            start.line - 1,
            file.line_text(start.line - 1),
        ));
    }

    for line in start.line..=end.line.min(file.line_count()) {
        let text = file.line_text(line);
        let highlighted = if start.line == end.line {
            let from = (start.column - 1).min(text.chars().count());
            let to = (end.column - 1).min(text.chars().count());
            let split_at = |n: usize| text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len());
            let (left, rest) = text.split_at(split_at(from));
            let (mid, right) = rest.split_at(split_at(to) - left.len());
            format!("{left}{}{right}", mid.red())
        } else if line == start.line {
            let split = text
                .char_indices()
                .nth(start.column - 1)
                .map(|(i, _)| i)
                .unwrap_or(text.len());
            let (left, right) = text.split_at(split);
            format!("{left}{}", right.red())
        } else {
            text.red().to_string()
        };
        out.push_str(&format!("{line:>margin$} |{highlighted}\n"));
    }

    let caret_col = if start.line == end.line {
        start.column - 1
    } else {
        0
    };
    out.push_str(&format!(
        "{pad} |{}^--- {message}\n{pad} |\n",
        " ".repeat(caret_col)
    ));
}

/// Render a single diagnostic to a string.
pub fn render_diagnostic(map: &SourceMap, diagnostic: &Diagnostic) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}: {}",
        severity_heading(diagnostic.severity, &diagnostic.code),
        diagnostic.message.bold()
    ));
    if let Some(id) = &diagnostic.stable_id {
        out.push_str(&format!(" {}", format!("({id})").dimmed()));
    }
    out.push('\n');

    render_excerpt(map, diagnostic.primary, &diagnostic.message, &mut out);

    for label in &diagnostic.labels {
        out.push_str(&format!("{}: {}\n", "note".cyan().bold(), label.message));
        render_excerpt(map, label.span, &label.message, &mut out);
    }

    for suggestion in &diagnostic.suggestions {
        out.push_str(&format!(
            "{}: {}: `{}`\n",
            "help".green().bold(),
            suggestion.message,
            suggestion.replacement
        ));
    }

    out
}

/// Render every diagnostic in emission order, separated by blank lines.
pub fn render_text(map: &SourceMap, diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| render_diagnostic(map, d))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceMap;

    #[test]
    fn test_render_points_at_span() {
        colored::control::set_override(false);

        let mut map = SourceMap::new();
        let file = map.add_file("main.tml", "let x = 1\nlet y = oops\n");
        let span = Span::new(file, 18, 22);

        let rendered = render_diagnostic(
            &map,
            &Diagnostic::error("E0300", "unknown name `oops`", span),
        );

        assert!(rendered.contains("error[E0300]"));
        assert!(rendered.contains("main.tml:2:9"));
        assert!(rendered.contains("let y = oops"));
        assert!(rendered.contains("^--- unknown name `oops`"));
    }

    #[test]
    fn test_render_includes_note_excerpt() {
        colored::control::set_override(false);

        let mut map = SourceMap::new();
        let file = map.add_file("main.tml", "let a = 1\nlet b = 2\n");
        let rendered = render_diagnostic(
            &map,
            &Diagnostic::error("E0500", "second borrow", Span::new(file, 10, 19))
                .with_label(Span::new(file, 0, 9), "first borrow occurs here"),
        );

        assert!(rendered.contains("note: first borrow occurs here"));
    }
}
