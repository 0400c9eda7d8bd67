//! S-expression values and the byte-deterministic printer.
//!
//! The canonical IR serializes as a line-oriented stream: one header
//! line, then one line per item. Rendering is purely structural, so two
//! equal trees always print to identical bytes.

use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    /// Bare token: keywords, numbers, type names, identifiers.
    Atom(String),
    /// Quoted string with escaped contents.
    Str(String),
    List(Vec<Sexpr>),
}

impl Sexpr {
    pub fn atom(text: impl Into<String>) -> Sexpr {
        Sexpr::Atom(text.into())
    }

    pub fn string(text: impl Into<String>) -> Sexpr {
        Sexpr::Str(text.into())
    }

    pub fn list(items: impl IntoIterator<Item = Sexpr>) -> Sexpr {
        Sexpr::List(items.into_iter().collect())
    }

    /// `(tag …)` — the pervasive tagged-list shape.
    pub fn tagged(tag: &str, items: impl IntoIterator<Item = Sexpr>) -> Sexpr {
        let mut list = vec![Sexpr::atom(tag)];
        list.extend(items);
        Sexpr::List(list)
    }
}

fn escape(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

impl Display for Sexpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sexpr::Atom(text) => f.write_str(text),
            Sexpr::Str(text) => {
                let mut escaped = String::with_capacity(text.len() + 2);
                escaped.push('"');
                escape(text, &mut escaped);
                escaped.push('"');
                f.write_str(&escaped)
            }
            Sexpr::List(items) => {
                f.write_str("(")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nested_list() {
        let sexpr = Sexpr::tagged(
            "item",
            [
                Sexpr::atom("func"),
                Sexpr::atom("@a1b2c3d4"),
                Sexpr::tagged("vis", [Sexpr::atom("pub")]),
            ],
        );
        assert_eq!(sexpr.to_string(), "(item func @a1b2c3d4 (vis pub))");
    }

    #[test]
    fn test_strings_are_escaped() {
        let sexpr = Sexpr::string("a\"b\nc");
        assert_eq!(sexpr.to_string(), "\"a\\\"b\\nc\"");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let build = || {
            Sexpr::tagged(
                "body",
                [
                    Sexpr::tagged("add", [Sexpr::atom("1"), Sexpr::atom("2")]),
                    Sexpr::string("tail"),
                ],
            )
            .to_string()
        };
        assert_eq!(build(), build());
    }
}
