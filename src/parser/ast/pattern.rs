//! Pattern nodes for `when` arms.

use serde::{Deserialize, Serialize};

use crate::source::Span;

use super::{Ident, NodeId, Path};

/// A decoded constant a pattern matches against. Signs are already
/// folded in, so `-3 to 3` carries `Int(-3)` and `Int(3)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternConst {
    Int(i128),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
}

impl std::fmt::Display for PatternConst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternConst::Int(v) => write!(f, "{v}"),
            PatternConst::Float(v) => write!(f, "{v}"),
            PatternConst::Bool(v) => write!(f, "{v}"),
            PatternConst::Char(v) => write!(f, "'{v}'"),
            PatternConst::Str(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern<T> {
    /// `_`
    Wildcard(WildcardPattern<T>),
    /// `42`, `'a'`, `"s"`, `true`
    Literal(LiteralPattern<T>),
    /// `name` — binds the matched value
    Binding(BindingPattern<T>),
    /// `0 to 9` / `0 through 9`
    Range(RangePattern<T>),
    /// `Just(x)` or a bare constructor `Nothing`
    EnumVariant(EnumVariantPattern<T>),
    /// `(a, b)`
    Tuple(TuplePattern<T>),
    /// `Point { x, y: py }`
    Struct(StructPattern<T>),
    /// `[first, second, ..rest]`
    Array(ArrayPattern<T>),
    /// `p1 | p2 | p3` — every alternative must bind the same names
    Or(OrPattern<T>),
}

impl<T> Pattern<T> {
    pub fn position(&self) -> Span {
        match self {
            Pattern::Wildcard(p) => p.position,
            Pattern::Literal(p) => p.position,
            Pattern::Binding(p) => p.name.position,
            Pattern::Range(p) => p.position,
            Pattern::EnumVariant(p) => p.position,
            Pattern::Tuple(p) => p.position,
            Pattern::Struct(p) => p.position,
            Pattern::Array(p) => p.position,
            Pattern::Or(p) => p.position,
        }
    }

    /// Names this pattern introduces, in source order.
    pub fn bound_names(&self) -> Vec<&str> {
        let mut names = vec![];
        self.collect_bound_names(&mut names);
        names
    }

    fn collect_bound_names<'a>(&'a self, into: &mut Vec<&'a str>) {
        match self {
            Pattern::Wildcard(_) | Pattern::Literal(_) | Pattern::Range(_) => {}
            Pattern::Binding(p) => into.push(&p.name.name),
            Pattern::EnumVariant(p) => {
                for sub in &p.payload {
                    sub.collect_bound_names(into);
                }
            }
            Pattern::Tuple(p) => {
                for sub in &p.elements {
                    sub.collect_bound_names(into);
                }
            }
            Pattern::Struct(p) => {
                for field in &p.fields {
                    field.pattern.collect_bound_names(into);
                }
            }
            Pattern::Array(p) => {
                for sub in &p.elements {
                    sub.collect_bound_names(into);
                }
                if let Some(rest) = &p.rest {
                    into.push(&rest.name);
                }
            }
            // All alternatives bind the same names, so the first suffices.
            Pattern::Or(p) => {
                if let Some(first) = p.alternatives.first() {
                    first.collect_bound_names(into);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildcardPattern<T> {
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralPattern<T> {
    pub value: PatternConst,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingPattern<T> {
    pub name: Ident<T>,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangePattern<T> {
    pub low: PatternConst,
    pub high: PatternConst,
    pub inclusive: bool,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariantPattern<T> {
    pub path: Path<T>,
    pub payload: Vec<Pattern<T>>,
    /// Whether the constructor was written with parentheses; `Just()` and
    /// bare `Nothing` are distinguished for exhaustiveness messages.
    pub has_parens: bool,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuplePattern<T> {
    pub elements: Vec<Pattern<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructPatternField<T> {
    pub name: Ident<T>,
    pub pattern: Pattern<T>,
    pub position: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructPattern<T> {
    pub name: Path<T>,
    pub fields: Vec<StructPatternField<T>>,
    /// `..` was written after the fields — remaining fields are ignored.
    pub has_rest: bool,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayPattern<T> {
    pub elements: Vec<Pattern<T>>,
    /// Binder of the `..rest` tail, when present.
    pub rest: Option<Ident<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrPattern<T> {
    pub alternatives: Vec<Pattern<T>>,
    pub info: T,
    pub position: Span,
    pub id: NodeId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_names_of_nested_pattern() {
        // Just((a, b))
        let pattern: Pattern<()> = Pattern::EnumVariant(EnumVariantPattern {
            path: Path {
                segments: vec!["Just".into()],
                type_args: vec![],
                info: (),
                position: Span::default(),
                id: NodeId(0),
            },
            payload: vec![Pattern::Tuple(TuplePattern {
                elements: vec![
                    Pattern::Binding(BindingPattern {
                        name: Ident::new("a", Span::default(), NodeId(1)),
                        id: NodeId(2),
                    }),
                    Pattern::Binding(BindingPattern {
                        name: Ident::new("b", Span::default(), NodeId(3)),
                        id: NodeId(4),
                    }),
                ],
                info: (),
                position: Span::default(),
                id: NodeId(5),
            })],
            has_parens: true,
            info: (),
            position: Span::default(),
            id: NodeId(6),
        });

        assert_eq!(pattern.bound_names(), vec!["a", "b"]);
    }
}
