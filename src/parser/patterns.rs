//! Pattern parsing for `when` arms.
//!
//! Or-patterns are validated here for their one structural rule: every
//! alternative must bind the same set of names. Type agreement of those
//! binders is checked later by the type checker.

use crate::diagnostics::Diagnostic;
use crate::lexer::{TokenKind, TokenValue};

use super::ast::*;
use super::{starts_uppercase, ParseResult, Parser};

impl<'a> Parser<'a> {
    pub(crate) fn parse_pattern(&mut self) -> ParseResult<Pattern<()>> {
        let first = self.parse_single_pattern()?;
        if !self.at(TokenKind::Pipe) {
            return Ok(first);
        }

        let start = first.position();
        let mut alternatives = vec![first];
        while self.eat(TokenKind::Pipe) {
            alternatives.push(self.parse_single_pattern()?);
        }
        let position = start.merge(&alternatives.last().expect("non-empty").position());

        let mut expected: Vec<&str> = alternatives[0].bound_names();
        expected.sort_unstable();
        for alternative in &alternatives[1..] {
            let mut names = alternative.bound_names();
            names.sort_unstable();
            if names != expected {
                self.session.emit(Diagnostic::error(
                    "E0103",
                    "all alternatives of an or-pattern must bind the same names",
                    alternative.position(),
                ));
            }
        }

        let id = self.fresh_id();
        Ok(Pattern::Or(OrPattern {
            alternatives,
            info: (),
            position,
            id,
        }))
    }

    fn parse_single_pattern(&mut self) -> ParseResult<Pattern<()>> {
        match self.peek_kind() {
            TokenKind::IntLit
            | TokenKind::FloatLit
            | TokenKind::CharLit
            | TokenKind::StrLit
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Minus => self.parse_literal_or_range_pattern(),
            TokenKind::LParen => self.parse_tuple_pattern(),
            TokenKind::LBracket => self.parse_array_pattern(),
            TokenKind::Ident => {
                if self.peek().ident() == "_" {
                    let token = self.bump();
                    let id = self.fresh_id();
                    return Ok(Pattern::Wildcard(WildcardPattern {
                        info: (),
                        position: token.span,
                        id,
                    }));
                }
                self.parse_path_pattern()
            }
            other => Err(self.error_here(format!(
                "expected a pattern, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_pattern_literal(&mut self) -> ParseResult<(PatternConst, crate::source::Span)> {
        let negate = self.eat(TokenKind::Minus);
        let token = self.bump();
        let value = match (token.kind, token.value) {
            (TokenKind::IntLit, TokenValue::Int { value, .. }) => {
                let magnitude = value as i128;
                PatternConst::Int(if negate { -magnitude } else { magnitude })
            }
            (TokenKind::FloatLit, TokenValue::Float { value, .. }) => {
                PatternConst::Float(if negate { -value } else { value })
            }
            (TokenKind::True, _) => PatternConst::Bool(true),
            (TokenKind::False, _) => PatternConst::Bool(false),
            (TokenKind::CharLit, TokenValue::Char(c)) => PatternConst::Char(c),
            (TokenKind::StrLit, TokenValue::Str(s)) => PatternConst::Str(s),
            (kind, _) => {
                return Err(self.error_here(format!(
                    "expected a literal pattern, found {}",
                    kind.describe()
                )))
            }
        };
        if negate && !matches!(value, PatternConst::Int(_) | PatternConst::Float(_)) {
            return Err(self.error_here("`-` in a pattern must precede a numeric literal"));
        }
        Ok((value, token.span))
    }

    fn parse_literal_or_range_pattern(&mut self) -> ParseResult<Pattern<()>> {
        let start = self.span_here();
        let (low, low_span) = self.parse_pattern_literal()?;

        let inclusive = match self.peek_kind() {
            TokenKind::To => false,
            TokenKind::Through => true,
            _ => {
                let id = self.fresh_id();
                return Ok(Pattern::Literal(LiteralPattern {
                    value: low,
                    info: (),
                    position: start.merge(&low_span),
                    id,
                }));
            }
        };
        self.bump();
        let (high, high_span) = self.parse_pattern_literal()?;
        let id = self.fresh_id();
        Ok(Pattern::Range(RangePattern {
            low,
            high,
            inclusive,
            info: (),
            position: start.merge(&high_span),
            id,
        }))
    }

    fn parse_path_pattern(&mut self) -> ParseResult<Pattern<()>> {
        let first = self.expect_ident()?;
        let start = first.position;
        let mut end = first.position;
        let mut segments = vec![first.name];
        while self.eat(TokenKind::PathSep) {
            let segment = self.expect_ident()?;
            end = segment.position;
            segments.push(segment.name);
        }

        let last = segments.last().expect("non-empty").clone();
        if !starts_uppercase(&last) {
            if segments.len() > 1 {
                return Err(self.error_here("binding patterns cannot have a path prefix"));
            }
            let name = Ident::new(last, start, self.fresh_id());
            let id = self.fresh_id();
            return Ok(Pattern::Binding(BindingPattern { name, id }));
        }

        let path_id = self.fresh_id();
        let path = Path {
            segments,
            type_args: vec![],
            info: (),
            position: start.merge(&end),
            id: path_id,
        };

        if self.at(TokenKind::LBrace) {
            return self.parse_struct_pattern(path);
        }

        let mut payload = vec![];
        let mut has_parens = false;
        let mut position = path.position;
        if self.eat(TokenKind::LParen) {
            has_parens = true;
            if !self.at(TokenKind::RParen) {
                loop {
                    payload.push(self.parse_pattern()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            let close = self.expect(TokenKind::RParen)?.span;
            position = position.merge(&close);
        }

        let id = self.fresh_id();
        Ok(Pattern::EnumVariant(EnumVariantPattern {
            path,
            payload,
            has_parens,
            info: (),
            position,
            id,
        }))
    }

    fn parse_struct_pattern(&mut self, name: Path<()>) -> ParseResult<Pattern<()>> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = vec![];
        let mut has_rest = false;
        while !self.at(TokenKind::RBrace) {
            if self.eat(TokenKind::DotDot) {
                has_rest = true;
                break;
            }
            let field_name = self.expect_ident()?;
            let pattern = if self.eat(TokenKind::Colon) {
                self.parse_pattern()?
            } else {
                // `Point { x }` binds the field to a local of the same name.
                let binder = Ident::new(
                    field_name.name.clone(),
                    field_name.position,
                    self.fresh_id(),
                );
                let id = self.fresh_id();
                Pattern::Binding(BindingPattern { name: binder, id })
            };
            let position = field_name.position.merge(&pattern.position());
            fields.push(StructPatternField {
                name: field_name,
                pattern,
                position,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        let position = name.position.merge(&end);
        let id = self.fresh_id();
        Ok(Pattern::Struct(StructPattern {
            name,
            fields,
            has_rest,
            info: (),
            position,
            id,
        }))
    }

    fn parse_tuple_pattern(&mut self) -> ParseResult<Pattern<()>> {
        let start = self.expect(TokenKind::LParen)?.span;
        let mut elements = vec![];
        if !self.at(TokenKind::RParen) {
            loop {
                elements.push(self.parse_pattern()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RParen)?.span;
        let id = self.fresh_id();
        Ok(Pattern::Tuple(TuplePattern {
            elements,
            info: (),
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_array_pattern(&mut self) -> ParseResult<Pattern<()>> {
        let start = self.expect(TokenKind::LBracket)?.span;
        let mut elements = vec![];
        let mut rest = None;
        while !self.at(TokenKind::RBracket) {
            if self.eat(TokenKind::DotDot) {
                let binder = self.expect_ident()?;
                rest = Some(binder);
                break;
            }
            elements.push(self.parse_pattern()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBracket)?.span;
        let id = self.fresh_id();
        Ok(Pattern::Array(ArrayPattern {
            elements,
            rest,
            info: (),
            position: start.merge(&end),
            id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::parse_source;
    use super::super::ast::*;

    fn arm_patterns(src: &str) -> Vec<Pattern<()>> {
        let (session, module) = parse_source(src);
        assert!(!session.has_errors(), "unexpected parse errors");
        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function");
        };
        let Some(Statement::YieldingExpression(Expression::When(when))) =
            func.body.statements.last()
        else {
            panic!("expected a trailing when expression");
        };
        when.arms.iter().map(|arm| arm.pattern.clone()).collect()
    }

    #[test]
    fn test_enum_and_wildcard_patterns() {
        let patterns = arm_patterns(
            "func f(m: Maybe[I32]) -> I32 { when m { Just(x) -> x, _ -> 0 } }",
        );
        let Pattern::EnumVariant(variant) = &patterns[0] else {
            panic!("expected an enum pattern");
        };
        assert_eq!(variant.path.last(), "Just");
        assert_eq!(variant.payload.len(), 1);
        assert!(matches!(patterns[1], Pattern::Wildcard(_)));
    }

    #[test]
    fn test_range_patterns() {
        let patterns = arm_patterns(
            "func f(n: I32) -> I32 { when n { 0 to 9 -> 1, 10 through 19 -> 2, _ -> 0 } }",
        );
        assert!(matches!(&patterns[0], Pattern::Range(r) if !r.inclusive));
        assert!(matches!(&patterns[1], Pattern::Range(r) if r.inclusive));
    }

    #[test]
    fn test_or_pattern_same_bindings() {
        let patterns = arm_patterns(
            "func f(n: I32) -> I32 { when n { 1 | 2 | 3 -> 1, _ -> 0 } }",
        );
        let Pattern::Or(or) = &patterns[0] else {
            panic!("expected an or-pattern");
        };
        assert_eq!(or.alternatives.len(), 3);
    }

    #[test]
    fn test_or_pattern_binding_mismatch_rejected() {
        let (session, _) = parse_source(
            "func f(m: Maybe[I32]) -> I32 { when m { Just(x) | Nothing -> 0, _ -> 1 } }",
        );
        assert!(session.has_errors());
    }

    #[test]
    fn test_struct_and_array_patterns() {
        let patterns = arm_patterns(
            "func f(p: Point) -> I32 { when p { Point { x, y: py } -> x + py, _ -> 0 } }",
        );
        let Pattern::Struct(pattern) = &patterns[0] else {
            panic!("expected a struct pattern");
        };
        assert_eq!(pattern.fields.len(), 2);

        let patterns = arm_patterns(
            "func g(xs: [I32]) -> I32 { when xs { [first, ..rest] -> first, _ -> 0 } }",
        );
        let Pattern::Array(pattern) = &patterns[0] else {
            panic!("expected an array pattern");
        };
        assert_eq!(pattern.elements.len(), 1);
        assert_eq!(pattern.rest.as_ref().unwrap().name, "rest");
    }

    #[test]
    fn test_tuple_pattern_bindings() {
        let patterns = arm_patterns(
            "func f(p: (I32, I32)) -> I32 { when p { (a, b) -> a + b } }",
        );
        assert_eq!(patterns[0].bound_names(), vec!["a", "b"]);
    }
}
