//! Type-name parsing. In type position `[` is never ambiguous: after a
//! path it always opens a type-argument list.

use crate::lexer::{TokenKind, TokenValue};

use super::ast::TypeName;
use super::{ParseResult, Parser};

impl<'a> Parser<'a> {
    pub(crate) fn parse_type_name(&mut self) -> ParseResult<TypeName> {
        match self.peek_kind() {
            TokenKind::LParen => {
                let start = self.bump().span;
                if self.at(TokenKind::RParen) {
                    let end = self.bump().span;
                    return Ok(TypeName::Unit(start.merge(&end)));
                }
                let mut elements = vec![self.parse_type_name()?];
                while self.eat(TokenKind::Comma) {
                    elements.push(self.parse_type_name()?);
                }
                let end = self.expect(TokenKind::RParen)?.span;
                if elements.len() == 1 {
                    // `(T)` is grouping, not a one-element tuple.
                    Ok(elements.pop().expect("checked length"))
                } else {
                    Ok(TypeName::Tuple(elements, start.merge(&end)))
                }
            }
            TokenKind::LBracket => {
                let start = self.bump().span;
                let element = Box::new(self.parse_type_name()?);
                if self.eat(TokenKind::Semicolon) {
                    let length_token = self.expect(TokenKind::IntLit)?;
                    let length = match length_token.value {
                        TokenValue::Int { value, .. } => value as u64,
                        _ => 0,
                    };
                    let end = self.expect(TokenKind::RBracket)?.span;
                    Ok(TypeName::Array {
                        element,
                        length,
                        position: start.merge(&end),
                    })
                } else {
                    let end = self.expect(TokenKind::RBracket)?.span;
                    Ok(TypeName::Slice {
                        element,
                        position: start.merge(&end),
                    })
                }
            }
            TokenKind::Ref => {
                let start = self.bump().span;
                let inner = Box::new(self.parse_type_name()?);
                let position = start.merge(&inner.position());
                Ok(TypeName::Reference {
                    inner,
                    mutable: false,
                    position,
                })
            }
            TokenKind::Mut => {
                let start = self.bump().span;
                self.expect(TokenKind::Ref)?;
                let inner = Box::new(self.parse_type_name()?);
                let position = start.merge(&inner.position());
                Ok(TypeName::Reference {
                    inner,
                    mutable: true,
                    position,
                })
            }
            TokenKind::Dyn => {
                let start = self.bump().span;
                let first = self.expect_ident()?;
                let mut end = first.position;
                let mut behavior = vec![first.name];
                while self.eat(TokenKind::PathSep) {
                    let segment = self.expect_ident()?;
                    end = segment.position;
                    behavior.push(segment.name);
                }
                Ok(TypeName::Dyn {
                    behavior,
                    position: start.merge(&end),
                })
            }
            TokenKind::Func => {
                let start = self.bump().span;
                self.expect(TokenKind::LParen)?;
                let mut params = vec![];
                if !self.at(TokenKind::RParen) {
                    loop {
                        params.push(self.parse_type_name()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::Arrow)?;
                let return_type = Box::new(self.parse_type_name()?);
                let position = start.merge(&return_type.position());
                Ok(TypeName::Func {
                    params,
                    return_type,
                    position,
                })
            }
            TokenKind::Ident => {
                let first = self.expect_ident()?;
                let start = first.position;
                let mut end = first.position;
                let mut path = vec![first.name];
                while self.eat(TokenKind::PathSep) {
                    let segment = self.expect_ident()?;
                    end = segment.position;
                    path.push(segment.name);
                }
                let mut args = vec![];
                if self.eat(TokenKind::LBracket) {
                    loop {
                        args.push(self.parse_type_name()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    end = self.expect(TokenKind::RBracket)?.span;
                }
                Ok(TypeName::Named {
                    path,
                    args,
                    position: start.merge(&end),
                })
            }
            other => Err(self.error_here(format!("expected a type, found {}", other.describe()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::parse_source;
    use super::super::ast::*;

    fn first_param_type(src: &str) -> TypeName {
        let (session, module) = parse_source(src);
        assert!(!session.has_errors(), "unexpected parse errors");
        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function");
        };
        func.parameters[0].type_annotation.clone()
    }

    #[test]
    fn test_parse_generic_type() {
        let t = first_param_type("func f(m: Maybe[List[I32]]) { }");
        assert_eq!(t.to_string(), "Maybe[List[I32]]");
    }

    #[test]
    fn test_parse_reference_types() {
        assert_eq!(
            first_param_type("func f(s: ref Str) { }").to_string(),
            "ref Str"
        );
        assert_eq!(
            first_param_type("func f(s: mut ref Str) { }").to_string(),
            "mut ref Str"
        );
    }

    #[test]
    fn test_parse_array_slice_tuple() {
        assert_eq!(
            first_param_type("func f(a: [I32; 4]) { }").to_string(),
            "[I32; 4]"
        );
        assert_eq!(first_param_type("func f(a: [I32]) { }").to_string(), "[I32]");
        assert_eq!(
            first_param_type("func f(a: (I32, Str)) { }").to_string(),
            "(I32, Str)"
        );
    }

    #[test]
    fn test_parse_function_and_dyn_types() {
        assert_eq!(
            first_param_type("func f(cb: func(I32) -> Bool) { }").to_string(),
            "func(I32) -> Bool"
        );
        assert_eq!(
            first_param_type("func f(r: dyn Reader) { }").to_string(),
            "dyn Reader"
        );
    }
}
