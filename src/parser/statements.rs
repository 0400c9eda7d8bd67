//! Statement and block parsing.
//!
//! Assignment is a statement: after an expression, `=` or a compound
//! operator turns it into an assignment, and a second `=` on the
//! right-hand side is rejected (no chaining). A trailing expression
//! without `;` becomes the block's yielded value. Block-like expressions
//! (`if` block form, `when`, bare blocks) need no `;` in statement
//! position.

use crate::lexer::TokenKind;

use super::ast::*;
use super::{ParseResult, Parser};

fn assign_op_from(kind: TokenKind) -> Option<Option<AssignOp>> {
    match kind {
        TokenKind::Assign => Some(None),
        TokenKind::PlusAssign => Some(Some(AssignOp::Add)),
        TokenKind::MinusAssign => Some(Some(AssignOp::Sub)),
        TokenKind::StarAssign => Some(Some(AssignOp::Mul)),
        TokenKind::SlashAssign => Some(Some(AssignOp::Div)),
        TokenKind::PercentAssign => Some(Some(AssignOp::Rem)),
        TokenKind::StarStarAssign => Some(Some(AssignOp::Pow)),
        TokenKind::ShlAssign => Some(Some(AssignOp::Shl)),
        TokenKind::ShrAssign => Some(Some(AssignOp::Shr)),
        TokenKind::AmpAssign => Some(Some(AssignOp::BitAnd)),
        TokenKind::PipeAssign => Some(Some(AssignOp::BitOr)),
        TokenKind::CaretAssign => Some(Some(AssignOp::BitXor)),
        _ => None,
    }
}

fn is_block_like(expression: &Expression<()>) -> bool {
    match expression {
        Expression::When(_) | Expression::Block(_) => true,
        Expression::If(if_expr) => !if_expr.expression_form,
        _ => false,
    }
}

impl<'a> Parser<'a> {
    pub(crate) fn parse_block(&mut self) -> ParseResult<Block<()>> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut statements = vec![];
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let statement_start = self.span_here();
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(_) => {
                    self.synchronize_statement();
                    statements.push(Statement::Error(statement_start));
                }
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        let id = self.fresh_id();
        Ok(Block {
            statements,
            info: (),
            position: start.merge(&end),
            id,
        })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement<()>> {
        match self.peek_kind() {
            TokenKind::Let => self.parse_let(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let span = self.bump().span;
                self.expect(TokenKind::Semicolon)?;
                let id = self.fresh_id();
                Ok(Statement::Break(Break { position: span, id }))
            }
            TokenKind::Continue => {
                let span = self.bump().span;
                self.expect(TokenKind::Semicolon)?;
                let id = self.fresh_id();
                Ok(Statement::Continue(Continue { position: span, id }))
            }
            TokenKind::While => self.parse_while(),
            TokenKind::Loop => self.parse_loop(),
            TokenKind::For => self.parse_for(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let(&mut self) -> ParseResult<Statement<()>> {
        let start = self.expect(TokenKind::Let)?.span;
        let mutable = self.eat(TokenKind::Mut);
        let name = self.expect_ident()?;
        let type_annotation = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_name()?)
        } else {
            None
        };
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression(false)?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        let id = self.fresh_id();
        Ok(Statement::Let(Let {
            mutable,
            name,
            type_annotation,
            value,
            info: (),
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_return(&mut self) -> ParseResult<Statement<()>> {
        let start = self.expect(TokenKind::Return)?.span;
        let value = if self.at(TokenKind::Semicolon) || self.at(TokenKind::RBrace) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        let end = if self.at(TokenKind::Semicolon) {
            self.bump().span
        } else {
            start
        };
        let id = self.fresh_id();
        Ok(Statement::Return(Return {
            value,
            info: (),
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_while(&mut self) -> ParseResult<Statement<()>> {
        let start = self.expect(TokenKind::While)?.span;
        let condition = self.parse_expression(true)?;
        let body = self.parse_block()?;
        let position = start.merge(&body.position);
        let id = self.fresh_id();
        Ok(Statement::WhileLoop(WhileLoop {
            condition,
            body,
            info: (),
            position,
            id,
        }))
    }

    fn parse_loop(&mut self) -> ParseResult<Statement<()>> {
        let start = self.expect(TokenKind::Loop)?.span;
        let body = self.parse_block()?;
        let position = start.merge(&body.position);
        let id = self.fresh_id();
        Ok(Statement::Loop(Loop {
            body,
            info: (),
            position,
            id,
        }))
    }

    fn parse_for(&mut self) -> ParseResult<Statement<()>> {
        let start = self.expect(TokenKind::For)?.span;
        let binder = self.expect_ident()?;
        self.expect(TokenKind::In)?;
        let iterable = self.parse_expression(true)?;
        let body = self.parse_block()?;
        let position = start.merge(&body.position);
        let id = self.fresh_id();
        Ok(Statement::ForLoop(ForLoop {
            binder,
            iterable,
            body,
            info: (),
            position,
            id,
        }))
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Statement<()>> {
        let expression = self.parse_expression(false)?;

        if let Some(op) = assign_op_from(self.peek_kind()) {
            self.bump();
            if !is_place_expression(&expression) {
                self.session.emit(crate::diagnostics::Diagnostic::error(
                    "E0102",
                    "left-hand side of an assignment must be a variable, field, index or deref",
                    expression.position(),
                ));
            }
            let value = self.parse_expression(false)?;
            if assign_op_from(self.peek_kind()).is_some() {
                return Err(self.error_here("assignments cannot be chained"));
            }
            let end = self.expect(TokenKind::Semicolon)?.span;
            let position = expression.position().merge(&end);
            let id = self.fresh_id();
            return Ok(Statement::Assignment(Assignment {
                target: expression,
                op,
                value,
                info: (),
                position,
                id,
            }));
        }

        if self.eat(TokenKind::Semicolon) {
            Ok(Statement::Expression(expression))
        } else if self.at(TokenKind::RBrace) {
            Ok(Statement::YieldingExpression(expression))
        } else if is_block_like(&expression) {
            Ok(Statement::Expression(expression))
        } else {
            Err(self.error_here(format!(
                "expected `;` after expression, found {}",
                self.peek_kind().describe()
            )))
        }
    }
}

fn is_place_expression(expression: &Expression<()>) -> bool {
    match expression {
        Expression::Path(_) => true,
        Expression::FieldAccess(access) => is_place_expression(&access.receiver),
        Expression::Index(index) => is_place_expression(&index.receiver),
        Expression::Deref(deref) => is_place_expression(&deref.target),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::parse_source;
    use super::super::ast::*;

    fn statements(src: &str) -> Vec<Statement<()>> {
        let (session, module) = parse_source(src);
        assert!(!session.has_errors(), "unexpected parse errors");
        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function");
        };
        func.body.statements.clone()
    }

    #[test]
    fn test_let_with_annotation() {
        let body = statements("func f() { let mut x: I64 = 42; }");
        let Statement::Let(let_stmt) = &body[0] else {
            panic!("expected a let");
        };
        assert!(let_stmt.mutable);
        assert_eq!(let_stmt.name.name, "x");
        assert!(let_stmt.type_annotation.is_some());
    }

    #[test]
    fn test_compound_assignment() {
        let body = statements("func f(v: mut ref I32) { *v += 2; }");
        let Statement::Assignment(assignment) = &body[0] else {
            panic!("expected an assignment");
        };
        assert_eq!(assignment.op, Some(AssignOp::Add));
        assert!(matches!(assignment.target, Expression::Deref(_)));
    }

    #[test]
    fn test_chained_assignment_rejected() {
        let (session, _) = parse_source("func f() { let mut a = 1; a = a = 2; }");
        assert!(session.has_errors());
    }

    #[test]
    fn test_assignment_to_rvalue_rejected() {
        let (session, _) = parse_source("func f() { 1 + 2 = 3; }");
        assert!(session.has_errors());
    }

    #[test]
    fn test_yielding_tail_expression() {
        let body = statements("func f() -> I32 { let x = 1; x + 1 }");
        assert!(matches!(body[0], Statement::Let(_)));
        assert!(matches!(body[1], Statement::YieldingExpression(_)));
    }

    #[test]
    fn test_while_and_for_loops() {
        let body = statements(
            "func f(n: I32) { while n > 0 { break; } for i in 0 to n { continue; } loop { break; } }",
        );
        assert!(matches!(body[0], Statement::WhileLoop(_)));
        assert!(matches!(body[1], Statement::ForLoop(_)));
        assert!(matches!(body[2], Statement::Loop(_)));
    }

    #[test]
    fn test_statement_recovery_inside_block() {
        let (session, module) = parse_source("func f() { let = ; let x = 1; }");
        assert!(session.has_errors());
        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function");
        };
        // The malformed let becomes an error node; the next one parses.
        assert!(func
            .body
            .statements
            .iter()
            .any(|s| matches!(s, Statement::Error(_))));
        assert!(func
            .body
            .statements
            .iter()
            .any(|s| matches!(s, Statement::Let(l) if l.name.name == "x")));
    }

    #[test]
    fn test_return_without_value() {
        let body = statements("func f() { return; }");
        let Statement::Return(ret) = &body[0] else {
            panic!("expected a return");
        };
        assert!(ret.value.is_none());
    }
}
