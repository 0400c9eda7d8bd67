//! Expression parsing.
//!
//! Binary operators use precedence climbing over the table in
//! [`BinaryOp::precedence`]; `**` is the single right-associative
//! operator. Ranges (`a to b`, `a through b`) sit below `or`.
//!
//! `no_struct` threads the one context restriction in the grammar: the
//! condition of a block-form `if`/`while` and the scrutinee of a `when`
//! must parenthesize struct literals, so `if limit { … }` never has to
//! guess whether `limit { … }` is an initializer.

use crate::lexer::{TokenKind, TokenValue};

use super::ast::*;
use super::{starts_uppercase, ParseResult, Parser};

fn binary_op_from(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Or => Some(BinaryOp::Or),
        TokenKind::And => Some(BinaryOp::And),
        TokenKind::EqEq => Some(BinaryOp::Eq),
        TokenKind::NotEq => Some(BinaryOp::NotEq),
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::LtEq => Some(BinaryOp::LtEq),
        TokenKind::GtEq => Some(BinaryOp::GtEq),
        TokenKind::Pipe => Some(BinaryOp::BitOr),
        TokenKind::Caret => Some(BinaryOp::BitXor),
        TokenKind::Amp => Some(BinaryOp::BitAnd),
        TokenKind::Shl => Some(BinaryOp::Shl),
        TokenKind::Shr => Some(BinaryOp::Shr),
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Sub),
        TokenKind::Star => Some(BinaryOp::Mul),
        TokenKind::Slash => Some(BinaryOp::Div),
        TokenKind::Percent => Some(BinaryOp::Rem),
        TokenKind::StarStar => Some(BinaryOp::Pow),
        _ => None,
    }
}

/// First token of a type? Used to tell `x.items[index]` from
/// `x.parse[I32]()` without backtracking: type-argument lists start with
/// an uppercase path segment or a type-forming keyword.
fn starts_type_argument(parser: &Parser) -> bool {
    match parser.peek_kind() {
        TokenKind::Ref | TokenKind::Mut | TokenKind::Dyn | TokenKind::Func => true,
        TokenKind::Ident => starts_uppercase(parser.peek().ident()),
        _ => false,
    }
}

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self, no_struct: bool) -> ParseResult<Expression<()>> {
        let low = self.parse_binary(1, no_struct)?;
        let inclusive = match self.peek_kind() {
            TokenKind::To => false,
            TokenKind::Through => true,
            _ => return Ok(low),
        };
        self.bump();
        let high = self.parse_binary(1, no_struct)?;
        let position = low.position().merge(&high.position());
        let id = self.fresh_id();
        Ok(Expression::Range(Box::new(RangeExpr {
            low,
            high,
            inclusive,
            info: (),
            position,
            id,
        })))
    }

    fn parse_binary(&mut self, min_prec: u8, no_struct: bool) -> ParseResult<Expression<()>> {
        let mut left = self.parse_unary(no_struct)?;
        while let Some(op) = binary_op_from(self.peek_kind()) {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            let next_min = if op.is_right_associative() {
                prec
            } else {
                prec + 1
            };
            let right = self.parse_binary(next_min, no_struct)?;
            let position = left.position().merge(&right.position());
            let id = self.fresh_id();
            left = Expression::Binary(Box::new(Binary {
                op,
                left,
                right,
                info: (),
                position,
                id,
            }));
        }
        Ok(left)
    }

    fn parse_unary(&mut self, no_struct: bool) -> ParseResult<Expression<()>> {
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.bump().span;
            let operand = self.parse_unary(no_struct)?;
            let position = start.merge(&operand.position());
            let id = self.fresh_id();
            return Ok(Expression::Unary(Box::new(Unary {
                op,
                operand,
                info: (),
                position,
                id,
            })));
        }

        match self.peek_kind() {
            TokenKind::Amp => {
                let start = self.bump().span;
                let mutable = self.eat(TokenKind::Mut);
                let target = self.parse_unary(no_struct)?;
                let position = start.merge(&target.position());
                let id = self.fresh_id();
                Ok(Expression::Borrow(Box::new(Borrow {
                    target,
                    mutable,
                    info: (),
                    position,
                    id,
                })))
            }
            TokenKind::Star => {
                let start = self.bump().span;
                let target = self.parse_unary(no_struct)?;
                let position = start.merge(&target.position());
                let id = self.fresh_id();
                Ok(Expression::Deref(Box::new(Deref {
                    target,
                    info: (),
                    position,
                    id,
                })))
            }
            TokenKind::Await => {
                let start = self.bump().span;
                let target = self.parse_unary(no_struct)?;
                let position = start.merge(&target.position());
                let id = self.fresh_id();
                Ok(Expression::Await(Box::new(AwaitExpr {
                    target,
                    info: (),
                    position,
                    id,
                })))
            }
            _ => self.parse_postfix(no_struct),
        }
    }

    fn parse_postfix(&mut self, no_struct: bool) -> ParseResult<Expression<()>> {
        let mut expr = self.parse_primary(no_struct)?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let arguments = self.parse_call_arguments()?;
                    let position = expr.position().merge(&self.previous_span());
                    let id = self.fresh_id();
                    expr = Expression::Call(Box::new(Call {
                        callee: expr,
                        arguments,
                        info: (),
                        position,
                        id,
                    }));
                }
                TokenKind::Dot => {
                    self.bump();
                    let member = self.expect_ident()?;
                    let mut type_args = vec![];
                    let looks_generic = self.at(TokenKind::LBracket) && {
                        let saved = self.index_snapshot();
                        self.bump();
                        let generic = starts_type_argument(self);
                        self.restore_index(saved);
                        generic
                    };
                    if looks_generic {
                        self.bump();
                        loop {
                            type_args.push(self.parse_type_name()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(TokenKind::RBracket)?;
                    }
                    if self.at(TokenKind::LParen) {
                        let arguments = self.parse_call_arguments()?;
                        let position = expr.position().merge(&self.previous_span());
                        let id = self.fresh_id();
                        expr = Expression::MethodCall(Box::new(MethodCall {
                            receiver: expr,
                            method: member,
                            type_args,
                            arguments,
                            info: (),
                            position,
                            id,
                        }));
                    } else if !type_args.is_empty() {
                        return Err(self
                            .error_here("type arguments on a field access; expected a call"));
                    } else {
                        let position = expr.position().merge(&member.position);
                        let id = self.fresh_id();
                        expr = Expression::FieldAccess(Box::new(FieldAccess {
                            receiver: expr,
                            field: member,
                            info: (),
                            position,
                            id,
                        }));
                    }
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expression(false)?;
                    let end = self.expect(TokenKind::RBracket)?.span;
                    let position = expr.position().merge(&end);
                    let id = self.fresh_id();
                    expr = Expression::Index(Box::new(Index {
                        receiver: expr,
                        index,
                        info: (),
                        position,
                        id,
                    }));
                }
                TokenKind::Bang => {
                    let end = self.bump().span;
                    let position = expr.position().merge(&end);
                    let id = self.fresh_id();
                    expr = Expression::Propagate(Box::new(Propagate {
                        target: expr,
                        info: (),
                        position,
                        id,
                    }));
                }
                TokenKind::As => {
                    self.bump();
                    let target = self.parse_type_name()?;
                    let position = expr.position().merge(&target.position());
                    let id = self.fresh_id();
                    expr = Expression::Cast(Box::new(Cast {
                        value: expr,
                        target,
                        info: (),
                        position,
                        id,
                    }));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_arguments(&mut self) -> ParseResult<Vec<Expression<()>>> {
        self.expect(TokenKind::LParen)?;
        let mut arguments = vec![];
        if !self.at(TokenKind::RParen) {
            loop {
                arguments.push(self.parse_expression(false)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(arguments)
    }

    fn parse_primary(&mut self, no_struct: bool) -> ParseResult<Expression<()>> {
        match self.peek_kind() {
            TokenKind::IntLit
            | TokenKind::FloatLit
            | TokenKind::True
            | TokenKind::False
            | TokenKind::CharLit
            | TokenKind::StrLit => self.parse_literal(),
            TokenKind::StringPart => self.parse_interpolation(),
            TokenKind::Ident | TokenKind::This => self.parse_path_expression(no_struct),
            TokenKind::LParen => self.parse_paren_or_tuple(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                Ok(Expression::Block(Box::new(block)))
            }
            TokenKind::If => self.parse_if_expression(),
            TokenKind::When => self.parse_when_expression(),
            TokenKind::Do | TokenKind::Transfer => self.parse_closure(),
            TokenKind::Error => {
                let token = self.bump();
                let id = self.fresh_id();
                Ok(Expression::Error(token.span, id))
            }
            other => Err(self.error_here(format!(
                "expected an expression, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_literal(&mut self) -> ParseResult<Expression<()>> {
        let token = self.bump();
        let value = match (&token.kind, token.value) {
            (TokenKind::IntLit, TokenValue::Int { value, base, suffix }) => LiteralValue::Int {
                value,
                base,
                suffix,
            },
            (TokenKind::FloatLit, TokenValue::Float { value, suffix }) => {
                LiteralValue::Float { value, suffix }
            }
            (TokenKind::True, _) => LiteralValue::Bool(true),
            (TokenKind::False, _) => LiteralValue::Bool(false),
            (TokenKind::CharLit, TokenValue::Char(c)) => LiteralValue::Char(c),
            (TokenKind::StrLit, TokenValue::Str(s)) => LiteralValue::Str(s),
            _ => unreachable!("parse_literal called on a non-literal token"),
        };
        let id = self.fresh_id();
        Ok(Expression::Literal(Literal {
            value,
            info: (),
            position: token.span,
            id,
        }))
    }

    /// `StringPart (InterpStart expr InterpEnd StringPart)*`
    fn parse_interpolation(&mut self) -> ParseResult<Expression<()>> {
        let first = self.bump();
        let start = first.span;
        let mut end = first.span;
        let mut parts = vec![match first.value {
            TokenValue::Str(s) => s,
            _ => String::new(),
        }];
        let mut holes = vec![];

        while self.at(TokenKind::InterpStart) {
            self.bump();
            holes.push(self.parse_expression(false)?);
            self.expect(TokenKind::InterpEnd)?;
            let part = self.expect(TokenKind::StringPart)?;
            end = part.span;
            parts.push(match part.value {
                TokenValue::Str(s) => s,
                _ => String::new(),
            });
        }

        let id = self.fresh_id();
        Ok(Expression::Interpolation(Interpolation {
            parts,
            holes,
            info: (),
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_path_expression(&mut self, no_struct: bool) -> ParseResult<Expression<()>> {
        let (mut segments, start) = if self.at(TokenKind::This) {
            let token = self.bump();
            (vec!["this".to_string()], token.span)
        } else {
            let first = self.expect_ident()?;
            let span = first.position;
            (vec![first.name], span)
        };
        let mut end = start;

        while self.eat(TokenKind::PathSep) {
            let segment = self.expect_ident()?;
            end = segment.position;
            segments.push(segment.name);
        }

        // `Foo[I32]` — a type-argument list on an uppercase path head.
        let mut type_args = vec![];
        if self.at(TokenKind::LBracket) && starts_uppercase(segments.last().expect("non-empty")) {
            self.bump();
            loop {
                type_args.push(self.parse_type_name()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            end = self.expect(TokenKind::RBracket)?.span;
        }

        let id = self.fresh_id();
        let path = Path {
            segments,
            type_args,
            info: (),
            position: start.merge(&end),
            id,
        };

        if !no_struct
            && self.at(TokenKind::LBrace)
            && starts_uppercase(path.last())
        {
            return self.parse_struct_init(path);
        }
        Ok(Expression::Path(path))
    }

    fn parse_struct_init(&mut self, name: Path<()>) -> ParseResult<Expression<()>> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = vec![];
        while !self.at(TokenKind::RBrace) {
            let field_name = self.expect_ident()?;
            let value = if self.eat(TokenKind::Colon) {
                self.parse_expression(false)?
            } else {
                // Shorthand `Point { x, y }` — the field reads a local of
                // the same name.
                let id = self.fresh_id();
                Expression::Path(Path {
                    segments: vec![field_name.name.clone()],
                    type_args: vec![],
                    info: (),
                    position: field_name.position,
                    id,
                })
            };
            let position = field_name.position.merge(&value.position());
            fields.push(FieldInit {
                name: field_name,
                value,
                position,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        let position = name.position.merge(&end);
        let id = self.fresh_id();
        Ok(Expression::StructInit(StructInit {
            name,
            fields,
            info: (),
            position,
            id,
        }))
    }

    fn parse_paren_or_tuple(&mut self) -> ParseResult<Expression<()>> {
        let start = self.bump().span;
        if self.at(TokenKind::RParen) {
            let end = self.bump().span;
            let id = self.fresh_id();
            return Ok(Expression::Literal(Literal {
                value: LiteralValue::Unit,
                info: (),
                position: start.merge(&end),
                id,
            }));
        }
        let first = self.parse_expression(false)?;
        if self.eat(TokenKind::Comma) {
            let mut elements = vec![first];
            while !self.at(TokenKind::RParen) {
                elements.push(self.parse_expression(false)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            let end = self.expect(TokenKind::RParen)?.span;
            let id = self.fresh_id();
            Ok(Expression::Tuple(TupleExpr {
                elements,
                info: (),
                position: start.merge(&end),
                id,
            }))
        } else {
            self.expect(TokenKind::RParen)?;
            Ok(first)
        }
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expression<()>> {
        let start = self.bump().span;
        if self.at(TokenKind::RBracket) {
            let end = self.bump().span;
            let id = self.fresh_id();
            return Ok(Expression::Array(ArrayLiteral::List {
                elements: vec![],
                info: (),
                position: start.merge(&end),
                id,
            }));
        }
        let first = self.parse_expression(false)?;
        if self.eat(TokenKind::Semicolon) {
            let length = self.parse_expression(false)?;
            let end = self.expect(TokenKind::RBracket)?.span;
            let id = self.fresh_id();
            return Ok(Expression::Array(ArrayLiteral::Repeat {
                value: Box::new(first),
                length: Box::new(length),
                info: (),
                position: start.merge(&end),
                id,
            }));
        }
        let mut elements = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::RBracket) {
                break;
            }
            elements.push(self.parse_expression(false)?);
        }
        let end = self.expect(TokenKind::RBracket)?.span;
        let id = self.fresh_id();
        Ok(Expression::Array(ArrayLiteral::List {
            elements,
            info: (),
            position: start.merge(&end),
            id,
        }))
    }

    /// Both `if c then a else b` and `if c { … } else { … }` — one
    /// production, split on the token after the condition.
    pub(crate) fn parse_if_expression(&mut self) -> ParseResult<Expression<()>> {
        let start = self.expect(TokenKind::If)?.span;
        let condition = self.parse_expression(true)?;

        if self.eat(TokenKind::Then) {
            let then_branch = self.parse_expression(false)?;
            self.expect(TokenKind::Else)?;
            let else_branch = self.parse_expression(false)?;
            let position = start.merge(&else_branch.position());
            let id = self.fresh_id();
            return Ok(Expression::If(Box::new(IfExpr {
                condition,
                then_branch,
                else_branch: Some(else_branch),
                expression_form: true,
                info: (),
                position,
                id,
            })));
        }

        let then_block = self.parse_block()?;
        let mut position = start.merge(&then_block.position);
        let then_branch = Expression::Block(Box::new(then_block));

        let else_branch = if self.eat(TokenKind::Else) {
            let branch = if self.at(TokenKind::If) {
                self.parse_if_expression()?
            } else {
                Expression::Block(Box::new(self.parse_block()?))
            };
            position = position.merge(&branch.position());
            Some(branch)
        } else {
            None
        };

        let id = self.fresh_id();
        Ok(Expression::If(Box::new(IfExpr {
            condition,
            then_branch,
            else_branch,
            expression_form: false,
            info: (),
            position,
            id,
        })))
    }

    pub(crate) fn parse_when_expression(&mut self) -> ParseResult<Expression<()>> {
        let start = self.expect(TokenKind::When)?.span;
        let scrutinee = self.parse_expression(true)?;
        self.expect(TokenKind::LBrace)?;

        let mut arms = vec![];
        while !self.at(TokenKind::RBrace) {
            let pattern = self.parse_pattern()?;
            self.expect(TokenKind::Arrow)?;
            let value = self.parse_expression(false)?;
            let position = pattern.position().merge(&value.position());
            arms.push(WhenArm {
                pattern,
                value,
                position,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        let id = self.fresh_id();
        Ok(Expression::When(Box::new(WhenExpr {
            scrutinee,
            arms,
            info: (),
            position: start.merge(&end),
            id,
        })))
    }

    /// `do(a, b) expr`, `do(x: I32) { … }`, `transfer do(x) …`
    fn parse_closure(&mut self) -> ParseResult<Expression<()>> {
        let transfer = self.eat(TokenKind::Transfer);
        let start = self.expect(TokenKind::Do)?.span;
        self.expect(TokenKind::LParen)?;
        let mut parameters = vec![];
        if !self.at(TokenKind::RParen) {
            loop {
                let name = self.expect_ident()?;
                let type_annotation = if self.eat(TokenKind::Colon) {
                    Some(self.parse_type_name()?)
                } else {
                    None
                };
                let position = name.position;
                parameters.push(ClosureParameter {
                    name,
                    type_annotation,
                    position,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_expression(false)?;
        let position = start.merge(&body.position());
        let id = self.fresh_id();
        Ok(Expression::Closure(Box::new(Closure {
            parameters,
            body,
            transfer,
            info: (),
            position,
            id,
        })))
    }

    // Cursor save/restore used only for the single-token `[` peek in
    // member position; no token is ever re-interpreted.
    pub(crate) fn index_snapshot(&self) -> usize {
        self.index
    }

    pub(crate) fn restore_index(&mut self, index: usize) {
        self.index = index;
    }

    pub(crate) fn previous_span(&self) -> crate::source::Span {
        self.tokens[self.index.saturating_sub(1)].span
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::parse_source;
    use super::super::ast::*;

    fn body_of(src: &str) -> Vec<Statement<()>> {
        let (session, module) = parse_source(src);
        assert!(!session.has_errors(), "unexpected parse errors");
        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function");
        };
        func.body.statements.clone()
    }

    fn tail_expression(src: &str) -> Expression<()> {
        let statements = body_of(src);
        match statements.last() {
            Some(Statement::YieldingExpression(e)) => e.clone(),
            other => panic!("expected a yielding expression, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = tail_expression("func f() -> I32 { 1 + 2 * 3 }");
        let Expression::Binary(add) = expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(add.op, BinaryOp::Add);
        let Expression::Binary(mul) = &add.right else {
            panic!("expected `2 * 3` on the right");
        };
        assert_eq!(mul.op, BinaryOp::Mul);
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = tail_expression("func f() -> I32 { 2 ** 3 ** 2 }");
        let Expression::Binary(outer) = expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(outer.op, BinaryOp::Pow);
        // Right operand is itself a power: 2 ** (3 ** 2).
        assert!(matches!(
            &outer.right,
            Expression::Binary(inner) if inner.op == BinaryOp::Pow
        ));
    }

    #[test]
    fn test_bitwise_or_is_an_operator_not_a_closure() {
        let expr = tail_expression("func f() -> I32 { 1 | 2 }");
        assert!(matches!(
            expr,
            Expression::Binary(b) if b.op == BinaryOp::BitOr
        ));
    }

    #[test]
    fn test_closure_do_form() {
        let expr = tail_expression("func f() { do(a, b) a + b }");
        let Expression::Closure(closure) = expr else {
            panic!("expected a closure");
        };
        assert_eq!(closure.parameters.len(), 2);
        assert!(!closure.transfer);
        assert!(matches!(closure.body, Expression::Binary(_)));
    }

    #[test]
    fn test_transfer_closure() {
        let expr = tail_expression("func f() { transfer do(x) x }");
        assert!(matches!(
            expr,
            Expression::Closure(c) if c.transfer
        ));
    }

    #[test]
    fn test_generic_call_vs_index() {
        // Uppercase head + `[` is a type-argument list.
        let expr = tail_expression("func f() { Maybe::Just(1) }");
        assert!(matches!(expr, Expression::Call(_)));

        let expr = tail_expression("func g(xs: [I32]) -> I32 { xs[0] }");
        assert!(matches!(expr, Expression::Index(_)));

        let expr = tail_expression("func h() { Buffer[I32](4) }");
        let Expression::Call(call) = expr else {
            panic!("expected a call");
        };
        let Expression::Path(path) = &call.callee else {
            panic!("expected a path callee");
        };
        assert_eq!(path.type_args.len(), 1);
    }

    #[test]
    fn test_method_call_with_type_args() {
        let expr = tail_expression("func f(x: Str) { x.parse[I32]() }");
        let Expression::MethodCall(call) = expr else {
            panic!("expected a method call");
        };
        assert_eq!(call.method.name, "parse");
        assert_eq!(call.type_args.len(), 1);
    }

    #[test]
    fn test_field_index_stays_an_index() {
        let expr = tail_expression("func f(p: Pair) -> I32 { p.items[0] }");
        let Expression::Index(index) = expr else {
            panic!("expected an index");
        };
        assert!(matches!(&index.receiver, Expression::FieldAccess(_)));
    }

    #[test]
    fn test_if_expression_form() {
        let expr = tail_expression("func f(c: Bool) -> I32 { if c then 1 else 2 }");
        let Expression::If(if_expr) = expr else {
            panic!("expected an if");
        };
        assert!(if_expr.expression_form);
        assert!(if_expr.else_branch.is_some());
    }

    #[test]
    fn test_if_block_form() {
        let statements = body_of("func f(c: Bool) { if c { return } else { return } let x = 1; }");
        let Statement::Expression(Expression::If(if_expr)) = &statements[0] else {
            panic!("expected an if statement, got {statements:?}");
        };
        assert!(!if_expr.expression_form);
        assert!(matches!(statements[1], Statement::Let(_)));
    }

    #[test]
    fn test_when_expression() {
        let expr = tail_expression(
            "func f(m: Maybe[I32]) -> I32 { when m { Just(x) -> x, Nothing -> 0 } }",
        );
        let Expression::When(when) = expr else {
            panic!("expected a when");
        };
        assert_eq!(when.arms.len(), 2);
    }

    #[test]
    fn test_interpolation_expression() {
        let expr = tail_expression("func f(x: I32) -> Str { \"x = ${x + 1}!\" }");
        let Expression::Interpolation(interp) = expr else {
            panic!("expected an interpolation");
        };
        assert_eq!(interp.parts.len(), 2);
        assert_eq!(interp.holes.len(), 1);
    }

    #[test]
    fn test_borrow_and_deref() {
        let expr = tail_expression("func f(v: I32) -> I32 { *(&v) }");
        let Expression::Deref(deref) = expr else {
            panic!("expected a deref");
        };
        assert!(matches!(&deref.target, Expression::Borrow(b) if !b.mutable));
    }

    #[test]
    fn test_range_and_propagate() {
        let expr = tail_expression("func f(a: I32) { a to a + 3 }");
        assert!(matches!(
            expr,
            Expression::Range(r) if !r.inclusive
        ));

        let expr = tail_expression("func g() -> I32 { read()! }");
        assert!(matches!(expr, Expression::Propagate(_)));
    }

    #[test]
    fn test_struct_init_with_shorthand() {
        let expr = tail_expression("func f(x: I32) { Point { x, y: 2 } }");
        let Expression::StructInit(init) = expr else {
            panic!("expected a struct initializer");
        };
        assert_eq!(init.fields.len(), 2);
        assert!(matches!(&init.fields[0].value, Expression::Path(_)));
    }
}
