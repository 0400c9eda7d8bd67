//! Statement and block checking.
//!
//! A block's type is its trailing yielded expression, `Never` when every
//! path out is a `return`/`break`/`continue`, and unit otherwise.

use crate::parser::ast::*;

use super::error::*;
use super::types::Type;
use super::{value_type, TypeChecker, TypeInformation};

impl<'a> TypeChecker<'a> {
    pub(crate) fn check_block(&mut self, block: &Block<()>) -> Block<TypeInformation> {
        self.check_block_expecting(block, None)
    }

    /// Check a block; when `expected` is given the trailing yielding
    /// expression (or the implicit unit) checks against it. Used for
    /// function bodies against their return type.
    pub(crate) fn check_block_expecting(
        &mut self,
        block: &Block<()>,
        expected: Option<&Type>,
    ) -> Block<TypeInformation> {
        self.ctx.scope.enter();
        let total = block.statements.len();
        let statements: Vec<_> = block
            .statements
            .iter()
            .enumerate()
            .map(|(index, statement)| {
                let is_tail = index + 1 == total;
                self.check_statement(statement, if is_tail { expected } else { None })
            })
            .collect();
        self.ctx.scope.exit();

        let block_type = match statements.last() {
            Some(Statement::YieldingExpression(tail)) => value_type(tail),
            Some(Statement::Return(_) | Statement::Break(_) | Statement::Continue(_)) => {
                Type::Never
            }
            _ => Type::Unit,
        };

        // A function body that falls off the end without yielding must
        // have a unit return type.
        if let Some(expected) = expected {
            if matches!(block_type, Type::Unit) && !matches!(expected, Type::Unit) {
                let ends_diverging = matches!(
                    statements.last(),
                    Some(Statement::Return(_))
                        | Some(Statement::Break(_))
                        | Some(Statement::Continue(_))
                );
                let ends_in_loop = matches!(
                    statements.last(),
                    Some(Statement::Loop(_)) | Some(Statement::WhileLoop(_))
                );
                if !ends_diverging && !ends_in_loop {
                    self.report(TypeCheckError::TypeMismatch(
                        TypeMismatch {
                            expected: self.ctx.zonk(expected),
                            actual: Type::Unit,
                        },
                        block.position,
                    ));
                }
            }
        }

        Block {
            statements,
            info: self.info(block_type),
            position: block.position,
            id: block.id,
        }
    }

    fn check_statement(
        &mut self,
        statement: &Statement<()>,
        tail_expected: Option<&Type>,
    ) -> Statement<TypeInformation> {
        match statement {
            Statement::Let(let_stmt) => self.check_let(let_stmt),
            Statement::Assignment(assignment) => self.check_assignment(assignment),
            Statement::Return(ret) => self.check_return(ret),
            Statement::Break(break_stmt) => Statement::Break(break_stmt.clone()),
            Statement::Continue(continue_stmt) => Statement::Continue(continue_stmt.clone()),
            Statement::WhileLoop(while_loop) => {
                let condition =
                    self.check_expression_expecting(&while_loop.condition, &Type::Boolean);
                let body = self.check_block(&while_loop.body);
                Statement::WhileLoop(WhileLoop {
                    condition,
                    body,
                    info: self.info(Type::Unit),
                    position: while_loop.position,
                    id: while_loop.id,
                })
            }
            Statement::Loop(loop_stmt) => {
                let body = self.check_block(&loop_stmt.body);
                Statement::Loop(Loop {
                    body,
                    info: self.info(Type::Unit),
                    position: loop_stmt.position,
                    id: loop_stmt.id,
                })
            }
            Statement::ForLoop(for_loop) => self.check_for(for_loop),
            Statement::Expression(expression) => {
                Statement::Expression(self.check_expression(expression))
            }
            Statement::YieldingExpression(expression) => {
                let checked = match tail_expected {
                    Some(expected) => self.check_expression_expecting(expression, expected),
                    None => self.check_expression(expression),
                };
                Statement::YieldingExpression(checked)
            }
            Statement::Error(span) => Statement::Error(*span),
        }
    }

    fn check_let(&mut self, let_stmt: &Let<()>) -> Statement<TypeInformation> {
        let value = match &let_stmt.type_annotation {
            Some(annotation) => {
                let expected = self.convert_type(annotation);
                self.check_expression_expecting(&let_stmt.value, &expected)
            }
            None => self.check_expression(&let_stmt.value),
        };
        let binding_type = match &let_stmt.type_annotation {
            Some(annotation) => self.convert_type(annotation),
            None => value_type(&value),
        };

        if let Err(err) = self.ctx.scope.add_variable(
            &let_stmt.name.name,
            binding_type.clone(),
            let_stmt.mutable,
            let_stmt.name.position,
        ) {
            self.report(TypeCheckError::RedefinedVariable(
                RedefinedVariable { name: err.name },
                let_stmt.name.position,
            ));
        }

        Statement::Let(Let {
            mutable: let_stmt.mutable,
            name: Ident {
                name: let_stmt.name.name.clone(),
                info: self.info(binding_type),
                position: let_stmt.name.position,
                id: let_stmt.name.id,
            },
            type_annotation: let_stmt.type_annotation.clone(),
            value,
            info: self.info(Type::Unit),
            position: let_stmt.position,
            id: let_stmt.id,
        })
    }

    fn check_assignment(&mut self, assignment: &Assignment<()>) -> Statement<TypeInformation> {
        let target = self.check_expression(&assignment.target);
        let target_type = value_type(&target);
        let value = self.check_expression_expecting(&assignment.value, &target_type);

        self.check_place_mutability(&assignment.target, assignment.position);

        if assignment.op.is_some() {
            // Compound assignment needs an arithmetic-capable target.
            let shape = self.ctx.shape_of(&target_type);
            if !matches!(
                shape,
                Type::Int(_) | Type::Float(_) | Type::Var(_) | Type::Error | Type::String
            ) {
                self.report(TypeCheckError::TypeMismatch(
                    TypeMismatch {
                        expected: Type::Int(super::types::IntKind::I32),
                        actual: shape,
                    },
                    assignment.position,
                ));
            }
        }

        Statement::Assignment(Assignment {
            target,
            op: assignment.op,
            value,
            info: self.info(Type::Unit),
            position: assignment.position,
            id: assignment.id,
        })
    }

    /// Walk a place expression down to its root binding and verify the
    /// assignment is allowed: mutable binding, or a write through a
    /// `mut ref`.
    fn check_place_mutability(&mut self, place: &Expression<()>, span: crate::source::Span) {
        match place {
            Expression::Path(path) if path.segments.len() == 1 => {
                let name = &path.segments[0];
                if let Some((_, mutable)) = self.ctx.scope.get_variable(name) {
                    if !mutable {
                        self.report(TypeCheckError::ImmutableReassign(
                            ImmutableReassign { name: name.clone() },
                            span,
                        ));
                    }
                }
            }
            Expression::FieldAccess(access) => {
                self.check_place_mutability(&access.receiver, span)
            }
            Expression::Index(index) => self.check_place_mutability(&index.receiver, span),
            Expression::Deref(deref) => {
                // Writing through a reference needs `mut ref`.
                if let Expression::Path(path) = &deref.target {
                    if path.segments.len() == 1 {
                        if let Some((type_id, _)) = self.ctx.scope.get_variable(&path.segments[0])
                        {
                            if let Type::Reference { mutable: false, .. } =
                                self.ctx.shape_of(&type_id)
                            {
                                self.report(TypeCheckError::ImmutableReassign(
                                    ImmutableReassign {
                                        name: path.segments[0].clone(),
                                    },
                                    span,
                                ));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn check_return(&mut self, ret: &Return<()>) -> Statement<TypeInformation> {
        let expected = self.return_types.last().cloned().unwrap_or(Type::Unit);
        let value = match &ret.value {
            Some(value) => Some(self.check_expression_expecting(value, &expected)),
            None => {
                self.unify_or_report(&expected, &Type::Unit, ret.position);
                None
            }
        };
        Statement::Return(Return {
            value,
            info: self.info(Type::Never),
            position: ret.position,
            id: ret.id,
        })
    }

    fn check_for(&mut self, for_loop: &ForLoop<()>) -> Statement<TypeInformation> {
        let iterable = self.check_expression(&for_loop.iterable);
        let iterable_type = self.ctx.shape_of(&value_type(&iterable));

        let element = match iterable_type.peel_references() {
            Type::Named { name, args } if name == "Range" && args.len() == 1 => args[0].clone(),
            Type::Named { name, args } if name == "List" && args.len() == 1 => args[0].clone(),
            Type::Array(element, _) | Type::Slice(element) => *element.clone(),
            Type::Error => Type::Error,
            other => {
                self.report(TypeCheckError::TypeMismatch(
                    TypeMismatch {
                        expected: Type::Named {
                            name: "Range".into(),
                            args: vec![Type::Error],
                        },
                        actual: other.clone(),
                    },
                    for_loop.iterable.position(),
                ));
                Type::Error
            }
        };

        self.ctx.scope.enter();
        if let Err(err) = self.ctx.scope.add_variable(
            &for_loop.binder.name,
            element.clone(),
            false,
            for_loop.binder.position,
        ) {
            self.report(TypeCheckError::RedefinedVariable(
                RedefinedVariable { name: err.name },
                for_loop.binder.position,
            ));
        }
        let body = self.check_block(&for_loop.body);
        self.ctx.scope.exit();

        Statement::ForLoop(ForLoop {
            binder: Ident {
                name: for_loop.binder.name.clone(),
                info: self.info(element),
                position: for_loop.binder.position,
                id: for_loop.binder.id,
            },
            iterable,
            body,
            info: self.info(Type::Unit),
            position: for_loop.position,
            id: for_loop.id,
        })
    }
}
