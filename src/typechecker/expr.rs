//! Expression inference.
//!
//! Literals, paths and calls synthesize their types; `check_expression_expecting`
//! adds the bidirectional step by unifying the synthesized type against an
//! expectation from the context (let annotations, call arguments, return
//! types). Method resolution follows the fixed search order: inherent
//! extends, behavior impls in scope, then `Type::method` paths; dyn
//! receivers dispatch through the behavior definition, generic receivers
//! through their bounds.

use crate::lexer::NumSuffix;
use crate::parser::ast::*;

use super::behavior::TypeDefKind;
use super::error::*;
use super::types::{FloatKind, IntKind, Type};
use super::{value_type, FunctionSig, TypeChecker, TypeInformation};

impl<'a> TypeChecker<'a> {
    pub(crate) fn check_expression_expecting(
        &mut self,
        expression: &Expression<()>,
        expected: &Type,
    ) -> Expression<TypeInformation> {
        let checked = self.check_expression(expression);
        let actual = value_type(&checked);
        self.unify_or_report(expected, &actual, expression.position());
        checked
    }

    pub(crate) fn check_expression(
        &mut self,
        expression: &Expression<()>,
    ) -> Expression<TypeInformation> {
        match expression {
            Expression::Literal(literal) => self.check_literal(literal),
            Expression::Path(path) => self.check_path(path),
            Expression::Interpolation(interp) => self.check_interpolation(interp),
            Expression::Unary(unary) => self.check_unary(unary),
            Expression::Binary(binary) => self.check_binary(binary),
            Expression::Call(call) => self.check_call(call),
            Expression::MethodCall(call) => self.check_method_call(call),
            Expression::FieldAccess(access) => self.check_field_access(access),
            Expression::Index(index) => self.check_index(index),
            Expression::Tuple(tuple) => {
                let elements: Vec<_> = tuple
                    .elements
                    .iter()
                    .map(|e| self.check_expression(e))
                    .collect();
                let type_id = Type::Tuple(elements.iter().map(value_type).collect());
                Expression::Tuple(TupleExpr {
                    elements,
                    info: self.info(type_id),
                    position: tuple.position,
                    id: tuple.id,
                })
            }
            Expression::Array(array) => self.check_array(array),
            Expression::StructInit(init) => self.check_struct_init(init),
            Expression::If(if_expr) => self.check_if(if_expr),
            Expression::When(when) => self.check_when(when),
            Expression::Block(block) => {
                let checked = self.check_block(block);
                Expression::Block(Box::new(checked))
            }
            Expression::Closure(closure) => self.check_closure(closure),
            Expression::Range(range) => self.check_range(range),
            Expression::Borrow(borrow) => {
                let target = self.check_expression(&borrow.target);
                let inner = value_type(&target);
                let type_id = Type::reference(inner, borrow.mutable);
                Expression::Borrow(Box::new(Borrow {
                    target,
                    mutable: borrow.mutable,
                    info: self.info(type_id),
                    position: borrow.position,
                    id: borrow.id,
                }))
            }
            Expression::Deref(deref) => {
                let target = self.check_expression(&deref.target);
                let target_type = self.ctx.shape_of(&value_type(&target));
                let type_id = match target_type {
                    Type::Reference { inner, .. } => *inner,
                    Type::Error => Type::Error,
                    other => {
                        self.report(TypeCheckError::TypeMismatch(
                            TypeMismatch {
                                expected: Type::reference(Type::Error, false),
                                actual: other,
                            },
                            deref.position,
                        ));
                        Type::Error
                    }
                };
                Expression::Deref(Box::new(Deref {
                    target,
                    info: self.info(type_id),
                    position: deref.position,
                    id: deref.id,
                }))
            }
            Expression::Await(await_expr) => {
                if !self.in_async {
                    self.session.emit(crate::diagnostics::Diagnostic::error(
                        "E0215",
                        "`await` is only allowed inside `async` functions",
                        await_expr.position,
                    ));
                }
                let target = self.check_expression(&await_expr.target);
                let type_id = value_type(&target);
                Expression::Await(Box::new(AwaitExpr {
                    target,
                    info: self.info(type_id),
                    position: await_expr.position,
                    id: await_expr.id,
                }))
            }
            Expression::Propagate(propagate) => self.check_propagate(propagate),
            Expression::Cast(cast) => self.check_cast(cast),
            Expression::Error(span, id) => Expression::Error(*span, *id),
        }
    }

    fn check_literal(&mut self, literal: &Literal<()>) -> Expression<TypeInformation> {
        let type_id = match &literal.value {
            LiteralValue::Int { suffix, .. } => match suffix {
                Some(suffix) => suffix_type(*suffix),
                None => self.ctx.fresh_int_var(),
            },
            LiteralValue::Float { suffix, .. } => match suffix {
                Some(suffix) => suffix_type(*suffix),
                None => self.ctx.fresh_float_var(),
            },
            LiteralValue::Bool(_) => Type::Boolean,
            LiteralValue::Char(_) => Type::Character,
            LiteralValue::Str(_) => Type::String,
            LiteralValue::Unit => Type::Unit,
        };
        Expression::Literal(Literal {
            value: literal.value.clone(),
            info: self.info(type_id),
            position: literal.position,
            id: literal.id,
        })
    }

    fn check_interpolation(&mut self, interp: &Interpolation<()>) -> Expression<TypeInformation> {
        let holes: Vec<_> = interp
            .holes
            .iter()
            .map(|hole| {
                let checked = self.check_expression(hole);
                let shape = self.ctx.shape_of(&value_type(&checked));
                let printable = matches!(
                    shape,
                    Type::Int(_)
                        | Type::Float(_)
                        | Type::Boolean
                        | Type::Character
                        | Type::String
                        | Type::Var(_)
                        | Type::Error
                );
                if !printable {
                    self.report(TypeCheckError::TypeMismatch(
                        TypeMismatch {
                            expected: Type::String,
                            actual: shape,
                        },
                        hole.position(),
                    ));
                }
                checked
            })
            .collect();
        Expression::Interpolation(Interpolation {
            parts: interp.parts.clone(),
            holes,
            info: self.info(Type::String),
            position: interp.position,
            id: interp.id,
        })
    }

    fn check_unary(&mut self, unary: &Unary<()>) -> Expression<TypeInformation> {
        let operand = self.check_expression(&unary.operand);
        let operand_type = value_type(&operand);
        let type_id = match unary.op {
            UnaryOp::Neg => {
                let shape = self.ctx.shape_of(&operand_type);
                if !matches!(shape, Type::Int(_) | Type::Float(_) | Type::Var(_) | Type::Error) {
                    self.report(TypeCheckError::TypeMismatch(
                        TypeMismatch {
                            expected: Type::Int(IntKind::I32),
                            actual: shape,
                        },
                        unary.position,
                    ));
                    Type::Error
                } else {
                    operand_type
                }
            }
            UnaryOp::Not => {
                self.unify_or_report(&Type::Boolean, &operand_type, unary.position);
                Type::Boolean
            }
            UnaryOp::BitNot => {
                let int_var = self.ctx.fresh_int_var();
                self.unify_or_report(&int_var, &operand_type, unary.position);
                int_var
            }
        };
        Expression::Unary(Box::new(Unary {
            op: unary.op,
            operand,
            info: self.info(type_id),
            position: unary.position,
            id: unary.id,
        }))
    }

    fn check_binary(&mut self, binary: &Binary<()>) -> Expression<TypeInformation> {
        let left = self.check_expression(&binary.left);
        let right = self.check_expression(&binary.right);
        let left_type = value_type(&left);
        let right_type = value_type(&right);

        let type_id = if binary.op.is_logical() {
            self.unify_or_report(&Type::Boolean, &left_type, binary.left.position());
            self.unify_or_report(&Type::Boolean, &right_type, binary.right.position());
            Type::Boolean
        } else if binary.op.is_comparison() {
            self.unify_or_report(&left_type, &right_type, binary.position);
            Type::Boolean
        } else if matches!(
            binary.op,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        ) {
            let int_var = self.ctx.fresh_int_var();
            self.unify_or_report(&int_var, &left_type, binary.left.position());
            if matches!(binary.op, BinaryOp::Shl | BinaryOp::Shr) {
                let shift_var = self.ctx.fresh_int_var();
                self.unify_or_report(&shift_var, &right_type, binary.right.position());
            } else {
                self.unify_or_report(&int_var, &right_type, binary.right.position());
            }
            int_var
        } else {
            // Arithmetic: both sides one numeric type.
            self.unify_or_report(&left_type, &right_type, binary.position);
            let shape = self.ctx.shape_of(&left_type);
            if !matches!(
                shape,
                Type::Int(_) | Type::Float(_) | Type::Var(_) | Type::Error
            ) {
                self.report(TypeCheckError::TypeMismatch(
                    TypeMismatch {
                        expected: Type::Int(IntKind::I32),
                        actual: shape,
                    },
                    binary.position,
                ));
                Type::Error
            } else {
                left_type
            }
        };

        Expression::Binary(Box::new(Binary {
            op: binary.op,
            left,
            right,
            info: self.info(type_id),
            position: binary.position,
            id: binary.id,
        }))
    }

    /// Instantiate a function signature at a call site: explicit type
    /// arguments when written, fresh variables otherwise. Bound
    /// obligations and the monomorphization record are deferred until
    /// inference settles.
    pub(crate) fn instantiate_signature(
        &mut self,
        sig: &FunctionSig,
        explicit: &[TypeName],
        span: crate::source::Span,
    ) -> (Vec<Type>, Type) {
        let mut mapping = std::collections::HashMap::new();
        let mut ordered_args = vec![];
        for (index, (param, bounds)) in sig.generics.iter().enumerate() {
            let argument = match explicit.get(index) {
                Some(name) => self.convert_type(name),
                None => self.ctx.fresh_var(),
            };
            for bound in bounds {
                self.defer_obligation(argument.clone(), param, bound, span);
            }
            mapping.insert(param.clone(), argument.clone());
            ordered_args.push(argument);
        }
        if !explicit.is_empty() && explicit.len() != sig.generics.len() {
            self.report(TypeCheckError::WrongArgumentCount(
                WrongArgumentCount {
                    expected: sig.generics.len(),
                    actual: explicit.len(),
                },
                span,
            ));
        }
        if !ordered_args.is_empty() {
            self.record_instantiation(&sig.qualified, ordered_args);
        }
        let params = sig.params.iter().map(|p| p.substitute(&mapping)).collect();
        let return_value = sig.return_value.substitute(&mapping);
        (params, return_value)
    }

    fn check_path(&mut self, path: &Path<()>) -> Expression<TypeInformation> {
        let type_id = self.resolve_path_type(path);
        Expression::Path(Path {
            segments: path.segments.clone(),
            type_args: path.type_args.clone(),
            info: self.info(type_id),
            position: path.position,
            id: path.id,
        })
    }

    fn resolve_path_type(&mut self, path: &Path<()>) -> Type {
        if path.segments.len() == 1 {
            let name = &path.segments[0];
            if let Some((type_id, _)) = self.ctx.scope.get_variable(name) {
                return type_id;
            }
            if let Some(sig) = self.lookup_local_function(name).cloned() {
                let (params, return_value) =
                    self.instantiate_signature(&sig, &path.type_args, path.position);
                return Type::Function {
                    params,
                    return_value: Box::new(return_value),
                    effects: sig.effects.clone(),
                };
            }
            if let Some(constructor) = self.resolve_variant_constructor(None, name, path) {
                return constructor;
            }
            if self.function_sigs.contains_key(name) {
                let sig = self.function_sigs[name].clone();
                let (params, return_value) =
                    self.instantiate_signature(&sig, &path.type_args, path.position);
                return Type::Function {
                    params,
                    return_value: Box::new(return_value),
                    effects: sig.effects.clone(),
                };
            }
            self.report(TypeCheckError::UndefinedVariable(
                UndefinedVariable { name: name.clone() },
                path.position,
            ));
            return Type::Error;
        }

        let joined = path.joined();
        if let Some(sig) = self.function_sigs.get(&joined).cloned() {
            let (params, return_value) =
                self.instantiate_signature(&sig, &path.type_args, path.position);
            return Type::Function {
                params,
                return_value: Box::new(return_value),
                effects: sig.effects.clone(),
            };
        }
        // `Enum::Variant`
        if path.segments.len() == 2 {
            let (head, member) = (&path.segments[0], &path.segments[1]);
            if let Some(constructor) = self.resolve_variant_constructor(Some(head), member, path) {
                return constructor;
            }
            // `Type::method` — the method as a function with explicit
            // receiver.
            if let Some(method) = self.ctx.definitions.inherent_method(head, member) {
                let mut params = vec![];
                if let Some(mutable) = method.this_param {
                    params.push(Type::reference(Type::named(head.clone()), mutable));
                }
                params.extend(method.params.iter().cloned());
                return Type::Function {
                    params,
                    return_value: Box::new(method.return_value.clone()),
                    effects: method.effects.clone(),
                };
            }
        }
        // A function addressed by module path, relative or absolute.
        let qualified = format!("{}::{joined}", self.current_module_key());
        if let Some(sig) = self.function_sigs.get(&qualified).cloned() {
            let (params, return_value) =
                self.instantiate_signature(&sig, &path.type_args, path.position);
            return Type::Function {
                params,
                return_value: Box::new(return_value),
                effects: sig.effects.clone(),
            };
        }

        self.report(TypeCheckError::UndefinedVariable(
            UndefinedVariable { name: joined },
            path.position,
        ));
        Type::Error
    }

    /// Resolve an enum variant constructor. With no enum hint the variant
    /// name must be unique across all enums in scope.
    fn resolve_variant_constructor(
        &mut self,
        enum_hint: Option<&str>,
        variant: &str,
        path: &Path<()>,
    ) -> Option<Type> {
        let candidates = match enum_hint {
            Some(enum_name) => {
                let def = self.ctx.definitions.get_type(enum_name)?;
                match &def.kind {
                    TypeDefKind::Enum(enum_def) if enum_def.tag_of(variant).is_some() => {
                        vec![def.name.clone()]
                    }
                    _ => return None,
                }
            }
            None => self.ctx.definitions.enums_with_variant(variant),
        };
        match candidates.len() {
            0 => None,
            1 => {
                let enum_name = &candidates[0];
                let def = self.ctx.definitions.get_type(enum_name)?;
                let TypeDefKind::Enum(enum_def) = &def.kind else {
                    return None;
                };
                let mut mapping = std::collections::HashMap::new();
                let mut args = vec![];
                for (index, generic) in def.generics.iter().enumerate() {
                    let arg = match path.type_args.get(index) {
                        Some(name) => self.convert_type(name),
                        None => self.ctx.fresh_var(),
                    };
                    mapping.insert(generic.clone(), arg.clone());
                    args.push(arg);
                }
                let enum_type = Type::Named {
                    name: enum_name.clone(),
                    args,
                };
                let payload = enum_def.payload_of(variant)?;
                if payload.is_empty() {
                    Some(enum_type)
                } else {
                    Some(Type::Function {
                        params: payload.iter().map(|t| t.substitute(&mapping)).collect(),
                        return_value: Box::new(enum_type),
                        effects: crate::effects::EffectRow::pure(),
                    })
                }
            }
            _ => {
                self.report(TypeCheckError::AmbiguousMethod(
                    AmbiguousMethod {
                        receiver: Type::Error,
                        name: variant.to_string(),
                        candidates,
                    },
                    path.position,
                ));
                Some(Type::Error)
            }
        }
    }

    fn check_call(&mut self, call: &Call<()>) -> Expression<TypeInformation> {
        let callee = self.check_expression(&call.callee);
        let callee_type = self.ctx.shape_of(&value_type(&callee));

        let arguments: Vec<_> = call
            .arguments
            .iter()
            .map(|argument| self.check_expression(argument))
            .collect();

        let type_id = match callee_type {
            Type::Function {
                params,
                return_value,
                ..
            } => {
                if params.len() != arguments.len() {
                    self.report(TypeCheckError::WrongArgumentCount(
                        WrongArgumentCount {
                            expected: params.len(),
                            actual: arguments.len(),
                        },
                        call.position,
                    ));
                }
                for (param, argument) in params.iter().zip(&arguments) {
                    self.unify_or_report(param, &value_type(argument), argument.position());
                }
                *return_value
            }
            Type::Error => Type::Error,
            other => {
                self.report(TypeCheckError::NotCallable(
                    NotCallable { actual: other },
                    call.position,
                ));
                Type::Error
            }
        };

        Expression::Call(Box::new(Call {
            callee,
            arguments,
            info: self.info(type_id),
            position: call.position,
            id: call.id,
        }))
    }

    fn check_method_call(&mut self, call: &MethodCall<()>) -> Expression<TypeInformation> {
        let receiver = self.check_expression(&call.receiver);
        let receiver_type = self.ctx.shape_of(&value_type(&receiver));
        let peeled = receiver_type.peel_references().clone();

        let arguments: Vec<_> = call
            .arguments
            .iter()
            .map(|argument| self.check_expression(argument))
            .collect();

        let resolved = self.resolve_method(&peeled, &call.method.name, call);
        let type_id = match resolved {
            Some((params, return_value)) => {
                if params.len() != arguments.len() {
                    self.report(TypeCheckError::WrongArgumentCount(
                        WrongArgumentCount {
                            expected: params.len(),
                            actual: arguments.len(),
                        },
                        call.position,
                    ));
                }
                for (param, argument) in params.iter().zip(&arguments) {
                    self.unify_or_report(param, &value_type(argument), argument.position());
                }
                return_value
            }
            None => Type::Error,
        };

        Expression::MethodCall(Box::new(MethodCall {
            receiver,
            method: Ident {
                name: call.method.name.clone(),
                info: self.info(type_id.clone()),
                position: call.method.position,
                id: call.method.id,
            },
            type_args: call.type_args.clone(),
            arguments,
            info: self.info(type_id),
            position: call.position,
            id: call.id,
        }))
    }

    /// Method search order: (a) inherent extends of the concrete type,
    /// (b) behavior impls whose receiver matches, (c) the behavior itself
    /// for `dyn` receivers and bounded generics. Returns the instantiated
    /// parameter and return types.
    fn resolve_method(
        &mut self,
        receiver: &Type,
        name: &str,
        call: &MethodCall<()>,
    ) -> Option<(Vec<Type>, Type)> {
        if receiver.is_error() {
            return None;
        }
        if let Type::Var(_) = receiver {
            self.report(TypeCheckError::AmbiguousInference(
                AmbiguousInference {
                    description: format!("the receiver of `.{name}()`"),
                },
                call.position,
            ));
            return None;
        }

        // (c) dyn receiver: dispatch through the behavior definition.
        if let Type::DynBehavior(behavior_name) = receiver {
            let behavior = self.ctx.definitions.get_behavior(behavior_name)?;
            let Some(method) = behavior.method(name) else {
                self.report(TypeCheckError::UnresolvedMethod(
                    UnresolvedMethod {
                        receiver: receiver.clone(),
                        name: name.to_string(),
                    },
                    call.position,
                ));
                return None;
            };
            return Some((method.params.clone(), method.return_value.clone()));
        }

        // Bounded generic receiver: methods come from the bounds.
        if let Type::Generic(param) = receiver {
            let bounds = self.generic_bounds.get(param).cloned().unwrap_or_default();
            for bound in &bounds {
                if let Some(behavior) = self.ctx.definitions.get_behavior(bound) {
                    if let Some(method) = behavior.method(name) {
                        return Some((method.params.clone(), method.return_value.clone()));
                    }
                }
            }
            self.report(TypeCheckError::UnresolvedMethod(
                UnresolvedMethod {
                    receiver: receiver.clone(),
                    name: name.to_string(),
                },
                call.position,
            ));
            return None;
        }

        let Some(head) = receiver.head_name().map(str::to_string) else {
            self.report(TypeCheckError::UnresolvedMethod(
                UnresolvedMethod {
                    receiver: receiver.clone(),
                    name: name.to_string(),
                },
                call.position,
            ));
            return None;
        };

        // Generic mapping from the receiver's nominal arguments.
        let mut mapping = std::collections::HashMap::new();
        if let (Type::Named { args, .. }, Some(def)) =
            (receiver, self.ctx.definitions.get_type(&head))
        {
            for (generic, arg) in def.generics.iter().zip(args) {
                mapping.insert(generic.clone(), arg.clone());
            }
        }

        // (a) inherent method.
        if let Some(method) = self.ctx.definitions.inherent_method(&head, name) {
            for (index, explicit) in call.type_args.iter().enumerate() {
                if let Some(generic) = method.generics.get(index) {
                    let argument = self.convert_type(explicit);
                    mapping.insert(generic.clone(), argument);
                }
            }
            let params = method.params.iter().map(|p| p.substitute(&mapping)).collect();
            let return_value = method.return_value.substitute(&mapping);
            return Some((params, return_value));
        }

        // (b) behavior impls providing this method.
        let candidates = self.ctx.definitions.behavior_methods_for(&head, name);
        match candidates.len() {
            0 => {
                self.report(TypeCheckError::UnresolvedMethod(
                    UnresolvedMethod {
                        receiver: receiver.clone(),
                        name: name.to_string(),
                    },
                    call.position,
                ));
                None
            }
            1 => {
                let (_, method) = &candidates[0];
                let params = method.params.iter().map(|p| p.substitute(&mapping)).collect();
                let return_value = method.return_value.substitute(&mapping);
                Some((params, return_value))
            }
            _ => {
                self.report(TypeCheckError::AmbiguousMethod(
                    AmbiguousMethod {
                        receiver: receiver.clone(),
                        name: name.to_string(),
                        candidates: candidates.into_iter().map(|(behavior, _)| behavior).collect(),
                    },
                    call.position,
                ));
                None
            }
        }
    }

    fn check_field_access(&mut self, access: &FieldAccess<()>) -> Expression<TypeInformation> {
        let receiver = self.check_expression(&access.receiver);
        let receiver_type = self.ctx.shape_of(&value_type(&receiver));
        let peeled = receiver_type.peel_references();

        let type_id = match peeled {
            Type::Named { name, args } => match self.ctx.definitions.get_type(name) {
                Some(def) => {
                    let mut mapping = std::collections::HashMap::new();
                    for (generic, arg) in def.generics.iter().zip(args) {
                        mapping.insert(generic.clone(), arg.clone());
                    }
                    match &def.kind {
                        TypeDefKind::Struct(struct_def) => {
                            match struct_def.field_type(&access.field.name) {
                                Some(field_type) => field_type.substitute(&mapping),
                                None => {
                                    self.report(TypeCheckError::UnknownField(
                                        UnknownField {
                                            receiver: peeled.clone(),
                                            field: access.field.name.clone(),
                                        },
                                        access.field.position,
                                    ));
                                    Type::Error
                                }
                            }
                        }
                        _ => {
                            self.report(TypeCheckError::UnknownField(
                                UnknownField {
                                    receiver: peeled.clone(),
                                    field: access.field.name.clone(),
                                },
                                access.field.position,
                            ));
                            Type::Error
                        }
                    }
                }
                None => Type::Error,
            },
            Type::Error => Type::Error,
            other => {
                self.report(TypeCheckError::UnknownField(
                    UnknownField {
                        receiver: other.clone(),
                        field: access.field.name.clone(),
                    },
                    access.field.position,
                ));
                Type::Error
            }
        };

        Expression::FieldAccess(Box::new(FieldAccess {
            receiver,
            field: Ident {
                name: access.field.name.clone(),
                info: self.info(type_id.clone()),
                position: access.field.position,
                id: access.field.id,
            },
            info: self.info(type_id),
            position: access.position,
            id: access.id,
        }))
    }

    fn check_index(&mut self, index: &Index<()>) -> Expression<TypeInformation> {
        let receiver = self.check_expression(&index.receiver);
        let index_expr = self.check_expression(&index.index);

        let index_var = self.ctx.fresh_int_var();
        self.unify_or_report(&index_var, &value_type(&index_expr), index.index.position());

        let receiver_type = self.ctx.shape_of(&value_type(&receiver));
        let type_id = match receiver_type.peel_references() {
            Type::Array(element, _) | Type::Slice(element) => *element.clone(),
            Type::Named { name, args } if name == "List" && args.len() == 1 => args[0].clone(),
            Type::String => Type::Character,
            Type::Error => Type::Error,
            other => {
                self.report(TypeCheckError::TypeMismatch(
                    TypeMismatch {
                        expected: Type::Slice(Box::new(Type::Error)),
                        actual: other.clone(),
                    },
                    index.position,
                ));
                Type::Error
            }
        };

        Expression::Index(Box::new(Index {
            receiver,
            index: index_expr,
            info: self.info(type_id),
            position: index.position,
            id: index.id,
        }))
    }

    fn check_array(&mut self, array: &ArrayLiteral<()>) -> Expression<TypeInformation> {
        match array {
            ArrayLiteral::List {
                elements,
                position,
                id,
                ..
            } => {
                let element_var = self.ctx.fresh_var();
                let checked: Vec<_> = elements
                    .iter()
                    .map(|element| {
                        let checked = self.check_expression(element);
                        self.unify_or_report(
                            &element_var,
                            &value_type(&checked),
                            element.position(),
                        );
                        checked
                    })
                    .collect();
                let length = checked.len() as u64;
                Expression::Array(ArrayLiteral::List {
                    elements: checked,
                    info: self.info(Type::Array(Box::new(element_var), length)),
                    position: *position,
                    id: *id,
                })
            }
            ArrayLiteral::Repeat {
                value,
                length,
                position,
                id,
                ..
            } => {
                let checked_value = self.check_expression(value);
                let checked_length = self.check_expression(length);
                let length_var = self.ctx.fresh_int_var();
                self.unify_or_report(
                    &length_var,
                    &value_type(&checked_length),
                    length.position(),
                );
                let count = match &**length {
                    Expression::Literal(Literal {
                        value: LiteralValue::Int { value, .. },
                        ..
                    }) => *value as u64,
                    _ => {
                        self.session.emit(crate::diagnostics::Diagnostic::error(
                            "E0216",
                            "array length must be an integer literal",
                            length.position(),
                        ));
                        0
                    }
                };
                let element = value_type(&checked_value);
                Expression::Array(ArrayLiteral::Repeat {
                    value: Box::new(checked_value),
                    length: Box::new(checked_length),
                    info: self.info(Type::Array(Box::new(element), count)),
                    position: *position,
                    id: *id,
                })
            }
        }
    }

    fn check_struct_init(&mut self, init: &StructInit<()>) -> Expression<TypeInformation> {
        let name = init.name.last().to_string();
        let Some(def) = self.ctx.definitions.get_type(&name) else {
            self.report(TypeCheckError::UndefinedType(
                UndefinedType {
                    type_name: TypeName::plain(&name, init.name.position),
                },
                init.name.position,
            ));
            return Expression::Error(init.position, init.id);
        };
        let TypeDefKind::Struct(struct_def) = def.kind.clone() else {
            self.report(TypeCheckError::UndefinedType(
                UndefinedType {
                    type_name: TypeName::plain(&name, init.name.position),
                },
                init.name.position,
            ));
            return Expression::Error(init.position, init.id);
        };

        let mut mapping = std::collections::HashMap::new();
        let mut args = vec![];
        for (index, generic) in def.generics.iter().enumerate() {
            let arg = match init.name.type_args.get(index) {
                Some(explicit) => self.convert_type(explicit),
                None => self.ctx.fresh_var(),
            };
            mapping.insert(generic.clone(), arg.clone());
            args.push(arg);
        }

        let mut seen: Vec<&str> = vec![];
        let fields: Vec<_> = init
            .fields
            .iter()
            .map(|field| {
                let value = self.check_expression(&field.value);
                match struct_def.field_type(&field.name.name) {
                    Some(field_type) => {
                        let expected = field_type.substitute(&mapping);
                        self.unify_or_report(&expected, &value_type(&value), field.position);
                    }
                    None => {
                        self.report(TypeCheckError::UnknownField(
                            UnknownField {
                                receiver: Type::named(&name),
                                field: field.name.name.clone(),
                            },
                            field.name.position,
                        ));
                    }
                }
                seen.push(&field.name.name);
                FieldInit {
                    name: Ident {
                        name: field.name.name.clone(),
                        info: self.info(value_type(&value)),
                        position: field.name.position,
                        id: field.name.id,
                    },
                    value,
                    position: field.position,
                }
            })
            .collect();

        let missing: Vec<String> = struct_def
            .fields
            .iter()
            .filter(|(field_name, _, _)| !seen.contains(&field_name.as_str()))
            .map(|(field_name, _, _)| field_name.clone())
            .collect();
        if !missing.is_empty() {
            self.session.emit(crate::diagnostics::Diagnostic::error(
                "E0217",
                format!(
                    "missing field(s) {} in initializer of `{name}`",
                    missing.join(", ")
                ),
                init.position,
            ));
        }

        let type_id = Type::Named { name, args };
        Expression::StructInit(StructInit {
            name: Path {
                segments: init.name.segments.clone(),
                type_args: init.name.type_args.clone(),
                info: self.info(type_id.clone()),
                position: init.name.position,
                id: init.name.id,
            },
            fields,
            info: self.info(type_id),
            position: init.position,
            id: init.id,
        })
    }

    fn check_if(&mut self, if_expr: &IfExpr<()>) -> Expression<TypeInformation> {
        let condition =
            self.check_expression_expecting(&if_expr.condition, &Type::Boolean);
        let then_branch = self.check_expression(&if_expr.then_branch);
        let then_type = value_type(&then_branch);

        let (else_branch, type_id) = match &if_expr.else_branch {
            Some(else_expression) => {
                let else_branch = self.check_expression(else_expression);
                let else_type = value_type(&else_branch);
                self.unify_or_report(&then_type, &else_type, else_expression.position());
                (Some(else_branch), then_type)
            }
            None => (None, Type::Unit),
        };

        Expression::If(Box::new(IfExpr {
            condition,
            then_branch,
            else_branch,
            expression_form: if_expr.expression_form,
            info: self.info(type_id),
            position: if_expr.position,
            id: if_expr.id,
        }))
    }

    fn check_when(&mut self, when: &WhenExpr<()>) -> Expression<TypeInformation> {
        let scrutinee = self.check_expression(&when.scrutinee);
        let scrutinee_type = value_type(&scrutinee);
        let result_var = self.ctx.fresh_var();

        let arms: Vec<_> = when
            .arms
            .iter()
            .map(|arm| {
                self.ctx.scope.enter();
                let pattern = self.check_pattern(&arm.pattern, &scrutinee_type);
                let value = self.check_expression(&arm.value);
                self.unify_or_report(&result_var, &value_type(&value), arm.value.position());
                self.ctx.scope.exit();
                WhenArm {
                    pattern,
                    value,
                    position: arm.position,
                }
            })
            .collect();

        let resolved_scrutinee = self.ctx.zonk(&scrutinee_type);
        super::exhaustive::check_exhaustiveness(
            self.session,
            &self.ctx,
            &resolved_scrutinee,
            &arms,
            when.position,
        );

        Expression::When(Box::new(WhenExpr {
            scrutinee,
            arms,
            info: self.info(result_var),
            position: when.position,
            id: when.id,
        }))
    }

    fn check_closure(&mut self, closure: &Closure<()>) -> Expression<TypeInformation> {
        self.ctx.scope.enter();
        let parameters: Vec<_> = closure
            .parameters
            .iter()
            .map(|parameter| {
                let type_id = match &parameter.type_annotation {
                    Some(annotation) => self.convert_type(annotation),
                    None => self.ctx.fresh_var(),
                };
                if let Err(err) = self.ctx.scope.add_variable(
                    &parameter.name.name,
                    type_id.clone(),
                    false,
                    parameter.name.position,
                ) {
                    self.report(TypeCheckError::RedefinedVariable(
                        RedefinedVariable { name: err.name },
                        parameter.name.position,
                    ));
                }
                ClosureParameter {
                    name: Ident {
                        name: parameter.name.name.clone(),
                        info: self.info(type_id),
                        position: parameter.name.position,
                        id: parameter.name.id,
                    },
                    type_annotation: parameter.type_annotation.clone(),
                    position: parameter.position,
                }
            })
            .collect();

        let body = self.check_expression(&closure.body);
        self.ctx.scope.exit();

        let type_id = Type::Function {
            params: parameters.iter().map(|p| p.name.info.resolved()).collect(),
            return_value: Box::new(value_type(&body)),
            effects: crate::effects::EffectRow::pure(),
        };

        Expression::Closure(Box::new(Closure {
            parameters,
            body,
            transfer: closure.transfer,
            info: self.info(type_id),
            position: closure.position,
            id: closure.id,
        }))
    }

    fn check_range(&mut self, range: &RangeExpr<()>) -> Expression<TypeInformation> {
        let low = self.check_expression(&range.low);
        let high = self.check_expression(&range.high);
        let element = self.ctx.fresh_int_var();
        self.unify_or_report(&element, &value_type(&low), range.low.position());
        self.unify_or_report(&element, &value_type(&high), range.high.position());
        let type_id = Type::Named {
            name: "Range".into(),
            args: vec![element],
        };
        Expression::Range(Box::new(RangeExpr {
            low,
            high,
            inclusive: range.inclusive,
            info: self.info(type_id),
            position: range.position,
            id: range.id,
        }))
    }

    fn check_propagate(&mut self, propagate: &Propagate<()>) -> Expression<TypeInformation> {
        let target = self.check_expression(&propagate.target);
        let target_type = self.ctx.shape_of(&value_type(&target));

        let type_id = match &target_type {
            Type::Named { name, args }
                if (name == "Maybe" || name == "Result") && !args.is_empty() =>
            {
                // The enclosing function must return the same fallible
                // constructor for the early exit to type-check.
                let return_shape = self
                    .return_types
                    .last()
                    .map(|t| self.ctx.shape_of(t))
                    .unwrap_or(Type::Error);
                let compatible = matches!(
                    &return_shape,
                    Type::Named { name: ret_name, .. } if ret_name == name
                );
                if !compatible && !return_shape.is_error() {
                    self.report(TypeCheckError::TypeMismatch(
                        TypeMismatch {
                            expected: target_type.clone(),
                            actual: return_shape,
                        },
                        propagate.position,
                    ));
                }
                args[0].clone()
            }
            Type::Error => Type::Error,
            other => {
                self.session.emit(crate::diagnostics::Diagnostic::error(
                    "E0218",
                    format!("`!` needs a `Maybe[…]` or `Result[…]` value, found `{other}`"),
                    propagate.position,
                ));
                Type::Error
            }
        };

        Expression::Propagate(Box::new(Propagate {
            target,
            info: self.info(type_id),
            position: propagate.position,
            id: propagate.id,
        }))
    }

    fn check_cast(&mut self, cast: &Cast<()>) -> Expression<TypeInformation> {
        let value = self.check_expression(&cast.value);
        let target_type = self.convert_type(&cast.target);
        let source = self.ctx.zonk(&value_type(&value));

        let source_numeric = matches!(
            self.ctx.shape_of(&source),
            Type::Int(_) | Type::Float(_) | Type::Var(_) | Type::Character
        );
        let target_numeric = matches!(
            self.ctx.shape_of(&target_type),
            Type::Int(_) | Type::Float(_) | Type::Character
        );
        if (!source_numeric || !target_numeric) && !source.is_error() && !target_type.is_error() {
            self.report(TypeCheckError::InvalidCast(
                InvalidCast {
                    from: source,
                    to: target_type.clone(),
                },
                cast.position,
            ));
        }

        Expression::Cast(Box::new(Cast {
            value,
            target: cast.target.clone(),
            info: self.info(target_type),
            position: cast.position,
            id: cast.id,
        }))
    }

    fn current_module_key(&self) -> String {
        self.current_module.clone()
    }
}

fn suffix_type(suffix: NumSuffix) -> Type {
    match suffix {
        NumSuffix::I8 => Type::Int(IntKind::I8),
        NumSuffix::I16 => Type::Int(IntKind::I16),
        NumSuffix::I32 => Type::Int(IntKind::I32),
        NumSuffix::I64 => Type::Int(IntKind::I64),
        NumSuffix::I128 => Type::Int(IntKind::I128),
        NumSuffix::U8 => Type::Int(IntKind::U8),
        NumSuffix::U16 => Type::Int(IntKind::U16),
        NumSuffix::U32 => Type::Int(IntKind::U32),
        NumSuffix::U64 => Type::Int(IntKind::U64),
        NumSuffix::U128 => Type::Int(IntKind::U128),
        NumSuffix::F32 => Type::Float(FloatKind::F32),
        NumSuffix::F64 => Type::Float(FloatKind::F64),
    }
}
