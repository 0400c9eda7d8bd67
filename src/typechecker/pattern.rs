//! Pattern checking: each pattern is checked against the scrutinee type,
//! binding its binders into the current (arm) scope.

use crate::parser::ast::*;

use super::behavior::TypeDefKind;
use super::error::*;
use super::types::Type;
use super::{TypeChecker, TypeInformation};

impl<'a> TypeChecker<'a> {
    pub(crate) fn check_pattern(
        &mut self,
        pattern: &Pattern<()>,
        expected: &Type,
    ) -> Pattern<TypeInformation> {
        match pattern {
            Pattern::Wildcard(wildcard) => Pattern::Wildcard(WildcardPattern {
                info: self.info(expected.clone()),
                position: wildcard.position,
                id: wildcard.id,
            }),
            Pattern::Literal(literal) => {
                let literal_type = self.pattern_const_type(&literal.value);
                self.unify_or_report(expected, &literal_type, literal.position);
                Pattern::Literal(LiteralPattern {
                    value: literal.value.clone(),
                    info: self.info(literal_type),
                    position: literal.position,
                    id: literal.id,
                })
            }
            Pattern::Binding(binding) => {
                if let Err(err) = self.ctx.scope.add_variable(
                    &binding.name.name,
                    expected.clone(),
                    false,
                    binding.name.position,
                ) {
                    self.report(TypeCheckError::RedefinedVariable(
                        RedefinedVariable { name: err.name },
                        binding.name.position,
                    ));
                }
                Pattern::Binding(BindingPattern {
                    name: Ident {
                        name: binding.name.name.clone(),
                        info: self.info(expected.clone()),
                        position: binding.name.position,
                        id: binding.name.id,
                    },
                    id: binding.id,
                })
            }
            Pattern::Range(range) => {
                let low_type = self.pattern_const_type(&range.low);
                let high_type = self.pattern_const_type(&range.high);
                self.unify_or_report(expected, &low_type, range.position);
                self.unify_or_report(expected, &high_type, range.position);
                Pattern::Range(RangePattern {
                    low: range.low.clone(),
                    high: range.high.clone(),
                    inclusive: range.inclusive,
                    info: self.info(low_type),
                    position: range.position,
                    id: range.id,
                })
            }
            Pattern::EnumVariant(variant) => self.check_variant_pattern(variant, expected),
            Pattern::Tuple(tuple) => {
                let shape = self.ctx.shape_of(expected);
                let element_types = match shape.peel_references() {
                    Type::Tuple(elements) if elements.len() == tuple.elements.len() => {
                        elements.clone()
                    }
                    Type::Error => vec![Type::Error; tuple.elements.len()],
                    other => {
                        self.report(TypeCheckError::TypeMismatch(
                            TypeMismatch {
                                expected: other.clone(),
                                actual: Type::Tuple(vec![Type::Error; tuple.elements.len()]),
                            },
                            tuple.position,
                        ));
                        vec![Type::Error; tuple.elements.len()]
                    }
                };
                let elements: Vec<_> = tuple
                    .elements
                    .iter()
                    .zip(&element_types)
                    .map(|(sub, sub_type)| self.check_pattern(sub, sub_type))
                    .collect();
                Pattern::Tuple(TuplePattern {
                    elements,
                    info: self.info(expected.clone()),
                    position: tuple.position,
                    id: tuple.id,
                })
            }
            Pattern::Struct(struct_pattern) => self.check_struct_pattern(struct_pattern, expected),
            Pattern::Array(array) => {
                let shape = self.ctx.shape_of(expected);
                let element = match shape.peel_references() {
                    Type::Array(element, _) | Type::Slice(element) => *element.clone(),
                    Type::Error => Type::Error,
                    other => {
                        self.report(TypeCheckError::TypeMismatch(
                            TypeMismatch {
                                expected: other.clone(),
                                actual: Type::Slice(Box::new(Type::Error)),
                            },
                            array.position,
                        ));
                        Type::Error
                    }
                };
                let elements: Vec<_> = array
                    .elements
                    .iter()
                    .map(|sub| self.check_pattern(sub, &element))
                    .collect();
                let rest = array.rest.as_ref().map(|rest| {
                    let rest_type = Type::Slice(Box::new(element.clone()));
                    if let Err(err) = self.ctx.scope.add_variable(
                        &rest.name,
                        rest_type.clone(),
                        false,
                        rest.position,
                    ) {
                        self.report(TypeCheckError::RedefinedVariable(
                            RedefinedVariable { name: err.name },
                            rest.position,
                        ));
                    }
                    Ident {
                        name: rest.name.clone(),
                        info: self.info(rest_type),
                        position: rest.position,
                        id: rest.id,
                    }
                });
                Pattern::Array(ArrayPattern {
                    elements,
                    rest,
                    info: self.info(expected.clone()),
                    position: array.position,
                    id: array.id,
                })
            }
            Pattern::Or(or) => {
                // The first alternative introduces the binders; the rest
                // are checked in throwaway scopes so the shared names do
                // not collide, while their types still unify through the
                // expected type.
                let mut alternatives = vec![];
                for (index, alternative) in or.alternatives.iter().enumerate() {
                    if index == 0 {
                        alternatives.push(self.check_pattern(alternative, expected));
                    } else {
                        self.ctx.scope.enter();
                        alternatives.push(self.check_pattern(alternative, expected));
                        self.ctx.scope.exit();
                    }
                }
                Pattern::Or(OrPattern {
                    alternatives,
                    info: self.info(expected.clone()),
                    position: or.position,
                    id: or.id,
                })
            }
        }
    }

    fn pattern_const_type(&mut self, value: &PatternConst) -> Type {
        match value {
            PatternConst::Int(_) => self.ctx.fresh_int_var(),
            PatternConst::Float(_) => self.ctx.fresh_float_var(),
            PatternConst::Bool(_) => Type::Boolean,
            PatternConst::Char(_) => Type::Character,
            PatternConst::Str(_) => Type::String,
        }
    }

    fn check_variant_pattern(
        &mut self,
        variant: &EnumVariantPattern<()>,
        expected: &Type,
    ) -> Pattern<TypeInformation> {
        let shape = self.ctx.shape_of(expected);
        let variant_name = variant.path.last().to_string();

        let poisoned = |checker: &mut Self, payload: Vec<Pattern<TypeInformation>>| {
            Pattern::EnumVariant(EnumVariantPattern {
                path: Path {
                    segments: variant.path.segments.clone(),
                    type_args: variant.path.type_args.clone(),
                    info: checker.info(Type::Error),
                    position: variant.path.position,
                    id: variant.path.id,
                },
                payload,
                has_parens: variant.has_parens,
                info: checker.info(Type::Error),
                position: variant.position,
                id: variant.id,
            })
        };

        let Type::Named { name, args } = shape.peel_references() else {
            if !shape.is_error() {
                self.report(TypeCheckError::TypeMismatch(
                    TypeMismatch {
                        expected: shape.clone(),
                        actual: Type::named(variant_name),
                    },
                    variant.position,
                ));
            }
            let payload = variant
                .payload
                .iter()
                .map(|sub| self.check_pattern(sub, &Type::Error))
                .collect();
            return poisoned(self, payload);
        };

        let Some(def) = self.ctx.definitions.get_type(name) else {
            let payload = variant
                .payload
                .iter()
                .map(|sub| self.check_pattern(sub, &Type::Error))
                .collect();
            return poisoned(self, payload);
        };
        let TypeDefKind::Enum(enum_def) = &def.kind else {
            self.report(TypeCheckError::TypeMismatch(
                TypeMismatch {
                    expected: shape.clone(),
                    actual: Type::named(variant_name),
                },
                variant.position,
            ));
            let payload = variant
                .payload
                .iter()
                .map(|sub| self.check_pattern(sub, &Type::Error))
                .collect();
            return poisoned(self, payload);
        };

        let mut mapping = std::collections::HashMap::new();
        for (generic, arg) in def.generics.iter().zip(args) {
            mapping.insert(generic.clone(), arg.clone());
        }

        let Some(payload_types) = enum_def.payload_of(&variant_name) else {
            self.report(TypeCheckError::UndefinedVariable(
                UndefinedVariable {
                    name: format!("{name}::{variant_name}"),
                },
                variant.position,
            ));
            let payload = variant
                .payload
                .iter()
                .map(|sub| self.check_pattern(sub, &Type::Error))
                .collect();
            return poisoned(self, payload);
        };
        let payload_types: Vec<Type> = payload_types
            .iter()
            .map(|t| t.substitute(&mapping))
            .collect();

        if payload_types.len() != variant.payload.len() {
            self.report(TypeCheckError::WrongArgumentCount(
                WrongArgumentCount {
                    expected: payload_types.len(),
                    actual: variant.payload.len(),
                },
                variant.position,
            ));
        }

        let payload: Vec<_> = variant
            .payload
            .iter()
            .enumerate()
            .map(|(index, sub)| {
                let sub_type = payload_types.get(index).cloned().unwrap_or(Type::Error);
                self.check_pattern(sub, &sub_type)
            })
            .collect();

        Pattern::EnumVariant(EnumVariantPattern {
            path: Path {
                segments: variant.path.segments.clone(),
                type_args: variant.path.type_args.clone(),
                info: self.info(expected.clone()),
                position: variant.path.position,
                id: variant.path.id,
            },
            payload,
            has_parens: variant.has_parens,
            info: self.info(expected.clone()),
            position: variant.position,
            id: variant.id,
        })
    }

    fn check_struct_pattern(
        &mut self,
        struct_pattern: &StructPattern<()>,
        expected: &Type,
    ) -> Pattern<TypeInformation> {
        let shape = self.ctx.shape_of(expected);
        let mut field_lookup = |checker: &mut Self, field: &str| -> Type {
            if let Type::Named { name, args } = shape.peel_references() {
                if let Some(def) = checker.ctx.definitions.get_type(name) {
                    if let TypeDefKind::Struct(struct_def) = &def.kind {
                        let mut mapping = std::collections::HashMap::new();
                        for (generic, arg) in def.generics.iter().zip(args) {
                            mapping.insert(generic.clone(), arg.clone());
                        }
                        if let Some(field_type) = struct_def.field_type(field) {
                            return field_type.substitute(&mapping);
                        }
                        checker.report(TypeCheckError::UnknownField(
                            UnknownField {
                                receiver: shape.clone(),
                                field: field.to_string(),
                            },
                            struct_pattern.position,
                        ));
                    }
                }
            }
            Type::Error
        };

        let fields: Vec<_> = struct_pattern
            .fields
            .iter()
            .map(|field| {
                let field_type = field_lookup(self, &field.name.name);
                let pattern = self.check_pattern(&field.pattern, &field_type);
                StructPatternField {
                    name: Ident {
                        name: field.name.name.clone(),
                        info: self.info(field_type),
                        position: field.name.position,
                        id: field.name.id,
                    },
                    pattern,
                    position: field.position,
                }
            })
            .collect();

        Pattern::Struct(StructPattern {
            name: Path {
                segments: struct_pattern.name.segments.clone(),
                type_args: struct_pattern.name.type_args.clone(),
                info: self.info(expected.clone()),
                position: struct_pattern.name.position,
                id: struct_pattern.name.id,
            },
            fields,
            has_rest: struct_pattern.has_rest,
            info: self.info(expected.clone()),
            position: struct_pattern.position,
            id: struct_pattern.id,
        })
    }
}
