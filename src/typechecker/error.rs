//! Type-checking error values. Each variant pairs a payload struct with
//! the offending span; [`TypeCheckError::to_diagnostic`] renders them
//! into the session's diagnostic format.

use std::error::Error;
use std::fmt::Display;

use crate::diagnostics::Diagnostic;
use crate::parser::ast::TypeName;
use crate::source::Span;

use super::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeCheckError {
    TypeMismatch(TypeMismatch, Span),
    UndefinedVariable(UndefinedVariable, Span),
    UndefinedType(UndefinedType, Span),
    RedefinedVariable(RedefinedVariable, Span),
    ImmutableReassign(ImmutableReassign, Span),
    UnresolvedMethod(UnresolvedMethod, Span),
    AmbiguousMethod(AmbiguousMethod, Span),
    UnsatisfiedConstraint(UnsatisfiedConstraint, Span),
    NonExhaustiveMatch(NonExhaustiveMatch, Span),
    UnreachablePattern(Span),
    AmbiguousInference(AmbiguousInference, Span),
    WrongArgumentCount(WrongArgumentCount, Span),
    NotCallable(NotCallable, Span),
    UnknownField(UnknownField, Span),
    InvalidCast(InvalidCast, Span),
}

impl TypeCheckError {
    pub fn span(&self) -> Span {
        match self {
            TypeCheckError::TypeMismatch(_, span)
            | TypeCheckError::UndefinedVariable(_, span)
            | TypeCheckError::UndefinedType(_, span)
            | TypeCheckError::RedefinedVariable(_, span)
            | TypeCheckError::ImmutableReassign(_, span)
            | TypeCheckError::UnresolvedMethod(_, span)
            | TypeCheckError::AmbiguousMethod(_, span)
            | TypeCheckError::UnsatisfiedConstraint(_, span)
            | TypeCheckError::NonExhaustiveMatch(_, span)
            | TypeCheckError::UnreachablePattern(span)
            | TypeCheckError::AmbiguousInference(_, span)
            | TypeCheckError::WrongArgumentCount(_, span)
            | TypeCheckError::NotCallable(_, span)
            | TypeCheckError::UnknownField(_, span)
            | TypeCheckError::InvalidCast(_, span) => *span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TypeCheckError::TypeMismatch(..) => "E0200",
            TypeCheckError::UndefinedVariable(..) => "E0201",
            TypeCheckError::UndefinedType(..) => "E0202",
            TypeCheckError::RedefinedVariable(..) => "E0203",
            TypeCheckError::ImmutableReassign(..) => "E0204",
            TypeCheckError::UnresolvedMethod(..) => "E0205",
            TypeCheckError::AmbiguousMethod(..) => "E0206",
            TypeCheckError::UnsatisfiedConstraint(..) => "E0207",
            TypeCheckError::NonExhaustiveMatch(..) => "E0208",
            TypeCheckError::UnreachablePattern(..) => "E0209",
            TypeCheckError::AmbiguousInference(..) => "E0210",
            TypeCheckError::WrongArgumentCount(..) => "E0211",
            TypeCheckError::NotCallable(..) => "E0212",
            TypeCheckError::UnknownField(..) => "E0213",
            TypeCheckError::InvalidCast(..) => "E0214",
        }
    }

    fn message(&self) -> String {
        match self {
            TypeCheckError::TypeMismatch(e, _) => e.to_string(),
            TypeCheckError::UndefinedVariable(e, _) => e.to_string(),
            TypeCheckError::UndefinedType(e, _) => e.to_string(),
            TypeCheckError::RedefinedVariable(e, _) => e.to_string(),
            TypeCheckError::ImmutableReassign(e, _) => e.to_string(),
            TypeCheckError::UnresolvedMethod(e, _) => e.to_string(),
            TypeCheckError::AmbiguousMethod(e, _) => e.to_string(),
            TypeCheckError::UnsatisfiedConstraint(e, _) => e.to_string(),
            TypeCheckError::NonExhaustiveMatch(e, _) => e.to_string(),
            TypeCheckError::UnreachablePattern(_) => "this pattern is unreachable".to_string(),
            TypeCheckError::AmbiguousInference(e, _) => e.to_string(),
            TypeCheckError::WrongArgumentCount(e, _) => e.to_string(),
            TypeCheckError::NotCallable(e, _) => e.to_string(),
            TypeCheckError::UnknownField(e, _) => e.to_string(),
            TypeCheckError::InvalidCast(e, _) => e.to_string(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code(), self.message(), self.span())
    }
}

impl Display for TypeCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl Error for TypeCheckError {}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    pub expected: Type,
    pub actual: Type,
}

impl Display for TypeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "expected type `{}` but found `{}`",
            self.expected, self.actual
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UndefinedVariable {
    pub name: String,
}

impl Display for UndefinedVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("unknown name `{}`", self.name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UndefinedType {
    pub type_name: TypeName,
}

impl Display for UndefinedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("unknown type `{}`", self.type_name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedefinedVariable {
    pub name: String,
}

impl Display for RedefinedVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "variable `{}` is already declared in this scope",
            self.name
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImmutableReassign {
    pub name: String,
}

impl Display for ImmutableReassign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "cannot reassign immutable binding `{}`; declare it with `let mut`",
            self.name
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedMethod {
    pub receiver: Type,
    pub name: String,
}

impl Display for UnresolvedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "no method `{}` on type `{}`",
            self.name, self.receiver
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguousMethod {
    pub receiver: Type,
    pub name: String,
    /// Behaviors that each provide the method.
    pub candidates: Vec<String>,
}

impl Display for AmbiguousMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "method `{}` on `{}` is ambiguous; candidates come from {}",
            self.name,
            self.receiver,
            self.candidates.join(", ")
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsatisfiedConstraint {
    pub param: String,
    pub bound: String,
    pub argument: Type,
    /// Methods the argument type is missing, when partially implemented.
    pub missing_methods: Vec<String>,
}

impl Display for UnsatisfiedConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "`{}` does not satisfy `{}: {}`",
            self.argument, self.param, self.bound
        )?;
        if !self.missing_methods.is_empty() {
            write!(f, " (missing {})", self.missing_methods.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NonExhaustiveMatch {
    /// Witness patterns no arm covers, rendered for the message.
    pub witnesses: Vec<String>,
}

impl Display for NonExhaustiveMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "`when` is not exhaustive; uncovered: {}",
            self.witnesses.join(", ")
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguousInference {
    pub description: String,
}

impl Display for AmbiguousInference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "cannot infer a unique type for {}; add an annotation",
            self.description
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrongArgumentCount {
    pub expected: usize,
    pub actual: usize,
}

impl Display for WrongArgumentCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "expected {} argument(s), found {}",
            self.expected, self.actual
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotCallable {
    pub actual: Type,
}

impl Display for NotCallable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("`{}` is not callable", self.actual))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownField {
    pub receiver: Type,
    pub field: String,
}

impl Display for UnknownField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "type `{}` has no field `{}`",
            self.receiver, self.field
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidCast {
    pub from: Type,
    pub to: Type,
}

impl Display for InvalidCast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "cannot cast `{}` to `{}`; only numeric casts are allowed",
            self.from, self.to
        ))
    }
}
