//! Ownership and borrow violation diagnostics.

use std::error::Error;
use std::fmt::Display;

use crate::diagnostics::Diagnostic;
use crate::source::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    UseAfterMove(UseAfterMove, Span),
    DoubleBorrow(DoubleBorrow, Span),
    ExclusiveAliased(ExclusiveAliased, Span),
    MutableAliasing(MutableAliasing, Span),
    LifetimeTooShort(LifetimeTooShort, Span),
    DanglingReturn(DanglingReturn, Span),
    EscapingReference(EscapingReference, Span),
}

impl OwnershipError {
    pub fn span(&self) -> Span {
        match self {
            OwnershipError::UseAfterMove(_, span)
            | OwnershipError::DoubleBorrow(_, span)
            | OwnershipError::ExclusiveAliased(_, span)
            | OwnershipError::MutableAliasing(_, span)
            | OwnershipError::LifetimeTooShort(_, span)
            | OwnershipError::DanglingReturn(_, span)
            | OwnershipError::EscapingReference(_, span) => *span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OwnershipError::UseAfterMove(..) => "E-MOVE-USE-AFTER",
            OwnershipError::DoubleBorrow(..) => "E-BORROW-DOUBLE-EXCLUSIVE",
            OwnershipError::ExclusiveAliased(..) => "E-BORROW-EXCLUSIVE-ALIASED",
            OwnershipError::MutableAliasing(..) => "E-BORROW-OWNER-SUSPENDED",
            OwnershipError::LifetimeTooShort(..) => "E-BORROW-LIFETIME-SHORT",
            OwnershipError::DanglingReturn(..) => "E-BORROW-DANGLING-RETURN",
            OwnershipError::EscapingReference(..) => "E-BORROW-ESCAPING",
        }
    }

    fn message(&self) -> String {
        match self {
            OwnershipError::UseAfterMove(e, _) => e.to_string(),
            OwnershipError::DoubleBorrow(e, _) => e.to_string(),
            OwnershipError::ExclusiveAliased(e, _) => e.to_string(),
            OwnershipError::MutableAliasing(e, _) => e.to_string(),
            OwnershipError::LifetimeTooShort(e, _) => e.to_string(),
            OwnershipError::DanglingReturn(e, _) => e.to_string(),
            OwnershipError::EscapingReference(e, _) => e.to_string(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.code(), self.message(), self.span());
        match self {
            OwnershipError::UseAfterMove(e, _) => {
                diagnostic.with_label(e.moved_at, format!("`{}` moved here", e.name))
            }
            OwnershipError::ExclusiveAliased(e, _) => {
                diagnostic.with_label(e.first_borrow, "exclusive borrow taken here")
            }
            OwnershipError::DoubleBorrow(e, _) => {
                diagnostic.with_label(e.first_borrow, "first exclusive borrow taken here")
            }
            OwnershipError::MutableAliasing(e, _) => {
                diagnostic.with_label(e.borrow_at, "exclusive borrow still live here")
            }
            OwnershipError::DanglingReturn(e, _) => diagnostic.with_suggestion(
                e.local_declared,
                String::new(),
                format!("return `{}` by value instead of by reference", e.name),
            ),
            _ => diagnostic,
        }
    }
}

impl Display for OwnershipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl Error for OwnershipError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseAfterMove {
    pub name: String,
    pub moved_at: Span,
}

impl Display for UseAfterMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("use of moved value `{}`", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubleBorrow {
    pub name: String,
    pub first_borrow: Span,
}

impl Display for DoubleBorrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "cannot take a second exclusive borrow of `{}` while the first is live",
            self.name
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusiveAliased {
    pub name: String,
    pub first_borrow: Span,
}

impl Display for ExclusiveAliased {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "cannot borrow `{}` while it is exclusively borrowed",
            self.name
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableAliasing {
    pub name: String,
    pub borrow_at: Span,
}

impl Display for MutableAliasing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "cannot use `{}` while it is exclusively borrowed",
            self.name
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifetimeTooShort {
    pub name: String,
}

impl Display for LifetimeTooShort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "borrow of `{}` outlives the value it points to",
            self.name
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReturn {
    pub name: String,
    pub local_declared: Span,
}

impl Display for DanglingReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "returning a reference to local `{}`, which is dropped when the function ends",
            self.name
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapingReference {
    pub name: String,
}

impl Display for EscapingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "closure captures `{}` by reference but outlives it; capture by `transfer` instead",
            self.name
        ))
    }
}
