//! Pattern exhaustiveness and reachability, matrix style.
//!
//! Patterns are lowered to a compact shape and analyzed with the usual
//! specialization algorithm: a pattern vector is useful if some value
//! matches it and none of the rows above. Exhaustiveness asks whether a
//! wildcard row is useful after all arms; the witness reconstructed on
//! the way up names an uncovered value. Integer columns are handled by
//! splitting the domain at every range boundary in the column, so each
//! atom behaves like a plain constructor.
//!
//! Floats, strings, chars and slices are opaque: only a wildcard or
//! binding covers them.

use crate::diagnostics::Diagnostic;
use crate::parser::ast::{Pattern, PatternConst, WhenArm};
use crate::session::Session;
use crate::source::Span;

use super::behavior::TypeDefKind;
use super::context::Context;
use super::error::{NonExhaustiveMatch, TypeCheckError};
use super::types::{IntKind, Type};
use super::TypeInformation;

#[derive(Debug, Clone, PartialEq)]
enum Pat {
    Wild,
    /// Enum variant, tuple (`"(tuple)"`) or struct (`"(struct)"`).
    Ctor { key: String, subs: Vec<Pat> },
    Bool(bool),
    /// Inclusive integer interval; single constants are `[n, n]`.
    IntRange { lo: i128, hi: i128 },
    /// Matched only by wildcards: floats, strings, chars, slices.
    Opaque,
}

/// Expand the cartesian product of per-slot alternatives into full
/// constructor patterns.
fn cartesian(key: &str, slots: &[Vec<Pat>]) -> Vec<Pat> {
    let mut combos: Vec<Vec<Pat>> = vec![vec![]];
    for slot in slots {
        let mut next = vec![];
        for combo in &combos {
            for alternative in slot {
                let mut extended = combo.clone();
                extended.push(alternative.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
        .into_iter()
        .map(|subs| Pat::Ctor {
            key: key.to_string(),
            subs,
        })
        .collect()
}

/// Lower a checked pattern to its alternatives; or-patterns (including
/// nested ones, via the cartesian product) multiply out here.
fn lower(pattern: &Pattern<TypeInformation>) -> Vec<Pat> {
    match pattern {
        Pattern::Wildcard(_) | Pattern::Binding(_) => vec![Pat::Wild],
        Pattern::Literal(literal) => vec![match &literal.value {
            PatternConst::Int(value) => Pat::IntRange {
                lo: *value,
                hi: *value,
            },
            PatternConst::Bool(value) => Pat::Bool(*value),
            PatternConst::Char(value) => Pat::IntRange {
                lo: *value as i128,
                hi: *value as i128,
            },
            PatternConst::Float(_) | PatternConst::Str(_) => Pat::Opaque,
        }],
        Pattern::Range(range) => {
            let endpoint = |value: &PatternConst| match value {
                PatternConst::Int(v) => Some(*v),
                PatternConst::Char(c) => Some(*c as i128),
                _ => None,
            };
            match (endpoint(&range.low), endpoint(&range.high)) {
                (Some(lo), Some(hi)) => {
                    let hi = if range.inclusive { hi } else { hi - 1 };
                    vec![Pat::IntRange { lo, hi }]
                }
                _ => vec![Pat::Opaque],
            }
        }
        Pattern::EnumVariant(variant) => {
            let slots: Vec<Vec<Pat>> = variant.payload.iter().map(lower).collect();
            cartesian(&variant.path.last().to_string(), &slots)
        }
        Pattern::Tuple(tuple) => {
            let slots: Vec<Vec<Pat>> = tuple.elements.iter().map(lower).collect();
            cartesian("(tuple)", &slots)
        }
        // Struct sub-patterns are aligned to field declaration order;
        // fields the pattern omits are wildcards.
        Pattern::Struct(struct_pattern) => {
            let ctx = &struct_pattern.info.context;
            let shape = ctx.shape_of(&struct_pattern.info.resolved());
            let declared: Vec<String> = match shape.peel_references() {
                Type::Named { name, .. } => ctx
                    .definitions
                    .get_type(name)
                    .and_then(|def| match def.kind {
                        TypeDefKind::Struct(s) => {
                            Some(s.fields.iter().map(|(n, _, _)| n.clone()).collect())
                        }
                        _ => None,
                    })
                    .unwrap_or_default(),
                _ => vec![],
            };
            let slots: Vec<Vec<Pat>> = declared
                .iter()
                .map(|field_name| {
                    struct_pattern
                        .fields
                        .iter()
                        .find(|f| &f.name.name == field_name)
                        .map(|f| lower(&f.pattern))
                        .unwrap_or_else(|| vec![Pat::Wild])
                })
                .collect();
            cartesian("(struct)", &slots)
        }
        Pattern::Array(_) => vec![Pat::Opaque],
        Pattern::Or(or) => or.alternatives.iter().flat_map(lower).collect(),
    }
}

/// Payload types of a constructor in a column of the given type.
fn ctor_field_types(ctx: &Context, column_type: &Type, key: &str) -> Vec<Type> {
    match ctx.shape_of(column_type).peel_references() {
        Type::Tuple(elements) => elements.clone(),
        Type::Named { name, args } => {
            let Some(def) = ctx.definitions.get_type(name) else {
                return vec![];
            };
            let mut mapping = std::collections::HashMap::new();
            for (generic, arg) in def.generics.iter().zip(args) {
                mapping.insert(generic.clone(), arg.clone());
            }
            match &def.kind {
                TypeDefKind::Enum(enum_def) => enum_def
                    .payload_of(key)
                    .map(|payload| payload.iter().map(|t| t.substitute(&mapping)).collect())
                    .unwrap_or_default(),
                TypeDefKind::Struct(struct_def) => struct_def
                    .fields
                    .iter()
                    .map(|(_, t, _)| t.substitute(&mapping))
                    .collect(),
                TypeDefKind::Alias(_) => vec![],
            }
        }
        _ => vec![],
    }
}

/// The full constructor set of a type, when it is finite and known.
fn complete_ctors(ctx: &Context, column_type: &Type) -> Option<Vec<String>> {
    match ctx.shape_of(column_type).peel_references() {
        Type::Boolean => Some(vec!["true".into(), "false".into()]),
        Type::Tuple(_) => Some(vec!["(tuple)".into()]),
        Type::Named { name, .. } => {
            let def = ctx.definitions.get_type(name)?;
            match &def.kind {
                TypeDefKind::Enum(enum_def) => Some(
                    enum_def
                        .variants
                        .iter()
                        .map(|(variant, _)| variant.clone())
                        .collect(),
                ),
                TypeDefKind::Struct(_) => Some(vec!["(struct)".into()]),
                TypeDefKind::Alias(_) => None,
            }
        }
        _ => None,
    }
}

fn int_domain(column_type: &Type) -> Option<(i128, i128)> {
    match column_type {
        Type::Int(kind) => Some(match kind {
            IntKind::I8 => (i8::MIN as i128, i8::MAX as i128),
            IntKind::I16 => (i16::MIN as i128, i16::MAX as i128),
            IntKind::I32 => (i32::MIN as i128, i32::MAX as i128),
            IntKind::I64 => (i64::MIN as i128, i64::MAX as i128),
            // The checker works in i128; the open end of the widest
            // domains is unreachable by literal patterns anyway.
            IntKind::I128 => (i128::MIN, i128::MAX),
            IntKind::U8 => (0, u8::MAX as i128),
            IntKind::U16 => (0, u16::MAX as i128),
            IntKind::U32 => (0, u32::MAX as i128),
            IntKind::U64 => (0, u64::MAX as i128),
            IntKind::U128 => (0, i128::MAX),
        }),
        Type::Character => Some((0, char::MAX as i128)),
        _ => None,
    }
}

/// Split the column's integer domain at every boundary occurring in it,
/// yielding atoms no range partially overlaps.
fn int_atoms(column: &[&Pat], domain: (i128, i128)) -> Vec<(i128, i128)> {
    let mut cuts = vec![domain.0, domain.1.saturating_add(1)];
    for pat in column {
        if let Pat::IntRange { lo, hi } = pat {
            cuts.push(*lo);
            cuts.push(hi.saturating_add(1));
        }
    }
    cuts.sort_unstable();
    cuts.dedup();
    cuts.retain(|c| *c >= domain.0 && *c <= domain.1.saturating_add(1));
    cuts.windows(2)
        .map(|window| (window[0], window[1] - 1))
        .filter(|(lo, hi)| lo <= hi)
        .collect()
}

struct Witness(Vec<String>);

fn render_ctor_witness(key: &str, arity: usize) -> String {
    if key == "(tuple)" {
        format!("({})", vec!["_"; arity].join(", "))
    } else if key == "(struct)" {
        "{ .. }".to_string()
    } else if arity == 0 {
        key.to_string()
    } else {
        format!("{key}({})", vec!["_"; arity].join(", "))
    }
}

/// Is `row` useful with respect to `matrix`? Returns a witness for the
/// values it newly covers.
fn useful(
    ctx: &Context,
    matrix: &[Vec<Pat>],
    row: &[Pat],
    types: &[Type],
) -> Option<Witness> {
    if row.is_empty() {
        return if matrix.is_empty() {
            Some(Witness(vec![]))
        } else {
            None
        };
    }
    let head_type = &types[0];

    match &row[0] {
        Pat::Ctor { key, subs } => {
            let field_types = ctor_field_types(ctx, head_type, key);
            let specialized = specialize(matrix, key, field_types.len());
            let mut new_row: Vec<Pat> = subs.clone();
            while new_row.len() < field_types.len() {
                new_row.push(Pat::Wild);
            }
            let mut new_types = field_types.clone();
            new_types.extend_from_slice(&types[1..]);
            new_row.extend_from_slice(&row[1..]);
            useful(ctx, &specialized, &new_row, &new_types).map(|Witness(mut parts)| {
                let subs: Vec<String> = parts.drain(..field_types.len()).collect();
                let rendered = if key == "(tuple)" {
                    format!("({})", subs.join(", "))
                } else if subs.is_empty() {
                    key.clone()
                } else {
                    format!("{key}({})", subs.join(", "))
                };
                let mut witness = vec![rendered];
                witness.extend(parts);
                Witness(witness)
            })
        }
        Pat::Bool(value) => {
            let specialized = specialize_bool(matrix, *value);
            let new_row = row[1..].to_vec();
            useful(ctx, &specialized, &new_row, &types[1..]).map(|Witness(parts)| {
                let mut witness = vec![value.to_string()];
                witness.extend(parts);
                Witness(witness)
            })
        }
        Pat::IntRange { lo, hi } => {
            // Split into atoms relative to the matrix column; the range
            // is useful if any atom inside it is.
            let column: Vec<&Pat> = matrix.iter().map(|r| &r[0]).collect();
            let atoms = int_atoms(&column, (*lo, *hi));
            for (atom_lo, atom_hi) in atoms {
                let specialized = specialize_int(matrix, atom_lo, atom_hi);
                let new_row = row[1..].to_vec();
                if let Some(Witness(parts)) = useful(ctx, &specialized, &new_row, &types[1..]) {
                    let rendered = if atom_lo == atom_hi {
                        atom_lo.to_string()
                    } else {
                        format!("{atom_lo} through {atom_hi}")
                    };
                    let mut witness = vec![rendered];
                    witness.extend(parts);
                    return Some(Witness(witness));
                }
            }
            None
        }
        Pat::Opaque => {
            // Opaque values are only covered by wildcard rows.
            let defaulted = default_matrix(matrix);
            let new_row = row[1..].to_vec();
            useful(ctx, &defaulted, &new_row, &types[1..]).map(|Witness(parts)| {
                let mut witness = vec!["_".to_string()];
                witness.extend(parts);
                Witness(witness)
            })
        }
        Pat::Wild => {
            if let Some(ctors) = complete_ctors(ctx, head_type) {
                let present: Vec<&str> = matrix
                    .iter()
                    .filter_map(|r| match &r[0] {
                        Pat::Ctor { key, .. } => Some(key.as_str()),
                        Pat::Bool(true) => Some("true"),
                        Pat::Bool(false) => Some("false"),
                        _ => None,
                    })
                    .collect();
                let missing: Vec<&String> =
                    ctors.iter().filter(|c| !present.contains(&c.as_str())).collect();

                if missing.is_empty() {
                    // Every constructor appears; recurse through each.
                    for key in &ctors {
                        if *key == "true" || *key == "false" {
                            let specialized = specialize_bool(matrix, key == "true");
                            let new_row = row[1..].to_vec();
                            if let Some(Witness(parts)) =
                                useful(ctx, &specialized, &new_row, &types[1..])
                            {
                                let mut witness = vec![key.clone()];
                                witness.extend(parts);
                                return Some(Witness(witness));
                            }
                            continue;
                        }
                        let field_types = ctor_field_types(ctx, head_type, key);
                        let specialized = specialize(matrix, key, field_types.len());
                        let mut new_row = vec![Pat::Wild; field_types.len()];
                        let mut new_types = field_types.clone();
                        new_types.extend_from_slice(&types[1..]);
                        new_row.extend_from_slice(&row[1..]);
                        if let Some(Witness(mut parts)) =
                            useful(ctx, &specialized, &new_row, &new_types)
                        {
                            let subs: Vec<String> = parts.drain(..field_types.len()).collect();
                            let rendered = if key == "(tuple)" {
                                format!("({})", subs.join(", "))
                            } else if subs.is_empty() {
                                key.clone()
                            } else {
                                format!("{key}({})", subs.join(", "))
                            };
                            let mut witness = vec![rendered];
                            witness.extend(parts);
                            return Some(Witness(witness));
                        }
                    }
                    None
                } else {
                    // Some constructor never appears: the default matrix
                    // decides, and the missing constructor is the witness.
                    let defaulted = default_matrix(matrix);
                    let new_row = row[1..].to_vec();
                    useful(ctx, &defaulted, &new_row, &types[1..]).map(|Witness(parts)| {
                        let key = missing[0];
                        let arity = ctor_field_types(ctx, head_type, key).len();
                        let mut witness = vec![render_ctor_witness(key, arity)];
                        witness.extend(parts);
                        Witness(witness)
                    })
                }
            } else if let Some(domain) = int_domain(&ctx.shape_of(head_type)) {
                // A wildcard over an integer column is the full-domain
                // range; delegate to the range case.
                let mut as_range = row.to_vec();
                as_range[0] = Pat::IntRange {
                    lo: domain.0,
                    hi: domain.1,
                };
                useful(ctx, matrix, &as_range, types)
            } else {
                // Opaque column: only wildcard rows cover it.
                let defaulted = default_matrix(matrix);
                let new_row = row[1..].to_vec();
                useful(ctx, &defaulted, &new_row, &types[1..]).map(|Witness(parts)| {
                    let mut witness = vec!["_".to_string()];
                    witness.extend(parts);
                    Witness(witness)
                })
            }
        }
    }
}

/// Rows that match the given constructor, with the head expanded to its
/// sub-patterns.
fn specialize(matrix: &[Vec<Pat>], key: &str, arity: usize) -> Vec<Vec<Pat>> {
    let mut result = vec![];
    for row in matrix {
        match &row[0] {
            Pat::Ctor { key: row_key, subs } if row_key == key => {
                let mut new_row = subs.clone();
                while new_row.len() < arity {
                    new_row.push(Pat::Wild);
                }
                new_row.extend_from_slice(&row[1..]);
                result.push(new_row);
            }
            Pat::Wild => {
                let mut new_row = vec![Pat::Wild; arity];
                new_row.extend_from_slice(&row[1..]);
                result.push(new_row);
            }
            _ => {}
        }
    }
    result
}

fn specialize_bool(matrix: &[Vec<Pat>], value: bool) -> Vec<Vec<Pat>> {
    matrix
        .iter()
        .filter(|row| matches!(&row[0], Pat::Bool(v) if *v == value) || matches!(row[0], Pat::Wild))
        .map(|row| row[1..].to_vec())
        .collect()
}

/// Rows whose head covers the whole atom `[lo, hi]`.
fn specialize_int(matrix: &[Vec<Pat>], lo: i128, hi: i128) -> Vec<Vec<Pat>> {
    matrix
        .iter()
        .filter(|row| match &row[0] {
            Pat::Wild => true,
            Pat::IntRange { lo: row_lo, hi: row_hi } => *row_lo <= lo && hi <= *row_hi,
            _ => false,
        })
        .map(|row| row[1..].to_vec())
        .collect()
}

/// Rows whose head is a wildcard, with the head removed.
fn default_matrix(matrix: &[Vec<Pat>]) -> Vec<Vec<Pat>> {
    matrix
        .iter()
        .filter(|row| matches!(row[0], Pat::Wild))
        .map(|row| row[1..].to_vec())
        .collect()
}

/// Check a `when` for exhaustiveness and unreachable arms.
pub fn check_exhaustiveness(
    session: &Session,
    ctx: &Context,
    scrutinee: &Type,
    arms: &[WhenArm<TypeInformation>],
    span: Span,
) {
    if scrutinee.is_error() {
        return;
    }

    let mut matrix: Vec<Vec<Pat>> = vec![];
    for arm in arms {
        let lowered = lower(&arm.pattern);

        // Reachability: the arm must add coverage over the rows above.
        let reachable = lowered.iter().any(|pat| {
            useful(
                ctx,
                &matrix,
                std::slice::from_ref(pat),
                std::slice::from_ref(scrutinee),
            )
            .is_some()
        });
        if !reachable {
            session.emit(Diagnostic::warning(
                "E0209",
                "this pattern is unreachable; earlier arms cover it",
                arm.pattern.position(),
            ));
        }

        for pat in lowered {
            matrix.push(vec![pat]);
        }
    }

    if let Some(Witness(witnesses)) = useful(
        ctx,
        &matrix,
        &[Pat::Wild],
        std::slice::from_ref(scrutinee),
    ) {
        session.emit(
            TypeCheckError::NonExhaustiveMatch(
                NonExhaustiveMatch { witnesses },
                span,
            )
            .to_diagnostic(),
        );
    }
}
