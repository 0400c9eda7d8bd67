//! Borrow regions and conflict detection.
//!
//! Liveness is non-lexical: a borrow's region runs from its creation
//! point to the last use of any binding holding it, not to scope end.
//! Borrows live at the head of a loop body are extended to the loop's
//! end, which models the backedge: a conflicting use later in the same
//! iteration is a conflict on the next one.

use crate::source::Span;

/// One recorded use of a binding, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseEvent {
    pub point: u32,
    pub span: Span,
    pub kind: UseKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseKind {
    Read,
    Write,
    Move,
}

/// A borrow of `root` (a binding index) through an optional field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowRecord {
    pub root: usize,
    /// Field path from the root; `x.a.b` borrows carry `["a", "b"]`.
    /// Disjoint paths do not conflict.
    pub path: Vec<String>,
    pub mutable: bool,
    pub created_point: u32,
    pub created_span: Span,
    pub last_use_point: u32,
}

impl BorrowRecord {
    fn region_overlaps(&self, other: &BorrowRecord) -> bool {
        self.created_point <= other.last_use_point && other.created_point <= self.last_use_point
    }

    /// `x.a` and `x.a.b` overlap; `x.a` and `x.b` do not.
    fn path_overlaps(&self, other: &BorrowRecord) -> bool {
        let shared = self.path.len().min(other.path.len());
        self.path[..shared] == other.path[..shared]
    }
}

/// Extend regions across loop backedges: a borrow created before a loop
/// and last used inside it stays live to the loop's end.
pub fn expand_for_loops(borrows: &mut [BorrowRecord], loop_regions: &[(u32, u32)]) {
    for borrow in borrows {
        for (start, end) in loop_regions {
            if borrow.created_point < *start
                && borrow.last_use_point >= *start
                && borrow.last_use_point <= *end
            {
                borrow.last_use_point = *end;
            }
        }
    }
}

/// A pairwise borrow conflict, reported by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Two exclusive borrows overlap; `.0` is the earlier one.
    DoubleExclusive { first: usize, second: usize },
    /// A shared borrow overlaps an exclusive one; `.0` is the exclusive.
    SharedVsExclusive { exclusive: usize, other: usize },
}

/// Find all pairwise conflicts between live borrow regions of the same
/// root along overlapping paths.
pub fn find_conflicts(borrows: &[BorrowRecord]) -> Vec<Conflict> {
    let mut conflicts = vec![];
    for (i, a) in borrows.iter().enumerate() {
        for (j, b) in borrows.iter().enumerate().skip(i + 1) {
            if a.root != b.root || !a.path_overlaps(b) || !a.region_overlaps(b) {
                continue;
            }
            match (a.mutable, b.mutable) {
                (true, true) => conflicts.push(Conflict::DoubleExclusive { first: i, second: j }),
                (true, false) => {
                    conflicts.push(Conflict::SharedVsExclusive { exclusive: i, other: j })
                }
                (false, true) => {
                    conflicts.push(Conflict::SharedVsExclusive { exclusive: j, other: i })
                }
                (false, false) => {}
            }
        }
    }
    conflicts
}

/// Uses of the owner that land strictly inside an exclusive borrow's
/// region suspend the owner and are rejected. The borrow's own creation
/// point is exempt.
pub fn owner_uses_during<'e>(
    borrow: &BorrowRecord,
    events: &'e [UseEvent],
) -> Vec<&'e UseEvent> {
    events
        .iter()
        .filter(|event| {
            event.point > borrow.created_point && event.point <= borrow.last_use_point
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn borrow(root: usize, mutable: bool, created: u32, last: u32) -> BorrowRecord {
        BorrowRecord {
            root,
            path: vec![],
            mutable,
            created_point: created,
            created_span: Span::default(),
            last_use_point: last,
        }
    }

    #[test]
    fn test_shared_borrows_never_conflict() {
        let borrows = vec![borrow(0, false, 1, 10), borrow(0, false, 2, 9)];
        assert!(find_conflicts(&borrows).is_empty());
    }

    #[test]
    fn test_exclusive_then_shared_conflicts() {
        let borrows = vec![borrow(0, true, 1, 10), borrow(0, false, 5, 6)];
        assert_eq!(
            find_conflicts(&borrows),
            vec![Conflict::SharedVsExclusive {
                exclusive: 0,
                other: 1
            }]
        );
    }

    #[test]
    fn test_non_overlapping_regions_do_not_conflict() {
        // NLL: the first exclusive borrow's last use precedes the second.
        let borrows = vec![borrow(0, true, 1, 3), borrow(0, true, 5, 8)];
        assert!(find_conflicts(&borrows).is_empty());
    }

    #[test]
    fn test_disjoint_field_paths_do_not_conflict() {
        let mut a = borrow(0, true, 1, 10);
        a.path = vec!["left".to_string()];
        let mut b = borrow(0, true, 2, 9);
        b.path = vec!["right".to_string()];
        assert!(find_conflicts(&[a, b]).is_empty());
    }

    #[test]
    fn test_nested_field_path_conflicts() {
        let mut a = borrow(0, true, 1, 10);
        a.path = vec!["left".to_string()];
        let mut b = borrow(0, false, 2, 9);
        b.path = vec!["left".to_string(), "inner".to_string()];
        assert_eq!(find_conflicts(&[a, b]).len(), 1);
    }

    #[test]
    fn test_loop_expansion_extends_region() {
        let mut borrows = vec![borrow(0, false, 1, 6)];
        // Loop body spans points 5..=20; the borrow is used at 6.
        expand_for_loops(&mut borrows, &[(5, 20)]);
        assert_eq!(borrows[0].last_use_point, 20);
    }
}
