//! Composable, lazily evaluated queries over a [Table].
//!
//! A query is a small expression tree whose leaves are ranges over one
//! field index (or the whole table) and arbitrary predicates. Leaves combine
//! with [Query::and] / `&` and [Query::or] / `|`. Nothing is read from the
//! table until the query is walked with [Query::for_each] or
//! [Query::try_for_each].
//!
//! Walking strategies:
//! - a range walks its index between the bounds, in field order;
//! - a predicate on its own scans the whole table;
//! - `a & b` walks the operand with the smaller known size and tests each
//!   record against the other one;
//! - `range & predicate` walks the range and filters it;
//! - `a | b` walks the smaller operand, remembers what it emitted, then walks
//!   the other one skipping those records, so every record is emitted once.
//!
//! Order is only guaranteed for a plain range.

use std::cell::OnceCell;
use std::ops::{BitAnd, BitOr, ControlFlow};
use std::ptr;

use bitvec::prelude::*;

use crate::entry::{Entry, Field};
use crate::index::{IndexSet, Key};
use crate::records::RecordId;
use crate::table::Table;

/// A bounded run of records that knows its own size.
pub(crate) trait Scan<E> {
    fn len(&self) -> usize;

    /// Whether the record falls inside the bounds.
    fn contains(&self, entry: &E) -> bool;

    fn walk(&self, visit: &mut dyn FnMut(RecordId) -> ControlFlow<()>) -> ControlFlow<()>;
}

/// Records whose field `I` lies in `[lo, hi]`.
pub(crate) struct FieldRange<'t, E: Field<I>, const I: usize> {
    index: &'t IndexSet<E, I>,
    lo: Key<E, I>,
    hi: Key<E, I>,
    len: OnceCell<usize>,
}

impl<'t, E: Field<I>, const I: usize> FieldRange<'t, E, I> {
    pub fn new(index: &'t IndexSet<E, I>, lo: Key<E, I>, hi: Key<E, I>) -> Self {
        Self {
            index,
            lo,
            hi,
            len: OnceCell::new(),
        }
    }
}

impl<E: Field<I>, const I: usize> Scan<E> for FieldRange<'_, E, I> {
    fn len(&self) -> usize {
        *self
            .len
            .get_or_init(|| self.index.range_len(&self.lo, &self.hi))
    }

    fn contains(&self, entry: &E) -> bool {
        let value = entry.field();
        self.lo <= *value && *value <= self.hi
    }

    fn walk(&self, visit: &mut dyn FnMut(RecordId) -> ControlFlow<()>) -> ControlFlow<()> {
        self.index.range_ids(&self.lo, &self.hi).try_for_each(visit)
    }
}

/// Every record, in the table's default order.
pub(crate) struct AllRecords<'t, E: Entry> {
    table: &'t Table<E>,
}

impl<'t, E: Entry> AllRecords<'t, E> {
    pub fn new(table: &'t Table<E>) -> Self {
        Self { table }
    }
}

impl<E: Entry> Scan<E> for AllRecords<'_, E> {
    fn len(&self) -> usize {
        self.table.len()
    }

    fn contains(&self, _entry: &E) -> bool {
        true
    }

    fn walk(&self, visit: &mut dyn FnMut(RecordId) -> ControlFlow<()>) -> ControlFlow<()> {
        self.table.ids().try_for_each(visit)
    }
}

type Predicate<'t, E> = Box<dyn Fn(&E) -> bool + 't>;

enum Node<'t, E> {
    Range(Box<dyn Scan<E> + 't>),
    Predicate(Predicate<'t, E>),
    And(Box<Node<'t, E>>, Box<Node<'t, E>>),
    Or(Box<Node<'t, E>>, Box<Node<'t, E>>),
    Filtered(Box<Node<'t, E>>, Predicate<'t, E>),
}

/// `true` when the right operand should be walked first.
fn right_first(left: Option<usize>, right: Option<usize>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => right < left,
        (None, Some(_)) => true,
        _ => false,
    }
}

impl<'t, E: Entry> Node<'t, E> {
    /// Upper bound on the number of matches, `None` when only a scan can tell.
    fn size(&self) -> Option<usize> {
        match self {
            Self::Range(scan) => Some(scan.len()),
            Self::Predicate(_) => None,
            Self::And(left, right) => match (left.size(), right.size()) {
                (Some(left), Some(right)) => Some(left.min(right)),
                (left, right) => left.or(right),
            },
            Self::Or(left, right) => Some(left.size()? + right.size()?),
            Self::Filtered(range, _) => range.size(),
        }
    }

    fn test(&self, entry: &E) -> bool {
        match self {
            Self::Range(scan) => scan.contains(entry),
            Self::Predicate(pred) => pred(entry),
            Self::And(left, right) => left.test(entry) && right.test(entry),
            Self::Or(left, right) => left.test(entry) || right.test(entry),
            Self::Filtered(range, pred) => range.test(entry) && pred(entry),
        }
    }

    fn walk(
        &self,
        table: &'t Table<E>,
        visit: &mut dyn FnMut(RecordId, &'t E) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        match self {
            Self::Range(scan) => scan.walk(&mut |id| match table.get(id) {
                Some(entry) => visit(id, entry),
                None => ControlFlow::Continue(()),
            }),
            Self::Predicate(pred) => table.ids().try_for_each(|id| match table.get(id) {
                Some(entry) if pred(entry) => visit(id, entry),
                _ => ControlFlow::Continue(()),
            }),
            Self::Filtered(range, pred) => range.walk(table, &mut |id, entry| {
                if pred(entry) {
                    visit(id, entry)
                } else {
                    ControlFlow::Continue(())
                }
            }),
            Self::And(left, right) => {
                let (driver, probe) = if right_first(left.size(), right.size()) {
                    (right, left)
                } else {
                    (left, right)
                };
                driver.walk(table, &mut |id, entry| {
                    if probe.test(entry) {
                        visit(id, entry)
                    } else {
                        ControlFlow::Continue(())
                    }
                })
            }
            Self::Or(left, right) => {
                let (first, second) = if right_first(left.size(), right.size()) {
                    (right, left)
                } else {
                    (left, right)
                };
                let mut seen = bitvec![0; table.slot_capacity()];
                first.walk(table, &mut |id, entry| {
                    seen.set(id.slot(), true);
                    visit(id, entry)
                })?;
                second.walk(table, &mut |id, entry| {
                    if seen[id.slot()] {
                        ControlFlow::Continue(())
                    } else {
                        visit(id, entry)
                    }
                })
            }
        }
    }
}

/// Lazy query over the records of one [Table].
///
/// # Example
/// ```
/// use multitable::Table;
///
/// let mut table = Table::new();
/// for x in -1..=1 {
///     for y in -1..=1 {
///         table.insert((x, y));
///     }
/// }
///
/// let cross = table.range::<0>(0, 0) | table.range::<1>(0, 0);
/// assert_eq!(cross.count(), 5);
///
/// let centre = table.range::<0>(0, 0) & table.range::<1>(0, 0);
/// assert_eq!(centre.to_vec(), vec![&(0, 0)]);
/// ```
pub struct Query<'t, E: Entry> {
    table: &'t Table<E>,
    node: Node<'t, E>,
}

impl<'t, E: Entry> Query<'t, E> {
    pub(crate) fn scan(table: &'t Table<E>, scan: Box<dyn Scan<E> + 't>) -> Self {
        Self {
            table,
            node: Node::Range(scan),
        }
    }

    pub(crate) fn predicate(table: &'t Table<E>, pred: impl Fn(&E) -> bool + 't) -> Self {
        Self {
            table,
            node: Node::Predicate(Box::new(pred)),
        }
    }

    /// Upper bound on the number of matching records.
    ///
    /// Ranges know their size. Returns `None` when the query is driven by a
    /// bare predicate, whose size is only known after a full scan.
    pub fn size(&self) -> Option<usize> {
        self.node.size()
    }

    /// Whether `entry` satisfies the query, without touching the table.
    pub fn test(&self, entry: &E) -> bool {
        self.node.test(entry)
    }

    /// Whether the record behind `id` satisfies the query.
    pub fn matches(&self, id: RecordId) -> bool {
        self.table.get(id).is_some_and(|entry| self.test(entry))
    }

    /// Records matching both queries.
    ///
    /// A predicate on the right turns into a filter over the left operand.
    ///
    /// # Panics
    /// Panics if the two queries read different tables.
    pub fn and(self, other: Self) -> Self {
        assert!(ptr::eq(self.table, other.table), "queries over different tables");
        let node = match other.node {
            Node::Predicate(pred) => Node::Filtered(Box::new(self.node), pred),
            node => Node::And(Box::new(self.node), Box::new(node)),
        };
        Self {
            table: self.table,
            node,
        }
    }

    /// Records matching either query, each emitted once.
    ///
    /// # Panics
    /// Panics if the two queries read different tables.
    pub fn or(self, other: Self) -> Self {
        assert!(ptr::eq(self.table, other.table), "queries over different tables");
        Self {
            table: self.table,
            node: Node::Or(Box::new(self.node), Box::new(other.node)),
        }
    }

    /// Keeps only the records accepted by `pred`.
    pub fn filter(self, pred: impl Fn(&E) -> bool + 't) -> Self {
        Self {
            table: self.table,
            node: Node::Filtered(Box::new(self.node), Box::new(pred)),
        }
    }

    /// Walks the matching records until `visit` breaks.
    ///
    /// Returns the break value, or `Continue` when every match was visited.
    pub fn try_for_each<B>(
        &self,
        mut visit: impl FnMut(RecordId, &'t E) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let mut stopped = None;
        let _ = self.node.walk(self.table, &mut |id, entry| match visit(id, entry) {
            ControlFlow::Continue(()) => ControlFlow::Continue(()),
            ControlFlow::Break(value) => {
                stopped = Some(value);
                ControlFlow::Break(())
            }
        });
        match stopped {
            Some(value) => ControlFlow::Break(value),
            None => ControlFlow::Continue(()),
        }
    }

    /// Visits every matching record.
    pub fn for_each(&self, mut visit: impl FnMut(&'t E)) {
        let _ = self.try_for_each(|_, entry| {
            visit(entry);
            ControlFlow::<()>::Continue(())
        });
    }

    /// First match in walking order.
    pub fn first(&self) -> Option<&'t E> {
        match self.try_for_each(|_, entry| ControlFlow::Break(entry)) {
            ControlFlow::Break(entry) => Some(entry),
            ControlFlow::Continue(()) => None,
        }
    }

    pub fn to_vec(&self) -> Vec<&'t E> {
        let mut out = Vec::with_capacity(self.size().unwrap_or(0));
        self.for_each(|entry| out.push(entry));
        out
    }

    pub fn ids(&self) -> Vec<RecordId> {
        let mut out = Vec::with_capacity(self.size().unwrap_or(0));
        let _ = self.try_for_each(|id, _| {
            out.push(id);
            ControlFlow::<()>::Continue(())
        });
        out
    }

    pub fn count(&self) -> usize {
        let mut count = 0;
        self.for_each(|_| count += 1);
        count
    }
}

impl<'t, E: Entry> BitAnd for Query<'t, E> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl<'t, E: Entry> BitOr for Query<'t, E> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn grid() -> Table<(i32, i32)> {
        let mut table = Table::new();
        for x in -1..=1 {
            for y in -1..=1 {
                table.insert((x, y)).unwrap();
            }
        }
        table
    }

    fn sorted(query: &Query<'_, (i32, i32)>) -> Vec<(i32, i32)> {
        let mut points: Vec<_> = query.to_vec().into_iter().copied().collect();
        points.sort();
        points
    }

    #[test]
    fn test_range_in_field_order() {
        let mut table = Table::new();
        for value in (0..10).rev() {
            table.insert((value,)).unwrap();
        }

        let hits: Vec<_> = table.range::<0>(5, 7).to_vec();
        assert_eq!(hits, vec![&(5,), &(6,), &(7,)]);
        assert_eq!(table.range::<0>(5, 7).size(), Some(3));

        assert_eq!(table.range::<0>(80, 90).count(), 0);
        assert_eq!(table.range::<0>(7, 5).count(), 0);
    }

    #[test]
    fn test_range_of_pairs() {
        let mut table = Table::new();
        table.insert((0, 0)).unwrap();
        table.insert((0, 1)).unwrap();
        table.insert((1, 0)).unwrap();
        table.insert((1, 1)).unwrap();

        let points = table.range::<0>(0, 0).to_vec();
        assert_eq!(points, vec![&(0, 0), &(0, 1)]);
    }

    #[test]
    fn test_union_is_cross() {
        let table = grid();

        let cross = table.range::<0>(0, 0) | table.range::<1>(0, 0);
        assert_eq!(
            sorted(&cross),
            vec![(-1, 0), (0, -1), (0, 0), (0, 1), (1, 0)]
        );
        assert_eq!(cross.ids().len(), 5);
    }

    #[test]
    fn test_intersection_is_centre() {
        let table = grid();

        let centre = table.range::<0>(0, 0) & table.range::<1>(0, 0);
        assert_eq!(sorted(&centre), vec![(0, 0)]);
        assert_eq!(centre.size(), Some(3));
    }

    #[test]
    fn test_union_then_predicate() {
        let table = grid();

        let query =
            (table.range::<0>(0, 0) | table.range::<1>(0, 0)) & table.pred(|p| p.0 != p.1);
        assert_eq!(sorted(&query), vec![(-1, 0), (0, -1), (0, 1), (1, 0)]);
    }

    #[test]
    fn test_filtered_range() {
        let mut table = Table::new();
        for value in 0..100 {
            table.insert((value,)).unwrap();
        }

        let query = table.range::<0>(10, 40) & table.pred(|v| v.0 % 19 == 0);
        assert_eq!(query.to_vec(), vec![&(19,), &(38,)]);
        assert_eq!(query.size(), Some(31));

        let same = table.range::<0>(10, 40).filter(|v| v.0 % 19 == 0);
        assert_eq!(same.count(), 2);
    }

    #[test]
    fn test_filter_never_leaves_range() {
        let mut table = Table::new();
        for value in 0..100 {
            table.insert((value,)).unwrap();
        }

        let calls = Cell::new(0);
        let query = table.range::<0>(10, 19) & table.pred(|_| {
            calls.set(calls.get() + 1);
            true
        });
        assert_eq!(query.count(), 10);
        assert_eq!(calls.get(), 10);
    }

    #[test]
    fn test_intersection_walks_smaller_side() {
        let mut table = Table::new();
        for value in 0..50 {
            table.insert((value, value % 5)).unwrap();
        }

        // field 0 in [0, 2] holds 3 records, field 1 == 0 holds 10
        let query = table.range::<1>(0, 0) & table.range::<0>(0, 2);
        assert_eq!(query.size(), Some(3));
        assert_eq!(query.to_vec(), vec![&(0, 0)]);

        // the larger side is only probed for the 3 records of the smaller one
        let probed = Cell::new(0);
        let query = table.pred(|_| {
            probed.set(probed.get() + 1);
            true
        }) & table.range::<0>(0, 2);
        assert_eq!(query.count(), 3);
        assert_eq!(probed.get(), 3);

        // a filtered 10-record range never drives against a 3-record range
        let walked = Cell::new(0);
        let query = table.range::<1>(0, 0).filter(|_| {
            walked.set(walked.get() + 1);
            true
        }) & table.range::<0>(0, 2);
        assert_eq!(query.to_vec(), vec![&(0, 0)]);
        assert_eq!(walked.get(), 1);
    }

    #[test]
    fn test_union_walks_smaller_side_first() {
        let mut table = Table::new();
        for value in 0..50 {
            table.insert((value, value % 5)).unwrap();
        }

        // 10 records with field 1 == 0, 3 with field 0 in [0, 2], sharing (0, 0)
        let query = table.range::<1>(0, 0) | table.range::<0>(0, 2);
        let emitted = query.to_vec();

        assert_eq!(emitted.len(), 12);
        assert_eq!(&emitted[..3], &[&(0, 0), &(1, 1), &(2, 2)]);
        assert!(emitted[3..].iter().all(|p| p.1 == 0 && p.0 != 0));
    }

    #[test]
    #[should_panic(expected = "queries over different tables")]
    fn test_union_across_tables_panics() {
        let mut small = Table::new();
        small.insert((1,)).unwrap();
        let mut large = Table::new();
        for value in 0..100 {
            large.insert((value,)).unwrap();
        }

        let _ = small.range::<0>(0, 0) | large.range::<0>(50, 60);
    }

    #[test]
    #[should_panic(expected = "queries over different tables")]
    fn test_intersection_across_tables_panics() {
        let first = grid();
        let second = grid();

        let _ = first.range::<0>(0, 0) & second.range::<1>(0, 0);
    }

    #[test]
    fn test_bare_predicate_scans_table() {
        let table = grid();

        let diagonal = table.pred(|p| p.0 == p.1);
        assert_eq!(diagonal.size(), None);
        assert_eq!(sorted(&diagonal), vec![(-1, -1), (0, 0), (1, 1)]);
    }

    #[test]
    fn test_all_and_callable_test() {
        let table = grid();

        let all = table.all();
        assert_eq!(all.size(), Some(9));
        assert_eq!(all.count(), 9);

        let row = table.range::<0>(1, 1);
        assert!(row.test(&(1, 5)));
        assert!(!row.test(&(0, 1)));

        let id = table.lookup::<1>(&-1).unwrap();
        let column = table.range::<1>(-1, -1);
        assert!(column.matches(id));
    }

    #[test]
    fn test_early_exit() {
        let table = grid();

        let mut visited = 0;
        let flow = table.all().try_for_each(|_, point| {
            visited += 1;
            if point.0 == 0 {
                ControlFlow::Break(*point)
            } else {
                ControlFlow::Continue(())
            }
        });

        assert!(matches!(flow, ControlFlow::Break((0, _))));
        assert!(visited < 9);

        assert!(table.range::<0>(5, 6).first().is_none());
        assert!(table.range::<0>(1, 1).first().is_some());
    }

    #[test]
    fn test_union_early_exit_in_second_operand() {
        let table = grid();

        let query = table.range::<0>(-1, -1) | table.range::<0>(1, 1);
        let mut seen = Vec::new();
        let flow = query.try_for_each(|_, point| {
            seen.push(*point);
            if seen.len() == 4 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(flow.is_break());
        assert_eq!(seen.len(), 4);
    }
}
