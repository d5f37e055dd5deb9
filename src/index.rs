use std::collections::BTreeMap;
use std::ops::Bound;

use smallvec::SmallVec;

use crate::entry::{Field, Uniqueness};
use crate::records::RecordId;

/// Records sharing one field value, sorted by handle.
type Run = SmallVec<[RecordId; 1]>;

/// Value type of field `I`.
pub type Key<E, const I: usize> = <E as Field<I>>::Value;

/// Ordered index over field `I` of an entry type.
///
/// Maps each field value to the handles of the records holding it, so it
/// behaves as an ordered multimap. For unique fields every run holds a single
/// handle. Within a run handles are kept sorted, which gives every record a
/// total `(value, handle)` position to walk from.
pub struct IndexSet<E: Field<I>, const I: usize> {
    entries: BTreeMap<Key<E, I>, Run>,
    len: usize,
}

impl<E: Field<I>, const I: usize> Default for IndexSet<E, I> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            len: 0,
        }
    }
}

impl<E: Field<I>, const I: usize> IndexSet<E, I> {
    /// Number of handles stored in the index.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct field values.
    pub fn distinct(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn insert(&mut self, key: Key<E, I>, id: RecordId) {
        let run = self.entries.entry(key).or_default();
        if let Err(pos) = run.binary_search(&id) {
            run.insert(pos, id);
            self.len += 1;
        }
    }

    /// Removes one `(key, id)` pair. Returns `false` if it was not indexed.
    pub(crate) fn remove(&mut self, key: &Key<E, I>, id: RecordId) -> bool {
        let Some(run) = self.entries.get_mut(key) else {
            return false;
        };
        let Ok(pos) = run.binary_search(&id) else {
            return false;
        };
        run.remove(pos);
        if run.is_empty() {
            self.entries.remove(key);
        }
        self.len -= 1;
        true
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
    }

    /// Whether a record other than `id` holds `key`.
    pub(crate) fn held_by_other(&self, key: &Key<E, I>, id: RecordId) -> bool {
        self.entries
            .get(key)
            .is_some_and(|run| run.iter().any(|held| *held != id))
    }

    pub(crate) fn contains_key(&self, key: &Key<E, I>) -> bool {
        self.entries.contains_key(key)
    }

    /// Handles holding exactly `key`, in handle order.
    pub(crate) fn equal(&self, key: &Key<E, I>) -> impl Iterator<Item = RecordId> + '_ {
        self.entries
            .get(key)
            .into_iter()
            .flat_map(|run| run.iter().copied())
    }

    /// Every handle in field order.
    pub(crate) fn ids(&self) -> impl DoubleEndedIterator<Item = RecordId> + '_ {
        self.entries.values().flat_map(|run| run.iter().copied())
    }

    /// Handles whose value lies in `[lo, hi]`, in field order. Empty when `lo > hi`.
    pub(crate) fn range_ids<'a>(
        &'a self,
        lo: &'a Key<E, I>,
        hi: &'a Key<E, I>,
    ) -> impl DoubleEndedIterator<Item = RecordId> + 'a {
        (lo <= hi)
            .then(|| {
                self.entries
                    .range::<Key<E, I>, _>((Bound::Included(lo), Bound::Included(hi)))
            })
            .into_iter()
            .flatten()
            .flat_map(|(_, run)| run.iter().copied())
    }

    /// Number of handles whose value lies in `[lo, hi]`.
    pub(crate) fn range_len(
        &self,
        lo: &Key<E, I>,
        hi: &Key<E, I>,
    ) -> usize {
        if lo > hi {
            return 0;
        }
        self.entries
            .range::<Key<E, I>, _>((Bound::Included(lo), Bound::Included(hi)))
            .map(|(_, run)| run.len())
            .sum()
    }

    fn successor(&self, key: &Key<E, I>, id: RecordId) -> Option<RecordId> {
        if let Some(run) = self.entries.get(key) {
            let pos = match run.binary_search(&id) {
                Ok(pos) => pos + 1,
                Err(pos) => pos,
            };
            if let Some(next) = run.get(pos) {
                return Some(*next);
            }
        }
        self.entries
            .range::<Key<E, I>, _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .and_then(|(_, run)| run.first().copied())
    }

    fn predecessor(&self, key: &Key<E, I>, id: RecordId) -> Option<RecordId> {
        if let Some(run) = self.entries.get(key) {
            let pos = match run.binary_search(&id) {
                Ok(pos) | Err(pos) => pos,
            };
            if pos > 0 {
                return Some(run[pos - 1]);
            }
        }
        self.entries
            .range::<Key<E, I>, _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .and_then(|(_, run)| run.last().copied())
    }
}

/// Field-type-erased view of one index, used by the table for the work that
/// touches every index at once.
pub trait FieldIndex<E> {
    /// Position of the indexed field.
    fn position(&self) -> usize;

    fn uniqueness(&self) -> Uniqueness;

    fn len(&self) -> usize;

    /// Whether inserting `entry` would break an enforced uniqueness rule.
    fn collides(&self, entry: &E) -> bool;

    fn attach(&mut self, id: RecordId, entry: &E);

    /// Returns `false` if the record was not indexed under its current value.
    fn detach(&mut self, id: RecordId, entry: &E) -> bool;

    fn clear(&mut self);

    fn ids(&self) -> Box<dyn DoubleEndedIterator<Item = RecordId> + '_>;

    fn first(&self) -> Option<RecordId>;

    fn last(&self) -> Option<RecordId>;

    /// Handle following `id` in field order. `entry` must be the live record of `id`.
    fn next_after(&self, id: RecordId, entry: &E) -> Option<RecordId>;

    /// Handle preceding `id` in field order. `entry` must be the live record of `id`.
    fn prev_before(&self, id: RecordId, entry: &E) -> Option<RecordId>;
}

impl<E: Field<I>, const I: usize> FieldIndex<E> for IndexSet<E, I> {
    fn position(&self) -> usize {
        I
    }

    fn uniqueness(&self) -> Uniqueness {
        <E as Field<I>>::UNIQUENESS
    }

    fn len(&self) -> usize {
        self.len
    }

    fn collides(&self, entry: &E) -> bool {
        <E as Field<I>>::UNIQUENESS == Uniqueness::EnforceUnique
            && self.contains_key(entry.field())
    }

    fn attach(&mut self, id: RecordId, entry: &E) {
        self.insert(entry.field().clone(), id);
    }

    fn detach(&mut self, id: RecordId, entry: &E) -> bool {
        self.remove(entry.field(), id)
    }

    fn clear(&mut self) {
        IndexSet::clear(self);
    }

    fn ids(&self) -> Box<dyn DoubleEndedIterator<Item = RecordId> + '_> {
        Box::new(IndexSet::ids(self))
    }

    fn first(&self) -> Option<RecordId> {
        self.entries
            .first_key_value()
            .and_then(|(_, run)| run.first().copied())
    }

    fn last(&self) -> Option<RecordId> {
        self.entries
            .last_key_value()
            .and_then(|(_, run)| run.last().copied())
    }

    fn next_after(&self, id: RecordId, entry: &E) -> Option<RecordId> {
        self.successor(entry.field(), id)
    }

    fn prev_before(&self, id: RecordId, entry: &E) -> Option<RecordId> {
        self.predecessor(entry.field(), id)
    }
}

/// The fixed tuple of indices kept for an entry type, one per field.
pub trait IndexGroup<E>: Default {
    /// Number of indices, which is the entry's field count.
    const ARITY: usize;

    fn index(&self, position: usize) -> Option<&dyn FieldIndex<E>>;

    fn index_mut(&mut self, position: usize) -> Option<&mut dyn FieldIndex<E>>;
}

macro_rules! index_groups {
    ($arity:expr; $(($idx:tt, $T:ident)),+) => {
        impl<E, $($T: FieldIndex<E> + Default),+> IndexGroup<E> for ($($T,)+) {
            const ARITY: usize = $arity;

            fn index(&self, position: usize) -> Option<&dyn FieldIndex<E>> {
                match position {
                    $($idx => Some(&self.$idx),)+
                    _ => None,
                }
            }

            fn index_mut(&mut self, position: usize) -> Option<&mut dyn FieldIndex<E>> {
                match position {
                    $($idx => Some(&mut self.$idx),)+
                    _ => None,
                }
            }
        }
    };
}

index_groups!(1; (0, T0));
index_groups!(2; (0, T0), (1, T1));
index_groups!(3; (0, T0), (1, T1), (2, T2));
index_groups!(4; (0, T0), (1, T1), (2, T2), (3, T3));
index_groups!(5; (0, T0), (1, T1), (2, T2), (3, T3), (4, T4));
index_groups!(6; (0, T0), (1, T1), (2, T2), (3, T3), (4, T4), (5, T5));
index_groups!(7; (0, T0), (1, T1), (2, T2), (3, T3), (4, T4), (5, T5), (6, T6));
index_groups!(8; (0, T0), (1, T1), (2, T2), (3, T3), (4, T4), (5, T5), (6, T6), (7, T7));
index_groups!(9; (0, T0), (1, T1), (2, T2), (3, T3), (4, T4), (5, T5), (6, T6), (7, T7), (8, T8));
index_groups!(10; (0, T0), (1, T1), (2, T2), (3, T3), (4, T4), (5, T5), (6, T6), (7, T7), (8, T8), (9, T9));
index_groups!(11; (0, T0), (1, T1), (2, T2), (3, T3), (4, T4), (5, T5), (6, T6), (7, T7), (8, T8), (9, T9), (10, T10));
index_groups!(12; (0, T0), (1, T1), (2, T2), (3, T3), (4, T4), (5, T5), (6, T6), (7, T7), (8, T8), (9, T9), (10, T10), (11, T11));
