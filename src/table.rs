use std::io::{Read, Write};
use std::mem;

use tracing::{debug, trace};

use crate::codec::{Decode, Decoder, Encode, write_len};
use crate::entry::{Entry, Field, Uniqueness};
use crate::error::{CodecError, TableError};
use crate::index::{FieldIndex, IndexGroup, Key};
use crate::query::{AllRecords, FieldRange, Query};
use crate::records::{RecordId, Records};
use crate::shape::Shape;

/// Index a [Cursor] walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// Arena slot order, for entries without a default lookup field.
    Identity,
    Field(usize),
}

/// Detached position in one of the table's orders.
///
/// A cursor does not borrow the table, which is what allows erasing the
/// record under it with [Table::erase_at] and carrying on from the returned
/// successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    walk: Walk,
    reverse: bool,
    current: Option<RecordId>,
}

impl Cursor {
    /// Handle of the record under the cursor, `None` once the walk is over.
    pub fn id(&self) -> Option<RecordId> {
        self.current
    }

    pub fn is_end(&self) -> bool {
        self.current.is_none()
    }

    /// Field whose index the cursor walks, `None` for identity order.
    pub fn field(&self) -> Option<usize> {
        match self.walk {
            Walk::Identity => None,
            Walk::Field(position) => Some(position),
        }
    }
}

/// In-memory table keeping one ordered index per field of `E`.
///
/// Every record is stored once; each index refers to it by [RecordId]. All
/// mutations keep the indices consistent with each other: after any
/// successful or refused call, looking a record up through any field finds
/// that same record.
///
/// The table assumes a single writer. Wrap it in a lock to share it between
/// threads.
pub struct Table<E: Entry> {
    records: Records<E>,
    indices: E::Indices,
}

impl<E: Entry> Default for Table<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn attach_all<E: Entry>(indices: &mut E::Indices, id: RecordId, entry: &E) {
    for position in 0..E::FIELDS {
        if let Some(index) = indices.index_mut(position) {
            index.attach(id, entry);
        }
    }
}

fn detach_all<E: Entry>(indices: &mut E::Indices, id: RecordId, entry: &E) {
    for position in 0..E::FIELDS {
        if let Some(index) = indices.index_mut(position) {
            let detached = index.detach(id, entry);
            debug_assert!(detached, "record missing from index {position}");
        }
    }
}

impl<E: Entry> Table<E> {
    pub fn new() -> Self {
        const {
            assert!(
                match E::DEFAULT_LOOKUP {
                    Some(position) => position < E::FIELDS,
                    None => true,
                },
                "default lookup field out of range"
            )
        };
        Self {
            records: Records::default(),
            indices: E::Indices::default(),
        }
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the table holds no record, else false.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves a handle. Returns `None` for a handle of an erased record.
    pub fn get(&self, id: RecordId) -> Option<&E> {
        self.records.get(id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.get(id).is_some()
    }

    pub(crate) fn slot_capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Position of the first enforced-unique field on which `entry` collides.
    pub(crate) fn colliding_field(&self, entry: &E) -> Option<usize> {
        (0..E::FIELDS).find(|position| {
            self.indices
                .index(*position)
                .is_some_and(|index| index.collides(entry))
        })
    }

    /// Stores a new record and indexes it under every field.
    ///
    /// Returns `None`, leaving the table untouched, if the record collides with
    /// an existing one on a field whose policy is
    /// [Uniqueness::EnforceUnique].
    ///
    /// # Example
    /// ```
    /// use multitable::Table;
    ///
    /// let mut table = Table::new();
    /// let id = table.insert((5, "five")).unwrap();
    ///
    /// assert_eq!(table.get(id), Some(&(5, "five")));
    /// assert_eq!(table.lookup::<1>(&"five"), Some(id));
    /// ```
    pub fn insert(&mut self, entry: E) -> Option<RecordId> {
        if let Some(position) = self.colliding_field(&entry) {
            trace!(field = position, "insert refused by unique field");
            return None;
        }

        let id = self.records.insert(entry);
        if let Some(entry) = self.records.get(id) {
            attach_all(&mut self.indices, id, entry);
        }
        Some(id)
    }

    /// Removes a record from the table and from every index.
    ///
    /// # Errors
    /// Returns [TableError::UnknownRecord] if the handle is not held by this table.
    pub fn erase(&mut self, id: RecordId) -> Result<(), TableError> {
        self.extract(id).map(drop)
    }

    /// Removes a record from the table and hands it back to the caller.
    ///
    /// # Errors
    /// Returns [TableError::UnknownRecord] if the handle is not held by this table.
    pub fn extract(&mut self, id: RecordId) -> Result<E, TableError> {
        let entry = self
            .records
            .get(id)
            .ok_or(TableError::UnknownRecord(id))?;
        detach_all(&mut self.indices, id, entry);
        trace!(?id, "record erased");

        self.records.remove(id).ok_or(TableError::UnknownRecord(id))
    }

    /// Drops every record and empties every index.
    pub fn clear(&mut self) {
        debug!(records = self.len(), "clearing table");
        for position in 0..E::FIELDS {
            if let Some(index) = self.indices.index_mut(position) {
                index.clear();
            }
        }
        self.records.clear();
    }

    /// Handle of a record whose field `I` equals `value`.
    ///
    /// When several records share the value, the one with the lowest handle
    /// is returned.
    pub fn lookup<const I: usize>(&self, value: &Key<E, I>) -> Option<RecordId>
    where
        E: Field<I>,
    {
        <E as Field<I>>::index(&self.indices).equal(value).next()
    }

    /// Like [Table::lookup], resolving the handle.
    pub fn find<const I: usize>(&self, value: &Key<E, I>) -> Option<&E>
    where
        E: Field<I>,
    {
        self.lookup::<I>(value).and_then(|id| self.records.get(id))
    }

    /// Handles of every record whose field `I` equals `value`.
    pub fn lookup_all<'a, const I: usize>(
        &'a self,
        value: &'a Key<E, I>,
    ) -> impl Iterator<Item = RecordId> + 'a
    where
        E: Field<I>,
    {
        <E as Field<I>>::index(&self.indices).equal(value)
    }

    /// Number of handles in the index of field `I`. Always equal to [Table::len].
    pub fn field_len<const I: usize>(&self) -> usize
    where
        E: Field<I>,
    {
        <E as Field<I>>::index(&self.indices).len()
    }

    /// Sets field `I` of a record and moves it to its new place in that index.
    ///
    /// Returns `Ok(false)` and changes nothing if the field is
    /// [Uniqueness::EnforceUnique] and another record already holds `value`.
    ///
    /// # Errors
    /// Returns [TableError::UnknownRecord] if the handle is not held by this table.
    pub fn update<const I: usize>(
        &mut self,
        id: RecordId,
        value: Key<E, I>,
    ) -> Result<bool, TableError>
    where
        E: Field<I>,
    {
        let entry = self
            .records
            .get_mut(id)
            .ok_or(TableError::UnknownRecord(id))?;
        let index = <E as Field<I>>::index_mut(&mut self.indices);

        if <E as Field<I>>::UNIQUENESS == Uniqueness::EnforceUnique
            && index.held_by_other(&value, id)
        {
            trace!(field = I, ?id, "update refused by unique field");
            return Ok(false);
        }

        let field = <E as Field<I>>::field_mut(entry);
        index.remove(field, id);
        index.insert(value.clone(), id);
        *field = value;
        Ok(true)
    }

    /// Exchanges field `I` of a record with `value`.
    ///
    /// On success `value` holds the previous field value. Follows the same
    /// uniqueness rule as [Table::update]; on refusal both sides are unchanged.
    ///
    /// # Errors
    /// Returns [TableError::UnknownRecord] if the handle is not held by this table.
    pub fn swap<const I: usize>(
        &mut self,
        id: RecordId,
        value: &mut Key<E, I>,
    ) -> Result<bool, TableError>
    where
        E: Field<I>,
    {
        let entry = self
            .records
            .get_mut(id)
            .ok_or(TableError::UnknownRecord(id))?;
        let index = <E as Field<I>>::index_mut(&mut self.indices);

        if <E as Field<I>>::UNIQUENESS == Uniqueness::EnforceUnique
            && index.held_by_other(value, id)
        {
            trace!(field = I, ?id, "swap refused by unique field");
            return Ok(false);
        }

        let field = <E as Field<I>>::field_mut(entry);
        index.remove(field, id);
        mem::swap(field, value);
        index.insert(field.clone(), id);
        Ok(true)
    }

    /// [Table::update] on the record under a cursor.
    ///
    /// # Errors
    /// Returns [TableError::IteratedField] if the cursor walks field `I`, and
    /// [TableError::ExhaustedCursor] if it points past the end.
    pub fn update_at<const I: usize>(
        &mut self,
        cursor: &Cursor,
        value: Key<E, I>,
    ) -> Result<bool, TableError>
    where
        E: Field<I>,
    {
        let id = Self::cursor_target::<I>(cursor)?;
        self.update::<I>(id, value)
    }

    /// [Table::swap] on the record under a cursor.
    ///
    /// # Errors
    /// Same as [Table::update_at].
    pub fn swap_at<const I: usize>(
        &mut self,
        cursor: &Cursor,
        value: &mut Key<E, I>,
    ) -> Result<bool, TableError>
    where
        E: Field<I>,
    {
        let id = Self::cursor_target::<I>(cursor)?;
        self.swap::<I>(id, value)
    }

    fn cursor_target<const I: usize>(cursor: &Cursor) -> Result<RecordId, TableError> {
        if cursor.walk == Walk::Field(I) {
            return Err(TableError::IteratedField { field: I });
        }
        cursor.current.ok_or(TableError::ExhaustedCursor)
    }

    fn default_index(&self) -> Option<&dyn FieldIndex<E>> {
        E::DEFAULT_LOOKUP.and_then(|position| self.indices.index(position))
    }

    /// Handles in default order: the default lookup field's order, or arena
    /// order when the entry has none.
    pub fn ids(&self) -> Box<dyn DoubleEndedIterator<Item = RecordId> + '_> {
        match self.default_index() {
            Some(index) => index.ids(),
            None => Box::new(self.records.ids()),
        }
    }

    /// Records in default order. Use `.rev()` to walk backwards.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &E> + '_ {
        self.ids().filter_map(move |id| self.records.get(id))
    }

    /// Records in ascending order of field `I`. Use `.rev()` for descending.
    pub fn values<const I: usize>(&self) -> impl DoubleEndedIterator<Item = &E> + '_
    where
        E: Field<I>,
    {
        <E as Field<I>>::index(&self.indices)
            .ids()
            .filter_map(move |id| self.records.get(id))
    }

    fn default_walk() -> Walk {
        match E::DEFAULT_LOOKUP {
            Some(position) => Walk::Field(position),
            None => Walk::Identity,
        }
    }

    fn start(&self, walk: Walk, reverse: bool) -> Cursor {
        let current = match walk {
            Walk::Identity if reverse => self.records.ids().next_back(),
            Walk::Identity => self.records.ids().next(),
            Walk::Field(position) => self.indices.index(position).and_then(|index| {
                if reverse {
                    index.last()
                } else {
                    index.first()
                }
            }),
        };
        Cursor {
            walk,
            reverse,
            current,
        }
    }

    fn step(&self, cursor: &Cursor) -> Option<RecordId> {
        let id = cursor.current?;
        let entry = self.records.get(id)?;
        match cursor.walk {
            Walk::Identity if cursor.reverse => self.records.prev_before(id),
            Walk::Identity => self.records.next_after(id),
            Walk::Field(position) => {
                let index = self.indices.index(position)?;
                if cursor.reverse {
                    index.prev_before(id, entry)
                } else {
                    index.next_after(id, entry)
                }
            }
        }
    }

    /// Cursor on the first record in default order.
    pub fn cursor(&self) -> Cursor {
        self.start(Self::default_walk(), false)
    }

    /// Cursor on the last record in default order, walking backwards.
    pub fn cursor_rev(&self) -> Cursor {
        self.start(Self::default_walk(), true)
    }

    /// Cursor on the record with the smallest field `I`.
    pub fn field_cursor<const I: usize>(&self) -> Cursor
    where
        E: Field<I>,
    {
        self.start(Walk::Field(I), false)
    }

    /// Cursor on the record with the largest field `I`, walking backwards.
    pub fn field_cursor_rev<const I: usize>(&self) -> Cursor
    where
        E: Field<I>,
    {
        self.start(Walk::Field(I), true)
    }

    /// Record under the cursor.
    pub fn current(&self, cursor: &Cursor) -> Option<&E> {
        cursor.current.and_then(|id| self.records.get(id))
    }

    /// Moves the cursor to the next record of its walk.
    pub fn advance(&self, cursor: &mut Cursor) {
        cursor.current = self.step(cursor);
    }

    /// Erases the record under the cursor and returns a cursor on its
    /// successor in the same walk.
    ///
    /// # Errors
    /// Returns [TableError::ExhaustedCursor] past the end and
    /// [TableError::UnknownRecord] if the record was already erased.
    ///
    /// # Example
    /// ```
    /// use multitable::Table;
    ///
    /// let mut table = Table::new();
    /// for value in 0..6 {
    ///     table.insert((value,));
    /// }
    ///
    /// let mut cursor = table.field_cursor::<0>();
    /// while let Some(&(value,)) = table.current(&cursor) {
    ///     if value % 2 == 0 {
    ///         cursor = table.erase_at(cursor).unwrap();
    ///     } else {
    ///         table.advance(&mut cursor);
    ///     }
    /// }
    /// assert_eq!(table.values::<0>().collect::<Vec<_>>(), vec![&(1,), &(3,), &(5,)]);
    /// ```
    pub fn erase_at(&mut self, cursor: Cursor) -> Result<Cursor, TableError> {
        let id = cursor.current.ok_or(TableError::ExhaustedCursor)?;
        if !self.contains(id) {
            return Err(TableError::UnknownRecord(id));
        }
        let next = self.step(&cursor);
        self.erase(id)?;
        Ok(Cursor {
            current: next,
            ..cursor
        })
    }

    /// Records whose field `I` lies in `[lo, hi]`, walked in field order.
    pub fn range<const I: usize>(&self, lo: Key<E, I>, hi: Key<E, I>) -> Query<'_, E>
    where
        E: Field<I>,
    {
        let index = <E as Field<I>>::index(&self.indices);
        Query::scan(self, Box::new(FieldRange::new(index, lo, hi)))
    }

    /// Every record, walked in default order.
    pub fn all(&self) -> Query<'_, E> {
        Query::scan(self, Box::new(AllRecords::new(self)))
    }

    /// Records accepted by `pred`.
    ///
    /// On its own a predicate scans the whole table; combine it with a range
    /// (`range & pred`) to only test records inside the range.
    pub fn pred<'t>(&'t self, pred: impl Fn(&E) -> bool + 't) -> Query<'t, E> {
        Query::predicate(self, pred)
    }
}

impl<E: Entry> Shape for Table<E> {
    const IS_CONTAINER: bool = true;
}

/// Record count, then every record in default order.
impl<E: Entry + Encode> Encode for Table<E> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        write_len(writer, self.len())?;
        for entry in self.iter() {
            entry.encode(writer)?;
        }
        Ok(())
    }
}

/// Rebuilds a table from its records. The table is only returned once every
/// record decoded and inserted.
impl<E: Entry + Decode> Decode for Table<E> {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let len = decoder.read_len()?;
        let mut table = Self::new();
        for _ in 0..len {
            let entry = E::decode(decoder)?;
            if let Some(index) = table.colliding_field(&entry) {
                return Err(CodecError::UniqueViolation { index });
            }
            table.insert(entry);
        }
        debug!(records = table.len(), "table decoded");
        Ok(table)
    }
}
