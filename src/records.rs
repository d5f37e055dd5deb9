use std::mem;

/// Stable handle to one record stored in a [crate::Table].
///
/// A handle is a slot in the record arena plus the generation the slot had
/// when the record was inserted. Once the record leaves the table the slot
/// generation moves on, so a stale handle never resolves to a newer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    slot: usize,
    generation: u64,
}

impl RecordId {
    /// Position of the record in the arena. Slots of live records are unique.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Generation of a slot that is never handed out again.
const RETIRED: u64 = u64::MAX;

#[derive(Debug, Clone)]
enum Slot<E> {
    Occupied { generation: u64, entry: E },
    Vacant { generation: u64, next_free: Option<usize> },
}

/// Arena owning every record of a table.
///
/// Every index of the table stores [RecordId]s that point in here, so each
/// record exists exactly once no matter how many fields are indexed. Slot
/// order doubles as the identity order used when an entry type has no
/// default lookup field.
#[derive(Debug, Clone)]
pub(crate) struct Records<E> {
    slots: Vec<Slot<E>>,
    free_head: Option<usize>,
    len: usize,
}

impl<E> Default for Records<E> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }
}

impl<E> Records<E> {
    /// Returns the number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the number of slots, live or vacant. Every live slot is below it.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Stores a record and returns its handle, reusing a vacant slot when possible.
    pub fn insert(&mut self, entry: E) -> RecordId {
        self.len += 1;

        if let Some(slot) = self.free_head
            && let Slot::Vacant {
                generation,
                next_free,
            } = self.slots[slot]
        {
            self.free_head = next_free;
            self.slots[slot] = Slot::Occupied { generation, entry };
            return RecordId { slot, generation };
        }

        let slot = self.slots.len();
        self.slots.push(Slot::Occupied {
            generation: 0,
            entry,
        });
        RecordId {
            slot,
            generation: 0,
        }
    }

    pub fn get(&self, id: RecordId) -> Option<&E> {
        match self.slots.get(id.slot) {
            Some(Slot::Occupied { generation, entry }) if *generation == id.generation => {
                Some(entry)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut E> {
        match self.slots.get_mut(id.slot) {
            Some(Slot::Occupied { generation, entry }) if *generation == id.generation => {
                Some(entry)
            }
            _ => None,
        }
    }

    /// Takes the record out of the arena and retires its handle.
    ///
    /// Returns `None` if the handle is stale or was never issued.
    pub fn remove(&mut self, id: RecordId) -> Option<E> {
        self.get(id)?;

        // A slot whose generation is used up is retired instead of reused.
        let next = Self::next_generation(id.generation);
        let vacant = Slot::Vacant {
            generation: next.unwrap_or(RETIRED),
            next_free: next.and(self.free_head),
        };
        match mem::replace(&mut self.slots[id.slot], vacant) {
            Slot::Occupied { entry, .. } => {
                if next.is_some() {
                    self.free_head = Some(id.slot);
                }
                self.len -= 1;
                Some(entry)
            }
            // checked by the `get` above
            Slot::Vacant { .. } => None,
        }
    }

    /// Drops every record. Slots are kept so outstanding handles stay stale.
    pub fn clear(&mut self) {
        let mut free_head = None;
        for slot in (0..self.slots.len()).rev() {
            let generation = match &self.slots[slot] {
                Slot::Occupied { generation, .. } => Self::next_generation(*generation),
                Slot::Vacant { generation, .. } => {
                    Some(*generation).filter(|generation| *generation != RETIRED)
                }
            };
            self.slots[slot] = Slot::Vacant {
                generation: generation.unwrap_or(RETIRED),
                next_free: generation.and(free_head),
            };
            if generation.is_some() {
                free_head = Some(slot);
            }
        }
        self.free_head = free_head;
        self.len = 0;
    }

    /// Handles of the live records in slot order.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = RecordId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, content)| Self::live(slot, content))
    }

    /// Handle of the first live record after `id` in slot order.
    pub fn next_after(&self, id: RecordId) -> Option<RecordId> {
        self.slots
            .iter()
            .enumerate()
            .skip(id.slot + 1)
            .find_map(|(slot, content)| Self::live(slot, content))
    }

    /// Handle of the last live record before `id` in slot order.
    pub fn prev_before(&self, id: RecordId) -> Option<RecordId> {
        self.slots[..id.slot.min(self.slots.len())]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(slot, content)| Self::live(slot, content))
    }

    fn next_generation(generation: u64) -> Option<u64> {
        generation.checked_add(1).filter(|next| *next != RETIRED)
    }

    fn live(slot: usize, content: &Slot<E>) -> Option<RecordId> {
        match content {
            Slot::Occupied { generation, .. } => Some(RecordId {
                slot,
                generation: *generation,
            }),
            Slot::Vacant { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─────────────────────────────────────────────────────────────
    // Test 1 : insert & get
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_insert_and_get() {
        let mut records = Records::default();

        let a = records.insert("a");
        let b = records.insert("b");

        assert_eq!(records.len(), 2);
        assert_eq!(records.get(a), Some(&"a"));
        assert_eq!(records.get(b), Some(&"b"));
        assert_ne!(a.slot(), b.slot());
    }

    // ─────────────────────────────────────────────────────────────
    // Test 2 : removed handles go stale even when the slot is reused
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_stale_handle() {
        let mut records = Records::default();

        let a = records.insert(1);
        assert_eq!(records.remove(a), Some(1));
        assert_eq!(records.remove(a), None);

        let b = records.insert(2);
        assert_eq!(a.slot(), b.slot());
        assert_eq!(records.get(a), None);
        assert_eq!(records.get(b), Some(&2));
        assert_eq!(records.len(), 1);
    }

    // ─────────────────────────────────────────────────────────────
    // Test 3 : slot order walking
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_walk_skips_vacant_slots() {
        let mut records = Records::default();

        let ids: Vec<_> = (0..5).map(|i| records.insert(i)).collect();
        records.remove(ids[2]).unwrap();

        let live: Vec<_> = records.ids().collect();
        assert_eq!(live, vec![ids[0], ids[1], ids[3], ids[4]]);

        assert_eq!(records.next_after(ids[1]), Some(ids[3]));
        assert_eq!(records.prev_before(ids[3]), Some(ids[1]));
        assert_eq!(records.next_after(ids[4]), None);
        assert_eq!(records.prev_before(ids[0]), None);
        assert_eq!(records.ids().rev().next(), Some(ids[4]));
    }

    // ─────────────────────────────────────────────────────────────
    // Test 4 : clear
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_clear() {
        let mut records = Records::default();

        let a = records.insert(10);
        records.insert(20);
        records.clear();

        assert_eq!(records.len(), 0);
        assert_eq!(records.get(a), None);
        assert_eq!(records.ids().count(), 0);

        let c = records.insert(30);
        assert_eq!(records.get(c), Some(&30));
        assert_eq!(records.get(a), None);
        assert_eq!(records.capacity(), 2);
    }

    // ─────────────────────────────────────────────────────────────
    // Test 5 : a slot whose generation is used up is not reused
    // ─────────────────────────────────────────────────────────────
    #[test]
    fn test_exhausted_slot_is_retired() {
        let mut records = Records::default();
        let first = records.insert("old");
        records.remove(first);

        // fast-forward the slot to its last usable generation
        records.slots[first.slot()] = Slot::Occupied {
            generation: RETIRED - 1,
            entry: "last",
        };
        records.free_head = None;
        records.len = 1;
        let last = RecordId {
            slot: first.slot(),
            generation: RETIRED - 1,
        };

        assert_eq!(records.remove(last), Some("last"));
        let next = records.insert("new");

        assert_ne!(next.slot(), first.slot());
        assert_eq!(records.get(last), None);
        assert_eq!(records.get(first), None);

        records.clear();
        let after_clear = records.insert("again");
        assert_ne!(after_clear.slot(), first.slot());
        assert_eq!(records.capacity(), 2);
    }

    #[test]
    fn test_generations_do_not_wrap_at_u32() {
        let mut records = Records::default();
        let id = records.insert(1);
        records.slots[id.slot()] = Slot::Occupied {
            generation: u64::from(u32::MAX),
            entry: 1,
        };
        let old = RecordId {
            slot: id.slot(),
            generation: u64::from(u32::MAX),
        };

        records.remove(old);
        let new = records.insert(2);

        assert_eq!(new.slot(), old.slot());
        assert_eq!(records.get(old), None);
        assert_eq!(records.get(new), Some(&2));
    }
}
