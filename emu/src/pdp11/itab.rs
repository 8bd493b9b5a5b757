//! # Interrupt table
//!
//! Pending external interrupts, kept sorted so slot 0 is always the next one
//! to service: highest priority first, lowest vector first among equals.
//! Vector 0 marks an empty slot.

pub const SLOTS: usize = 8;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    pub vector: u16,
    pub priority: u8,
}

impl Interrupt {
    const fn is_empty(self) -> bool {
        self.vector == 0
    }

    /// Sort key: true when `self` must be serviced before `other`.
    const fn ranks_before(self, other: Self) -> bool {
        self.priority > other.priority
            || (self.priority == other.priority && self.vector < other.vector)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// Vectors are word addresses, and 0 means "empty".
    InvalidVector(u16),
    Full,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InterruptTable {
    slots: [Interrupt; SLOTS],
}

impl InterruptTable {
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().take_while(|i| !i.is_empty()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots[0].is_empty()
    }

    pub fn clear(&mut self) {
        self.slots = [Interrupt::default(); SLOTS];
    }

    #[must_use]
    pub fn front(&self) -> Option<Interrupt> {
        Some(self.slots[0]).filter(|i| !i.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = Interrupt> + '_ {
        self.slots.iter().copied().take_while(|i| !i.is_empty())
    }

    #[must_use]
    pub fn contains(&self, vector: u16) -> bool {
        self.iter().any(|i| i.vector == vector)
    }

    /// Removes and returns slot 0, shifting the rest up.
    pub fn pop_front(&mut self) -> Option<Interrupt> {
        let front = self.front()?;
        self.remove(0);
        Some(front)
    }

    /// Queues `vector` at `priority`. An identical pending entry is left
    /// alone; a pending entry for the same vector at another priority is
    /// moved.
    pub fn insert(&mut self, vector: u16, priority: u8) -> Result<(), InsertError> {
        if vector == 0 || vector & 1 != 0 {
            return Err(InsertError::InvalidVector(vector));
        }
        let entry = Interrupt { vector, priority };

        let pending = self.iter().position(|i| i.vector == vector);
        if let Some(index) = pending {
            if self.slots[index] == entry {
                return Ok(());
            }
            self.remove(index);
        }

        let len = self.len();
        if len == SLOTS {
            return Err(InsertError::Full);
        }

        let rank = self.slots[..len]
            .iter()
            .position(|i| entry.ranks_before(*i))
            .unwrap_or(len);
        self.slots.copy_within(rank..len, rank + 1);
        self.slots[rank] = entry;
        Ok(())
    }

    fn remove(&mut self, index: usize) {
        self.slots.copy_within(index + 1.., index);
        self.slots[SLOTS - 1] = Interrupt::default();
    }
}
