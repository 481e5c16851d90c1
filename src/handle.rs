use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::HandleError;

pub type SlotIndex = u32;
pub type Generation = u32;

/// Typed reference into a [`HandleTable`]. Handles are freely copied and
/// carry no ownership, the table is the sole owner of the value. A handle
/// stays resolvable until its slot is freed, afterwards every outstanding
/// copy reports [`HandleError::Stale`].
pub struct Handle<T> {
    index: SlotIndex,
    generation: Generation,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn index(&self) -> SlotIndex {
        self.index
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

// Manual impls so that Handle<T> is copyable for every T.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

/// The null handle. Live slots always carry generation 1 or higher, so a
/// defaulted handle never resolves.
impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self {
            index: 0,
            generation: 0,
            marker: PhantomData,
        }
    }
}

enum SlotState<T> {
    Empty,
    Reserved,
    Occupied(T),
}

struct Slot<T> {
    generation: Generation,
    state: SlotState<T>,
}

// generation 0 stays reserved for the null handle
pub(crate) fn next_generation(generation: Generation) -> Generation {
    match generation.wrapping_add(1) {
        0 => 1,
        bumped => bumped,
    }
}

/// Generational slot allocator. Freed slots are tombstoned and reused,
/// their generation is bumped on free so stale handles are detected in
/// O(1). Reserved slots back in-flight asset loads: they hold no value
/// yet and resolve as [`HandleError::NotReady`].
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<SlotIndex>,
    live: usize,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Inserts a value into a free slot (reusing a tombstone if one
    /// exists) and returns the handle for it.
    pub fn allocate(&mut self, value: T) -> Handle<T> {
        self.claim(SlotState::Occupied(value))
    }

    /// Claims a slot for a value that is still being produced. Resolving
    /// the returned handle yields `NotReady` until [`Self::fulfill`] runs.
    pub fn reserve(&mut self) -> Handle<T> {
        self.claim(SlotState::Reserved)
    }

    fn claim(&mut self, state: SlotState<T>) -> Handle<T> {
        let index = match self.free_list.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                debug_assert!(matches!(slot.state, SlotState::Empty));
                slot.state = state;
                index
            }
            None => {
                assert!(
                    self.slots.len() < SlotIndex::MAX as usize,
                    "handle table exhausted"
                );
                self.slots.push(Slot {
                    generation: 1,
                    state,
                });
                (self.slots.len() - 1) as SlotIndex
            }
        };
        self.live += 1;
        Handle {
            index,
            generation: self.slots[index as usize].generation,
            marker: PhantomData,
        }
    }

    /// Flips a reserved slot to its final value. Fails with `Stale` if
    /// the slot was freed while the value was in flight, in which case
    /// the caller should discard the value.
    pub fn fulfill(&mut self, handle: Handle<T>, value: T) -> Result<(), HandleError> {
        match self.slot_mut(handle) {
            Some(slot) if matches!(slot.state, SlotState::Reserved) => {
                slot.state = SlotState::Occupied(value);
                Ok(())
            }
            _ => Err(HandleError::Stale),
        }
    }

    pub fn get(&self, handle: Handle<T>) -> Result<&T, HandleError> {
        match self.slot(handle).map(|slot| &slot.state) {
            Some(SlotState::Occupied(value)) => Ok(value),
            Some(SlotState::Reserved) => Err(HandleError::NotReady),
            _ => Err(HandleError::Stale),
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T, HandleError> {
        match self.slot_mut(handle).map(|slot| &mut slot.state) {
            Some(SlotState::Occupied(value)) => Ok(value),
            Some(SlotState::Reserved) => Err(HandleError::NotReady),
            _ => Err(HandleError::Stale),
        }
    }

    /// Drops the value and tombstones the slot. The generation bump makes
    /// every outstanding copy of the handle stale at once. Freeing an
    /// already stale handle is a no-op, the call reports whether anything
    /// was released.
    pub fn free(&mut self, handle: Handle<T>) -> bool {
        let slot = match self.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation => slot,
            _ => return false,
        };
        if matches!(slot.state, SlotState::Empty) {
            return false;
        }
        slot.state = SlotState::Empty;
        slot.generation = next_generation(slot.generation);
        self.free_list.push(handle.index);
        self.live -= 1;
        true
    }

    /// Number of live slots, reserved ones included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total slots ever touched, freed ones included. Stays flat under
    /// alloc/free churn because tombstones are reused.
    #[allow(unused)]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, handle: Handle<T>) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    fn slot_mut(&mut self, handle: Handle<T>) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
