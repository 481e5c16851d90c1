use crate::handle::next_generation;

pub type EntityIndex = u32;

/// Identifies a row across all component stores. Copyable, comparable,
/// owns nothing. Identifiers are never resurrected: destroying an entity
/// bumps the slot generation, so a later create on the same index yields
/// a different id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EntityId {
    pub(crate) index: EntityIndex,
    pub(crate) generation: u32,
}

impl EntityId {
    pub fn index(&self) -> EntityIndex {
        self.index
    }
}

struct EntitySlot {
    generation: u32,
    alive: bool,
}

pub(crate) struct EntityAllocator {
    slots: Vec<EntitySlot>,
    free_list: Vec<EntityIndex>,
    live: usize,
}

impl EntityAllocator {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn create(&mut self) -> EntityId {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                assert!(
                    self.slots.len() < EntityIndex::MAX as usize,
                    "entity index space exhausted"
                );
                self.slots.push(EntitySlot {
                    generation: 1,
                    alive: false,
                });
                (self.slots.len() - 1) as EntityIndex
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.alive = true;
        self.live += 1;
        EntityId {
            index,
            generation: slot.generation,
        }
    }

    /// Retires the id. Double destroy and stale ids report false.
    pub(crate) fn destroy(&mut self, id: EntityId) -> bool {
        let slot = match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.alive && slot.generation == id.generation => slot,
            _ => return false,
        };
        slot.alive = false;
        slot.generation = next_generation(slot.generation);
        self.free_list.push(id.index);
        self.live -= 1;
        true
    }

    pub(crate) fn is_alive(&self, id: EntityId) -> bool {
        match self.slots.get(id.index as usize) {
            Some(slot) => slot.alive && slot.generation == id.generation,
            None => false,
        }
    }

    /// The live id currently occupying an index, used to rebuild ids
    /// from store rows during iteration.
    pub(crate) fn id_at(&self, index: EntityIndex) -> Option<EntityId> {
        let slot = self.slots.get(index as usize)?;
        if slot.alive {
            Some(EntityId {
                index,
                generation: slot.generation,
            })
        } else {
            None
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_destroy() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.create();
        assert!(alloc.is_alive(e));
        assert_eq!(alloc.len(), 1);

        assert!(alloc.destroy(e));
        assert!(!alloc.is_alive(e));
        assert_eq!(alloc.len(), 0);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.create();
        assert!(alloc.destroy(e));
        assert!(!alloc.destroy(e));
    }

    #[test]
    fn ids_are_never_reused() {
        let mut alloc = EntityAllocator::new();
        let first = alloc.create();
        alloc.destroy(first);

        let second = alloc.create();
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);
        assert!(!alloc.is_alive(first));
        assert!(alloc.is_alive(second));
    }

    #[test]
    fn id_at_skips_dead_slots() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.create();
        assert_eq!(alloc.id_at(e.index()), Some(e));
        alloc.destroy(e);
        assert_eq!(alloc.id_at(e.index()), None);
        assert_eq!(alloc.id_at(42), None);
    }
}
