use rustc_hash::FxHashMap;

use super::id::EntityIndex;

/// Marks a component type and picks the backend its rows live in.
/// Frequently-held components want [`DenseStore`], rare ones
/// [`HashStore`].
pub trait Component: Sized + Send + Sync + 'static {
    type Storage: Storage<Self> + Send + 'static;
}

/// Per-type component rows keyed by entity index. At most one row per
/// entity. Rows keep insertion order, which drives `World::each`; a
/// removal may reorder the tail (swap removal), so the order is not
/// stable across structural mutation.
pub trait Storage<C>: Default {
    fn get(&self, index: EntityIndex) -> Option<&C>;

    fn get_mut(&mut self, index: EntityIndex) -> Option<&mut C>;

    /// Inserts or replaces the row.
    fn insert(&mut self, index: EntityIndex, value: C) -> &mut C;

    fn remove(&mut self, index: EntityIndex) -> Option<C>;

    fn has(&self, index: EntityIndex) -> bool;

    fn len(&self) -> usize;

    /// Entity index of the n-th row in current order. `n` must be below
    /// [`Self::len`].
    fn index_at(&self, n: usize) -> EntityIndex;
}

const NO_ROW: EntityIndex = !0;

/// Sparse-set storage: a sparse index vector over dense value rows.
/// O(1) everything, memory proportional to the highest entity index.
pub struct DenseStore<C> {
    sparse: Vec<EntityIndex>,
    entities: Vec<EntityIndex>,
    values: Vec<C>,
}

impl<C> DenseStore<C> {
    fn position(&self, index: EntityIndex) -> Option<usize> {
        match self.sparse.get(index as usize) {
            Some(&pos) if pos != NO_ROW => Some(pos as usize),
            _ => None,
        }
    }

    fn ensure(&mut self, index: EntityIndex) {
        if index as usize >= self.sparse.len() {
            self.sparse.resize(index as usize + 1, NO_ROW);
        }
    }
}

impl<C> Default for DenseStore<C> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            entities: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<C: 'static> Storage<C> for DenseStore<C> {
    fn get(&self, index: EntityIndex) -> Option<&C> {
        self.position(index).map(|pos| &self.values[pos])
    }

    fn get_mut(&mut self, index: EntityIndex) -> Option<&mut C> {
        self.position(index).map(|pos| &mut self.values[pos])
    }

    fn insert(&mut self, index: EntityIndex, value: C) -> &mut C {
        match self.position(index) {
            Some(pos) => {
                self.values[pos] = value;
                &mut self.values[pos]
            }
            None => {
                self.ensure(index);
                self.values.push(value);
                self.entities.push(index);
                self.sparse[index as usize] = (self.values.len() - 1) as EntityIndex;
                self.values.last_mut().unwrap()
            }
        }
    }

    fn remove(&mut self, index: EntityIndex) -> Option<C> {
        let pos = self.position(index)?;
        let value = self.values.swap_remove(pos);
        self.entities.swap_remove(pos);
        self.sparse[index as usize] = NO_ROW;
        if pos < self.entities.len() {
            let moved = self.entities[pos];
            self.sparse[moved as usize] = pos as EntityIndex;
        }
        Some(value)
    }

    fn has(&self, index: EntityIndex) -> bool {
        self.position(index).is_some()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn index_at(&self, n: usize) -> EntityIndex {
        self.entities[n]
    }
}

/// Hash-backed storage for components held by few entities, where a
/// sparse vector over the whole index range would be wasted memory.
pub struct HashStore<C> {
    lookup: FxHashMap<EntityIndex, u32>,
    entities: Vec<EntityIndex>,
    values: Vec<C>,
}

impl<C> Default for HashStore<C> {
    fn default() -> Self {
        Self {
            lookup: FxHashMap::default(),
            entities: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<C: 'static> Storage<C> for HashStore<C> {
    fn get(&self, index: EntityIndex) -> Option<&C> {
        self.lookup.get(&index).map(|&pos| &self.values[pos as usize])
    }

    fn get_mut(&mut self, index: EntityIndex) -> Option<&mut C> {
        match self.lookup.get(&index) {
            Some(&pos) => Some(&mut self.values[pos as usize]),
            None => None,
        }
    }

    fn insert(&mut self, index: EntityIndex, value: C) -> &mut C {
        match self.lookup.get(&index) {
            Some(&pos) => {
                self.values[pos as usize] = value;
                &mut self.values[pos as usize]
            }
            None => {
                self.values.push(value);
                self.entities.push(index);
                self.lookup.insert(index, (self.values.len() - 1) as u32);
                self.values.last_mut().unwrap()
            }
        }
    }

    fn remove(&mut self, index: EntityIndex) -> Option<C> {
        let pos = self.lookup.remove(&index)? as usize;
        let value = self.values.swap_remove(pos);
        self.entities.swap_remove(pos);
        if pos < self.entities.len() {
            let moved = self.entities[pos];
            self.lookup.insert(moved, pos as u32);
        }
        Some(value)
    }

    fn has(&self, index: EntityIndex) -> bool {
        self.lookup.contains_key(&index)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn index_at(&self, n: usize) -> EntityIndex {
        self.entities[n]
    }
}
