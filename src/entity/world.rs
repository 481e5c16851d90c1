use std::any::{Any, TypeId};
use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::error::WorldError;

use super::id::{EntityAllocator, EntityId, EntityIndex};
use super::query::ComponentSet;
use super::store::{Component, Storage};

trait ErasedStore {
    fn remove_row(&mut self, index: EntityIndex);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedStore<C: Component> {
    cell: RefCell<C::Storage>,
}

impl<C: Component> ErasedStore for TypedStore<C> {
    fn remove_row(&mut self, index: EntityIndex) {
        self.cell.get_mut().remove(index);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Entity lifecycle plus the registry of per-type component stores.
/// Stores spring into existence on the first `add_component` of their
/// type. All mutation happens on the owning thread, there is no
/// internal locking.
pub struct World {
    pub(crate) entities: EntityAllocator,
    stores: FxHashMap<TypeId, Box<dyn ErasedStore>>,
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: EntityAllocator::new(),
            stores: FxHashMap::default(),
        }
    }

    pub fn create_entity(&mut self) -> EntityId {
        self.entities.create()
    }

    /// Removes the entity's row from every store, then retires the id.
    /// Destroying a dead or stale id is a no-op.
    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        if !self.entities.destroy(id) {
            log::warn!("destroy of dead entity {:?} ignored", id);
            return false;
        }
        for store in self.stores.values_mut() {
            store.remove_row(id.index());
        }
        true
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Inserts or replaces the entity's row. The returned reference is
    /// valid until the next structural mutation of the store, which the
    /// borrow on the world enforces.
    pub fn add_component<C: Component>(
        &mut self,
        id: EntityId,
        value: C,
    ) -> Result<&mut C, WorldError> {
        if !self.entities.is_alive(id) {
            return Err(WorldError::DeadEntity);
        }
        let store = self
            .stores
            .entry(TypeId::of::<C>())
            .or_insert_with(|| {
                Box::new(TypedStore::<C> {
                    cell: RefCell::new(C::Storage::default()),
                })
            })
            .as_any_mut()
            .downcast_mut::<TypedStore<C>>()
            .unwrap();
        Ok(store.cell.get_mut().insert(id.index(), value))
    }

    pub fn get_component<C: Component>(&mut self, id: EntityId) -> Result<&C, WorldError> {
        if !self.entities.is_alive(id) {
            return Err(WorldError::DeadEntity);
        }
        self.store_mut::<C>()
            .and_then(|store| store.get(id.index()))
            .ok_or(WorldError::MissingComponent(std::any::type_name::<C>()))
    }

    pub fn get_component_mut<C: Component>(
        &mut self,
        id: EntityId,
    ) -> Result<&mut C, WorldError> {
        if !self.entities.is_alive(id) {
            return Err(WorldError::DeadEntity);
        }
        self.store_mut::<C>()
            .and_then(|store| store.get_mut(id.index()))
            .ok_or(WorldError::MissingComponent(std::any::type_name::<C>()))
    }

    pub fn has_component<C: Component>(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
            && self
                .store_cell::<C>()
                .map_or(false, |cell| cell.borrow().has(id.index()))
    }

    /// Deletes the row if present, returning it. Absent rows and dead
    /// ids are a no-op.
    pub fn remove_component<C: Component>(&mut self, id: EntityId) -> Option<C> {
        if !self.entities.is_alive(id) {
            return None;
        }
        self.store_mut::<C>()?.remove(id.index())
    }

    /// Invokes `f` once for every entity holding all components of the
    /// tuple `Q`, with mutable access to each. The walk is driven in
    /// insertion order of the smallest participating store and is
    /// restartable per call; the order is not stable across structural
    /// mutation. A component type may appear at most once in `Q`.
    ///
    /// ```
    /// # use grund::entity::{World, Transform, GlobalTransform};
    /// # let mut world = World::new();
    /// world.each::<(Transform, GlobalTransform), _>(|_id, (local, global)| {
    ///     global.0 = local.matrix();
    /// });
    /// ```
    pub fn each<Q, F>(&self, f: F)
    where
        Q: ComponentSet,
        F: for<'w> FnMut(EntityId, Q::Refs<'w>),
    {
        Q::for_each(self, f);
    }

    pub(crate) fn store_cell<C: Component>(&self) -> Option<&RefCell<C::Storage>> {
        self.stores
            .get(&TypeId::of::<C>())
            .map(|store| &store.as_any().downcast_ref::<TypedStore<C>>().unwrap().cell)
    }

    fn store_mut<C: Component>(&mut self) -> Option<&mut C::Storage> {
        self.stores.get_mut(&TypeId::of::<C>()).map(|store| {
            store
                .as_any_mut()
                .downcast_mut::<TypedStore<C>>()
                .unwrap()
                .cell
                .get_mut()
        })
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
