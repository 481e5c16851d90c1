use super::id::{EntityId, EntityIndex};
use super::store::{Component, Storage};
use super::world::World;

/// Component tuple accepted by [`World::each`]. Implemented for tuples
/// of arity 1 to 4; every member must be a distinct component type.
pub trait ComponentSet {
    type Refs<'w>;

    fn for_each<F>(world: &World, f: F)
    where
        F: for<'w> FnMut(EntityId, Self::Refs<'w>);
}

macro_rules! impl_component_set {
    ($(($ty:ident, $store:ident, $value:ident)),+) => {
        impl<$($ty: Component),+> ComponentSet for ($($ty,)+) {
            type Refs<'w> = ($(&'w mut $ty,)+);

            fn for_each<F>(world: &World, mut f: F)
            where
                F: for<'w> FnMut(EntityId, Self::Refs<'w>),
            {
                $(
                    let $store = match world.store_cell::<$ty>() {
                        Some(cell) => cell,
                        None => return,
                    };
                )+

                // snapshot the smallest store's rows in insertion
                // order, it drives the intersection
                let driver: Vec<EntityIndex> = {
                    $(let $store = $store.borrow();)+
                    let mut smallest = usize::MAX;
                    $(smallest = usize::min(smallest, $store.len());)+
                    if smallest == 0 {
                        return;
                    }
                    let mut rows = Vec::new();
                    $(
                        if rows.is_empty() && $store.len() == smallest {
                            rows = (0..smallest).map(|n| $store.index_at(n)).collect();
                        }
                    )+
                    rows
                };

                $(let mut $store = $store.borrow_mut();)+
                for index in driver {
                    $(
                        let $value = match $store.get_mut(index) {
                            Some(value) => value,
                            None => continue,
                        };
                    )+
                    if let Some(id) = world.entities.id_at(index) {
                        f(id, ($($value,)+));
                    }
                }
            }
        }
    };
}

impl_component_set!((A, a_store, a));
impl_component_set!((A, a_store, a), (B, b_store, b));
impl_component_set!((A, a_store, a), (B, b_store, b), (C, c_store, c));
impl_component_set!(
    (A, a_store, a),
    (B, b_store, b),
    (C, c_store, c),
    (D, d_store, d)
);
