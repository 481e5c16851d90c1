use cgmath::Matrix4;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::entity::{EntityId, GlobalTransform, Parent, Transform, World};

/// Composes local transforms down [`Parent`] chains into
/// [`GlobalTransform`] rows. Parents without a transform of their own
/// contribute nothing, dead or missing parents make their children
/// roots. Cycles are cut where the chain revisits an entity.
pub fn propagate_transforms(world: &mut World) {
    profiling::scope!("propagate_transforms");

    let mut locals: FxHashMap<EntityId, Matrix4<f32>> = FxHashMap::default();
    world.each::<(Transform,), _>(|id, (transform,)| {
        locals.insert(id, transform.matrix());
    });
    let mut parents: FxHashMap<EntityId, EntityId> = FxHashMap::default();
    world.each::<(Parent,), _>(|id, (parent,)| {
        parents.insert(id, parent.entity);
    });

    let mut globals = Vec::with_capacity(locals.len());
    for (&id, &local) in &locals {
        let mut matrix = local;
        let mut seen = FxHashSet::default();
        seen.insert(id);
        let mut current = id;
        while let Some(&parent) = parents.get(&current) {
            if !seen.insert(parent) {
                log::warn!("transform hierarchy cycle at {:?}, cutting the chain", parent);
                break;
            }
            if let Some(&parent_local) = locals.get(&parent) {
                matrix = parent_local * matrix;
            }
            current = parent;
        }
        globals.push((id, GlobalTransform(matrix)));
    }

    for (id, global) in globals {
        let _ = world.add_component(id, global);
    }
}
