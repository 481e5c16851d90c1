use cgmath::{Matrix4, SquareMatrix};

use crate::assets::{AssetCache, Material, Mesh, Texture};
use crate::entity::{Camera, EntityId, GlobalTransform, MeshRenderer, StaticMesh, World};
use crate::error::HandleError;
use crate::handle::Handle;

/// One resolved draw. The handles were checked against the cache when
/// the command was emitted; the consumer resolves them again to reach
/// the actual data.
#[derive(Clone, Copy, Debug)]
pub struct DrawCommand {
    pub mesh: Handle<Mesh>,
    pub material: Handle<Material>,
    pub transform: Matrix4<f32>,
}

#[derive(Default)]
pub struct DrawList {
    pub commands: Vec<DrawCommand>,
    /// Entities skipped because a resource is still loading. The caller
    /// decides whether to wait, substitute, or draw without them.
    pub not_ready: usize,
}

/// Walks every entity carrying a world transform, a mesh and a
/// material, resolves their resources and emits draw commands. Pending
/// resources are counted and skipped, stale ones skipped with a warn
/// log (the entity references something that was evicted).
pub fn extract_draw_list(world: &World, cache: &AssetCache) -> DrawList {
    profiling::scope!("extract_draw_list");
    let mut list = DrawList::default();

    world.each::<(GlobalTransform, StaticMesh, MeshRenderer), _>(|id, (global, mesh, renderer)| {
        match draw_state(cache, id, mesh, renderer) {
            Ok(()) => list.commands.push(DrawCommand {
                mesh: mesh.mesh,
                material: renderer.material,
                transform: global.0,
            }),
            Err(HandleError::NotReady) => list.not_ready += 1,
            Err(HandleError::Stale) => {}
        }
    });
    list
}

fn draw_state(
    cache: &AssetCache,
    id: EntityId,
    mesh: &StaticMesh,
    renderer: &MeshRenderer,
) -> Result<(), HandleError> {
    if let Err(error) = cache.resolve(mesh.mesh) {
        if error == HandleError::Stale {
            log::warn!("entity {:?} references a stale mesh, skipping", id);
        }
        return Err(error);
    }
    let material = match cache.resolve(renderer.material) {
        Ok(material) => material,
        Err(error) => {
            if error == HandleError::Stale {
                log::warn!("entity {:?} references a stale material, skipping", id);
            }
            return Err(error);
        }
    };
    if let Some(diffuse) = material.diffuse {
        if let Err(error) = cache.resolve::<Texture>(diffuse) {
            if error == HandleError::Stale {
                log::warn!("entity {:?} uses a material with a stale texture, skipping", id);
            }
            return Err(error);
        }
    }
    Ok(())
}

/// The first entity with both a camera and a world transform, paired
/// with its view-projection matrix.
pub fn active_camera(world: &World) -> Option<(EntityId, Matrix4<f32>)> {
    let mut found = None;
    world.each::<(Camera, GlobalTransform), _>(|id, (camera, global)| {
        if found.is_none() {
            if let Some(view) = global.0.invert() {
                found = Some((id, camera.projection() * view));
            }
        }
    });
    found
}
