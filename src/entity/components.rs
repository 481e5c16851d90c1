use cgmath::{Deg, Matrix4, One, Quaternion, SquareMatrix, Vector3};

use crate::assets::{Material, Mesh};
use crate::handle::Handle;

use super::id::EntityId;
use super::store::{Component, DenseStore, HashStore};

/// Local-space transform relative to the [`Parent`], if any.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: f32,
}

impl Transform {
    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_scale(self.scale)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: 1.0,
        }
    }
}

impl Component for Transform {
    type Storage = DenseStore<Self>;
}

/// World-space matrix, written by `propagate_transforms` every frame.
#[derive(Clone, Copy, Debug)]
pub struct GlobalTransform(pub Matrix4<f32>);

impl Default for GlobalTransform {
    fn default() -> Self {
        Self(Matrix4::identity())
    }
}

impl Component for GlobalTransform {
    type Storage = DenseStore<Self>;
}

/// Hierarchy edge. An entity whose parent is dead or transformless is
/// treated as a root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parent {
    pub entity: EntityId,
}

impl Component for Parent {
    type Storage = HashStore<Self>;
}

/// The mesh an entity draws with. The handle does not own the asset,
/// the cache does.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticMesh {
    pub mesh: Handle<Mesh>,
}

impl Component for StaticMesh {
    type Storage = DenseStore<Self>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MeshRenderer {
    pub material: Handle<Material>,
}

impl Component for MeshRenderer {
    type Storage = DenseStore<Self>;
}

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub fov_y: Deg<f32>,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub fn projection(&self) -> Matrix4<f32> {
        cgmath::perspective(self.fov_y, self.aspect, self.z_near, self.z_far)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_y: Deg(60.0),
            aspect: 16.0 / 9.0,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }
}

impl Component for Camera {
    type Storage = HashStore<Self>;
}
