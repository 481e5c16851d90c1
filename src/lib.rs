//! Resource and entity substrate for a realtime renderer: generational
//! handles, a deduplicating asset cache with offloaded decoding, and an
//! entity/component world with intersection queries. Rendering itself
//! is a collaborator; this crate hands it draw lists and resolved
//! resources.

pub mod assets;
pub mod entity;
pub mod error;
pub mod handle;
pub mod systems;

pub use assets::{
    Asset, AssetCache, AssetStatus, CacheSettings, FailedLoad, LoadMode, Material, MaterialDesc,
    Mesh, Texture, Vertex,
};
pub use entity::{
    Camera, Component, ComponentSet, DenseStore, EntityId, GlobalTransform, HashStore,
    MeshRenderer, Parent, StaticMesh, Storage, Transform, World,
};
pub use error::{HandleError, LoadError, WorldError};
pub use handle::{Handle, HandleTable};
pub use systems::{active_camera, extract_draw_list, propagate_transforms, DrawCommand, DrawList};
