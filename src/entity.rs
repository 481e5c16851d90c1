pub mod components;
pub mod id;
pub mod query;
pub mod store;
pub mod world;

pub use components::{Camera, GlobalTransform, MeshRenderer, Parent, StaticMesh, Transform};
pub use id::EntityId;
pub use query::ComponentSet;
pub use store::{Component, DenseStore, HashStore, Storage};
pub use world::World;
