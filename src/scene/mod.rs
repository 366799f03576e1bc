//! Scene representation: node tree, geometry, materials.

pub mod geometry;
pub mod graph;
pub mod material;
pub mod node;
pub mod vertex;

pub use geometry::{Aabb, Geometry};
pub use graph::SceneGraph;
pub use material::{Material, MaterialOverrides};
pub use node::{LayerMask, Node, NodeId, NodeKind, Status};
pub use vertex::Vertex3D;
