//! # Atrium Prelude
//!
//! One-stop import for typical viewer applications:
//!
//! ```rust
//! use atrium::prelude::*;
//! ```

// Re-export core application types
pub use crate::app::ViewerApp;
pub use crate::default;
pub use crate::error::ViewerError;

// Engine core
pub use crate::core::clock::FrameTick;
pub use crate::core::events::{EventChannel, Subscription};
pub use crate::core::viewport::Viewport;
pub use crate::core::world::{EngineCtx, World};

// Scene types
pub use crate::scene::geometry::{Aabb, Geometry};
pub use crate::scene::graph::SceneGraph;
pub use crate::scene::material::{Material, MaterialOverrides};
pub use crate::scene::node::{LayerMask, Node, NodeId, Status};

// Graphics features
pub use crate::gfx::bloom::{BloomParams, SelectiveBloom};
pub use crate::gfx::measure::{MeasureState, MeasureTool};
pub use crate::gfx::picking::{intersect_graph, Ray};

// Viewer session
pub use crate::viewer::loader::{LoadError, ModelLoader, ObjModelLoader};
pub use crate::viewer::observable::Observable;
pub use crate::viewer::{LoadStatus, Viewer};

// Re-export common external dependencies
pub use cgmath::{InnerSpace, Matrix4, Point3, Vector3, Zero};
