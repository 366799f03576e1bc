//! Graphics: camera, lights, renderer, bloom compositor, picking and the
//! measurement tool.

pub mod bloom;
pub mod controls;
pub mod lights;
pub mod measure;
pub mod picking;
pub mod renderer;
pub mod texture;
pub mod view;

pub use bloom::{BloomParams, SelectiveBloom};
pub use controls::CameraControls;
pub use lights::Lights;
pub use measure::{CompletedClick, MeasureState, MeasureTool, SurfaceRect};
pub use picking::{intersect_graph, Intersection, Ray};
pub use renderer::{Frame, Renderer};
pub use view::View;
