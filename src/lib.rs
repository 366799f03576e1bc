// src/lib.rs
//! Atrium 3D viewer engine
//!
//! An interactive model viewer built on wgpu and winit: priority event bus,
//! scene graph, forward renderer with shadow mapping, selective bloom,
//! surface-point measurement and part status highlighting.

pub mod app;
pub mod core;
pub mod error;
pub mod gfx;
pub mod prelude;
pub mod scene;
pub mod ui;
pub mod viewer;

// Re-export main types for convenience
pub use app::ViewerApp;
pub use error::ViewerError;
pub use viewer::Viewer;

/// Creates a default windowed viewer application. Also installs the
/// `env_logger` backend so `RUST_LOG` works out of the box.
pub fn default() -> anyhow::Result<ViewerApp> {
    let _ = env_logger::try_init();
    ViewerApp::new()
}
