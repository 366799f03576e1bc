//! Error taxonomy for the viewer engine.

use thiserror::Error;

use crate::viewer::loader::LoadError;

/// Top-level error type surfaced at the application boundary.
///
/// Per-tick failures (camera update, compositor render) are deliberately
/// *not* represented here: they are caught and logged inside the frame loop
/// so a failing subsystem skips its work for the tick without stopping the
/// scheduler.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// The model-loading collaborator failed. The session keeps no partial
    /// model; callers may retry by invoking the load again.
    #[error("model load failed: {0}")]
    Load(#[from] LoadError),

    /// A component was used outside its lifecycle bounds. This is a caller
    /// bug and fails loudly (debug assertion) rather than silently no-op'ing.
    #[error("{0} accessed after dispose")]
    DisposedAccess(&'static str),

    /// The render surface could not produce a frame.
    #[error("render surface unavailable: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}
