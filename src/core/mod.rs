//! Engine core: timing, events, viewport and the world that wires them.

pub mod clock;
pub mod events;
pub mod viewport;
pub mod world;

pub use clock::{FrameClock, FrameTick};
pub use events::{EventChannel, Subscription};
pub use viewport::Viewport;
pub use world::{EngineCtx, World};
