//! The engine root: owns every subsystem and drives the tick and resize
//! event order.

use crate::core::clock::{FrameClock, FrameTick};
use crate::core::events::EventChannel;
use crate::core::viewport::Viewport;
use crate::error::ViewerError;
use crate::gfx::bloom::SelectiveBloom;
use crate::gfx::controls::CameraControls;
use crate::gfx::lights::Lights;
use crate::gfx::measure::MeasureTool;
use crate::gfx::renderer::Renderer;
use crate::gfx::view::View;
use crate::scene::graph::SceneGraph;
use crate::ui::DebugPanel;

/// Everything tick and resize handlers may touch. Handlers destructure
/// this to borrow the fields they need independently.
pub struct EngineCtx {
    pub viewport: Viewport,
    pub graph: SceneGraph,
    pub view: View,
    pub controls: CameraControls,
    pub measure: MeasureTool,
    pub lights: Lights,
    /// Present only after a window is attached; headless worlds render
    /// nothing but run every other system.
    pub renderer: Option<Renderer>,
    pub bloom: Option<SelectiveBloom>,
    pub debug: Option<DebugPanel>,
}

/// Owns the clock, the event channels and the [`EngineCtx`].
///
/// Construction wires the built-in systems: camera update (tick 0),
/// measurement update (tick 1) and frame presentation (tick 5); camera
/// aspect sync (resize 0) and surface/compositor reconfiguration
/// (resize 5). Applications hook in anywhere around them.
pub struct World {
    clock: FrameClock,
    pub on_tick: EventChannel<FrameTick, EngineCtx>,
    pub on_resize: EventChannel<Viewport, EngineCtx>,
    pub ctx: EngineCtx,
    disposed: bool,
}

impl World {
    pub fn new(viewport: Viewport) -> Self {
        let view = View::new(&viewport);
        let mut on_tick: EventChannel<FrameTick, EngineCtx> = EventChannel::new();
        let mut on_resize: EventChannel<Viewport, EngineCtx> = EventChannel::new();

        on_tick.subscribe(0, |_, ctx| {
            let EngineCtx { controls, view, .. } = ctx;
            controls.update(view);
        });

        on_tick.subscribe(1, |_, ctx| {
            let EngineCtx {
                measure,
                graph,
                view,
                ..
            } = ctx;
            measure.update(graph, view);
        });

        on_tick.subscribe(5, |_, ctx| {
            let EngineCtx {
                graph,
                view,
                lights,
                measure,
                renderer,
                bloom,
                debug,
                ..
            } = ctx;
            let Some(renderer) = renderer.as_mut() else {
                return;
            };
            let mut frame = match renderer.begin_frame() {
                Ok(frame) => frame,
                Err(ViewerError::Surface(
                    wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                )) => {
                    log::warn!("surface lost, reconfiguring");
                    renderer.reconfigure();
                    return;
                }
                Err(e) => {
                    log::error!("failed to acquire frame: {e}");
                    return;
                }
            };
            if !renderer.is_running() {
                // Drop the frame unpresented; event flow stays alive so a
                // later start() resumes cleanly.
                return;
            }
            match bloom.as_mut() {
                Some(bloom) => bloom.render(renderer, &mut frame, graph, view, lights),
                None => renderer.draw(&mut frame, graph, view, lights),
            }
            if let Some(debug) = debug.as_mut() {
                debug.draw(renderer, &mut frame, graph, measure, bloom.as_mut());
            }
            renderer.end_frame(frame);
        });

        on_resize.subscribe(0, |viewport, ctx| {
            ctx.view.resize(viewport);
        });

        on_resize.subscribe(5, |viewport, ctx| {
            let EngineCtx {
                renderer,
                bloom,
                debug,
                ..
            } = ctx;
            let Some(renderer) = renderer.as_mut() else {
                return;
            };
            renderer.resize(viewport);
            if let Some(bloom) = bloom.as_mut() {
                bloom.resize(renderer.device(), viewport);
            }
            if let Some(debug) = debug.as_mut() {
                debug.resize(viewport);
            }
        });

        Self {
            clock: FrameClock::new(),
            on_tick,
            on_resize,
            ctx: EngineCtx {
                viewport,
                graph: SceneGraph::new(),
                view,
                controls: CameraControls::new(),
                measure: MeasureTool::new(),
                lights: Lights::default(),
                renderer: None,
                bloom: None,
                debug: None,
            },
            disposed: false,
        }
    }

    /// Advances the clock and runs every tick subscriber in priority
    /// order. Returns the tick, or `None` after dispose.
    pub fn tick(&mut self) -> Option<FrameTick> {
        if self.disposed {
            debug_assert!(false, "World::tick called after dispose");
            log::error!("world ticked after dispose, ignoring");
            return None;
        }
        let tick = self.clock.advance()?;
        self.on_tick.emit(&tick, &mut self.ctx);
        Some(tick)
    }

    /// Remeasures the viewport and runs every resize subscriber.
    pub fn resize(&mut self, width: u32, height: u32, scale_factor: f32) {
        if self.disposed {
            return;
        }
        self.ctx.viewport.measure(width, height, scale_factor);
        let snapshot = self.ctx.viewport;
        self.on_resize.emit(&snapshot, &mut self.ctx);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Tears everything down in dependency order: UI first, then the
    /// clock and channels, then scene resources, the compositor and
    /// finally the renderer. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.ctx.debug = None;
        self.clock.dispose();
        self.on_tick.clear();
        self.on_resize.clear();
        self.ctx.graph.dispose();
        self.ctx.bloom = None;
        self.ctx.renderer = None;
    }
}
