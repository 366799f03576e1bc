//! Windowed application shell wiring winit events into the [`Viewer`].

use std::path::PathBuf;
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

use crate::core::viewport::Viewport;
use crate::core::world::EngineCtx;
use crate::gfx::measure::SurfaceRect;
use crate::viewer::loader::ObjModelLoader;
use crate::viewer::Viewer;

pub struct ViewerApp {
    event_loop: Option<EventLoop<()>>,
    state: AppState,
}

struct AppState {
    window: Option<Arc<Window>>,
    viewer: Viewer,
    model_path: Option<PathBuf>,
}

impl ViewerApp {
    pub fn new() -> anyhow::Result<Self> {
        let event_loop = EventLoop::new()?;
        Ok(Self {
            event_loop: Some(event_loop),
            state: AppState {
                window: None,
                viewer: Viewer::new(Viewport::new(1280, 800, 1.0)),
                model_path: None,
            },
        })
    }

    /// Queues an OBJ model to load once the window is up.
    pub fn with_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.state.model_path = Some(path.into());
        self
    }

    pub fn viewer_mut(&mut self) -> &mut Viewer {
        &mut self.state.viewer
    }

    /// Runs the event loop until the window closes.
    pub fn run(mut self) -> anyhow::Result<()> {
        let event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| anyhow::anyhow!("event loop already consumed"))?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self.state)?;
        Ok(())
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title("atrium")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 800));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.viewer.attach_window(window.clone()) {
            log::error!("failed to initialize GPU stack: {e}");
            event_loop.exit();
            return;
        }

        let scale = window.scale_factor();
        let size = window.inner_size().to_logical::<u32>(scale);
        self.viewer
            .world
            .resize(size.width, size.height, scale as f32);

        if let Some(path) = self.model_path.take() {
            if let Err(e) = self.viewer.load_model(ObjModelLoader::new(path)) {
                log::error!("could not start model load: {e}");
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };

        // The debug panel sees input first and may capture it.
        if let Some(debug) = self.viewer.world.ctx.debug.as_mut() {
            let wrapped: winit::event::Event<()> = winit::event::Event::WindowEvent {
                window_id,
                event: event.clone(),
            };
            if debug.handle_input(&wrapped) {
                window.request_redraw();
                return;
            }
        }

        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let size = window.inner_size();
                let rect = SurfaceRect::of_window(size.width as f32, size.height as f32);
                self.viewer.world.ctx.measure.on_pointer_move(
                    position.x as f32,
                    position.y as f32,
                    &rect,
                );
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left && state == ElementState::Pressed {
                    let EngineCtx { measure, graph, .. } = &mut self.viewer.world.ctx;
                    measure.on_click(graph);
                }
                self.viewer
                    .world
                    .ctx
                    .controls
                    .process_mouse_input(button, state);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if matches!(
                    event.physical_key,
                    winit::keyboard::PhysicalKey::Code(winit::keyboard::KeyCode::Escape)
                ) {
                    self.viewer.dispose();
                    event_loop.exit();
                    return;
                }
                self.viewer.world.ctx.controls.process_key_event(&event);
            }
            WindowEvent::Resized(size) => {
                let scale = window.scale_factor();
                let logical = size.to_logical::<u32>(scale);
                self.viewer
                    .world
                    .resize(logical.width, logical.height, scale as f32);
            }
            WindowEvent::RedrawRequested => {
                self.viewer.update();
            }
            WindowEvent::CloseRequested => {
                self.viewer.dispose();
                event_loop.exit();
            }
            _ => (),
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: winit::event::DeviceEvent,
    ) {
        self.viewer.world.ctx.controls.process_device_event(&event);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
