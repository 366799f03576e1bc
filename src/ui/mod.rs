//! Developer debug panel, rendered with Dear ImGui on top of the frame.
//!
//! The panel is opt-in: it only exists when the `ATRIUM_DEBUG` environment
//! variable is set, mirroring a hidden-flag debug mode. It exposes the
//! measurement tool state and the live bloom tuning knobs.

use imgui::{Condition, Context, FontConfig, FontSource, MouseCursor};
use imgui_wgpu::{Renderer as ImguiRenderer, RendererConfig};
use imgui_winit_support::{HiDpiMode, WinitPlatform};
use std::sync::Arc;
use std::time::Instant;
use winit::event::{Event, WindowEvent};
use winit::window::Window;

use crate::core::viewport::Viewport;
use crate::gfx::bloom::SelectiveBloom;
use crate::gfx::measure::MeasureTool;
use crate::gfx::renderer::{Frame, Renderer};
use crate::scene::graph::SceneGraph;

/// Name of the environment variable that enables the panel.
pub const DEBUG_ENV_VAR: &str = "ATRIUM_DEBUG";

/// True when the debug panel should be created.
pub fn debug_enabled() -> bool {
    std::env::var_os(DEBUG_ENV_VAR).is_some()
}

/// ImGui overlay with engine tuning controls.
pub struct DebugPanel {
    context: Context,
    platform: WinitPlatform,
    renderer: ImguiRenderer,
    window: Arc<Window>,
    last_frame: Instant,
    last_cursor: Option<MouseCursor>,
}

impl DebugPanel {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        output_format: wgpu::TextureFormat,
        window: Arc<Window>,
    ) -> Self {
        let mut context = Context::create();
        context.set_ini_filename(None);

        // Locked DPI: display size is driven manually from the viewport.
        let mut platform = WinitPlatform::new(&mut context);
        platform.attach_window(context.io_mut(), &window, HiDpiMode::Locked(1.0));

        context.fonts().add_font(&[FontSource::DefaultFontData {
            config: Some(FontConfig {
                oversample_h: 1,
                pixel_snap_h: true,
                size_pixels: 16.0,
                ..Default::default()
            }),
        }]);

        let renderer = ImguiRenderer::new(
            &mut context,
            device,
            queue,
            RendererConfig {
                texture_format: output_format,
                ..Default::default()
            },
        );

        Self {
            context,
            platform,
            renderer,
            window,
            last_frame: Instant::now(),
            last_cursor: None,
        }
    }

    /// Syncs the UI display size with the render surface.
    pub fn resize(&mut self, viewport: &Viewport) {
        self.context.io_mut().display_size = [
            viewport.physical_width() as f32,
            viewport.physical_height() as f32,
        ];
    }

    /// Feeds an input event to the UI. Returns true when the UI captured
    /// it, in which case camera and measurement input must skip it.
    pub fn handle_input<T>(&mut self, event: &Event<T>) -> bool {
        match event {
            Event::WindowEvent {
                event:
                    WindowEvent::CursorMoved { .. }
                    | WindowEvent::MouseInput { .. }
                    | WindowEvent::MouseWheel { .. }
                    | WindowEvent::KeyboardInput { .. }
                    | WindowEvent::Focused(_),
                ..
            } => {
                self.platform
                    .handle_event(self.context.io_mut(), &self.window, event);
                let io = self.context.io();
                io.want_capture_mouse || io.want_capture_keyboard
            }
            _ => false,
        }
    }

    /// Builds and renders the panel into the current frame.
    pub fn draw(
        &mut self,
        renderer: &Renderer,
        frame: &mut Frame,
        graph: &mut SceneGraph,
        measure: &mut MeasureTool,
        bloom: Option<&mut SelectiveBloom>,
    ) {
        let Self {
            context,
            platform,
            renderer: imgui_renderer,
            window,
            last_frame,
            last_cursor,
        } = self;

        let now = Instant::now();
        context.io_mut().update_delta_time(now - *last_frame);
        *last_frame = now;

        if platform.prepare_frame(context.io_mut(), window).is_err() {
            log::warn!("debug panel frame preparation failed, skipping");
            return;
        }

        let ui = context.frame();
        ui.window("engine debug")
            .size([320.0, 260.0], Condition::FirstUseEver)
            .build(|| {
                ui.text(format!("nodes: {}", graph.node_count()));
                ui.separator();

                let mut active = measure.is_active();
                if ui.checkbox("measure distances", &mut active) {
                    measure.set_active(active, graph);
                }
                match measure.last_distance() {
                    Some(d) => ui.text(format!("last distance: {d:.4}")),
                    None => ui.text_disabled("last distance: -"),
                }

                if let Some(bloom) = bloom {
                    ui.separator();
                    ui.text("bloom");
                    ui.slider("threshold", 0.0, 1.0, &mut bloom.params.threshold);
                    ui.slider("strength", 0.0, 3.0, &mut bloom.params.strength);
                    ui.slider("radius", 0.0, 1.0, &mut bloom.params.radius);
                    ui.slider("exposure", 0.1, 2.0, &mut bloom.params.exposure);
                }
            });

        if *last_cursor != ui.mouse_cursor() {
            *last_cursor = ui.mouse_cursor();
            platform.prepare_render(ui, window);
        }

        let draw_data = context.render();
        if draw_data.display_size[0] <= 0.0 || draw_data.display_size[1] <= 0.0 {
            return;
        }

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("debug_panel_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    // Overlay on top of the rendered scene.
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Err(e) =
            imgui_renderer.render(draw_data, renderer.queue(), renderer.device(), &mut pass)
        {
            log::error!("debug panel render failed: {e}");
        }
    }
}
