//! wgpu renderer: surface management, the shadow and forward passes, and
//! the per-frame encoder handed to the compositor and UI overlay.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;
use wgpu::TextureFormat;

use crate::core::viewport::Viewport;
use crate::error::ViewerError;
use crate::gfx::lights::Lights;
use crate::gfx::texture::TextureResource;
use crate::gfx::view::View;
use crate::scene::graph::SceneGraph;
use crate::scene::node::NodeId;
use crate::scene::vertex::Vertex3D;

/// Format of the offscreen targets the bloom chain renders into.
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

const SHADOW_MAP_SIZE: u32 = 2048;

/// Per-frame uniform block; layout must match `shaders/scene.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct GlobalUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    /// rgb + intensity.
    ambient_color: [f32; 4],
    light_position: [f32; 4],
    /// rgb + intensity.
    light_color: [f32; 4],
}

/// Per-drawable transform block.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct NodeUniform {
    model: [[f32; 4]; 4],
}

/// Uniform buffers and bind group for one drawable, created lazily on the
/// first frame the node is drawn and pruned when it leaves the graph.
struct NodeGpu {
    transform_buffer: wgpu::Buffer,
    material_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl NodeGpu {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let transform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("node_transform_buffer"),
            size: std::mem::size_of::<NodeUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let material_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("node_material_buffer"),
            size: std::mem::size_of::<crate::scene::material::MaterialUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("node_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: transform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: material_buffer.as_entire_binding(),
                },
            ],
        });
        Self {
            transform_buffer,
            material_buffer,
            bind_group,
        }
    }
}

/// An in-flight frame: acquired surface texture plus the command encoder
/// every pass of the frame records into.
pub struct Frame {
    surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}

/// The rendering system.
///
/// Owns the swapchain, depth and shadow resources and all pipelines.
/// [`start`](Self::start)/[`stop`](Self::stop) gate drawing without
/// touching event wiring; a stopped renderer keeps its resize handling so
/// restarting picks up the current surface size.
pub struct Renderer {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    format: TextureFormat,

    depth: TextureResource,
    shadow_map: TextureResource,
    shadow_bind_group: wgpu::BindGroup,

    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    node_layout: wgpu::BindGroupLayout,

    scene_pipeline: wgpu::RenderPipeline,
    hdr_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,

    node_resources: HashMap<NodeId, NodeGpu>,
    running: bool,
    pub clear_color: wgpu::Color,
}

impl Renderer {
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        viewport: &Viewport,
    ) -> anyhow::Result<Renderer> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("viewer_device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(surface_capabilities.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: viewport.physical_width(),
            height: viewport.physical_height(),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_capabilities.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth =
            TextureResource::create_depth_texture(&device, config.width, config.height, "depth");
        let shadow_map = TextureResource::create_shadow_map(&device, SHADOW_MAP_SIZE);

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let global_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("global_uniform_buffer"),
            contents: bytemuck::bytes_of(&GlobalUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global_bind_group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let node_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("node_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let shadow_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Depth,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });
        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_bind_group"),
            layout: &shadow_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&shadow_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&shadow_map.sampler),
                },
            ],
        });

        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });
        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/shadow.wgsl").into()),
        });

        let scene_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("scene_pipeline_layout"),
                bind_group_layouts: &[&global_layout, &node_layout, &shadow_layout],
                push_constant_ranges: &[],
            });

        let scene_pipeline =
            create_scene_pipeline(&device, &scene_shader, &scene_pipeline_layout, format);
        let hdr_pipeline =
            create_scene_pipeline(&device, &scene_shader, &scene_pipeline_layout, HDR_FORMAT);

        let shadow_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("shadow_pipeline_layout"),
                bind_group_layouts: &[&global_layout, &node_layout],
                push_constant_ranges: &[],
            });
        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow_pipeline"),
            layout: Some(&shadow_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shadow_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex3D::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: TextureResource::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        log::info!(
            "renderer initialized: {}x{} {:?}",
            config.width,
            config.height,
            format
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            format,
            depth,
            shadow_map,
            shadow_bind_group,
            global_buffer,
            global_bind_group,
            node_layout,
            scene_pipeline,
            hdr_pipeline,
            shadow_pipeline,
            node_resources: HashMap::new(),
            running: true,
            clear_color: wgpu::Color {
                r: 0.09,
                g: 0.09,
                b: 0.11,
                a: 1.0,
            },
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn surface_format(&self) -> TextureFormat {
        self.format
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Resumes drawing. No-op when already running.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Suspends drawing; the surface stays configured and events keep
    /// flowing, so `start` picks up exactly where the loop left off.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Reconfigures the surface for a new viewport and recreates the depth
    /// buffer to match.
    pub fn resize(&mut self, viewport: &Viewport) {
        self.config.width = viewport.physical_width();
        self.config.height = viewport.physical_height();
        self.surface.configure(&self.device, &self.config);
        self.depth = TextureResource::create_depth_texture(
            &self.device,
            self.config.width,
            self.config.height,
            "depth",
        );
    }

    /// Re-applies the current surface configuration after a Lost/Outdated
    /// surface error.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Acquires the next swapchain image and opens a command encoder.
    pub fn begin_frame(&mut self) -> Result<Frame, ViewerError> {
        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        Ok(Frame {
            surface_texture,
            view,
            encoder,
        })
    }

    /// Submits the frame's commands and presents.
    pub fn end_frame(&mut self, frame: Frame) {
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        frame.surface_texture.present();
    }

    /// Writes the per-frame camera and light uniforms.
    pub fn update_globals(&mut self, view: &View, lights: &Lights) {
        let uniform = GlobalUniform {
            view_position: [view.eye.x, view.eye.y, view.eye.z, 1.0],
            view_proj: view.view_projection().into(),
            light_view_proj: lights.light_view_proj().into(),
            ambient_color: [
                lights.ambient.color[0],
                lights.ambient.color[1],
                lights.ambient.color[2],
                lights.ambient.intensity,
            ],
            light_position: [
                lights.directional.position.x,
                lights.directional.position.y,
                lights.directional.position.z,
                1.0,
            ],
            light_color: [
                lights.directional.color[0],
                lights.directional.color[1],
                lights.directional.color[2],
                lights.directional.intensity,
            ],
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Walks the visible graph, creating GPU buffers as needed and writing
    /// this frame's transform and material uniforms. Returns the draw list
    /// and prunes resources for nodes that left the graph.
    pub(crate) fn upload(&mut self, graph: &mut SceneGraph) -> Vec<NodeId> {
        let Renderer {
            device,
            queue,
            node_resources,
            node_layout,
            ..
        } = self;

        let mut items = Vec::new();
        graph.traverse_world_mut(&mut |node, world| {
            let id = node.id();
            let Some(material) = node.material().copied() else {
                return;
            };
            let world = *world;
            let Some(geometry) = node.geometry_mut() else {
                return;
            };
            if geometry.is_disposed() || geometry.index_count() == 0 {
                return;
            }
            geometry.ensure_gpu(device);

            let entry = node_resources
                .entry(id)
                .or_insert_with(|| NodeGpu::new(device, node_layout));
            let model: [[f32; 4]; 4] = world.into();
            queue.write_buffer(
                &entry.transform_buffer,
                0,
                bytemuck::bytes_of(&NodeUniform { model }),
            );
            queue.write_buffer(
                &entry.material_buffer,
                0,
                bytemuck::bytes_of(&material.to_uniform()),
            );
            items.push(id);
        });

        let live: HashSet<NodeId> = items.iter().copied().collect();
        node_resources.retain(|id, _| live.contains(id));
        items
    }

    /// Depth-only pass into the shadow map from the light's view.
    pub(crate) fn shadow_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        graph: &SceneGraph,
        items: &[NodeId],
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow_pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.shadow_map.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.shadow_pipeline);
        pass.set_bind_group(0, &self.global_bind_group, &[]);
        self.draw_items(&mut pass, graph, items);
    }

    /// Forward pass over the draw list into `color_view`. `hdr` selects
    /// the pipeline variant matching the target's format.
    pub(crate) fn scene_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        graph: &SceneGraph,
        items: &[NodeId],
        clear: wgpu::Color,
        hdr: bool,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(if hdr {
            &self.hdr_pipeline
        } else {
            &self.scene_pipeline
        });
        pass.set_bind_group(0, &self.global_bind_group, &[]);
        pass.set_bind_group(2, &self.shadow_bind_group, &[]);
        self.draw_items(&mut pass, graph, items);
    }

    fn draw_items(&self, pass: &mut wgpu::RenderPass<'_>, graph: &SceneGraph, items: &[NodeId]) {
        for id in items {
            let Some(node) = graph.get(*id) else {
                continue;
            };
            let Some(geometry) = node.geometry() else {
                continue;
            };
            let Some(gpu) = geometry.gpu() else {
                continue;
            };
            let Some(resources) = self.node_resources.get(id) else {
                continue;
            };
            pass.set_bind_group(1, &resources.bind_group, &[]);
            pass.set_vertex_buffer(0, gpu.vertex_buffer.slice(..));
            pass.set_index_buffer(gpu.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..geometry.index_count(), 0, 0..1);
        }
    }

    /// Renders the scene straight to the swapchain: shadow pass (when the
    /// light casts shadows) followed by the forward pass.
    pub fn draw(
        &mut self,
        frame: &mut Frame,
        graph: &mut SceneGraph,
        view: &View,
        lights: &Lights,
    ) {
        self.update_globals(view, lights);
        let items = self.upload(graph);
        if lights.directional.cast_shadows {
            self.shadow_pass(&mut frame.encoder, graph, &items);
        }
        let clear = self.clear_color;
        self.scene_pass(&mut frame.encoder, &frame.view, graph, &items, clear, false);
    }
}

fn create_scene_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    color_format: TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("scene_pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex3D::desc()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: TextureResource::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
