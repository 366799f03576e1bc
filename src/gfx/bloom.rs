//! Selective bloom compositor.
//!
//! Glow is opt-in per node via the bloom layer. Each frame renders twice:
//! once with every non-glowing drawable temporarily swapped to a black
//! unlit material (leaving only glow sources lit), and once normally. The
//! glow render is thresholded, blurred with a separable gaussian, and
//! added on top of the normal render.

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::core::viewport::Viewport;
use crate::gfx::renderer::{Frame, Renderer, HDR_FORMAT};
use crate::gfx::texture::TextureResource;
use crate::gfx::view::View;
use crate::gfx::lights::Lights;
use crate::scene::graph::SceneGraph;
use crate::scene::material::{Material, MaterialOverrides};
use crate::scene::node::{LayerMask, Node};

/// Tuning knobs, live-editable from the debug panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomParams {
    /// Luminance below which a pixel contributes nothing.
    pub threshold: f32,
    /// Multiplier on the blurred glow at composite time.
    pub strength: f32,
    /// Blur spread; more radius means more blur iterations.
    pub radius: f32,
    /// Final exposure multiplier on the composited image.
    pub exposure: f32,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            strength: 1.0,
            radius: 0.5,
            exposure: 1.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BrightUniform {
    threshold: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurUniform {
    texel: [f32; 2],
    direction: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeUniform {
    strength: f32,
    exposure: f32,
    _pad: [f32; 2],
}

/// Physical pixel size of the offscreen chain. Tracks the viewport so
/// the targets are only recreated when the size actually changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TargetExtent {
    width: u32,
    height: u32,
}

impl TargetExtent {
    fn of(viewport: &Viewport) -> Self {
        Self {
            width: viewport.physical_width(),
            height: viewport.physical_height(),
        }
    }

    /// Adopts the viewport's physical size. Returns whether it changed.
    fn update(&mut self, viewport: &Viewport) -> bool {
        let next = Self::of(viewport);
        let changed = next != *self;
        *self = next;
        changed
    }

    fn texel(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }
}

struct BloomTargets {
    /// Glow-source render, HDR so bright values survive the blur.
    scene_hdr: TextureResource,
    /// Normal render in the surface format.
    base: TextureResource,
    ping: TextureResource,
    pong: TextureResource,
}

impl BloomTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32, surface_format: wgpu::TextureFormat) -> Self {
        Self {
            scene_hdr: TextureResource::create_render_target(
                device, width, height, HDR_FORMAT, "bloom_scene_hdr",
            ),
            base: TextureResource::create_render_target(
                device, width, height, surface_format, "bloom_base",
            ),
            ping: TextureResource::create_render_target(
                device, width, height, HDR_FORMAT, "bloom_ping",
            ),
            pong: TextureResource::create_render_target(
                device, width, height, HDR_FORMAT, "bloom_pong",
            ),
        }
    }
}

/// The two-pass bloom compositor. Owns the offscreen chain and the
/// material-substitution bookkeeping for the glow-source pass.
pub struct SelectiveBloom {
    pub params: BloomParams,
    saved: MaterialOverrides,

    surface_format: wgpu::TextureFormat,
    targets: BloomTargets,
    sampler: wgpu::Sampler,

    fullscreen_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,
    bright_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,

    bright_buffer: wgpu::Buffer,
    blur_h_buffer: wgpu::Buffer,
    blur_v_buffer: wgpu::Buffer,
    composite_buffer: wgpu::Buffer,

    bright_bind_group: wgpu::BindGroup,
    blur_from_ping: wgpu::BindGroup,
    blur_from_pong: wgpu::BindGroup,
    composite_bind_group: wgpu::BindGroup,

    extent: TargetExtent,
}

impl SelectiveBloom {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        viewport: &Viewport,
    ) -> Self {
        let extent = TargetExtent::of(viewport);
        let targets = BloomTargets::new(device, extent.width, extent.height, surface_format);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("bloom_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let fullscreen_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bloom_fullscreen_layout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
                uniform_entry(2),
            ],
        });
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bloom_composite_layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                sampler_entry(2),
                uniform_entry(3),
            ],
        });

        let bright_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bloom_bright_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/bloom_bright.wgsl").into()),
        });
        let blur_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bloom_blur_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/bloom_blur.wgsl").into()),
        });
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bloom_composite_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/bloom_composite.wgsl").into()),
        });

        let bright_pipeline =
            fullscreen_pipeline(device, &bright_shader, &fullscreen_layout, HDR_FORMAT, "bloom_bright");
        let blur_pipeline =
            fullscreen_pipeline(device, &blur_shader, &fullscreen_layout, HDR_FORMAT, "bloom_blur");
        let composite_pipeline = fullscreen_pipeline(
            device,
            &composite_shader,
            &composite_layout,
            surface_format,
            "bloom_composite",
        );

        let bright_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bloom_bright_params"),
            contents: bytemuck::bytes_of(&BrightUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let blur_h_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bloom_blur_h_params"),
            contents: bytemuck::bytes_of(&BlurUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let blur_v_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bloom_blur_v_params"),
            contents: bytemuck::bytes_of(&BlurUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let composite_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bloom_composite_params"),
            contents: bytemuck::bytes_of(&CompositeUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let (bright_bind_group, blur_from_ping, blur_from_pong, composite_bind_group) =
            create_bind_groups(
                device,
                &fullscreen_layout,
                &composite_layout,
                &targets,
                &sampler,
                &bright_buffer,
                &blur_h_buffer,
                &blur_v_buffer,
                &composite_buffer,
            );

        Self {
            params: BloomParams::default(),
            saved: MaterialOverrides::new(),
            surface_format,
            targets,
            sampler,
            fullscreen_layout,
            composite_layout,
            bright_pipeline,
            blur_pipeline,
            composite_pipeline,
            bright_buffer,
            blur_h_buffer,
            blur_v_buffer,
            composite_buffer,
            bright_bind_group,
            blur_from_ping,
            blur_from_pong,
            composite_bind_group,
            extent,
        }
    }

    /// Marks a node as a glow source, or unmarks it if it already is one.
    pub fn toggle_glow(node: &mut Node) {
        node.layers.toggle(LayerMask::BLOOM);
    }

    /// Substitutes a black unlit material onto every drawable not on the
    /// bloom layer, saving the originals.
    pub fn darken_non_glowing(overrides: &mut MaterialOverrides, graph: &mut SceneGraph) {
        graph.traverse_mut(&mut |node| {
            if node.is_drawable() && !node.layers.contains(LayerMask::BLOOM) {
                overrides.substitute(node, Material::black());
            }
        });
    }

    /// Undoes [`darken_non_glowing`](Self::darken_non_glowing).
    pub fn restore_materials(overrides: &mut MaterialOverrides, graph: &mut SceneGraph) {
        graph.traverse_mut(&mut |node| overrides.restore(node));
    }

    /// Recreates the offscreen chain for a new surface size.
    pub fn resize(&mut self, device: &wgpu::Device, viewport: &Viewport) {
        if !self.extent.update(viewport) {
            return;
        }
        self.targets = BloomTargets::new(
            device,
            self.extent.width,
            self.extent.height,
            self.surface_format,
        );
        let (bright, ping, pong, composite) = create_bind_groups(
            device,
            &self.fullscreen_layout,
            &self.composite_layout,
            &self.targets,
            &self.sampler,
            &self.bright_buffer,
            &self.blur_h_buffer,
            &self.blur_v_buffer,
            &self.composite_buffer,
        );
        self.bright_bind_group = bright;
        self.blur_from_ping = ping;
        self.blur_from_pong = pong;
        self.composite_bind_group = composite;
    }

    /// Renders the full bloom frame into `frame`'s surface view.
    ///
    /// The glow-source pass is submitted on its own encoder before the
    /// originals are restored: uniform writes become visible at submit
    /// time, so the two scene renders must not share a submission.
    pub fn render(
        &mut self,
        renderer: &mut Renderer,
        frame: &mut Frame,
        graph: &mut SceneGraph,
        view: &View,
        lights: &Lights,
    ) {
        renderer.update_globals(view, lights);

        // Pass 1: glow sources against black.
        Self::darken_non_glowing(&mut self.saved, graph);
        let items = renderer.upload(graph);
        let mut glow_encoder =
            renderer
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("bloom_glow_encoder"),
                });
        renderer.scene_pass(
            &mut glow_encoder,
            &self.targets.scene_hdr.view,
            graph,
            &items,
            wgpu::Color::BLACK,
            true,
        );
        renderer
            .queue()
            .submit(std::iter::once(glow_encoder.finish()));
        Self::restore_materials(&mut self.saved, graph);

        // Pass 2: the real scene into the base target.
        let items = renderer.upload(graph);
        if lights.directional.cast_shadows {
            renderer.shadow_pass(&mut frame.encoder, graph, &items);
        }
        let clear = renderer.clear_color;
        renderer.scene_pass(
            &mut frame.encoder,
            &self.targets.base.view,
            graph,
            &items,
            clear,
            false,
        );

        self.write_params(renderer.queue());

        // Threshold into ping.
        fullscreen_pass(
            &mut frame.encoder,
            &self.bright_pipeline,
            &self.bright_bind_group,
            &self.targets.ping.view,
            "bloom_bright_pass",
        );

        // Separable blur, ping-ponged an even number of times so the
        // result lands back in ping.
        let iterations = (2.0 + self.params.radius * 6.0) as usize & !1usize;
        for i in 0..iterations.max(2) {
            let (bind_group, target) = if i % 2 == 0 {
                (&self.blur_from_ping, &self.targets.pong.view)
            } else {
                (&self.blur_from_pong, &self.targets.ping.view)
            };
            fullscreen_pass(
                &mut frame.encoder,
                &self.blur_pipeline,
                bind_group,
                target,
                "bloom_blur_pass",
            );
        }

        // Additive composite to the swapchain.
        fullscreen_pass(
            &mut frame.encoder,
            &self.composite_pipeline,
            &self.composite_bind_group,
            &frame.view,
            "bloom_composite_pass",
        );
    }

    fn write_params(&self, queue: &wgpu::Queue) {
        queue.write_buffer(
            &self.bright_buffer,
            0,
            bytemuck::bytes_of(&BrightUniform {
                threshold: self.params.threshold,
                _pad: [0.0; 3],
            }),
        );
        let texel = self.extent.texel();
        let spread = 1.0 + self.params.radius;
        queue.write_buffer(
            &self.blur_h_buffer,
            0,
            bytemuck::bytes_of(&BlurUniform {
                texel,
                direction: [spread, 0.0],
            }),
        );
        queue.write_buffer(
            &self.blur_v_buffer,
            0,
            bytemuck::bytes_of(&BlurUniform {
                texel,
                direction: [0.0, spread],
            }),
        );
        queue.write_buffer(
            &self.composite_buffer,
            0,
            bytemuck::bytes_of(&CompositeUniform {
                strength: self.params.strength,
                exposure: self.params.exposure,
                _pad: [0.0; 2],
            }),
        );
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[allow(clippy::too_many_arguments)]
fn create_bind_groups(
    device: &wgpu::Device,
    fullscreen_layout: &wgpu::BindGroupLayout,
    composite_layout: &wgpu::BindGroupLayout,
    targets: &BloomTargets,
    sampler: &wgpu::Sampler,
    bright_buffer: &wgpu::Buffer,
    blur_h_buffer: &wgpu::Buffer,
    blur_v_buffer: &wgpu::Buffer,
    composite_buffer: &wgpu::Buffer,
) -> (
    wgpu::BindGroup,
    wgpu::BindGroup,
    wgpu::BindGroup,
    wgpu::BindGroup,
) {
    let fullscreen = |label: &str, texture: &TextureResource, buffer: &wgpu::Buffer| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: fullscreen_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffer.as_entire_binding(),
                },
            ],
        })
    };

    let bright = fullscreen("bloom_bright_bind_group", &targets.scene_hdr, bright_buffer);
    let from_ping = fullscreen("bloom_blur_ping_bind_group", &targets.ping, blur_h_buffer);
    let from_pong = fullscreen("bloom_blur_pong_bind_group", &targets.pong, blur_v_buffer);

    let composite = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("bloom_composite_bind_group"),
        layout: composite_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&targets.base.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&targets.ping.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: composite_buffer.as_entire_binding(),
            },
        ],
    });

    (bright, from_ping, from_pong, composite)
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    target: &wgpu::TextureView,
    label: &str,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::geometry::Geometry;
    use crate::scene::node::NodeId;

    fn scene() -> (SceneGraph, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let plain = graph.add(Node::drawable(
            "plain",
            Geometry::cube(1.0),
            Material::new([0.3, 0.5, 0.7, 1.0]),
        ));
        let mut glowing = Node::drawable(
            "glowing",
            Geometry::cube(1.0),
            Material::new([1.0, 0.2, 0.2, 1.0]).with_emissive([2.0, 0.0, 0.0]),
        );
        glowing.layers = glowing.layers.with(LayerMask::BLOOM);
        let glowing = graph.add(glowing);
        (graph, plain, glowing)
    }

    #[test]
    fn darken_swaps_only_non_glowing_materials() {
        let (mut graph, plain, glowing) = scene();
        let plain_original = *graph.get(plain).unwrap().material().unwrap();
        let glow_original = *graph.get(glowing).unwrap().material().unwrap();

        let mut overrides = MaterialOverrides::new();
        SelectiveBloom::darken_non_glowing(&mut overrides, &mut graph);

        assert_eq!(
            *graph.get(plain).unwrap().material().unwrap(),
            Material::black()
        );
        assert_eq!(*graph.get(glowing).unwrap().material().unwrap(), glow_original);

        SelectiveBloom::restore_materials(&mut overrides, &mut graph);
        assert_eq!(*graph.get(plain).unwrap().material().unwrap(), plain_original);
        assert!(overrides.is_empty());
    }

    #[test]
    fn darken_restore_cycle_is_repeatable() {
        let (mut graph, plain, _) = scene();
        let original = *graph.get(plain).unwrap().material().unwrap();
        let mut overrides = MaterialOverrides::new();

        for _ in 0..3 {
            SelectiveBloom::darken_non_glowing(&mut overrides, &mut graph);
            SelectiveBloom::restore_materials(&mut overrides, &mut graph);
        }
        assert_eq!(*graph.get(plain).unwrap().material().unwrap(), original);
    }

    #[test]
    fn toggle_glow_twice_returns_to_baseline() {
        let (mut graph, plain, _) = scene();
        let before = graph.get(plain).unwrap().layers;

        SelectiveBloom::toggle_glow(graph.get_mut(plain).unwrap());
        assert!(graph.get(plain).unwrap().layers.contains(LayerMask::BLOOM));
        SelectiveBloom::toggle_glow(graph.get_mut(plain).unwrap());
        assert_eq!(graph.get(plain).unwrap().layers, before);
    }

    #[test]
    fn target_extent_tracks_physical_pixels() {
        let mut extent = TargetExtent::of(&Viewport::new(800, 600, 2.0));
        assert_eq!((extent.width, extent.height), (1600, 1200));

        // Same size again: nothing to recreate.
        assert!(!extent.update(&Viewport::new(800, 600, 2.0)));

        assert!(extent.update(&Viewport::new(1024, 768, 2.0)));
        assert_eq!((extent.width, extent.height), (2048, 1536));
        assert_eq!(extent.texel(), [1.0 / 2048.0, 1.0 / 1536.0]);
    }

    #[test]
    fn target_extent_follows_pixel_ratio_changes() {
        let mut extent = TargetExtent::of(&Viewport::new(800, 600, 1.0));
        assert!(extent.update(&Viewport::new(800, 600, 2.0)));
        assert_eq!((extent.width, extent.height), (1600, 1200));
    }

    #[test]
    fn default_params_match_tuning_baseline() {
        let params = BloomParams::default();
        assert_eq!(params.threshold, 0.0);
        assert_eq!(params.strength, 1.0);
        assert_eq!(params.radius, 0.5);
        assert_eq!(params.exposure, 1.0);
    }
}
