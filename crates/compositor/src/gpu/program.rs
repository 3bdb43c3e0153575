use anyhow::{anyhow, Result};
use wgpu::util::DeviceExt;

use crate::compile;
use crate::schedule::PassDestination;
use crate::uniforms::{UniformLayout, UniformTable};

/// Full-screen quad, triangle-stripped. `position` lands at attribute
/// location 0, matching the wrapper header.
const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

pub(crate) fn create_quad_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("fullscreen quad"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

pub(crate) const QUAD_VERTEX_COUNT: u32 = QUAD_VERTICES.len() as u32;

fn quad_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_ATTRIBUTES,
    }
}

/// Bind group layouts shared by every layer pipeline: the per-layer uniform
/// block at group 0 and the fixed input/background/custom texture pairs at
/// group 1.
pub(crate) struct SharedLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
}

/// Texture/sampler pairs bound at group 1, in binding order.
pub(crate) const TEXTURE_SLOT_COUNT: usize = 3;

impl SharedLayouts {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layer uniform layout"),
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

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layer texture layout"),
            entries: &build_texture_layout_entries(),
        });

        Self {
            uniform_layout,
            texture_layout,
        }
    }
}

fn build_texture_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(TEXTURE_SLOT_COUNT * 2);
    for slot in 0..TEXTURE_SLOT_COUNT as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

/// Builds texture bind group entries from views in slot order (input,
/// background, custom), interleaved with the shared sampler.
pub(crate) fn build_texture_entries<'a>(
    views: [&'a wgpu::TextureView; TEXTURE_SLOT_COUNT],
    sampler: &'a wgpu::Sampler,
) -> Vec<wgpu::BindGroupEntry<'a>> {
    let mut entries = Vec::with_capacity(TEXTURE_SLOT_COUNT * 2);
    for (slot, view) in views.into_iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: (slot as u32) * 2,
            resource: wgpu::BindingResource::TextureView(view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: (slot as u32) * 2 + 1,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }
    entries
}

/// One compiled pass: the wrapped vertex+fragment pair baked into render
/// pipelines. Render pipelines are specialized on their color format, and
/// which layer ends up drawing to the surface is only known once every
/// layer has survived compilation, so each pass carries both variants.
pub(crate) struct CompiledProgram {
    offscreen: wgpu::RenderPipeline,
    surface: wgpu::RenderPipeline,
    pub pass_index: usize,
    pub label: String,
}

impl CompiledProgram {
    pub(crate) fn pipeline_for(&self, destination: PassDestination) -> &wgpu::RenderPipeline {
        match destination {
            PassDestination::Offscreen => &self.offscreen,
            PassDestination::Surface => &self.surface,
        }
    }
}

/// Compiles a wrapped vertex source, catching validation errors instead of
/// letting them take down the device.
pub(crate) fn compile_layer_vertex(
    device: &wgpu::Device,
    wrapped: &str,
    label: &str,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = compile::compile_vertex_module(device, wrapped);
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!("vertex shader for {label} failed to compile: {error}"));
    }
    Ok(module)
}

/// Builds one pass program. A validation failure is returned as an error so
/// the caller can drop the pass and keep building the rest of the layer.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_layer_program(
    device: &wgpu::Device,
    layouts: &SharedLayouts,
    vertex_module: &wgpu::ShaderModule,
    wrapped_fragment: &str,
    offscreen_format: wgpu::TextureFormat,
    surface_format: wgpu::TextureFormat,
    pass_index: usize,
    label: &str,
) -> Result<CompiledProgram> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let fragment_module = compile::compile_fragment_module(device, wrapped_fragment);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("layer pipeline layout"),
        bind_group_layouts: &[&layouts.uniform_layout, &layouts.texture_layout],
        push_constant_ranges: &[],
    });
    let offscreen = build_pipeline(
        device,
        &pipeline_layout,
        vertex_module,
        &fragment_module,
        offscreen_format,
        label,
    );
    let surface = build_pipeline(
        device,
        &pipeline_layout,
        vertex_module,
        &fragment_module,
        surface_format,
        label,
    );

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!("pass '{label}' failed to compile: {error}"));
    }

    Ok(CompiledProgram {
        offscreen,
        surface,
        pass_index,
        label: label.to_string(),
    })
}

/// Builds the fallback-indicator pipeline from the built-in sources; it uses
/// no bind groups at all.
pub(crate) fn build_fallback_program(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline> {
    let empty = UniformLayout::for_table(&UniformTable::default());
    let vertex = compile::wrap_vertex_source(compile::DEFAULT_VERTEX_GLSL, &empty);
    let fragment = compile::wrap_fragment_source(compile::FALLBACK_FRAGMENT_GLSL, &empty, None);

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let vertex_module = compile::compile_vertex_module(device, &vertex);
    let fragment_module = compile::compile_fragment_module(device, &fragment);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("fallback pipeline layout"),
        bind_group_layouts: &[],
        push_constant_ranges: &[],
    });
    let pipeline = build_pipeline(
        device,
        &pipeline_layout,
        &vertex_module,
        &fragment_module,
        format,
        "fallback indicator",
    );
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!("fallback pipeline failed to compile: {error}"));
    }
    Ok(pipeline)
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex_module: &wgpu::ShaderModule,
    fragment_module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: Some("main"),
            buffers: &[quad_vertex_layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
