use std::time::{Duration, Instant};

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::{PhysicalPosition, PhysicalSize};

use crate::compile;
use crate::layer::LayerPlan;
use crate::schedule::{plan_frame, PassDestination, PassStep};
use crate::uniforms::{normalized_pointer, TextureSlot, UniformLayout, UniformTable, UniformValue};

use super::context::GpuContext;
use super::program::{self, CompiledProgram, SharedLayouts, QUAD_VERTEX_COUNT};
use super::targets::{RenderTarget, RenderTargetPair, TARGET_FORMAT};
use super::textures::{self, TextureFuture, TextureResources};

/// One runtime layer: its own uniform table and buffer, the compiled pass
/// programs, and the eventual custom texture.
struct GpuLayer {
    label: String,
    visible: bool,
    uniforms: UniformTable,
    layout: UniformLayout,
    programs: Vec<CompiledProgram>,
    needs_background: bool,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    custom_uniform: Option<String>,
    pending_texture: Option<TextureFuture>,
    custom_texture: Option<TextureResources>,
}

/// Owns the render-target pair, the runtime layer list, and everything else
/// a frame touches. One compositing pass per `render` call; the frame driver
/// schedules the calls.
pub(crate) struct Compositor {
    context: GpuContext,
    layouts: SharedLayouts,
    sampler: wgpu::Sampler,
    placeholder: TextureResources,
    quad: wgpu::Buffer,
    targets: RenderTargetPair,
    background: Option<RenderTarget>,
    fallback_pipeline: wgpu::RenderPipeline,
    layers: Vec<GpuLayer>,
    pointer: Option<(f64, f64)>,
    start_time: Instant,
    last_fps_update: Instant,
    frames_since_last_update: u32,
    frame_count: u64,
}

impl Compositor {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        plans: Vec<LayerPlan>,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, initial_size)?;
        let layouts = SharedLayouts::new(&context.device);
        let sampler = textures::create_linear_sampler(&context.device);
        let placeholder = textures::create_placeholder(&context.device, &context.queue);
        let quad = program::create_quad_buffer(&context.device);
        let fallback_pipeline =
            program::build_fallback_program(&context.device, context.surface_format)?;
        let targets = RenderTargetPair::create(&context.device, context.size);

        let mut layers = Vec::with_capacity(plans.len());
        for plan in plans {
            if let Some(layer) =
                realize_layer(&context.device, &layouts, plan, context.surface_format)
            {
                layers.push(layer);
            }
        }
        if layers.is_empty() {
            tracing::warn!("no usable layer survived construction; fallback indicator active");
        }

        let background = layers
            .iter()
            .any(|layer| layer.needs_background)
            .then(|| RenderTarget::new(&context.device, context.size, "background capture"));

        Ok(Self {
            context,
            layouts,
            sampler,
            placeholder,
            quad,
            targets,
            background,
            fallback_pipeline,
            layers,
            pointer: None,
            start_time: Instant::now(),
            last_fps_update: Instant::now(),
            frames_since_last_update: 0,
            frame_count: 0,
        })
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub(crate) fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Pointer notifications never fail; the raw position is normalized at
    /// the next uniform refresh.
    pub(crate) fn set_pointer(&mut self, position: PhysicalPosition<f64>) {
        self.pointer = Some((position.x, position.y));
    }

    /// Resizes the surface, both offscreen buffers, the background capture,
    /// and every layer's `resolution` uniform before the next frame draws.
    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.context.resize(new_size);
        self.targets.resize(&self.context.device, new_size);
        if self.background.is_some() {
            self.background = Some(RenderTarget::new(
                &self.context.device,
                new_size,
                "background capture",
            ));
        }
        for layer in &mut self.layers {
            layer
                .uniforms
                .set_resolution(new_size.width as f32, new_size.height as f32);
        }
    }

    /// One compositing pass: uniform refresh, then either the layer loop or
    /// the fallback indicator, then present.
    pub(crate) fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.poll_pending_textures();
        self.refresh_uniforms();

        // Acquire the frame before encoding; this call can block on vsync.
        let frame = self.context.surface.get_current_texture()?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("compositor encoder"),
                });

        let visible: Vec<usize> = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.visible)
            .map(|(index, _)| index)
            .collect();

        if visible.is_empty() {
            self.encode_fallback(&mut encoder, &frame_view);
        } else {
            let mut captured = false;
            for step in plan_frame(visible.len()) {
                self.encode_layer(&mut encoder, &frame_view, visible[step.layer], &step, captured);
                if step.capture_background {
                    self.encode_background_capture(&mut encoder);
                    captured = true;
                }
                if step.swap_after {
                    self.targets.swap();
                }
            }
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.update_frame_stats();
        Ok(())
    }

    fn refresh_uniforms(&mut self) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let pointer = self
            .pointer
            .map(|position| normalized_pointer(position, self.context.size));
        // Every layer, visible or not; resolution is refreshed on resize only.
        for layer in &mut self.layers {
            layer.uniforms.set_time(elapsed);
            if let Some(pointer) = pointer {
                layer.uniforms.set_pointer(pointer);
            }
        }
    }

    fn poll_pending_textures(&mut self) {
        let device = &self.context.device;
        let queue = &self.context.queue;
        for layer in &mut self.layers {
            let Some(mut future) = layer.pending_texture.take() else {
                continue;
            };
            match future.poll(device, queue) {
                Ok(Some(resources)) => {
                    tracing::debug!(
                        layer = %layer.label,
                        path = %future.path().display(),
                        "custom texture ready"
                    );
                    layer.custom_texture = Some(resources);
                    if let Some(name) = layer.custom_uniform.as_deref() {
                        layer
                            .uniforms
                            .set(name, UniformValue::Texture(TextureSlot::Ready));
                    }
                }
                Ok(None) => layer.pending_texture = Some(future),
                Err(err) => {
                    tracing::warn!(
                        layer = %layer.label,
                        error = %err,
                        "custom texture load failed; placeholder stays bound"
                    );
                }
            }
        }
    }

    fn encode_layer(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame_view: &wgpu::TextureView,
        layer_index: usize,
        step: &PassStep,
        captured: bool,
    ) {
        let layer = &self.layers[layer_index];

        // First surviving pass only; the remaining compiled passes are the
        // multi-pass extension point.
        let Some(program) = layer.programs.first() else {
            tracing::debug!(layer = %layer.label, "no bindable program; skipping draw");
            return;
        };

        self.context.queue.write_buffer(
            &layer.uniform_buffer,
            0,
            &layer.layout.pack(&layer.uniforms),
        );

        let background_view = if layer.needs_background {
            match (&self.background, captured) {
                // Captured earlier this frame from the buffer that fed the
                // first layer.
                (Some(background), true) => &background.view,
                // First processed layer: the pre-pipeline image is its own
                // input.
                _ => &self.targets.input().view,
            }
        } else {
            &self.placeholder.view
        };
        let custom_view = layer
            .custom_texture
            .as_ref()
            .map(|texture| &texture.view)
            .unwrap_or(&self.placeholder.view);
        let texture_bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("layer textures"),
                layout: &self.layouts.texture_layout,
                entries: &program::build_texture_entries(
                    [&self.targets.input().view, background_view, custom_view],
                    &self.sampler,
                ),
            });

        let (attachment, clear) = match step.destination {
            PassDestination::Surface => (frame_view, wgpu::Color::BLACK),
            PassDestination::Offscreen => (&self.targets.output().view, wgpu::Color::TRANSPARENT),
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.label.as_str()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: attachment,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(program.pipeline_for(step.destination));
        render_pass.set_bind_group(0, &layer.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &texture_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.quad.slice(..));
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }

    /// Copies the current input buffer into the background capture so later
    /// layers can read the frame's original image after the pair is reused.
    fn encode_background_capture(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(background) = self.background.as_ref() else {
            return;
        };
        let input = self.targets.input();
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &input.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &background.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: input.size.width,
                height: input.size.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn encode_fallback(&self, encoder: &mut wgpu::CommandEncoder, frame_view: &wgpu::TextureView) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("fallback indicator"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: frame_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&self.fallback_pipeline);
        render_pass.set_vertex_buffer(0, self.quad.slice(..));
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }

    fn update_frame_stats(&mut self) {
        self.frame_count += 1;
        self.frames_since_last_update += 1;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_fps_update);
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames_since_last_update as f32 / elapsed.as_secs_f32();
            tracing::debug!(
                fps = fps.round(),
                frame_count = self.frame_count,
                layers = self.layers.len(),
                "render stats"
            );
            self.frames_since_last_update = 0;
            self.last_fps_update = now;
        }
    }
}

fn realize_layer(
    device: &wgpu::Device,
    layouts: &SharedLayouts,
    plan: LayerPlan,
    surface_format: wgpu::TextureFormat,
) -> Option<GpuLayer> {
    let layout = UniformLayout::for_table(&plan.uniforms);
    let custom_uniform = plan.texture.as_ref().map(|request| request.uniform.clone());

    let wrapped_vertex = compile::wrap_vertex_source(&plan.vertex_source, &layout);
    let vertex_module = match program::compile_layer_vertex(device, &wrapped_vertex, &plan.label) {
        Ok(module) => module,
        Err(err) => {
            tracing::warn!(layer = %plan.label, error = %err, "vertex compilation failed");
            return None;
        }
    };

    let mut programs = Vec::with_capacity(plan.passes.len());
    for pass in &plan.passes {
        let wrapped = compile::wrap_fragment_source(
            &pass.fragment_source,
            &layout,
            custom_uniform.as_deref(),
        );
        let label = format!("{} / {}", plan.label, pass.label);
        match program::build_layer_program(
            device,
            layouts,
            &vertex_module,
            &wrapped,
            TARGET_FORMAT,
            surface_format,
            pass.index,
            &label,
        ) {
            Ok(program) => programs.push(program),
            Err(err) => {
                tracing::warn!(layer = %plan.label, pass = %pass.label, error = %err, "pass dropped");
            }
        }
    }
    if programs.is_empty() {
        tracing::warn!(layer = %plan.label, "zero passes compiled; layer dropped from pipeline");
        return None;
    }
    tracing::debug!(
        layer = %plan.label,
        passes = programs.len(),
        active_pass = programs[0].pass_index,
        "layer realized"
    );

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("layer uniform buffer"),
        size: layout.size().max(16) as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("layer uniform bind group"),
        layout: &layouts.uniform_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }],
    });

    let pending_texture = plan
        .texture
        .as_ref()
        .map(|request| TextureFuture::spawn(request.path.clone()));

    Some(GpuLayer {
        label: plan.label,
        visible: plan.visible,
        uniforms: plan.uniforms,
        layout,
        programs,
        needs_background: plan.needs_background,
        uniform_buffer,
        uniform_bind_group,
        custom_uniform,
        pending_texture,
        custom_texture: None,
    })
}
