use std::borrow::Cow;
use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::Context;
use pollster::block_on;
use winit::window::Window;

use crate::config::RenderConfig;
use crate::renderer::*;

// Slot table: ids are indices, released indices are handed out again.
struct Slots<T> {
    items: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Slots<T> {
    fn insert(&mut self, item: T) -> u32 {
        if let Some(id) = self.free.pop() {
            self.items[id as usize] = Some(item);
            return id;
        }
        self.items.push(Some(item));
        (self.items.len() - 1) as u32
    }

    fn get(&self, id: u32) -> Option<&T> {
        self.items.get(id as usize).and_then(|slot| slot.as_ref())
    }

    fn remove(&mut self, id: u32) -> Option<T> {
        let item = self.items.get_mut(id as usize).and_then(|slot| slot.take());
        if item.is_some() {
            self.free.push(id);
        }
        item
    }
}

/// [`RenderDevice`] backed by a wgpu device drawing into a window surface.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    limits: wgpu::Limits,
    frame: Option<wgpu::SurfaceTexture>,

    buffers: Slots<wgpu::Buffer>,
    layouts: Slots<wgpu::BindGroupLayout>,
    bind_groups: Slots<wgpu::BindGroup>,
    shaders: Slots<wgpu::ShaderModule>,
    render_pipelines: Slots<wgpu::RenderPipeline>,
    compute_pipelines: Slots<wgpu::ComputePipeline>,
    textures: Slots<wgpu::Texture>,
    views: Slots<wgpu::TextureView>,
    samplers: Slots<wgpu::Sampler>,
}

impl WgpuDevice {
    pub fn new(window: Arc<Window>, render_config: &RenderConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window)
            .context("failed to create window surface")?;

        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            force_fallback_adapter: false,
            // Request an adapter which can render to our surface
            compatible_surface: Some(&surface),
        }))
        .context("failed to find an appropriate adapter")?;

        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("plutonium_device"),
                ..Default::default()
            },
            None,
        ))
        .context("failed to create device")?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if render_config.vsync {
                wgpu::PresentMode::Fifo
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
        };
        surface.configure(&device, &config);
        let limits = device.limits();
        log::info!(
            "configured surface {}x{} ({:?}) on {}",
            config.width,
            config.height,
            format,
            adapter.get_info().name
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            limits,
            frame: None,
            buffers: Slots::default(),
            layouts: Slots::default(),
            bind_groups: Slots::default(),
            shaders: Slots::default(),
            render_pipelines: Slots::default(),
            compute_pipelines: Slots::default(),
            textures: Slots::default(),
            views: Slots::default(),
            samplers: Slots::default(),
        })
    }

    fn image_copy(
        &self,
        texture: TextureId,
        mip_level: u32,
        layer: u32,
    ) -> Option<wgpu::ImageCopyTexture<'_>> {
        self.textures.get(texture.0).map(|texture| wgpu::ImageCopyTexture {
            texture,
            mip_level,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        })
    }
}

impl RenderDevice for WgpuDevice {
    fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn limits(&self) -> wgpu::Limits {
        self.limits.clone()
    }

    fn create_buffer(&mut self, label: &str, size: u64, usage: wgpu::BufferUsages) -> BufferId {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        BufferId(self.buffers.insert(buffer))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get(buffer.0) {
            Some(buffer) => self.queue.write_buffer(buffer, offset, data),
            None => log::error!("write to released buffer {:?}", buffer),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(buffer.0) {
            buffer.destroy();
        }
    }

    fn create_bind_group_layout(
        &mut self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> BindGroupLayoutId {
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            });
        BindGroupLayoutId(self.layouts.insert(layout))
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId) {
        self.layouts.remove(layout.0);
    }

    fn create_bind_group(
        &mut self,
        label: &str,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> BindGroupId {
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let resource = match entry.resource {
                BindingResource::Buffer {
                    buffer,
                    offset,
                    size,
                } => self.buffers.get(buffer.0).map(|buffer| {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset,
                        size: NonZeroU64::new(size),
                    })
                }),
                BindingResource::TextureView(view) => self
                    .views
                    .get(view.0)
                    .map(wgpu::BindingResource::TextureView),
                BindingResource::Sampler(sampler) => self
                    .samplers
                    .get(sampler.0)
                    .map(wgpu::BindingResource::Sampler),
            };
            match resource {
                Some(resource) => resolved.push(wgpu::BindGroupEntry {
                    binding: entry.binding,
                    resource,
                }),
                None => log::error!("bind group `{label}` references a released resource"),
            }
        }

        let group = match self.layouts.get(layout.0) {
            Some(layout) => self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &resolved,
            }),
            None => {
                log::error!("bind group `{label}` created against a released layout");
                // An empty layout keeps the id space consistent; drawing with it fails validation.
                let empty = self
                    .device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("empty_layout"),
                        entries: &[],
                    });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(label),
                    layout: &empty,
                    entries: &[],
                })
            }
        };
        BindGroupId(self.bind_groups.insert(group))
    }

    fn destroy_bind_group(&mut self, group: BindGroupId) {
        self.bind_groups.remove(group.0);
    }

    fn create_shader_module(
        &mut self,
        label: &str,
        source: &str,
    ) -> anyhow::Result<ShaderModuleId> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            anyhow::bail!("shader `{label}` failed to compile: {err}");
        }
        Ok(ShaderModuleId(self.shaders.insert(module)))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        self.shaders.remove(module.0);
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDesc) -> RenderPipelineId {
        let layouts: Vec<&wgpu::BindGroupLayout> = desc
            .bind_group_layouts
            .iter()
            .filter_map(|id| self.layouts.get(id.0))
            .collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label.as_str()),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        let Some(shader) = self.shaders.get(desc.shader.0) else {
            log::error!("render pipeline `{}` built from a released shader", desc.label);
            return RenderPipelineId(u32::MAX);
        };
        let state = desc.state;
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label.as_str()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some(state.vertex_entry),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: desc.vertex_layout.array_stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &desc.vertex_layout.attributes,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some(state.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: state.format,
                        blend: Some(state.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: state.topology,
                    strip_index_format: None,
                    front_face: state.front_face,
                    cull_mode: state.cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: state.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });
        RenderPipelineId(self.render_pipelines.insert(pipeline))
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.render_pipelines.remove(pipeline.0);
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> ComputePipelineId {
        let layouts: Vec<&wgpu::BindGroupLayout> = desc
            .bind_group_layouts
            .iter()
            .filter_map(|id| self.layouts.get(id.0))
            .collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label.as_str()),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        let Some(shader) = self.shaders.get(desc.shader.0) else {
            log::error!("compute pipeline `{}` built from a released shader", desc.label);
            return ComputePipelineId(u32::MAX);
        };
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(desc.label.as_str()),
                layout: Some(&pipeline_layout),
                module: shader,
                entry_point: Some(desc.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });
        ComputePipelineId(self.compute_pipelines.insert(pipeline))
    }

    fn destroy_compute_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.compute_pipelines.remove(pipeline.0);
    }

    fn create_texture(&mut self, label: &str, desc: &TextureDesc) -> TextureId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        TextureId(self.textures.insert(texture))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(texture) = self.textures.remove(texture.0) {
            texture.destroy();
        }
    }

    fn create_texture_view(&mut self, texture: TextureId, desc: &ViewDesc) -> TextureViewId {
        let Some(texture) = self.textures.get(texture.0) else {
            log::error!("view requested for released texture {:?}", texture);
            return TextureViewId(u32::MAX);
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(desc.dimension),
            base_mip_level: desc.base_mip,
            mip_level_count: desc.mip_count,
            ..Default::default()
        });
        TextureViewId(self.views.insert(view))
    }

    fn destroy_texture_view(&mut self, view: TextureViewId) {
        self.views.remove(view.0);
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> SamplerId {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: desc.address_mode,
            address_mode_v: desc.address_mode,
            address_mode_w: desc.address_mode,
            mag_filter: desc.filter,
            min_filter: desc.filter,
            mipmap_filter: desc.filter,
            lod_max_clamp: desc.lod_max_clamp,
            ..Default::default()
        });
        SamplerId(self.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.samplers.remove(sampler.0);
    }

    fn write_texture(
        &mut self,
        texture: TextureId,
        mip_level: u32,
        layer: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) {
        let Some(destination) = self.image_copy(texture, mip_level, layer) else {
            log::error!("write to released texture {:?}", texture);
            return;
        };
        self.queue.write_texture(
            destination,
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn submit_copies(&mut self, copies: &[TextureCopy]) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture_copy_encoder"),
            });
        for copy in copies {
            let (Some(src), Some(dst)) = (
                self.image_copy(copy.src, copy.mip_level, 0),
                self.image_copy(copy.dst, copy.mip_level, 0),
            ) else {
                log::error!("texture copy references a released texture");
                continue;
            };
            encoder.copy_texture_to_texture(
                src,
                dst,
                wgpu::Extent3d {
                    width: copy.width,
                    height: copy.height,
                    depth_or_array_layers: copy.layers,
                },
            );
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn submit_compute(&mut self, label: &str, commands: &[ComputeCommand]) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            for command in commands {
                match *command {
                    ComputeCommand::SetPipeline(id) => {
                        if let Some(pipeline) = self.compute_pipelines.get(id.0) {
                            pass.set_pipeline(pipeline);
                        }
                    }
                    ComputeCommand::SetBindGroup { index, group } => {
                        if let Some(group) = self.bind_groups.get(group.0) {
                            pass.set_bind_group(index, group, &[]);
                        }
                    }
                    ComputeCommand::Dispatch { x, y, z } => pass.dispatch_workgroups(x, y, z),
                }
            }
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn acquire_frame(&mut self) -> Result<(), AcquireError> {
        match self.surface.get_current_texture() {
            Ok(frame) if frame.suboptimal => {
                drop(frame);
                self.surface.configure(&self.device, &self.config);
                Err(AcquireError::Suboptimal)
            }
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(())
            }
            Err(err) => {
                let err = AcquireError::from(err);
                if err.needs_reconfigure() {
                    self.surface.configure(&self.device, &self.config);
                }
                Err(err)
            }
        }
    }

    fn submit_frame(&mut self, clear: wgpu::Color, commands: &[RenderCommand]) {
        let Some(frame) = self.frame.take() else {
            log::warn!("submit_frame called without an acquired surface image");
            return;
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for command in commands {
                match *command {
                    RenderCommand::SetPipeline(id) => {
                        if let Some(pipeline) = self.render_pipelines.get(id.0) {
                            rpass.set_pipeline(pipeline);
                        }
                    }
                    RenderCommand::SetVertexBuffer { slot, buffer } => {
                        if let Some(buffer) = self.buffers.get(buffer.0) {
                            rpass.set_vertex_buffer(slot, buffer.slice(..));
                        }
                    }
                    RenderCommand::SetBindGroup { index, group } => {
                        if let Some(group) = self.bind_groups.get(group.0) {
                            rpass.set_bind_group(index, group, &[]);
                        }
                    }
                    RenderCommand::Draw {
                        vertices,
                        instances,
                    } => rpass.draw(0..vertices, 0..instances),
                }
            }
        }
        self.queue.submit(Some(encoder.finish()));
        frame.present();
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }
}
