#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use plutonium_render::config::RenderConfig;
use plutonium_render::renderer::*;
use plutonium_render::PlutoniumRenderer;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateBuffer { id: u32, size: u64 },
    WriteBuffer { id: u32, len: usize },
    DestroyBuffer(u32),
    CreateLayout(u32),
    DestroyLayout(u32),
    CreateBindGroup { id: u32, entries: Vec<BindGroupEntry> },
    DestroyBindGroup(u32),
    CreateShader(u32),
    DestroyShader(u32),
    CreateRenderPipeline { id: u32, desc: RenderPipelineDesc },
    DestroyRenderPipeline(u32),
    CreateComputePipeline { id: u32, desc: ComputePipelineDesc },
    DestroyComputePipeline(u32),
    CreateTexture { id: u32, desc: TextureDesc },
    DestroyTexture(u32),
    CreateView { id: u32, texture: u32, desc: ViewDesc },
    DestroyView(u32),
    CreateSampler(u32),
    DestroySampler(u32),
    WriteTexture { texture: u32, mip: u32, layer: u32, width: u32, height: u32 },
    Copies(Vec<TextureCopy>),
    Compute(Vec<ComputeCommand>),
    Frame(Vec<RenderCommand>),
    Resize { width: u32, height: u32 },
}

#[derive(Default)]
pub struct Log {
    pub calls: Vec<Call>,
    /// Error every acquisition fails with while set.
    pub fail_acquire: Option<AcquireError>,
    pub acquire_attempts: u32,
    pub limits: wgpu::Limits,
    next_id: u32,
    live: HashSet<(&'static str, u32)>,
}

impl Log {
    fn create(&mut self, kind: &'static str) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert((kind, id));
        id
    }

    fn destroy(&mut self, kind: &'static str, id: u32) {
        assert!(self.live.remove(&(kind, id)), "{kind} {id} released twice or never created");
    }

    pub fn live(&self, kind: &str) -> usize {
        self.live.iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn frames(&self) -> Vec<Vec<RenderCommand>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Frame(commands) => Some(commands.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn computes(&self) -> Vec<Vec<ComputeCommand>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Compute(commands) => Some(commands.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn copies(&self) -> Vec<Vec<TextureCopy>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Copies(copies) => Some(copies.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn buffer_creations(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::CreateBuffer { .. }))
            .count()
    }

    pub fn texture_writes(&self) -> Vec<(u32, u32, u32)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::WriteTexture {
                    texture,
                    mip,
                    layer,
                    ..
                } => Some((*texture, *mip, *layer)),
                _ => None,
            })
            .collect()
    }

    pub fn textures(&self) -> Vec<(u32, TextureDesc)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::CreateTexture { id, desc } => Some((*id, *desc)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

/// Device double that records every call and checks ids are released exactly once.
#[derive(Clone, Default)]
pub struct RecordingDevice {
    pub log: Arc<Mutex<Log>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: Call) {
        self.log.lock().calls.push(call);
    }

    fn create(&self, kind: &'static str) -> u32 {
        self.log.lock().create(kind)
    }

    fn destroy(&self, kind: &'static str, id: u32) {
        self.log.lock().destroy(kind, id);
    }
}

impl RenderDevice for RecordingDevice {
    fn surface_format(&self) -> wgpu::TextureFormat {
        wgpu::TextureFormat::Bgra8UnormSrgb
    }

    fn limits(&self) -> wgpu::Limits {
        self.log.lock().limits.clone()
    }

    fn create_buffer(&mut self, _label: &str, size: u64, _usage: wgpu::BufferUsages) -> BufferId {
        let id = self.create("buffer");
        self.record(Call::CreateBuffer { id, size });
        BufferId(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, _offset: u64, data: &[u8]) {
        self.record(Call::WriteBuffer {
            id: buffer.0,
            len: data.len(),
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.destroy("buffer", buffer.0);
        self.record(Call::DestroyBuffer(buffer.0));
    }

    fn create_bind_group_layout(
        &mut self,
        _label: &str,
        _entries: &[wgpu::BindGroupLayoutEntry],
    ) -> BindGroupLayoutId {
        let id = self.create("layout");
        self.record(Call::CreateLayout(id));
        BindGroupLayoutId(id)
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId) {
        self.destroy("layout", layout.0);
        self.record(Call::DestroyLayout(layout.0));
    }

    fn create_bind_group(
        &mut self,
        _label: &str,
        _layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> BindGroupId {
        let id = self.create("bind_group");
        self.record(Call::CreateBindGroup {
            id,
            entries: entries.to_vec(),
        });
        BindGroupId(id)
    }

    fn destroy_bind_group(&mut self, group: BindGroupId) {
        self.destroy("bind_group", group.0);
        self.record(Call::DestroyBindGroup(group.0));
    }

    fn create_shader_module(
        &mut self,
        label: &str,
        source: &str,
    ) -> anyhow::Result<ShaderModuleId> {
        if source.trim().is_empty() {
            anyhow::bail!("shader `{}` is empty", label);
        }
        let id = self.create("shader");
        self.record(Call::CreateShader(id));
        Ok(ShaderModuleId(id))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        self.destroy("shader", module.0);
        self.record(Call::DestroyShader(module.0));
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDesc) -> RenderPipelineId {
        let id = self.create("render_pipeline");
        self.record(Call::CreateRenderPipeline {
            id,
            desc: desc.clone(),
        });
        RenderPipelineId(id)
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.destroy("render_pipeline", pipeline.0);
        self.record(Call::DestroyRenderPipeline(pipeline.0));
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> ComputePipelineId {
        let id = self.create("compute_pipeline");
        self.record(Call::CreateComputePipeline {
            id,
            desc: desc.clone(),
        });
        ComputePipelineId(id)
    }

    fn destroy_compute_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.destroy("compute_pipeline", pipeline.0);
        self.record(Call::DestroyComputePipeline(pipeline.0));
    }

    fn create_texture(&mut self, _label: &str, desc: &TextureDesc) -> TextureId {
        let id = self.create("texture");
        self.record(Call::CreateTexture { id, desc: *desc });
        TextureId(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.destroy("texture", texture.0);
        self.record(Call::DestroyTexture(texture.0));
    }

    fn create_texture_view(&mut self, texture: TextureId, desc: &ViewDesc) -> TextureViewId {
        let id = self.create("view");
        self.record(Call::CreateView {
            id,
            texture: texture.0,
            desc: *desc,
        });
        TextureViewId(id)
    }

    fn destroy_texture_view(&mut self, view: TextureViewId) {
        self.destroy("view", view.0);
        self.record(Call::DestroyView(view.0));
    }

    fn create_sampler(&mut self, _desc: &SamplerDesc) -> SamplerId {
        let id = self.create("sampler");
        self.record(Call::CreateSampler(id));
        SamplerId(id)
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.destroy("sampler", sampler.0);
        self.record(Call::DestroySampler(sampler.0));
    }

    fn write_texture(
        &mut self,
        texture: TextureId,
        mip_level: u32,
        layer: u32,
        width: u32,
        height: u32,
        _data: &[u8],
    ) {
        self.record(Call::WriteTexture {
            texture: texture.0,
            mip: mip_level,
            layer,
            width,
            height,
        });
    }

    fn submit_copies(&mut self, copies: &[TextureCopy]) {
        self.record(Call::Copies(copies.to_vec()));
    }

    fn submit_compute(&mut self, _label: &str, commands: &[ComputeCommand]) {
        self.record(Call::Compute(commands.to_vec()));
    }

    fn acquire_frame(&mut self) -> Result<(), AcquireError> {
        let mut log = self.log.lock();
        log.acquire_attempts += 1;
        match log.fail_acquire {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn submit_frame(&mut self, _clear: wgpu::Color, commands: &[RenderCommand]) {
        self.record(Call::Frame(commands.to_vec()));
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.record(Call::Resize { width, height });
    }
}

/// Renderer over a recording device, reading shaders from the crate's `shaders/`.
pub fn renderer() -> (PlutoniumRenderer, Arc<Mutex<Log>>) {
    renderer_with(RenderConfig::default())
}

pub fn renderer_with(config: RenderConfig) -> (PlutoniumRenderer, Arc<Mutex<Log>>) {
    let device = RecordingDevice::new();
    let log = device.log.clone();
    let renderer = PlutoniumRenderer::new(device, &config, 640, 480);
    (renderer, log)
}

pub fn rgba(width: u32, height: u32, value: u8) -> Vec<u8> {
    vec![value; (width * height * 4) as usize]
}
