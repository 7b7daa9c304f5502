//! Device seam between the ECS systems and the GPU backend.
//!
//! Systems never hold wgpu objects directly. They hold small copyable ids and
//! ask a [`RenderDevice`] to create, write, bind and release the objects behind
//! them. Per-frame work is handed over as recorded command lists, so the whole
//! frame protocol can run against a fake device.

use std::fmt;

use plutonium_world::World;

macro_rules! gpu_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

gpu_id!(
    BufferId,
    BindGroupLayoutId,
    BindGroupId,
    ShaderModuleId,
    RenderPipelineId,
    ComputePipelineId,
    TextureId,
    TextureViewId,
    SamplerId,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    Buffer {
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    TextureView(TextureViewId),
    Sampler(SamplerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexLayout {
    pub array_stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Fixed-function state of a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    pub topology: wgpu::PrimitiveTopology,
    pub front_face: wgpu::FrontFace,
    pub cull_mode: Option<wgpu::Face>,
    pub blend: wgpu::BlendState,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPipelineDesc {
    pub label: String,
    pub shader: ShaderModuleId,
    pub vertex_layout: VertexLayout,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub state: PipelineState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePipelineDesc {
    pub label: String,
    pub shader: ShaderModuleId,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub entry_point: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub mip_levels: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

/// View over `mip_count` levels starting at `base_mip` (all remaining when `None`),
/// always covering every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDesc {
    pub base_mip: u32,
    pub mip_count: Option<u32>,
    pub dimension: wgpu::TextureViewDimension,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub address_mode: wgpu::AddressMode,
    pub filter: wgpu::FilterMode,
    pub lod_max_clamp: f32,
}

/// Texture-to-texture copy of `layers` layers (starting at layer 0) of one mip level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopy {
    pub src: TextureId,
    pub dst: TextureId,
    pub mip_level: u32,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeCommand {
    SetPipeline(ComputePipelineId),
    SetBindGroup { index: u32, group: BindGroupId },
    Dispatch { x: u32, y: u32, z: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCommand {
    SetPipeline(RenderPipelineId),
    SetVertexBuffer { slot: u32, buffer: BufferId },
    SetBindGroup { index: u32, group: BindGroupId },
    Draw { vertices: u32, instances: u32 },
}

/// Why a surface image could not be acquired this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    Timeout,
    Outdated,
    Lost,
    OutOfMemory,
    /// The image no longer matches the surface; it is dropped unpresented.
    Suboptimal,
}

impl AcquireError {
    /// Lost, outdated and suboptimal surfaces need a reconfigure before the next attempt.
    pub fn needs_reconfigure(self) -> bool {
        matches!(
            self,
            AcquireError::Lost | AcquireError::Outdated | AcquireError::Suboptimal
        )
    }
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            AcquireError::Timeout => "timed out",
            AcquireError::Outdated => "surface outdated",
            AcquireError::Lost => "surface lost",
            AcquireError::OutOfMemory => "out of memory",
            AcquireError::Suboptimal => "surface suboptimal",
        };
        write!(f, "surface acquisition failed: {reason}")
    }
}

impl std::error::Error for AcquireError {}

impl From<wgpu::SurfaceError> for AcquireError {
    fn from(err: wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Lost => AcquireError::Lost,
            wgpu::SurfaceError::Outdated => AcquireError::Outdated,
            wgpu::SurfaceError::OutOfMemory => AcquireError::OutOfMemory,
            _ => AcquireError::Timeout,
        }
    }
}

pub trait RenderDevice: Send + Sync {
    fn surface_format(&self) -> wgpu::TextureFormat;

    /// Limits the device was created with. Textures must stay inside them.
    fn limits(&self) -> wgpu::Limits;

    fn create_buffer(&mut self, label: &str, size: u64, usage: wgpu::BufferUsages) -> BufferId;
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_bind_group_layout(
        &mut self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> BindGroupLayoutId;
    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId);

    fn create_bind_group(
        &mut self,
        label: &str,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> BindGroupId;
    fn destroy_bind_group(&mut self, group: BindGroupId);

    /// Compiles WGSL source. Compile errors come back as `Err`, never as a panic.
    fn create_shader_module(&mut self, label: &str, source: &str)
        -> anyhow::Result<ShaderModuleId>;
    fn destroy_shader_module(&mut self, module: ShaderModuleId);

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDesc) -> RenderPipelineId;
    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineId);
    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> ComputePipelineId;
    fn destroy_compute_pipeline(&mut self, pipeline: ComputePipelineId);

    fn create_texture(&mut self, label: &str, desc: &TextureDesc) -> TextureId;
    fn destroy_texture(&mut self, texture: TextureId);
    fn create_texture_view(&mut self, texture: TextureId, desc: &ViewDesc) -> TextureViewId;
    fn destroy_texture_view(&mut self, view: TextureViewId);
    fn create_sampler(&mut self, desc: &SamplerDesc) -> SamplerId;
    fn destroy_sampler(&mut self, sampler: SamplerId);

    /// Writes tightly packed RGBA8 rows into one layer of one mip level.
    fn write_texture(
        &mut self,
        texture: TextureId,
        mip_level: u32,
        layer: u32,
        width: u32,
        height: u32,
        data: &[u8],
    );

    /// Records every copy into one command buffer and submits it.
    fn submit_copies(&mut self, copies: &[TextureCopy]);

    /// Records one compute pass and submits it.
    fn submit_compute(&mut self, label: &str, commands: &[ComputeCommand]);

    /// Acquires the next surface image. Nothing is recorded on failure, and a
    /// suboptimal image counts as a failure.
    fn acquire_frame(&mut self) -> Result<(), AcquireError>;

    /// Records one render pass over the acquired image, submits and presents.
    fn submit_frame(&mut self, clear: wgpu::Color, commands: &[RenderCommand]);

    fn resize(&mut self, width: u32, height: u32);
}

/// World resource owning the active device.
pub struct Gpu {
    pub device: Box<dyn RenderDevice>,
}

impl Gpu {
    pub fn new(device: impl RenderDevice + 'static) -> Self {
        Self {
            device: Box::new(device),
        }
    }
}

type Release = Box<dyn FnOnce(&mut dyn RenderDevice) + Send + Sync>;

// Releases requested while the device was checked out by a running system.
#[derive(Default)]
struct DeferredReleases(Vec<Release>);

/// Runs `f` with the device checked out of the world.
///
/// Returns `None` when no [`Gpu`] resource is present. Releases queued while the
/// device was checked out run before it goes back.
pub fn with_gpu<T>(
    world: &mut World,
    f: impl FnOnce(&mut dyn RenderDevice, &mut World) -> T,
) -> Option<T> {
    world.with_resource_mut::<Gpu, _>(|gpu, world| {
        let out = f(gpu.device.as_mut(), world);
        if let Some(pending) = world.get_resource_mut::<DeferredReleases>() {
            for release in pending.0.drain(..) {
                release(gpu.device.as_mut());
            }
        }
        out
    })
}

/// Releases GPU handles now, or as soon as the device is returned to the world.
pub fn release_with(
    world: &mut World,
    release: impl FnOnce(&mut dyn RenderDevice) + Send + Sync + 'static,
) {
    if let Some(gpu) = world.get_resource_mut::<Gpu>() {
        release(gpu.device.as_mut());
        return;
    }
    match world.get_resource_mut::<DeferredReleases>() {
        Some(pending) => pending.0.push(Box::new(release)),
        None => world.insert_resource(DeferredReleases(vec![Box::new(release)])),
    }
}
