use std::path::{Path, PathBuf};

use plutonium_world::{Entity, World};

use crate::renderer::{
    release_with, with_gpu, BindGroupLayoutId, ComputePipelineDesc, ComputePipelineId,
    PipelineState, RenderDevice, RenderPipelineDesc, RenderPipelineId, ShaderModuleId,
    VertexLayout,
};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";
pub const COMPUTE_ENTRY: &str = "compute";

/// WGSL source on disk and the module compiled from it.
#[derive(Debug, Clone)]
pub struct Shader {
    pub path: PathBuf,
    pub module: Option<ShaderModuleId>,
}

impl Shader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            module: None,
        }
    }

    fn label(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shader".to_string())
    }
}

/// Marks a pipeline entity whose shader has been processed, successfully or not.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ready;

#[derive(Debug, Clone)]
pub struct RenderPipeline {
    pub vertex_layout: VertexLayout,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub pipeline: Option<RenderPipelineId>,
}

impl RenderPipeline {
    pub fn new(vertex_layout: VertexLayout, bind_group_layouts: Vec<BindGroupLayoutId>) -> Self {
        Self {
            vertex_layout,
            bind_group_layouts,
            pipeline: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputePipeline {
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub pipeline: Option<ComputePipelineId>,
}

impl ComputePipeline {
    pub fn new(bind_group_layouts: Vec<BindGroupLayoutId>) -> Self {
        Self {
            bind_group_layouts,
            pipeline: None,
        }
    }
}

/// Reads and compiles a WGSL file. Failures are logged and yield `None`.
pub fn compile(device: &mut dyn RenderDevice, path: &Path) -> Option<ShaderModuleId> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            log::error!("failed to read shader {}: {}", path.display(), err);
            return None;
        }
    };
    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match device.create_shader_module(&label, &source) {
        Ok(module) => {
            log::info!("compiled shader {}", path.display());
            Some(module)
        }
        Err(err) => {
            log::error!("{:#}", err);
            None
        }
    }
}

/// Fixed state every render pipeline is built with.
pub fn render_state(format: wgpu::TextureFormat) -> PipelineState {
    PipelineState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        blend: wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        },
        sample_count: 1,
        format,
        vertex_entry: VERTEX_ENTRY,
        fragment_entry: FRAGMENT_ENTRY,
    }
}

pub fn build_render_pipeline(
    device: &mut dyn RenderDevice,
    label: &str,
    vertex_layout: &VertexLayout,
    bind_group_layouts: &[BindGroupLayoutId],
    shader: ShaderModuleId,
    format: wgpu::TextureFormat,
) -> RenderPipelineId {
    device.create_render_pipeline(&RenderPipelineDesc {
        label: label.to_string(),
        shader,
        vertex_layout: vertex_layout.clone(),
        bind_group_layouts: bind_group_layouts.to_vec(),
        state: render_state(format),
    })
}

pub fn build_compute_pipeline(
    device: &mut dyn RenderDevice,
    label: &str,
    bind_group_layouts: &[BindGroupLayoutId],
    shader: ShaderModuleId,
) -> ComputePipelineId {
    device.create_compute_pipeline(&ComputePipelineDesc {
        label: label.to_string(),
        shader,
        bind_group_layouts: bind_group_layouts.to_vec(),
        entry_point: COMPUTE_ENTRY,
    })
}

/// Load phase: compiles every unprocessed shader once and builds its pipeline.
pub fn load_pipelines(world: &mut World) {
    let pending: Vec<Entity> = world
        .entities_with::<Shader>()
        .into_iter()
        .filter(|entity| !world.has_component::<Ready>(*entity))
        .collect();
    if pending.is_empty() {
        return;
    }

    with_gpu(world, |device, world| {
        for entity in pending {
            load_pipeline(device, world, entity);
            world.insert_component(entity, Ready);
        }
    });
}

fn load_pipeline(device: &mut dyn RenderDevice, world: &mut World, entity: Entity) {
    let Some(shader) = world.get_component_mut::<Shader>(entity) else {
        return;
    };
    if shader.module.is_none() {
        shader.module = compile(device, &shader.path);
    }
    let label = shader.label();
    let Some(module) = shader.module else {
        log::warn!("pipeline `{}` stays inert until its shader is replaced", label);
        return;
    };

    let format = device.surface_format();
    if let Some(render) = world.get_component_mut::<RenderPipeline>(entity) {
        if let Some(old) = render.pipeline.take() {
            device.destroy_render_pipeline(old);
        }
        render.pipeline = Some(build_render_pipeline(
            device,
            &label,
            &render.vertex_layout,
            &render.bind_group_layouts,
            module,
            format,
        ));
        log::info!("built render pipeline `{}`", label);
    }
    if let Some(compute) = world.get_component_mut::<ComputePipeline>(entity) {
        if let Some(old) = compute.pipeline.take() {
            device.destroy_compute_pipeline(old);
        }
        compute.pipeline = Some(build_compute_pipeline(
            device,
            &label,
            &compute.bind_group_layouts,
            module,
        ));
        log::info!("built compute pipeline `{}`", label);
    }
}

/// Registers pipeline hooks: re-setting a shader queues a rebuild, and removed
/// modules and pipelines are released.
///
/// Pipelines borrow their bind group layouts; the layouts are released by
/// whichever entity owns them.
pub fn register(world: &mut World) {
    world.on_set::<Shader>(|world, entity| {
        if world.has_component::<Ready>(entity) {
            world.remove_component::<Ready>(entity);
        }
    });
    world.on_remove::<Shader>(|world, _, mut shader| {
        if let Some(module) = shader.module.take() {
            release_with(world, move |device| device.destroy_shader_module(module));
        }
    });
    world.on_remove::<RenderPipeline>(|world, _, mut render| {
        if let Some(pipeline) = render.pipeline.take() {
            release_with(world, move |device| device.destroy_render_pipeline(pipeline));
        }
    });
    world.on_remove::<ComputePipeline>(|world, _, mut compute| {
        if let Some(pipeline) = compute.pipeline.take() {
            release_with(world, move |device| device.destroy_compute_pipeline(pipeline));
        }
    });
}
