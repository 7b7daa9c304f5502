//! Built-in instanced pipelines and the pieces they share.

pub mod image;
pub mod quad;

use plutonium_world::{Entity, World};

use crate::renderer::{with_gpu, BindGroupLayoutId, RenderDevice, VertexLayout};
use crate::resources::{buffer_layout_entry, Binding, BindingLayout, Buffer};
use crate::utils::{Uniforms, Vertex, QUAD_VERTICES};

/// Instance records gathered during Initialize and uploaded during Prepare.
#[derive(Debug, Clone)]
pub struct InstanceBatch<T>(pub Vec<T>);

impl<T> Default for InstanceBatch<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> InstanceBatch<T> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resource pointing at the entity that owns the viewport uniform.
#[derive(Debug, Clone, Copy)]
pub struct ViewUniforms {
    pub entity: Entity,
    pub layout: Option<BindGroupLayoutId>,
}

pub fn quad_vertex_layout() -> VertexLayout {
    VertexLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        attributes: wgpu::vertex_attr_array![0 => Float32x3].to_vec(),
    }
}

pub fn quad_vertex_buffer(world: &mut World, device: &mut dyn RenderDevice) -> Entity {
    let buffer = Buffer::with_data(
        device,
        "quad_vertices",
        wgpu::BufferUsages::VERTEX,
        &QUAD_VERTICES,
    );
    let entity = world.spawn();
    world.insert_component(entity, buffer);
    entity
}

/// Layout for a read-only storage buffer of instance records, visible to the vertex stage.
pub fn instance_layout(device: &mut dyn RenderDevice, label: &str) -> BindingLayout {
    BindingLayout::new(
        device,
        label,
        &[buffer_layout_entry(
            wgpu::ShaderStages::VERTEX,
            wgpu::BufferBindingType::Storage { read_only: true },
        )],
    )
}

/// Spawns the viewport uniform entity and publishes it as [`ViewUniforms`].
pub fn create_view_uniforms(
    world: &mut World,
    device: &mut dyn RenderDevice,
    width: u32,
    height: u32,
) -> Entity {
    let layout = BindingLayout::new(
        device,
        "uniform_layout",
        &[buffer_layout_entry(
            wgpu::ShaderStages::VERTEX,
            wgpu::BufferBindingType::Uniform,
        )],
    );
    let entity = world.spawn();
    world.insert_resource(ViewUniforms {
        entity,
        layout: layout.layout,
    });
    world.insert_component(entity, Buffer::new("uniforms", wgpu::BufferUsages::UNIFORM));
    world.insert_component(entity, layout);
    world.insert_component(entity, Binding::default());
    world.insert_component(entity, Uniforms::new(width as f32, height as f32));
    entity
}

/// Prepare phase: uploads the viewport uniform and rebinds it when needed.
pub fn prepare_uniforms(world: &mut World) {
    let Some(entity) = world.get_resource::<ViewUniforms>().map(|view| view.entity) else {
        return;
    };
    let Some(uniforms) = world.get_component::<Uniforms>(entity).copied() else {
        return;
    };

    with_gpu(world, |device, world| {
        let Some(buffer) = world.get_component_mut::<Buffer>(entity) else {
            return;
        };
        let reallocated = buffer.write(device, &uniforms);
        let buffer = buffer.clone();
        let bound = world
            .get_component::<Binding>(entity)
            .is_some_and(|binding| binding.group.is_some());
        if reallocated || !bound {
            rebind(world, device, &buffer, entity, entity);
        }
    });
}

/// Prepare phase for an instance buffer entity: uploads its batch, rebinds
/// it when non-empty and clears the batch.
///
/// `layout_owner` is the entity carrying the instance `BindingLayout`.
pub fn prepare_instances<T: bytemuck::Pod + Send + Sync>(
    world: &mut World,
    instances: Entity,
    layout_owner: Entity,
) {
    let Some(mut records) = world
        .get_component_mut::<InstanceBatch<T>>(instances)
        .map(|batch| std::mem::take(&mut batch.0))
    else {
        return;
    };

    with_gpu(world, |device, world| {
        let Some(buffer) = world.get_component_mut::<Buffer>(instances) else {
            return;
        };
        buffer.write_slice(device, &records);
        if !records.is_empty() {
            let buffer = buffer.clone();
            rebind(world, device, &buffer, instances, layout_owner);
        }
    });

    // hand the emptied allocation back for next frame
    records.clear();
    if let Some(batch) = world.get_component_mut::<InstanceBatch<T>>(instances) {
        batch.0 = records;
    }
}

fn rebind(
    world: &mut World,
    device: &mut dyn RenderDevice,
    buffer: &Buffer,
    entity: Entity,
    layout_owner: Entity,
) {
    let layout = world
        .get_component::<BindingLayout>(layout_owner)
        .cloned()
        .unwrap_or_default();
    if let Some(binding) = world.get_component_mut::<Binding>(entity) {
        buffer.rebuild_binding(device, binding, &layout);
    }
}
