//! Solid quads and circles, drawn as one instanced call.

use std::path::Path;

use plutonium_world::{Entity, World};

use super::{
    instance_layout, prepare_instances, quad_vertex_buffer, quad_vertex_layout, InstanceBatch,
    ViewUniforms,
};
use crate::phases::{bind_group_commands, Binds, RenderFunction, RenderPhase, RenderSchedule};
use crate::pipeline::{RenderPipeline, Shader};
use crate::renderer::{RenderCommand, RenderDevice};
use crate::resources::{Binding, Buffer};
use crate::texture_array::RenderTexture;
use crate::utils::{Circle, Color, Position, Quad, QuadInstance};

/// Marker on the quad pipeline entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadPipeline;

/// Marker on the quad instance buffer entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadInstances;

#[derive(Debug, Clone, Copy)]
pub struct QuadEntities {
    pub pipeline: Entity,
    pub instances: Entity,
    pub vertices: Entity,
}

pub fn register(
    world: &mut World,
    device: &mut dyn RenderDevice,
    schedule: &mut RenderSchedule,
    shader_dir: &Path,
) -> QuadEntities {
    let vertices = quad_vertex_buffer(world, device);
    let layout = instance_layout(device, "quad_instance_layout");
    let view = world.get_resource::<ViewUniforms>().copied();

    let instances = world.spawn();
    world.insert_component(instances, QuadInstances);
    world.insert_component(
        instances,
        Buffer::new("quad_instances", wgpu::BufferUsages::STORAGE),
    );
    let instance_layout = layout.layout;
    world.insert_component(instances, layout);
    world.insert_component(instances, Binding::default());
    world.insert_component(instances, InstanceBatch::<QuadInstance>::default());

    let layouts = [view.and_then(|view| view.layout), instance_layout]
        .into_iter()
        .flatten()
        .collect();
    let pipeline = world.spawn();
    world.insert_component(pipeline, QuadPipeline);
    if let Some(view) = view {
        world.set_relation(pipeline, view.entity, Binds { index: 0 });
    }
    world.set_relation(pipeline, instances, Binds { index: 1 });
    world.insert_component(pipeline, Shader::new(shader_dir.join("quad.wgsl")));
    world.insert_component(pipeline, RenderPipeline::new(quad_vertex_layout(), layouts));
    world.insert_component(
        pipeline,
        RenderFunction::new(move |world, commands| {
            render(world, commands, pipeline, instances, vertices)
        }),
    );

    schedule.add_system(RenderPhase::Initialize, move |world| collect(world, instances));
    schedule.add_system(RenderPhase::Prepare, move |world| {
        prepare_instances::<QuadInstance>(world, instances, instances)
    });

    QuadEntities {
        pipeline,
        instances,
        vertices,
    }
}

/// One record per colored quad and circle, in spawn order.
///
/// Quads showing a texture belong to the image pipeline and are skipped.
pub fn collect(world: &mut World, instances: Entity) {
    let mut records = Vec::new();
    for entity in world.entities_with::<Quad>() {
        if world.has_any_relation::<RenderTexture>(entity) {
            continue;
        }
        if let (Some(quad), Some(position), Some(color)) = (
            world.get_component::<Quad>(entity),
            world.get_component::<Position>(entity),
            world.get_component::<Color>(entity),
        ) {
            records.push(QuadInstance::quad(quad, position, color));
        }
    }
    for entity in world.entities_with::<Circle>() {
        if let (Some(circle), Some(position), Some(color)) = (
            world.get_component::<Circle>(entity),
            world.get_component::<Position>(entity),
            world.get_component::<Color>(entity),
        ) {
            records.push(QuadInstance::circle(circle, position, color));
        }
    }

    if let Some(batch) = world.get_component_mut::<InstanceBatch<QuadInstance>>(instances) {
        batch.0.extend(records);
    }
}

fn render(
    world: &World,
    commands: &mut Vec<RenderCommand>,
    pipeline: Entity,
    instances: Entity,
    vertices: Entity,
) {
    let count = world
        .get_component::<Buffer>(instances)
        .map_or(0, |buffer| buffer.count);
    if count == 0 {
        return;
    }
    let Some(render_pipeline) = world
        .get_component::<RenderPipeline>(pipeline)
        .and_then(|render| render.pipeline)
    else {
        return;
    };
    let Some(vertex_buffer) = world.get_component::<Buffer>(vertices).and_then(|b| b.id) else {
        return;
    };
    let Some(groups) = bind_group_commands(world, pipeline) else {
        return;
    };

    commands.push(RenderCommand::SetPipeline(render_pipeline));
    commands.push(RenderCommand::SetVertexBuffer {
        slot: 0,
        buffer: vertex_buffer,
    });
    commands.extend(groups);
    commands.push(RenderCommand::Draw {
        vertices: 6,
        instances: count as u32,
    });
}
