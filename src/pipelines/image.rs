//! Textured quads sampling the texture array cache.
//!
//! Every texture array gets its own instance buffer and a binding entity tying
//! the viewport uniform, that buffer and the array's bind group together. One
//! instanced draw is issued per array that has something to show.

use std::collections::HashMap;
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
use crate::texture_array::{RenderTexture, TextureArray, TextureArrayCache, TextureArrayIndex};
use crate::utils::{ImageInstance, Position, Quad};

/// Marker on the image pipeline entity, which also owns the instance layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePipeline;

/// Marker on the per-array binding entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBinding;

/// Relation from a binding entity to its instance buffer entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundInstances;

/// Relation from a binding entity to its texture array entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundTextures;

#[derive(Debug, Clone, Copy)]
pub struct ImageEntities {
    pub pipeline: Entity,
    pub vertices: Entity,
}

pub fn register(
    world: &mut World,
    device: &mut dyn RenderDevice,
    schedule: &mut RenderSchedule,
    shader_dir: &Path,
) -> ImageEntities {
    if world.get_resource::<TextureArrayCache>().is_none() {
        let cache = TextureArrayCache::new(device);
        world.insert_resource(cache);
    }
    let texture_layout = world
        .get_resource::<TextureArrayCache>()
        .and_then(|cache| cache.layout.layout);
    let view_layout = world
        .get_resource::<ViewUniforms>()
        .and_then(|view| view.layout);

    let vertices = quad_vertex_buffer(world, device);
    let layout = instance_layout(device, "image_instance_layout");
    let layouts = [view_layout, layout.layout, texture_layout]
        .into_iter()
        .flatten()
        .collect();

    let pipeline = world.spawn();
    world.insert_component(pipeline, ImagePipeline);
    world.insert_component(pipeline, layout);
    world.insert_component(pipeline, Shader::new(shader_dir.join("image.wgsl")));
    world.insert_component(pipeline, RenderPipeline::new(quad_vertex_layout(), layouts));
    world.insert_component(
        pipeline,
        RenderFunction::new(move |world, commands| render(world, commands, pipeline, vertices)),
    );

    // arrays created before this point still need a binding
    for array in world.entities_with::<TextureArray>() {
        attach_array(world, array);
    }
    world.on_set::<TextureArray>(attach_array);

    schedule.add_system(RenderPhase::Initialize, collect);
    schedule.add_system(RenderPhase::Prepare, move |world| prepare(world, pipeline));

    ImageEntities { pipeline, vertices }
}

fn bindings(world: &World) -> Vec<Entity> {
    world.entities_with::<ImageBinding>()
}

/// Spawns the instance buffer and binding entity for a new texture array.
fn attach_array(world: &mut World, array: Entity) {
    let attached = world
        .query_relation::<BoundTextures>()
        .into_iter()
        .any(|(_, target, _)| target == array);
    if attached {
        return;
    }

    let instances = world.spawn();
    world.insert_component(
        instances,
        Buffer::new("image_instances", wgpu::BufferUsages::STORAGE),
    );
    world.insert_component(instances, Binding::default());
    world.insert_component(instances, InstanceBatch::<ImageInstance>::default());

    let binding = world.spawn();
    world.insert_component(binding, ImageBinding);
    world.set_relation(binding, instances, BoundInstances);
    world.set_relation(binding, array, BoundTextures);
    if let Some(view) = world.get_resource::<ViewUniforms>().copied() {
        world.set_relation(binding, view.entity, Binds { index: 0 });
    }
    world.set_relation(binding, instances, Binds { index: 1 });
    world.set_relation(binding, array, Binds { index: 2 });
    log::debug!("bound texture array {:?} to {:?}", array, binding);
}

/// Initialize phase: one record per textured quad, batched by texture array.
pub fn collect(world: &mut World) {
    let mut batches: HashMap<Entity, Entity> = HashMap::new();
    for binding in bindings(world) {
        let instances = world.target::<BoundInstances>(binding);
        let array = world.target::<BoundTextures>(binding);
        match (instances, array) {
            (Some(instances), Some(array)) if world.is_alive(array) => {
                batches.insert(array, instances);
            }
            (instances, _) => {
                // the array is gone, so is everything drawn from it
                if let Some(instances) = instances {
                    world.despawn(instances);
                }
                world.despawn(binding);
            }
        }
    }

    let mut records: HashMap<Entity, Vec<ImageInstance>> = HashMap::new();
    for entity in world.entities_with::<Quad>() {
        let Some(image) = world.target::<RenderTexture>(entity) else {
            continue;
        };
        let Some((array, index)) = world
            .targets::<TextureArrayIndex>(image)
            .first()
            .map(|(array, index)| (*array, index.index))
        else {
            continue;
        };
        let (Some(quad), Some(position)) = (
            world.get_component::<Quad>(entity),
            world.get_component::<Position>(entity),
        ) else {
            continue;
        };
        records
            .entry(array)
            .or_default()
            .push(ImageInstance::new(quad, position, index));
    }

    for (array, records) in records {
        let Some(instances) = batches.get(&array) else {
            continue;
        };
        if let Some(batch) = world.get_component_mut::<InstanceBatch<ImageInstance>>(*instances) {
            batch.0.extend(records);
        }
    }
}

/// Prepare phase: uploads every array's batch against the shared instance layout.
pub fn prepare(world: &mut World, pipeline: Entity) {
    for binding in bindings(world) {
        if let Some(instances) = world.target::<BoundInstances>(binding) {
            prepare_instances::<ImageInstance>(world, instances, pipeline);
        }
    }
}

fn render(world: &World, commands: &mut Vec<RenderCommand>, pipeline: Entity, vertices: Entity) {
    let Some(render_pipeline) = world
        .get_component::<RenderPipeline>(pipeline)
        .and_then(|render| render.pipeline)
    else {
        return;
    };
    let Some(vertex_buffer) = world.get_component::<Buffer>(vertices).and_then(|b| b.id) else {
        return;
    };

    let mut bound = false;
    for binding in bindings(world) {
        let count = world
            .target::<BoundInstances>(binding)
            .and_then(|instances| world.get_component::<Buffer>(instances))
            .map_or(0, |buffer| buffer.count);
        if count == 0 {
            continue;
        }
        let Some(groups) = bind_group_commands(world, binding) else {
            continue;
        };
        if !bound {
            commands.push(RenderCommand::SetPipeline(render_pipeline));
            commands.push(RenderCommand::SetVertexBuffer {
                slot: 0,
                buffer: vertex_buffer,
            });
            bound = true;
        }
        commands.extend(groups);
        commands.push(RenderCommand::Draw {
            vertices: 6,
            instances: count as u32,
        });
    }
}
