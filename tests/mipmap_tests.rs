mod common;

use std::path::Path;

use common::{rgba, Call, RecordingDevice};
use plutonium_render::mipmap::{mip_dispatches, MipDispatch, MipmapGenerator};
use plutonium_render::renderer::{BindingResource, ComputeCommand, ComputePipelineId};
use plutonium_render::texture_array::{
    mip_sizes, ImageData, TextureArray, TextureArrayCache, TextureArrayKey,
};
use plutonium_render::world::World;

#[test]
fn dispatches_cover_each_level_in_order() {
    let dispatches = mip_dispatches(&mip_sizes(64, 64));
    let levels: Vec<u32> = dispatches.iter().map(|d| d.level).collect();
    assert_eq!(levels, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(
        dispatches[0],
        MipDispatch {
            level: 1,
            workgroups_x: 4,
            workgroups_y: 4
        }
    );
    assert!(dispatches[2..]
        .iter()
        .all(|d| d.workgroups_x == 1 && d.workgroups_y == 1));
}

#[test]
fn odd_extents_round_workgroups_up() {
    let dispatches = mip_dispatches(&mip_sizes(100, 20));
    // level 1 is 50x10
    assert_eq!(dispatches[0].workgroups_x, 7);
    assert_eq!(dispatches[0].workgroups_y, 2);
    assert!(mip_dispatches(&mip_sizes(1, 1)).is_empty());
}

fn setup() -> (World, RecordingDevice, TextureArrayCache, MipmapGenerator, TextureArray) {
    let mut world = World::new();
    let mut device = RecordingDevice::new();
    let cache = TextureArrayCache::new(&mut device);
    let generator = MipmapGenerator::new(&mut world, &mut device, Path::new("shaders/mipmap.wgsl"));
    let array = TextureArray::new(
        &mut device,
        TextureArrayKey {
            width: 16,
            height: 16,
        },
        &cache.layout,
    );
    (world, device, cache, generator, array)
}

#[test]
fn one_submission_per_layer_with_levels_in_order() {
    let (_world, mut device, cache, mut generator, mut array) = setup();
    generator.compute = Some(ComputePipelineId(900));
    let live_groups = device.log.lock().live("bind_group");

    let layer = array.upload_image(
        &mut device,
        &cache.layout,
        Some(&mut generator),
        &ImageData::new(16, 16, rgba(16, 16, 9)),
    );
    assert_eq!(layer, Some(0));

    let log = device.log.lock();
    let computes = log.computes();
    assert_eq!(computes.len(), 1);
    let commands = &computes[0];
    assert_eq!(commands[0], ComputeCommand::SetPipeline(ComputePipelineId(900)));

    // 16x16 has levels 1..=4, each bound and dispatched in turn
    let dispatched: Vec<(u32, u32)> = commands
        .iter()
        .filter_map(|command| match command {
            ComputeCommand::Dispatch { x, y, z } => {
                assert_eq!(*z, 1);
                Some((*x, *y))
            }
            _ => None,
        })
        .collect();
    assert_eq!(dispatched, vec![(1, 1), (1, 1), (1, 1), (1, 1)]);
    assert_eq!(commands.len(), 1 + 3 * 4);
    for step in commands[1..].chunks(3) {
        assert!(matches!(step[0], ComputeCommand::SetBindGroup { index: 0, .. }));
        assert_eq!(
            step[1],
            ComputeCommand::SetBindGroup {
                index: 1,
                group: generator.uniform_binding.group.unwrap()
            }
        );
        assert!(matches!(step[2], ComputeCommand::Dispatch { .. }));
    }

    // transient groups read level - 1 and write level
    let transient: Vec<Vec<u32>> = log
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::CreateBindGroup { entries, .. } if entries.len() == 2 => Some(
                entries
                    .iter()
                    .filter_map(|entry| match entry.resource {
                        BindingResource::TextureView(view) => Some(view.0),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        })
        .filter(|views: &Vec<u32>| views.len() == 2)
        .collect();
    let mip_views: Vec<u32> = array.mip_views.iter().map(|view| view.0).collect();
    assert_eq!(transient.len(), 4);
    for (level, views) in transient.iter().enumerate() {
        assert_eq!(views, &vec![mip_views[level], mip_views[level + 1]]);
    }
    assert_eq!(log.live("bind_group"), live_groups);
}

#[test]
fn uniform_carries_the_layer() {
    let (_world, mut device, cache, mut generator, mut array) = setup();
    generator.compute = Some(ComputePipelineId(900));
    let uniform = generator.uniforms.id.unwrap().0;

    for _ in 0..3 {
        array.upload_image(
            &mut device,
            &cache.layout,
            Some(&mut generator),
            &ImageData::new(16, 16, rgba(16, 16, 1)),
        );
    }

    let log = device.log.lock();
    let uniform_writes = log
        .calls
        .iter()
        .filter(|call| matches!(call, Call::WriteBuffer { id, len: 16 } if *id == uniform))
        .count();
    // one at creation, one per layer
    assert_eq!(uniform_writes, 4);
    assert_eq!(log.computes().len(), 3);
}

#[test]
fn missing_pipeline_skips_generation() {
    let (_world, mut device, cache, mut generator, mut array) = setup();

    let layer = array.upload_image(
        &mut device,
        &cache.layout,
        Some(&mut generator),
        &ImageData::new(16, 16, rgba(16, 16, 1)),
    );

    assert_eq!(layer, Some(0));
    assert_eq!(array.count, 1);
    let log = device.log.lock();
    assert!(log.computes().is_empty());
    assert_eq!(log.texture_writes().len(), 1);
}

#[test]
fn generator_pipeline_is_built_in_load_phase() {
    let (mut renderer, log) = common::renderer();
    renderer.progress(0.016);

    let built = log.lock().calls.iter().any(|call| {
        matches!(call, Call::CreateComputePipeline { desc, .. } if desc.entry_point == "compute")
    });
    assert!(built);
}
