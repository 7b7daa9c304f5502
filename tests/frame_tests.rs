mod common;

use std::path::PathBuf;

use common::{rgba, Call};
use plutonium_render::config::RenderConfig;
use plutonium_render::phases::{FrameStats, RenderFunction, RenderPhase};
use plutonium_render::pipeline::RenderPipeline;
use plutonium_render::renderer::{AcquireError, RenderCommand};
use plutonium_render::texture_array::{ImageData, RenderTexture, TextureArrayIndex};
use plutonium_render::utils::{Color, Position, Quad, Uniforms};
use plutonium_render::window::{Resize, WindowSize};
use plutonium_render::world::World;

#[derive(Default)]
struct Trace(Vec<&'static str>);

fn trace(world: &mut World, label: &'static str) {
    if let Some(trace) = world.get_resource_mut::<Trace>() {
        trace.0.push(label);
    }
}

fn spawn_quad(world: &mut World) {
    let entity = world.spawn();
    world.insert_component(
        entity,
        Quad {
            width: 10.0,
            height: 10.0,
            corner_radius: 0.0,
        },
    );
    world.insert_component(entity, Position::new(5.0, 5.0));
    world.insert_component(entity, Color::WHITE);
}

#[test]
fn failed_acquisition_skips_the_frame() {
    let (mut renderer, log) = common::renderer();
    spawn_quad(&mut renderer.world);
    log.lock().fail_acquire = Some(AcquireError::Timeout);

    renderer.progress(0.016);

    assert!(log.lock().frames().is_empty());
    assert_eq!(log.lock().acquire_attempts, 1);
    assert_eq!(
        renderer.frame_stats(),
        FrameStats {
            presented: 0,
            skipped: 1
        }
    );

    log.lock().fail_acquire = None;
    renderer.progress(0.016);

    let frames = log.lock().frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains(&RenderCommand::Draw {
        vertices: 6,
        instances: 1
    }));
    assert_eq!(renderer.frame_stats().presented, 1);
}

#[test]
fn suboptimal_surface_skips_the_frame() {
    let (mut renderer, log) = common::renderer();
    spawn_quad(&mut renderer.world);
    log.lock().fail_acquire = Some(AcquireError::Suboptimal);

    renderer.progress(0.016);
    renderer.progress(0.016);

    assert!(log.lock().frames().is_empty());
    assert_eq!(
        renderer.frame_stats(),
        FrameStats {
            presented: 0,
            skipped: 2
        }
    );

    log.lock().fail_acquire = None;
    renderer.progress(0.016);
    assert_eq!(log.lock().frames().len(), 1);
    assert_eq!(renderer.frame_stats().presented, 1);
}

#[test]
fn acquisition_errors_that_need_a_reconfigure() {
    assert!(AcquireError::Suboptimal.needs_reconfigure());
    assert!(AcquireError::Lost.needs_reconfigure());
    assert!(AcquireError::Outdated.needs_reconfigure());
    assert!(!AcquireError::Timeout.needs_reconfigure());
    assert!(!AcquireError::OutOfMemory.needs_reconfigure());
    assert_eq!(
        AcquireError::Suboptimal.to_string(),
        "surface acquisition failed: surface suboptimal"
    );
}

#[test]
fn phases_run_in_order_after_user_systems() {
    let (mut renderer, _log) = common::renderer();
    renderer.world.insert_resource(Trace::default());
    renderer.add_render_system(RenderPhase::Queue, |world| trace(world, "queue"));
    renderer.add_render_system(RenderPhase::Prepare, |world| trace(world, "prepare"));
    renderer.add_render_system(RenderPhase::Initialize, |world| trace(world, "initialize"));
    renderer.add_render_system(RenderPhase::Load, |world| trace(world, "load"));
    renderer.add_system(|world| trace(world, "update"));

    renderer.progress(0.016);

    let trace = renderer.world.get_resource::<Trace>().unwrap();
    assert_eq!(
        trace.0,
        vec!["update", "load", "initialize", "prepare", "queue"]
    );
}

#[test]
fn render_functions_record_in_registration_order() {
    let (mut renderer, log) = common::renderer();
    spawn_quad(&mut renderer.world);
    let image = renderer.world.spawn();
    renderer
        .world
        .insert_component(image, ImageData::new(4, 4, rgba(4, 4, 0)));
    let card = renderer.world.spawn();
    renderer.world.insert_component(card, Quad::default());
    renderer.world.insert_component(card, Position::default());
    renderer.world.set_relation(card, image, RenderTexture);

    let custom = renderer.world.spawn();
    renderer.world.insert_component(
        custom,
        RenderFunction::new(|_, commands| {
            commands.push(RenderCommand::Draw {
                vertices: 3,
                instances: 1,
            })
        }),
    );

    renderer.progress(0.016);

    let quad = renderer.quads.unwrap().pipeline;
    let textured = renderer.images.unwrap().pipeline;
    let id = |entity| {
        renderer
            .world
            .get_component::<RenderPipeline>(entity)
            .and_then(|render| render.pipeline)
            .unwrap()
    };
    let frames = log.lock().frames();
    let commands = frames.last().unwrap();
    let order: Vec<RenderCommand> = commands
        .iter()
        .filter(|command| {
            matches!(
                command,
                RenderCommand::SetPipeline(_) | RenderCommand::Draw { vertices: 3, .. }
            )
        })
        .copied()
        .collect();
    assert_eq!(
        order,
        vec![
            RenderCommand::SetPipeline(id(quad)),
            RenderCommand::SetPipeline(id(textured)),
            RenderCommand::Draw {
                vertices: 3,
                instances: 1
            },
        ]
    );
    assert!(renderer.world.has_any_relation::<TextureArrayIndex>(image));
}

#[test]
fn missing_shaders_leave_pipelines_inert() {
    let (mut renderer, log) = common::renderer_with(RenderConfig {
        shader_dir: PathBuf::from("no-such-shader-dir"),
        ..RenderConfig::default()
    });
    spawn_quad(&mut renderer.world);
    let image = renderer.world.spawn();
    renderer
        .world
        .insert_component(image, ImageData::new(8, 8, rgba(8, 8, 0)));

    renderer.progress(0.016);
    renderer.progress(0.016);

    let log = log.lock();
    let frames = log.frames();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|commands| commands.is_empty()));
    // the image still lands in its layer, without mips
    assert_eq!(log.texture_writes().len(), 1);
    assert!(log.computes().is_empty());
    assert!(!log
        .calls
        .iter()
        .any(|call| matches!(call, Call::CreateRenderPipeline { .. })));
}

#[test]
fn resize_updates_surface_and_viewport() {
    let (mut renderer, log) = common::renderer();
    renderer.world.send_event(Resize {
        width: 800,
        height: 600,
    });
    renderer.progress(0.016);

    assert!(log.lock().calls.contains(&Call::Resize {
        width: 800,
        height: 600
    }));
    assert_eq!(
        renderer.world.get_resource::<WindowSize>().copied(),
        Some(WindowSize {
            width: 800,
            height: 600
        })
    );
    let viewports: Vec<[f32; 2]> = renderer
        .world
        .query::<Uniforms>()
        .map(|(_, uniforms)| uniforms.viewport)
        .collect();
    assert_eq!(viewports, vec![[800.0, 600.0]]);
}

#[test]
fn zero_sized_resize_is_ignored() {
    let (mut renderer, log) = common::renderer();
    renderer.world.send_event(Resize {
        width: 0,
        height: 0,
    });
    renderer.progress(0.016);

    assert!(!log
        .lock()
        .calls
        .iter()
        .any(|call| matches!(call, Call::Resize { .. })));
    assert_eq!(
        renderer.world.get_resource::<WindowSize>().copied(),
        Some(WindowSize {
            width: 640,
            height: 480
        })
    );
}

#[test]
fn shutdown_releases_everything() {
    let (mut renderer, log) = common::renderer();
    spawn_quad(&mut renderer.world);
    for size in [16, 16, 16, 32] {
        let image = renderer.world.spawn();
        renderer
            .world
            .insert_component(image, ImageData::new(size, size, rgba(size, size, 0)));
    }
    renderer.progress(0.016);
    renderer.progress(0.016);

    renderer.shutdown();

    let log = log.lock();
    for kind in [
        "buffer",
        "layout",
        "bind_group",
        "shader",
        "render_pipeline",
        "compute_pipeline",
        "texture",
        "view",
        "sampler",
    ] {
        assert_eq!(log.live(kind), 0, "{kind} still alive");
    }
}
