pub mod app;
pub mod config;
pub mod loader;
pub mod mipmap;
pub mod phases;
pub mod pipeline;
pub mod pipelines;
pub mod renderer;
pub mod resources;
pub mod texture_array;
pub mod utils;
pub mod wgpu_device;
pub mod window;

pub use plutonium_world as world;

use config::RenderConfig;
use mipmap::MipmapGenerator;
use phases::{ClearColor, FrameStats, RenderPhase, RenderSchedule};
use pipelines::image::ImageEntities;
use pipelines::quad::QuadEntities;
use plutonium_world::{FrameNumber, Schedule, Time, World};
use renderer::{with_gpu, Gpu, RenderDevice};
use texture_array::TextureArrayCache;
use window::WindowSize;

/// World, user systems and render phases, advanced one frame per [`progress`].
///
/// [`progress`]: PlutoniumRenderer::progress
pub struct PlutoniumRenderer {
    pub world: World,
    pub quads: Option<QuadEntities>,
    pub images: Option<ImageEntities>,
    update: Schedule,
    phases: RenderSchedule,
}

impl PlutoniumRenderer {
    pub fn new(
        device: impl RenderDevice + 'static,
        config: &RenderConfig,
        width: u32,
        height: u32,
    ) -> Self {
        let mut world = World::new();
        resources::register(&mut world);
        pipeline::register(&mut world);
        texture_array::register(&mut world);
        loader::register(&mut world);

        world.insert_resource(Gpu::new(device));
        world.insert_resource(WindowSize { width, height });
        world.insert_resource(ClearColor(config.clear_color()));
        world.insert_resource(FrameStats::default());
        world.insert_resource(Time::default());
        world.insert_resource(FrameNumber::default());

        // uploads land before any batch is collected
        let mut phases = RenderSchedule::new();
        phases.add_system(RenderPhase::Load, pipeline::load_pipelines);
        phases.add_system(RenderPhase::Initialize, texture_array::upload_pending_images);
        phases.add_system(RenderPhase::Prepare, pipelines::prepare_uniforms);

        let shader_dir = config.shader_dir.clone();
        let built = with_gpu(&mut world, |device, world| {
            pipelines::create_view_uniforms(world, device, width, height);
            let cache = TextureArrayCache::new(device);
            world.insert_resource(cache);
            let generator = MipmapGenerator::new(world, device, &shader_dir.join("mipmap.wgsl"));
            world.insert_resource(generator);

            let quads = pipelines::quad::register(world, device, &mut phases, &shader_dir);
            let images = pipelines::image::register(world, device, &mut phases, &shader_dir);
            (quads, images)
        });
        phases.add_system(RenderPhase::Queue, phases::queue_frame);

        let (quads, images) = built.unzip();
        log::info!("renderer ready at {}x{}", width, height);
        Self {
            world,
            quads,
            images,
            update: Schedule::new(),
            phases,
        }
    }

    /// Adds a system that runs every frame before the render phases.
    pub fn add_system(&mut self, f: impl Fn(&mut World) + Send + Sync + 'static) {
        self.update.add_system(f);
    }

    pub fn add_render_system(
        &mut self,
        phase: RenderPhase,
        f: impl Fn(&mut World) + Send + Sync + 'static,
    ) {
        self.phases.add_system(phase, f);
    }

    /// Runs one frame: pending images and resizes, user systems, then every phase.
    pub fn progress(&mut self, delta_seconds: f32) {
        self.world.insert_resource(Time { delta_seconds });
        if let Some(frame) = self.world.get_resource_mut::<FrameNumber>() {
            frame.0 += 1;
        }

        loader::drain_loaded_images(&mut self.world);
        window::apply_resize(&mut self.world);
        self.update.run(&mut self.world);
        self.phases.run(&mut self.world);
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.world
            .get_resource::<FrameStats>()
            .copied()
            .unwrap_or_default()
    }

    /// Releases every GPU object the world owns, newest entity first, then the device.
    pub fn shutdown(&mut self) {
        if self.world.get_resource::<Gpu>().is_none() {
            return;
        }
        for entity in self.world.entities().into_iter().rev() {
            self.world.despawn(entity);
        }
        let generator = self.world.remove_resource::<MipmapGenerator>();
        let cache = self.world.remove_resource::<TextureArrayCache>();
        with_gpu(&mut self.world, |device, _| {
            if let Some(mut generator) = generator {
                generator.release(device);
            }
            if let Some(mut cache) = cache {
                cache.layout.release(device);
            }
        });
        self.world.remove_resource::<Gpu>();
        log::info!("renderer shut down");
    }
}

impl Drop for PlutoniumRenderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
