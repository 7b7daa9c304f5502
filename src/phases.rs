//! Frame phases and the queue step that turns render functions into one pass.

use plutonium_world::{Entity, Schedule, World};

use crate::renderer::{with_gpu, BindGroupId, RenderCommand};
use crate::resources::Binding;
use crate::texture_array::TextureArray;

/// Per-frame phases, run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPhase {
    /// Compile shaders and build pipelines.
    Load,
    /// Create resources for new requests and collect instance data.
    Initialize,
    /// Upload buffers and rebuild bind groups.
    Prepare,
    /// Record draws, submit and present.
    Queue,
}

impl RenderPhase {
    pub const ALL: [RenderPhase; 4] = [
        RenderPhase::Load,
        RenderPhase::Initialize,
        RenderPhase::Prepare,
        RenderPhase::Queue,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Default)]
pub struct RenderSchedule {
    phases: [Schedule; 4],
}

impl RenderSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_system(
        &mut self,
        phase: RenderPhase,
        f: impl Fn(&mut World) + Send + Sync + 'static,
    ) {
        self.phases[phase.slot()].add_system(f);
    }

    pub fn len(&self, phase: RenderPhase) -> usize {
        self.phases[phase.slot()].len()
    }

    pub fn run(&self, world: &mut World) {
        for phase in RenderPhase::ALL {
            self.phases[phase.slot()].run(world);
        }
    }
}

/// Relation payload: the target's bind group goes to group `index` of the source pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binds {
    pub index: u32,
}

type RenderFn = Box<dyn Fn(&World, &mut Vec<RenderCommand>) + Send + Sync>;

/// Records the draws of one pipeline into the frame's render pass.
pub struct RenderFunction(pub RenderFn);

impl RenderFunction {
    pub fn new(f: impl Fn(&World, &mut Vec<RenderCommand>) + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor(pub wgpu::Color);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub skipped: u64,
}

/// Bind group currently published by `target`, from its `Binding` or its texture array.
pub fn bound_group(world: &World, target: Entity) -> Option<BindGroupId> {
    world
        .get_component::<Binding>(target)
        .and_then(|binding| binding.group)
        .or_else(|| {
            world
                .get_component::<TextureArray>(target)
                .and_then(|array| array.binding.group)
        })
}

/// `SetBindGroup` commands for every `Binds` edge of `source`, by group index.
///
/// Returns `None` if any target has no bind group yet, since drawing would fail.
pub fn bind_group_commands(world: &World, source: Entity) -> Option<Vec<RenderCommand>> {
    let mut binds: Vec<(u32, Entity)> = world
        .targets::<Binds>(source)
        .into_iter()
        .map(|(target, binds)| (binds.index, target))
        .collect();
    binds.sort();
    binds
        .into_iter()
        .map(|(index, target)| {
            bound_group(world, target).map(|group| RenderCommand::SetBindGroup { index, group })
        })
        .collect()
}

/// Queue phase: acquires the surface image and submits one pass with every
/// render function, in the order their entities were spawned.
///
/// A failed acquisition skips the frame without recording anything.
pub fn queue_frame(world: &mut World) {
    let clear = world
        .get_resource::<ClearColor>()
        .map(|clear| clear.0)
        .unwrap_or(wgpu::Color::BLACK);

    let presented = with_gpu(world, |device, world| {
        if let Err(err) = device.acquire_frame() {
            log::debug!("skipping frame: {}", err);
            return false;
        }

        let mut commands = Vec::new();
        for entity in world.entities_with::<RenderFunction>() {
            if let Some(render) = world.get_component::<RenderFunction>(entity) {
                (render.0)(world, &mut commands);
            }
        }
        device.submit_frame(clear, &commands);
        true
    });

    if let Some(presented) = presented {
        if let Some(stats) = world.get_resource_mut::<FrameStats>() {
            if presented {
                stats.presented += 1;
            } else {
                stats.skipped += 1;
            }
        }
    }
}
