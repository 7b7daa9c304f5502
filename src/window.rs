//! Window boundary: size resource and the input events the core understands.

use plutonium_world::World;

use crate::renderer::with_gpu;
use crate::utils::Uniforms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MousePress {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseRelease {
    pub x: f32,
    pub y: f32,
}

/// Applies the latest pending [`Resize`]: window size, viewport uniform and surface.
pub fn apply_resize(world: &mut World) {
    let Some(resize) = world.drain_events::<Resize>().into_iter().last() else {
        return;
    };
    if resize.width == 0 || resize.height == 0 {
        // minimized, keep rendering at the previous size
        return;
    }

    world.insert_resource(WindowSize {
        width: resize.width,
        height: resize.height,
    });
    for (_, uniforms) in world.query_mut::<Uniforms>() {
        *uniforms = Uniforms::new(resize.width as f32, resize.height as f32);
    }
    with_gpu(world, |device, _| device.resize(resize.width, resize.height));
    log::debug!("resized to {}x{}", resize.width, resize.height);
}
