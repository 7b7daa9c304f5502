//! Image decoding off the main thread.
//!
//! Workers push decoded pixels into [`LoadedImages`]; the main thread drains the
//! queue once per tick and attaches each image to its entity as [`ImageData`],
//! which the Initialize phase then uploads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use plutonium_world::{Entity, World};

use crate::texture_array::ImageData;

/// Handoff queue shared between loader workers and the main thread.
#[derive(Clone, Default)]
pub struct LoadedImages(Arc<Mutex<Vec<(Entity, ImageData)>>>);

impl LoadedImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entity: Entity, image: ImageData) {
        self.0.lock().push((entity, image));
    }

    /// Takes everything queued, or `None` if a producer holds the lock.
    pub fn try_drain(&self) -> Option<Vec<(Entity, ImageData)>> {
        self.0.try_lock().map(|mut queue| std::mem::take(&mut *queue))
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Holds the queue lock until the guard drops.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, Vec<(Entity, ImageData)>> {
        self.0.lock()
    }
}

/// Decodes any format the `image` crate understands into RGBA8.
pub fn decode(bytes: &[u8]) -> anyhow::Result<ImageData> {
    let image = image::load_from_memory(bytes)
        .context("failed to decode image")?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(ImageData::new(width, height, image.into_raw()))
}

pub fn decode_file(path: &Path) -> anyhow::Result<ImageData> {
    let image = image::open(path)
        .with_context(|| format!("failed to load image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(ImageData::new(width, height, image.into_raw()))
}

/// World resource spawning decode jobs on the rayon pool.
#[derive(Clone, Default)]
pub struct ImageLoader {
    pub queue: LoadedImages,
}

impl ImageLoader {
    pub fn new(queue: LoadedImages) -> Self {
        Self { queue }
    }

    pub fn load_file(&self, entity: Entity, path: impl Into<PathBuf>) {
        let path = path.into();
        let queue = self.queue.clone();
        rayon::spawn(move || match decode_file(&path) {
            Ok(image) => queue.push(entity, image),
            Err(err) => log::error!("{:#}", err),
        });
    }

    pub fn load_bytes(&self, entity: Entity, bytes: Vec<u8>) {
        let queue = self.queue.clone();
        rayon::spawn(move || match decode(&bytes) {
            Ok(image) => queue.push(entity, image),
            Err(err) => log::error!("image for {:?}: {:#}", entity, err),
        });
    }
}

/// Requests that the image at `path` be loaded onto this entity.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTexture {
    pub path: PathBuf,
}

impl LoadTexture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Pre-render step: moves decoded images onto their entities.
///
/// Skips the whole drain when a worker holds the lock; the images stay queued
/// for the next tick. Images for despawned entities are dropped.
pub fn drain_loaded_images(world: &mut World) {
    let Some(queue) = world.get_resource::<LoadedImages>().cloned() else {
        return;
    };
    let Some(loaded) = queue.try_drain() else {
        log::debug!("image queue busy, retrying next frame");
        return;
    };
    for (entity, image) in loaded {
        if world.is_alive(entity) {
            world.insert_component(entity, image);
        } else {
            log::debug!("dropping image for despawned {:?}", entity);
        }
    }
}

pub fn register(world: &mut World) {
    let queue = LoadedImages::new();
    world.insert_resource(queue.clone());
    world.insert_resource(ImageLoader::new(queue));

    world.on_set::<LoadTexture>(|world, entity| {
        let (Some(loader), Some(request)) = (
            world.get_resource::<ImageLoader>(),
            world.get_component::<LoadTexture>(entity),
        ) else {
            return;
        };
        log::info!("loading {} for {:?}", request.path.display(), entity);
        loader.load_file(entity, request.path.clone());
    });
}
