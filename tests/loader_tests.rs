use std::io::Cursor;
use std::time::{Duration, Instant};

use plutonium_render::loader::{self, decode, ImageLoader, LoadTexture, LoadedImages};
use plutonium_render::texture_array::ImageData;
use plutonium_render::world::World;

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn world() -> World {
    let mut world = World::new();
    loader::register(&mut world);
    world
}

fn queue(world: &World) -> LoadedImages {
    world.get_resource::<LoadedImages>().cloned().unwrap()
}

fn wait_for(queue: &LoadedImages, count: usize) {
    let start = Instant::now();
    while queue.len() < count && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn decode_produces_rgba8() {
    let image = decode(&png(3, 2)).unwrap();
    assert_eq!((image.width, image.height), (3, 2));
    assert_eq!(image.pixels.len(), 3 * 2 * 4);
    assert_eq!(&image.pixels[..4], &[10, 20, 30, 255]);
}

#[test]
fn decode_rejects_garbage() {
    assert!(decode(b"not an image").is_err());
}

#[test]
fn drained_images_land_on_their_entities() {
    let mut world = world();
    let entity = world.spawn();
    queue(&world).push(entity, ImageData::new(1, 1, vec![1, 2, 3, 4]));

    loader::drain_loaded_images(&mut world);

    assert_eq!(
        world.get_component::<ImageData>(entity),
        Some(&ImageData::new(1, 1, vec![1, 2, 3, 4]))
    );
    assert!(queue(&world).is_empty());
}

#[test]
fn contended_queue_is_left_for_next_tick() {
    let mut world = world();
    let entity = world.spawn();
    let images = queue(&world);
    images.push(entity, ImageData::new(1, 1, vec![0; 4]));

    let guard = images.lock();
    loader::drain_loaded_images(&mut world);
    assert!(!world.has_component::<ImageData>(entity));
    drop(guard);

    loader::drain_loaded_images(&mut world);
    assert!(world.has_component::<ImageData>(entity));
}

#[test]
fn images_for_despawned_entities_are_dropped() {
    let mut world = world();
    let entity = world.spawn();
    queue(&world).push(entity, ImageData::new(1, 1, vec![0; 4]));
    world.despawn(entity);

    loader::drain_loaded_images(&mut world);

    assert!(!world.has_component::<ImageData>(entity));
    assert!(queue(&world).is_empty());
}

#[test]
fn load_bytes_decodes_on_a_worker() {
    let world = world();
    let entity = World::new().spawn();
    let loader = world.get_resource::<ImageLoader>().cloned().unwrap();

    loader.load_bytes(entity, png(4, 4));
    wait_for(&loader.queue, 1);

    let loaded = loader.queue.try_drain().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].0, entity);
    assert_eq!(loaded[0].1.width, 4);
}

#[test]
fn load_texture_component_starts_a_load() {
    let path = std::env::temp_dir().join(format!("plutonium-load-{}.png", std::process::id()));
    std::fs::write(&path, png(2, 2)).unwrap();

    let mut world = world();
    let entity = world.spawn();
    world.insert_component(entity, LoadTexture::new(&path));
    let images = queue(&world);
    wait_for(&images, 1);
    std::fs::remove_file(&path).ok();

    loader::drain_loaded_images(&mut world);
    let image = world.get_component::<ImageData>(entity).unwrap();
    assert_eq!((image.width, image.height), (2, 2));
}
