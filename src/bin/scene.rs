//! Demo scene: a grid of rounded quads, a few bouncing circles and textured cards.
//!
//! Image paths given on the command line are loaded onto extra cards. Clicking
//! spawns a circle under the cursor.

use plutonium_render::app::run_app;
use plutonium_render::config::RenderConfig;
use plutonium_render::loader::LoadTexture;
use plutonium_render::texture_array::{ImageData, RenderTexture};
use plutonium_render::utils::{Circle, Color, Position, Quad};
use plutonium_render::window::{MousePress, WindowSize};
use plutonium_render::world::{Entity, Time, World};
use plutonium_render::PlutoniumRenderer;

const CARD_WIDTH: f32 = 745.0 / 6.0;
const CARD_HEIGHT: f32 = 1040.0 / 6.0;

#[derive(Debug, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> ImageData {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let even = ((x / cell) + (y / cell)) % 2 == 0;
            pixels.extend_from_slice(if even { &a } else { &b });
        }
    }
    ImageData::new(size, size, pixels)
}

fn spawn_card(world: &mut World, texture: Entity, x: f32, y: f32) {
    let card = world.spawn();
    world.insert_component(
        card,
        Quad {
            width: CARD_WIDTH,
            height: CARD_HEIGHT,
            corner_radius: 8.0,
        },
    );
    world.insert_component(card, Position::new(x, y));
    world.set_relation(card, texture, RenderTexture);
}

fn setup(renderer: &mut PlutoniumRenderer, paths: &[String]) {
    let world = &mut renderer.world;

    for row in 0..3 {
        for col in 0..6 {
            let quad = world.spawn();
            world.insert_component(
                quad,
                Quad {
                    width: 60.0,
                    height: 40.0,
                    corner_radius: 6.0,
                },
            );
            world.insert_component(
                quad,
                Position::new(60.0 + col as f32 * 80.0, 60.0 + row as f32 * 60.0),
            );
            world.insert_component(
                quad,
                Color::rgba(0.2 + 0.1 * col as f32, 0.3, 0.8 - 0.2 * row as f32, 1.0),
            );
        }
    }

    for i in 0..4 {
        let circle = world.spawn();
        world.insert_component(circle, Circle { radius: 12.0 + 4.0 * i as f32 });
        world.insert_component(circle, Position::new(100.0 + 90.0 * i as f32, 300.0));
        world.insert_component(circle, Color::rgba(0.9, 0.5, 0.2, 1.0));
        world.insert_component(
            circle,
            Velocity {
                x: 80.0 + 30.0 * i as f32,
                y: 120.0 - 20.0 * i as f32,
            },
        );
    }

    let boards = [
        checkerboard(64, 8, [255, 255, 255, 255], [40, 40, 40, 255]),
        checkerboard(64, 16, [200, 60, 60, 255], [60, 60, 200, 255]),
        checkerboard(128, 32, [60, 200, 60, 255], [20, 20, 20, 255]),
    ];
    for (i, board) in boards.into_iter().enumerate() {
        let texture = world.spawn();
        world.insert_component(texture, board);
        spawn_card(world, texture, 80.0 + 140.0 * i as f32, 420.0);
    }

    for (i, path) in paths.iter().enumerate() {
        let texture = world.spawn();
        world.insert_component(texture, LoadTexture::new(path));
        spawn_card(world, texture, 80.0 + 140.0 * i as f32, 620.0);
    }

    renderer.add_system(bounce);
    renderer.add_system(spawn_on_click);
}

fn bounce(world: &mut World) {
    let delta = world.get_resource::<Time>().map_or(0.0, |time| time.delta_seconds);
    let Some(size) = world.get_resource::<WindowSize>().copied() else {
        return;
    };

    for entity in world.entities_with::<Velocity>() {
        let (Some(velocity), Some(position), Some(circle)) = (
            world.get_component::<Velocity>(entity).copied(),
            world.get_component::<Position>(entity).copied(),
            world.get_component::<Circle>(entity).copied(),
        ) else {
            continue;
        };
        let mut velocity = velocity;
        let mut next = position + Position::new(velocity.x, velocity.y) * delta;
        if next.x < circle.radius || next.x > size.width as f32 - circle.radius {
            velocity.x = -velocity.x;
            next.x = next.x.min(size.width as f32 - circle.radius).max(circle.radius);
        }
        if next.y < circle.radius || next.y > size.height as f32 - circle.radius {
            velocity.y = -velocity.y;
            next.y = next.y.min(size.height as f32 - circle.radius).max(circle.radius);
        }
        world.insert_component(entity, velocity);
        world.insert_component(entity, next);
    }
}

fn spawn_on_click(world: &mut World) {
    for press in world.drain_events::<MousePress>() {
        let circle = world.spawn();
        world.insert_component(circle, Circle { radius: 10.0 });
        world.insert_component(circle, Position::new(press.x, press.y));
        world.insert_component(circle, Color::rgba(0.9, 0.9, 0.2, 1.0));
        world.insert_component(circle, Velocity { x: 60.0, y: -90.0 });
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = RenderConfig::load("plutonium.json")?;
    let paths: Vec<String> = std::env::args().skip(1).collect();
    run_app(config, move |renderer| setup(renderer, &paths))
}
