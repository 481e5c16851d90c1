//! Headless frame loop driving the substrate end to end: assets are
//! requested asynchronously, entities form a small parent chain, and
//! each frame pumps the cache, propagates transforms and extracts a
//! draw list in place of a GPU renderer.

use std::path::Path;
use std::time::{Duration, Instant};

use cgmath::Vector3;

use grund::{
    active_camera, extract_draw_list, propagate_transforms, AssetCache, CacheSettings, Camera,
    EntityId, Material, Mesh, MeshRenderer, Parent, StaticMesh, Transform, World,
};

const FRAME_STEP: Duration = Duration::from_millis(33);
const MAX_FRAMES: u32 = 120;

fn write_fixtures(root: &Path) {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(
        root.join("tri.obj"),
        "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n",
    )
    .unwrap();
    std::fs::write(
        root.join("checker.toml"),
        "base_color = [0.8, 0.8, 0.8, 1.0]\ndiffuse = \"checker.png\"\n",
    )
    .unwrap();
    let pixels: [u8; 16] = [
        0, 0, 0, 255, 255, 255, 255, 255, //
        255, 255, 255, 255, 0, 0, 0, 255,
    ];
    image::save_buffer(root.join("checker.png"), &pixels, 2, 2, image::ColorType::Rgba8).unwrap();
}

fn main() {
    env_logger::init();
    profiling::register_thread!("main thread");

    let root = std::env::temp_dir().join(format!("grund-demo-{}", std::process::id()));
    write_fixtures(&root);

    let mut cache = AssetCache::new(CacheSettings {
        root: root.clone(),
        ..CacheSettings::default()
    });
    let mut world = World::new();

    let mesh = cache.load_async::<Mesh>("tri.obj");
    let material = cache.load_async::<Material>("checker.toml");

    let camera = world.create_entity();
    world
        .add_component(
            camera,
            Transform {
                position: Vector3::new(0.0, 0.0, 8.0),
                ..Transform::default()
            },
        )
        .unwrap();
    world.add_component(camera, Camera::default()).unwrap();

    // three drawables chained parent to child
    let mut parent: Option<EntityId> = None;
    for n in 0..3 {
        let e = world.create_entity();
        world
            .add_component(
                e,
                Transform {
                    position: Vector3::new(1.5, 0.2 * n as f32, 0.0),
                    ..Transform::default()
                },
            )
            .unwrap();
        world.add_component(e, StaticMesh { mesh }).unwrap();
        world.add_component(e, MeshRenderer { material }).unwrap();
        if let Some(p) = parent {
            world.add_component(e, Parent { entity: p }).unwrap();
        }
        parent = Some(e);
    }

    let mut drawn_frames = 0;
    for frame in 0..MAX_FRAMES {
        profiling::scope!("frame");
        let frame_start = Instant::now();

        for failure in cache.maintain() {
            log::warn!("giving up on {:?}: {}", failure.key, failure.error);
        }
        propagate_transforms(&mut world);
        let draw_list = extract_draw_list(&world, &cache);
        let view_projection = active_camera(&world).map(|(_, matrix)| matrix);

        log::info!(
            "frame {}: {} draw commands, {} pending, camera {}",
            frame,
            draw_list.commands.len(),
            draw_list.not_ready,
            if view_projection.is_some() { "ready" } else { "missing" }
        );
        if !draw_list.commands.is_empty() && draw_list.not_ready == 0 {
            drawn_frames += 1;
            if drawn_frames >= 10 {
                break;
            }
        }

        profiling::finish_frame!();
        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_STEP {
            spin_sleep::sleep(FRAME_STEP - elapsed);
        }
    }

    if drawn_frames == 0 {
        log::error!("assets never became drawable");
    }

    // the render output (the draw list) dies before the world, the
    // world before the cache
    drop(world);
    drop(cache);
    let _ = std::fs::remove_dir_all(&root);
}
