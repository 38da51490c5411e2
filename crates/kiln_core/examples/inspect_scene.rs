//! Example: Load and inspect a scene description.
//!
//! Run with: cargo run --example inspect_scene -- crates/kiln_core/tests/data/street_canyon.xml spp=256

use std::env;

use kiln_core::{load_scene, LoadOptions};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: inspect_scene <path-to-scene-xml> [name=value ...]");
        println!("\nExamples:");
        println!("  cargo run --example inspect_scene -- tests/data/street_canyon.xml");
        println!("  cargo run --example inspect_scene -- tests/data/street_canyon.xml spp=16");
        return;
    }

    let path = &args[1];
    let overrides = args[2..].iter().filter_map(|arg| arg.split_once('='));
    let options = LoadOptions::new().with_overrides(overrides);
    println!("Loading scene: {}", path);

    match load_scene(path, &options) {
        Ok(scene) => {
            println!("\n=== Scene (version {}) ===", scene.version);
            println!("Sensors: {}", scene.sensor_count());
            println!("Shapes: {}", scene.shape_count());
            println!("Bsdfs: {} ({} named)", scene.bsdfs.len(), scene.named_bsdfs().count());

            println!("\n--- Sensors ---");
            for sensor in &scene.sensors {
                let pos = sensor.origin();
                let dir = sensor.forward();
                println!(
                    "  {} at ({:.2}, {:.2}, {:.2}) looking ({:.2}, {:.2}, {:.2})",
                    sensor.id.as_deref().unwrap_or("<anonymous>"),
                    pos.x,
                    pos.y,
                    pos.z,
                    dir.x,
                    dir.y,
                    dir.z
                );
            }

            println!("\n--- Mesh shapes ---");
            for (i, shape) in scene.mesh_shapes() {
                println!(
                    "  [{}] {} -> {}",
                    i,
                    shape.mesh_path().unwrap_or_default(),
                    shape.bsdf_id(&scene).unwrap_or("<inline>")
                );
            }
        }
        Err(errors) => {
            eprintln!("Error loading scene: {}", errors);
        }
    }
}
