use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use kiln_core::{load_meshes, load_scene, LoadOptions, ObjMeshLoader, Scene};

#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Load and inspect a scene description")]
struct Cli {
    /// Input scene XML.
    scene: PathBuf,

    /// Override a <default> parameter (repeatable).
    #[arg(short = 'D', value_name = "NAME=VALUE", value_parser = parse_define)]
    define: Vec<(String, String)>,

    /// Treat properties a plugin does not use as errors.
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Print the resolved scene as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Also read the mesh files referenced by shapes.
    #[arg(long, default_value_t = false)]
    load_meshes: bool,
}

fn parse_define(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if name.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let options = LoadOptions::new()
        .with_overrides(cli.define)
        .strict(cli.strict);
    log::debug!("Load options: {:?}", options);
    let scene = load_scene(&cli.scene, &options)
        .with_context(|| format!("load scene '{}'", cli.scene.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&scene)?);
    } else {
        print_summary(&scene);
    }

    if cli.load_meshes {
        let base_dir = cli.scene.parent().unwrap_or_else(|| Path::new("."));
        let meshes = load_meshes(&scene, base_dir, &ObjMeshLoader)?;
        let triangles: usize = meshes.values().map(|m| m.triangle_count()).sum();
        eprintln!("loaded {} meshes, {} triangles", meshes.len(), triangles);
    }
    Ok(())
}

fn print_summary(scene: &Scene) {
    println!("=== Scene (version {}) ===", scene.version);
    if !scene.parameters.is_empty() {
        println!("\n--- Parameters ---");
        for (name, value) in &scene.parameters {
            println!("  {} = {}", name, value);
        }
    }

    if let Some(integrator) = &scene.integrator {
        println!("\nIntegrator: {:?}", integrator.kind);
    }

    println!("\n--- Sensors ({}) ---", scene.sensor_count());
    for sensor in &scene.sensors {
        let origin = sensor.origin();
        let (width, height) = sensor.resolution();
        println!(
            "  {} at ({:.2}, {:.2}, {:.2}) - {}x{}, {} spp",
            sensor.id.as_deref().unwrap_or("<anonymous>"),
            origin.x,
            origin.y,
            origin.z,
            width,
            height,
            sensor.sampler.sample_count
        );
    }

    println!("\n--- Materials ---");
    for (id, bsdf) in scene.named_bsdfs() {
        println!("  {}: {:?}", id, bsdf);
    }

    println!("\n--- Shapes ({}) ---", scene.shape_count());
    for shape in &scene.shapes {
        println!(
            "  {} -> {}{}",
            shape.id.as_deref().unwrap_or("<anonymous>"),
            shape.bsdf_id(scene).unwrap_or("<inline bsdf>"),
            shape
                .mesh_path()
                .map(|p| format!(" [{}]", p))
                .unwrap_or_default()
        );
    }

    if !scene.emitters.is_empty() {
        println!("\n--- Emitters ---");
        for emitter in &scene.emitters {
            println!(
                "  {}: {:?}",
                emitter.id.as_deref().unwrap_or("<anonymous>"),
                emitter.kind
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define() {
        assert_eq!(
            parse_define("spp=256"),
            Ok(("spp".to_string(), "256".to_string()))
        );
        // Only the first '=' splits
        assert_eq!(
            parse_define("expr=a=b"),
            Ok(("expr".to_string(), "a=b".to_string()))
        );
        assert!(parse_define("spp").is_err());
        assert!(parse_define("=1").is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from(["kiln", "scene.xml", "-D", "spp=8", "-Dresx=64", "--strict"]);
        assert_eq!(cli.scene, PathBuf::from("scene.xml"));
        assert_eq!(
            cli.define,
            vec![
                ("spp".to_string(), "8".to_string()),
                ("resx".to_string(), "64".to_string())
            ]
        );
        assert!(cli.strict);
        assert!(!cli.json);
    }
}
