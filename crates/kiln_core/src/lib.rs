//! Kiln Core - Scene description loading for physically based renderers.
//!
//! This crate provides:
//!
//! - **Scene loading**: XML scene documents with `<default>` parameters,
//!   launch-time overrides, `$name` substitution and `<ref>` sharing
//! - **Scene types**: `Scene`, `Sensor`, `Shape`, `Bsdf` and friends, fully
//!   resolved and validated
//! - **Mesh collaborator**: `MeshLoader` for reading `ply`/`obj` payloads
//!
//! # Example
//!
//! ```ignore
//! use kiln_core::{load_scene, LoadOptions};
//!
//! let options = LoadOptions::new().with_override("spp", "256");
//! let scene = load_scene("street_canyon.xml", &options)?;
//! println!("Loaded {} sensors, {} shapes",
//!     scene.sensor_count(),
//!     scene.shape_count());
//! ```

pub mod builder;
pub mod document;
pub mod error;
pub mod loader;
pub mod mesh;
pub mod params;
pub mod plugins;
pub mod registry;
pub mod scene;
pub mod value;
pub mod xml;

// Re-export commonly used types
pub use document::{NodeKind, Version};
pub use error::{LoadError, LoadErrors, LoadResult, Location};
pub use loader::{load_scene, load_scene_from_str, LoadOptions, LoadStage, SceneLoader};
pub use mesh::{load_meshes, Mesh, MeshLoader, ObjMeshLoader};
pub use scene::{
    Bsdf, BsdfHandle, Emitter, EmitterKind, Film, Geometry, Integrator, Sampler, Scene, Sensor,
    Shape, Volume, VolumeHandle,
};
