//! Resolved scene graph types.
//!
//! This is the immutable output of a load: every reference resolved, every
//! default applied, every transform composed. Bsdfs and volumes live in
//! arenas and are shared by handle; everything else is owned by its parent.

use std::collections::BTreeMap;

use kiln_math::{Mat4, Mat4Ext, Vec2, Vec3};
use serde::Serialize;

use crate::document::Version;
use crate::error::Location;

/// Index of a bsdf in `Scene::bsdfs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct BsdfHandle(pub usize);

/// Index of a volume in `Scene::volumes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct VolumeHandle(pub usize);

/// Light transport algorithm configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Integrator {
    pub id: Option<String>,
    pub kind: IntegratorKind,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegratorKind {
    /// Unidirectional path tracer
    Path {
        max_depth: i64,
        rr_depth: i64,
        hide_emitters: bool,
    },

    /// Path tracer with participating media
    VolPath {
        max_depth: i64,
        rr_depth: i64,
        hide_emitters: bool,
    },

    /// Direct illumination only
    Direct {
        emitter_samples: u32,
        bsdf_samples: u32,
        hide_emitters: bool,
    },
}

/// Which image axis the field of view spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FovAxis {
    X,
    Y,
    Diagonal,
    Smaller,
    Larger,
}

impl FovAxis {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "x" => FovAxis::X,
            "y" => FovAxis::Y,
            "diagonal" => FovAxis::Diagonal,
            "smaller" => FovAxis::Smaller,
            "larger" => FovAxis::Larger,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorKind {
    Perspective {
        /// Field of view in degrees
        fov: f32,
        fov_axis: FovAxis,
        principal_point_offset: Vec2,
    },
    Orthographic,
}

/// Pixel sample generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    Independent,
    Stratified,
    Multijitter,
    LdSampler,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sampler {
    pub kind: SamplerKind,
    pub sample_count: u32,
    pub seed: u32,
}

/// Image reconstruction filter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RFilter {
    Box,
    Tent,
    Gaussian { stddev: f32 },
}

impl Default for RFilter {
    fn default() -> Self {
        RFilter::Gaussian { stddev: 0.5 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Film {
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub component_format: String,
    pub rfilter: RFilter,
}

/// A camera with its exclusively owned sampler and film.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sensor {
    pub id: Option<String>,
    pub kind: SensorKind,
    pub near_clip: f32,
    pub far_clip: f32,
    pub to_world: Mat4,
    pub sampler: Sampler,
    pub film: Film,
}

impl Sensor {
    /// World-space camera position.
    pub fn origin(&self) -> Vec3 {
        self.to_world.origin()
    }

    /// World-space view direction.
    pub fn forward(&self) -> Vec3 {
        self.to_world.forward()
    }

    pub fn fov(&self) -> Option<f32> {
        match self.kind {
            SensorKind::Perspective { fov, .. } => Some(fov),
            SensorKind::Orthographic => None,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.film.width, self.film.height)
    }
}

/// Principled (Disney-style) material parameters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Principled {
    pub base_color: Vec3,
    pub metallic: f32,
    pub specular: f32,
    pub spec_tint: f32,
    pub roughness: f32,
    pub anisotropic: f32,
    pub sheen: f32,
    pub sheen_tint: f32,
    pub clearcoat: f32,
    pub clearcoat_gloss: f32,
    pub spec_trans: f32,
    pub eta: f32,
}

impl Default for Principled {
    fn default() -> Self {
        Self {
            base_color: Vec3::splat(0.5),
            metallic: 0.0,
            specular: 0.5,
            spec_tint: 0.0,
            roughness: 0.5,
            anisotropic: 0.0,
            sheen: 0.0,
            sheen_tint: 0.5,
            clearcoat: 0.0,
            clearcoat_gloss: 0.0,
            spec_trans: 0.0,
            eta: 1.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Bsdf {
    Diffuse {
        reflectance: Vec3,
    },
    /// Front/back wrapper; without a back bsdf the front is used on both sides
    TwoSided {
        front: BsdfHandle,
        back: Option<BsdfHandle>,
    },
    Principled(Principled),
    Dielectric {
        int_ior: f32,
        ext_ior: f32,
    },
    Conductor {
        material: String,
        eta: Option<Vec3>,
        k: Option<Vec3>,
    },
    Plastic {
        diffuse_reflectance: Vec3,
        int_ior: f32,
        ext_ior: f32,
    },
}

/// A bsdf in the scene arena. Inline bsdfs have no id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BsdfEntry {
    pub id: Option<String>,
    pub bsdf: Bsdf,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmitterKind {
    /// Uniform environment radiance
    Constant { radiance: Vec3 },
    Point { position: Vec3, intensity: Vec3 },
    Directional { direction: Vec3, irradiance: Vec3 },
    Envmap {
        filename: String,
        scale: f32,
        to_world: Mat4,
    },
    /// Only valid attached to a shape
    Area { radiance: Vec3 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Emitter {
    pub id: Option<String>,
    pub kind: EmitterKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshFormat {
    Ply,
    Obj,
}

/// Geometry of a shape. Mesh payloads are loaded by an external collaborator.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Mesh {
        format: MeshFormat,
        filename: String,
        face_normals: bool,
    },
    Sphere {
        center: Vec3,
        radius: f32,
    },
    Rectangle,
    Cube,
    Disk,
}

/// A shape with exactly one resolved bsdf.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Shape {
    pub id: Option<String>,
    pub geometry: Geometry,
    pub to_world: Mat4,
    pub flip_normals: bool,
    pub bsdf: BsdfHandle,
    pub emitter: Option<Emitter>,
    pub interior: Option<VolumeHandle>,
    pub exterior: Option<VolumeHandle>,
    pub location: Location,
}

impl Shape {
    /// Id of the shape's bsdf, if it was declared with one.
    pub fn bsdf_id<'s>(&self, scene: &'s Scene) -> Option<&'s str> {
        scene.bsdfs.get(self.bsdf.0).and_then(|e| e.id.as_deref())
    }

    pub fn mesh_path(&self) -> Option<&str> {
        match &self.geometry {
            Geometry::Mesh { filename, .. } => Some(filename),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Volume {
    Homogeneous {
        sigma_t: Vec3,
        albedo: Vec3,
        scale: f32,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VolumeEntry {
    pub id: Option<String>,
    pub volume: Volume,
}

/// A fully resolved, read-only scene.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Scene {
    /// Format version declared by the document
    pub version: Version,

    /// Final parameter values after overrides
    pub parameters: BTreeMap<String, String>,

    pub integrator: Option<Integrator>,
    pub sensors: Vec<Sensor>,

    /// Bsdf arena: named declarations and inline bsdfs alike
    pub bsdfs: Vec<BsdfEntry>,

    /// Free-standing emitters (area emitters live on their shapes)
    pub emitters: Vec<Emitter>,
    pub shapes: Vec<Shape>,

    /// Volume arena
    pub volumes: Vec<VolumeEntry>,
}

impl Scene {
    /// Look up a sensor by id.
    pub fn sensor(&self, id: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id.as_deref() == Some(id))
    }

    /// Look up a shape by id.
    pub fn shape(&self, id: &str) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.id.as_deref() == Some(id))
    }

    pub fn emitter(&self, id: &str) -> Option<&Emitter> {
        self.emitters.iter().find(|e| e.id.as_deref() == Some(id))
    }

    pub fn bsdf(&self, handle: BsdfHandle) -> Option<&Bsdf> {
        self.bsdfs.get(handle.0).map(|e| &e.bsdf)
    }

    pub fn volume(&self, handle: VolumeHandle) -> Option<&Volume> {
        self.volumes.get(handle.0).map(|e| &e.volume)
    }

    /// Bsdfs declared with an id, in declaration order.
    pub fn named_bsdfs(&self) -> impl Iterator<Item = (&str, &Bsdf)> {
        self.bsdfs
            .iter()
            .filter_map(|e| e.id.as_deref().map(|id| (id, &e.bsdf)))
    }

    pub fn bsdf_by_id(&self, id: &str) -> Option<BsdfHandle> {
        self.bsdfs
            .iter()
            .position(|e| e.id.as_deref() == Some(id))
            .map(BsdfHandle)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Shapes whose geometry comes from a mesh file.
    pub fn mesh_shapes(&self) -> impl Iterator<Item = (usize, &Shape)> {
        self.shapes
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.geometry, Geometry::Mesh { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        Scene {
            version: Version::new(2, 1, 0),
            parameters: BTreeMap::new(),
            integrator: None,
            sensors: Vec::new(),
            bsdfs: vec![
                BsdfEntry {
                    id: None,
                    bsdf: Bsdf::Diffuse {
                        reflectance: Vec3::splat(0.2),
                    },
                },
                BsdfEntry {
                    id: Some("mat-itu_metal".into()),
                    bsdf: Bsdf::TwoSided {
                        front: BsdfHandle(0),
                        back: None,
                    },
                },
            ],
            emitters: Vec::new(),
            shapes: vec![Shape {
                id: Some("mesh-car_1".into()),
                geometry: Geometry::Mesh {
                    format: MeshFormat::Ply,
                    filename: "meshes/car_1.ply".into(),
                    face_normals: true,
                },
                to_world: Mat4::IDENTITY,
                flip_normals: false,
                bsdf: BsdfHandle(1),
                emitter: None,
                interior: None,
                exterior: None,
                location: Location::new(40, 5),
            }],
            volumes: Vec::new(),
        }
    }

    #[test]
    fn test_named_bsdfs_skip_inline() {
        let scene = scene();
        let named: Vec<_> = scene.named_bsdfs().map(|(id, _)| id).collect();
        assert_eq!(named, vec!["mat-itu_metal"]);
        assert_eq!(scene.bsdf_by_id("mat-itu_metal"), Some(BsdfHandle(1)));
    }

    #[test]
    fn test_shape_bsdf_id() {
        let scene = scene();
        let shape = scene.shape("mesh-car_1").unwrap();
        assert_eq!(shape.bsdf_id(&scene), Some("mat-itu_metal"));
        assert_eq!(shape.mesh_path(), Some("meshes/car_1.ply"));
        assert_eq!(scene.mesh_shapes().count(), 1);
    }

    #[test]
    fn test_fov_axis_parse() {
        assert_eq!(FovAxis::parse("x"), Some(FovAxis::X));
        assert_eq!(FovAxis::parse("diagonal"), Some(FovAxis::Diagonal));
        assert_eq!(FovAxis::parse("z"), None);
    }
}
