//! Mesh payloads for `ply`/`obj` shapes.
//!
//! The scene loader only records mesh file names. Geometry is read
//! afterwards through a [`MeshLoader`], so callers can plug in their own
//! readers (or skip meshes entirely when they only need the scene layout).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_math::Vec3;
use thiserror::Error;

use crate::error::{LoadError, LoadErrors, LoadResult};
use crate::scene::{Geometry, MeshFormat, Scene};

/// Triangle mesh geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Per-vertex normals; `None` for flat-shaded meshes
    pub normals: Option<Vec<Vec3>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        Self {
            positions,
            normals,
            indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds as (min, max), or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))),
        )
    }

    /// Check that every index refers to a vertex and triangles are complete.
    pub fn validate(&self) -> Result<(), MeshLoadError> {
        if self.indices.len() % 3 != 0 {
            return Err(MeshLoadError::Invalid(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        if let Some(bad) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.positions.len())
        {
            return Err(MeshLoadError::Invalid(format!(
                "index {} out of range for {} vertices",
                bad,
                self.positions.len()
            )));
        }
        if let Some(normals) = &self.normals {
            if normals.len() != self.positions.len() {
                return Err(MeshLoadError::Invalid(format!(
                    "{} normals for {} vertices",
                    normals.len(),
                    self.positions.len()
                )));
            }
        }
        Ok(())
    }

    /// Compute smooth vertex normals by averaging adjacent face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for face in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [face[0] as usize, face[1] as usize, face[2] as usize];
            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }
            let p0 = self.positions[i0];
            let face_normal = (self.positions[i1] - p0).cross(self.positions[i2] - p0);
            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            // Degenerate vertices get an arbitrary up normal
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }
        self.normals = Some(normals);
    }
}

/// Errors from reading a single mesh file.
#[derive(Error, Debug)]
pub enum MeshLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OBJ error: {0}")]
    Obj(#[from] tobj::LoadError),

    #[error("{0} meshes are not supported by this loader")]
    Unsupported(String),

    #[error("invalid mesh: {0}")]
    Invalid(String),
}

/// Reads mesh files referenced by shapes.
pub trait MeshLoader {
    /// Load the mesh at `path`. With `face_normals` set, the result carries
    /// no vertex normals.
    fn load_mesh(
        &self,
        path: &Path,
        format: MeshFormat,
        face_normals: bool,
    ) -> Result<Mesh, MeshLoadError>;
}

/// Wavefront OBJ reader backed by `tobj`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjMeshLoader;

impl MeshLoader for ObjMeshLoader {
    fn load_mesh(
        &self,
        path: &Path,
        format: MeshFormat,
        face_normals: bool,
    ) -> Result<Mesh, MeshLoadError> {
        if format != MeshFormat::Obj {
            return Err(MeshLoadError::Unsupported(format!("{:?}", format).to_lowercase()));
        }

        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ..Default::default()
            },
        )?;
        if models.is_empty() {
            return Err(MeshLoadError::Invalid("no models found in OBJ file".to_string()));
        }

        // Merge every model into one mesh
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut indices = Vec::new();
        let mut all_have_normals = true;
        for model in &models {
            let mesh = &model.mesh;
            let base = positions.len() as u32;
            positions.extend(mesh.positions.chunks_exact(3).map(Vec3::from_slice));
            if mesh.normals.len() == mesh.positions.len() {
                normals.extend(mesh.normals.chunks_exact(3).map(Vec3::from_slice));
            } else {
                all_have_normals = false;
            }
            indices.extend(mesh.indices.iter().map(|i| i + base));
        }
        log::debug!(
            "Loaded {} models from {} ({} vertices, {} triangles)",
            models.len(),
            path.display(),
            positions.len(),
            indices.len() / 3
        );

        let mut mesh = Mesh::new(positions, indices, None);
        if !face_normals {
            if all_have_normals {
                mesh.normals = Some(normals);
            } else {
                mesh.compute_normals();
            }
        }
        mesh.validate()?;
        Ok(mesh)
    }
}

/// Meshes keyed by shape index in `Scene::shapes`.
pub type MeshTable = BTreeMap<usize, Arc<Mesh>>;

/// Load the mesh of every mesh-backed shape, resolving relative file names
/// against `base_dir`. Shapes that name the same file share one mesh.
pub fn load_meshes(
    scene: &Scene,
    base_dir: &Path,
    loader: &dyn MeshLoader,
) -> LoadResult<MeshTable> {
    let mut cache: HashMap<(PathBuf, bool), Arc<Mesh>> = HashMap::new();
    let mut table = MeshTable::new();
    let mut errors = Vec::new();

    for (index, shape) in scene.mesh_shapes() {
        let Geometry::Mesh {
            format,
            filename,
            face_normals,
        } = &shape.geometry
        else {
            continue;
        };
        let path = base_dir.join(filename);
        let key = (path.clone(), *face_normals);
        if let Some(mesh) = cache.get(&key) {
            table.insert(index, Arc::clone(mesh));
            continue;
        }
        match loader.load_mesh(&path, *format, *face_normals) {
            Ok(mesh) => {
                let mesh = Arc::new(mesh);
                cache.insert(key, Arc::clone(&mesh));
                table.insert(index, mesh);
            }
            Err(e) => errors.push(LoadError::MeshLoad {
                path: path.display().to_string(),
                location: shape.location,
                message: e.to_string(),
            }),
        }
    }

    match LoadErrors::new(errors) {
        Some(errors) => Err(errors),
        None => {
            log::info!(
                "Loaded {} unique meshes for {} shapes",
                cache.len(),
                table.len()
            );
            Ok(table)
        }
    }
}
