//! Model loading: the loader trait plus the OBJ implementation.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::scene::geometry::Geometry;
use crate::scene::material::Material;
use crate::scene::node::Node;

/// Why a model failed to load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model: {0}")]
    Parse(String),
    #[error("model contains no meshes")]
    Empty,
}

/// Produces a model hierarchy, typically on a worker thread.
///
/// Implementations run off the frame loop, so they may block on IO.
pub trait ModelLoader: Send + 'static {
    fn load(&mut self) -> Result<Node, LoadError>;
}

/// Closures work as one-shot loaders, which keeps tests and embedders
/// free of wrapper types.
impl<F> ModelLoader for F
where
    F: FnMut() -> Result<Node, LoadError> + Send + 'static,
{
    fn load(&mut self) -> Result<Node, LoadError> {
        self()
    }
}

/// Loads a Wavefront OBJ (with optional MTL) into a group of drawables,
/// one child per mesh.
pub struct ObjModelLoader {
    path: PathBuf,
}

impl ObjModelLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ModelLoader for ObjModelLoader {
    fn load(&mut self) -> Result<Node, LoadError> {
        let (models, materials) = tobj::load_obj(&self.path, &tobj::GPU_LOAD_OPTIONS)
            .map_err(|e| LoadError::Parse(e.to_string()))?;
        if models.is_empty() {
            return Err(LoadError::Empty);
        }
        // Missing MTL files are common; fall back to defaults.
        let materials = materials.unwrap_or_default();

        let name = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let mut root = Node::group(name);

        for model in models {
            let mesh = model.mesh;
            let geometry = Geometry::from_raw(&mesh.positions, &mesh.normals, mesh.indices);

            let material = mesh
                .material_id
                .and_then(|id| materials.get(id))
                .map(|m| {
                    let diffuse = m.diffuse.unwrap_or([0.8, 0.8, 0.8]);
                    Material::new([diffuse[0], diffuse[1], diffuse[2], 1.0])
                })
                .unwrap_or_default();

            root.add_child(Node::drawable(model.name, geometry, material));
        }
        log::info!(
            "loaded {} ({} meshes)",
            self.path.display(),
            root.children.len()
        );
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_parse_error() {
        let mut loader = ObjModelLoader::new("definitely/not/here.obj");
        assert!(loader.load().is_err());
    }

    #[test]
    fn closures_are_loaders() {
        let mut loader = || -> Result<Node, LoadError> { Ok(Node::group("synthetic")) };
        let node = ModelLoader::load(&mut loader).unwrap();
        assert_eq!(node.name, "synthetic");
    }
}
