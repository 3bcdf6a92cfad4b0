//! Mesh file I/O.
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | Wavefront OBJ | `.obj` | ✓ | ✓ | Polygons, texture coordinates from `"v:tex"` |
//! | PLY | `.ply` | ✓ | ✓ | ASCII and binary input, ASCII output |
//! | STL | `.stl` | ✓ | ✓ | Binary and ASCII input, binary output |
//!
//! Loading goes through [`build_from_polygons_lenient`]: faces that would
//! break manifoldness are skipped with a warning instead of failing the
//! whole file. A file whose faces are all rejected is a load error.
//!
//! ```no_run
//! use tessera::io::{load, save};
//! use tessera::mesh::HalfEdgeMesh;
//!
//! let mesh: HalfEdgeMesh = load("model.obj").unwrap();
//! save(&mesh, "model.ply").unwrap();
//! ```

pub mod obj;
pub mod ply;
pub mod stl;

use std::fmt;
use std::path::Path;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons_lenient, HalfEdgeMesh, MeshIndex};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Wavefront OBJ.
    Obj,
    /// Stanford polygon format.
    Ply,
    /// Stereolithography.
    Stl,
}

impl Format {
    /// Format for a file extension, case-insensitive.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_ascii_lowercase().as_str() {
            "obj" => Some(Format::Obj),
            "ply" => Some(Format::Ply),
            "stl" => Some(Format::Stl),
            _ => None,
        }
    }

    /// Format for a path, from its extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Format> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Format::from_extension(extension).ok_or_else(|| MeshError::UnsupportedFormat {
            extension: if extension.is_empty() {
                "(none)".to_string()
            } else {
                extension.to_string()
            },
        })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Obj => "OBJ",
            Format::Ply => "PLY",
            Format::Stl => "STL",
        })
    }
}

/// Load a mesh, picking the format from the file extension.
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let mesh = match Format::from_path(path)? {
        Format::Obj => obj::load(path)?,
        Format::Ply => ply::load(path)?,
        Format::Stl => stl::load(path)?,
    };
    log::info!(
        "loaded {}: {} vertices, {} edges, {} faces",
        path.display(),
        mesh.num_vertices(),
        mesh.num_edges(),
        mesh.num_faces()
    );
    Ok(mesh)
}

/// Save a mesh, picking the format from the file extension.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let path = path.as_ref();
    match Format::from_path(path)? {
        Format::Obj => obj::save(mesh, path)?,
        Format::Ply => ply::save(mesh, path)?,
        Format::Stl => stl::save(mesh, path)?,
    }
    log::info!("saved {} faces to {}", mesh.num_faces(), path.display());
    Ok(())
}

pub(crate) fn load_error(path: &Path, message: impl Into<String>) -> MeshError {
    MeshError::LoadError {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

pub(crate) fn save_error(path: &Path, message: impl Into<String>) -> MeshError {
    MeshError::SaveError {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Build a mesh from parsed file content, skipping faces that cannot be
/// inserted.
pub(crate) fn assemble<I: MeshIndex>(
    path: &Path,
    vertices: &[Point3<f64>],
    faces: &[Vec<usize>],
) -> Result<HalfEdgeMesh<I>> {
    if faces.is_empty() {
        return Err(load_error(path, "file contains no faces"));
    }
    if let Some(vertex) = faces.iter().flatten().find(|&&v| v >= vertices.len()) {
        return Err(load_error(
            path,
            format!("face references vertex {} but only {} vertices exist", vertex, vertices.len()),
        ));
    }
    let (mesh, skipped) = build_from_polygons_lenient(vertices, faces)?;
    if skipped == faces.len() {
        return Err(load_error(path, "no face could be inserted"));
    }
    if skipped > 0 {
        log::warn!("{}: skipped {} of {} faces", path.display(), skipped, faces.len());
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tessera-io-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::from_extension("OBJ"), Some(Format::Obj));
        assert_eq!(Format::from_path("a/b/mesh.ply").unwrap(), Format::Ply);
        assert_eq!(Format::from_path("mesh.Stl").unwrap(), Format::Stl);
        assert!(matches!(
            Format::from_path("mesh.gltf"),
            Err(MeshError::UnsupportedFormat { extension }) if extension == "gltf"
        ));
        assert!(matches!(
            Format::from_path("mesh"),
            Err(MeshError::UnsupportedFormat { extension }) if extension == "(none)"
        ));
    }

    #[test]
    fn test_save_and_load_each_format() {
        let cube = fixtures::cube();
        for ext in ["obj", "ply", "stl"] {
            let path = scratch(&format!("cube.{}", ext));
            save(&cube, &path).unwrap();
            let loaded: HalfEdgeMesh = load(&path).unwrap();
            std::fs::remove_file(&path).unwrap();

            assert_eq!(loaded.num_vertices(), 8, "{}", ext);
            assert!(loaded.is_closed(), "{}", ext);
            let expected_faces = if ext == "stl" { 12 } else { 6 };
            assert_eq!(loaded.num_faces(), expected_faces, "{}", ext);
            assert!((loaded.surface_area() - 6.0).abs() < 1e-5, "{}", ext);
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load::<_, u32>(scratch("missing.obj")).unwrap_err();
        assert!(matches!(err, MeshError::Io(_)));
    }

    #[test]
    fn test_assemble_skips_bad_faces() {
        let vertices = fixtures::grid(1).positions();
        let faces = vec![vec![0, 1, 3], vec![0, 3, 2], vec![0, 1, 3]];
        let mesh: HalfEdgeMesh = assemble(Path::new("t.obj"), &vertices, &faces).unwrap();
        assert_eq!(mesh.num_faces(), 2);

        let err = assemble::<u32>(Path::new("t.obj"), &vertices, &[vec![0, 1, 9]]).unwrap_err();
        assert!(matches!(err, MeshError::LoadError { .. }));
        let err = assemble::<u32>(Path::new("t.obj"), &vertices, &[]).unwrap_err();
        assert!(matches!(err, MeshError::LoadError { .. }));
    }
}
