use std::fmt;
use std::io::Cursor;

use boneguide_geometry::{Aabb, Vec3};
use thiserror::Error;
use tracing::{debug, info};

// ────────────────────────────────────────────────────────────────────────────
// Size envelope
// ────────────────────────────────────────────────────────────────────────────

/// Inclusive bounds, in meters, that every side of a model must fall within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeEnvelope {
    pub min_side: f32,
    pub max_side: f32,
}

impl Default for SizeEnvelope {
    fn default() -> Self {
        Self {
            min_side: 0.01,
            max_side: 0.60,
        }
    }
}

impl SizeEnvelope {
    fn admits(&self, side: f32) -> bool {
        side >= self.min_side && side <= self.max_side
    }
}

/// Bounding-box axis named in a size violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Width,
    Height,
    Depth,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dimension::Width => "width",
            Dimension::Height => "height",
            Dimension::Depth => "depth",
        })
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("model could not be decoded: {0}")]
    Decode(String),

    #[error("model contains no geometry")]
    EmptyModel,

    #[error("model {dimension} of {value:.3} m is outside the allowed range")]
    ModelSizeOutOfRange { dimension: Dimension, value: f32 },
}

// ────────────────────────────────────────────────────────────────────────────
// OverlayModel
// ────────────────────────────────────────────────────────────────────────────

/// A validated triangle mesh ready to be attached to the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayModel {
    pub vertices: Vec<Vec3>,
    /// Vertex indices, three per triangle.
    pub triangles: Vec<[usize; 3]>,
    pub bounding_box: Aabb,
}

impl OverlayModel {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Width, height and depth of the bounding box.
    pub fn size(&self) -> Vec3 {
        self.bounding_box.size()
    }
}

/// Decodes an STL mesh (binary or ASCII) and checks its bounding box against
/// `envelope`.
pub fn load_and_validate(
    bytes: &[u8],
    envelope: &SizeEnvelope,
) -> Result<OverlayModel, ValidationError> {
    let mesh = stl_io::read_stl(&mut Cursor::new(bytes))
        .map_err(|e| ValidationError::Decode(e.to_string()))?;

    let vertices: Vec<Vec3> = mesh
        .vertices
        .iter()
        .map(|v| Vec3::new(v[0], v[1], v[2]))
        .collect();
    let triangles: Vec<[usize; 3]> = mesh.faces.iter().map(|f| f.vertices).collect();
    if triangles.is_empty() {
        return Err(ValidationError::EmptyModel);
    }
    let bounding_box =
        Aabb::from_points(vertices.iter().copied()).ok_or(ValidationError::EmptyModel)?;

    let size = bounding_box.size();
    info!(
        width = size.x,
        height = size.y,
        depth = size.z,
        "CAD native dimensions"
    );
    for (dimension, value) in [
        (Dimension::Width, size.x),
        (Dimension::Height, size.y),
        (Dimension::Depth, size.z),
    ] {
        if !envelope.admits(value) {
            return Err(ValidationError::ModelSizeOutOfRange { dimension, value });
        }
    }

    debug!(
        vertices = vertices.len(),
        triangles = triangles.len(),
        "overlay model accepted"
    );
    Ok(OverlayModel {
        vertices,
        triangles,
        bounding_box,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stl_io::{Normal, Triangle, Vertex};

    /// Binary STL of an axis-aligned box with the given side lengths.
    fn box_stl(w: f32, h: f32, d: f32) -> Vec<u8> {
        let c = |x: f32, y: f32, z: f32| Vertex::new([x, y, z]);
        let tri = |a, b, c| Triangle {
            normal: Normal::new([0.0, 0.0, 0.0]),
            vertices: [a, b, c],
        };
        let tris = vec![
            tri(c(0.0, 0.0, 0.0), c(w, 0.0, 0.0), c(w, h, 0.0)),
            tri(c(0.0, 0.0, 0.0), c(w, h, 0.0), c(0.0, h, 0.0)),
            tri(c(0.0, 0.0, d), c(w, h, d), c(w, 0.0, d)),
            tri(c(0.0, 0.0, d), c(0.0, h, d), c(w, h, d)),
        ];
        let mut out = Vec::new();
        stl_io::write_stl(&mut out, tris.iter()).unwrap();
        out
    }

    #[test]
    fn bone_sized_model_is_accepted() {
        let model = load_and_validate(&box_stl(0.05, 0.2, 0.04), &SizeEnvelope::default()).unwrap();
        assert_eq!(model.triangle_count(), 4);
        let s = model.size();
        assert!((s.x - 0.05).abs() < 1e-6);
        assert!((s.y - 0.2).abs() < 1e-6);
        assert!((s.z - 0.04).abs() < 1e-6);
    }

    #[test]
    fn bounds_are_inclusive() {
        let env = SizeEnvelope {
            min_side: 0.5,
            max_side: 1.0,
        };
        assert!(load_and_validate(&box_stl(0.5, 1.0, 0.75), &env).is_ok());
    }

    #[test]
    fn oversize_model_names_the_dimension() {
        let err = load_and_validate(&box_stl(0.1, 0.9, 0.1), &SizeEnvelope::default()).unwrap_err();
        match err {
            ValidationError::ModelSizeOutOfRange { dimension, value } => {
                assert_eq!(dimension, Dimension::Height);
                assert!((value - 0.9).abs() < 1e-6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn flat_model_is_too_small() {
        let err = load_and_validate(&box_stl(0.1, 0.1, 0.0), &SizeEnvelope::default()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ModelSizeOutOfRange {
                dimension: Dimension::Depth,
                ..
            }
        ));
    }

    #[test]
    fn model_in_millimeters_is_rejected() {
        // A femur exported in millimeters reads as a 450 m bone.
        let stl = box_stl(45.0, 450.0, 40.0);
        let err = load_and_validate(&stl, &SizeEnvelope::default()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ModelSizeOutOfRange {
                dimension: Dimension::Width,
                ..
            }
        ));
    }

    #[test]
    fn ascii_stl_is_decoded() {
        let ascii = "solid bone
facet normal 0 0 1
outer loop
vertex 0 0 0
vertex 0.1 0 0
vertex 0.1 0.1 0.1
endloop
endfacet
endsolid bone
";
        let model = load_and_validate(ascii.as_bytes(), &SizeEnvelope::default()).unwrap();
        assert_eq!(model.triangle_count(), 1);
        assert_eq!(model.vertices.len(), 3);
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let mut out = Vec::new();
        stl_io::write_stl(&mut out, Vec::<Triangle>::new().iter()).unwrap();
        assert!(matches!(
            load_and_validate(&out, &SizeEnvelope::default()),
            Err(ValidationError::EmptyModel)
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            load_and_validate(b"\x00\x01\x02", &SizeEnvelope::default()),
            Err(ValidationError::Decode(_))
        ));
    }
}
