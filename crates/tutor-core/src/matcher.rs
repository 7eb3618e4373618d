use serde::{Deserialize, Serialize};

use crate::geometry::{MeshSnapshot, Vertex, distance};
use crate::grading::GradeError;

/// Maximum distance, in world units, for a user vertex to cover a target vertex.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// One entry per target vertex; `true` when some user vertex lies within tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchResult(Vec<bool>);

impl MatchResult {
    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    pub fn is_matched(&self, vertex: usize) -> bool {
        self.0.get(vertex).copied().unwrap_or(false)
    }

    pub fn flags(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.0.iter().filter(|matched| **matched).count()
    }

    pub fn all_matched(&self) -> bool {
        self.0.iter().all(|matched| *matched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceVerdict {
    Pass,
    Fail,
}

impl FaceVerdict {
    pub fn is_pass(self) -> bool {
        self == FaceVerdict::Pass
    }
}

/// Marks every target vertex that has a user vertex within `tolerance`.
///
/// Brute force over all pairs: exercise meshes are tens to low hundreds of
/// vertices, so a spatial index would not pay for itself.
pub fn match_vertices(
    target: &MeshSnapshot,
    sources: &[MeshSnapshot],
    tolerance: f64,
) -> Result<MatchResult, GradeError> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(GradeError::InvalidTolerance(tolerance));
    }

    let user_vertices = sources
        .iter()
        .flat_map(|mesh| mesh.vertices.iter().copied())
        .collect::<Vec<Vertex>>();
    if user_vertices.is_empty() {
        return Err(GradeError::NoUserGeometry);
    }

    let flags = target
        .vertices
        .iter()
        .map(|target_vertex| {
            user_vertices
                .iter()
                .any(|user_vertex| distance(*target_vertex, *user_vertex) <= tolerance)
        })
        .collect();

    Ok(MatchResult(flags))
}

/// Verdict per target face, indexed like `target.faces`.
pub fn classify_faces(
    target: &MeshSnapshot,
    matches: &MatchResult,
) -> Result<Vec<FaceVerdict>, GradeError> {
    if matches.len() != target.vertices.len() {
        return Err(GradeError::MatchLengthMismatch {
            vertices: target.vertices.len(),
            matches: matches.len(),
        });
    }
    if let Some((face, index)) = target.first_dangling_index() {
        return Err(GradeError::FaceIndexOutOfRange { face, index });
    }

    Ok(target
        .faces
        .iter()
        .map(|face| {
            if face.iter().all(|index| matches.is_matched(*index)) {
                FaceVerdict::Pass
            } else {
                FaceVerdict::Fail
            }
        })
        .collect())
}

pub fn is_fully_passing(verdicts: &[FaceVerdict]) -> bool {
    verdicts.iter().all(|verdict| verdict.is_pass())
}
