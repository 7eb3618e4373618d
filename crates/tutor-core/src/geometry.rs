use serde::{Deserialize, Serialize};

/// World-space coordinate as read from the host.
pub type Vertex = [f64; 3];

/// Polygon of arbitrary arity, expressed as indices into the owning mesh's vertices.
pub type Face = Vec<usize>;

/// Geometry captured from the host for a single grading or hint request.
///
/// Snapshots are never cached: the host mesh is mutable and externally owned,
/// so every request captures a fresh one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshSnapshot {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
}

impl MeshSnapshot {
    pub fn new(vertices: Vec<Vertex>, faces: Vec<Face>) -> Self {
        Self { vertices, faces }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// First face index that references a vertex outside this mesh, with the offending index.
    pub fn first_dangling_index(&self) -> Option<(usize, usize)> {
        self.faces.iter().enumerate().find_map(|(face, indices)| {
            indices
                .iter()
                .copied()
                .find(|index| *index >= self.vertices.len())
                .map(|index| (face, index))
        })
    }
}

#[inline]
pub fn distance(a: Vertex, b: Vertex) -> f64 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}
