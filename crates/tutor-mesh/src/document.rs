use serde::{Deserialize, Serialize};
use thiserror::Error;
use tutor_core::{Baseline, MeshSnapshot, Vertex};

pub const DEFAULT_COMPLETION_TIME: u32 = 10;
pub const DEFAULT_NUM_OF_ACTIONS: u32 = 0;

const MIN_FACE_ARITY: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("object '{object}' face {face} has {arity} indices, needs at least 3")]
    DegenerateFace {
        object: String,
        face: usize,
        arity: usize,
    },
    #[error("object '{object}' face {face} references missing vertex {index}")]
    DanglingIndex {
        object: String,
        face: usize,
        index: usize,
    },
}

/// A named mesh in the JSON exchange format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshObject {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Vec<usize>>,
}

impl MeshObject {
    pub fn from_snapshot(name: impl Into<String>, snapshot: &MeshSnapshot) -> Self {
        Self {
            name: name.into(),
            vertices: snapshot.vertices.clone(),
            faces: snapshot.faces.clone(),
        }
    }

    pub fn to_snapshot(&self) -> MeshSnapshot {
        MeshSnapshot::new(self.vertices.clone(), self.faces.clone())
    }

    /// Every face needs at least three indices, all within `vertices`.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if let Some((face, indices)) = self
            .faces
            .iter()
            .enumerate()
            .find(|(_, indices)| indices.len() < MIN_FACE_ARITY)
        {
            return Err(DocumentError::DegenerateFace {
                object: self.name.clone(),
                face,
                arity: indices.len(),
            });
        }
        if let Some((face, index)) = self.to_snapshot().first_dangling_index() {
            return Err(DocumentError::DanglingIndex {
                object: self.name.clone(),
                face,
                index,
            });
        }
        Ok(())
    }
}

/// A complete exercise: the target geometry plus its effort baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDocument {
    pub question_name: String,
    #[serde(default = "default_completion_time")]
    pub expected_completion_time: u32,
    #[serde(default = "default_num_of_actions")]
    pub expected_num_of_actions: u32,
    pub objects: Vec<MeshObject>,
}

impl QuestionDocument {
    pub fn info(&self) -> QuestionInfo {
        QuestionInfo {
            question_name: self.question_name.clone(),
            expected_completion_time: self.expected_completion_time,
            expected_num_of_actions: self.expected_num_of_actions,
        }
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        self.objects.iter().try_for_each(MeshObject::validate)
    }

    pub fn snapshots(&self) -> Vec<MeshSnapshot> {
        self.objects.iter().map(MeshObject::to_snapshot).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.objects.iter().map(|object| object.vertices.len()).sum()
    }
}

/// Contents of `info.json`, read back before grading to obtain the score baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInfo {
    pub question_name: String,
    pub expected_completion_time: u32,
    pub expected_num_of_actions: u32,
}

impl QuestionInfo {
    pub fn baseline(&self) -> Baseline {
        Baseline {
            expected_actions: self.expected_num_of_actions,
            expected_seconds: self.expected_completion_time as f64,
        }
    }
}

fn default_completion_time() -> u32 {
    DEFAULT_COMPLETION_TIME
}

fn default_num_of_actions() -> u32 {
    DEFAULT_NUM_OF_ACTIONS
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tutor_core::MeshSnapshot;

    use super::{DocumentError, MeshObject, QuestionDocument};

    #[test]
    fn parses_wire_document() {
        let document: QuestionDocument = serde_json::from_value(json!({
            "questionName": "easy",
            "expectedCompletionTime": 45,
            "expectedNumOfActions": 6,
            "objects": [{
                "name": "Cube",
                "vertices": [[0, 0, 0], [1, 0, 0], [1, 1, 0]],
                "faces": [[0, 1, 2]]
            }]
        }))
        .expect("document should parse");

        assert_eq!(document.question_name, "easy");
        assert_eq!(document.objects[0].vertices[1], [1.0, 0.0, 0.0]);
        assert_eq!(document.vertex_count(), 3);

        let baseline = document.info().baseline();
        assert_eq!(baseline.expected_actions, 6);
        assert_eq!(baseline.expected_seconds, 45.0);
    }

    #[test]
    fn missing_baseline_fields_use_exporter_defaults() {
        let document: QuestionDocument =
            serde_json::from_value(json!({"questionName": "bare", "objects": []}))
                .expect("document should parse");
        assert_eq!(document.expected_completion_time, 10);
        assert_eq!(document.expected_num_of_actions, 0);
    }

    #[test]
    fn snapshot_conversion_keeps_geometry() {
        let snapshot = MeshSnapshot::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            vec![vec![0, 1, 2, 3]],
        );
        let object = MeshObject::from_snapshot("Plane", &snapshot);
        assert_eq!(object.to_snapshot(), snapshot);
    }

    #[test]
    fn validation_rejects_short_and_dangling_faces() {
        let mut document: QuestionDocument = serde_json::from_value(json!({
            "questionName": "broken",
            "objects": [{
                "name": "Tri",
                "vertices": [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
                "faces": [[0, 1, 2]]
            }]
        }))
        .expect("document should parse");
        assert_eq!(document.validate(), Ok(()));

        document.objects[0].faces.push(vec![0, 1, 9]);
        assert_eq!(
            document.validate(),
            Err(DocumentError::DanglingIndex {
                object: "Tri".to_string(),
                face: 1,
                index: 9,
            })
        );

        document.objects[0].faces = vec![vec![0]];
        assert_eq!(
            document.validate(),
            Err(DocumentError::DegenerateFace {
                object: "Tri".to_string(),
                face: 0,
                arity: 1,
            })
        );
    }

    #[test]
    fn objects_without_faces_are_valid() {
        let document: QuestionDocument = serde_json::from_value(json!({
            "questionName": "points",
            "objects": [{"name": "Cloud", "vertices": [[0, 0, 0]], "faces": []}]
        }))
        .expect("document should parse");
        assert!(document.validate().is_ok());
    }
}
