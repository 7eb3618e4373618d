use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::document::{
    DEFAULT_COMPLETION_TIME, DEFAULT_NUM_OF_ACTIONS, DocumentError, QuestionDocument,
};
use crate::export::{parse_obj, to_obj};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid question document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid question document: {0}")]
    InvalidDocument(#[from] DocumentError),
    #[error("failed to start converter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("converter exited with status {status:?}")]
    ProcessFailed {
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("invalid model at line {line}: {message}")]
    InvalidModel { line: usize, message: String },
    #[error("converter does not support {0}")]
    Unsupported(&'static str),
}

impl ConvertError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Program plus leading arguments; the input and output paths are appended.
///
/// `blender -b -P json_to_fbx.py --` becomes
/// `blender -b -P json_to_fbx.py -- <input> <output>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<ConversionOutput, ConvertError> {
        debug!(program = %self.program, input = %input.display(), output = %output.display(), "running converter");
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        if !result.status.success() {
            warn!(program = %self.program, status = ?result.status.code(), "converter failed");
            return Err(ConvertError::ProcessFailed {
                status: result.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(ConversionOutput { stdout, stderr })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Mesh ⇄ JSON batch conversion.
///
/// `External` runs an isolated process per conversion (for example a headless
/// modelling application with a converter script). `Obj` converts in-process to
/// Wavefront OBJ and needs no external tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Converter {
    #[default]
    Obj,
    External {
        to_model: CommandLine,
        #[serde(default)]
        to_document: Option<CommandLine>,
        #[serde(default = "default_external_extension")]
        extension: String,
    },
}

impl Converter {
    /// File extension of the models this converter produces.
    pub fn model_extension(&self) -> &str {
        match self {
            Converter::Obj => "obj",
            Converter::External { extension, .. } => extension,
        }
    }

    /// Builds a model file from a question document stored at `input_json`.
    pub async fn document_to_model(
        &self,
        input_json: &Path,
        output_model: &Path,
    ) -> Result<ConversionOutput, ConvertError> {
        match self {
            Converter::Obj => {
                let document = read_document(input_json).await?;
                document.validate()?;
                ensure_parent(output_model).await?;
                tokio::fs::write(output_model, to_obj(&document.objects))
                    .await
                    .map_err(|err| ConvertError::io(output_model, err))?;
                Ok(ConversionOutput {
                    stdout: format!(
                        "wrote {} object(s) to {}",
                        document.objects.len(),
                        output_model.display()
                    ),
                    stderr: String::new(),
                })
            }
            Converter::External { to_model, .. } => {
                ensure_parent(output_model).await?;
                to_model.run(input_json, output_model).await
            }
        }
    }

    /// Extracts a question document from a model file.
    pub async fn model_to_document(
        &self,
        input_model: &Path,
        output_json: &Path,
    ) -> Result<ConversionOutput, ConvertError> {
        match self {
            Converter::Obj => {
                let source = tokio::fs::read_to_string(input_model)
                    .await
                    .map_err(|err| ConvertError::io(input_model, err))?;
                let question_name = input_model
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "model".to_string());
                let objects = parse_obj(&source, &question_name)?;
                let document = QuestionDocument {
                    question_name,
                    expected_completion_time: DEFAULT_COMPLETION_TIME,
                    expected_num_of_actions: DEFAULT_NUM_OF_ACTIONS,
                    objects,
                };
                write_document(output_json, &document).await?;
                Ok(ConversionOutput {
                    stdout: format!("wrote JSON to {}", output_json.display()),
                    stderr: String::new(),
                })
            }
            Converter::External {
                to_document: Some(command),
                ..
            } => {
                ensure_parent(output_json).await?;
                command.run(input_model, output_json).await
            }
            Converter::External {
                to_document: None, ..
            } => Err(ConvertError::Unsupported("model to document conversion")),
        }
    }
}

pub async fn read_document(path: &Path) -> Result<QuestionDocument, ConvertError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|err| ConvertError::io(path, err))?;
    Ok(serde_json::from_slice(&raw)?)
}

pub async fn write_document(path: &Path, document: &QuestionDocument) -> Result<(), ConvertError> {
    ensure_parent(path).await?;
    let raw = serde_json::to_vec_pretty(document)?;
    tokio::fs::write(path, raw)
        .await
        .map_err(|err| ConvertError::io(path, err))
}

async fn ensure_parent(path: &Path) -> Result<(), ConvertError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| ConvertError::io(parent, err)),
        _ => Ok(()),
    }
}

fn default_external_extension() -> String {
    "fbx".to_string()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tutor_core::MeshSnapshot;

    use super::{CommandLine, ConvertError, Converter, read_document, write_document};
    use crate::document::{MeshObject, QuestionDocument};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tutor_mesh_convert_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("should create scratch dir");
        dir
    }

    fn document() -> QuestionDocument {
        QuestionDocument {
            question_name: "wedge".to_string(),
            expected_completion_time: 30,
            expected_num_of_actions: 4,
            objects: vec![
                MeshObject::from_snapshot(
                    "Wedge",
                    &MeshSnapshot::new(
                        vec![
                            [0.0, 0.0, 0.0],
                            [1.5, 0.0, 0.0],
                            [1.5, 2.25, 0.0],
                            [0.0, 2.25, 0.0],
                            [0.0, 0.0, 0.1],
                        ],
                        vec![vec![0, 1, 2, 3], vec![0, 1, 4], vec![0, 3, 4]],
                    ),
                ),
                MeshObject::from_snapshot(
                    "Tri",
                    &MeshSnapshot::new(
                        vec![[-0.333, 0.1, 7.0], [2.0, -1.0e-3, 7.0], [0.0, 1.0, 7.125]],
                        vec![vec![2, 1, 0]],
                    ),
                ),
            ],
        }
    }

    #[tokio::test]
    async fn obj_round_trip_preserves_geometry() {
        let dir = scratch_dir("round_trip");
        let input = dir.join("wedge.json");
        let model = dir.join("out").join("wedge.obj");
        let back = dir.join("back.json");
        let original = document();
        write_document(&input, &original)
            .await
            .expect("document should be written");

        let converter = Converter::Obj;
        converter
            .document_to_model(&input, &model)
            .await
            .expect("conversion to model should succeed");
        converter
            .model_to_document(&model, &back)
            .await
            .expect("conversion back should succeed");

        let restored = read_document(&back).await.expect("document should be read");
        assert_eq!(restored.question_name, "wedge");
        assert_eq!(restored.objects.len(), original.objects.len());
        for (restored, original) in restored.objects.iter().zip(&original.objects) {
            assert_eq!(restored.name, original.name);
            assert_eq!(restored.faces, original.faces);
            assert_eq!(restored.vertices.len(), original.vertices.len());
            for (a, b) in restored.vertices.iter().zip(&original.vertices) {
                for axis in 0..3 {
                    assert!((a[axis] - b[axis]).abs() < 1e-9);
                }
            }
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn external_converter_receives_input_and_output_paths() {
        let dir = scratch_dir("external_ok");
        let input = dir.join("in.json");
        let output = dir.join("models").join("out.fbx");
        write_document(&input, &document())
            .await
            .expect("document should be written");

        let converter = Converter::External {
            to_model: CommandLine::new("sh", ["-c", "cp \"$1\" \"$2\" && echo converted", "sh"]),
            to_document: None,
            extension: "fbx".to_string(),
        };
        let result = converter
            .document_to_model(&input, &output)
            .await
            .expect("external conversion should succeed");

        assert!(result.stdout.contains("converted"));
        assert!(output.exists());
        assert_eq!(converter.model_extension(), "fbx");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn external_failure_carries_captured_output() {
        let dir = scratch_dir("external_fail");
        let input = dir.join("in.json");
        write_document(&input, &document())
            .await
            .expect("document should be written");

        let converter = Converter::External {
            to_model: CommandLine::new("sh", ["-c", "echo progress; echo boom >&2; exit 3", "sh"]),
            to_document: None,
            extension: "fbx".to_string(),
        };
        let err = converter
            .document_to_model(&input, &dir.join("out.fbx"))
            .await
            .expect_err("conversion should fail");

        match err {
            ConvertError::ProcessFailed {
                status,
                stdout,
                stderr,
            } => {
                assert_eq!(status, Some(3));
                assert!(stdout.contains("progress"));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn obj_conversion_rejects_dangling_faces() {
        let dir = scratch_dir("dangling");
        let input = dir.join("in.json");
        let output = dir.join("out.obj");
        let mut broken = document();
        broken.objects[1].faces = vec![vec![0, 1, 9]];
        write_document(&input, &broken)
            .await
            .expect("document should be written");

        let err = Converter::Obj
            .document_to_model(&input, &output)
            .await
            .expect_err("dangling face should be rejected");
        assert!(matches!(err, ConvertError::InvalidDocument(_)));
        assert!(!output.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = scratch_dir("missing_program");
        let converter = Converter::External {
            to_model: CommandLine::new("definitely-not-a-converter-binary", Vec::<String>::new()),
            to_document: None,
            extension: "fbx".to_string(),
        };
        let err = converter
            .document_to_model(&dir.join("in.json"), &dir.join("out.fbx"))
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, ConvertError::Spawn { .. }));

        let err = converter
            .model_to_document(&dir.join("out.fbx"), &dir.join("in.json"))
            .await
            .expect_err("no reverse command configured");
        assert!(matches!(err, ConvertError::Unsupported(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn converter_config_parses_from_json() {
        let converter: Converter = serde_json::from_str(
            r#"{"kind": "external", "to_model": {"program": "blender", "args": ["-b", "-P", "json_to_fbx.py", "--"]}}"#,
        )
        .expect("converter config should parse");
        assert_eq!(converter.model_extension(), "fbx");
        assert!(matches!(converter, Converter::External { to_document: None, .. }));

        let converter: Converter =
            serde_json::from_str(r#"{"kind": "obj"}"#).expect("obj config should parse");
        assert_eq!(converter, Converter::Obj);
    }
}
