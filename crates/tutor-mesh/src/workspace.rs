use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::info;

use crate::convert::{ConversionOutput, ConvertError, Converter, write_document};
use crate::document::{QuestionDocument, QuestionInfo};

const JSON_INPUTS: &str = "json_inputs";
const MODEL_OUTPUTS: &str = "model_outputs";
const EXTRA_INFO: &str = "extra_info";
const INFO_FILE: &str = "info.json";

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-local working directories for conversion inputs, outputs and the
/// current question's `info.json`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionJob {
    pub job_id: String,
    pub json_path: PathBuf,
    pub model_path: PathBuf,
    #[serde(skip)]
    pub output: ConversionOutput,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn json_inputs_dir(&self) -> PathBuf {
        self.root.join(JSON_INPUTS)
    }

    pub fn model_outputs_dir(&self) -> PathBuf {
        self.root.join(MODEL_OUTPUTS)
    }

    pub fn extra_info_dir(&self) -> PathBuf {
        self.root.join(EXTRA_INFO)
    }

    pub fn info_path(&self) -> PathBuf {
        self.extra_info_dir().join(INFO_FILE)
    }

    pub async fn ensure(&self) -> Result<(), ConvertError> {
        for dir in [
            self.json_inputs_dir(),
            self.model_outputs_dir(),
            self.extra_info_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|err| ConvertError::io(&dir, err))?;
        }
        Ok(())
    }

    pub async fn write_info(&self, info: &QuestionInfo) -> Result<(), ConvertError> {
        let path = self.info_path();
        let raw = serde_json::to_vec_pretty(info)?;
        tokio::fs::create_dir_all(self.extra_info_dir())
            .await
            .map_err(|err| ConvertError::io(&self.extra_info_dir(), err))?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|err| ConvertError::io(&path, err))
    }

    pub async fn read_info(&self) -> Result<QuestionInfo, ConvertError> {
        let path = self.info_path();
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|err| ConvertError::io(&path, err))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Validates and stores `document` under a fresh job id, runs the converter,
    /// then records the baseline in `info.json`. A failed job leaves the
    /// previous `info.json` in place.
    pub async fn convert(
        &self,
        converter: &Converter,
        document: &QuestionDocument,
    ) -> Result<ConversionJob, ConvertError> {
        let job_id = next_job_id();
        let json_path = self.json_inputs_dir().join(format!("{job_id}.json"));
        let model_path = self
            .model_outputs_dir()
            .join(format!("{job_id}.{}", converter.model_extension()));

        document.validate()?;
        info!(%job_id, question = %document.question_name, "starting conversion job");
        write_document(&json_path, document).await?;
        let output = converter.document_to_model(&json_path, &model_path).await?;
        self.write_info(&document.info()).await?;

        Ok(ConversionJob {
            job_id,
            json_path,
            model_path,
            output,
        })
    }
}

/// Unique within the process and ordered by creation time.
pub fn next_job_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let sequence = JOB_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{sequence:04x}")
}
