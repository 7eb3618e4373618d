use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::MeshSnapshot;
use crate::matcher::{FaceVerdict, MatchResult, classify_faces, is_fully_passing, match_vertices};
use crate::score::{Baseline, score_clamped};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeError {
    #[error("no user geometry to grade")]
    NoUserGeometry,
    #[error("target mesh has no vertices")]
    EmptyTarget,
    #[error("tolerance must be a finite, non-negative distance (got {0})")]
    InvalidTolerance(f64),
    #[error("face {face} references vertex {index}, which does not exist")]
    FaceIndexOutOfRange { face: usize, index: usize },
    #[error("match result has {matches} entries for {vertices} target vertices")]
    MatchLengthMismatch { vertices: usize, matches: usize },
}

/// Effort spent on the current question since the last passing submission.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attempt {
    pub actions: u32,
    pub elapsed: Duration,
}

/// Grading of a single target object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectGrade {
    pub matches: MatchResult,
    pub verdicts: Vec<FaceVerdict>,
}

impl ObjectGrade {
    pub fn passed(&self) -> bool {
        is_fully_passing(&self.verdicts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub objects: Vec<ObjectGrade>,
    pub passed: bool,
}

/// Payload reported to the progress collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub question_name: String,
    pub passed: bool,
    pub number_of_actions: u32,
    pub time_taken: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub report: GradeReport,
    pub record: SubmissionRecord,
}

impl SubmissionOutcome {
    pub fn passed(&self) -> bool {
        self.report.passed
    }
}

/// Matches every target object against the combined user geometry.
pub fn grade(
    targets: &[MeshSnapshot],
    sources: &[MeshSnapshot],
    tolerance: f64,
) -> Result<GradeReport, GradeError> {
    if targets.iter().all(MeshSnapshot::is_empty) {
        return Err(GradeError::EmptyTarget);
    }

    let mut objects = Vec::with_capacity(targets.len());
    for target in targets {
        let matches = match_vertices(target, sources, tolerance)?;
        let verdicts = classify_faces(target, &matches)?;
        objects.push(ObjectGrade { matches, verdicts });
    }

    let passed = objects.iter().all(ObjectGrade::passed);
    Ok(GradeReport { objects, passed })
}

/// Grades a submission and builds the record for it.
///
/// The score is only computed for a fully passing submission; failed attempts
/// carry a score of zero.
pub fn grade_submission(
    question_name: &str,
    baseline: &Baseline,
    targets: &[MeshSnapshot],
    sources: &[MeshSnapshot],
    tolerance: f64,
    attempt: Attempt,
) -> Result<SubmissionOutcome, GradeError> {
    let report = grade(targets, sources, tolerance)?;
    let seconds = attempt.elapsed.as_secs_f64();
    let score = if report.passed {
        score_clamped(baseline, attempt.actions, seconds)
    } else {
        0.0
    };

    let record = SubmissionRecord {
        question_name: question_name.to_string(),
        passed: report.passed,
        number_of_actions: attempt.actions,
        time_taken: seconds,
        score,
    };
    Ok(SubmissionOutcome { report, record })
}
