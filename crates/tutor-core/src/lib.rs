pub mod geometry;
pub mod grading;
pub mod matcher;
pub mod score;

pub use geometry::{Face, MeshSnapshot, Vertex, distance};
pub use grading::{
    Attempt, GradeError, GradeReport, ObjectGrade, SubmissionOutcome, SubmissionRecord, grade,
    grade_submission,
};
pub use matcher::{
    DEFAULT_TOLERANCE, FaceVerdict, MatchResult, classify_faces, is_fully_passing, match_vertices,
};
pub use score::{Baseline, ScoreError, efficiency_ratio, score, score_clamped};
