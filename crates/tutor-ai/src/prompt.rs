use std::fmt::Write as _;

use tutor_core::{
    Baseline, GradeError, MeshSnapshot, SubmissionRecord, classify_faces, match_vertices,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a patient 3D-modelling tutor.

The learner is rebuilding a target mesh inside a modelling application. Every
message describes the target, what the learner has built so far, and how much
effort they have spent.

Guidelines:
- Give one concrete next step, phrased as a hint rather than a full solution.
- Refer to tools by their common names (extrude, loop cut, bevel, merge, scale).
- Mention coordinates only when a vertex is clearly misplaced.
- Keep answers under 80 words.
- When the learner has finished, congratulate them and suggest one way to be more efficient.
"#;

const MAX_LISTED_VERTICES: usize = 8;

/// Everything captured from the host for one hint request.
#[derive(Debug, Clone, PartialEq)]
pub struct HintContext {
    pub question_name: String,
    pub targets: Vec<MeshSnapshot>,
    pub user: Vec<MeshSnapshot>,
    pub actions: u32,
    pub elapsed_seconds: f64,
    pub tolerance: f64,
}

pub fn hint_prompt(context: &HintContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Exercise: {}", context.question_name);
    let _ = writeln!(
        out,
        "Effort so far: {} action(s), {:.0} second(s).",
        context.actions, context.elapsed_seconds
    );

    let user_vertices = context
        .user
        .iter()
        .map(|mesh| mesh.vertices.len())
        .sum::<usize>();
    let user_faces = context.user.iter().map(|mesh| mesh.faces.len()).sum::<usize>();
    let _ = writeln!(
        out,
        "Learner geometry: {} object(s), {user_vertices} vertices, {user_faces} faces.",
        context.user.len()
    );

    for (index, target) in context.targets.iter().enumerate() {
        let _ = writeln!(
            out,
            "Target object {}: {} vertices, {} faces.",
            index + 1,
            target.vertices.len(),
            target.faces.len()
        );
        describe_progress(&mut out, target, &context.user, context.tolerance);
    }

    out.push_str("What should the learner do next?");
    out
}

fn describe_progress(out: &mut String, target: &MeshSnapshot, user: &[MeshSnapshot], tolerance: f64) {
    let matches = match match_vertices(target, user, tolerance) {
        Ok(matches) => matches,
        Err(GradeError::NoUserGeometry) => {
            out.push_str("  The learner has not created any geometry yet.\n");
            return;
        }
        Err(err) => {
            let _ = writeln!(out, "  Progress unavailable: {err}.");
            return;
        }
    };

    let _ = writeln!(
        out,
        "  Matched vertices: {}/{} (tolerance {tolerance}).",
        matches.matched_count(),
        matches.len()
    );
    if let Ok(verdicts) = classify_faces(target, &matches) {
        let passing = verdicts.iter().filter(|verdict| verdict.is_pass()).count();
        let _ = writeln!(out, "  Completed faces: {passing}/{}.", verdicts.len());
    }

    let missing = target
        .vertices
        .iter()
        .enumerate()
        .filter(|(index, _)| !matches.is_matched(*index))
        .map(|(_, vertex)| *vertex)
        .collect::<Vec<_>>();
    if missing.is_empty() {
        return;
    }

    out.push_str("  Missing vertices:");
    for vertex in missing.iter().take(MAX_LISTED_VERTICES) {
        let _ = write!(out, " ({:.2}, {:.2}, {:.2})", vertex[0], vertex[1], vertex[2]);
    }
    if missing.len() > MAX_LISTED_VERTICES {
        let _ = write!(out, " and {} more", missing.len() - MAX_LISTED_VERTICES);
    }
    out.push('\n');
}

/// Prompt asking for feedback on a completed exercise.
pub fn feedback_prompt(record: &SubmissionRecord, baseline: &Baseline) -> String {
    format!(
        "The learner completed \"{}\" with a score of {:.1}/100.\n\
         They used {} action(s) (expected {}) and took {:.0} second(s) (expected {:.0}).\n\
         Give short, encouraging feedback and one tip for working more efficiently.",
        record.question_name,
        record.score,
        record.number_of_actions,
        baseline.expected_actions,
        record.time_taken,
        baseline.expected_seconds
    )
}
