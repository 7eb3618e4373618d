use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{info, warn};
use tutor_core::{Attempt, Baseline, GradeError, MeshSnapshot, SubmissionOutcome, grade_submission};

use crate::orchestrator::{HintKind, HintOrchestrator, HintState};
use crate::prompt::{HintContext, feedback_prompt, hint_prompt};
use crate::service::{HintError, HintService};

/// One submit press: the freshly captured geometry plus the question's baseline.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub question_name: &'a str,
    pub baseline: Baseline,
    pub targets: &'a [MeshSnapshot],
    pub user: &'a [MeshSnapshot],
    pub tolerance: f64,
}

/// Per-learner context: effort counters and hint state.
///
/// Elapsed time keeps running across failed submissions and restarts after a
/// passing one, together with the action counter.
pub struct TutorSession {
    id: String,
    actions: u32,
    started_at: Instant,
    hints: HintOrchestrator,
}

impl TutorSession {
    pub fn new(id: impl Into<String>, hints: HintOrchestrator) -> Self {
        Self {
            id: id.into(),
            actions: 0,
            started_at: Instant::now(),
            hints,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actions(&self) -> u32 {
        self.actions
    }

    pub fn hints(&self) -> &HintOrchestrator {
        &self.hints
    }

    pub fn hint_state(&self) -> HintState {
        self.hints.state()
    }

    pub fn record_actions(&mut self, count: u32) -> u32 {
        self.actions = self.actions.saturating_add(count);
        self.actions
    }

    pub fn attempt_at(&self, now: Instant) -> Attempt {
        Attempt {
            actions: self.actions,
            elapsed: now.saturating_duration_since(self.started_at),
        }
    }

    pub fn submit(&mut self, submission: Submission<'_>) -> Result<SubmissionOutcome, GradeError> {
        self.submit_at(submission, Instant::now())
    }

    /// Grades the submission as of `now`. A full pass resets the effort
    /// counters and dispatches a feedback request.
    pub fn submit_at(
        &mut self,
        submission: Submission<'_>,
        now: Instant,
    ) -> Result<SubmissionOutcome, GradeError> {
        let outcome = grade_submission(
            submission.question_name,
            &submission.baseline,
            submission.targets,
            submission.user,
            submission.tolerance,
            self.attempt_at(now),
        )?;

        if outcome.passed() {
            info!(
                tutor = %self.id,
                question = submission.question_name,
                score = outcome.record.score,
                "submission passed"
            );
            self.actions = 0;
            self.started_at = now;

            let prompt = feedback_prompt(&outcome.record, &submission.baseline);
            if let Err(err) = self.hints.dispatch(HintKind::Feedback, prompt) {
                warn!(tutor = %self.id, %err, "could not request feedback");
            }
        }

        Ok(outcome)
    }

    /// Consumes one hint and starts the background request.
    pub fn request_hint(
        &self,
        question_name: &str,
        targets: Vec<MeshSnapshot>,
        user: Vec<MeshSnapshot>,
        tolerance: f64,
    ) -> Result<HintState, HintError> {
        let attempt = self.attempt_at(Instant::now());
        let prompt = hint_prompt(&HintContext {
            question_name: question_name.to_string(),
            targets,
            user,
            actions: attempt.actions,
            elapsed_seconds: attempt.elapsed.as_secs_f64(),
            tolerance,
        });
        self.hints.dispatch(HintKind::Hint, prompt)?;
        Ok(self.hints.state())
    }
}

/// Tutor sessions by id, created on first use.
pub struct TutorRegistry {
    service: Arc<HintService>,
    hints_per_session: u32,
    max_turns_kept: usize,
    sessions: Mutex<HashMap<String, Arc<Mutex<TutorSession>>>>,
}

impl TutorRegistry {
    pub fn new(service: Arc<HintService>, hints_per_session: u32, max_turns_kept: usize) -> Self {
        Self {
            service,
            hints_per_session,
            max_turns_kept,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn service(&self) -> &Arc<HintService> {
        &self.service
    }

    pub fn get_or_create(&self, id: &str) -> Arc<Mutex<TutorSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            let hints = HintOrchestrator::new(
                Arc::clone(&self.service),
                format!("tutor:{id}"),
                self.hints_per_session,
                self.max_turns_kept,
            );
            Arc::new(Mutex::new(TutorSession::new(id, hints)))
        });
        Arc::clone(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<TutorSession>>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Locks a tutor session, recovering from a poisoned lock.
pub fn lock_session(session: &Mutex<TutorSession>) -> MutexGuard<'_, TutorSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use tutor_core::{Baseline, GradeError, MeshSnapshot};

    use super::{Submission, TutorRegistry, lock_session};
    use crate::service::HintError;
    use crate::service::tests::{EchoModel, service};

    fn triangle() -> MeshSnapshot {
        MeshSnapshot::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![vec![0, 1, 2]],
        )
    }

    fn baseline() -> Baseline {
        Baseline {
            expected_actions: 10,
            expected_seconds: 60.0,
        }
    }

    fn registry() -> TutorRegistry {
        TutorRegistry::new(Arc::new(service(Arc::new(EchoModel::default()))), 2, 20)
    }

    #[tokio::test]
    async fn elapsed_time_accumulates_until_a_pass() {
        let registry = registry();
        let session = registry.get_or_create("learner");
        let mut session = lock_session(&session);
        let start = Instant::now();
        session.record_actions(20);

        let targets = [triangle()];
        let partial = [MeshSnapshot::new(vec![[0.0, 0.0, 0.0]], Vec::new())];
        let failed = session
            .submit_at(
                Submission {
                    question_name: "triangle",
                    baseline: baseline(),
                    targets: &targets,
                    user: &partial,
                    tolerance: 0.1,
                },
                start + Duration::from_secs(30),
            )
            .expect("grading should succeed");
        assert!(!failed.passed());
        assert_eq!(session.actions(), 20);

        let complete = [triangle()];
        let passed = session
            .submit_at(
                Submission {
                    question_name: "triangle",
                    baseline: baseline(),
                    targets: &targets,
                    user: &complete,
                    tolerance: 0.1,
                },
                start + Duration::from_secs(60),
            )
            .expect("grading should succeed");
        assert!(passed.passed());
        assert!(passed.record.time_taken >= 60.0);
        assert!(passed.record.score <= 50.0 + 1e-9);
        assert_eq!(session.actions(), 0);

        let hints = session.hints().clone();
        drop(session);
        let feedback = hints.wait().await;
        assert_eq!(feedback.response_title, "Feedback");
        assert!(feedback.last_response.starts_with("reply:"));
        assert_eq!(feedback.hints_remaining, 2);
    }

    #[tokio::test]
    async fn each_pass_is_scored_as_a_new_attempt() {
        let registry = registry();
        let session = registry.get_or_create("learner");
        let mut session = lock_session(&session);
        let start = Instant::now();
        let targets = [triangle()];
        let complete = [triangle()];
        let submission = Submission {
            question_name: "triangle",
            baseline: baseline(),
            targets: &targets,
            user: &complete,
            tolerance: 0.1,
        };

        session.record_actions(20);
        let first = session
            .submit_at(submission, start + Duration::from_secs(120))
            .expect("grading should succeed");
        assert!((first.record.score - 25.0).abs() < 1e-9);

        session.record_actions(5);
        let second = session
            .submit_at(submission, start + Duration::from_secs(150))
            .expect("grading should succeed");
        assert!(second.passed());
        assert_eq!(second.record.number_of_actions, 5);
        assert!((second.record.time_taken - 30.0).abs() < 1e-6);
        assert!((second.record.score - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_user_geometry_leaves_session_untouched() {
        let registry = registry();
        let session = registry.get_or_create("learner");
        let mut session = lock_session(&session);
        session.record_actions(3);

        let targets = [triangle()];
        let err = session
            .submit(Submission {
                question_name: "triangle",
                baseline: baseline(),
                targets: &targets,
                user: &[],
                tolerance: 0.1,
            })
            .expect_err("no user geometry");
        assert_eq!(err, GradeError::NoUserGeometry);
        assert_eq!(session.actions(), 3);
        assert!(!session.hint_state().loading);
    }

    #[tokio::test]
    async fn hints_are_limited_per_learner() {
        let registry = registry();
        let first = registry.get_or_create("a");
        let second = registry.get_or_create("b");

        for _ in 0..2 {
            let state = lock_session(&first)
                .request_hint("triangle", vec![triangle()], Vec::new(), 0.1)
                .expect("hint should dispatch");
            assert!(state.loading);
            let hints = lock_session(&first).hints().clone();
            hints.wait().await;
        }
        let err = lock_session(&first)
            .request_hint("triangle", vec![triangle()], Vec::new(), 0.1)
            .expect_err("hints exhausted");
        assert!(matches!(err, HintError::NoHintsRemaining));

        assert_eq!(lock_session(&second).hint_state().hints_remaining, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registry_returns_the_same_session_for_an_id() {
        let registry = registry();
        let first = registry.get_or_create("learner");
        lock_session(&first).record_actions(4);

        let again = registry.get_or_create("learner");
        assert_eq!(lock_session(&again).actions(), 4);
        assert_eq!(lock_session(&again).id(), "learner");
        assert!(registry.get("learner").is_some());
        assert!(registry.get("stranger").is_none());
    }
}
