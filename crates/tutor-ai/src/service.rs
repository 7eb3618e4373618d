use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::backend::{BackendError, TextCompletion};
use crate::session::SessionStore;

pub const DEFAULT_MAX_TURNS_KEPT: usize = 20;
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 4;

#[derive(Debug, Error)]
pub enum HintError {
    #[error("session_id is required")]
    MissingSessionId,
    #[error("prompt is required")]
    MissingPrompt,
    #[error("no hints remaining")]
    NoHintsRemaining,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HintRequest {
    pub session_id: String,
    pub prompt: String,
    #[serde(default)]
    pub reset: bool,
    #[serde(default = "default_max_turns_kept")]
    pub max_turns_kept: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintReply {
    pub session_id: String,
    pub hint: String,
    pub turns_in_history: usize,
}

/// Session store plus backend, shared by every request and background worker.
///
/// Concurrent backend calls are capped by a semaphore; each call is bounded by
/// `timeout`.
pub struct HintService {
    sessions: SessionStore,
    backend: Arc<dyn TextCompletion>,
    limiter: Semaphore,
    timeout: Duration,
}

impl HintService {
    pub fn new(
        system_prompt: impl Into<String>,
        backend: Arc<dyn TextCompletion>,
        max_concurrent_calls: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            sessions: SessionStore::new(system_prompt),
            backend,
            limiter: Semaphore::new(max_concurrent_calls.max(1)),
            timeout,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Stateless-client entry point: validates the request, optionally resets
    /// the session, then runs one completion turn.
    pub async fn ask(&self, request: HintRequest) -> Result<HintReply, HintError> {
        let session_id = request.session_id.as_str();
        if session_id.trim().is_empty() {
            return Err(HintError::MissingSessionId);
        }
        if request.prompt.trim().is_empty() {
            return Err(HintError::MissingPrompt);
        }

        self.sessions.get_or_create(session_id, request.reset);
        let (hint, turns_in_history) = self
            .complete_turn(session_id, &request.prompt, request.max_turns_kept)
            .await
            .inspect_err(|err| warn!(session_id, %err, "hint backend call failed"))?;

        Ok(HintReply {
            session_id: session_id.to_string(),
            hint,
            turns_in_history,
        })
    }

    /// Appends the user turn, calls the backend outside the store lock, then
    /// appends the reply. Returns the reply and the resulting history length.
    ///
    /// Two concurrent turns on the same session may interleave between the
    /// backend call and the reply append.
    pub async fn complete_turn(
        &self,
        session_id: &str,
        prompt: &str,
        max_turns_kept: usize,
    ) -> Result<(String, usize), BackendError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| BackendError::Closed)?;

        let history = self
            .sessions
            .append_user_turn(session_id, prompt, max_turns_kept);
        let reply = tokio::time::timeout(self.timeout, self.backend.complete(&history))
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))??;
        let turns = self.sessions.append_assistant_turn(session_id, &reply);
        Ok((reply, turns))
    }
}

fn default_max_turns_kept() -> usize {
    DEFAULT_MAX_TURNS_KEPT
}
