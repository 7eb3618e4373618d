use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::backend::BackendError;
use crate::service::{HintError, HintService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    /// Learner pressed the hint button; consumes one hint.
    Hint,
    /// Feedback after a fully passing submission; free.
    Feedback,
}

impl HintKind {
    pub fn title(self) -> &'static str {
        match self {
            HintKind::Hint => "Hint",
            HintKind::Feedback => "Feedback",
        }
    }
}

/// What the learner-facing UI renders.
///
/// `loading` is true exactly while a dispatched request is outstanding. An
/// empty `last_response` with `loading == false` means no hint was available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintState {
    pub hints_remaining: u32,
    pub loading: bool,
    pub last_response: String,
    pub response_title: String,
}

/// Result of one polling step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// Still waiting on the backend; poll again later.
    Reschedule,
    /// Completed; stop polling.
    Done(HintState),
}

#[derive(Debug)]
struct Slot {
    state: HintState,
    sequence: u64,
    in_flight: Option<AbortHandle>,
}

struct Shared {
    service: Arc<HintService>,
    conversation_id: String,
    max_turns_kept: usize,
    slot: Mutex<Slot>,
    completed: watch::Sender<u64>,
}

/// Sequences capture → backend call → publication of hints for one learner.
///
/// Each dispatch gets a sequence number. A newer dispatch aborts the previous
/// in-flight worker and only the newest completion is published, so at most one
/// request per learner is outstanding.
#[derive(Clone)]
pub struct HintOrchestrator {
    shared: Arc<Shared>,
}

impl HintOrchestrator {
    pub fn new(
        service: Arc<HintService>,
        conversation_id: impl Into<String>,
        hints_remaining: u32,
        max_turns_kept: usize,
    ) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                service,
                conversation_id: conversation_id.into(),
                max_turns_kept,
                slot: Mutex::new(Slot {
                    state: HintState {
                        hints_remaining,
                        loading: false,
                        last_response: String::new(),
                        response_title: String::new(),
                    },
                    sequence: 0,
                    in_flight: None,
                }),
                completed,
            }),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.shared.conversation_id
    }

    pub fn state(&self) -> HintState {
        self.shared.lock().state.clone()
    }

    /// Starts a background request. Must be called from within a Tokio runtime.
    ///
    /// The prompt must already hold everything captured from the host; the
    /// worker never touches host state.
    pub fn dispatch(&self, kind: HintKind, prompt: String) -> Result<u64, HintError> {
        let mut slot = self.shared.lock();
        if kind == HintKind::Hint {
            if slot.state.hints_remaining == 0 {
                return Err(HintError::NoHintsRemaining);
            }
            slot.state.hints_remaining -= 1;
        }

        slot.sequence += 1;
        let sequence = slot.sequence;
        if let Some(previous) = slot.in_flight.take() {
            debug!(conversation = %self.shared.conversation_id, sequence, "superseding in-flight request");
            previous.abort();
        }

        slot.state.loading = true;
        slot.state.last_response.clear();
        slot.state.response_title = kind.title().to_string();

        let shared = Arc::clone(&self.shared);
        let worker = tokio::spawn(async move {
            let result = shared
                .service
                .complete_turn(&shared.conversation_id, &prompt, shared.max_turns_kept)
                .await
                .map(|(reply, _)| reply);
            shared.publish(sequence, result);
        });
        slot.in_flight = Some(worker.abort_handle());

        Ok(sequence)
    }

    /// One polling step for hosts that cannot await.
    pub fn poll(&self) -> PollStep {
        let slot = self.shared.lock();
        if slot.state.loading {
            PollStep::Reschedule
        } else {
            PollStep::Done(slot.state.clone())
        }
    }

    /// Resolves once no request is outstanding.
    pub async fn wait(&self) -> HintState {
        let mut completed = self.shared.completed.subscribe();
        loop {
            if let PollStep::Done(state) = self.poll() {
                return state;
            }
            if completed.changed().await.is_err() {
                return self.state();
            }
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, sequence: u64, result: Result<String, BackendError>) {
        {
            let mut slot = self.lock();
            if slot.sequence != sequence {
                debug!(conversation = %self.conversation_id, sequence, "discarding stale completion");
                return;
            }

            slot.state.last_response = match result {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(conversation = %self.conversation_id, %err, "hint request failed");
                    String::new()
                }
            };
            slot.state.loading = false;
            slot.in_flight = None;
        }
        self.completed.send_replace(sequence);
    }
}
