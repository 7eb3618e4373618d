pub mod backend;
pub mod orchestrator;
pub mod prompt;
pub mod service;
pub mod session;
pub mod tutor;

pub use backend::{BackendConfig, BackendError, ChatCompletionsClient, TextCompletion};
pub use orchestrator::{HintKind, HintOrchestrator, HintState, PollStep};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, HintContext, feedback_prompt, hint_prompt};
pub use service::{
    DEFAULT_MAX_CONCURRENT_CALLS, DEFAULT_MAX_TURNS_KEPT, HintError, HintReply, HintRequest,
    HintService,
};
pub use session::{Message, Role, Session, SessionStore};
pub use tutor::{Submission, TutorRegistry, TutorSession, lock_session};
