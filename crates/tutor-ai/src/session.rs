use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Conversation history for one session id.
///
/// The first message is always the system prompt. Trimming happens only when a
/// user turn is appended and keeps the system prompt plus at most
/// `2 * max_turns_kept` of the most recent messages, dropping the oldest
/// user/assistant pair first. Appending the assistant reply afterwards can leave
/// the history one message over that cap until the next user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    messages: Vec<Message>,
}

impl Session {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn append_user_turn(&mut self, text: impl Into<String>, max_turns_kept: usize) {
        self.messages.push(Message::user(text));
        self.trim(max_turns_kept);
    }

    pub fn append_assistant_turn(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    fn trim(&mut self, max_turns_kept: usize) {
        // The turn just appended always survives, even with max_turns_kept == 0.
        let cap = (2 * max_turns_kept).max(1);
        let conversation = self.messages.len() - 1;
        if conversation <= cap {
            return;
        }

        let mut drop_until = 1 + (conversation - cap);
        // Never keep an assistant reply whose user turn was dropped.
        let last = self.messages.len() - 1;
        while drop_until < last && self.messages[drop_until].role == Role::Assistant {
            drop_until += 1;
        }
        self.messages.drain(1..drop_until);
    }
}

/// All sessions of the process, serialized behind a single store-wide lock.
///
/// Callers never hold the lock across a backend call, so a slow completion on
/// one session does not block others.
#[derive(Debug)]
pub struct SessionStore {
    system_prompt: String,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Returns the session, replacing it with a fresh one when `reset` is set or
    /// the id has not been seen.
    pub fn get_or_create(&self, session_id: &str, reset: bool) -> Session {
        let mut sessions = self.lock();
        if reset {
            info!(session_id, "resetting session");
        }
        if reset || !sessions.contains_key(session_id) {
            sessions.insert(session_id.to_string(), Session::new(&self.system_prompt));
        }
        sessions
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| Session::new(&self.system_prompt))
    }

    /// Appends a user turn (creating the session if needed) and returns the
    /// trimmed history to send to the backend.
    pub fn append_user_turn(
        &self,
        session_id: &str,
        text: &str,
        max_turns_kept: usize,
    ) -> Vec<Message> {
        let mut sessions = self.lock();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(&self.system_prompt));
        session.append_user_turn(text, max_turns_kept);
        session.messages().to_vec()
    }

    /// Appends the assistant reply and returns the resulting history length.
    pub fn append_assistant_turn(&self, session_id: &str, text: &str) -> usize {
        let mut sessions = self.lock();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(&self.system_prompt));
        session.append_assistant_turn(text);
        session.len()
    }

    pub fn history_len(&self, session_id: &str) -> Option<usize> {
        self.lock().get(session_id).map(Session::len)
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
