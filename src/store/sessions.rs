use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JsonFile;
use crate::agent::types::Role;

const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 50;

/// A message as recorded in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// `provider/model` that produced an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A user-visible conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChatSession {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<TranscriptMessage>,
}

/// Listing entry for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SessionSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Session transcripts, persisted as `chat_sessions.json`.
pub(crate) struct SessionStore {
    file: JsonFile,
    sessions: Mutex<BTreeMap<String, ChatSession>>,
}

impl SessionStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = JsonFile::new(path);
        let sessions: BTreeMap<String, ChatSession> = file.load()?;
        tracing::info!(
            path = %file.path().display(),
            sessions = sessions.len(),
            "loaded chat sessions"
        );
        Ok(Self {
            file,
            sessions: Mutex::new(sessions),
        })
    }

    /// Create and persist an empty session.
    pub fn create(&self, now: DateTime<Utc>) -> Result<ChatSession> {
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            messages: Vec::new(),
        };
        let mut sessions = self.lock();
        self.file.commit(&mut *sessions, |sessions| {
            sessions.insert(session.id.clone(), session.clone());
        })?;
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<ChatSession> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// All sessions, newest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut list: Vec<SessionSummary> = self
            .lock()
            .values()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                title: s.title.clone(),
                created_at: s.created_at,
                message_count: s.messages.len(),
            })
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// Append a user turn and its reply. The first exchange names the session.
    ///
    /// Returns `false` if the session no longer exists.
    pub fn append_exchange(
        &self,
        id: &str,
        user: TranscriptMessage,
        assistant: TranscriptMessage,
    ) -> Result<bool> {
        let mut sessions = self.lock();
        if !sessions.contains_key(id) {
            return Ok(false);
        }
        self.file.commit(&mut *sessions, |sessions| {
            if let Some(session) = sessions.get_mut(id) {
                if session.messages.is_empty() {
                    session.title = make_title(&user.content);
                }
                session.messages.push(user);
                session.messages.push(assistant);
            }
        })?;
        Ok(true)
    }

    /// Remove a session. Returns `false` if it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut sessions = self.lock();
        if !sessions.contains_key(id) {
            return Ok(false);
        }
        self.file.commit(&mut *sessions, |sessions| {
            sessions.remove(id);
        })?;
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ChatSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// First 50 characters of the opening message, with `...` if cut.
fn make_title(message: &str) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
