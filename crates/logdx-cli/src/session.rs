//! Session persistence for resuming conversations

use logdx_workflow::ConversationState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A saved conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub created_at: i64,
    pub updated_at: i64,
    pub model: String,
    pub state: ConversationState,
}

/// Reads and writes sessions as one JSON file per session id
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Get the default sessions directory
    pub fn sessions_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("logdx")
            .join("sessions")
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Start a fresh conversation with new session and chat ids
    pub fn new_state() -> ConversationState {
        ConversationState::new(
            uuid::Uuid::new_v4().to_string(),
            uuid::Uuid::new_v4().to_string(),
        )
    }

    /// Write the state, keeping the original creation time
    pub fn save(&self, model: &str, state: &ConversationState) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(state.session_id());
        let now = chrono::Utc::now().timestamp_millis();
        let created_at = read_session(&path).map(|s| s.created_at).unwrap_or(now);

        let file = SessionFile {
            created_at,
            updated_at: now,
            model: model.to_string(),
            state: state.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(path, content)
    }

    /// Load an existing session
    pub fn load(&self, id: &str) -> std::io::Result<SessionFile> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Session not found: {}", id),
            ));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// List all sessions, newest first
    pub fn list(&self) -> std::io::Result<Vec<SessionInfo>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(file) = read_session(&path) {
                sessions.push(SessionInfo {
                    id: file.state.session_id().to_string(),
                    created_at: file.created_at,
                    updated_at: file.updated_at,
                    model: file.model,
                    message_count: file.state.messages.len(),
                    stream_name: file.state.stream_name.clone(),
                });
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Self::sessions_dir())
    }
}

fn read_session(path: &Path) -> Option<SessionFile> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Information about a saved session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub model: String,
    pub message_count: usize,
    pub stream_name: String,
}

impl SessionInfo {
    pub fn created_at_display(&self) -> String {
        format_millis(self.created_at)
    }

    /// Format the updated_at timestamp for display
    pub fn updated_at_display(&self) -> String {
        format_millis(self.updated_at)
    }
}

fn format_millis(millis: i64) -> String {
    use chrono::{TimeZone, Utc};
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
