#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use chrono::Local;
use chrono::SecondsFormat;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use uuid::Uuid;

use super::Message;

/// Per-session state machine. Transitions are owned by the orchestrator:
/// Idle -> Building -> Generating -> Idle, with Closing entered when the
/// caller cancels an in-flight exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Building,
    Generating,
    Closing,
}

/// One ongoing conversation between a user and the model. History is
/// append-only; messages are never reordered or mutated after insertion.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner: String,
    pub model: String,
    pub created_at: String,
    pub last_activity: String,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(owner: &str, model: &str) -> Session {
        let now = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        return Session {
            id: Session::create_id(),
            owner: owner.to_string(),
            model: model.to_string(),
            created_at: now.clone(),
            last_activity: now,
            messages: vec![],
        };
    }

    pub fn create_id() -> String {
        return Uuid::new_v4()
            .to_string()
            .split('-')
            .enumerate()
            .filter_map(|(idx, str)| {
                if idx > 1 {
                    return None;
                }
                return Some(str);
            })
            .collect::<Vec<&str>>()
            .join("-");
    }

    pub fn push(&mut self, message: Message) {
        self.last_activity = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        self.messages.push(message);
    }
}
