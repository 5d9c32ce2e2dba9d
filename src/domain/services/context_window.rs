#[cfg(test)]
#[path = "context_window_test.rs"]
mod tests;

use std::collections::BTreeMap;

use crate::domain::models::Message;
use crate::domain::models::Session;

pub const TRUNCATION_MARKER: &str = " [truncated]";

/// The ordered subset of a session's history selected to fit the context
/// budget. Derived and ephemeral; never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptPlan {
    pub messages: Vec<Message>,
    pub size: usize,
    pub truncated: bool,
}

impl PromptPlan {
    pub fn render(&self) -> String {
        return self
            .messages
            .iter()
            .map(|msg| {
                return format!("{}: {}", msg.role, msg.text);
            })
            .collect::<Vec<String>>()
            .join("\n\n");
    }
}

fn clip(message: &Message, budget: usize) -> Message {
    let keep = budget.saturating_sub(TRUNCATION_MARKER.chars().count());
    let head = message.text.chars().take(keep).collect::<String>();
    return Message::new(message.role, &format!("{head}{TRUNCATION_MARKER}"));
}

/// Selects the messages that fit `budget` (measured in characters).
///
/// System messages are pinned: they are always included and charged against
/// the budget first. The remaining non-system history is taken newest-first
/// until the budget runs out, so truncation always drops the oldest
/// messages. The triggering (newest) message is included even when it alone
/// exceeds the budget; its content is clipped with a marker rather than
/// dropped, which is the only case where the plan may exceed the budget and
/// it always holds exactly the pinned messages plus that one message.
///
/// Pure and deterministic: the same session and budget always produce the
/// same plan.
pub fn build_prompt(session: &Session, budget: usize) -> PromptPlan {
    // BTreeMap keeps the original history order while messages are picked
    // newest-first.
    let mut picked: BTreeMap<usize, Message> = BTreeMap::new();
    let mut size: usize = 0;
    let mut truncated = false;

    for (idx, msg) in session.messages.iter().enumerate() {
        if msg.role.is_system() {
            size += msg.size();
            picked.insert(idx, msg.clone());
        }
    }

    let history = session
        .messages
        .iter()
        .enumerate()
        .filter(|(_, msg)| return !msg.role.is_system())
        .collect::<Vec<(usize, &Message)>>();

    if let Some((newest_idx, newest)) = history.last() {
        if size + newest.size() <= budget {
            size += newest.size();
            picked.insert(*newest_idx, (*newest).clone());
        } else {
            let clipped = clip(newest, budget.saturating_sub(size));
            size += clipped.size();
            picked.insert(*newest_idx, clipped);
            truncated = true;
        }

        for (idx, msg) in history[..history.len() - 1].iter().rev() {
            if size + msg.size() > budget {
                truncated = true;
                break;
            }
            size += msg.size();
            picked.insert(*idx, (*msg).clone());
        }
    }

    return PromptPlan {
        messages: picked.into_values().collect(),
        size,
        truncated,
    };
}
