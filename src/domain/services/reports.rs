#[cfg(test)]
#[path = "reports_test.rs"]
mod tests;

use crate::domain::models::ChatError;
use crate::domain::models::HighlightPolicy;
use crate::domain::models::MessageKind;
use crate::domain::models::Report;
use crate::domain::models::ReportOptions;
use crate::domain::models::ReportSection;
use crate::domain::models::Session;

/// Chronological transcript of a session as plain text, one paragraph per
/// message. Error-kind messages are marked so a failed exchange is visible
/// in the export.
pub fn transcript_text(session: &Session) -> String {
    return session
        .messages
        .iter()
        .map(|msg| {
            if msg.kind() == MessageKind::Error {
                return format!("{} [error]: {}", msg.role, msg.text);
            }
            return format!("{}: {}", msg.role, msg.text);
        })
        .collect::<Vec<String>>()
        .join("\n\n");
}

fn metadata_section(session: &Session) -> ReportSection {
    let body = [
        format!("Session: {}", session.id),
        format!("Owner: {}", session.owner),
        format!("Model: {}", session.model),
        format!("Started: {}", session.created_at),
        format!("Last activity: {}", session.last_activity),
        format!("Messages: {}", session.messages.len()),
    ]
    .join("\n");

    return ReportSection {
        heading: "Metadata".to_string(),
        level: 2,
        body,
        page_break: false,
    };
}

fn highlights_section(session: &Session, policy: &HighlightPolicy) -> ReportSection {
    let HighlightPolicy::Keywords(keywords) = policy;
    let lowered = keywords
        .iter()
        .map(|keyword| {
            return keyword.to_lowercase();
        })
        .collect::<Vec<String>>();

    let matches = session
        .messages
        .iter()
        .filter(|msg| {
            if msg.role.is_system() {
                return false;
            }
            let text = msg.text.to_lowercase();
            return lowered.iter().any(|keyword| return text.contains(keyword));
        })
        .map(|msg| {
            return format!("- {}: {}", msg.role, msg.text);
        })
        .collect::<Vec<String>>();

    let body = if matches.is_empty() {
        "No messages matched the highlight policy.".to_string()
    } else {
        matches.join("\n")
    };

    return ReportSection {
        heading: "Highlights".to_string(),
        level: 2,
        body,
        page_break: false,
    };
}

/// Pure transformation of a session snapshot into an exportable document.
/// Performs no generation itself; a configured summary is produced by the
/// orchestrator as a separate generation request.
pub fn synthesize(session: &Session, options: &ReportOptions) -> Result<Report, ChatError> {
    if session.messages.is_empty() {
        return Err(ChatError::EmptySession);
    }

    let mut sections: Vec<ReportSection> = vec![];

    if options.include_metadata {
        sections.push(metadata_section(session));
    }

    if let Some(policy) = &options.highlight {
        sections.push(highlights_section(session, policy));
    }

    if options.include_transcript {
        sections.push(ReportSection {
            heading: "Transcript".to_string(),
            level: 2,
            body: transcript_text(session),
            page_break: true,
        });
    }

    let title = options
        .title
        .clone()
        .unwrap_or_else(|| return format!("Conversation report {}", session.id));

    return Ok(Report { title, sections });
}
