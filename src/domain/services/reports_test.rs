use super::synthesize;
use super::transcript_text;
use crate::domain::models::ChatError;
use crate::domain::models::HighlightPolicy;
use crate::domain::models::Message;
use crate::domain::models::MessageKind;
use crate::domain::models::ReportOptions;
use crate::domain::models::Role;
use crate::domain::models::Session;

fn session_fixture() -> Session {
    let mut session = Session::new("amrit", "gemma2:9b");
    session.push(Message::new(Role::User, "I have a headache"));
    session.push(Message::new(
        Role::Assistant,
        "How long have you had it, and how severe is the pain?",
    ));
    session.push(Message::new(Role::User, "Two days, fairly mild"));
    return session;
}

#[test]
fn it_fails_on_an_empty_session() {
    let session = Session::new("amrit", "gemma2:9b");
    let res = synthesize(&session, &ReportOptions::default());
    assert_eq!(res.unwrap_err(), ChatError::EmptySession);
}

#[test]
fn it_builds_metadata_and_transcript_sections() {
    let session = session_fixture();
    let report = synthesize(&session, &ReportOptions::default()).unwrap();

    assert_eq!(report.title, format!("Conversation report {}", session.id));
    assert_eq!(report.sections.len(), 2);
    assert_eq!(report.sections[0].heading, "Metadata");
    assert!(report.sections[0].body.contains("Owner: amrit"));
    assert!(report.sections[0].body.contains("Messages: 3"));
    assert!(!report.sections[0].page_break);
    assert_eq!(report.sections[1].heading, "Transcript");
    assert!(report.sections[1].page_break);
}

#[test]
fn it_renders_the_transcript_chronologically() {
    let session = session_fixture();
    insta::assert_snapshot!(transcript_text(&session), @r###"
    User: I have a headache

    Assistant: How long have you had it, and how severe is the pain?

    User: Two days, fairly mild
    "###);
}

#[test]
fn it_marks_failed_exchanges_in_the_transcript() {
    let mut session = Session::new("amrit", "gemma2:9b");
    session.push(Message::new(Role::User, "hello"));
    session.push(Message::new_with_kind(
        Role::Assistant,
        MessageKind::Error,
        "[exchange failed: generation failed: boom]",
    ));

    let transcript = transcript_text(&session);
    assert!(transcript.contains("Assistant [error]:"));
}

#[test]
fn it_extracts_highlights_with_a_keyword_policy() {
    let session = session_fixture();
    let options = ReportOptions {
        highlight: Some(HighlightPolicy::Keywords(vec!["headache".to_string()])),
        ..ReportOptions::default()
    };

    let report = synthesize(&session, &options).unwrap();
    assert_eq!(report.sections[1].heading, "Highlights");
    assert_eq!(report.sections[1].body, "- User: I have a headache");
}

#[test]
fn it_reports_when_no_highlights_match() {
    let session = session_fixture();
    let options = ReportOptions {
        highlight: Some(HighlightPolicy::Keywords(vec!["fracture".to_string()])),
        ..ReportOptions::default()
    };

    let report = synthesize(&session, &options).unwrap();
    assert_eq!(
        report.sections[1].body,
        "No messages matched the highlight policy."
    );
}

#[test]
fn it_honors_a_custom_title() {
    let session = session_fixture();
    let options = ReportOptions {
        title: Some("Intake review".to_string()),
        ..ReportOptions::default()
    };

    let report = synthesize(&session, &options).unwrap();
    assert_eq!(report.title, "Intake review");
}
