use super::format_session;
use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::models::Session;

#[test]
fn it_formats_sessions_for_listing() {
    let mut session = Session::new("amrit", "gemma2:9b");
    session.push(Message::new(Role::User, "I have a headache"));

    let line = format_session(&session);
    assert!(line.contains(&session.id));
    assert!(line.contains("Model: gemma2:9b"));
    assert!(line.ends_with("I have a headache"));
}

#[test]
fn it_truncates_long_first_lines_on_char_boundaries() {
    let mut session = Session::new("amrit", "gemma2:9b");
    session.push(Message::new(Role::User, &"é".repeat(80)));

    let line = format_session(&session);
    assert!(line.ends_with(&format!("{}...", "é".repeat(67))));
}
