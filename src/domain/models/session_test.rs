use super::Message;
use super::Session;
use crate::domain::models::Role;

#[test]
fn it_executes_new() {
    let session = Session::new("amrit", "gemma2:9b");
    assert_eq!(session.owner, "amrit");
    assert_eq!(session.model, "gemma2:9b");
    assert!(session.messages.is_empty());
    assert_eq!(session.created_at, session.last_activity);
}

#[test]
fn it_creates_short_ids() {
    let id = Session::create_id();
    assert_eq!(id.split('-').count(), 2);
}

#[test]
fn it_appends_history_in_order() {
    let mut session = Session::new("amrit", "gemma2:9b");
    session.push(Message::new(Role::User, "first"));
    session.push(Message::new(Role::Assistant, "second"));
    session.push(Message::new(Role::User, "third"));

    let texts = session
        .messages
        .iter()
        .map(|msg| {
            return msg.text.as_str();
        })
        .collect::<Vec<&str>>();
    assert_eq!(texts, vec!["first", "second", "third"]);
}
