use super::Message;
use super::MessageKind;
use super::Role;

#[test]
fn it_executes_new() {
    let msg = Message::new(Role::User, "Hi there!");
    assert_eq!(msg.role, Role::User);
    assert_eq!(msg.text, "Hi there!".to_string());
    assert_eq!(msg.kind(), MessageKind::Normal);
    assert_eq!(msg.size(), 9);
}

#[test]
fn it_executes_new_with_kind() {
    let msg = Message::new_with_kind(Role::Assistant, MessageKind::Error, "It broke!");
    assert_eq!(msg.role, Role::Assistant);
    assert_eq!(msg.text, "It broke!".to_string());
    assert_eq!(msg.kind(), MessageKind::Error);
}

#[test]
fn it_executes_append() {
    let mut msg = Message::new(Role::Assistant, "Hi there!");
    msg.append(" It's me!");
    assert_eq!(msg.text, "Hi there! It's me!");
    assert_eq!(msg.size(), "Hi there! It's me!".chars().count());
}

#[test]
fn it_counts_characters_not_bytes() {
    let msg = Message::new(Role::User, "héllo");
    assert_eq!(msg.size(), 5);
}
