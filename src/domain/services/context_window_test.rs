use super::build_prompt;
use super::TRUNCATION_MARKER;
use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::models::Session;

fn session_with(texts: Vec<(Role, &str)>) -> Session {
    let mut session = Session::new("amrit", "gemma2:9b");
    for (role, text) in texts {
        session.push(Message::new(role, text));
    }
    return session;
}

fn texts(plan: &super::PromptPlan) -> Vec<String> {
    return plan
        .messages
        .iter()
        .map(|msg| {
            return msg.text.to_string();
        })
        .collect::<Vec<String>>();
}

#[test]
fn it_keeps_everything_under_budget() {
    // Scenario A: three prior messages under budget plus a fourth.
    let session = session_with(vec![
        (Role::User, "one"),
        (Role::Assistant, "two"),
        (Role::User, "three"),
        (Role::User, "four"),
    ]);

    let plan = build_prompt(&session, 100);
    assert_eq!(texts(&plan), vec!["one", "two", "three", "four"]);
    assert!(!plan.truncated);
    assert_eq!(plan.size, 3 + 3 + 5 + 4);
}

#[test]
fn it_drops_oldest_messages_first() {
    // Scenario B: history exceeds budget by the two oldest messages.
    let session = session_with(vec![
        (Role::User, "aaaaaaaaaa"),
        (Role::Assistant, "bbbbbbbbbb"),
        (Role::User, "cccccccccc"),
        (Role::Assistant, "dddddddddd"),
        (Role::User, "eeeeeeeeee"),
    ]);

    let plan = build_prompt(&session, 30);
    assert_eq!(
        texts(&plan),
        vec!["cccccccccc", "dddddddddd", "eeeeeeeeee"]
    );
    assert!(plan.truncated);
    assert!(plan.size <= 30);
}

#[test]
fn it_pins_system_messages_regardless_of_position() {
    let session = session_with(vec![
        (Role::System, "be kind"),
        (Role::User, "aaaaaaaaaa"),
        (Role::Assistant, "bbbbbbbbbb"),
        (Role::User, "cccccccccc"),
    ]);

    let plan = build_prompt(&session, 20);
    assert_eq!(plan.messages[0].role, Role::System);
    assert_eq!(texts(&plan), vec!["be kind", "cccccccccc"]);
}

#[test]
fn it_clips_an_oversized_triggering_message() {
    let long = "x".repeat(100);
    let session = session_with(vec![(Role::User, &long)]);

    let plan = build_prompt(&session, 30);
    assert_eq!(plan.messages.len(), 1);
    assert!(plan.truncated);
    assert!(plan.messages[0].text.ends_with(TRUNCATION_MARKER));
    assert!(plan.messages[0].size() <= 30);
}

#[test]
fn it_never_drops_the_newest_message() {
    let session = session_with(vec![
        (Role::User, "old context that is fairly long"),
        (Role::User, "newest"),
    ]);

    let plan = build_prompt(&session, 10);
    assert_eq!(texts(&plan), vec!["newest"]);
}

#[test]
fn it_is_deterministic() {
    let session = session_with(vec![
        (Role::User, "aaaaaaaaaa"),
        (Role::Assistant, "bbbbbbbbbb"),
        (Role::User, "cccccccccc"),
    ]);

    let first = build_prompt(&session, 25);
    let second = build_prompt(&session, 25);
    assert_eq!(texts(&first), texts(&second));
    assert_eq!(first.size, second.size);
    assert_eq!(first.truncated, second.truncated);
}

#[test]
fn it_renders_role_prefixed_prompts() {
    let session = session_with(vec![
        (Role::User, "hello"),
        (Role::Assistant, "hi, how can I help?"),
    ]);

    let plan = build_prompt(&session, 100);
    insta::assert_snapshot!(plan.render(), @r###"
    User: hello

    Assistant: hi, how can I help?
    "###);
}
