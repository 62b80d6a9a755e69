//! Behaviour shared by every `TranscriptStore` implementation.

use std::sync::Arc;

use px_domain::error::Error;
use px_domain::turn::{Part, Role, ToolCallPart, ToolCallState, Turn};
use px_transcript::{JsonlTranscript, MemoryTranscript, TranscriptStore};
use serde_json::json;

fn stores(dir: &tempfile::TempDir) -> Vec<(&'static str, Arc<dyn TranscriptStore>)> {
    vec![
        ("memory", Arc::new(MemoryTranscript::new())),
        (
            "jsonl",
            Arc::new(JsonlTranscript::open(&dir.path().join("t.jsonl")).unwrap()),
        ),
    ]
}

#[test]
fn concurrent_appends_keep_every_turn() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in stores(&dir) {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.append(Turn::user(format!("{worker}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let turns = store.turns().unwrap();
        assert_eq!(turns.len(), 200, "{name}");

        // Each worker's own turns stay in the order it wrote them.
        for worker in 0..8 {
            let seq: Vec<_> = turns
                .iter()
                .map(Turn::text)
                .filter(|t| t.starts_with(&format!("{worker}-")))
                .collect();
            let expected: Vec<_> = (0..25).map(|i| format!("{worker}-{i}")).collect();
            assert_eq!(seq, expected, "{name}");
        }
    }
}

#[test]
fn replace_and_collision_rules_match() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in stores(&dir) {
        let first = Turn::user("one");
        store.append(first.clone()).unwrap();
        store.append(Turn::user("two")).unwrap();

        assert!(
            matches!(store.append(first.clone()), Err(Error::TurnIdCollision(_))),
            "{name}"
        );
        assert!(
            matches!(store.replace(Turn::user("ghost")), Err(Error::UnknownTurn(_))),
            "{name}"
        );

        let mut edited = first.clone();
        edited.parts = vec![Part::text("one, edited")];
        store.replace(edited).unwrap();

        let texts: Vec<_> = store.turns().unwrap().iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["one, edited", "two"], "{name}");
    }
}

#[test]
fn tool_call_lifecycle_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.jsonl");

    let mut call = ToolCallPart::ready("call_1", "search_unsplash_photos", json!({"query": "fox"}));
    call.await_confirmation().unwrap();
    let mut assistant = Turn::assistant(vec![Part::text("One moment. "), Part::ToolCall(call)]);
    {
        let store = JsonlTranscript::open(&path).unwrap();
        store.append(Turn::user("show me a fox")).unwrap();
        store.append(assistant.clone()).unwrap();

        if let Some(Part::ToolCall(tc)) = assistant.parts.get_mut(1) {
            tc.succeed("Found 1 photo").unwrap();
        }
        store.replace(assistant.clone()).unwrap();
    }

    let reopened = JsonlTranscript::open(&path).unwrap();
    let turns = reopened.turns().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1], assistant);

    let tc = turns[1].tool_calls().next().unwrap();
    assert_eq!(tc.state, ToolCallState::Executed);
    assert_eq!(tc.output.as_deref(), Some("Found 1 photo"));
}
