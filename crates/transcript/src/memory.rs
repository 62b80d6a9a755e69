//! In-process transcript store.

use parking_lot::RwLock;

use px_domain::error::Result;
use px_domain::trace::TraceEvent;
use px_domain::turn::{Role, Turn};

use crate::{check_unique, replace_in, TranscriptStore};

/// Transcript kept in memory; lost when the process exits.
#[derive(Default)]
pub struct MemoryTranscript {
    turns: RwLock<Vec<Turn>>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing turns (tests, imports).
    pub fn with_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: RwLock::new(turns),
        }
    }
}

impl TranscriptStore for MemoryTranscript {
    fn turns(&self) -> Result<Vec<Turn>> {
        Ok(self.turns.read().clone())
    }

    fn append(&self, turn: Turn) -> Result<()> {
        let mut turns = self.turns.write();
        check_unique(&turns, &turn)?;
        TraceEvent::TranscriptAppend {
            turn_id: turn.id.clone(),
            role: role_str(turn.role).into(),
            parts: turn.parts.len(),
        }
        .emit();
        turns.push(turn);
        Ok(())
    }

    fn replace(&self, turn: Turn) -> Result<()> {
        let id = turn.id.clone();
        replace_in(&mut self.turns.write(), turn)?;
        TraceEvent::TranscriptReplace { turn_id: id }.emit();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut turns = self.turns.write();
        TraceEvent::TranscriptCleared { turns: turns.len() }.emit();
        turns.clear();
        Ok(())
    }

    fn get(&self, turn_id: &str) -> Result<Option<Turn>> {
        Ok(self.turns.read().iter().find(|t| t.id == turn_id).cloned())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.turns.read().len())
    }
}

pub(crate) fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_domain::error::Error;
    use px_domain::turn::Part;

    #[test]
    fn append_preserves_insertion_order() {
        let store = MemoryTranscript::new();
        store.append(Turn::user("one")).unwrap();
        store.append(Turn::system("two")).unwrap();
        store.append(Turn::user("three")).unwrap();

        let texts: Vec<String> = store.turns().unwrap().iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn duplicate_id_is_a_collision() {
        let store = MemoryTranscript::new();
        let turn = Turn::user("hi");
        store.append(turn.clone()).unwrap();

        let err = store.append(turn).unwrap_err();
        assert!(matches!(err, Error::TurnIdCollision(_)));
        assert!(err.is_fatal());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn replace_keeps_position() {
        let store = MemoryTranscript::new();
        let first = Turn::user("a");
        store.append(first.clone()).unwrap();
        store.append(Turn::user("b")).unwrap();

        let mut edited = first.clone();
        edited.parts.push(Part::text("!"));
        store.replace(edited).unwrap();

        let turns = store.turns().unwrap();
        assert_eq!(turns[0].id, first.id);
        assert_eq!(turns[0].text(), "a!");
        assert_eq!(turns[1].text(), "b");
    }

    #[test]
    fn replace_unknown_turn_fails() {
        let store = MemoryTranscript::new();
        let err = store.replace(Turn::user("ghost")).unwrap_err();
        assert!(matches!(err, Error::UnknownTurn(_)));
    }

    #[test]
    fn clear_empties_store() {
        let store = MemoryTranscript::with_turns(vec![Turn::user("a"), Turn::user("b")]);
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let store = std::sync::Arc::new(MemoryTranscript::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        store.append(Turn::user(format!("{i}-{j}"))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len().unwrap(), 400);
    }
}
