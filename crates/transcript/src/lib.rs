//! Transcript storage for pixagent.
//!
//! The transcript is the single source of truth for conversation state:
//! an ordered, append-friendly sequence of turns. Two implementations ship
//! here: an in-memory store and an append-only JSONL file with a
//! write-through cache.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlTranscript;
pub use memory::MemoryTranscript;

use px_domain::error::Result;
use px_domain::turn::Turn;

/// Storage contract for the conversation transcript.
///
/// Every method is atomic with respect to every other: concurrent appends
/// never tear or drop turns. Order is insertion order; turns are only
/// removed by [`TranscriptStore::clear`].
pub trait TranscriptStore: Send + Sync {
    /// Snapshot of all turns in insertion order.
    fn turns(&self) -> Result<Vec<Turn>>;

    /// Append a new turn. Fails with `TurnIdCollision` if the id is taken.
    fn append(&self, turn: Turn) -> Result<()>;

    /// Replace the stored turn with the same id, keeping its position.
    fn replace(&self, turn: Turn) -> Result<()>;

    /// Remove every turn.
    fn clear(&self) -> Result<()>;

    fn get(&self, turn_id: &str) -> Result<Option<Turn>> {
        Ok(self.turns()?.into_iter().find(|t| t.id == turn_id))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.turns()?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Apply `replace` semantics to an in-memory turn list.
pub(crate) fn replace_in(turns: &mut [Turn], turn: Turn) -> Result<()> {
    match turns.iter_mut().find(|t| t.id == turn.id) {
        Some(slot) => {
            *slot = turn;
            Ok(())
        }
        None => Err(px_domain::error::Error::UnknownTurn(turn.id)),
    }
}

/// Reject an append whose id is already present.
pub(crate) fn check_unique(turns: &[Turn], turn: &Turn) -> Result<()> {
    if turns.iter().any(|t| t.id == turn.id) {
        tracing::error!(turn_id = %turn.id, "turn id collision in transcript store");
        return Err(px_domain::error::Error::TurnIdCollision(turn.id.clone()));
    }
    Ok(())
}
