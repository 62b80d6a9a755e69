//! Append-only JSONL transcript.
//!
//! One turn per line. Appends write a single line; `replace` and `clear`
//! rewrite the file through a temp file and rename. The whole transcript
//! is held in a write-through cache so reads never touch disk after open.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use px_domain::error::{Error, Result};
use px_domain::trace::TraceEvent;
use px_domain::turn::Turn;

use crate::memory::role_str;
use crate::{check_unique, replace_in, TranscriptStore};

pub struct JsonlTranscript {
    path: PathBuf,
    cache: RwLock<Vec<Turn>>,
}

impl JsonlTranscript {
    /// Open (or create) the transcript at `path`, loading existing turns.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let turns = read_jsonl_file(path)?;

        tracing::info!(
            turns = turns.len(),
            path = %path.display(),
            "transcript loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            cache: RwLock::new(turns),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rewrite(&self, turns: &[Turn]) -> Result<()> {
        let buf = serialize_turns(turns)?;
        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, buf)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TranscriptStore for JsonlTranscript {
    fn turns(&self) -> Result<Vec<Turn>> {
        Ok(self.cache.read().clone())
    }

    fn append(&self, turn: Turn) -> Result<()> {
        let mut cache = self.cache.write();
        check_unique(&cache, &turn)?;

        // Write to disk first; only update cache if I/O succeeds.
        let buf = serialize_turns(std::slice::from_ref(&turn))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;

        TraceEvent::TranscriptAppend {
            turn_id: turn.id.clone(),
            role: role_str(turn.role).into(),
            parts: turn.parts.len(),
        }
        .emit();
        cache.push(turn);
        Ok(())
    }

    fn replace(&self, turn: Turn) -> Result<()> {
        let mut cache = self.cache.write();
        let id = turn.id.clone();
        let mut next = cache.clone();
        replace_in(&mut next, turn)?;
        self.rewrite(&next)?;
        *cache = next;
        TraceEvent::TranscriptReplace { turn_id: id }.emit();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write();
        self.rewrite(&[])?;
        TraceEvent::TranscriptCleared { turns: cache.len() }.emit();
        cache.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.cache.read().len())
    }
}

/// Serialize turns to a JSONL string.
fn serialize_turns(turns: &[Turn]) -> Result<String> {
    let mut buf = String::new();
    for turn in turns {
        let json = serde_json::to_string(turn)
            .map_err(|e| Error::Other(format!("serializing turn {}: {e}", turn.id)))?;
        buf.push_str(&json);
        buf.push('\n');
    }
    Ok(buf)
}

/// Read and parse a JSONL transcript file. Malformed lines are skipped.
fn read_jsonl_file(path: &Path) -> Result<Vec<Turn>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)?;
    let mut turns: Vec<Turn> = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Turn>(line) {
            Ok(turn) => {
                check_unique(&turns, &turn)?;
                turns.push(turn);
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed transcript line"
                );
            }
        }
    }
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_domain::turn::{Part, ToolCallPart};

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");

        let store = JsonlTranscript::open(&path).unwrap();
        store.append(Turn::user("show me cats")).unwrap();
        store
            .append(Turn::assistant(vec![Part::ToolCall(ToolCallPart::ready(
                "c1",
                "search_unsplash_photos",
                serde_json::json!({"query": "cats"}),
            ))]))
            .unwrap();
        drop(store);

        let reopened = JsonlTranscript::open(&path).unwrap();
        let turns = reopened.turns().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text(), "show me cats");
        assert!(turns[1].has_tool_calls());
    }

    #[test]
    fn replace_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let store = JsonlTranscript::open(&path).unwrap();

        let mut tc = ToolCallPart::ready("c1", "search", serde_json::json!({}));
        let turn = Turn::assistant(vec![Part::ToolCall(tc.clone())]);
        store.append(turn.clone()).unwrap();

        tc.succeed("done").unwrap();
        let mut updated = turn.clone();
        updated.parts = vec![Part::ToolCall(tc)];
        store.replace(updated).unwrap();

        let reopened = JsonlTranscript::open(&path).unwrap();
        let stored = reopened.get(&turn.id).unwrap().unwrap();
        let call = stored.tool_calls().next().unwrap();
        assert_eq!(call.output.as_deref(), Some("done"));
    }

    #[test]
    fn clear_truncates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let store = JsonlTranscript::open(&path).unwrap();
        store.append(Turn::user("a")).unwrap();
        store.clear().unwrap();

        assert!(store.is_empty().unwrap());
        assert!(JsonlTranscript::open(&path).unwrap().is_empty().unwrap());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let good = serde_json::to_string(&Turn::user("ok")).unwrap();
        std::fs::write(&path, format!("{good}\nnot json\n\n")).unwrap();

        let store = JsonlTranscript::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn duplicate_ids_on_disk_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let line = serde_json::to_string(&Turn::user("dup")).unwrap();
        std::fs::write(&path, format!("{line}\n{line}\n")).unwrap();

        let err = JsonlTranscript::open(&path).err().unwrap();
        assert!(err.is_fatal());
    }
}
