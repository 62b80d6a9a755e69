use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the conversation transcript lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// JSONL file backing the transcript. `None` keeps it in memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,
}
