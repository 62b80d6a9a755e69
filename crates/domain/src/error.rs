/// Shared error type used across all pixagent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// A turn sequence was rejected by the backend's message validation.
    #[error("validation: {0}")]
    Validation(String),

    #[error("tool {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("backend {backend}: {message}")]
    Backend { backend: String, message: String },

    /// A decision was submitted for an unknown or already-resolved call.
    #[error("confirmation conflict for call {call_id}: {reason}")]
    ConfirmationConflict { call_id: String, reason: String },

    /// Two turns share an id. The store is corrupt; not recoverable in-process.
    #[error("turn id collision: {0}")]
    TurnIdCollision(String),

    #[error("unknown turn: {0}")]
    UnknownTurn(String),

    #[error("a turn is already in progress")]
    Busy,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Store-level corruption that needs process-level intervention.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TurnIdCollision(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
