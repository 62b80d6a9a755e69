pub mod openai_compat;
pub mod registry;
pub mod scripted;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatBackend;
pub use registry::build_backend;
pub use scripted::{ScriptedBackend, ScriptedStep};
pub use traits::{GenerateRequest, GenerativeBackend};
