//! Tool contracts for pixagent: the executor trait, the registry of all
//! known tools, the per-turn catalog, and the built-in photo search.

pub mod registry;
pub mod unsplash;

pub use registry::{ToolCatalog, ToolContract, ToolError, ToolExecutor, ToolRegistry};
pub use unsplash::UnsplashSearch;
