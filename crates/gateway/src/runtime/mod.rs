//! Core runtime: the conversation pipeline.
//!
//! A cycle runs sanitize → gate → settle earlier tool calls → generation
//! steps with confirmation-aware tool dispatch → persist. [`Agent`] is the
//! entry point; [`Scheduler`] injects system turns on timers.

pub mod agent;
pub mod cancel;
pub mod confirm;
pub mod gate;
pub mod orchestrator;
pub mod policy;
pub mod sanitize;
pub mod scheduler;
pub mod view;

pub use agent::Agent;
pub use cancel::{ActiveCycle, CancelToken, CycleLease};
pub use confirm::{ConfirmationBook, PendingConfirmation, REJECTED_BY_USER};
pub use gate::ToolGate;
pub use orchestrator::{CycleInput, OutputStream};
pub use policy::{StepOutcome, StopPolicy, StopRule};
pub use sanitize::sanitize;
pub use scheduler::{ScheduleSpec, ScheduledTask, Scheduler};
