//! Shared types for the pixagent conversation pipeline.

pub mod config;
pub mod error;
pub mod stream;
pub mod tool;
pub mod trace;
pub mod turn;
