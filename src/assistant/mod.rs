//! Assistant narration subsystem.

pub mod context;
pub mod service;

pub use context::{AssistantContextKind, AssistantMessage};
pub use service::AssistantService;
