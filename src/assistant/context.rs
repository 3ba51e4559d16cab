//! Assistant narration context kinds.

use serde::{Deserialize, Serialize};

/// Why the assistant is being asked to narrate. Each kind has its own
/// prompt template in [`crate::assistant::service::AssistantService`] — the
/// narration is never generic "something happened" text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssistantContextKind {
    /// Gate2 stopped the pipeline before any provider call was made.
    GateFail,
    /// The query was too ambiguous to search; ask the user a clarifying
    /// question instead of guessing.
    Clarify,
    /// A completed search's results are ready to be summarized.
    Summary,
    /// The search ran but produced no usable results.
    SearchFailed,
}

/// A single narrated message, published on the `assistant` WS channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub kind: AssistantContextKind,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}
