//! Fact extraction: prompt construction and the chat-completion client.

pub mod client;
pub mod prompt;
pub mod types;

pub use client::{ChatClient, CompletionClient};

use tracing::{info, warn};

use crate::search::SearchRecord;
use types::{Message, Sampling};

pub const ERROR_PREFIX: &str = "Error processing:";

/// Outcome of one extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Extracted(String),
    Failed(String),
}

impl Extraction {
    /// Text stored in the result table. Failures become `Error processing: <reason>`.
    pub fn text(&self) -> String {
        match self {
            Extraction::Extracted(text) => text.clone(),
            Extraction::Failed(reason) => format!("{ERROR_PREFIX} {reason}"),
        }
    }
}

/// Asks the model to pull the fact requested by `template` about `entity`
/// out of `records`. Never fails; errors come back as [`Extraction::Failed`].
pub async fn extract(
    llm: &impl CompletionClient,
    entity: &str,
    records: &[SearchRecord],
    template: &str,
) -> Extraction {
    let messages = [
        Message::system(prompt::SYSTEM_PROMPT),
        Message::user(prompt::build_user_prompt(entity, template, records)),
    ];

    match llm.complete(&messages, Sampling::EXTRACTION).await {
        Ok(text) => {
            info!(entity, "entity processed");
            Extraction::Extracted(text)
        }
        Err(e) => {
            warn!(error = %e, entity, "extraction failed");
            Extraction::Failed(e.to_string())
        }
    }
}
