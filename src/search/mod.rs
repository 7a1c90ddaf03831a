//! Web search: SerpAPI client and normalized search records.

pub mod client;
pub mod types;

pub use client::{SearchProvider, SerpApiClient};
pub use types::SearchRecord;
