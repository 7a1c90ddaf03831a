use crate::search::SearchRecord;

pub const ENTITY_PLACEHOLDER: &str = "{entity}";

pub const SYSTEM_PROMPT: &str = "You are an AI assistant that extracts specific information from web search results.
Analyze the provided search results and extract the requested information.
If the information is not found, indicate that it's not available.
Provide your response in a clear, structured format.";

/// Replaces every `{entity}` in `template` with `entity`.
pub fn substitute_entity(template: &str, entity: &str) -> String {
    template.replace(ENTITY_PLACEHOLDER, entity)
}

pub fn build_context(records: &[SearchRecord]) -> String {
    records
        .iter()
        .map(|r| format!("Title: {}\nSnippet: {}\nURL: {}", r.title, r.snippet, r.link))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_user_prompt(entity: &str, template: &str, records: &[SearchRecord]) -> String {
    format!(
        "Entity: {entity}\nSearch Query: {query}\n\nSearch Results:\n{context}\n\nPlease extract the requested information from these search results.",
        query = substitute_entity(template, entity),
        context = build_context(records),
    )
}
