use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub organic_results: Option<Vec<OrganicResult>>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrganicResult {
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub link: Option<String>,
}

/// One normalized web search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRecord {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

impl From<OrganicResult> for SearchRecord {
    fn from(result: OrganicResult) -> Self {
        Self {
            title: result.title.unwrap_or_default(),
            snippet: result.snippet.unwrap_or_default(),
            link: result.link.unwrap_or_default(),
        }
    }
}
