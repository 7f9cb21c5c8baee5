//! Display names for the backend's tools.

/// Known tools and the titles shown for them.
const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("rag_search", "Knowledge base search"),
    ("rag_search_multiple", "Multi-query knowledge base search"),
    ("filtered_search", "Filtered document search"),
    ("web_search", "Web search"),
    ("tavily_search", "Web search"),
    ("python", "Run Python"),
    ("files", "File access"),
];

/// Title for a tool step. Unknown tools fall back to a title built from the
/// raw name so a new backend tool still renders.
pub fn display_name(tool: &str) -> String {
    let tool = tool.trim();
    if let Some((_, title)) = DISPLAY_NAMES.iter().find(|(name, _)| *name == tool) {
        return (*title).to_string();
    }
    if tool.is_empty() {
        return "Tool call".to_string();
    }
    let words = tool.replace(['_', '-'], " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Tool call".to_string(),
    }
}
