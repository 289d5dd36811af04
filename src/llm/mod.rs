//! The boundary to the language model service.

mod openai;
mod provider;

pub use openai::OpenAiCompatibleProvider;
pub use provider::{CompletionRequest, Prompt, ProviderError, StructuredCompletionProvider};

/// Remove a markdown code fence wrapped around model output, e.g.
/// "```sql\nSELECT 1\n```" becomes "SELECT 1".
///
/// Text without a fence is only trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);

    let body = match rest.split_once('\n') {
        // The first line is the language tag, e.g. "json" or "sql".
        Some((tag, body)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        Some(_) => rest,
        None => strip_inline_language_tag(rest),
    };

    body.trim()
}

fn strip_inline_language_tag(text: &str) -> &str {
    let text = text.trim_start();

    for tag in ["sql", "sqlite", "json"] {
        if let Some(prefix) = text.get(..tag.len())
            && prefix.eq_ignore_ascii_case(tag)
            && text[tag.len()..].starts_with(char::is_whitespace)
        {
            return &text[tag.len()..];
        }
    }

    text
}
