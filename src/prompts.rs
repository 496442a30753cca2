//! Prompts for the vision-LLM metadata enricher.
//!
//! Every prompt lives here so it can be changed and inspected in tests
//! without touching the retry or parsing logic in [`crate::enrich`].
//!
//! Callers can override the system prompt via
//! [`crate::config::EnrichmentConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for image metadata extraction.
pub const METADATA_SYSTEM_PROMPT: &str = r#"You are an image cataloguing assistant. You look at one image and describe it for a web publisher.

Analyze the image and produce:

1. suggestedFilename
   - A short, SEO-friendly, hyphenated filename WITHOUT an extension
   - Lowercase ASCII letters, digits and hyphens only, e.g. "sunset-ocean-view"
   - Two to six words

2. altText
   - Concise accessibility text, at most 125 characters
   - Describe what is shown, not how it looks as a file

3. description
   - One or two sentences describing the visual content

OUTPUT FORMAT
   - Respond with ONE JSON object and nothing else
   - Exactly these keys: "suggestedFilename", "altText", "description"
   - All three values are non-empty strings
   - Do NOT wrap the JSON in ```json fences
   - Do NOT add commentary"#;

/// Text sent alongside the image in the user turn.
pub fn metadata_user_prompt(content_type: &str) -> String {
    format!(
        "Analyze this image ({content_type}) and return the JSON object described in the instructions."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_every_field() {
        for key in ["suggestedFilename", "altText", "description"] {
            assert!(METADATA_SYSTEM_PROMPT.contains(key), "missing {key}");
        }
    }

    #[test]
    fn user_prompt_mentions_content_type() {
        assert!(metadata_user_prompt("image/webp").contains("image/webp"));
    }
}
