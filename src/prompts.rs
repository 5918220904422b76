//! Prompt builders for the field-extraction request.
//!
//! Prompts are pure functions of their inputs so they can be inspected in
//! unit tests without a language model. Callers can override the system
//! prompt via [`crate::config::ExtractionConfig::system_prompt`]; the builders
//! here are used only when no override is provided.

/// Build the system instruction for a Target Field Set.
///
/// The instruction names the exact fields and states the four extraction
/// rules: semantic key matching, `null` for missing values, string values
/// only, and no extra fields.
pub fn system_prompt<S: AsRef<str>>(fields: &[S]) -> String {
    let keys = fields
        .iter()
        .map(|f| f.as_ref())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are an expert at extracting data from unstructured documents. Given the Markdown content from a PDF, extract values for the following keys only: {keys}.
- Match keys semantically (e.g., 'Invoice No' matches 'invoice_number').
- If a value is not found, use null.
- Output ONLY valid JSON in this exact schema like keys are sent.
- Values should be strings; parse numbers/dates as strings.
- Do not add extra fields or explanations."#
    )
}

/// Build the user message carrying one document's Markdown.
pub fn user_prompt(markdown: &str, filename: &str) -> String {
    format!("Extract data from this document Markdown:\n\n{markdown}\n\nFilename: {filename}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_lists_fields_in_order() {
        let p = system_prompt(&["invoice_number", "MAWB", "HAWB", "Name"]);
        assert!(p.contains("following keys only: invoice_number, MAWB, HAWB, Name."));
    }

    #[test]
    fn system_prompt_states_extraction_rules() {
        let p = system_prompt(&["total"]);
        assert!(p.contains("'Invoice No' matches 'invoice_number'"));
        assert!(p.contains("use null"));
        assert!(p.contains("Values should be strings"));
        assert!(p.contains("Do not add extra fields"));
    }

    #[test]
    fn system_prompt_accepts_owned_strings() {
        let fields = vec!["a".to_string(), "b".to_string()];
        assert!(system_prompt(&fields).contains("keys only: a, b."));
    }

    #[test]
    fn user_prompt_carries_markdown_and_filename() {
        let p = user_prompt("# Invoice\n\n| No | 42 |", "a.pdf");
        assert!(p.starts_with("Extract data from this document Markdown:\n\n# Invoice"));
        assert!(p.ends_with("\n\nFilename: a.pdf"));
    }

    #[test]
    fn user_prompt_with_empty_markdown() {
        assert_eq!(
            user_prompt("", "x.pdf"),
            "Extract data from this document Markdown:\n\n\n\nFilename: x.pdf"
        );
    }
}
