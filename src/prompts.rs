//! Extraction prompts sent alongside each page image.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing the instructions (e.g. how missing
//!    values are reported) requires editing exactly one place.
//!
//! 2. **Testability**: unit tests inspect the built prompt directly without
//!    spinning up a real model, so prompt regressions are easy to catch.

use crate::output::ExtractionField;

/// Instructions appended after the field list.
///
/// The response parser in [`crate::pipeline::postprocess`] relies on rules 3
/// and 4: a JSON object keyed by field name, `null` for absent values.
pub const EXTRACTION_INSTRUCTIONS: &str = r#"Instructions:
1. Analyze the document image carefully
2. Extract only the requested information
3. Return the results as a single valid JSON object whose keys are exactly the field names listed above
4. Use null for fields that cannot be found
5. Be precise and accurate
6. Do NOT add commentary or wrap the JSON in markdown fences"#;

/// Build the user prompt for one page from the requested fields.
pub fn extraction_prompt(fields: &[ExtractionField]) -> String {
    let field_lines = fields
        .iter()
        .map(|f| {
            if f.description.trim().is_empty() {
                format!("- \"{}\"", f.field_name)
            } else {
                format!("- \"{}\": {}", f.field_name, f.description.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Extract the following specific information from this document image:\n\n\
         {field_lines}\n\n\
         {EXTRACTION_INSTRUCTIONS}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_field() {
        let fields = vec![
            ExtractionField::new("drawing_number", "Sheet identifier in the title block"),
            ExtractionField::new("scale", ""),
        ];
        let prompt = extraction_prompt(&fields);
        assert!(prompt.contains("- \"drawing_number\": Sheet identifier in the title block"));
        assert!(prompt.contains("- \"scale\"\n"));
        assert!(prompt.ends_with(EXTRACTION_INSTRUCTIONS));
    }

    #[test]
    fn prompt_asks_for_null_on_missing() {
        let prompt = extraction_prompt(&[ExtractionField::new("a", "b")]);
        assert!(prompt.contains("Use null"));
        assert!(prompt.contains("JSON object"));
    }
}
