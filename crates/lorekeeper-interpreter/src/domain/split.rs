//! Narrative / structured-block split.
//!
//! The model wraps its hidden block in `<<STATE>>` ... `<</STATE>>`. Text
//! outside the delimiters is narrative. A missing closing delimiter (the
//! response was cut off) takes the rest of the text as the block.

use serde_json::Value;

/// Opens the hidden block.
pub const OPEN_DELIMITER: &str = "<<STATE>>";
/// Closes the hidden block.
pub const CLOSE_DELIMITER: &str = "<</STATE>>";

/// Model output split into its two parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Player-visible text, trimmed.
    pub narrative: String,
    /// The hidden block with any code fence removed. `None` when absent or empty.
    pub block: Option<String>,
}

/// Splits `raw` into narrative and hidden block. Absence of a block is valid.
#[must_use]
pub fn split(raw: &str) -> Split {
    let Some((before, rest)) = raw.split_once(OPEN_DELIMITER) else {
        return Split {
            narrative: raw.trim().to_owned(),
            block: None,
        };
    };

    let (block, after) = rest.split_once(CLOSE_DELIMITER).unwrap_or((rest, ""));
    let narrative = match (before.trim(), after.trim()) {
        (before, "") => before.to_owned(),
        ("", after) => after.to_owned(),
        (before, after) => format!("{before}\n\n{after}"),
    };
    let block = strip_code_fence(block);

    Split {
        narrative,
        block: (!block.is_empty()).then(|| block.to_owned()),
    }
}

/// Removes a surrounding Markdown code fence (with or without a language tag).
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let body = body.split_once('\n').map_or("", |(_, rest)| rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the JSON a job expects from the model: the hidden block when one
/// is present, otherwise the whole (fence-stripped) response.
#[must_use]
pub fn extract_json(raw: &str) -> Option<Value> {
    let parts = split(raw);
    let candidate = match parts.block {
        Some(block) => block,
        None => strip_code_fence(raw).to_owned(),
    };
    serde_json::from_str(&candidate).ok()
}
