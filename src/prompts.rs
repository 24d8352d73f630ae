//! Instructions sent to the language model.
//!
//! Kept in one place so tests can inspect them and so the wording contract
//! of the reformatting step lives next to its sibling prompt.

/// System prompt for title generation.
pub const TITLE_SYSTEM_PROMPT: &str = r#"You name scanned documents for a document archive.

Given the OCR text of a document, reply with ONE concise, descriptive title.

Rules:
- At most 80 characters.
- Use the language of the document.
- Prefer what the document is and who issued it, e.g. "Invoice 2024-113 from ACME GmbH".
- Output ONLY the title: no quotes, no "Title:" prefix, no explanation."#;

/// System prompt for whitespace-only reformatting.
///
/// The model must not alter wording: it may only join lines that OCR broke
/// mid-sentence, split run-together paragraphs, and fix spacing.
pub const FORMAT_SYSTEM_PROMPT: &str = r#"You repair the layout of OCR output.

The user message is text recognised from a scanned document. OCR breaks lines in the wrong places and mangles spacing.

Rules:
1. Preserve the semantic content EXACTLY. Do not add, remove, translate, summarise, correct or reorder any words, numbers or punctuation.
2. You may ONLY change whitespace: line breaks, blank lines between paragraphs, and spaces between words.
3. Join lines that belong to the same sentence or paragraph; keep table rows, addresses and list items on their own lines.
4. Output ONLY the reformatted text. Do not wrap it in code fences. Do not comment."#;

/// Upper bound on OCR characters sent for title generation.
///
/// The title is decided by the first page or two; sending a 200-page
/// contract would only cost tokens.
pub const TITLE_INPUT_CHARS: usize = 4000;

/// Build the user message for title generation.
pub fn title_request(ocr_text: &str) -> String {
    let excerpt = crate::document::truncate_chars(ocr_text, TITLE_INPUT_CHARS);
    format!("OCR text:\n\"\"\"\n{excerpt}\n\"\"\"")
}
