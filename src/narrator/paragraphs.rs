//! Paragraph splitting for narration.

/// Separator between paragraph units.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split text into paragraph units at blank-line separators.
///
/// Entries that are empty or whitespace-only are dropped. The kept
/// paragraphs are returned as written, without trimming.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split(PARAGRAPH_SEPARATOR)
        .filter(|p| !is_blank(p))
        .map(str::to_string)
        .collect()
}

/// Whether a paragraph has nothing to speak.
pub fn is_blank(paragraph: &str) -> bool {
    paragraph.trim().is_empty()
}
