//! Markdown cleanup applied after OCR, before the text is returned.
//!
//! The intended rules drop the trailing References, Acknowledgments and
//! Appendix sections of a paper, which rarely help a reader model and cost a
//! lot of context. None are active yet: [`cleanup_markdown`] returns its
//! input unchanged and callers must not rely on any transformation.

/// Clean OCR output. Currently the identity function.
pub fn cleanup_markdown(markdown: String) -> String {
    // TODO: strip `## References` / `## Acknowledgments` / `## Appendix`
    // sections once heading detection handles OCR'd numbering like "7 References".
    markdown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_text_through_unchanged() {
        let md = "# Title\n\nBody.\n\n## References\n\n[1] A. Author. 2020.\n\n## Appendix\n\nExtra.\n";
        assert_eq!(cleanup_markdown(md.to_string()), md);
    }

    #[test]
    fn empty_input() {
        assert_eq!(cleanup_markdown(String::new()), "");
    }
}
