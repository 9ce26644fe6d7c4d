//! Paragraph collection and section bounding

use scraper::ElementRef;

use super::{ContentExtractor, ExtractError};
use crate::config::SectionBounds;

/// Element text with whitespace runs collapsed and the ends trimmed
pub(crate) fn normalized_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive "heading begins with marker" test
fn is_marker(text: &str, marker: &str) -> bool {
    let marker = marker.trim();
    text.len() >= marker.len()
        && text
            .get(..marker.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(marker))
}

fn is_heading(element: ElementRef<'_>) -> bool {
    matches!(element.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

impl ContentExtractor {
    /// Non-empty paragraph texts of a container, in document order
    pub(super) fn paragraphs(&self, container: ElementRef<'_>) -> Vec<String> {
        container
            .select(&self.paragraph_selector)
            .map(normalized_text)
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Paragraph texts between the start and end marker blocks.
    ///
    /// Markers may be headings or paragraphs (EUR-Lex styles section titles
    /// as classed `<p>` elements). The marker blocks themselves are excluded.
    /// Both markers are required: a page missing either one yields an error
    /// rather than an unbounded section.
    pub(super) fn bounded_paragraphs(
        &self,
        container: ElementRef<'_>,
        bounds: &SectionBounds,
    ) -> Result<Vec<String>, ExtractError> {
        let mut inside = false;
        let mut collected = Vec::new();

        for block in container.select(&self.block_selector) {
            let text = normalized_text(block);

            if !inside {
                inside = is_marker(&text, &bounds.start);
                continue;
            }

            if is_marker(&text, &bounds.end) {
                return Ok(collected);
            }

            if !is_heading(block) && !text.is_empty() {
                collected.push(text);
            }
        }

        if inside {
            Err(ExtractError::SectionEndNotFound(bounds.end.clone()))
        } else {
            Err(ExtractError::SectionNotFound(bounds.start.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_marker() {
        assert!(is_marker("Grounds", "grounds"));
        assert!(is_marker("On those grounds, the Court hereby rules:", "On those grounds"));
        assert!(!is_marker("Ground", "Grounds"));
        assert!(!is_marker("The grounds", "grounds"));
    }
}
