/// Keyword prefilter run before any scoring call.
use tracing::debug;

use super::BugAnalysis;
use crate::corpus::CodeChunk;

/// Fewest retained chunks for the filter to take effect.
pub const DEFAULT_MIN_RETAINED: usize = 3;

/// Keep chunks whose content contains any search term (case-insensitive
/// substring). Returns the full input when there are no terms or fewer than
/// `min_retained` chunks match. Input order is preserved.
pub fn prefilter<'a>(
    analysis: &BugAnalysis,
    chunks: &'a [CodeChunk],
    min_retained: usize,
) -> Vec<&'a CodeChunk> {
    let terms: Vec<String> = analysis
        .search_terms()
        .into_iter()
        .map(str::to_lowercase)
        .collect();
    if terms.is_empty() {
        return chunks.iter().collect();
    }

    let retained: Vec<&CodeChunk> = chunks
        .iter()
        .filter(|chunk| {
            let content = chunk.content.to_lowercase();
            terms.iter().any(|term| content.contains(term.as_str()))
        })
        .collect();

    debug!(
        "Prefilter matched {}/{} chunks (minimum {min_retained})",
        retained.len(),
        chunks.len()
    );

    if retained.len() < min_retained {
        chunks.iter().collect()
    } else {
        retained
    }
}
