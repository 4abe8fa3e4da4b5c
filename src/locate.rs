//! Text span location against a live document tree.
//!
//! Exact search is the primary path: the first text node (document order)
//! containing the target as a substring wins outright. The approximate
//! fallback exists for pages whose wording drifted since the highlight was
//! created; it is deliberately permissive, accepts the first qualifying
//! candidate without scoring, and its observable behavior must stay as-is:
//! tightening the heuristic changes which highlights reappear on real pages.

use crate::dom::Document;
use ego_tree::NodeId;

/// A located span inside a single text node.
///
/// Offsets are byte positions into that node's text, always on char
/// boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMatch {
    /// Text node containing the span.
    pub node: NodeId,
    /// Byte offset of the span start.
    pub start: usize,
    /// Exclusive byte offset of the span end.
    pub end: usize,
}

/// Minimum accepted fragment length for approximate matching, in characters.
pub fn min_match_len(target: &str) -> usize {
    (target.chars().count() / 2).max(3)
}

/// Finds `target` under `root`, exact first, approximate as a last resort.
pub fn locate(document: &Document, root: NodeId, target: &str) -> Option<TextMatch> {
    find_exact(document, root, target).or_else(|| find_approximate(document, root, target))
}

/// First text node under `root` (document order) containing `target` verbatim.
///
/// First-match, not best-match: ties break by document order, earliest wins.
pub fn find_exact(document: &Document, root: NodeId, target: &str) -> Option<TextMatch> {
    if target.is_empty() {
        return None;
    }
    for node in document.text_nodes(root) {
        let Some(text) = document.node_text(node) else {
            continue;
        };
        if let Some(start) = text.find(target) {
            return Some(TextMatch {
                node,
                start,
                end: start + target.len(),
            });
        }
    }
    None
}

/// Permissive partial-match fallback.
///
/// Accepts the first node substring of at least [`min_match_len`] characters
/// that is itself contained in `target`, scanning offsets left to right and
/// lengths shortest first. False positives are expected and accepted; this is
/// a heuristic, not a proof of identity. Cost is quadratic in node text length
/// (worse counting the containment check), so callers invoke it only after
/// exact search over the whole document has failed.
pub fn find_approximate(document: &Document, root: NodeId, target: &str) -> Option<TextMatch> {
    if target.is_empty() {
        return None;
    }
    let target_chars = target.chars().count();
    let min_len = min_match_len(target);

    for node in document.text_nodes(root) {
        let Some(text) = document.node_text(node) else {
            continue;
        };
        // Char-start byte offsets plus the end sentinel, so any (j, k) pair
        // slices on valid boundaries.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        boundaries.push(text.len());
        let total_chars = boundaries.len() - 1;

        for j in 0..total_chars {
            let remaining = total_chars - j;
            if remaining < min_len {
                break;
            }
            let max_len = remaining.min(target_chars);
            for k in min_len..=max_len {
                let candidate = &text[boundaries[j]..boundaries[j + k]];
                if target.contains(candidate) {
                    return Some(TextMatch {
                        node,
                        start: boundaries[j],
                        end: boundaries[j + k],
                    });
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_takes_earliest_node() {
        let document = Document::parse_html("<p>alpha beta</p><p>beta gamma</p>");
        let hit = find_exact(&document, document.root(), "beta").expect("match");
        assert_eq!(document.node_text(hit.node), Some("alpha beta"));
        assert_eq!(&document.node_text(hit.node).unwrap()[hit.start..hit.end], "beta");
    }

    #[test]
    fn exact_match_reports_byte_offsets() {
        let document = Document::parse_html("<p>The quick brown fox</p>");
        let hit = find_exact(&document, document.root(), "quick brown").expect("match");
        assert_eq!(hit.start, 4);
        assert_eq!(hit.end, 15);
    }

    #[test]
    fn empty_target_never_matches() {
        let document = Document::parse_html("<p>anything</p>");
        assert_eq!(find_exact(&document, document.root(), ""), None);
        assert_eq!(find_approximate(&document, document.root(), ""), None);
    }

    #[test]
    fn min_match_len_floors_at_three() {
        assert_eq!(min_match_len("ab"), 3);
        assert_eq!(min_match_len("abcdef"), 3);
        assert_eq!(min_match_len("quick brown fox"), 7);
    }

    #[test]
    fn approximate_accepts_first_shared_fragment() {
        let document = Document::parse_html("<p>she said quick brows</p>");
        let hit = find_approximate(&document, document.root(), "quick brown fox").expect("match");
        let text = document.node_text(hit.node).unwrap();
        assert_eq!(&text[hit.start..hit.end], "quick b");
    }

    #[test]
    fn approximate_rejects_unrelated_content() {
        let document = Document::parse_html("<p>completely unrelated content</p>");
        assert_eq!(
            find_approximate(&document, document.root(), "quick brown fox"),
            None
        );
    }

    #[test]
    fn approximate_handles_multibyte_text() {
        let document = Document::parse_html("<p>naïve café patrons</p>");
        let hit = find_approximate(&document, document.root(), "the café patrons left")
            .expect("match");
        let text = document.node_text(hit.node).unwrap();
        assert!("the café patrons left".contains(&text[hit.start..hit.end]));
    }

    #[test]
    fn locate_prefers_exact_over_approximate() {
        let document = Document::parse_html("<p>quick bro</p><p>quick brown fox</p>");
        let hit = locate(&document, document.root(), "quick brown fox").expect("match");
        assert_eq!(document.node_text(hit.node), Some("quick brown fox"));
    }
}
