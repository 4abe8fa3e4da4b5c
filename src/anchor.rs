//! Structural anchors: durable hints for re-finding a highlight's position.
//!
//! An anchor is a *hint*, never an identity guarantee. Sibling insertion,
//! removal, or reordering invalidates a path silently, so resolution is
//! best-effort and callers always fall back to full-document text search when
//! it comes up empty.

use crate::dom::{Document, Element};
use ego_tree::NodeId;
use serde::{Deserialize, Serialize};

/// Serializable descriptor of where in the tree a highlight's text lived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralAnchor {
    /// Short id-selector form (`#some-id`), present when the containing
    /// element carried an `id` attribute at creation time.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selector: Option<String>,
    /// Absolute root-to-node path, e.g. `html>body>div:nth-of-type(2)>p`.
    pub path: String,
}

/// Builds an anchor for the element containing `node`.
///
/// Text nodes are described through their parent element. Both the selector
/// form (when an `id` attribute exists) and the path form are produced; the
/// resolver tries selector first, path second.
pub fn describe(document: &Document, node: NodeId) -> Option<StructuralAnchor> {
    let element_id = document.containing_element(node)?;
    let element = document.element(element_id)?;
    let selector = element.attr("id").map(|id| format!("#{id}"));
    let path = build_path(document, element_id)?;
    Some(StructuralAnchor { selector, path })
}

/// Resolves an anchor back to an element id, selector first, path second.
///
/// Returns `None` when neither form matches the current tree; the caller is
/// expected to fall through to text search.
pub fn resolve(document: &Document, anchor: &StructuralAnchor) -> Option<NodeId> {
    if let Some(selector) = &anchor.selector {
        if let Some(id_value) = selector.strip_prefix('#') {
            if let Some(node) = document.element_by_id_attr(id_value) {
                return Some(node);
            }
        }
    }
    resolve_path(document, &anchor.path)
}

fn build_path(document: &Document, element_id: NodeId) -> Option<String> {
    let mut segments: Vec<String> = Vec::new();
    let mut current = document.tree().get(element_id)?;

    while let Some(element) = current.value().as_element() {
        if element.tag() == "#document" {
            break;
        }
        segments.push(segment_for(current, element));
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    segments.reverse();
    Some(segments.join(">"))
}

fn segment_for(node: ego_tree::NodeRef<'_, crate::dom::Node>, element: &Element) -> String {
    let same_tag: Vec<NodeId> = node
        .parent()
        .map(|parent| {
            parent
                .children()
                .filter(|sibling| {
                    sibling
                        .value()
                        .as_element()
                        .map(|e| e.tag() == element.tag())
                        .unwrap_or(false)
                })
                .map(|sibling| sibling.id())
                .collect()
        })
        .unwrap_or_default();

    if same_tag.len() <= 1 {
        return element.tag().to_string();
    }
    let ordinal = same_tag
        .iter()
        .position(|id| *id == node.id())
        .map(|idx| idx + 1)
        .unwrap_or(1);
    format!("{}:nth-of-type({ordinal})", element.tag())
}

fn resolve_path(document: &Document, path: &str) -> Option<NodeId> {
    if path.is_empty() {
        return None;
    }
    let mut current = document.tree().get(document.root())?;
    for segment in path.split('>') {
        let (tag, ordinal) = parse_segment(segment)?;
        let mut seen = 0usize;
        let mut found = None;
        for child in current.children() {
            let Some(element) = child.value().as_element() else {
                continue;
            };
            if element.tag() == tag {
                seen += 1;
                if seen == ordinal {
                    found = Some(child);
                    break;
                }
            }
        }
        current = found?;
    }
    Some(current.id())
}

fn parse_segment(segment: &str) -> Option<(&str, usize)> {
    match segment.split_once(":nth-of-type(") {
        None => Some((segment, 1)),
        Some((tag, rest)) => {
            let ordinal: usize = rest.strip_suffix(')')?.parse().ok()?;
            Some((tag, ordinal))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_prefers_id_selector() {
        let document = Document::parse_html("<div id=\"intro\"><p>text</p></div>");
        let intro = document.element_by_id_attr("intro").expect("intro");
        let anchor = describe(&document, intro).expect("anchor");
        assert_eq!(anchor.selector.as_deref(), Some("#intro"));
        assert!(anchor.path.ends_with("div"));
    }

    #[test]
    fn describe_records_ordinals_for_repeated_tags() {
        let document = Document::parse_html("<div><p>one</p><p>two</p></div>");
        let second = document.text_nodes(document.root())[1];
        let anchor = describe(&document, second).expect("anchor");
        assert_eq!(anchor.selector, None);
        assert_eq!(anchor.path, "html>body>div>p:nth-of-type(2)");
    }

    #[test]
    fn resolve_round_trips_through_path() {
        let document = Document::parse_html("<div><p>one</p><p>two</p></div>");
        let second = document.text_nodes(document.root())[1];
        let anchor = describe(&document, second).expect("anchor");
        let resolved = resolve(&document, &anchor).expect("resolved");
        assert_eq!(document.text_content(resolved), "two");
    }

    #[test]
    fn resolve_falls_back_to_path_when_selector_is_stale() {
        let anchor = StructuralAnchor {
            selector: Some("#gone".to_string()),
            path: "html>body>p".to_string(),
        };
        let document = Document::parse_html("<p>still here</p>");
        let resolved = resolve(&document, &anchor).expect("resolved");
        assert_eq!(document.text_content(resolved), "still here");
    }

    #[test]
    fn resolve_reports_missing_nodes() {
        let anchor = StructuralAnchor {
            selector: None,
            path: "html>body>div>span:nth-of-type(3)".to_string(),
        };
        let document = Document::parse_html("<div><span>only</span></div>");
        assert_eq!(resolve(&document, &anchor), None);
    }
}
