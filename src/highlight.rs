//! Highlight materialization: the DOM surgery that turns a located span into
//! a visible, uniquely identified wrapper, and the inverse that dissolves it.
//!
//! Wrapping never alters the document's text content: `unwrap` after `wrap`
//! restores the affected region's text byte-for-byte. Element boundaries
//! *within* that text may be lost on unwrap, since the wrapper's rendered text
//! comes back as one flat text node; that lossiness is accepted behavior, not
//! a defect. All validation happens before the first mutation, so a failed wrap
//! leaves no partial state behind.

use crate::dom::{Document, Element, Node};
use crate::locate::TextMatch;
use ego_tree::NodeId;
use std::fmt;

/// Marker class shared by every live highlight span, enabling bulk discovery
/// independent of individual ids.
pub const HIGHLIGHT_CLASS: &str = "hilite-mark";

/// Attribute carrying the highlight's fill color, so listings can read it
/// back without parsing the inline style.
const COLOR_ATTR: &str = "data-color";

/// A user selection handed to the creation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRange {
    /// A span within a single text node; byte offsets on char boundaries.
    TextSpan {
        /// The text node.
        node: NodeId,
        /// Byte offset of the selection start.
        start: usize,
        /// Exclusive byte offset of the selection end.
        end: usize,
    },
    /// An entire element; its children are wrapped with structure preserved.
    Subtree {
        /// The element whose content is selected.
        node: NodeId,
    },
}

/// Errors surfaced while wrapping or unwrapping highlight spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    /// The referenced node is missing or of the wrong kind for the operation.
    MissingNode,
    /// Offsets are out of range or not on char boundaries.
    InvalidOffsets {
        /// Requested start offset.
        start: usize,
        /// Requested end offset.
        end: usize,
    },
    /// The range covers no text.
    EmptyRange,
}

impl fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNode => write!(f, "range references a node not usable for wrapping"),
            Self::InvalidOffsets { start, end } => {
                write!(f, "offsets {start}..{end} do not address valid text boundaries")
            }
            Self::EmptyRange => write!(f, "range covers no text"),
        }
    }
}

impl std::error::Error for MaterializeError {}

/// Returns the text a selection covers, validating it without mutating.
pub fn selection_text(
    document: &Document,
    range: &SelectionRange,
) -> Result<String, MaterializeError> {
    match *range {
        SelectionRange::TextSpan { node, start, end } => {
            let text = document.node_text(node).ok_or(MaterializeError::MissingNode)?;
            check_offsets(text, start, end)?;
            Ok(text[start..end].to_string())
        }
        SelectionRange::Subtree { node } => {
            document.element(node).ok_or(MaterializeError::MissingNode)?;
            let text = document.text_content(node);
            if text.is_empty() {
                return Err(MaterializeError::EmptyRange);
            }
            Ok(text)
        }
    }
}

/// Wraps a live selection, returning the id of the new span element.
pub fn wrap_selection(
    document: &mut Document,
    range: &SelectionRange,
    id: &str,
    color: &str,
) -> Result<NodeId, MaterializeError> {
    match *range {
        SelectionRange::TextSpan { node, start, end } => {
            wrap_text_span(document, node, start, end, id, color)
        }
        SelectionRange::Subtree { node } => wrap_subtree(document, node, id, color),
    }
}

/// Wraps a span located by the text search path.
///
/// Text before and after the match stays behind as sibling text nodes; only
/// the exact matched substring ends up inside the span.
pub fn wrap_match(
    document: &mut Document,
    found: &TextMatch,
    id: &str,
    color: &str,
) -> Result<NodeId, MaterializeError> {
    wrap_text_span(document, found.node, found.start, found.end, id, color)
}

/// Replaces the span carrying `id` with a flat text node of its rendered text.
///
/// Idempotent: unwrapping an id that is not present is a no-op returning
/// `false`.
pub fn unwrap(document: &mut Document, id: &str) -> bool {
    let Some(span) = find_by_id(document, id) else {
        return false;
    };
    let text = document.text_content(span);
    let child_ids: Vec<NodeId> = document
        .tree()
        .get(span)
        .map(|node| node.children().map(|child| child.id()).collect())
        .unwrap_or_default();

    let tree = document.tree_mut();
    for child in child_ids {
        if let Some(mut node) = tree.get_mut(child) {
            node.detach();
        }
    }
    if let Some(mut node) = tree.get_mut(span) {
        *node.value() = Node::Text(text);
    }
    true
}

/// Live span carrying `id`, if any.
pub fn find_by_id(document: &Document, id: &str) -> Option<NodeId> {
    document.find_element(document.root(), |element| {
        element.has_class(HIGHLIGHT_CLASS) && element.attr("id") == Some(id)
    })
}

/// Whether a live span with `id` currently exists.
pub fn is_present(document: &Document, id: &str) -> bool {
    find_by_id(document, id).is_some()
}

/// All live spans in document order.
pub fn all_highlights(document: &Document) -> Vec<NodeId> {
    document.elements_with_class(HIGHLIGHT_CLASS)
}

/// Unwraps every live span, returning how many were dissolved.
///
/// Ids are collected up front: unwrapping an outer span flattens any nested
/// one, whose id then simply reports as absent.
pub fn clear_all(document: &mut Document) -> usize {
    let ids: Vec<String> = all_highlights(document)
        .into_iter()
        .filter_map(|node| {
            document
                .element(node)
                .and_then(|element| element.attr("id"))
                .map(str::to_string)
        })
        .collect();
    ids.iter().filter(|id| unwrap(document, id.as_str())).count()
}

/// Updates the fill color of a live span. Returns `false` when absent.
pub fn recolor(document: &mut Document, id: &str, color: &str) -> bool {
    let Some(span) = find_by_id(document, id) else {
        return false;
    };
    let tree = document.tree_mut();
    if let Some(mut node) = tree.get_mut(span) {
        if let Node::Element(element) = node.value() {
            element.set_attr("style", style_for(color));
            element.set_attr(COLOR_ATTR, color);
            return true;
        }
    }
    false
}

/// Color recorded on a live span at wrap time.
pub fn span_color(document: &Document, span: NodeId) -> Option<&str> {
    document.element(span).and_then(|element| element.attr(COLOR_ATTR))
}

fn style_for(color: &str) -> String {
    format!("background-color: {color};")
}

fn highlight_element(id: &str, color: &str) -> Element {
    let mut element = Element::new("span");
    element.set_attr("id", id);
    element.set_attr("class", HIGHLIGHT_CLASS);
    element.set_attr(COLOR_ATTR, color);
    element.set_attr("style", style_for(color));
    element
}

fn check_offsets(text: &str, start: usize, end: usize) -> Result<(), MaterializeError> {
    if start >= end {
        return Err(MaterializeError::EmptyRange);
    }
    if end > text.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return Err(MaterializeError::InvalidOffsets { start, end });
    }
    Ok(())
}

fn wrap_text_span(
    document: &mut Document,
    node: NodeId,
    start: usize,
    end: usize,
    id: &str,
    color: &str,
) -> Result<NodeId, MaterializeError> {
    let text = document
        .node_text(node)
        .ok_or(MaterializeError::MissingNode)?
        .to_string();
    check_offsets(&text, start, end)?;

    let before = text[..start].to_string();
    let matched = text[start..end].to_string();
    let after = text[end..].to_string();

    let tree = document.tree_mut();
    let mut node_mut = tree.get_mut(node).ok_or(MaterializeError::MissingNode)?;
    if !before.is_empty() {
        node_mut.insert_before(Node::Text(before));
    }
    if !after.is_empty() {
        node_mut.insert_after(Node::Text(after));
    }
    *node_mut.value() = Node::Element(highlight_element(id, color));
    node_mut.append(Node::Text(matched));
    Ok(node)
}

/// Owned copy of a subtree, used to move children under a new span without
/// fighting the arena's borrow rules.
struct OwnedSubtree {
    value: Node,
    children: Vec<OwnedSubtree>,
}

fn snapshot(document: &Document, node: NodeId) -> Option<OwnedSubtree> {
    let node = document.tree().get(node)?;
    Some(OwnedSubtree {
        value: node.value().clone(),
        children: node
            .children()
            .filter_map(|child| snapshot(document, child.id()))
            .collect(),
    })
}

fn rebuild(document: &mut Document, parent: NodeId, owned: &OwnedSubtree) {
    let id = match &owned.value {
        Node::Element(element) => document.append_element(parent, element.clone()),
        Node::Text(text) => document.append_text(parent, text.clone()),
    };
    for child in &owned.children {
        rebuild(document, id, child);
    }
}

fn wrap_subtree(
    document: &mut Document,
    element_id: NodeId,
    id: &str,
    color: &str,
) -> Result<NodeId, MaterializeError> {
    document
        .element(element_id)
        .ok_or(MaterializeError::MissingNode)?;
    if document.text_content(element_id).is_empty() {
        return Err(MaterializeError::EmptyRange);
    }

    let child_ids: Vec<NodeId> = document
        .tree()
        .get(element_id)
        .map(|node| node.children().map(|child| child.id()).collect())
        .unwrap_or_default();
    let snapshots: Vec<OwnedSubtree> = child_ids
        .iter()
        .filter_map(|child| snapshot(document, *child))
        .collect();

    let tree = document.tree_mut();
    for child in &child_ids {
        if let Some(mut node) = tree.get_mut(*child) {
            node.detach();
        }
    }
    let span = document.append_element(element_id, highlight_element(id, color));
    for owned in &snapshots {
        rebuild(document, span, owned);
    }
    Ok(span)
}
