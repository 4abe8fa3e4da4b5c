//! Owned document tree that highlight operations run against.
//!
//! Hosts hand the engine a [`Document`], either parsed from HTML via
//! [`Document::parse_html`] or assembled programmatically with the builder
//! methods, and every locate/wrap/unwrap operation works on node ids inside
//! that tree. The arena never frees nodes, so a [`NodeId`] stays valid for the
//! lifetime of the document it came from; detached nodes simply become
//! unreachable from the root.

use ego_tree::{NodeId, Tree};
use scraper::node::Node as HtmlNode;
use scraper::Html;
use std::fmt::Write as _;

/// Elements that never carry children and serialize without a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// A single node in the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with a tag name and attributes.
    Element(Element),
    /// A run of character data.
    Text(String),
}

impl Node {
    /// Returns the element payload, if this node is an element.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text(_) => None,
        }
    }

    /// Returns the text payload, if this node is character data.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Element(_) => None,
        }
    }
}

/// Tag name plus attributes, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
}

impl Element {
    /// Builds an element with no attributes.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
        }
    }

    /// Lowercased tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Looks up an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute, replacing any previous value under the same name.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.attributes.iter_mut().find(|(attr, _)| *attr == name) {
            entry.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    /// Whether the space-separated `class` attribute contains `class_name`.
    pub fn has_class(&self, class_name: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_ascii_whitespace().any(|c| c == class_name))
            .unwrap_or(false)
    }

    /// Attributes in source order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// An owned, mutable document tree.
///
/// The root is a synthetic `#document` element that only serializes its
/// children, mirroring how a parsed page nests everything under it.
#[derive(Debug, Clone)]
pub struct Document {
    tree: Tree<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document containing only the synthetic root.
    pub fn new() -> Self {
        Self {
            tree: Tree::new(Node::Element(Element::new("#document"))),
        }
    }

    /// Parses an HTML string into an owned document tree.
    ///
    /// Comments, doctypes, and processing instructions are dropped; element
    /// and text structure is preserved verbatim, including whitespace-only
    /// text nodes, so located offsets line up with the source markup.
    pub fn parse_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut document = Self::new();
        let root = document.root();
        document.import_children(root, parsed.tree.root());
        document
    }

    fn import_children(&mut self, parent: NodeId, source: ego_tree::NodeRef<'_, HtmlNode>) {
        for child in source.children() {
            match child.value() {
                HtmlNode::Element(source_element) => {
                    let mut element = Element::new(source_element.name());
                    for (name, value) in source_element.attrs() {
                        element.set_attr(name, value);
                    }
                    let id = self.append_element(parent, element);
                    self.import_children(id, child);
                }
                HtmlNode::Text(text) => {
                    let content: &str = &text.text;
                    if !content.is_empty() {
                        self.append_text(parent, content);
                    }
                }
                _ => {}
            }
        }
    }

    /// Id of the synthetic root element.
    pub fn root(&self) -> NodeId {
        self.tree.root().id()
    }

    /// Read-only access to the underlying arena.
    pub fn tree(&self) -> &Tree<Node> {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut Tree<Node> {
        &mut self.tree
    }

    /// Appends a child element under `parent` and returns its id.
    pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
        self.tree
            .get_mut(parent)
            .expect("parent id belongs to this document")
            .append(Node::Element(element))
            .id()
    }

    /// Appends a child text node under `parent` and returns its id.
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.tree
            .get_mut(parent)
            .expect("parent id belongs to this document")
            .append(Node::Text(text.into()))
            .id()
    }

    /// Returns the node's element payload, if the id is live and an element.
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.tree.get(id).and_then(|node| node.value().as_element())
    }

    /// Returns the node's text payload, if the id is live and a text node.
    pub fn node_text(&self, id: NodeId) -> Option<&str> {
        self.tree.get(id).and_then(|node| node.value().as_text())
    }

    /// Nearest element at or above `id` (the node itself when it is one).
    pub fn containing_element(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.tree.get(id)?;
        loop {
            if current.value().as_element().is_some() {
                return Some(current.id());
            }
            current = current.parent()?;
        }
    }

    /// All text nodes under `root` (inclusive), in document order.
    pub fn text_nodes(&self, root: NodeId) -> Vec<NodeId> {
        let Some(root) = self.tree.get(root) else {
            return Vec::new();
        };
        root.descendants()
            .filter(|node| node.value().as_text().is_some())
            .map(|node| node.id())
            .collect()
    }

    /// Concatenated text of the subtree rooted at `id`, in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let Some(root) = self.tree.get(id) else {
            return String::new();
        };
        let mut out = String::new();
        for node in root.descendants() {
            if let Some(text) = node.value().as_text() {
                out.push_str(text);
            }
        }
        out
    }

    /// First element (document order) whose `id` attribute equals `value`.
    pub fn element_by_id_attr(&self, value: &str) -> Option<NodeId> {
        self.find_element(self.root(), |element| element.attr("id") == Some(value))
    }

    /// First element under `root` (inclusive) matching the predicate.
    pub fn find_element<F>(&self, root: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Element) -> bool,
    {
        let root = self.tree.get(root)?;
        root.descendants()
            .find(|node| node.value().as_element().map(&predicate).unwrap_or(false))
            .map(|node| node.id())
    }

    /// All elements (document order) whose `class` attribute contains `class_name`.
    pub fn elements_with_class(&self, class_name: &str) -> Vec<NodeId> {
        let root = self.root();
        let Some(root) = self.tree.get(root) else {
            return Vec::new();
        };
        root.descendants()
            .filter(|node| {
                node.value()
                    .as_element()
                    .map(|element| element.has_class(class_name))
                    .unwrap_or(false)
            })
            .map(|node| node.id())
            .collect()
    }

    /// Serializes the tree back to HTML.
    ///
    /// The synthetic root emits only its children. Text is entity-escaped, so
    /// the output re-parses to the same tree.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.tree.root().children() {
            self.write_node(&mut out, child);
        }
        out
    }

    fn write_node(&self, out: &mut String, node: ego_tree::NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Element(element) => {
                let _ = write!(out, "<{}", element.tag());
                for (name, value) in element.attrs() {
                    let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
                }
                if VOID_TAGS.contains(&element.tag()) && !node.has_children() {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for child in node.children() {
                    self.write_node(out, child);
                }
                let _ = write!(out, "</{}>", element.tag());
            }
        }
    }
}

fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
