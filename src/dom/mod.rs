//! Owned model of a page's element tree.
//!
//! The page side serializes its DOM into a [`DomTree`] (see the capture
//! script in [`crate::chrome`]); the agent turns that into an arena-backed
//! [`Document`] that the snapshot extractor, locator and simulated page all
//! read from.

pub mod query;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::BoundingBox;

/// Scroll offset and size of the visible area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// Serialized page as produced by the capture script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomTree {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewport: Viewport,
    pub root: DomElement,
}

impl DomTree {
    pub fn new(url: impl Into<String>, root: DomElement) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            viewport: Viewport::default(),
            root,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn viewport(mut self, width: f64, height: f64) -> Self {
        self.viewport.width = width;
        self.viewport.height = height;
        self
    }
}

/// A child in the capture form: either a text run or an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomNode {
    Text(String),
    Element(DomElement),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomElement {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub rect: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub children: Vec<DomNode>,
}

impl DomElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = BoundingBox::new(x, y, width, height);
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.children.push(DomNode::Text(text.to_string()));
        self
    }

    pub fn child(mut self, child: DomElement) -> Self {
        self.children.push(DomNode::Element(child));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub rect: BoundingBox,
    pub value: Option<String>,
}

impl ElementData {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The `id` attribute, ignoring empty values.
    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Arena-backed element tree. `NodeId`s stay valid for the lifetime of the
/// document, including after a node is detached.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    pub url: String,
    pub title: String,
    pub viewport: Viewport,
}

impl Document {
    pub fn from_tree(tree: &DomTree) -> Self {
        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
            url: tree.url.clone(),
            title: tree.title.clone(),
            viewport: tree.viewport,
        };
        doc.root = doc.insert_element(None, &tree.root);
        doc
    }

    fn push(&mut self, parent: Option<NodeId>, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            data,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    fn insert_element(&mut self, parent: Option<NodeId>, element: &DomElement) -> NodeId {
        let id = self.push(
            parent,
            NodeData::Element(ElementData {
                tag: element.tag.to_ascii_lowercase(),
                attributes: element
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                    .collect(),
                rect: element.rect,
                value: element.value.clone(),
            }),
        );
        for child in &element.children {
            match child {
                DomNode::Text(text) => {
                    self.push(Some(id), NodeData::Text(text.clone()));
                }
                DomNode::Element(el) => {
                    self.insert_element(Some(id), el);
                }
            }
        }
        id
    }

    /// Serializes the attached part of the document back to capture form.
    pub fn to_tree(&self) -> DomTree {
        DomTree {
            url: self.url.clone(),
            title: self.title.clone(),
            viewport: self.viewport,
            root: self.export(self.root),
        }
    }

    fn export(&self, id: NodeId) -> DomElement {
        let data = self.element(id).cloned().unwrap_or(ElementData {
            tag: String::new(),
            attributes: BTreeMap::new(),
            rect: BoundingBox::default(),
            value: None,
        });
        let children = self.nodes[id.0]
            .children
            .iter()
            .map(|&child| match &self.nodes[child.0].data {
                NodeData::Text(text) => DomNode::Text(text.clone()),
                NodeData::Element(_) => DomNode::Element(self.export(child)),
            })
            .collect();
        DomElement {
            tag: data.tag,
            attributes: data.attributes,
            rect: data.rect,
            value: data.value,
            children,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<body>` element, falling back to the root for fragments.
    pub fn body(&self) -> NodeId {
        self.descendants(self.root)
            .find(|&id| self.tag(id) == Some("body"))
            .unwrap_or(self.root)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(id.0)?.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    /// Parent element; `None` for the root and for detached nodes.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    /// Element children in order, text runs skipped.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|&child| self.element(child).is_some())
    }

    /// Elements below `id` in pre-order, `id` itself excluded.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            let mut kids: Vec<NodeId> = self.children(next).collect();
            kids.reverse();
            stack.extend(kids);
            Some(next)
        })
    }

    /// Every attached element in document order, root first.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.root).chain(self.descendants(self.root))
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Concatenated text of every text run below `id`, in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in &self.nodes[id.0].children {
            match &self.nodes[child.0].data {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Element(_) => self.collect_text(child, out),
            }
        }
    }

    /// Removes `id` from its parent. The node keeps its own subtree.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes.get(id.0).and_then(|n| n.parent) {
            self.nodes[parent.0].children.retain(|&child| child != id);
            self.nodes[id.0].parent = None;
        }
    }

    pub fn append_child(&mut self, parent: NodeId, element: &DomElement) -> NodeId {
        self.insert_element(Some(parent), element)
    }

    /// 1-based position of `id` among same-tag element siblings.
    fn same_tag_index(&self, id: NodeId) -> usize {
        let tag = self.tag(id);
        match self.parent(id) {
            Some(parent) => {
                self.children(parent)
                    .take_while(|&sibling| sibling != id)
                    .filter(|&sibling| self.tag(sibling) == tag)
                    .count()
                    + 1
            }
            None => 1,
        }
    }

    /// Positional path from the root, e.g. `/html/body/div[2]/a`. Unique for
    /// attached elements; used to address elements in page commands.
    pub fn absolute_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            let Some(tag) = self.tag(node) else { break };
            let index = self.same_tag_index(node);
            if index > 1 {
                parts.push(format!("{tag}[{index}]"));
            } else {
                parts.push(tag.to_string());
            }
            current = self.parent(node);
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Path recorded in snapshots: the id form when the element has an id,
    /// otherwise [`Document::absolute_path`].
    pub fn structural_path(&self, id: NodeId) -> String {
        match self.element(id).and_then(ElementData::id) {
            Some(element_id) => format!("//*[@id=\"{element_id}\"]"),
            None => self.absolute_path(id),
        }
    }

    /// Short query locator: `#id`, `.first-class` or the bare tag. Not
    /// guaranteed to be unique.
    pub fn query_locator(&self, id: NodeId) -> String {
        let Some(el) = self.element(id) else {
            return String::new();
        };
        if let Some(element_id) = el.id() {
            return format!("#{element_id}");
        }
        if let Some(class) = el.classes().next() {
            return format!(".{class}");
        }
        el.tag.clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_tree() -> DomTree {
        DomTree::new(
            "https://shop.test/",
            DomElement::new("html").child(
                DomElement::new("body")
                    .rect(0.0, 0.0, 1280.0, 2000.0)
                    .child(
                        DomElement::new("div")
                            .class("nav main")
                            .rect(0.0, 0.0, 1280.0, 60.0)
                            .child(
                                DomElement::new("a")
                                    .attr("href", "/")
                                    .rect(10.0, 10.0, 60.0, 20.0)
                                    .text("Home"),
                            )
                            .child(
                                DomElement::new("a")
                                    .attr("href", "/cart")
                                    .rect(80.0, 10.0, 60.0, 20.0)
                                    .text("Cart"),
                            ),
                    )
                    .child(
                        DomElement::new("div")
                            .rect(0.0, 60.0, 1280.0, 400.0)
                            .child(
                                DomElement::new("input")
                                    .id("q")
                                    .attr("type", "text")
                                    .rect(10.0, 80.0, 300.0, 30.0),
                            )
                            .child(
                                DomElement::new("button")
                                    .class("go")
                                    .rect(320.0, 80.0, 80.0, 30.0)
                                    .text("  Search  "),
                            ),
                    ),
            ),
        )
        .title("Shop")
    }

    #[test]
    fn absolute_paths_index_same_tag_siblings() {
        let doc = Document::from_tree(&sample_tree());
        let links: Vec<_> = doc
            .elements()
            .filter(|&id| doc.tag(id) == Some("a"))
            .collect();
        assert_eq!(doc.absolute_path(links[0]), "/html/body/div/a");
        assert_eq!(doc.absolute_path(links[1]), "/html/body/div/a[2]");

        let button = doc
            .elements()
            .find(|&id| doc.tag(id) == Some("button"))
            .unwrap();
        assert_eq!(doc.absolute_path(button), "/html/body/div[2]/button");
        assert_eq!(doc.query_locator(button), ".go");
        assert_eq!(doc.text_content(button), "  Search  ");
    }

    #[test]
    fn id_elements_use_id_path() {
        let doc = Document::from_tree(&sample_tree());
        let input = doc
            .elements()
            .find(|&id| doc.tag(id) == Some("input"))
            .unwrap();
        assert_eq!(doc.structural_path(input), "//*[@id=\"q\"]");
        assert_eq!(doc.query_locator(input), "#q");
    }

    #[test]
    fn detached_nodes_leave_traversal() {
        let mut doc = Document::from_tree(&sample_tree());
        let button = doc
            .elements()
            .find(|&id| doc.tag(id) == Some("button"))
            .unwrap();
        doc.detach(button);
        assert!(!doc.is_attached(button));
        assert!(doc.elements().all(|id| id != button));
        assert_eq!(doc.absolute_path(button), "/button");
    }

    #[test]
    fn tree_round_trips_through_capture_json() {
        let tree = sample_tree();
        let json = serde_json::to_string(&tree).unwrap();
        let parsed: DomTree = serde_json::from_str(&json).unwrap();
        assert_eq!(Document::from_tree(&parsed).to_tree(), tree);
    }
}
