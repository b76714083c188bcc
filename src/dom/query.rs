//! CSS and XPath lookups over a [`Document`].
//!
//! The arena is rendered into the form each engine reads (HTML for
//! `scraper`, an `sxd-document` tree for `sxd-xpath`). Every rendered
//! element carries its arena index in [`NODE_ATTR`] so matches map back to
//! [`NodeId`]s.

use scraper::{Html, Selector};
use std::fmt::Write as _;
use sxd_document::Package;
use sxd_document::dom;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};
use thiserror::Error;

use super::{Document, NodeData, NodeId};

const NODE_ATTR: &str = "data-surf-node";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid selector `{query}`: {reason}")]
    Selector { query: String, reason: String },
    #[error("invalid path `{path}`: {reason}")]
    Path { path: String, reason: String },
}

fn node_id(attr: Option<&str>) -> Option<NodeId> {
    attr?.parse().ok().map(NodeId)
}

/// First element matching the CSS selector `query`, in document order.
pub fn select_first(doc: &Document, query: &str) -> Result<Option<NodeId>, QueryError> {
    let selector = Selector::parse(query).map_err(|err| QueryError::Selector {
        query: query.to_string(),
        reason: err.to_string(),
    })?;
    let html = Html::parse_document(&to_html(doc));
    Ok(html
        .select(&selector)
        .find_map(|el| node_id(el.value().attr(NODE_ATTR))))
}

/// First element the XPath expression `path` selects, in document order.
/// Expressions that evaluate to something other than a node-set select
/// nothing.
pub fn evaluate_first(doc: &Document, path: &str) -> Result<Option<NodeId>, QueryError> {
    let invalid = |reason: String| QueryError::Path {
        path: path.to_string(),
        reason,
    };
    let xpath = Factory::new()
        .build(path)
        .map_err(|err| invalid(err.to_string()))?
        .ok_or_else(|| invalid("empty expression".into()))?;

    let package = Package::new();
    let xml = package.as_document();
    xml.root().append_child(xml_element(doc, doc.root, &xml));

    let value = xpath
        .evaluate(&Context::new(), xml.root())
        .map_err(|err| invalid(err.to_string()))?;
    let Value::Nodeset(nodes) = value else {
        return Ok(None);
    };
    Ok(nodes.document_order_first().and_then(|node| match node {
        Node::Element(el) => node_id(el.attribute_value(NODE_ATTR)),
        _ => None,
    }))
}

fn to_html(doc: &Document) -> String {
    let mut out = String::from("<!DOCTYPE html>");
    write_html(doc, doc.root, &mut out);
    out
}

fn write_html(doc: &Document, id: NodeId, out: &mut String) {
    let Some(el) = doc.element(id) else { return };
    let _ = write!(out, "<{} {NODE_ATTR}=\"{}\"", el.tag, id.0);
    for (name, value) in &el.attributes {
        let _ = write!(out, " {name}=\"{}\"", escape(value, true));
    }
    out.push('>');
    for &child in &doc.nodes[id.0].children {
        match &doc.nodes[child.0].data {
            NodeData::Text(text) => out.push_str(&escape(text, false)),
            NodeData::Element(_) => write_html(doc, child, out),
        }
    }
    let _ = write!(out, "</{}>", el.tag);
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn xml_element<'d>(doc: &Document, id: NodeId, xml: &dom::Document<'d>) -> dom::Element<'d> {
    let element = match doc.element(id) {
        Some(el) => {
            let element = xml.create_element(el.tag.as_str());
            for (name, value) in &el.attributes {
                element.set_attribute_value(name.as_str(), value.as_str());
            }
            element
        }
        None => xml.create_element("unknown"),
    };
    element.set_attribute_value(NODE_ATTR, id.0.to_string().as_str());
    for &child in &doc.nodes[id.0].children {
        match &doc.nodes[child.0].data {
            NodeData::Text(text) => element.append_child(xml.create_text(text)),
            NodeData::Element(_) => element.append_child(xml_element(doc, child, xml)),
        }
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::tests::sample_tree;

    fn first_tag(doc: &Document, selector: &str) -> Option<String> {
        select_first(doc, selector)
            .unwrap()
            .and_then(|id| doc.tag(id).map(String::from))
    }

    fn href(doc: &Document, id: Option<NodeId>) -> Option<&str> {
        doc.element(id?)?.attr("href")
    }

    #[test]
    fn simple_and_compound_selectors() {
        let doc = Document::from_tree(&sample_tree());
        assert_eq!(first_tag(&doc, "#q").as_deref(), Some("input"));
        assert_eq!(first_tag(&doc, "button.go").as_deref(), Some("button"));
        assert_eq!(first_tag(&doc, ".nav.main").as_deref(), Some("div"));
        assert_eq!(first_tag(&doc, "input[type=text]").as_deref(), Some("input"));
        assert_eq!(first_tag(&doc, "a[href$='cart']").as_deref(), Some("a"));
        assert_eq!(first_tag(&doc, "select"), None);
    }

    #[test]
    fn structural_and_pseudo_class_selectors() {
        let doc = Document::from_tree(&sample_tree());
        let second = select_first(&doc, "a:nth-of-type(2)").unwrap();
        assert_eq!(href(&doc, second), Some("/cart"));
        assert_eq!(first_tag(&doc, "input:not([disabled])").as_deref(), Some("input"));
        assert_eq!(first_tag(&doc, "input:first-child").as_deref(), Some("input"));
        assert_eq!(first_tag(&doc, "button:first-child"), None);
        assert_eq!(first_tag(&doc, "input[type=\"TEXT\" i]").as_deref(), Some("input"));
        assert_eq!(first_tag(&doc, "div:nth-child(2) > button").as_deref(), Some("button"));
        assert_eq!(first_tag(&doc, "body > a"), None);
        assert_eq!(first_tag(&doc, "button, a").as_deref(), Some("a"));
    }

    #[test]
    fn text_with_markup_characters_stays_text() {
        let mut doc = Document::from_tree(&sample_tree());
        let body = doc.body();
        doc.append_child(
            body,
            &crate::dom::DomElement::new("p")
                .attr("title", "\"quoted\" & <b>")
                .text("<button id=\"fake\">"),
        );
        assert_eq!(first_tag(&doc, "#fake"), None);
        assert_eq!(first_tag(&doc, "p[title='\"quoted\" & <b>']").as_deref(), Some("p"));
    }

    #[test]
    fn malformed_selectors_are_errors() {
        let doc = Document::from_tree(&sample_tree());
        for bad in ["", "#", "div >", "p..x"] {
            assert!(
                matches!(select_first(&doc, bad), Err(QueryError::Selector { .. })),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn absolute_and_id_paths_resolve_to_their_element() {
        let doc = Document::from_tree(&sample_tree());
        for id in doc.elements() {
            assert_eq!(evaluate_first(&doc, &doc.absolute_path(id)), Ok(Some(id)));
            assert_eq!(evaluate_first(&doc, &doc.structural_path(id)), Ok(Some(id)));
        }
    }

    #[test]
    fn xpath_predicates_and_functions() {
        let doc = Document::from_tree(&sample_tree());
        let second = evaluate_first(&doc, "//a[2]").unwrap();
        assert_eq!(href(&doc, second), Some("/cart"));
        assert_eq!(evaluate_first(&doc, "//a[@href='/cart']").unwrap(), second);
        let button = evaluate_first(&doc, "//button[normalize-space()='Search']").unwrap();
        assert_eq!(button.and_then(|id| doc.tag(id)), Some("button"));
        assert_eq!(evaluate_first(&doc, "//*[@id=\"missing\"]"), Ok(None));
        assert_eq!(evaluate_first(&doc, "/html/body/div[3]"), Ok(None));
        assert_eq!(evaluate_first(&doc, "count(//a)"), Ok(None));
    }

    #[test]
    fn malformed_paths_are_errors() {
        let doc = Document::from_tree(&sample_tree());
        for bad in ["", "//a[", "/html/[1]", "!!"] {
            assert!(
                matches!(evaluate_first(&doc, bad), Err(QueryError::Path { .. })),
                "{bad:?} should not parse"
            );
        }
    }
}
