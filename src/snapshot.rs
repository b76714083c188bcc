use crate::dom::{Document, NodeId};
use crate::types::ElementDescriptor;

pub const DEFAULT_MAX_ELEMENTS: usize = 100;
pub const MAX_TEXT_CHARS: usize = 100;

const INTERACTIVE_TAGS: [&str; 5] = ["a", "button", "input", "select", "textarea"];

fn is_candidate(doc: &Document, id: NodeId) -> bool {
    doc.element(id).is_some_and(|el| {
        INTERACTIVE_TAGS.contains(&el.tag.as_str())
            || el.attributes.contains_key("onclick")
            || el.attributes.contains_key("role")
    })
}

/// Interactive elements below `<body>`, in document order.
///
/// Elements are kept when their tag is interactive or they carry an
/// `onclick` or `role` attribute. Zero-size elements are dropped without
/// counting against `max_elements`.
pub fn extract(doc: &Document, max_elements: usize) -> Vec<ElementDescriptor> {
    doc.descendants(doc.body())
        .filter(|&id| is_candidate(doc, id))
        .filter_map(|id| describe(doc, id))
        .take(max_elements)
        .collect()
}

/// Descriptor for one element, or `None` when it has no rendered area.
pub fn describe(doc: &Document, id: NodeId) -> Option<ElementDescriptor> {
    let el = doc.element(id)?;
    if el.rect.is_empty() {
        return None;
    }
    let text: String = doc
        .text_content(id)
        .trim()
        .chars()
        .take(MAX_TEXT_CHARS)
        .collect();
    Some(ElementDescriptor {
        tag: el.tag.clone(),
        id: el.id().map(String::from),
        class: el
            .attr("class")
            .filter(|c| !c.trim().is_empty())
            .map(String::from),
        text: (!text.is_empty()).then_some(text),
        attributes: el.attributes.clone(),
        path: doc.structural_path(id),
        selector: doc.query_locator(id),
        is_interactive: true,
        bounding_box: el.rect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{DomElement, DomTree};

    fn page() -> DomTree {
        let mut body = DomElement::new("body").rect(0.0, 0.0, 1000.0, 3000.0);
        body = body.child(
            DomElement::new("section").rect(0.0, 0.0, 1000.0, 500.0).child(
                DomElement::new("div")
                    .child(
                        DomElement::new("div")
                            .child(
                                DomElement::new("button")
                                    .id("deep")
                                    .rect(5.0, 5.0, 50.0, 20.0)
                                    .text("Deep"),
                            ),
                    ),
            ),
        );
        body = body
            .child(DomElement::new("a").attr("href", "#").text("hidden"))
            .child(
                DomElement::new("span")
                    .attr("role", "button")
                    .rect(0.0, 600.0, 40.0, 40.0)
                    .text(&"x".repeat(250)),
            )
            .child(
                DomElement::new("div")
                    .attr("onclick", "go()")
                    .rect(0.0, 700.0, 40.0, 0.0),
            )
            .child(DomElement::new("p").rect(0.0, 800.0, 100.0, 20.0).text("plain"));
        for i in 0..20 {
            body = body.child(
                DomElement::new("input")
                    .attr("name", &format!("field{i}"))
                    .rect(0.0, 900.0 + i as f64 * 30.0, 200.0, 24.0),
            );
        }
        DomTree::new(
            "https://forms.test/",
            DomElement::new("html").child(body),
        )
    }

    #[test]
    fn respects_limit_and_skips_empty_boxes() {
        let doc = Document::from_tree(&page());
        for max in [0, 1, 5, 22, 100] {
            let snapshot = extract(&doc, max);
            assert!(snapshot.len() <= max);
            assert!(
                snapshot
                    .iter()
                    .all(|d| d.bounding_box.width > 0.0 && d.bounding_box.height > 0.0)
            );
        }
        // deep button, role span, 20 inputs; the zero-size link and div are skipped.
        assert_eq!(extract(&doc, 100).len(), 22);
    }

    #[test]
    fn ordering_and_locators() {
        let doc = Document::from_tree(&page());
        let snapshot = extract(&doc, 3);
        assert_eq!(snapshot[0].path, "//*[@id=\"deep\"]");
        assert_eq!(snapshot[0].selector, "#deep");
        assert_eq!(snapshot[1].tag, "span");
        assert_eq!(snapshot[1].text.as_ref().map(|t| t.chars().count()), Some(100));
        assert_eq!(snapshot[2].path, "/html/body/input");
        assert_eq!(snapshot[2].selector, "input");
        assert_eq!(snapshot[2].text, None);

        let last = extract(&doc, 100).pop().unwrap();
        assert_eq!(last.path, "/html/body/input[20]");
        assert_eq!(last.attributes.get("name").map(String::as_str), Some("field19"));
    }

    #[test]
    fn deterministic_for_a_fixed_document() {
        let doc = Document::from_tree(&page());
        assert_eq!(extract(&doc, 50), extract(&doc, 50));
    }
}
