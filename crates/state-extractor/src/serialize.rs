//! Renders a simplified tree as indexed text for an agent prompt.
//!
//! One line per node, tab-indented by depth:
//!
//! ```text
//! *[3]<button type=submit/>
//! |SCROLL+2.4|<div/>
//! ┌── IFRAME START ──
//! 	[4]<a href=/checkout/>
//! └── IFRAME END ──
//! ```

use pagelens_dom_fusion::{EnhancedNode, FusedGraph, NodeKind};

use crate::policy::ExtractorPolicy;
use crate::simplify::{Boundary, SimplifiedNode};

pub fn render(root: &SimplifiedNode, graph: &FusedGraph, policy: &ExtractorPolicy) -> String {
    let mut out = String::new();
    render_node(root, graph, policy, 0, &mut out);
    out
}

fn render_node(
    simplified: &SimplifiedNode,
    graph: &FusedGraph,
    policy: &ExtractorPolicy,
    depth: usize,
    out: &mut String,
) {
    let node = graph.node(simplified.node);

    // Documents and fragments are containers only; their children render
    // at the same depth.
    let renders_line = matches!(node.kind, NodeKind::Element | NodeKind::Text);
    let child_depth = if renders_line { depth + 1 } else { depth };

    if renders_line {
        indent(out, depth);
        match node.kind {
            NodeKind::Text => {
                out.push_str(&truncate(
                    node.trimmed_text().unwrap_or_default(),
                    policy.max_text_len,
                ));
            }
            _ => render_element_line(simplified, node, policy, out),
        }
        out.push('\n');
    }

    match simplified.boundary {
        Boundary::None => {
            for child in &simplified.children {
                render_node(child, graph, policy, child_depth, out);
            }
        }
        Boundary::Iframe | Boundary::Shadow => {
            let label = if simplified.boundary == Boundary::Iframe {
                "IFRAME"
            } else {
                "SHADOW"
            };
            indent(out, depth);
            out.push_str(&format!("┌── {label} START ──\n"));
            for child in &simplified.children {
                render_node(child, graph, policy, child_depth, out);
            }
            indent(out, depth);
            out.push_str(&format!("└── {label} END ──\n"));
        }
    }
}

fn render_element_line(
    simplified: &SimplifiedNode,
    node: &EnhancedNode,
    policy: &ExtractorPolicy,
    out: &mut String,
) {
    if simplified.is_new {
        out.push('*');
    }
    if let Some(index) = simplified.interactive_index {
        out.push_str(&format!("[{index}]"));
    }
    if node.is_scrollable {
        let pages = node
            .layout
            .as_ref()
            .and_then(|l| l.scroll)
            .map(|s| s.pages_below())
            .unwrap_or(0.0);
        if pages > 0.05 {
            out.push_str(&format!("|SCROLL+{pages:.1}|"));
        } else {
            out.push_str("|SCROLL|");
        }
    }

    out.push('<');
    out.push_str(&node.tag);
    for (key, value) in selected_attributes(node, policy) {
        out.push(' ');
        out.push_str(&key);
        if !value.is_empty() {
            out.push('=');
            out.push_str(&value);
        }
    }
    out.push_str("/>");
}

/// Allowlisted attributes in fixed order, with values capped and
/// de-duplicated so the line stays short.
fn selected_attributes(node: &EnhancedNode, policy: &ExtractorPolicy) -> Vec<(String, String)> {
    let own_text = node.ax_name().map(str::trim);
    let mut seen_values: Vec<String> = Vec::new();
    let mut out = Vec::new();

    for name in &policy.attribute_allowlist {
        let Some(raw) = node.attr(name) else {
            continue;
        };
        // role adds nothing when it repeats the tag
        if name == "role" && raw == node.tag {
            continue;
        }
        if own_text.is_some_and(|t| t == raw.trim()) {
            continue;
        }
        // a long value already shown under another key is noise
        if raw.len() > 5 && seen_values.iter().any(|v| v == raw) {
            continue;
        }
        seen_values.push(raw.to_string());
        out.push((name.clone(), truncate(raw, policy.max_attr_len)));
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExtractContext;
    use crate::index::assign_indices;
    use crate::simplify::simplify;
    use crate::testutil::GraphFixture;
    use pagelens_dom_fusion::ScrollInfo;

    fn pipeline(graph: &FusedGraph) -> String {
        let policy = ExtractorPolicy::default();
        let mut root = simplify(graph, &policy, &mut ExtractContext::new()).expect("survivors");
        assign_indices(&mut root, graph, None);
        render(&root, graph, &policy)
    }

    #[test]
    fn interactive_lines_carry_brackets_and_allowlisted_attributes() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let button = fx.widget(body, "button", "button", "Pay now");
        fx.set_attr(button, "type", "submit");
        fx.set_attr(button, "class", "btn btn-primary"); // not allowlisted
        let link = fx.element(body, "a");
        fx.set_attr(link, "href", "/checkout");
        let graph = fx.build();

        let text = pipeline(&graph);
        assert_eq!(text, "[1]<button type=submit/>\n[2]<a href=/checkout/>\n");
    }

    #[test]
    fn text_nests_under_its_interactive_parent() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let link = fx.element(body, "a");
        fx.set_attr(link, "href", "/docs");
        fx.text(link, "Read the documentation");
        let graph = fx.build();

        let text = pipeline(&graph);
        assert_eq!(text, "[1]<a href=/docs/>\n\tRead the documentation\n");
    }

    #[test]
    fn scroll_marker_reports_pages_below() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let pane = fx.element(body, "div");
        fx.set_scrollable(
            pane,
            ScrollInfo {
                scroll_top: 0.0,
                scroll_height: 1200.0,
                client_height: 400.0,
                ..Default::default()
            },
        );
        fx.widget(pane, "button", "button", "Inside");
        let graph = fx.build();

        let text = pipeline(&graph);
        assert_eq!(text, "|SCROLL+2.0|<div/>\n\t[1]<button/>\n");
    }

    #[test]
    fn iframe_children_render_between_markers() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let iframe = fx.element(body, "iframe");
        let doc = fx.content_document(iframe);
        let inner = fx.element(doc, "body");
        let button = fx.widget(inner, "button", "button", "Embedded");
        fx.set_attr(button, "name", "embedded");
        let graph = fx.build();

        let text = pipeline(&graph);
        assert_eq!(
            text,
            "<iframe/>\n┌── IFRAME START ──\n\t[1]<button name=embedded/>\n└── IFRAME END ──\n"
        );
    }

    #[test]
    fn attribute_values_are_capped_and_deduplicated() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let input = fx.element(body, "input");
        fx.set_attr(input, "name", "delivery-instructions-field");
        fx.set_attr(input, "placeholder", "delivery-instructions-field");
        fx.set_attr(input, "type", "text");
        let graph = fx.build();

        let text = pipeline(&graph);
        // value truncated at 15 chars, duplicate dropped entirely
        assert_eq!(text, "[1]<input type=text name=delivery-instru.../>\n");
    }

    #[test]
    fn role_matching_the_tag_is_dropped() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let button = fx.widget(body, "button", "button", "Go");
        fx.set_attr(button, "role", "button");
        let other = fx.widget(body, "div", "button", "Custom");
        fx.set_attr(other, "role", "button");
        let graph = fx.build();

        let text = pipeline(&graph);
        assert_eq!(text, "[1]<button/>\n[2]<div role=button/>\n");
    }
}
