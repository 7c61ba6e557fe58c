//! Interactive element detection.
//!
//! A pure, short-circuiting priority chain over one fused node. Signals are
//! checked from cheapest to most speculative and the chain fails closed:
//! a node no rule accepts is not interactive.

use pagelens_dom_fusion::{EnhancedNode, NodeKind};

/// Tags that are never interaction targets themselves.
const STRUCTURAL_TAGS: &[&str] = &[
    "html", "body", "head", "title", "meta", "style", "script", "link",
];

/// Tags interactive by nature, no further evidence needed.
const INTRINSIC_TAGS: &[&str] = &[
    "button", "input", "select", "textarea", "option", "summary", "label",
];

/// AX roles that denote a widget the user operates.
const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "tab",
    "combobox",
    "textbox",
    "searchbox",
    "slider",
    "spinbutton",
    "switch",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "listbox",
    "gridcell",
    "tree",
];

/// Containers where `cursor: pointer` usually just leaks from a child.
const POINTER_EXEMPT_CONTAINERS: &[&str] = &[
    "main", "section", "article", "aside", "nav", "header", "footer",
];

const HANDLER_ATTRIBUTES: &[&str] = &[
    "onclick",
    "onmousedown",
    "onmouseup",
    "ondblclick",
    "onkeydown",
    "onkeyup",
    "onkeypress",
];

const ACTION_DATA_ATTRIBUTES: &[&str] = &["data-action", "data-toggle", "data-href", "jsaction"];

/// AX properties whose presence alone marks an operable widget state.
const WIDGET_STATE_PROPERTIES: &[&str] = &["checked", "expanded", "pressed", "selected"];

pub fn is_interactive(node: &EnhancedNode) -> bool {
    if node.kind != NodeKind::Element {
        return false;
    }
    if STRUCTURAL_TAGS.contains(&node.tag.as_str()) {
        return false;
    }
    // Collapsed widgets take no clicks.
    if node
        .absolute_bounds
        .map(|b| b.area() <= 0.0)
        .unwrap_or(true)
    {
        return false;
    }
    if let Some(ax) = &node.ax {
        if ax.ignored
            || ax.bool_property("disabled") == Some(true)
            || ax.bool_property("readonly") == Some(true)
        {
            return false;
        }
    }

    if INTRINSIC_TAGS.contains(&node.tag.as_str()) {
        // A hidden input is markup plumbing, not a widget.
        return !(node.tag == "input" && node.attr("type") == Some("hidden"));
    }
    if node.tag == "a" && node.attr("href").is_some() {
        return true;
    }

    let role = node.ax_role().or_else(|| node.attr("role"));
    if role.is_some_and(|r| INTERACTIVE_ROLES.contains(&r)) {
        return true;
    }

    if node
        .layout
        .as_ref()
        .and_then(|l| l.style("cursor"))
        .is_some_and(|c| c == "pointer")
        && !POINTER_EXEMPT_CONTAINERS.contains(&node.tag.as_str())
    {
        return true;
    }

    if HANDLER_ATTRIBUTES.iter().any(|a| node.attr(a).is_some()) {
        return true;
    }
    if node
        .attr("tabindex")
        .and_then(|t| t.parse::<i32>().ok())
        .is_some_and(|t| t >= 0)
    {
        return true;
    }
    if matches!(node.attr("contenteditable"), Some("true") | Some("")) {
        return true;
    }
    if node.attr("draggable") == Some("true") {
        return true;
    }
    if ACTION_DATA_ATTRIBUTES.iter().any(|a| node.attr(a).is_some()) {
        return true;
    }

    if let Some(ax) = &node.ax {
        if ax.bool_property("focusable") == Some(true)
            || ax.bool_property("editable") == Some(true)
            || ax.bool_property("settable") == Some(true)
        {
            return true;
        }
        if WIDGET_STATE_PROPERTIES
            .iter()
            .any(|p| ax.property(p).is_some())
        {
            return true;
        }
        if ax
            .property("hasPopup")
            .is_some_and(|v| v.as_str().map(|s| s != "false").unwrap_or(true))
        {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagelens_core_types::{BackendNodeId, TargetId};
    use pagelens_dom_fusion::{AxProperty, AxRecord, LayoutRecord, Rect};
    use serde_json::json;
    use std::collections::HashMap;

    fn element(tag: &str) -> EnhancedNode {
        EnhancedNode {
            node_id: 1,
            backend_node_id: BackendNodeId(1),
            kind: NodeKind::Element,
            tag: tag.to_string(),
            text: None,
            attributes: HashMap::new(),
            frame_id: None,
            target_id: TargetId("t".into()),
            parent: None,
            children: Vec::new(),
            content_document: None,
            shadow_roots: Vec::new(),
            ax: None,
            layout: None,
            absolute_bounds: Some(Rect::new(0.0, 0.0, 50.0, 20.0)),
            is_visible: true,
            is_scrollable: false,
            is_cross_origin_frame: false,
            snapshot_clickable: false,
        }
    }

    #[test]
    fn intrinsic_tags_are_interactive() {
        assert!(is_interactive(&element("button")));
        assert!(is_interactive(&element("select")));
        let mut hidden = element("input");
        hidden.attributes.insert("type".into(), "hidden".into());
        assert!(!is_interactive(&hidden));
    }

    #[test]
    fn anchor_needs_href() {
        let mut link = element("a");
        assert!(!is_interactive(&link));
        link.attributes.insert("href".into(), "/cart".into());
        assert!(is_interactive(&link));
    }

    #[test]
    fn ax_role_accepts_and_disabled_rejects() {
        let mut node = element("div");
        node.ax = Some(AxRecord {
            role: Some("checkbox".into()),
            ..Default::default()
        });
        assert!(is_interactive(&node));

        node.ax = Some(AxRecord {
            role: Some("checkbox".into()),
            properties: vec![AxProperty {
                name: "disabled".into(),
                value: json!(true),
            }],
            ..Default::default()
        });
        assert!(!is_interactive(&node));
    }

    #[test]
    fn cursor_pointer_counts_except_on_containers() {
        let mut div = element("div");
        let mut layout = LayoutRecord::default();
        layout.styles.insert("cursor".into(), "pointer".into());
        div.layout = Some(layout.clone());
        assert!(is_interactive(&div));

        let mut nav = element("nav");
        nav.layout = Some(layout);
        assert!(!is_interactive(&nav));
    }

    #[test]
    fn zero_area_fails_closed() {
        let mut node = element("button");
        node.absolute_bounds = Some(Rect::new(0.0, 0.0, 0.0, 0.0));
        assert!(!is_interactive(&node));
        node.absolute_bounds = None;
        assert!(!is_interactive(&node));
    }

    #[test]
    fn tabindex_and_handlers_accept() {
        let mut node = element("span");
        node.attributes.insert("tabindex".into(), "0".into());
        assert!(is_interactive(&node));

        let mut negative = element("span");
        negative.attributes.insert("tabindex".into(), "-1".into());
        assert!(!is_interactive(&negative));

        let mut handler = element("div");
        handler.attributes.insert("onclick".into(), "go()".into());
        assert!(is_interactive(&handler));
    }

    #[test]
    fn plain_div_is_rejected() {
        assert!(!is_interactive(&element("div")));
        assert!(!is_interactive(&element("body")));
    }
}
