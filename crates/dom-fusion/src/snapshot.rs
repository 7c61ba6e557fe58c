//! Decoder for the columnar `DOMSnapshot.captureSnapshot` payload.
//!
//! The snapshot arrives as parallel arrays indexed into a shared string
//! table. This module flattens it into per-node layout records keyed by
//! backend node id, with all geometry normalized from device pixels to CSS
//! pixels.

use std::collections::HashMap;

use serde_json::Value;

use pagelens_core_types::BackendNodeId;

use crate::error::FusionError;
use crate::model::{LayoutRecord, Rect, ScrollInfo};

/// Computed styles requested from the snapshot, in request order. The
/// `styles` column of each layout row is parallel to this list.
pub const REQUIRED_COMPUTED_STYLES: &[&str] = &[
    "display",
    "visibility",
    "opacity",
    "cursor",
    "pointer-events",
    "overflow",
    "overflow-x",
    "overflow-y",
    "position",
];

/// Decoded snapshot: layout rows by backend node id plus per-frame document
/// scroll offsets (used to re-anchor iframe content coordinates).
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    pub layout: HashMap<BackendNodeId, LayoutRecord>,
    /// frame id string -> (scrollOffsetX, scrollOffsetY) in CSS pixels.
    pub frame_scroll_offsets: HashMap<String, (f64, f64)>,
    /// Backend ids the renderer flagged as click targets.
    pub clickable: std::collections::HashSet<BackendNodeId>,
}

pub fn parse_snapshot(raw: &Value, device_pixel_ratio: f64) -> Result<SnapshotIndex, FusionError> {
    let dpr = if device_pixel_ratio > 0.0 {
        device_pixel_ratio
    } else {
        1.0
    };
    let strings: Vec<&str> = raw
        .get("strings")
        .and_then(Value::as_array)
        .ok_or_else(|| FusionError::malformed("snapshot missing strings table"))?
        .iter()
        .map(|v| v.as_str().unwrap_or(""))
        .collect();
    let documents = raw
        .get("documents")
        .and_then(Value::as_array)
        .ok_or_else(|| FusionError::malformed("snapshot missing documents"))?;

    let mut index = SnapshotIndex::default();
    for document in documents {
        parse_document(document, &strings, dpr, &mut index)?;
    }
    Ok(index)
}

fn parse_document(
    document: &Value,
    strings: &[&str],
    dpr: f64,
    index: &mut SnapshotIndex,
) -> Result<(), FusionError> {
    let nodes = document
        .get("nodes")
        .ok_or_else(|| FusionError::malformed("document missing nodes"))?;
    let backend_ids = int_column(nodes, "backendNodeId");

    if let Some(frame_id) = string_at(strings, document.get("frameId")) {
        let sx = document
            .get("scrollOffsetX")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            / dpr;
        let sy = document
            .get("scrollOffsetY")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            / dpr;
        index.frame_scroll_offsets.insert(frame_id.to_string(), (sx, sy));
    }

    // isClickable is sparse: a list of node indexes.
    if let Some(click_indexes) = nodes
        .get("isClickable")
        .and_then(|c| c.get("index"))
        .and_then(Value::as_array)
    {
        for node_index in click_indexes.iter().filter_map(Value::as_u64) {
            if let Some(backend) = backend_ids.get(node_index as usize) {
                index.clickable.insert(BackendNodeId(*backend as u64));
            }
        }
    }

    let Some(layout) = document.get("layout") else {
        return Ok(());
    };
    let node_indexes = int_column(layout, "nodeIndex");
    let bounds = rect_column(layout, "bounds", dpr);
    let styles = layout.get("styles").and_then(Value::as_array);
    let paint_orders = int_column(layout, "paintOrders");
    let scroll_rects = rect_column(layout, "scrollRects", dpr);
    let client_rects = rect_column(layout, "clientRects", dpr);

    for (row, node_index) in node_indexes.iter().enumerate() {
        let Some(backend) = backend_ids.get(*node_index as usize) else {
            continue;
        };
        let backend = BackendNodeId(*backend as u64);

        let mut record = LayoutRecord {
            bounds: bounds.get(row).copied().flatten(),
            paint_order: paint_orders.get(row).map(|p| *p as u32),
            ..Default::default()
        };

        if let Some(style_row) = styles.and_then(|s| s.get(row)).and_then(Value::as_array) {
            for (style_idx, name) in REQUIRED_COMPUTED_STYLES.iter().enumerate() {
                if let Some(value) = string_at(strings, style_row.get(style_idx)) {
                    if !value.is_empty() {
                        record.styles.insert((*name).to_string(), value.to_string());
                    }
                }
            }
        }

        let scroll_rect = scroll_rects.get(row).copied().flatten();
        let client_rect = client_rects.get(row).copied().flatten();
        if let (Some(sr), Some(cr)) = (scroll_rect, client_rect) {
            record.scroll = Some(ScrollInfo {
                scroll_left: sr.x,
                scroll_top: sr.y,
                scroll_width: sr.width,
                scroll_height: sr.height,
                client_width: cr.width,
                client_height: cr.height,
            });
        }

        // Later rows for the same backend id (pseudo elements) never
        // replace the primary one.
        index.layout.entry(backend).or_insert(record);
    }
    Ok(())
}

fn int_column(parent: &Value, name: &str) -> Vec<i64> {
    parent
        .get(name)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

fn rect_column(parent: &Value, name: &str, dpr: f64) -> Vec<Option<Rect>> {
    parent
        .get(name)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    let quad: Vec<f64> = row
                        .as_array()?
                        .iter()
                        .filter_map(Value::as_f64)
                        .collect();
                    if quad.len() == 4 {
                        Some(Rect::new(
                            quad[0] / dpr,
                            quad[1] / dpr,
                            quad[2] / dpr,
                            quad[3] / dpr,
                        ))
                    } else {
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

fn string_at<'a>(strings: &'a [&str], index: Option<&Value>) -> Option<&'a str> {
    let idx = index?.as_i64()?;
    if idx < 0 {
        return None;
    }
    strings.get(idx as usize).copied()
}
