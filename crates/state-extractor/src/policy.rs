//! Tunables for detection, filtering, and serialization.

/// Attribute allowlist in serialization order.
pub const DEFAULT_ATTRIBUTE_ALLOWLIST: &[&str] = &[
    "title",
    "type",
    "checked",
    "name",
    "role",
    "value",
    "placeholder",
    "alt",
    "for",
    "href",
    "aria-label",
    "aria-expanded",
];

#[derive(Debug, Clone)]
pub struct ExtractorPolicy {
    /// Pixels added around the viewport before the in-view test.
    pub viewport_buffer_px: f64,
    /// Coordinates past this magnitude are treated as parked off-canvas.
    pub off_canvas_threshold_px: f64,
    /// Visible text is truncated past this many characters.
    pub max_text_len: usize,
    /// Attribute values are truncated past this many characters.
    pub max_attr_len: usize,
    /// Best-effort paint-order occlusion filtering.
    pub paint_order_filtering: bool,
    pub attribute_allowlist: Vec<String>,
}

impl Default for ExtractorPolicy {
    fn default() -> Self {
        Self {
            viewport_buffer_px: 100.0,
            off_canvas_threshold_px: 10_000.0,
            max_text_len: 100,
            max_attr_len: 15,
            paint_order_filtering: true,
            attribute_allowlist: DEFAULT_ATTRIBUTE_ALLOWLIST
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}
