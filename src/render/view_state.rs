use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Main,
    History,
    Paths,
    Info,
}

impl ActiveView {
    pub const ALL: [ActiveView; 4] = [ActiveView::Main, ActiveView::History, ActiveView::Paths, ActiveView::Info];

    pub fn title(&self) -> &'static str {
        match self {
            ActiveView::Main => "Diagnostics",
            ActiveView::History => "History",
            ActiveView::Paths => "Network paths",
            ActiveView::Info => "About",
        }
    }
}

/// The single live view state. Owned by the app and lent to the renderer and to the
/// snapshot writer; nothing else mutates it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub zoom_scale: f32,
    pub active_view: ActiveView,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom_scale: 1.0,
            active_view: ActiveView::Main,
        }
    }
}

impl ViewState {
    pub fn clamped_zoom(&self) -> f32 {
        clamp_zoom(self.zoom_scale)
    }
}

/// Keeps a zoom factor inside the supported extent. Non-finite input falls back to 1.
pub fn clamp_zoom(scale: f32) -> f32 {
    if scale.is_finite() {
        scale.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_zoom() {
        assert_eq!(clamp_zoom(0.1), MIN_ZOOM);
        assert_eq!(clamp_zoom(7.0), MAX_ZOOM);
        assert_eq!(clamp_zoom(f32::NAN), 1.0);
        assert_eq!(clamp_zoom(1.4), 1.4);
    }

    #[test]
    fn test_active_view_wire_names() {
        assert_eq!(serde_json::to_string(&ActiveView::Paths).unwrap(), "\"paths\"");
        let view: ActiveView = serde_json::from_str("\"history\"").unwrap();
        assert_eq!(view, ActiveView::History);
    }
}
