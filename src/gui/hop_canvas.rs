use std::time::Instant;

use eframe::egui::{
    self, Align2, Color32, FontId, Pos2, Rect, Sense, Shape, Stroke, Ui, Vec2, pos2, vec2,
};
use tracing::debug;

use crate::{
    gui::{hop_panel::HopPanel, session::MainPanel, session::Visualization},
    network::hop::TimeoutSentinel,
    render::{
        hop_graph::{DEFAULT_HEIGHT, HopGraphRenderer, VisualizationHandle, Viewport},
        scene::SceneBuffer,
        view_state::ViewState,
    },
};

/// Scroll distance, in points, that doubles or halves the zoom.
const SCROLL_PER_OCTAVE: f32 = 240.0;

/// Interactive view of the current hop graph.
///
/// Holds at most one `VisualizationHandle`; a new run or a resize replaces it.
pub struct HopCanvas {
    renderer: HopGraphRenderer,
    scene: SceneBuffer,
    handle: Option<VisualizationHandle>,
    rendered_generation: Option<u64>,
    rendered_width: f32,
    selected: Option<usize>,
    /// The selected node's panel is pinned; clicks on empty canvas keep it open.
    pinned: bool,
}

impl HopCanvas {
    pub fn new(sentinel: TimeoutSentinel) -> Self {
        Self {
            renderer: HopGraphRenderer::new(sentinel),
            scene: SceneBuffer::default(),
            handle: None,
            rendered_generation: None,
            rendered_width: 0.0,
            selected: None,
            pinned: false,
        }
    }

    /// Re-renders when the main panel carries a new result or the available width changed.
    fn sync(&mut self, panel: &MainPanel, width: f32, view_state: &ViewState) {
        let stale = self.rendered_generation != Some(panel.generation) || (width - self.rendered_width).abs() > 1.0;
        if !stale {
            return;
        }
        self.rendered_generation = Some(panel.generation);
        self.rendered_width = width;
        self.selected = None;
        self.pinned = false;

        let hops = match &panel.visualization {
            Visualization::Hops(run) => run.hops.as_slice(),
            _ => &[],
        };
        self.handle = self
            .renderer
            .render(hops, Viewport::new(width, DEFAULT_HEIGHT), view_state, &mut self.scene)
            .map_err(|e| debug!(error = %e, "nothing drawn"))
            .ok();
    }

    pub fn zoom_in(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.zoom_in(Instant::now());
        }
    }

    pub fn zoom_out(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.zoom_out(Instant::now());
        }
    }

    pub fn reset_zoom(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.reset(Instant::now());
        }
    }

    pub fn show(&mut self, ui: &mut Ui, panel: &MainPanel, view_state: &mut ViewState) {
        let width = ui.available_width();
        self.sync(panel, width, view_state);

        let (rect, response) = ui.allocate_exact_size(vec2(width, DEFAULT_HEIGHT), Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 4.0, ui.visuals().extreme_bg_color);

        let Some(handle) = self.handle.as_mut() else {
            let message = self.scene.placeholder.as_deref().unwrap_or("No data to visualize");
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                message,
                FontId::proportional(16.0),
                ui.visuals().weak_text_color(),
            );
            return;
        };

        if response.hovered() {
            let scroll = ui.input_mut(take_scroll);
            if scroll != 0.0 {
                if let Some(pointer) = response.hover_pos() {
                    let factor = 2f32.powf(scroll / SCROLL_PER_OCTAVE);
                    let anchor = (pointer - rect.min).to_pos2();
                    handle.zoom_around(factor, anchor, view_state, &mut self.scene);
                }
            }
        }
        if response.dragged() {
            handle.pan(response.drag_delta(), view_state, &mut self.scene);
        }
        if handle.tick(Instant::now(), view_state, &mut self.scene) {
            ui.ctx().request_repaint();
        }

        let transform = handle.transform();
        let to_screen = |p: Pos2| rect.min + transform.apply(p).to_vec2();
        let scale = transform.scale;

        for link in &self.scene.links {
            let stroke = Stroke::new(link.style.width, link.style.color);
            painter.extend(Shape::dashed_line(
                &[to_screen(link.from), to_screen(link.to)],
                stroke,
                link.style.dash.0 * scale,
                link.style.dash.1 * scale,
            ));
        }

        let hovered = response.hover_pos().and_then(|pointer| {
            self.scene
                .nodes
                .iter()
                .position(|node| to_screen(node.center).distance(pointer) <= node.radius * scale)
        });
        if response.clicked() && (hovered.is_some() || !self.pinned) {
            self.selected = hovered;
            self.pinned = false;
        }

        for (index, node) in self.scene.nodes.iter().enumerate() {
            let center = to_screen(node.center);
            let emphasis = if Some(index) == hovered || Some(index) == self.selected {
                1.5
            } else {
                1.0
            };
            painter.circle(
                center,
                node.radius * scale,
                node.role.fill(),
                Stroke::new(2.0 * emphasis, node.role.stroke()),
            );
        }

        let text_color = ui.visuals().text_color();
        for label in self.scene.visible_labels() {
            let Some(node) = self.scene.nodes.get(label.node) else {
                continue;
            };
            let pos = to_screen(node.center) + vec2(0.0, label.tier.offset_y() * scale);
            painter.text(
                pos,
                Align2::CENTER_CENTER,
                &label.text,
                FontId::proportional(label.font.px() * scale.max(1.0)),
                text_color,
            );
        }

        legend(&painter, rect);

        let panel_node = if self.pinned { self.selected } else { hovered.or(self.selected) };
        if let Some(index) = panel_node {
            if let Some(node) = self.scene.nodes.get(index) {
                let anchor = to_screen(node.center) + vec2(node.radius * scale, 0.0);
                let panel = HopPanel::new(egui::Id::new(("hop_panel", index)), anchor);
                let shown = panel.show(ui.ctx(), node);
                if shown.close_clicked {
                    self.selected = None;
                    self.pinned = false;
                } else if shown.pinned {
                    self.selected = Some(index);
                    self.pinned = true;
                }
            }
        }
    }
}

/// Takes this frame's vertical scroll for zooming, leaving none for an enclosing scroll area.
fn take_scroll(input: &mut egui::InputState) -> f32 {
    let scroll = input.smooth_scroll_delta.y;
    input.smooth_scroll_delta = Vec2::ZERO;
    input.raw_scroll_delta = Vec2::ZERO;
    scroll
}

fn legend(painter: &egui::Painter, rect: Rect) {
    use crate::render::hop_graph::NodeRole;

    let mut pos = pos2(rect.left() + 12.0, rect.bottom() - 14.0);
    for role in [NodeRole::Source, NodeRole::Relay, NodeRole::Timeout, NodeRole::Destination] {
        painter.circle_filled(pos, 5.0, role.fill());
        let galley = painter.text(
            pos + Vec2::new(9.0, 0.0),
            Align2::LEFT_CENTER,
            role.title(),
            FontId::proportional(11.0),
            Color32::GRAY,
        );
        pos.x = galley.right() + 14.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_takes_scroll_from_enclosing_area() {
        let mut input = egui::InputState::default();
        input.smooth_scroll_delta = vec2(3.0, -48.0);
        input.raw_scroll_delta = vec2(0.0, -50.0);

        assert_eq!(take_scroll(&mut input), -48.0);
        assert_eq!(input.smooth_scroll_delta, Vec2::ZERO);
        assert_eq!(input.raw_scroll_delta, Vec2::ZERO);
        assert_eq!(take_scroll(&mut input), 0.0);
    }
}
