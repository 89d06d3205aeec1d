/*!
Layout and labelling of a single traceroute run as a horizontal hop graph.

`HopGraphRenderer::render` lays the hops out once and draws them into a `RenderTarget`.
The returned `VisualizationHandle` owns that layout; zooming and panning only recompute
label visibility through it and never move a node.
*/

use std::time::{Duration, Instant};

use eframe::egui::{Color32, Pos2, Vec2, pos2};
use thiserror::Error;
use tracing::debug;

use crate::{
    network::hop::{HopRecord, TimeoutSentinel, is_timeout},
    render::{
        label_policy::{FontTier, LabelPlan, LabelTier, label_plan, truncate_label},
        view_state::{ViewState, clamp_zoom},
        zoom::{RESET_DURATION, ZOOM_STEP_DURATION, ZoomAnimation},
    },
};

pub const PADDING: f32 = 40.0;
pub const DEFAULT_HEIGHT: f32 = 420.0;
/// Vertical distance between the two rows nodes alternate on.
const ROW_OFFSET: f32 = 160.0;

const ZOOM_STEP: f32 = 0.1;
const ZOOM_IN_LIMIT: f32 = 2.0;

pub const NO_DATA_MESSAGE: &str = "No data to visualize";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisualizationError {
    #[error("No hops to visualize")]
    NoData,
    /// The result is not a traceroute, or its hop data could not be read.
    #[error("No visualization available for this {0} result")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Source,
    Destination,
    Relay,
    Timeout,
}

impl NodeRole {
    pub fn fill(&self) -> Color32 {
        match self {
            NodeRole::Source => Color32::from_rgb(0xe7, 0x4c, 0x3c),
            NodeRole::Destination => Color32::from_rgb(0x27, 0xae, 0x60),
            NodeRole::Relay => Color32::from_rgb(0x34, 0x98, 0xdb),
            NodeRole::Timeout => Color32::from_rgb(0x95, 0xa5, 0xa6),
        }
    }

    pub fn stroke(&self) -> Color32 {
        match self {
            NodeRole::Source => Color32::from_rgb(0xc0, 0x39, 0x2b),
            NodeRole::Destination => Color32::from_rgb(0x22, 0x99, 0x54),
            NodeRole::Relay => Color32::from_rgb(0x29, 0x80, 0xb9),
            NodeRole::Timeout => Color32::from_rgb(0x7f, 0x8c, 0x8d),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            NodeRole::Source => "Source",
            NodeRole::Destination => "Destination",
            NodeRole::Relay => "Relay",
            NodeRole::Timeout => "Timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkStyle {
    pub color: Color32,
    pub width: f32,
    /// Dash and gap length.
    pub dash: (f32, f32),
}

pub const DASHED_LINK: LinkStyle = LinkStyle {
    color: Color32::from_rgb(0x34, 0x98, 0xdb),
    width: 2.0,
    dash: (5.0, 5.0),
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        let height = if height > 0.0 { height } else { DEFAULT_HEIGHT };
        Self {
            width: width.max(2.0 * PADDING),
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopNode {
    pub hop: HopRecord,
    pub role: NodeRole,
    pub timed_out: bool,
    pub center: Pos2,
    pub radius: f32,
}

impl HopNode {
    pub fn hop_text(&self) -> String {
        match self.hop.hop_index {
            0 => "Hop ?".to_string(),
            n => format!("Hop {n}"),
        }
    }

    pub fn rtt_text(&self) -> String {
        if self.timed_out {
            return "Timeout".to_string();
        }
        match self.hop.rtt_samples().next() {
            Some(rtt) => format!("~{rtt} ms"),
            None => "Timeout".to_string(),
        }
    }

    /// Tooltip lines: name, address, depth, every present sample, and status.
    pub fn details(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Host: {}", self.hop.display_name()),
            format!("IP: {}", if self.hop.ip.trim().is_empty() { "N/A" } else { self.hop.ip.trim() }),
            self.hop_text(),
        ];
        for (i, rtt) in self.hop.rtts().into_iter().enumerate() {
            if let Some(rtt) = rtt.map(str::trim).filter(|r| !crate::network::hop::is_empty_sample(r)) {
                lines.push(format!("RTT{}: {} ms", i + 1, rtt));
            }
        }
        lines.push(format!("Status: {}", if self.timed_out { "timeout" } else { "reachable" }));
        lines
    }
}

/// Node geometry computed once per render.
#[derive(Debug, Clone, PartialEq)]
pub struct HopLayout {
    pub viewport: Viewport,
    /// Unscaled spacing estimate the label policy works from.
    pub step_approx: f32,
    pub nodes: Vec<HopNode>,
}

impl HopLayout {
    pub fn compute(hops: &[HopRecord], viewport: Viewport, sentinel: &TimeoutSentinel) -> Self {
        let n = hops.len();
        let usable = viewport.width - 2.0 * PADDING;
        let step_approx = usable / (n as f32 + 1.0);
        let radius = node_radius(step_approx);
        let base_y = viewport.height / 3.0;

        let nodes = hops
            .iter()
            .enumerate()
            .map(|(i, hop)| {
                let x = if n > 1 {
                    PADDING + usable * i as f32 / (n - 1) as f32
                } else {
                    viewport.width / 2.0
                };
                let y = if i % 2 == 0 { base_y } else { base_y + ROW_OFFSET };
                let timed_out = is_timeout(hop, sentinel);
                let role = if timed_out {
                    NodeRole::Timeout
                } else if i == 0 {
                    NodeRole::Source
                } else if i == n - 1 {
                    NodeRole::Destination
                } else {
                    NodeRole::Relay
                };
                HopNode {
                    hop: hop.clone(),
                    role,
                    timed_out,
                    center: pos2(x, y),
                    radius,
                }
            })
            .collect();

        Self {
            viewport,
            step_approx,
            nodes,
        }
    }

    /// Label texts and visibility for every node under `plan`.
    pub fn labels(&self, plan: &LabelPlan) -> Vec<NodeLabel> {
        let mut labels = Vec::with_capacity(self.nodes.len() * LabelTier::ALL.len());
        for (index, node) in self.nodes.iter().enumerate() {
            for tier in LabelTier::ALL {
                let text = match tier {
                    LabelTier::HopIndex => node.hop_text(),
                    LabelTier::Host => truncate_label(node.hop.short_label(), plan.host_max_len),
                    LabelTier::Ip => node.hop.ip.trim().to_string(),
                    LabelTier::Rtt => node.rtt_text(),
                };
                labels.push(NodeLabel {
                    node: index,
                    tier,
                    visible: plan.is_visible(tier, index) && !text.is_empty(),
                    text,
                    font: plan.font(tier),
                });
            }
        }
        labels
    }
}

/// Node radius for the unscaled spacing.
pub fn node_radius(step_approx: f32) -> f32 {
    if step_approx >= 100.0 {
        15.0
    } else if step_approx >= 70.0 {
        12.0
    } else {
        10.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeLabel {
    pub node: usize,
    pub tier: LabelTier,
    pub text: String,
    pub font: FontTier,
    pub visible: bool,
}

/// Surface a hop graph is drawn onto.
pub trait RenderTarget {
    fn clear(&mut self);
    fn draw_node(&mut self, index: usize, node: &HopNode);
    fn draw_link(&mut self, from: Pos2, to: Pos2, style: LinkStyle);
    /// Creates or updates the label of `label.tier` on node `label.node`.
    fn set_label(&mut self, label: &NodeLabel);
    fn draw_placeholder(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomTransform {
    pub scale: f32,
    pub translation: Vec2,
}

impl Default for ZoomTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translation: Vec2::ZERO,
        }
    }
}

impl ZoomTransform {
    pub fn apply(&self, pos: Pos2) -> Pos2 {
        pos2(pos.x * self.scale, pos.y * self.scale) + self.translation
    }

    pub fn invert(&self, pos: Pos2) -> Pos2 {
        let p = pos - self.translation;
        pos2(p.x / self.scale, p.y / self.scale)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HopGraphRenderer {
    sentinel: TimeoutSentinel,
}

impl HopGraphRenderer {
    pub fn new(sentinel: TimeoutSentinel) -> Self {
        Self { sentinel }
    }

    /// Clears `target` and draws `hops` into it at the zoom recorded in `view_state`.
    ///
    /// An empty run draws the "no data" placeholder and returns `VisualizationError::NoData`.
    pub fn render<T: RenderTarget + ?Sized>(
        &self,
        hops: &[HopRecord],
        viewport: Viewport,
        view_state: &ViewState,
        target: &mut T,
    ) -> Result<VisualizationHandle, VisualizationError> {
        target.clear();
        if hops.is_empty() {
            target.draw_placeholder(NO_DATA_MESSAGE);
            return Err(VisualizationError::NoData);
        }

        let layout = HopLayout::compute(hops, viewport, &self.sentinel);
        debug!(hops = layout.nodes.len(), step = layout.step_approx, "laid out hop graph");

        for pair in layout.nodes.windows(2) {
            target.draw_link(pair[0].center, pair[1].center, DASHED_LINK);
        }
        for (index, node) in layout.nodes.iter().enumerate() {
            target.draw_node(index, node);
        }

        let scale = view_state.clamped_zoom();
        let mut handle = VisualizationHandle {
            plan: label_plan(layout.step_approx * scale, layout.nodes.len()),
            layout,
            transform: ZoomTransform {
                scale,
                translation: Vec2::ZERO,
            },
            animation: None,
        };
        handle.relabel(target);
        Ok(handle)
    }
}

/// The live visualization of one run. Dropping it is the only disposal needed.
#[derive(Debug, Clone)]
pub struct VisualizationHandle {
    layout: HopLayout,
    transform: ZoomTransform,
    plan: LabelPlan,
    animation: Option<ZoomAnimation>,
}

impl VisualizationHandle {
    #[cfg(test)]
    pub fn layout(&self) -> &HopLayout {
        &self.layout
    }

    pub fn transform(&self) -> ZoomTransform {
        self.transform
    }

    pub fn effective_step(&self) -> f32 {
        self.layout.step_approx * self.transform.scale
    }

    #[cfg(test)]
    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Adopts a new zoom/pan transform and refreshes label visibility. Geometry is untouched.
    pub fn apply_transform<T: RenderTarget + ?Sized>(
        &mut self,
        transform: ZoomTransform,
        view_state: &mut ViewState,
        target: &mut T,
    ) {
        self.transform = ZoomTransform {
            scale: clamp_zoom(transform.scale),
            translation: transform.translation,
        };
        view_state.zoom_scale = self.transform.scale;
        self.plan = label_plan(self.effective_step(), self.layout.nodes.len());
        self.relabel(target);
    }

    pub fn pan<T: RenderTarget + ?Sized>(&mut self, delta: Vec2, view_state: &mut ViewState, target: &mut T) {
        let transform = ZoomTransform {
            scale: self.transform.scale,
            translation: self.transform.translation + delta,
        };
        self.apply_transform(transform, view_state, target);
    }

    /// Zooms by `factor` keeping the scene point under `anchor` (screen space) in place.
    pub fn zoom_around<T: RenderTarget + ?Sized>(
        &mut self,
        factor: f32,
        anchor: Pos2,
        view_state: &mut ViewState,
        target: &mut T,
    ) {
        let scene = self.transform.invert(anchor);
        let scale = clamp_zoom(self.transform.scale * factor);
        let translation = anchor - pos2(scene.x * scale, scene.y * scale);
        self.animation = None;
        self.apply_transform(ZoomTransform { scale, translation }, view_state, target);
    }

    /// Starts an animated step up; ignored at or above 2x.
    pub fn zoom_in(&mut self, now: Instant) -> bool {
        if self.transform.scale < ZOOM_IN_LIMIT {
            self.zoom_to(self.transform.scale + ZOOM_STEP, now, ZOOM_STEP_DURATION);
            true
        } else {
            false
        }
    }

    /// Starts an animated step down; ignored at the lower bound.
    pub fn zoom_out(&mut self, now: Instant) -> bool {
        if self.transform.scale > crate::render::view_state::MIN_ZOOM {
            self.zoom_to(self.transform.scale - ZOOM_STEP, now, ZOOM_STEP_DURATION);
            true
        } else {
            false
        }
    }

    pub fn zoom_to(&mut self, scale: f32, now: Instant, duration: Duration) {
        self.animation = Some(ZoomAnimation::new(
            self.transform.scale,
            clamp_zoom(scale),
            now,
            duration,
        ));
    }

    /// Animates back to scale 1 and clears any pan offset.
    pub fn reset(&mut self, now: Instant) {
        self.transform.translation = Vec2::ZERO;
        self.zoom_to(1.0, now, RESET_DURATION);
    }

    /// Advances a running zoom animation. Returns true while more frames are needed.
    pub fn tick<T: RenderTarget + ?Sized>(&mut self, now: Instant, view_state: &mut ViewState, target: &mut T) -> bool {
        let Some(animation) = self.animation.clone() else {
            return false;
        };
        let transform = ZoomTransform {
            scale: animation.scale_at(now),
            translation: self.transform.translation,
        };
        self.apply_transform(transform, view_state, target);
        if animation.is_finished(now) {
            self.animation = None;
            false
        } else {
            true
        }
    }

    fn relabel<T: RenderTarget + ?Sized>(&mut self, target: &mut T) {
        for label in self.layout.labels(&self.plan) {
            target.set_label(&label);
        }
    }
}
