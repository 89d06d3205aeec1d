/*!
Zoom-dependent label visibility for the hop graph.

Two independent axes decide whether a label is drawn: a stride (only every Nth node carries
labels) and a per-tier minimum effective step. A label is shown only if both allow it.
*/

/// Effective step below which every tier collapses to every 5th node.
const STRIDE_5_STEP: f32 = 25.0;
const STRIDE_3_STEP: f32 = 35.0;
const STRIDE_2_STEP: f32 = 45.0;

const HOST_MIN_STEP: f32 = 35.0;
const RTT_MIN_STEP: f32 = 55.0;
const IP_MIN_STEP: f32 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LabelTier {
    HopIndex,
    Host,
    Ip,
    Rtt,
}

impl LabelTier {
    pub const ALL: [LabelTier; 4] = [LabelTier::HopIndex, LabelTier::Host, LabelTier::Ip, LabelTier::Rtt];

    /// Vertical offset of the label relative to its node center.
    pub fn offset_y(&self) -> f32 {
        match self {
            LabelTier::HopIndex => -30.0,
            LabelTier::Host => -15.0,
            LabelTier::Ip => 25.0,
            LabelTier::Rtt => 40.0,
        }
    }
}

/// Discrete font sizes, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FontTier {
    Tiny,
    Small,
    Medium,
    Large,
}

impl FontTier {
    pub fn px(&self) -> f32 {
        match self {
            FontTier::Tiny => 7.0,
            FontTier::Small => 8.0,
            FontTier::Medium => 9.0,
            FontTier::Large => 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlan {
    pub show_every: usize,
    /// Hop numbers have no step threshold; only the stride thins them out.
    pub show_hop: bool,
    pub show_host: bool,
    pub show_ip: bool,
    pub show_rtt: bool,
    pub host_max_len: usize,
    pub host_font: FontTier,
    pub hop_font: FontTier,
    pub ip_font: FontTier,
}

impl LabelPlan {
    /// Whether the label of `tier` on the node at `index` is visible under this plan.
    pub fn is_visible(&self, tier: LabelTier, index: usize) -> bool {
        let on_stride = index % self.show_every == 0;
        match tier {
            // Hop numbers stay on every node until the graph is very dense.
            LabelTier::HopIndex => {
                self.show_hop && (self.show_every < 4 || index % self.show_every.max(2) == 0)
            }
            LabelTier::Host => self.show_host && on_stride,
            LabelTier::Ip => self.show_ip && on_stride,
            LabelTier::Rtt => self.show_rtt && on_stride,
        }
    }

    pub fn font(&self, tier: LabelTier) -> FontTier {
        match tier {
            LabelTier::HopIndex => self.hop_font,
            LabelTier::Host => self.host_font,
            LabelTier::Ip => self.ip_font,
            LabelTier::Rtt => FontTier::Small,
        }
    }
}

/// Decides label visibility for a graph of `hop_count` nodes spaced `effective_step` pixels
/// apart at the current zoom.
pub fn label_plan(effective_step: f32, hop_count: usize) -> LabelPlan {
    let show_every = if hop_count > 50 || effective_step < STRIDE_5_STEP {
        5
    } else if hop_count > 35 || effective_step < STRIDE_3_STEP {
        3
    } else if hop_count > 25 || effective_step < STRIDE_2_STEP {
        2
    } else {
        1
    };

    let (host_max_len, host_font) = if effective_step >= 140.0 {
        (18, FontTier::Large)
    } else if effective_step >= 90.0 {
        (14, FontTier::Medium)
    } else if effective_step >= 50.0 {
        (10, FontTier::Small)
    } else {
        (8, FontTier::Tiny)
    };

    let hop_font = if effective_step >= 140.0 {
        FontTier::Large
    } else if effective_step >= 90.0 {
        FontTier::Medium
    } else {
        FontTier::Small
    };

    let ip_font = if effective_step >= 140.0 {
        FontTier::Medium
    } else {
        FontTier::Small
    };

    LabelPlan {
        show_every,
        show_hop: true,
        show_host: effective_step >= HOST_MIN_STEP,
        show_ip: effective_step >= IP_MIN_STEP,
        show_rtt: effective_step >= RTT_MIN_STEP,
        host_max_len,
        host_font,
        hop_font,
        ip_font,
    }
}

/// Cuts `text` to `max_len` characters, marking the cut with an ellipsis.
pub fn truncate_label(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        let mut out: String = text.chars().take(max_len).collect();
        out.push('…');
        out
    } else {
        text.to_string()
    }
}
