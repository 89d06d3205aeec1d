use std::collections::BTreeMap;

use eframe::egui::Pos2;

use crate::render::{
    hop_graph::{HopNode, LinkStyle, NodeLabel, RenderTarget},
    label_policy::LabelTier,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SceneLink {
    pub from: Pos2,
    pub to: Pos2,
    pub style: LinkStyle,
}

/// Retained render target: keeps what was drawn so a painter can replay it every frame.
#[derive(Debug, Clone, Default)]
pub struct SceneBuffer {
    pub nodes: Vec<HopNode>,
    pub links: Vec<SceneLink>,
    pub labels: BTreeMap<(usize, LabelTier), NodeLabel>,
    pub placeholder: Option<String>,
    pub clears: usize,
    pub node_draws: usize,
}

impl SceneBuffer {
    #[cfg(test)]
    pub fn label(&self, node: usize, tier: LabelTier) -> Option<&NodeLabel> {
        self.labels.get(&(node, tier))
    }

    pub fn visible_labels(&self) -> impl Iterator<Item = &NodeLabel> {
        self.labels.values().filter(|l| l.visible)
    }
}

impl RenderTarget for SceneBuffer {
    fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.labels.clear();
        self.placeholder = None;
        self.clears += 1;
    }

    fn draw_node(&mut self, index: usize, node: &HopNode) {
        self.node_draws += 1;
        if index < self.nodes.len() {
            self.nodes[index] = node.clone();
        } else {
            self.nodes.push(node.clone());
        }
    }

    fn draw_link(&mut self, from: Pos2, to: Pos2, style: LinkStyle) {
        self.links.push(SceneLink { from, to, style });
    }

    fn set_label(&mut self, label: &NodeLabel) {
        self.labels.insert((label.node, label.tier), label.clone());
    }

    fn draw_placeholder(&mut self, message: &str) {
        self.placeholder = Some(message.to_string());
    }
}
