use eframe::egui::{self, CollapsingHeader, Context, Frame, Id, Label, Order, Pos2, Ui, Vec2};

use crate::render::hop_graph::HopNode;

/// A small floating panel anchored next to a hop on the canvas, listing its details.
///
/// The pinned flag is persisted per `Id` in egui's memory. An unpinned panel follows its node;
/// a pinned one starts where it was and can then be dragged anywhere.
#[derive(Debug, Clone)]
pub struct HopPanel {
    id: Id,
    anchor: Pos2,
    offset: Vec2,
    min_width: f32,
}

#[derive(Debug, Clone)]
pub struct HopPanelResponse {
    pub pinned: bool,
    pub close_clicked: bool,
}

impl HopPanel {
    pub fn new(id: Id, anchor: Pos2) -> Self {
        Self {
            id,
            anchor,
            offset: Vec2 { x: 12.0, y: -40.0 },
            min_width: 200.0,
        }
    }

    fn area(&self, pinned: bool) -> egui::Area {
        let pos = self.anchor + self.offset;
        let area = egui::Area::new(self.id)
            .order(Order::Foreground)
            .interactable(true)
            .constrain(true);
        if pinned {
            area.movable(true).default_pos(pos)
        } else {
            area.fixed_pos(pos)
        }
    }

    pub fn show(&self, ctx: &Context, node: &HopNode) -> HopPanelResponse {
        let mut pinned = persisted_pin(ctx, self.id).unwrap_or(false);
        let mut close_clicked = false;

        self.area(pinned).show(ctx, |ui| {
            Frame::popup(ui.style()).show(ui, |ui| {
                ui.set_min_width(self.min_width);
                ui.horizontal(|ui| {
                    ui.strong(node.hop_text());
                    ui.label(egui::RichText::new(node.role.title()).color(node.role.fill()));
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.add(egui::Button::new("✕").small()).on_hover_text("Close").clicked() {
                            close_clicked = true;
                        }
                        let pin_label = if pinned { "📌" } else { "📍" };
                        if ui
                            .add(egui::Button::new(pin_label).small())
                            .on_hover_text(if pinned { "Unpin" } else { "Pin (panel becomes draggable)" })
                            .clicked()
                        {
                            pinned = !pinned;
                        }
                    });
                });
                ui.add_space(4.0);
                for line in node.details() {
                    ui.add(label_no_wrap(line));
                }
            });
        });

        if close_clicked {
            pinned = false;
        }
        set_persisted_pin(ctx, self.id, pinned);

        HopPanelResponse {
            pinned,
            close_clicked,
        }
    }
}

/// Collapsible section with a grouped frame around its body.
pub fn collapsible_section(
    ui: &mut Ui,
    title: impl Into<egui::WidgetText>,
    default_open: bool,
    add_contents: impl FnOnce(&mut Ui),
) {
    CollapsingHeader::new(title).default_open(default_open).show(ui, |ui| {
        Frame::group(ui.style()).show(ui, |ui| {
            add_contents(ui);
        });
    });
}

pub fn label_no_wrap(text: impl Into<egui::WidgetText>) -> Label {
    Label::new(text).wrap_mode(egui::TextWrapMode::Extend)
}

pub fn bullet_list<I, S>(ui: &mut Ui, items: I)
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    for s in items {
        ui.horizontal(|ui| {
            ui.label("•");
            ui.label(s.to_string());
        });
    }
}

fn persisted_pin(ctx: &Context, id: Id) -> Option<bool> {
    ctx.data_mut(|d| d.get_persisted::<bool>(id))
}

fn set_persisted_pin(ctx: &Context, id: Id, value: bool) {
    ctx.data_mut(|d| d.insert_persisted(id, value));
}
