/*
 * Rendering of a single traceroute run: layout, zoom-dependent labels and the retained
 * scene the GUI paints from. Nothing in here touches egui's painter directly.
 */

pub mod hop_graph;
pub mod label_policy;
pub mod scene;
pub mod view_state;
pub mod zoom;
