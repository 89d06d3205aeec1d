/*
 * This module contains the desktop front end: the session that owns backend requests,
 * the hop canvas and its detail panel, session snapshots, and the eframe application.
 */

pub mod app;
pub mod hop_canvas;
pub mod hop_panel;
pub mod session;
pub mod snapshot;
