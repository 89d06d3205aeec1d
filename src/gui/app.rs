use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use eframe::egui::{
    self, CentralPanel, CollapsingHeader, Color32, ComboBox, Context, RichText, ScrollArea, SidePanel,
    TopBottomPanel, Ui,
};
use egui_extras::{Column, TableBuilder};
use egui_graphs::{
    DefaultEdgeShape, DefaultNodeShape, FruchtermanReingoldWithCenterGravity,
    FruchtermanReingoldWithCenterGravityState, LayoutForceDirected, SettingsInteraction,
    SettingsNavigation,
};
use petgraph::{Directed, csr::DefaultIx};
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use crate::{
    backend::{BackendError, BackendStatus, http::HttpBackend},
    config::AppConfig,
    export::default_export_dir,
    gui::{
        hop_canvas::HopCanvas,
        hop_panel::{bullet_list, collapsible_section, label_no_wrap},
        session::{Lane, RawOutput, Session, SessionEvent, Visualization},
        snapshot::ClientSnapshot,
    },
    network::{
        command::BatchOptions,
        history::{HistoryFilter, HistoryItem, HistorySort, filter_and_sort, search},
    },
    paths::path_graph::{PathEdge, PathGraph, PathNode, PathNodeInfo, describe_hop},
    render::view_state::{ActiveView, ViewState},
};

pub fn main(rt: Arc<Runtime>, config: AppConfig) {
    let native_options = eframe::NativeOptions::default();
    let result = eframe::run_native(
        "Traceroute visualization",
        native_options,
        Box::new(move |cc| match App::new(cc, rt, config) {
            Ok(app) => Ok(Box::new(app) as Box<dyn eframe::App>),
            Err(e) => Err(e.into()),
        }),
    );

    if let Err(e) = result {
        error!(error = %e, "application terminated with an error");
    }
}

type Layout = FruchtermanReingoldWithCenterGravity;
type LayoutState = FruchtermanReingoldWithCenterGravityState;

/// How long a notice stays in the top bar.
const NOTICE_TTL: Duration = Duration::from_secs(4);

/// How often the backend's status is re-checked in the background.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

const HISTORY_FILTERS: [&str; 5] = ["all", "traceroute", "ping", "nmap", "dig"];

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to set up backend client: {0}")]
    Backend(#[from] BackendError),
}

struct BatchForm {
    targets: String,
    numeric: bool,
    max_hops: u32,
    wait_ms: u32,
}

impl Default for BatchForm {
    fn default() -> Self {
        Self {
            targets: String::new(),
            numeric: true,
            max_hops: 30,
            wait_ms: 0,
        }
    }
}

struct App {
    config: AppConfig,
    session: Session,
    view_state: ViewState,
    canvas: HopCanvas,

    command_input: String,
    batch: BatchForm,

    history_filter: String,
    history_sort: HistorySort,
    history_query: String,
    confirm_clear: bool,

    path_graph: PathGraph,
    layout_state: LayoutState,

    snapshot_path: Option<PathBuf>,
    export_dir: PathBuf,
    last_autosave: Instant,
    last_status_check: Instant,
    started: Instant,
    notice: Option<(String, Instant)>,
}

impl App {
    fn new(cc: &eframe::CreationContext<'_>, runtime: Arc<Runtime>, config: AppConfig) -> Result<Self, AppError> {
        catppuccin_egui::set_theme(&cc.egui_ctx, catppuccin_egui::MOCHA);

        let backend = HttpBackend::new(&config.backend_url, config.request_timeout(), config.sentinel())?;
        let mut session = Session::new(
            Arc::new(backend),
            runtime.handle().clone(),
            config.command_policy(),
            config.sentinel(),
        );

        let snapshot_path = config.snapshot_path();
        let snapshot = snapshot_path.as_deref().and_then(ClientSnapshot::restore);
        let (view_state, command_input) = match snapshot {
            Some(snapshot) => {
                info!(view = ?snapshot.active_view, "restored previous session");
                (snapshot.view_state(), snapshot.last_command)
            }
            None => (ViewState::default(), String::new()),
        };

        session.check_backend();
        session.refresh_history();
        session.refresh_paths();

        Ok(Self {
            canvas: HopCanvas::new(session.sentinel().clone()),
            session,
            view_state,
            command_input,
            batch: BatchForm::default(),
            history_filter: "all".to_string(),
            history_sort: HistorySort::default(),
            history_query: String::new(),
            confirm_clear: false,
            path_graph: PathGraph::default(),
            layout_state: LayoutState::default(),
            snapshot_path,
            export_dir: default_export_dir(),
            last_autosave: Instant::now(),
            last_status_check: Instant::now(),
            started: Instant::now(),
            notice: None,
            config,
        })
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.notice = Some((message.into(), Instant::now()));
    }

    fn handle_events(&mut self) {
        for event in self.session.poll() {
            match event {
                SessionEvent::ShowView(view) => self.view_state.active_view = view,
                SessionEvent::PathsChanged => {
                    self.path_graph = PathGraph::build_new(&self.session.paths);
                }
                SessionEvent::Notice(message) => self.notify(message),
            }
        }
    }

    fn save_snapshot(&mut self) {
        self.last_autosave = Instant::now();
        let Some(path) = self.snapshot_path.as_deref() else {
            return;
        };
        let snapshot = ClientSnapshot::capture(&self.command_input, &self.view_state, SystemTime::now());
        if let Err(e) = snapshot.save(path) {
            warn!(error = %e, "failed to save session");
        }
    }

    fn export_current_view(&mut self) {
        match self
            .session
            .export_view(self.view_state.active_view, &self.export_dir, SystemTime::now())
        {
            Ok(path) => self.notify(format!("Exported to {}", path.display())),
            Err(e) => {
                warn!(error = %e, "export failed");
                self.notify(format!("Export failed: {e}"));
            }
        }
    }

    fn submit_command(&mut self) {
        // Rejections are already shown in the main panel.
        let _ = self.session.submit_command(&self.command_input);
    }

    fn render_top_bar(&mut self, ctx: &Context) {
        TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(self.view_state.active_view.title());
                if self.session.is_busy() {
                    ui.spinner();
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("💾 Export view").clicked() {
                        self.export_current_view();
                    }
                    if ui.button("Save session").clicked() {
                        self.save_snapshot();
                        self.notify("Session saved");
                    }
                    if let Some((message, at)) = &self.notice {
                        if at.elapsed() < NOTICE_TTL {
                            ui.label(RichText::new(message).italics());
                        }
                    }
                });
            });
        });
    }

    fn render_navigation(&mut self, ctx: &Context) {
        SidePanel::left("navigation").resizable(false).show(ctx, |ui| {
            ui.add_space(6.0);
            for view in ActiveView::ALL {
                if ui
                    .selectable_label(self.view_state.active_view == view, view.title())
                    .clicked()
                {
                    self.view_state.active_view = view;
                }
            }
            ui.separator();
            let stats = self.session.paths.stats();
            ui.label(format!("Requests: {}", self.session.history.len()));
            ui.label(format!("Targets: {}", stats.targets));
            ui.label(format!("Hops: {}", stats.hops));
            ui.label(format!("Unique IPs: {}", stats.ips));
        });
    }

    fn render_main(&mut self, ui: &mut Ui) {
        let running = self.session.is_loading(Lane::Main);
        ui.horizontal(|ui| {
            ui.label("Command");
            let resp = ui.add(
                egui::TextEdit::singleline(&mut self.command_input)
                    .hint_text("traceroute example.com")
                    .desired_width(420.0),
            );
            let entered = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let clicked = ui.add_enabled(!running, egui::Button::new("Run")).clicked();
            if (entered || clicked) && !running {
                self.submit_command();
            }
            if running {
                ui.spinner();
            }
        });

        CollapsingHeader::new("Batch traceroute").default_open(false).show(ui, |ui| {
            ui.add(
                egui::TextEdit::multiline(&mut self.batch.targets)
                    .hint_text("8.8.8.8, 1.1.1.1 example.com")
                    .desired_rows(2),
            );
            ui.horizontal(|ui| {
                ui.checkbox(&mut self.batch.numeric, "Numeric (-n)");
                ui.add(egui::DragValue::new(&mut self.batch.max_hops).range(0..=64).prefix("max hops: "));
                ui.add(egui::DragValue::new(&mut self.batch.wait_ms).range(0..=10_000).prefix("wait ms: "));
                if ui.add_enabled(!running, egui::Button::new("Run batch")).clicked() {
                    let options = BatchOptions::new(self.batch.numeric, self.batch.max_hops, self.batch.wait_ms);
                    let _ = self.session.submit_batch(&self.batch.targets, options);
                }
            });
        });

        ui.separator();
        self.render_visualization(ui);
        ui.separator();

        CollapsingHeader::new("Raw output").default_open(true).show(ui, |ui| {
            ScrollArea::vertical().max_height(260.0).show(ui, |ui| match &self.session.main.raw {
                RawOutput::Empty => {
                    ui.weak("Run a command to see its output");
                }
                RawOutput::Text(text) => {
                    ui.add(label_no_wrap(RichText::new(text).monospace()));
                }
                RawOutput::Failure(text) => {
                    ui.add(label_no_wrap(RichText::new(text).monospace().color(Color32::LIGHT_RED)));
                }
            });
        });
    }

    fn render_visualization(&mut self, ui: &mut Ui) {
        match &self.session.main.visualization {
            Visualization::Idle => {
                ui.weak("Results of traceroute, ping and scan commands appear here");
            }
            Visualization::Hops(run) => {
                ui.horizontal(|ui| {
                    ui.strong(format!("Route to {}", run.target));
                    ui.label(format!("({} hops)", run.hops.len()));
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("⟲").on_hover_text("Reset zoom").clicked() {
                            self.canvas.reset_zoom();
                        }
                        if ui.button("−").on_hover_text("Zoom out").clicked() {
                            self.canvas.zoom_out();
                        }
                        if ui.button("+").on_hover_text("Zoom in").clicked() {
                            self.canvas.zoom_in();
                        }
                    });
                });
            }
            Visualization::Ping(stats) => {
                ui.strong("Ping results");
                egui::Grid::new("ping_stats").striped(true).show(ui, |ui| {
                    for (label, value) in stats.rows() {
                        ui.label(label);
                        ui.label(value);
                        ui.end_row();
                    }
                });
            }
            Visualization::Raw { title, text } => {
                ui.strong(*title);
                ScrollArea::vertical().id_salt("raw_data").max_height(200.0).show(ui, |ui| {
                    ui.add(label_no_wrap(RichText::new(text).monospace()));
                });
            }
            Visualization::BatchSummary { targets } => {
                ui.label(format!("Batch finished for {targets} targets, see the raw output below"));
            }
            Visualization::Unavailable(reason) => {
                ui.weak(reason.to_string());
            }
            Visualization::Failed(message) => {
                ui.colored_label(Color32::LIGHT_RED, message);
            }
        }

        if matches!(self.session.main.visualization, Visualization::Hops(_)) {
            self.canvas.show(ui, &self.session.main, &mut self.view_state);
        }
    }

    fn visible_history(&self) -> Vec<HistoryItem> {
        let found: Vec<HistoryItem> = search(&self.session.history, &self.history_query)
            .into_iter()
            .cloned()
            .collect();
        let mut rows = filter_and_sort(&found, &HistoryFilter::token(&self.history_filter), self.history_sort);
        if self.config.history_limit > 0 {
            rows.truncate(self.config.history_limit);
        }
        rows
    }

    fn render_history(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ComboBox::from_label("Filter")
                .selected_text(self.history_filter.clone())
                .show_ui(ui, |ui| {
                    for token in HISTORY_FILTERS {
                        ui.selectable_value(&mut self.history_filter, token.to_string(), token);
                    }
                });
            ComboBox::from_label("Sort")
                .selected_text(self.history_sort.label())
                .show_ui(ui, |ui| {
                    for sort in HistorySort::ALL {
                        ui.selectable_value(&mut self.history_sort, sort, sort.label());
                    }
                });
            ui.add(
                egui::TextEdit::singleline(&mut self.history_query)
                    .hint_text("Search command or target")
                    .desired_width(200.0),
            );
            if ui.button("Refresh").clicked() {
                self.session.refresh_history();
            }
            if ui.button("Clear history").clicked() {
                self.confirm_clear = true;
            }
        });

        if let Some(message) = &self.session.history_error {
            ui.colored_label(Color32::LIGHT_RED, message);
        }

        let rows = self.visible_history();
        if rows.is_empty() {
            ui.weak("History is empty");
            return;
        }

        let mut open: Option<i64> = None;
        let mut delete: Option<i64> = None;
        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .column(Column::auto().at_least(40.0))
            .column(Column::auto().at_least(220.0))
            .column(Column::auto().at_least(120.0))
            .column(Column::auto().at_least(45.0))
            .column(Column::auto().at_least(150.0))
            .column(Column::remainder().at_least(60.0))
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("ID");
                });
                header.col(|ui| {
                    ui.strong("Command");
                });
                header.col(|ui| {
                    ui.strong("Target");
                });
                header.col(|ui| {
                    ui.strong("Hops");
                });
                header.col(|ui| {
                    ui.strong("Time");
                });
                header.col(|ui| {
                    ui.strong("Actions");
                });
            })
            .body(|mut body| {
                for item in &rows {
                    body.row(22.0, |mut row| {
                        row.col(|ui| {
                            ui.label(item.id.to_string());
                        });
                        row.col(|ui| {
                            ui.add(label_no_wrap(RichText::new(&item.command).monospace()));
                        });
                        row.col(|ui| {
                            ui.label(&item.target);
                        });
                        row.col(|ui| {
                            ui.label(item.hops_count.to_string());
                        });
                        row.col(|ui| {
                            let time = item
                                .parsed_timestamp()
                                .map(|t| humantime::format_rfc3339_seconds(t).to_string())
                                .unwrap_or_else(|| item.timestamp.clone());
                            ui.label(time);
                        });
                        row.col(|ui| {
                            ui.horizontal(|ui| {
                                if ui.small_button("▶").on_hover_text("Show this run").clicked() {
                                    open = Some(item.id);
                                }
                                if ui.small_button("🗑").on_hover_text("Delete this entry").clicked() {
                                    delete = Some(item.id);
                                }
                            });
                        });
                    });
                }
            });

        if let Some(id) = open {
            self.session.open_history_item(id);
        }
        if let Some(id) = delete {
            self.session.delete_history_item(id);
        }
    }

    fn render_paths(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            let stats = self.session.paths.stats();
            ui.label(format!(
                "{} targets, {} hops, {} unique IPs",
                stats.targets, stats.hops, stats.ips
            ));
            if ui.button("Refresh").clicked() {
                self.session.refresh_paths();
            }
        });
        if let Some(message) = &self.session.paths_error {
            ui.colored_label(Color32::LIGHT_RED, message);
        }
        if self.session.paths.is_empty() {
            ui.weak("No paths recorded yet, run a traceroute first");
            return;
        }

        ui.columns(2, |columns| {
            ScrollArea::vertical().id_salt("path_list").show(&mut columns[0], |ui| {
                for (target, hops) in self.session.paths.iter() {
                    collapsible_section(ui, format!("🎯 {target}"), false, |ui| {
                        bullet_list(
                            ui,
                            hops.iter()
                                .map(|hop| format!("Hop {}: {}", hop.hop_number, describe_hop(hop))),
                        );
                    });
                }
            });

            let ui = &mut columns[1];
            egui_graphs::set_layout_state(ui, self.layout_state.clone(), None);
            let widget = &mut egui_graphs::GraphView::<
                PathNode,
                PathEdge,
                Directed,
                DefaultIx,
                DefaultNodeShape,
                DefaultEdgeShape,
                LayoutState,
                LayoutForceDirected<Layout>,
            >::new(&mut self.path_graph.graph)
            .with_navigations(
                &SettingsNavigation::default()
                    .with_zoom_and_pan_enabled(false)
                    .with_fit_to_screen_enabled(true),
            )
            .with_interactions(&SettingsInteraction::default().with_node_selection_enabled(true));
            ui.add(widget);

            if let Some(index) = self.path_graph.graph.selected_nodes().first().copied() {
                if let Some(node) = self.path_graph.graph.node(index) {
                    let payload = node.payload();
                    ui.separator();
                    match &payload.info {
                        PathNodeInfo::Target => {
                            ui.strong(&payload.target);
                        }
                        PathNodeInfo::Hop(hop) => {
                            ui.strong(format!("{} · hop {}", payload.target, hop.hop_number));
                            bullet_list(ui, hop.hostnames.iter());
                            bullet_list(ui, hop.ips.iter());
                        }
                    }
                }
            }
        });
    }

    fn check_backend(&mut self) {
        self.last_status_check = Instant::now();
        self.session.check_backend();
    }

    fn render_info(&mut self, ui: &mut Ui) {
        ui.strong("Traceroute visualization");
        ui.label("Runs network diagnostics through the backend and draws the results.");
        ui.add_space(8.0);

        let mut check_now = false;
        egui::Grid::new("info").show(ui, |ui| {
            ui.label("Backend");
            ui.label(&self.config.backend_url);
            ui.end_row();
            ui.label("Status");
            ui.horizontal(|ui| {
                let status = &self.session.backend_status;
                let color = match status {
                    BackendStatus::Online(_) => Color32::LIGHT_GREEN,
                    BackendStatus::Degraded(_) => Color32::YELLOW,
                    BackendStatus::Offline(_) => Color32::LIGHT_RED,
                    BackendStatus::Unknown => ui.visuals().weak_text_color(),
                };
                let label = ui.colored_label(color, status.summary());
                if let Some(detail) = status.detail() {
                    label.on_hover_text(detail);
                }
                let checking = self.session.is_loading(Lane::Status);
                check_now = ui.add_enabled(!checking, egui::Button::new("Check now").small()).clicked();
            });
            ui.end_row();
            if let BackendStatus::Online(info) = &self.session.backend_status {
                ui.label("Backend host");
                ui.label(&info.hostname);
                ui.end_row();
                ui.label("External IP");
                ui.label(&info.external_ip);
                ui.end_row();
                ui.label("Default route");
                ui.label(info.default_route.trim());
                ui.end_row();
            }
            ui.label("Timeout marker");
            ui.label(&self.config.timeout_sentinel);
            ui.end_row();
            ui.label("Allowed commands");
            ui.label(self.config.allowed_commands.join(", "));
            ui.end_row();
            ui.label("Session file");
            ui.label(
                self.snapshot_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
            ui.end_row();
            ui.label("Uptime");
            let uptime = Duration::from_secs(self.started.elapsed().as_secs());
            ui.label(humantime::format_duration(uptime).to_string());
            ui.end_row();
        });

        if check_now {
            self.check_backend();
        }
    }

    fn render_confirm_clear(&mut self, ctx: &Context) {
        if !self.confirm_clear {
            return;
        }
        egui::Window::new("Clear history")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("Delete every stored request? This cannot be undone.");
                ui.horizontal(|ui| {
                    if ui.button("Clear").clicked() {
                        self.session.clear_history();
                        self.confirm_clear = false;
                    }
                    if ui.button("Cancel").clicked() {
                        self.confirm_clear = false;
                    }
                });
            });
    }

    fn render(&mut self, ctx: &Context) {
        self.render_top_bar(ctx);
        self.render_navigation(ctx);
        CentralPanel::default().show(ctx, |ui| {
            ScrollArea::vertical().id_salt("central").show(ui, |ui| match self.view_state.active_view {
                ActiveView::Main => self.render_main(ui),
                ActiveView::History => self.render_history(ui),
                ActiveView::Paths => self.render_paths(ui),
                ActiveView::Info => self.render_info(ui),
            });
        });
        self.render_confirm_clear(ctx);
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _: &mut eframe::Frame) {
        self.handle_events();
        self.render(ctx);

        if self.last_autosave.elapsed() >= self.config.autosave_interval() {
            self.save_snapshot();
        }
        if self.last_status_check.elapsed() >= STATUS_INTERVAL {
            self.check_backend();
        }
        if self.session.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(100));
        } else {
            ctx.request_repaint_after(self.config.autosave_interval().min(STATUS_INTERVAL));
        }
    }
}
