/*!
Coordination between the GUI and the diagnostics backend.

`Session` submits requests on the tokio runtime and receives their completions over a
channel that the UI thread drains once per frame with `poll`. Every request carries a
ticket for its lane; a completion whose ticket is no longer the newest for that lane has
been superseded and is dropped unread.
*/

use std::{collections::HashMap, path::Path, path::PathBuf, sync::Arc, time::SystemTime};

use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::{debug, info, warn};

use crate::{
    backend::{BackendError, BackendResult, BackendStatus, DiagnosticsBackend, NetworkInfo},
    export::{ExportError, export_history, export_output, export_paths},
    network::{
        command::{
            BatchOptions, BatchRequest, BatchResponse, CommandError, CommandOutcome, CommandPolicy,
            CommandResponse, CommandType, ParsedData, PingStats,
        },
        history::HistoryItem,
        hop::{TimeoutSentinel, TracerouteRun},
        trace_text::render_traceroute_text,
    },
    paths::path_tree::{PathTree, build_path_tree},
    render::{hop_graph::VisualizationError, view_state::ActiveView},
};

/// Independent request streams; a new request only supersedes older ones in its own lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Main,
    History,
    Paths,
    Maintenance,
    Status,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Empty,
    Text(String),
    /// Shown in the error style: stderr of a failed command, or a request failure.
    Failure(String),
}

impl RawOutput {
    /// Stdout when there is any, else stderr as a failure, else a "no output" note.
    pub fn from_streams(stdout: &str, stderr: &str) -> Self {
        if !stdout.trim().is_empty() {
            RawOutput::Text(stdout.to_string())
        } else if !stderr.trim().is_empty() {
            RawOutput::Failure(stderr.to_string())
        } else {
            RawOutput::Text("No output".to_string())
        }
    }

    pub fn text(&self) -> &str {
        match self {
            RawOutput::Empty => "",
            RawOutput::Text(text) | RawOutput::Failure(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Visualization {
    Idle,
    Hops(TracerouteRun),
    Ping(PingStats),
    Raw { title: &'static str, text: String },
    BatchSummary { targets: usize },
    /// The result carried nothing drawable.
    Unavailable(VisualizationError),
    Failed(String),
}

/// What the main view shows. Replaced as a whole by every completed request.
#[derive(Debug, Clone)]
pub struct MainPanel {
    pub last_command: String,
    pub raw: RawOutput,
    pub visualization: Visualization,
    /// Bumped every time `visualization` is replaced.
    pub generation: u64,
}

impl Default for MainPanel {
    fn default() -> Self {
        Self {
            last_command: String::new(),
            raw: RawOutput::Empty,
            visualization: Visualization::Idle,
            generation: 0,
        }
    }
}

/// Things the GUI has to react to beyond re-reading session state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ShowView(ActiveView),
    PathsChanged,
    Notice(String),
}

#[derive(Debug)]
enum Completion {
    Command(BackendResult<CommandResponse>),
    Batch(BackendResult<BatchResponse>),
    HistoryItem(BackendResult<TracerouteRun>),
    History(BackendResult<Vec<HistoryItem>>),
    Paths(BackendResult<PathTree>),
    HistoryChanged {
        notice: &'static str,
        result: BackendResult<()>,
    },
    Status(BackendResult<NetworkInfo>),
}

#[derive(Debug)]
struct Envelope {
    lane: Lane,
    ticket: u64,
    completion: Completion,
}

pub struct Session {
    backend: Arc<dyn DiagnosticsBackend>,
    runtime: Handle,
    policy: CommandPolicy,
    sentinel: TimeoutSentinel,

    tx: UnboundedSender<Envelope>,
    rx: UnboundedReceiver<Envelope>,
    tickets: HashMap<Lane, u64>,
    in_flight: HashMap<Lane, u64>,

    pub main: MainPanel,
    pub history: Vec<HistoryItem>,
    pub history_error: Option<String>,
    pub paths: PathTree,
    pub paths_error: Option<String>,
    pub backend_status: BackendStatus,
}

impl Session {
    pub fn new(
        backend: Arc<dyn DiagnosticsBackend>,
        runtime: Handle,
        policy: CommandPolicy,
        sentinel: TimeoutSentinel,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            backend,
            runtime,
            policy,
            sentinel,
            tx,
            rx,
            tickets: HashMap::new(),
            in_flight: HashMap::new(),
            main: MainPanel::default(),
            history: Vec::new(),
            history_error: None,
            paths: PathTree::default(),
            paths_error: None,
            backend_status: BackendStatus::Unknown,
        }
    }

    pub fn sentinel(&self) -> &TimeoutSentinel {
        &self.sentinel
    }

    pub fn is_loading(&self, lane: Lane) -> bool {
        self.in_flight.contains_key(&lane)
    }

    pub fn is_busy(&self) -> bool {
        !self.in_flight.is_empty()
    }

    fn spawn<F>(&mut self, lane: Lane, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let ticket = self.tickets.entry(lane).or_insert(0);
        *ticket += 1;
        let ticket = *ticket;
        self.in_flight.insert(lane, ticket);

        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let completion = task.await;
            // The receiver is gone only when the session was dropped.
            let _ = tx.send(Envelope {
                lane,
                ticket,
                completion,
            });
        });
    }

    fn replace_main(&mut self, raw: RawOutput, visualization: Visualization) {
        self.main.raw = raw;
        self.main.visualization = visualization;
        self.main.generation += 1;
    }

    /// Validates and submits one diagnostic command.
    pub fn submit_command(&mut self, input: &str) -> Result<(), CommandError> {
        let command = match self.policy.validate(input) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "rejected command");
                self.replace_main(RawOutput::Failure(e.to_string()), Visualization::Failed(e.to_string()));
                return Err(e);
            }
        };
        info!(%command, "running command");
        self.main.last_command = command.clone();

        let backend = self.backend.clone();
        self.spawn(Lane::Main, async move {
            Completion::Command(backend.run_command(&command).await)
        });
        Ok(())
    }

    /// Submits a traceroute for every target in a free-form list.
    pub fn submit_batch(&mut self, targets: &str, options: BatchOptions) -> Result<(), CommandError> {
        let targets = match self.policy.parse_targets(targets) {
            Ok(targets) => targets,
            Err(e) => {
                warn!(error = %e, "rejected batch");
                self.replace_main(RawOutput::Failure(e.to_string()), Visualization::Failed(e.to_string()));
                return Err(e);
            }
        };
        info!(count = targets.len(), "running batch traceroute");

        let backend = self.backend.clone();
        let request = BatchRequest { targets, options };
        self.spawn(Lane::Main, async move {
            Completion::Batch(backend.batch_traceroute(&request).await)
        });
        Ok(())
    }

    pub fn open_history_item(&mut self, id: i64) {
        let backend = self.backend.clone();
        self.spawn(Lane::Main, async move {
            Completion::HistoryItem(backend.get_history_item(id).await)
        });
    }

    pub fn refresh_history(&mut self) {
        let backend = self.backend.clone();
        self.spawn(Lane::History, async move {
            Completion::History(backend.list_history().await)
        });
    }

    pub fn refresh_paths(&mut self) {
        let backend = self.backend.clone();
        let sentinel = self.sentinel.clone();
        self.spawn(Lane::Paths, async move {
            Completion::Paths(fetch_path_tree(backend.as_ref(), &sentinel).await)
        });
    }

    pub fn delete_history_item(&mut self, id: i64) {
        let backend = self.backend.clone();
        self.spawn(Lane::Maintenance, async move {
            Completion::HistoryChanged {
                notice: "Entry deleted",
                result: backend.delete_history_item(id).await,
            }
        });
    }

    pub fn clear_history(&mut self) {
        let backend = self.backend.clone();
        self.spawn(Lane::Maintenance, async move {
            Completion::HistoryChanged {
                notice: "History cleared",
                result: backend.clear_history().await,
            }
        });
    }

    /// Asks the backend for its network summary; the answer becomes `backend_status`.
    pub fn check_backend(&mut self) {
        let backend = self.backend.clone();
        self.spawn(Lane::Status, async move {
            Completion::Status(backend.network_info().await)
        });
    }

    /// Applies every completion that has arrived since the last call.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            if self.in_flight.get(&envelope.lane) != Some(&envelope.ticket) {
                debug!(lane = ?envelope.lane, ticket = envelope.ticket, "dropping superseded result");
                continue;
            }
            self.in_flight.remove(&envelope.lane);
            self.apply(envelope.completion, &mut events);
        }
        events
    }

    fn apply(&mut self, completion: Completion, events: &mut Vec<SessionEvent>) {
        match completion {
            Completion::Command(Ok(response)) => {
                let outcome = CommandOutcome::from_response(response);
                let raw = RawOutput::from_streams(&outcome.raw_stdout, &outcome.raw_stderr);
                let is_traceroute = outcome.command_type == CommandType::Traceroute;
                let visualization = visualize(outcome);
                self.replace_main(raw, visualization);
                self.refresh_history();
                if is_traceroute {
                    self.refresh_paths();
                }
            }
            Completion::Batch(Ok(batch)) => {
                let raw = RawOutput::Text(batch.combined_output());
                let visualization = match batch.single_run() {
                    Some(result) => Visualization::Hops(TracerouteRun {
                        target: result.target.clone(),
                        command: result.command.clone(),
                        hops: result.hops.clone(),
                    }),
                    None => Visualization::BatchSummary {
                        targets: batch.results.len(),
                    },
                };
                self.replace_main(raw, visualization);
                self.refresh_history();
                self.refresh_paths();
            }
            Completion::HistoryItem(Ok(run)) => {
                let text = render_traceroute_text(&run.command, &run.hops, &self.sentinel);
                self.main.last_command = run.command.clone();
                let visualization = if run.hops.is_empty() {
                    Visualization::Unavailable(VisualizationError::NoData)
                } else {
                    Visualization::Hops(run)
                };
                self.replace_main(RawOutput::Text(text), visualization);
                events.push(SessionEvent::ShowView(ActiveView::Main));
            }
            Completion::Command(Err(e)) | Completion::Batch(Err(e)) | Completion::HistoryItem(Err(e)) => {
                warn!(error = %e, "main request failed");
                self.replace_main(RawOutput::Failure(e.to_string()), Visualization::Failed(e.to_string()));
            }
            Completion::History(result) => match result {
                Ok(items) => {
                    debug!(count = items.len(), "history refreshed");
                    self.history = items;
                    self.history_error = None;
                }
                Err(e) => {
                    warn!(error = %e, "history refresh failed");
                    self.history.clear();
                    self.history_error = Some(e.to_string());
                }
            },
            Completion::Paths(result) => {
                match result {
                    Ok(tree) => {
                        debug!(targets = tree.stats().targets, "paths refreshed");
                        self.paths = tree;
                        self.paths_error = None;
                    }
                    Err(e) => {
                        warn!(error = %e, "paths refresh failed");
                        self.paths = PathTree::default();
                        self.paths_error = Some(e.to_string());
                    }
                }
                events.push(SessionEvent::PathsChanged);
            }
            Completion::HistoryChanged { notice, result } => match result {
                Ok(()) => {
                    info!(notice, "history changed");
                    events.push(SessionEvent::Notice(notice.to_string()));
                    self.refresh_history();
                    self.refresh_paths();
                }
                Err(e) => {
                    warn!(error = %e, "history change failed");
                    events.push(SessionEvent::Notice(e.to_string()));
                }
            },
            Completion::Status(result) => {
                match &result {
                    Ok(info) => debug!(hostname = %info.hostname, "backend is up"),
                    Err(e) => warn!(error = %e, "backend status check failed"),
                }
                self.backend_status = BackendStatus::from_result(result);
            }
        }
    }

    /// Writes whatever `view` currently shows to `dir`.
    pub fn export_view(&self, view: ActiveView, dir: &Path, at: SystemTime) -> Result<PathBuf, ExportError> {
        match view {
            ActiveView::Main => export_output(self.main.raw.text(), dir, at),
            ActiveView::History => export_history(&self.history, dir, at),
            ActiveView::Paths => export_paths(&self.paths, dir, at),
            ActiveView::Info => Err(ExportError::Empty),
        }
    }
}

fn visualize(outcome: CommandOutcome) -> Visualization {
    let target = outcome.target();
    match outcome.parsed {
        Some(ParsedData::Hops(hops)) if !hops.is_empty() => Visualization::Hops(TracerouteRun {
            target,
            command: outcome.command,
            hops,
        }),
        Some(ParsedData::Ping(stats)) => Visualization::Ping(stats),
        Some(ParsedData::Raw(raw)) => Visualization::Raw {
            title: outcome.command_type.title(),
            text: raw.raw_output,
        },
        _ => Visualization::Unavailable(VisualizationError::Unavailable(
            outcome.command_type.title().to_lowercase(),
        )),
    }
}

/// The backend's path aggregate, or one built here from stored runs when the backend does
/// not serve it.
pub async fn fetch_path_tree(backend: &dyn DiagnosticsBackend, sentinel: &TimeoutSentinel) -> BackendResult<PathTree> {
    match backend.list_paths().await {
        Err(BackendError::Status { code: 404, .. }) => {
            info!("backend has no path aggregate, building it from history");
            let items = backend.list_history().await?;
            let mut runs = Vec::new();
            for item in items
                .iter()
                .filter(|item| CommandType::detect(&item.command) == CommandType::Traceroute)
            {
                match backend.get_history_item(item.id).await {
                    Ok(run) => runs.push(run),
                    Err(e) => warn!(id = item.id, error = %e, "skipping history entry"),
                }
            }
            Ok(build_path_tree(&runs, sentinel))
        }
        other => other,
    }
}
