/// Per-terminal-view session actor.
///
/// One task owns all per-session state: the shadow buffer, the gates, the
/// kill flow, and the connection supervisor. Events arrive on a
/// single queue and are processed one transition at a time, so no locking
/// is needed inside a session; ordering is the transport's in-order
/// delivery plus the queue. Emergency kill and connection drops preempt an
/// executing command because they are ordinary queue/select events while
/// the executor wait is just an armed deadline.
pub mod connection;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use quarterdeck_proto::{
    ClientFrame, CommandStatus, OutputClass, ProcessInfo, ServerFrame, StepDecision, WorkflowStep,
};

use crate::gate::{
    CommandGate, CommandOutcome, EmergencyKill, PendingCommand, RiskAssessor, StepAction,
    StepCompletion, Submission, WorkflowGate,
};
use crate::input::{CompletionCoordinator, CompletionOutcome, ShadowTracker, TrackedInput};
use crate::output::normalize::{escape_html, normalize_chunk, NormalizedLine};
use crate::transport::Connector;
use connection::{ConnectionState, ConnectionSupervisor};

/// Everything a session reacts to, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// One raw input unit from the surface.
    Input(Vec<u8>),
    Action(UserAction),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Approve,
    Cancel,
    EmergencyKill,
    ConfirmKill,
    AbortKill,
    PauseAutomation,
    ResumeAutomation,
    Step(StepDecision),
    Reconnect,
}

/// Facts surfaced to the hosting view. Results are transient; nothing here
/// is persisted session state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    Connection(ConnectionState),
    Line(NormalizedLine),
    ConfirmationRequired(PendingCommand),
    Result(CommandOutcome),
    StepOffered(WorkflowStep),
    StepCompleted(StepCompletion),
    KillConfirm(Vec<ProcessInfo>),
    AutomationPaused(bool),
    Error(String),
}

/// Cheap clonable handle for feeding a running session.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    pub async fn input(&self, bytes: Vec<u8>) {
        let _ = self.events.send(SessionEvent::Input(bytes)).await;
    }

    pub async fn action(&self, action: UserAction) {
        let _ = self.events.send(SessionEvent::Action(action)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.events.send(SessionEvent::Shutdown).await;
    }
}

pub struct Session {
    id: Uuid,
    host: String,
    tracker: ShadowTracker,
    completion: CompletionCoordinator,
    gate: CommandGate,
    workflow: WorkflowGate,
    kill: EmergencyKill,
    supervisor: ConnectionSupervisor,
    assessor: Box<dyn RiskAssessor>,
    command_timeout: Duration,
    exec_deadline: Option<Instant>,
    events: mpsc::Receiver<SessionEvent>,
    notices: mpsc::Sender<SessionNotice>,
}

impl Session {
    pub fn new(
        host: impl Into<String>,
        connector: Box<dyn Connector>,
        assessor: Box<dyn RiskAssessor>,
        command_timeout: Duration,
        reconnect_delay: Duration,
    ) -> (Self, SessionHandle, mpsc::Receiver<SessionNotice>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (notice_tx, notice_rx) = mpsc::channel(256);
        let id = Uuid::new_v4();
        let host = host.into();
        info!(%id, %host, "session created");
        let session = Self {
            id,
            host,
            tracker: ShadowTracker::new(),
            completion: CompletionCoordinator::new(),
            gate: CommandGate::new(),
            workflow: WorkflowGate::new(),
            kill: EmergencyKill::new(),
            supervisor: ConnectionSupervisor::new(connector, reconnect_delay),
            assessor,
            command_timeout,
            exec_deadline: None,
            events: event_rx,
            notices: notice_tx,
        };
        (session, SessionHandle { events: event_tx }, notice_rx)
    }

    /// Spawn the actor onto the runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Logical host target this session controls.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn run(mut self) {
        if self.supervisor.connect().await.is_ok() {
            self.resync().await;
        }
        self.notify(SessionNotice::Connection(self.supervisor.state()))
            .await;

        loop {
            let reconnect_at = self.supervisor.reconnect_at();
            let exec_deadline = self.exec_deadline;
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        None | Some(SessionEvent::Shutdown) => break,
                        Some(SessionEvent::Input(bytes)) => self.handle_input(bytes).await,
                        Some(SessionEvent::Action(action)) => self.handle_action(action).await,
                    }
                }
                inbound = self.supervisor.recv() => {
                    match inbound {
                        Some(bytes) => self.handle_inbound(&bytes).await,
                        None => self.handle_drop().await,
                    }
                }
                _ = time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() =>
                {
                    self.handle_reconnect_due().await;
                }
                _ = time::sleep_until(exec_deadline.unwrap_or_else(Instant::now)),
                    if exec_deadline.is_some() =>
                {
                    self.handle_exec_timeout().await;
                }
            }
        }
        info!(id = %self.id, "session closed");
    }

    async fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice).await;
    }

    async fn surface_error(&self, message: impl Into<String>) {
        self.notify(SessionNotice::Error(message.into())).await;
    }

    async fn system_line(&self, text: &str) {
        self.notify(SessionNotice::Line(NormalizedLine {
            text: escape_html(text),
            class: OutputClass::System,
        }))
        .await;
    }

    /// Encode and send, failing fast with a surfaced error when the
    /// connection is down. Returns whether the frame went out.
    async fn send_frame(&mut self, frame: &ClientFrame) -> bool {
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "frame encode failed");
                return false;
            }
        };
        let was_connected = self.supervisor.is_connected();
        match self.supervisor.send(&bytes).await {
            Ok(()) => true,
            Err(err) => {
                self.surface_error(format!("cannot reach executor: {err}")).await;
                if was_connected
                    && matches!(self.supervisor.state(), ConnectionState::Reconnecting)
                {
                    // The send noticed the drop before the recv loop did.
                    self.clear_pending_state();
                    self.notify(SessionNotice::Connection(ConnectionState::Reconnecting))
                        .await;
                }
                false
            }
        }
    }

    // ---- input path -----------------------------------------------------

    async fn handle_input(&mut self, bytes: Vec<u8>) {
        match self.tracker.ingest(&bytes) {
            TrackedInput::Forward => {
                self.send_frame(&ClientFrame::Input { data: bytes }).await;
            }
            TrackedInput::Tab { text, cursor } => {
                if !self.completion.begin_request() {
                    return; // one completion round trip at a time
                }
                if !self
                    .send_frame(&ClientFrame::CompletionRequest { text, cursor })
                    .await
                {
                    self.completion.reset();
                }
            }
            TrackedInput::Submit { text } => {
                if text.trim().is_empty() {
                    // Nothing to gate; keep the remote prompt in sync.
                    self.send_frame(&ClientFrame::Input { data: bytes }).await;
                } else {
                    self.submit_command(text).await;
                }
            }
        }
    }

    async fn submit_command(&mut self, text: String) {
        if self.workflow.is_executing() {
            self.surface_error("an automation step is executing; wait or pause automation")
                .await;
            return;
        }
        if self.supervisor.ensure_connected().is_err() {
            self.surface_error("not connected; command not submitted").await;
            return;
        }
        let assessment = self.assessor.assess(&text);
        match self.gate.submit(&text, assessment) {
            Ok(Submission::Dispatch(command)) => {
                self.dispatch_manual(command).await;
            }
            Ok(Submission::NeedsConfirmation(pending)) => {
                self.notify(SessionNotice::ConfirmationRequired(pending)).await;
            }
            Err(err) => self.surface_error(err.to_string()).await,
        }
    }

    async fn dispatch_manual(&mut self, command: String) {
        self.notify(SessionNotice::Line(NormalizedLine {
            text: escape_html(&format!("$ {command}")),
            class: OutputClass::ManualCommand,
        }))
        .await;
        if self
            .send_frame(&ClientFrame::SubmitCommand {
                text: command.clone(),
            })
            .await
        {
            self.exec_deadline = Some(Instant::now() + self.command_timeout);
        } else if let Some(mut outcome) = self.gate.on_result(CommandStatus::Error, None) {
            outcome.detail = Some("not connected".to_string());
            self.notify(SessionNotice::Result(outcome)).await;
        }
    }

    // ---- user decisions -------------------------------------------------

    async fn handle_action(&mut self, action: UserAction) {
        match action {
            UserAction::Approve => match self.gate.approve() {
                Ok(command) => self.dispatch_manual(command).await,
                Err(err) => self.surface_error(err.to_string()).await,
            },
            UserAction::Cancel => match self.gate.cancel() {
                Ok(outcome) => self.notify(SessionNotice::Result(outcome)).await,
                Err(err) => self.surface_error(err.to_string()).await,
            },
            UserAction::EmergencyKill => {
                if self.kill.begin() {
                    if !self.send_frame(&ClientFrame::ListProcesses).await {
                        self.kill.reset();
                    }
                }
            }
            UserAction::ConfirmKill => {
                if self.kill.confirm() {
                    self.send_frame(&ClientFrame::KillAll).await;
                    // The one transition allowed to interrupt Executing.
                    self.gate.reset();
                    self.workflow.reset();
                    self.exec_deadline = None;
                    self.system_line("emergency kill issued").await;
                }
            }
            UserAction::AbortKill => self.kill.abort(),
            UserAction::PauseAutomation => {
                if self.workflow.pause() {
                    self.notify(SessionNotice::AutomationPaused(true)).await;
                }
                // Intent only while disconnected; no error surfaced.
                if self.supervisor.ensure_connected().is_ok() {
                    self.send_frame(&ClientFrame::PauseAutomation).await;
                }
            }
            UserAction::ResumeAutomation => {
                let (changed, deferred) = self.workflow.resume();
                if changed {
                    self.notify(SessionNotice::AutomationPaused(false)).await;
                }
                if self.supervisor.ensure_connected().is_ok() {
                    self.send_frame(&ClientFrame::ResumeAutomation).await;
                    if let Some(step_index) = deferred {
                        // Held next-step request from a step that finished
                        // while paused.
                        self.send_frame(&ClientFrame::WorkflowDecision {
                            step_index,
                            decision: StepDecision::Execute,
                        })
                        .await;
                    }
                }
            }
            UserAction::Step(decision) => self.handle_step_decision(decision).await,
            UserAction::Reconnect => {
                if matches!(
                    self.supervisor.state(),
                    ConnectionState::Disconnected | ConnectionState::Error
                ) {
                    if self.supervisor.connect().await.is_ok() {
                        self.resync().await;
                    }
                    self.notify(SessionNotice::Connection(self.supervisor.state()))
                        .await;
                }
            }
        }
    }

    async fn handle_step_decision(&mut self, decision: StepDecision) {
        if decision == StepDecision::Execute && !self.gate.is_idle() {
            self.surface_error("cannot execute step: a manual command is pending")
                .await;
            return;
        }
        match self.workflow.decide(decision) {
            Ok(StepAction::Execute { command }) => {
                self.notify(SessionNotice::Line(NormalizedLine {
                    text: escape_html(&format!("[auto] $ {command}")),
                    class: OutputClass::AutomatedCommand,
                }))
                .await;
                if self
                    .send_frame(&ClientFrame::SubmitCommand { text: command })
                    .await
                {
                    self.exec_deadline = Some(Instant::now() + self.command_timeout);
                } else if let Some(completion) =
                    self.workflow.on_step_result(CommandStatus::Error)
                {
                    self.notify(SessionNotice::StepCompleted(completion)).await;
                }
            }
            Ok(StepAction::Skip { step_index }) => {
                self.send_frame(&ClientFrame::WorkflowDecision {
                    step_index,
                    decision: StepDecision::Skip,
                })
                .await;
            }
            Ok(StepAction::Manual { step_index }) => {
                self.notify(SessionNotice::AutomationPaused(true)).await;
                self.send_frame(&ClientFrame::WorkflowDecision {
                    step_index,
                    decision: StepDecision::Manual,
                })
                .await;
            }
            Err(err) => self.surface_error(err.to_string()).await,
        }
    }

    // ---- inbound frames -------------------------------------------------

    async fn handle_inbound(&mut self, bytes: &[u8]) {
        let frame = match ServerFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                // Protocol error: log, drop, keep the session alive.
                warn!(id = %self.id, %err, "dropping malformed frame");
                return;
            }
        };
        match frame {
            ServerFrame::Output { ref text, class } => {
                for line in normalize_chunk(text, class) {
                    self.notify(SessionNotice::Line(line)).await;
                }
            }
            ServerFrame::CompletionResponse { .. } => {
                let outcome = self
                    .completion
                    .apply(&frame, self.tracker.buffer_mut());
                self.apply_completion(outcome).await;
            }
            ServerFrame::ProcessList { processes } => {
                if let Some(snapshot) = self.kill.on_process_list(processes) {
                    self.notify(SessionNotice::KillConfirm(snapshot)).await;
                }
            }
            ServerFrame::CommandResult {
                status,
                output,
                error,
            } => {
                self.exec_deadline = None;
                if self.workflow.is_executing() {
                    if let Some(completion) = self.workflow.on_step_result(status) {
                        let report = completion.report_now.then_some(completion.step.index);
                        self.notify(SessionNotice::StepCompleted(completion)).await;
                        if let Some(step_index) = report {
                            // Requests the next step from the planner.
                            self.send_frame(&ClientFrame::WorkflowDecision {
                                step_index,
                                decision: StepDecision::Execute,
                            })
                            .await;
                        }
                    }
                } else if let Some(outcome) = self.gate.on_result(status, output.or(error)) {
                    self.notify(SessionNotice::Result(outcome)).await;
                }
            }
            ServerFrame::History { lines } => {
                for line in lines {
                    for normalized in normalize_chunk(&line.text, line.class) {
                        self.notify(SessionNotice::Line(normalized)).await;
                    }
                }
            }
            ServerFrame::WorkflowStep {
                index,
                total,
                command,
                description,
                explanation,
            } => {
                let step = WorkflowStep {
                    index,
                    total,
                    command,
                    description,
                    explanation,
                };
                if !self.gate.is_idle() {
                    self.surface_error(
                        "automation step rejected: a manual command is pending",
                    )
                    .await;
                    return;
                }
                match self.workflow.offer_step(step) {
                    Ok(step) => {
                        let step = step.clone();
                        self.notify(SessionNotice::StepOffered(step)).await;
                    }
                    Err(err) => self.surface_error(err.to_string()).await,
                }
            }
        }
    }

    async fn apply_completion(&mut self, outcome: CompletionOutcome) {
        match outcome {
            CompletionOutcome::Ignored => {}
            CompletionOutcome::Edit { erase, insert } => {
                // Keep the remote editor in step: backspace over the typed
                // prefix, then write the expansion.
                let mut data = vec![0x7f; erase];
                data.extend_from_slice(insert.as_bytes());
                self.send_frame(&ClientFrame::Input { data }).await;
            }
            CompletionOutcome::Candidates(candidates) => {
                for candidate in candidates {
                    self.system_line(&candidate).await;
                }
            }
        }
    }

    // ---- connection lifecycle -------------------------------------------

    /// Local-only state never survives a pass through `Disconnected`; the
    /// remote executor made no promise to preserve its half either.
    fn clear_pending_state(&mut self) {
        self.gate.reset();
        self.workflow.reset();
        self.kill.reset();
        self.completion.reset();
        self.tracker.reset();
        self.exec_deadline = None;
    }

    async fn handle_drop(&mut self) {
        self.supervisor.mark_dropped();
        self.clear_pending_state();
        self.notify(SessionNotice::Connection(ConnectionState::Reconnecting))
            .await;
    }

    async fn handle_reconnect_due(&mut self) {
        if self.supervisor.attempt_reconnect().await.is_ok() {
            self.resync().await;
        }
        self.notify(SessionNotice::Connection(self.supervisor.state()))
            .await;
    }

    /// The remote side owns the backlog; ask for it again after every
    /// (re)connect.
    async fn resync(&mut self) {
        self.send_frame(&ClientFrame::FetchHistory).await;
    }

    async fn handle_exec_timeout(&mut self) {
        self.exec_deadline = None;
        if self.workflow.is_executing() {
            if let Some(completion) = self.workflow.on_step_result(CommandStatus::Error) {
                let report = completion.report_now.then_some(completion.step.index);
                self.notify(SessionNotice::StepCompleted(completion)).await;
                if let Some(step_index) = report {
                    self.send_frame(&ClientFrame::WorkflowDecision {
                        step_index,
                        decision: StepDecision::Execute,
                    })
                    .await;
                }
            }
        } else if let Some(outcome) = self.gate.on_timeout() {
            self.notify(SessionNotice::Result(outcome)).await;
        }
    }
}
