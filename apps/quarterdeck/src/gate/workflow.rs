/// Gate for agent-driven multi-step plans.
///
/// The planner supplies one step at a time; each is executed, skipped, or
/// turned into manual takeover. Steps were already vetted by the planner,
/// so an executed step bypasses the risk gate's own scoring, but it never
/// runs while a manual confirmation is outstanding (the session enforces
/// that exclusion).
use thiserror::Error;
use tracing::info;

use quarterdeck_proto::{CommandStatus, StepDecision, WorkflowStep};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("automation is paused")]
    AutomationPaused,
    #[error("a step is already awaiting a decision")]
    StepOutstanding,
    #[error("a step is still executing")]
    StepExecuting,
    #[error("no step is awaiting a decision")]
    NoStepPending,
}

/// What the session must do after a step decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Submit the step's command. The `execute` decision frame is deferred
    /// until the result arrives; sending it is the next-step request.
    Execute { command: String },
    /// Report the skip immediately; that report requests the next step.
    Skip { step_index: u32 },
    /// User takes over. Report immediately; automation is now paused.
    Manual { step_index: u32 },
}

/// A finished (or timed-out) step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCompletion {
    pub step: WorkflowStep,
    pub status: CommandStatus,
    /// False when automation was paused mid-execution: the in-flight step
    /// finished, but the next-step request is held until resume.
    pub report_now: bool,
}

#[derive(Debug, Default)]
pub struct WorkflowGate {
    paused: bool,
    offered: Option<WorkflowStep>,
    executing: Option<WorkflowStep>,
    /// Step that completed while paused; its decision frame goes out on
    /// resume.
    deferred_report: Option<u32>,
}

impl WorkflowGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_executing(&self) -> bool {
        self.executing.is_some()
    }

    pub fn offered(&self) -> Option<&WorkflowStep> {
        self.offered.as_ref()
    }

    /// Accept the planner's next step. The gate holds at most one.
    pub fn offer_step(&mut self, step: WorkflowStep) -> Result<&WorkflowStep, WorkflowError> {
        if self.paused {
            return Err(WorkflowError::AutomationPaused);
        }
        if self.offered.is_some() {
            return Err(WorkflowError::StepOutstanding);
        }
        if self.executing.is_some() {
            return Err(WorkflowError::StepExecuting);
        }
        info!(index = step.index, total = step.total, "workflow step offered");
        Ok(self.offered.insert(step))
    }

    /// Apply the user's verdict to the outstanding step.
    pub fn decide(&mut self, decision: StepDecision) -> Result<StepAction, WorkflowError> {
        let step = self.offered.take().ok_or(WorkflowError::NoStepPending)?;
        match decision {
            StepDecision::Execute => {
                info!(index = step.index, command = %step.command, "workflow step executing");
                let command = step.command.clone();
                self.executing = Some(step);
                Ok(StepAction::Execute { command })
            }
            StepDecision::Skip => {
                info!(index = step.index, "workflow step skipped");
                Ok(StepAction::Skip {
                    step_index: step.index,
                })
            }
            StepDecision::Manual => {
                info!(index = step.index, "manual takeover, automation paused");
                self.paused = true;
                Ok(StepAction::Manual {
                    step_index: step.index,
                })
            }
        }
    }

    /// The in-flight step finished (executor result or timeout).
    pub fn on_step_result(&mut self, status: CommandStatus) -> Option<StepCompletion> {
        let step = self.executing.take()?;
        let report_now = !self.paused;
        if !report_now {
            self.deferred_report = Some(step.index);
        }
        Some(StepCompletion {
            step,
            status,
            report_now,
        })
    }

    /// Suspend automation. Idempotent, intent-only: an in-flight step is
    /// allowed to finish, and calling this while disconnected is safe.
    pub fn pause(&mut self) -> bool {
        if self.paused {
            return false;
        }
        self.paused = true;
        info!("automation paused");
        true
    }

    /// Restore `Running`. Returns the index of a step that completed while
    /// paused, whose next-step request still needs to go out.
    pub fn resume(&mut self) -> (bool, Option<u32>) {
        if !self.paused {
            return (false, None);
        }
        self.paused = false;
        info!("automation resumed");
        (true, self.deferred_report.take())
    }

    /// Drop any outstanding or in-flight step. Pause intent survives: it is
    /// local intent, not transport state.
    pub fn reset(&mut self) {
        self.offered = None;
        self.executing = None;
        self.deferred_report = None;
    }
}
