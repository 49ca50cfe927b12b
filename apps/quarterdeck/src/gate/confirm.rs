/// Confirmation state machine guarding command execution.
///
/// Safety contract: the executor never receives a command that was
/// classified above low risk without an explicit approve event having
/// occurred first. The machine is synchronous; the session actor owns the
/// execution deadline and feeds results back in.
use thiserror::Error;
use tracing::info;

use quarterdeck_proto::CommandStatus;

use super::risk::{RiskAssessment, RiskLevel};

/// Command held back for a user decision. At most one exists per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub raw_command: String,
    pub risk: RiskLevel,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    AwaitingConfirmation,
    Executing,
}

/// How a submission left the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Low risk; the command may go to the executor immediately.
    Dispatch(String),
    /// Held for confirmation; the pending command describes why.
    NeedsConfirmation(PendingCommand),
}

/// Terminal result surfaced to the user. Transient: the gate has already
/// returned to `Idle` when one of these is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: String,
    pub verdict: Verdict,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("a command is awaiting confirmation")]
    ConfirmationPending,
    #[error("a command is already executing")]
    CommandExecuting,
    #[error("no command is awaiting confirmation")]
    NothingPending,
}

#[derive(Debug, Default)]
pub struct CommandGate {
    state: GateStateInner,
}

#[derive(Debug, Default)]
enum GateStateInner {
    #[default]
    Idle,
    AwaitingConfirmation(PendingCommand),
    Executing {
        command: String,
    },
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        match self.state {
            GateStateInner::Idle => GateState::Idle,
            GateStateInner::AwaitingConfirmation(_) => GateState::AwaitingConfirmation,
            GateStateInner::Executing { .. } => GateState::Executing,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, GateStateInner::Idle)
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        match &self.state {
            GateStateInner::AwaitingConfirmation(pending) => Some(pending),
            _ => None,
        }
    }

    /// Submit a command with its risk assessment. A second submission while
    /// one is pending or executing is rejected, never silently dropped.
    pub fn submit(
        &mut self,
        command: &str,
        assessment: RiskAssessment,
    ) -> Result<Submission, GateError> {
        match self.state {
            GateStateInner::AwaitingConfirmation(_) => {
                return Err(GateError::ConfirmationPending)
            }
            GateStateInner::Executing { .. } => return Err(GateError::CommandExecuting),
            GateStateInner::Idle => {}
        }

        if assessment.level.requires_confirmation() {
            let pending = PendingCommand {
                raw_command: command.to_string(),
                risk: assessment.level,
                reasons: assessment.reasons,
            };
            info!(
                command,
                risk = pending.risk.as_str(),
                "command held for confirmation",
            );
            self.state = GateStateInner::AwaitingConfirmation(pending.clone());
            Ok(Submission::NeedsConfirmation(pending))
        } else {
            self.state = GateStateInner::Executing {
                command: command.to_string(),
            };
            Ok(Submission::Dispatch(command.to_string()))
        }
    }

    /// Release the pending command to the executor.
    pub fn approve(&mut self) -> Result<String, GateError> {
        match std::mem::take(&mut self.state) {
            GateStateInner::AwaitingConfirmation(pending) => {
                info!(
                    command = %pending.raw_command,
                    risk = pending.risk.as_str(),
                    reasons = ?pending.reasons,
                    "risky command approved"
                );
                self.state = GateStateInner::Executing {
                    command: pending.raw_command.clone(),
                };
                Ok(pending.raw_command)
            }
            other => {
                self.state = other;
                Err(GateError::NothingPending)
            }
        }
    }

    /// Drop the pending command. No side effects beyond returning to idle.
    pub fn cancel(&mut self) -> Result<CommandOutcome, GateError> {
        match std::mem::take(&mut self.state) {
            GateStateInner::AwaitingConfirmation(pending) => {
                info!(command = %pending.raw_command, "confirmation cancelled");
                Ok(CommandOutcome {
                    command: pending.raw_command,
                    verdict: Verdict::Cancelled,
                    detail: None,
                })
            }
            other => {
                self.state = other;
                Err(GateError::NothingPending)
            }
        }
    }

    /// Executor reported a result for the in-flight command.
    pub fn on_result(
        &mut self,
        status: CommandStatus,
        detail: Option<String>,
    ) -> Option<CommandOutcome> {
        match std::mem::take(&mut self.state) {
            GateStateInner::Executing { command } => Some(CommandOutcome {
                command,
                verdict: match status {
                    CommandStatus::Success => Verdict::Completed,
                    CommandStatus::Error => Verdict::Failed,
                },
                detail,
            }),
            other => {
                // Stray result; nothing was executing.
                self.state = other;
                None
            }
        }
    }

    /// The bounded execution wait expired.
    pub fn on_timeout(&mut self) -> Option<CommandOutcome> {
        match std::mem::take(&mut self.state) {
            GateStateInner::Executing { command } => Some(CommandOutcome {
                command,
                verdict: Verdict::Failed,
                detail: Some("timed out waiting for the executor".to_string()),
            }),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Hard reset: emergency kill or a pass through `Disconnected`. Pending
    /// confirmations are local-only and never survive this.
    pub fn reset(&mut self) {
        self.state = GateStateInner::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::risk::{HeuristicAssessor, RiskAssessor};

    fn gate() -> CommandGate {
        CommandGate::new()
    }

    fn assess(command: &str) -> RiskAssessment {
        HeuristicAssessor.assess(command)
    }

    #[test]
    fn low_risk_dispatches_immediately() {
        let mut gate = gate();
        let submission = gate.submit("ls", assess("ls")).unwrap();
        assert_eq!(submission, Submission::Dispatch("ls".to_string()));
        assert_eq!(gate.state(), GateState::Executing);
    }

    #[test]
    fn risky_command_never_dispatches_without_approval() {
        let mut gate = gate();
        let submission = gate.submit("rm -rf /tmp/x", assess("rm -rf /tmp/x")).unwrap();
        let Submission::NeedsConfirmation(pending) = submission else {
            panic!("expected confirmation hold");
        };
        assert_eq!(pending.risk, RiskLevel::High);
        assert_eq!(pending.reasons, vec!["recursive delete".to_string()]);
        assert_eq!(gate.state(), GateState::AwaitingConfirmation);

        let released = gate.approve().unwrap();
        assert_eq!(released, "rm -rf /tmp/x");
        assert_eq!(gate.state(), GateState::Executing);
    }

    #[test]
    fn cancel_returns_to_idle_without_dispatch() {
        let mut gate = gate();
        gate.submit("rm -rf /tmp/x", assess("rm -rf /tmp/x")).unwrap();
        let outcome = gate.cancel().unwrap();
        assert_eq!(outcome.verdict, Verdict::Cancelled);
        assert_eq!(gate.state(), GateState::Idle);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn second_submit_while_pending_is_rejected() {
        let mut gate = gate();
        gate.submit("rm -rf /tmp/x", assess("rm -rf /tmp/x")).unwrap();
        let err = gate.submit("ls", assess("ls")).unwrap_err();
        assert_eq!(err, GateError::ConfirmationPending);
        // The original pending command is untouched.
        assert_eq!(gate.state(), GateState::AwaitingConfirmation);
        assert_eq!(gate.pending().unwrap().raw_command, "rm -rf /tmp/x");
    }

    #[test]
    fn second_submit_while_executing_is_rejected() {
        let mut gate = gate();
        gate.submit("sleep 60", assess("sleep 60")).unwrap();
        let err = gate.submit("ls", assess("ls")).unwrap_err();
        assert_eq!(err, GateError::CommandExecuting);
    }

    #[test]
    fn result_returns_gate_to_idle() {
        let mut gate = gate();
        gate.submit("ls", assess("ls")).unwrap();
        let outcome = gate
            .on_result(CommandStatus::Success, Some("ok".to_string()))
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Completed);
        assert_eq!(outcome.command, "ls");
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn timeout_fails_the_command() {
        let mut gate = gate();
        gate.submit("sleep 600", assess("sleep 600")).unwrap();
        let outcome = gate.on_timeout().unwrap();
        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn stray_results_are_ignored() {
        let mut gate = gate();
        assert!(gate.on_result(CommandStatus::Success, None).is_none());
        assert!(gate.on_timeout().is_none());
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn approve_without_pending_is_an_error() {
        let mut gate = gate();
        assert_eq!(gate.approve().unwrap_err(), GateError::NothingPending);
        assert_eq!(gate.cancel().unwrap_err(), GateError::NothingPending);
    }

    #[test]
    fn reset_clears_pending_confirmation() {
        let mut gate = gate();
        gate.submit("rm -rf /tmp/x", assess("rm -rf /tmp/x")).unwrap();
        gate.reset();
        assert_eq!(gate.state(), GateState::Idle);
        assert!(gate.pending().is_none());
    }
}
