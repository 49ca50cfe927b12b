pub mod confirm;
pub mod kill;
pub mod risk;
pub mod workflow;

pub use confirm::{CommandGate, CommandOutcome, GateError, GateState, PendingCommand, Submission, Verdict};
pub use kill::EmergencyKill;
pub use risk::{HeuristicAssessor, RiskAssessment, RiskAssessor, RiskLevel};
pub use workflow::{StepAction, StepCompletion, WorkflowError, WorkflowGate};
