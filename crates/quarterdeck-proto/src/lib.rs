//! Wire protocol shared between the browser control surface and the
//! quarterdeck session engine. Keeping this in a dedicated crate allows
//! regeneration of TypeScript bindings without pulling in the runtime.
//!
//! Frames are JSON-encoded tagged unions. Tag values are snake_case; the
//! few multi-word field names stay camelCase because the browser side owns
//! that convention.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic class attached to a rendered output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputClass {
    Error,
    Warning,
    Success,
    Command,
    System,
    AutomatedCommand,
    ManualCommand,
    WorkflowInfo,
}

/// Result status reported by the executor for a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Error,
}

/// User verdict on an agent-proposed workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDecision {
    Execute,
    Skip,
    Manual,
}

/// Snapshot of one running process, rendered only in the emergency-kill
/// confirmation. Never cached beyond that render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command: String,
}

/// One agent-proposed command in a multi-step plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub index: u32,
    pub total: u32,
    pub command: String,
    pub description: String,
    pub explanation: String,
}

/// A backlog line replayed after reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLine {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<OutputClass>,
}

/// Frames the executor side sends to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Raw output chunk, optionally pre-classified by the sender.
    Output {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class: Option<OutputClass>,
    },

    /// Answer to a `completion_request`.
    CompletionResponse {
        completions: Vec<String>,
        prefix: String,
        #[serde(
            default,
            rename = "commonPrefix",
            skip_serializing_if = "Option::is_none"
        )]
        common_prefix: Option<String>,
    },

    /// Snapshot of running processes for the kill confirmation.
    ProcessList { processes: Vec<ProcessInfo> },

    /// Terminal result for the command currently executing.
    CommandResult {
        status: CommandStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Remote-authoritative backlog, replayed after reconnect.
    History { lines: Vec<HistoryLine> },

    /// Next automation step supplied by the planner agent.
    WorkflowStep {
        index: u32,
        total: u32,
        command: String,
        description: String,
        explanation: String,
    },
}

/// Frames the engine sends to the executor side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Raw keystroke bytes forwarded to the remote line editor.
    Input { data: Vec<u8> },

    /// Command released for execution. Risk approval has already happened
    /// on this side; the executor may re-validate.
    SubmitCommand { text: String },

    /// Tab-completion request with the shadow snapshot.
    CompletionRequest { text: String, cursor: usize },

    /// Ask for the process snapshot that precedes a kill confirmation.
    ListProcesses,

    /// Kill every process in the session.
    KillAll,

    /// Re-fetch the remote-authoritative backlog after reconnect.
    FetchHistory,

    PauseAutomation,
    ResumeAutomation,

    /// Verdict on a workflow step. `skip` and `manual` go out at decision
    /// time; `execute` goes out once the step's result has arrived and
    /// doubles as the next-step request.
    WorkflowDecision {
        #[serde(rename = "stepIndex")]
        step_index: u32,
        decision: StepDecision,
    },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ServerFrame {
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FrameError::NotUtf8)?;
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl ClientFrame {
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FrameError::NotUtf8)?;
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_tags_are_snake_case() {
        let json = serde_json::to_string(&ClientFrame::SubmitCommand {
            text: "ls".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"submit_command\""));

        let json = serde_json::to_string(&ClientFrame::KillAll).unwrap();
        assert_eq!(json, "{\"type\":\"kill_all\"}");
    }

    #[test]
    fn completion_response_uses_camel_case_common_prefix() {
        let frame = ServerFrame::decode(
            br#"{"type":"completion_response","completions":["foo","food"],"prefix":"fo","commonPrefix":"foo"}"#,
        )
        .unwrap();
        match frame {
            ServerFrame::CompletionResponse {
                completions,
                prefix,
                common_prefix,
            } => {
                assert_eq!(completions, vec!["foo", "food"]);
                assert_eq!(prefix, "fo");
                assert_eq!(common_prefix.as_deref(), Some("foo"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn output_class_is_optional_and_kebab_case() {
        let frame =
            ServerFrame::decode(br#"{"type":"output","text":"hi"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Output {
                text: "hi".into(),
                class: None
            }
        );

        let frame = ServerFrame::decode(
            br#"{"type":"output","text":"done","class":"automated-command"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Output {
                text: "done".into(),
                class: Some(OutputClass::AutomatedCommand)
            }
        );
    }

    #[test]
    fn workflow_decision_uses_camel_case_step_index() {
        let json = serde_json::to_string(&ClientFrame::WorkflowDecision {
            step_index: 3,
            decision: StepDecision::Skip,
        })
        .unwrap();
        assert!(json.contains("\"stepIndex\":3"));
        assert!(json.contains("\"decision\":\"skip\""));
    }

    #[test]
    fn unknown_frame_type_is_a_decode_error() {
        let err = ServerFrame::decode(br#"{"type":"no_such_frame"}"#);
        assert!(matches!(err, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn invalid_utf8_is_rejected_before_parsing() {
        let err = ServerFrame::decode(&[0xff, 0xfe, 0x00]);
        assert!(matches!(err, Err(FrameError::NotUtf8)));
    }
}
