/// Interactive runner: puts the local terminal into raw mode, translates
/// key events into the session's input units, and renders notices.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;

use quarterdeck_proto::StepDecision;

use crate::config::Config;
use crate::gate::HeuristicAssessor;
use crate::session::{Session, SessionNotice, UserAction};
use crate::terminal::error::CliError;
use crate::terminal::surface::{ConsoleSurface, TerminalSurface};
use crate::transport::websocket::{WebSocketConfig, WebSocketConnector};

/// What the next keypress means. Confirmation prompts take over the
/// keyboard until resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptMode {
    Normal,
    ConfirmCommand,
    ConfirmKill,
    StepPending,
}

pub async fn run(config: &Config, target: &str) -> Result<(), CliError> {
    let ws_config = WebSocketConfig::new(config.session_server.clone())
        .with_path(format!("terminal/{target}"));
    let connector = WebSocketConnector::new(ws_config);
    let (session, handle, mut notices) = Session::new(
        target,
        Box::new(connector),
        Box::new(HeuristicAssessor),
        config.command_timeout,
        config.reconnect_delay,
    );
    let actor = session.spawn();

    enable_raw_mode()?;

    // Key events come off a dedicated thread; crossterm's blocking read
    // must not stall the notice loop.
    let (key_tx, mut key_rx) = mpsc::channel::<KeyEvent>(64);
    let stop = Arc::new(AtomicBool::new(false));
    let reader_stop = stop.clone();
    let reader = std::thread::spawn(move || {
        while !reader_stop.load(Ordering::Relaxed) {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press && key_tx.blocking_send(key).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut surface = ConsoleSurface::default();
    let mut mode = PromptMode::Normal;
    let result = loop {
        tokio::select! {
            notice = notices.recv() => {
                match notice {
                    None => break Err(CliError::SessionClosed),
                    Some(notice) => mode = render_notice(&mut surface, &notice, mode),
                }
            }
            key = key_rx.recv() => {
                match key {
                    None => break Ok(()),
                    Some(key) => {
                        if is_quit(&key) {
                            handle.shutdown().await;
                            break Ok(());
                        }
                        match keypress(&key, mode) {
                            Keypress::Action(action, next_mode) => {
                                mode = next_mode;
                                handle.action(action).await;
                            }
                            Keypress::Bytes(bytes) => handle.input(bytes).await,
                            Keypress::Ignored => {}
                        }
                    }
                }
            }
        }
    };

    stop.store(true, Ordering::Relaxed);
    disable_raw_mode()?;
    let _ = reader.join();
    actor.abort();
    result
}

enum Keypress {
    Action(UserAction, PromptMode),
    Bytes(Vec<u8>),
    Ignored,
}

fn keypress(key: &KeyEvent, mode: PromptMode) -> Keypress {
    // Session-level controls work in any mode.
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('x') => {
                return Keypress::Action(UserAction::EmergencyKill, mode);
            }
            KeyCode::Char('p') => {
                return Keypress::Action(UserAction::PauseAutomation, mode);
            }
            KeyCode::Char('r') => {
                return Keypress::Action(UserAction::ResumeAutomation, mode);
            }
            _ => {}
        }
    }

    match mode {
        PromptMode::ConfirmCommand => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                Keypress::Action(UserAction::Approve, PromptMode::Normal)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                Keypress::Action(UserAction::Cancel, PromptMode::Normal)
            }
            _ => Keypress::Ignored,
        },
        PromptMode::ConfirmKill => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                Keypress::Action(UserAction::ConfirmKill, PromptMode::Normal)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                Keypress::Action(UserAction::AbortKill, PromptMode::Normal)
            }
            _ => Keypress::Ignored,
        },
        PromptMode::StepPending => match key.code {
            KeyCode::Char('e') => Keypress::Action(
                UserAction::Step(StepDecision::Execute),
                PromptMode::Normal,
            ),
            KeyCode::Char('s') => {
                Keypress::Action(UserAction::Step(StepDecision::Skip), PromptMode::Normal)
            }
            KeyCode::Char('m') => {
                Keypress::Action(UserAction::Step(StepDecision::Manual), PromptMode::Normal)
            }
            _ => Keypress::Ignored,
        },
        PromptMode::Normal => match encode_key_event(key) {
            Some(bytes) => Keypress::Bytes(bytes),
            None => Keypress::Ignored,
        },
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('q'))
}

fn render_notice(
    surface: &mut ConsoleSurface,
    notice: &SessionNotice,
    mode: PromptMode,
) -> PromptMode {
    use crate::output::normalize::NormalizedLine;
    use quarterdeck_proto::OutputClass;

    let line = |text: String, class: OutputClass| NormalizedLine { text, class };
    match notice {
        SessionNotice::Connection(state) => {
            surface.present_status(*state);
            mode
        }
        SessionNotice::Line(normalized) => {
            surface.present(normalized);
            mode
        }
        SessionNotice::ConfirmationRequired(pending) => {
            surface.present(&line(
                format!(
                    "{} risk: {} ({}) approve? [y/N]",
                    pending.risk.as_str(),
                    pending.raw_command,
                    pending.reasons.join("; "),
                ),
                OutputClass::Warning,
            ));
            PromptMode::ConfirmCommand
        }
        SessionNotice::Result(outcome) => {
            let class = match outcome.verdict {
                crate::gate::Verdict::Completed => OutputClass::Success,
                crate::gate::Verdict::Cancelled => OutputClass::System,
                crate::gate::Verdict::Failed => OutputClass::Error,
            };
            let detail = outcome.detail.as_deref().unwrap_or("");
            surface.present(&line(
                format!("{}: {:?} {}", outcome.command, outcome.verdict, detail),
                class,
            ));
            if mode == PromptMode::ConfirmCommand {
                PromptMode::Normal
            } else {
                mode
            }
        }
        SessionNotice::StepOffered(step) => {
            surface.present(&line(
                format!(
                    "step {}/{}: {} ({}) [e]xecute [s]kip [m]anual",
                    step.index, step.total, step.command, step.description
                ),
                OutputClass::WorkflowInfo,
            ));
            PromptMode::StepPending
        }
        SessionNotice::StepCompleted(completion) => {
            surface.present(&line(
                format!(
                    "step {}/{} finished ({:?})",
                    completion.step.index, completion.step.total, completion.status
                ),
                OutputClass::WorkflowInfo,
            ));
            mode
        }
        SessionNotice::KillConfirm(processes) => {
            for process in processes {
                surface.present(&line(
                    format!("  {} {}", process.pid, process.command),
                    OutputClass::Warning,
                ));
            }
            surface.present(&line(
                format!("kill all {} processes? [y/N]", processes.len()),
                OutputClass::Warning,
            ));
            PromptMode::ConfirmKill
        }
        SessionNotice::AutomationPaused(paused) => {
            surface.present(&line(
                format!(
                    "automation {}",
                    if *paused { "paused" } else { "running" }
                ),
                OutputClass::WorkflowInfo,
            ));
            mode
        }
        SessionNotice::Error(message) => {
            surface.present(&line(message.clone(), OutputClass::Error));
            mode
        }
    }
}

fn encode_key_event(key: &KeyEvent) -> Option<Vec<u8>> {
    match key.code {
        KeyCode::Char(c) => {
            let mut bytes = Vec::new();
            if key.modifiers.contains(KeyModifiers::ALT) {
                bytes.push(0x1b);
            }
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                let lower = c.to_ascii_lowercase();
                if lower.is_ascii_lowercase() {
                    bytes.push((lower as u8 - b'a') + 1);
                } else {
                    return None;
                }
            } else {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            Some(bytes)
        }
        KeyCode::Enter => Some(vec![b'\r']),
        KeyCode::Tab => Some(vec![b'\t']),
        KeyCode::Backspace => Some(vec![0x7f]),
        KeyCode::Esc => Some(vec![0x1b]),
        KeyCode::Up => Some(b"\x1b[A".to_vec()),
        KeyCode::Down => Some(b"\x1b[B".to_vec()),
        KeyCode::Right => Some(b"\x1b[C".to_vec()),
        KeyCode::Left => Some(b"\x1b[D".to_vec()),
        KeyCode::Home => Some(b"\x1b[H".to_vec()),
        KeyCode::End => Some(b"\x1b[F".to_vec()),
        KeyCode::Delete => Some(b"\x1b[3~".to_vec()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_chars_encode_to_c0_bytes() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(encode_key_event(&key), Some(vec![0x03]));
        let key = KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL);
        assert_eq!(encode_key_event(&key), Some(vec![0x15]));
    }

    #[test]
    fn printable_chars_encode_as_utf8() {
        let key = KeyEvent::new(KeyCode::Char('é'), KeyModifiers::NONE);
        assert_eq!(encode_key_event(&key), Some("é".as_bytes().to_vec()));
    }

    #[test]
    fn confirm_mode_maps_y_and_n() {
        let yes = KeyEvent::new(KeyCode::Char('y'), KeyModifiers::NONE);
        match keypress(&yes, PromptMode::ConfirmCommand) {
            Keypress::Action(UserAction::Approve, PromptMode::Normal) => {}
            _ => panic!("expected approve"),
        }
        let no = KeyEvent::new(KeyCode::Char('n'), KeyModifiers::NONE);
        match keypress(&no, PromptMode::ConfirmKill) {
            Keypress::Action(UserAction::AbortKill, PromptMode::Normal) => {}
            _ => panic!("expected abort"),
        }
    }

    #[test]
    fn emergency_kill_works_in_any_mode() {
        let key = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL);
        for mode in [
            PromptMode::Normal,
            PromptMode::ConfirmCommand,
            PromptMode::StepPending,
        ] {
            match keypress(&key, mode) {
                Keypress::Action(UserAction::EmergencyKill, _) => {}
                _ => panic!("expected emergency kill in {mode:?}"),
            }
        }
    }
}
