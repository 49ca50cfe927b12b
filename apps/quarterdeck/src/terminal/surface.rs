/// Thin adapter to the rendering collaborator. Glyph-level emulation is
/// out of scope; the console implementation just styles whole lines.
use std::io::{self, Write};

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::QueueableCommand;

use quarterdeck_proto::OutputClass;

use crate::output::normalize::NormalizedLine;
use crate::session::connection::ConnectionState;

pub trait TerminalSurface {
    fn present(&mut self, line: &NormalizedLine);
    fn present_status(&mut self, state: ConnectionState);
}

/// Styles normalized lines onto the local terminal with crossterm.
#[derive(Debug, Default)]
pub struct ConsoleSurface;

fn class_color(class: OutputClass) -> Color {
    match class {
        OutputClass::Error => Color::Red,
        OutputClass::Warning => Color::Yellow,
        OutputClass::Success => Color::Green,
        OutputClass::Command | OutputClass::ManualCommand => Color::Cyan,
        OutputClass::AutomatedCommand => Color::Magenta,
        OutputClass::WorkflowInfo => Color::Blue,
        OutputClass::System => Color::DarkGrey,
    }
}

/// The normalizer escapes for browser rendering; undo that for the local
/// console so the user sees the literal text.
fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

impl TerminalSurface for ConsoleSurface {
    fn present(&mut self, line: &NormalizedLine) {
        let mut out = io::stdout();
        let _ = out.queue(SetForegroundColor(class_color(line.class)));
        // Raw mode needs explicit carriage returns.
        let _ = out.write_all(unescape_html(&line.text).as_bytes());
        let _ = out.write_all(b"\r\n");
        let _ = out.queue(ResetColor);
        let _ = out.flush();
    }

    fn present_status(&mut self, state: ConnectionState) {
        let mut out = io::stdout();
        let _ = out.queue(SetForegroundColor(Color::DarkGrey));
        let _ = out.write_all(format!("[{}]\r\n", state.as_str()).as_bytes());
        let _ = out.queue(ResetColor);
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_restores_literal_text() {
        assert_eq!(unescape_html("&lt;b&gt;&amp;"), "<b>&");
        // Untouched text is untouched.
        assert_eq!(unescape_html("plain"), "plain");
    }
}
