/// Normalizes raw executor output for safe, styled rendering.
///
/// Pure and synchronous: strips escape sequences, folds CRLF, HTML-escapes
/// the remainder, and tags each line with a semantic class. Idempotent
/// (feeding normalized text back through changes nothing) and never panics
/// on malformed sequences, which are dropped rather than passed through.
use quarterdeck_proto::OutputClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    pub text: String,
    pub class: OutputClass,
}

/// Strip CSI, OSC, and lone ESC sequences. Unterminated sequences swallow
/// the remainder of the chunk instead of leaking partial control bytes.
pub fn strip_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\u{1b}' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            // CSI: parameter/intermediate bytes then one final byte.
            Some('[') => {
                chars.next();
                for body in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&body) {
                        break;
                    }
                }
            }
            // OSC (window titles etc.): runs to BEL or ESC-backslash.
            Some(']') => {
                chars.next();
                while let Some(body) = chars.next() {
                    if body == '\u{07}' {
                        break;
                    }
                    if body == '\u{1b}' {
                        if chars.peek() == Some(&'\\') {
                            chars.next();
                        }
                        break;
                    }
                }
            }
            // Two-char escapes (charset selection, keypad modes, ...).
            Some(_) => {
                chars.next();
            }
            // Trailing bare ESC.
            None => {}
        }
    }
    out
}

/// HTML-escape while recognizing entities that are already escaped, so the
/// operation is idempotent.
pub fn escape_html(input: &str) -> String {
    const ENTITIES: &[&str] = &["amp;", "lt;", "gt;", "quot;", "#39;"];
    let mut out = String::with_capacity(input.len());
    for (pos, ch) in input.char_indices() {
        match ch {
            '&' => {
                let rest = &input[pos + 1..];
                if ENTITIES.iter().any(|e| rest.starts_with(e)) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Prefix conventions used when the sender did not classify the line.
pub fn classify_line(line: &str) -> OutputClass {
    let trimmed = line.trim_start();
    let lower = trimmed.to_lowercase();
    if lower.starts_with("error") || lower.starts_with("fatal") {
        OutputClass::Error
    } else if lower.starts_with("warning") || lower.starts_with("warn") {
        OutputClass::Warning
    } else if trimmed.starts_with('✓') || lower.starts_with("ok:") || lower.starts_with("success")
    {
        OutputClass::Success
    } else if trimmed.starts_with("[auto] $") {
        OutputClass::AutomatedCommand
    } else if trimmed.starts_with("[workflow]") {
        OutputClass::WorkflowInfo
    } else if trimmed.starts_with("$ ") {
        OutputClass::Command
    } else {
        OutputClass::System
    }
}

/// Normalize one raw chunk into classified lines. A sender-supplied class
/// wins over prefix inference.
pub fn normalize_chunk(text: &str, class: Option<OutputClass>) -> Vec<NormalizedLine> {
    let stripped = strip_escapes(text);
    let folded = stripped.replace("\r\n", "\n").replace('\r', "\n");
    folded
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            let text = escape_html(line);
            NormalizedLine {
                class: class.unwrap_or_else(|| classify_line(&text)),
                text,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sgr_and_cursor_sequences_are_stripped() {
        assert_eq!(strip_escapes("\u{1b}[31mred\u{1b}[0m"), "red");
        assert_eq!(strip_escapes("a\u{1b}[2Jb\u{1b}[10;20Hc"), "abc");
        // Private-mode set/reset.
        assert_eq!(strip_escapes("\u{1b}[?25lhidden\u{1b}[?25h"), "hidden");
    }

    #[test]
    fn osc_title_sequences_are_stripped() {
        assert_eq!(strip_escapes("\u{1b}]0;my title\u{07}body"), "body");
        assert_eq!(strip_escapes("\u{1b}]2;t\u{1b}\\body"), "body");
    }

    #[test]
    fn malformed_sequences_are_dropped_not_passed_through() {
        // Unterminated CSI swallows to end of chunk without panicking.
        assert_eq!(strip_escapes("ok\u{1b}[12;"), "ok");
        // Bare trailing ESC.
        assert_eq!(strip_escapes("ok\u{1b}"), "ok");
        // Unterminated OSC.
        assert_eq!(strip_escapes("ok\u{1b}]0;title"), "ok");
    }

    #[test]
    fn html_escaping_is_idempotent() {
        let once = escape_html("<b>&\"x'\"</b>");
        let twice = escape_html(&once);
        assert_eq!(once, "&lt;b&gt;&amp;&quot;x&#39;&quot;&lt;/b&gt;");
        assert_eq!(once, twice);
    }

    #[test]
    fn crlf_normalizes_to_lf() {
        let lines = normalize_chunk("one\r\ntwo\rthree\n", None);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn sender_class_wins_over_inference() {
        let lines = normalize_chunk("error: nope", Some(OutputClass::WorkflowInfo));
        assert_eq!(lines[0].class, OutputClass::WorkflowInfo);
    }

    #[test]
    fn prefix_conventions_classify_lines() {
        let cases = [
            ("error: no such file", OutputClass::Error),
            ("WARNING: low disk", OutputClass::Warning),
            ("✓ all checks passed", OutputClass::Success),
            ("$ ls -la", OutputClass::Command),
            ("[auto] $ cargo fetch", OutputClass::AutomatedCommand),
            ("[workflow] step 2 of 5", OutputClass::WorkflowInfo),
            ("plain text", OutputClass::System),
        ];
        for (line, expected) in cases {
            assert_eq!(classify_line(line), expected, "line: {line}");
        }
    }

    #[test]
    fn normalization_is_idempotent_end_to_end() {
        let raw = "\u{1b}[32m✓ done\u{1b}[0m\r\n<script>&\r\n";
        let first = normalize_chunk(raw, None);
        let rejoined: String = first
            .iter()
            .map(|l| l.text.clone())
            .collect::<Vec<_>>()
            .join("\n");
        let second = normalize_chunk(&rejoined, None);
        assert_eq!(first, second);
    }
}
