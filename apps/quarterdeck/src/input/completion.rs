/// Turns Tab presses into completion requests and merges the asynchronous
/// responses back into the shadow buffer without corrupting terminal state.
use quarterdeck_proto::ServerFrame;

use super::shadow::ShadowLineBuffer;

/// What the session must do after a completion response has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Zero candidates, a malformed response, or no request in flight.
    Ignored,
    /// Erase `erase` chars immediately before the remote cursor (that many
    /// backspace bytes on the wire) and write `insert`. The shadow buffer
    /// has already been updated.
    Edit { erase: usize, insert: String },
    /// Ambiguous without a usable common stem: print the candidates on the
    /// output stream, buffer untouched.
    Candidates(Vec<String>),
}

/// Tracks the single in-flight completion request per session. A Tab while
/// one is pending is dropped, otherwise the response would land against a
/// stale shadow snapshot.
#[derive(Debug, Default)]
pub struct CompletionCoordinator {
    in_flight: bool,
}

impl CompletionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a Tab snapshot. Returns `false` when a request is already
    /// outstanding.
    pub fn begin_request(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Drop the in-flight marker without applying anything, e.g. when the
    /// connection falls over before the response arrives.
    pub fn reset(&mut self) {
        self.in_flight = false;
    }

    /// Apply a `completion_response` frame to the shadow buffer.
    ///
    /// Conventional shell semantics: a single match applies silently, a
    /// shared stem longer than the typed prefix auto-expands, anything else
    /// prints the choices. Malformed responses degrade to the
    /// zero-completions case.
    pub fn apply(
        &mut self,
        frame: &ServerFrame,
        buffer: &mut ShadowLineBuffer,
    ) -> CompletionOutcome {
        let ServerFrame::CompletionResponse {
            completions,
            prefix,
            common_prefix,
        } = frame
        else {
            return CompletionOutcome::Ignored;
        };

        if !self.in_flight {
            // Stale or unsolicited; never mutate the buffer for it.
            return CompletionOutcome::Ignored;
        }
        self.in_flight = false;

        let prefix_len = prefix.chars().count();
        if prefix_len > buffer.cursor() {
            // The remote thinks we typed more than the shadow holds;
            // treat as malformed.
            return CompletionOutcome::Ignored;
        }

        match completions.as_slice() {
            [] => CompletionOutcome::Ignored,
            [only] => Self::expand(buffer, prefix_len, only),
            _ => match common_prefix {
                Some(stem) if stem.chars().count() > prefix_len => {
                    Self::expand(buffer, prefix_len, stem)
                }
                _ => CompletionOutcome::Candidates(completions.clone()),
            },
        }
    }

    fn expand(
        buffer: &mut ShadowLineBuffer,
        prefix_len: usize,
        replacement: &str,
    ) -> CompletionOutcome {
        buffer.replace_trailing_token(replacement);
        CompletionOutcome::Edit {
            erase: prefix_len,
            insert: replacement.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(text: &str) -> ShadowLineBuffer {
        let mut buf = ShadowLineBuffer::default();
        buf.insert_str(text);
        buf
    }

    fn response(
        completions: &[&str],
        prefix: &str,
        common_prefix: Option<&str>,
    ) -> ServerFrame {
        ServerFrame::CompletionResponse {
            completions: completions.iter().map(|s| s.to_string()).collect(),
            prefix: prefix.to_string(),
            common_prefix: common_prefix.map(|s| s.to_string()),
        }
    }

    #[test]
    fn single_candidate_erases_prefix_and_writes_completion() {
        let mut coord = CompletionCoordinator::new();
        let mut buf = buffer_with("cat fo");
        assert!(coord.begin_request());

        let outcome = coord.apply(&response(&["foo"], "fo", None), &mut buf);
        assert_eq!(
            outcome,
            CompletionOutcome::Edit {
                erase: 2,
                insert: "foo".to_string()
            }
        );
        assert_eq!(buf.text(), "cat foo");
        assert!(buf.text().ends_with("foo"));
    }

    #[test]
    fn common_prefix_expands_without_listing() {
        let mut coord = CompletionCoordinator::new();
        let mut buf = buffer_with("cat fo");
        coord.begin_request();

        let outcome =
            coord.apply(&response(&["foo", "food"], "fo", Some("foo")), &mut buf);
        assert_eq!(
            outcome,
            CompletionOutcome::Edit {
                erase: 2,
                insert: "foo".to_string()
            }
        );
        assert_eq!(buf.text(), "cat foo");
    }

    #[test]
    fn ambiguous_without_stem_lists_candidates_and_keeps_buffer() {
        let mut coord = CompletionCoordinator::new();
        let mut buf = buffer_with("cat fo");
        coord.begin_request();

        let outcome = coord.apply(&response(&["foo", "bar"], "fo", None), &mut buf);
        assert_eq!(
            outcome,
            CompletionOutcome::Candidates(vec!["foo".to_string(), "bar".to_string()])
        );
        assert_eq!(buf.text(), "cat fo");
        assert_eq!(buf.cursor(), 6);
    }

    #[test]
    fn common_prefix_equal_to_typed_prefix_falls_back_to_listing() {
        let mut coord = CompletionCoordinator::new();
        let mut buf = buffer_with("cat fo");
        coord.begin_request();

        let outcome =
            coord.apply(&response(&["foo", "fob"], "fo", Some("fo")), &mut buf);
        assert!(matches!(outcome, CompletionOutcome::Candidates(_)));
        assert_eq!(buf.text(), "cat fo");
    }

    #[test]
    fn zero_candidates_is_a_noop() {
        let mut coord = CompletionCoordinator::new();
        let mut buf = buffer_with("cat fo");
        coord.begin_request();

        let outcome = coord.apply(&response(&[], "fo", None), &mut buf);
        assert_eq!(outcome, CompletionOutcome::Ignored);
        assert_eq!(buf.text(), "cat fo");
    }

    #[test]
    fn prefix_longer_than_cursor_is_treated_as_malformed() {
        let mut coord = CompletionCoordinator::new();
        let mut buf = buffer_with("fo");
        coord.begin_request();

        let outcome = coord.apply(&response(&["foobar"], "foobar", None), &mut buf);
        assert_eq!(outcome, CompletionOutcome::Ignored);
        assert_eq!(buf.text(), "fo");
    }

    #[test]
    fn unsolicited_response_never_mutates_the_buffer() {
        let mut coord = CompletionCoordinator::new();
        let mut buf = buffer_with("cat fo");

        let outcome = coord.apply(&response(&["foo"], "fo", None), &mut buf);
        assert_eq!(outcome, CompletionOutcome::Ignored);
        assert_eq!(buf.text(), "cat fo");
    }

    #[test]
    fn second_tab_while_in_flight_is_dropped() {
        let mut coord = CompletionCoordinator::new();
        assert!(coord.begin_request());
        assert!(!coord.begin_request());
    }
}
