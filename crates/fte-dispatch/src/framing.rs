//! Newline-delimited request framing.
//!
//! [`LineBuffer`] turns arbitrary input chunks into complete lines and keeps
//! the trailing partial line until the next chunk. [`RequestFramer`] decodes
//! those lines into requests under a [`MalformedPolicy`].

use serde_json::Value;

use crate::error::{DispatchError, DispatchResult};
use crate::types::{JsonMap, Request};

/// Default bound on text held while waiting for a multi-line request to complete.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 64 * 1024;

/// Accumulated unconsumed input.
///
/// After every [`push`](Self::push) the buffer holds no newline: all complete
/// lines have been handed out and only the in-progress line remains.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line, in arrival order.
    ///
    /// Lines are decoded only once complete, so a multi-byte character split
    /// across two chunks survives intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let Some(last) = self.buf.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buf.split_off(last + 1);
        let complete = std::mem::replace(&mut self.buf, rest);

        complete[..last]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Take the trailing incomplete line, if it holds anything but whitespace.
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let line = decode_line(&rest);
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }

    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop the in-progress line.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(e) => {
            tracing::warn!("Input line is not valid UTF-8: {e}");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// What to do with a complete line that does not parse as JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Answer it immediately with an error response.
    #[default]
    Reject,
    /// If the JSON merely ended early, hold the line and join it with the
    /// following lines until it parses or grows past `max_bytes`.
    Rebuffer { max_bytes: usize },
}

/// One unit of framer output, in input order.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(Request),
    Malformed(DispatchError),
}

/// Turns input chunks into requests.
#[derive(Debug, Default)]
pub struct RequestFramer {
    lines: LineBuffer,
    policy: MalformedPolicy,
    held: Option<String>,
    /// Dropping input up to the next newline after an oversized request.
    discarding: bool,
}

impl RequestFramer {
    pub fn new(policy: MalformedPolicy) -> Self {
        Self {
            lines: LineBuffer::new(),
            policy,
            held: None,
            discarding: false,
        }
    }

    pub fn policy(&self) -> MalformedPolicy {
        self.policy
    }

    /// Feed one chunk; returns every frame it completes.
    ///
    /// Under [`MalformedPolicy::Rebuffer`] an incomplete request (held lines
    /// plus the unterminated tail) never grows past `max_bytes`: once it does,
    /// it is reported once and the rest of its line is dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        let chunk = if self.discarding {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.discarding = false;
                    &chunk[end + 1..]
                }
                None => return frames,
            }
        } else {
            chunk
        };

        for line in self.lines.push(chunk) {
            self.accept_line(line, &mut frames);
        }

        if let MalformedPolicy::Rebuffer { max_bytes } = self.policy {
            let pending = self.pending_len();
            if pending > max_bytes {
                tracing::warn!(
                    bytes = pending,
                    "Discarding unterminated request over {max_bytes} bytes"
                );
                self.lines.clear();
                self.held = None;
                self.discarding = true;
                frames.push(oversized(max_bytes));
            }
        }

        frames
    }

    /// End of input: decode whatever is left exactly once.
    ///
    /// An unparseable remainder is returned as an error; the caller treats it as fatal.
    pub fn finish(&mut self) -> DispatchResult<Option<Request>> {
        let remainder = self.lines.take_remainder();
        let text = match (self.held.take(), remainder) {
            (Some(held), Some(rest)) => format!("{held}\n{rest}"),
            (Some(held), None) => held,
            (None, Some(rest)) => rest,
            (None, None) => return Ok(None),
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        parse_request(trimmed).map(Some)
    }

    /// Bytes buffered but not yet framed, including held text.
    pub fn pending_len(&self) -> usize {
        self.lines.pending_len() + self.held.as_ref().map_or(0, String::len)
    }

    fn accept_line(&mut self, line: String, frames: &mut Vec<Frame>) {
        match self.policy {
            MalformedPolicy::Reject => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return;
                }
                frames.push(to_frame(parse_request(trimmed)));
            }
            MalformedPolicy::Rebuffer { max_bytes } => match self.held.take() {
                Some(held) => {
                    let joined = format!("{held}\n{line}");
                    let parsed = serde_json::from_str::<Value>(joined.trim());
                    match parsed {
                        // The new line does not continue the held text: the
                        // held text is answered on its own, the line is framed fresh.
                        Err(e) if !e.is_eof() => {
                            frames.push(to_frame(parse_request(&held)));
                            self.accept_line(line, frames);
                        }
                        parsed => self.settle(joined, parsed, max_bytes, frames),
                    }
                }
                None => {
                    if line.trim().is_empty() {
                        return;
                    }
                    let parsed = serde_json::from_str::<Value>(line.trim());
                    self.settle(line, parsed, max_bytes, frames);
                }
            },
        }
    }

    fn settle(
        &mut self,
        text: String,
        parsed: serde_json::Result<Value>,
        max_bytes: usize,
        frames: &mut Vec<Frame>,
    ) {
        match parsed {
            Ok(value) => frames.push(to_frame(parse_request_value(value))),
            Err(e) if e.is_eof() => {
                if text.len() > max_bytes {
                    tracing::warn!(
                        bytes = text.len(),
                        "Discarding incomplete request over {max_bytes} bytes"
                    );
                    frames.push(oversized(max_bytes));
                } else {
                    tracing::debug!(bytes = text.len(), "Holding incomplete request");
                    self.held = Some(text);
                }
            }
            Err(e) => frames.push(Frame::Malformed(DispatchError::MalformedRequest(
                e.to_string(),
            ))),
        }
    }
}

fn oversized(max_bytes: usize) -> Frame {
    Frame::Malformed(DispatchError::MalformedRequest(format!(
        "request exceeded {max_bytes} bytes without completing"
    )))
}

fn to_frame(result: DispatchResult<Request>) -> Frame {
    match result {
        Ok(request) => Frame::Request(request),
        Err(e) => Frame::Malformed(e),
    }
}

/// Parse a single line of text as a `{tool, input}` request.
pub fn parse_request(line: &str) -> DispatchResult<Request> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::MalformedRequest("empty request".to_string()));
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| DispatchError::MalformedRequest(e.to_string()))?;
    parse_request_value(value)
}

/// Decode an already-parsed JSON value as a `{tool, input}` request.
pub fn parse_request_value(value: Value) -> DispatchResult<Request> {
    let Value::Object(mut obj) = value else {
        return Err(DispatchError::MalformedRequest(
            "request must be a JSON object".to_string(),
        ));
    };

    let tool = match obj.remove("tool") {
        Some(Value::String(name)) if !name.is_empty() => name,
        Some(Value::String(_)) => {
            return Err(DispatchError::MalformedRequest(
                "'tool' must not be empty".to_string(),
            ))
        }
        Some(_) => {
            return Err(DispatchError::MalformedRequest(
                "'tool' must be a string".to_string(),
            ))
        }
        None => {
            return Err(DispatchError::MalformedRequest(
                "missing 'tool' field".to_string(),
            ))
        }
    };

    let input = match obj.remove("input") {
        Some(Value::Object(map)) => map,
        _ => JsonMap::new(),
    };

    Ok(Request { tool, input })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools(frames: &[Frame]) -> Vec<String> {
        frames
            .iter()
            .map(|f| match f {
                Frame::Request(r) => r.tool.clone(),
                Frame::Malformed(e) => format!("!{}", e.kind()),
            })
            .collect()
    }

    #[test]
    fn test_buffer_splits_complete_lines() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"one\ntwo\nthr");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(buf.pending_len(), 3);

        let lines = buf.push(b"ee\n");
        assert_eq!(lines, vec!["three"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_buffer_without_newline_yields_nothing() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"tool\":").is_empty());
        assert!(buf.push(b"\"a\"}").is_empty());
        assert_eq!(buf.take_remainder().as_deref(), Some("{\"tool\":\"a\"}"));
        assert!(buf.take_remainder().is_none());
    }

    #[test]
    fn test_buffer_keeps_split_utf8() {
        let text = "{\"tool\":\"post_tweet\",\"input\":{\"text\":\"caf\u{e9}\"}}\n";
        let bytes = text.as_bytes();
        let split = text.find('\u{e9}').unwrap() + 1;

        let mut buf = LineBuffer::new();
        assert!(buf.push(&bytes[..split]).is_empty());
        let lines = buf.push(&bytes[split..]);
        assert_eq!(lines, vec![text.trim_end().to_string()]);
    }

    #[test]
    fn test_blank_remainder_is_none() {
        let mut buf = LineBuffer::new();
        buf.push(b"  \t ");
        assert!(buf.take_remainder().is_none());
    }

    #[test]
    fn test_parse_request_defaults_input() {
        let req = parse_request(r#"{"tool":"check_auth"}"#).unwrap();
        assert_eq!(req.tool, "check_auth");
        assert!(req.input.is_empty());

        let req = parse_request(r#"{"tool":"check_auth","input":[1,2]}"#).unwrap();
        assert!(req.input.is_empty());
    }

    #[test]
    fn test_parse_request_errors() {
        assert!(parse_request(r#"{"broken":"#).is_err());
        assert!(parse_request("[1,2,3]").is_err());

        let err = parse_request(r#"{"input":{}}"#).unwrap_err();
        assert_eq!(err.to_string(), "Malformed request: missing 'tool' field");

        let err = parse_request(r#"{"tool":42}"#).unwrap_err();
        assert_eq!(err.kind(), "malformed_request");
    }

    #[test]
    fn test_framer_skips_blank_lines_and_crlf() {
        let mut framer = RequestFramer::new(MalformedPolicy::Reject);
        let frames = framer.push(b"\n   \r\n{\"tool\":\"a\"}\r\n\n{\"tool\":\"b\"}\n");
        assert_eq!(tools(&frames), vec!["a", "b"]);
    }

    #[test]
    fn test_reject_policy_reports_malformed_inline() {
        let mut framer = RequestFramer::new(MalformedPolicy::Reject);
        let frames = framer.push(b"{\"tool\":\"a\"}\n{\"tool\":\n{\"tool\":\"b\"}\n");
        assert_eq!(tools(&frames), vec!["a", "!malformed_request", "b"]);
    }

    #[test]
    fn test_rebuffer_policy_joins_multiline_json() {
        let mut framer = RequestFramer::new(MalformedPolicy::Rebuffer { max_bytes: 1024 });
        let frames = framer.push(b"{\"tool\":\"send_email\",\n\"input\":{\"to\":\"a@b.c\"}\n");
        assert!(frames.is_empty());
        assert!(framer.pending_len() > 0);

        let frames = framer.push(b"}\n{\"tool\":\"mark_read\"}\n");
        assert_eq!(tools(&frames), vec!["send_email", "mark_read"]);
        match &frames[0] {
            Frame::Request(r) => assert_eq!(r.input.get("to"), Some(&json!("a@b.c"))),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_rebuffer_policy_rejects_syntax_errors() {
        let mut framer = RequestFramer::new(MalformedPolicy::Rebuffer { max_bytes: 1024 });
        let frames = framer.push(b"{\"tool\" \"a\"}\n{\"tool\":\"b\"}\n");
        assert_eq!(tools(&frames), vec!["!malformed_request", "b"]);
    }

    #[test]
    fn test_rebuffer_policy_enforces_bound() {
        let mut framer = RequestFramer::new(MalformedPolicy::Rebuffer { max_bytes: 16 });
        let frames = framer.push(b"{\"tool\":\"a\",\n\"input\":{\"text\":\"0123456789\"\n");
        assert_eq!(tools(&frames), vec!["!malformed_request"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_rebuffer_truncated_line_does_not_swallow_next_request() {
        let mut framer = RequestFramer::new(MalformedPolicy::Rebuffer { max_bytes: 1024 });
        let frames = framer.push(b"{\"tool\":\"a\",\"input\":{\n{\"tool\":\"b\"}\n{\"tool\":\"c\"}\n");
        assert_eq!(tools(&frames), vec!["!malformed_request", "b", "c"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_rebuffer_truncated_line_before_another_partial() {
        let mut framer = RequestFramer::new(MalformedPolicy::Rebuffer { max_bytes: 1024 });
        let frames = framer.push(b"{\"tool\":\"a\",\n{\"tool\":\"b\",\n\"input\":{}}\n");
        assert_eq!(tools(&frames), vec!["!malformed_request", "b"]);
    }

    #[test]
    fn test_rebuffer_bounds_unterminated_line() {
        let mut framer = RequestFramer::new(MalformedPolicy::Rebuffer { max_bytes: 16 });
        let frames = framer.push(&[b'x'; 100_000]);
        assert_eq!(tools(&frames), vec!["!malformed_request"]);
        match &frames[0] {
            Frame::Malformed(e) => assert_eq!(
                e.to_string(),
                "Malformed request: request exceeded 16 bytes without completing"
            ),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(framer.pending_len(), 0);

        // The rest of the oversized line is dropped without further frames.
        assert!(framer.push(&[b'y'; 4096]).is_empty());
        assert_eq!(framer.pending_len(), 0);

        let frames = framer.push(b"yyy\n{\"tool\":\"a\"}\n");
        assert_eq!(tools(&frames), vec!["a"]);
        assert!(framer.finish().unwrap().is_none());
    }

    #[test]
    fn test_rebuffer_bound_counts_held_text() {
        let mut framer = RequestFramer::new(MalformedPolicy::Rebuffer { max_bytes: 24 });
        assert!(framer.push(b"{\"tool\":\"a\",\n").is_empty());
        let frames = framer.push(b"\"input\":{\"k\":\"0123456789");
        assert_eq!(tools(&frames), vec!["!malformed_request"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_finish_flushes_remainder() {
        let mut framer = RequestFramer::new(MalformedPolicy::Reject);
        assert!(framer.push(b"{\"tool\":\"get_balance\"}").is_empty());
        let req = framer.finish().unwrap().unwrap();
        assert_eq!(req.tool, "get_balance");
        assert!(framer.finish().unwrap().is_none());
    }

    #[test]
    fn test_finish_unparseable_is_error() {
        let mut framer = RequestFramer::new(MalformedPolicy::Reject);
        framer.push(b"{\"tool\":\"a\"}\n{\"tool\":");
        let err = framer.finish().unwrap_err();
        assert_eq!(err.kind(), "malformed_request");
    }

    #[test]
    fn test_finish_with_held_text() {
        let mut framer = RequestFramer::new(MalformedPolicy::Rebuffer { max_bytes: 1024 });
        assert!(framer.push(b"{\"tool\":\n").is_empty());
        assert!(framer.push(b"\"get_metrics\"}").is_empty());
        let req = framer.finish().unwrap().unwrap();
        assert_eq!(req.tool, "get_metrics");
    }
}
