use super::logging::emit_fragment_parse_error;
use crate::types::Fragment;
use anyhow::{Context, Result};
use serde_json::Value;

/// Accumulates the text stream of a fragment object and yields a snapshot each
/// time the partially-built object changes.
#[derive(Default)]
pub struct FragmentStreamParser {
    buffer: String,
    pending_bytes: Vec<u8>,
    last_snapshot: Option<Fragment>,
}

impl FragmentStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Option<Fragment> {
        self.push_bytes(chunk);

        let value = parse_partial_json(&self.buffer)?;
        let snapshot: Fragment = serde_json::from_value(value).ok()?;
        if self.last_snapshot.as_ref() == Some(&snapshot) {
            return None;
        }
        self.last_snapshot = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Strict parse of the complete body. An empty body yields an empty fragment.
    pub fn finish(&mut self) -> Result<Fragment> {
        if !self.pending_bytes.is_empty() {
            let tail = std::mem::take(&mut self.pending_bytes);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }

        let body = self.buffer.trim();
        if body.is_empty() {
            return Ok(Fragment::default());
        }

        match serde_json::from_str::<Fragment>(body) {
            Ok(fragment) => Ok(fragment),
            Err(error) => {
                emit_fragment_parse_error(body, &error);
                Err(error).context("completion stream returned a malformed fragment object")
            }
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    fn push_bytes(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending_bytes) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.pending_bytes.clear();
            }
            Err(error) => {
                let valid = error.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending_bytes[..valid]).into_owned();
                self.buffer.push_str(&text);
                if error.error_len().is_some() {
                    // Invalid sequence, not a split character.
                    let rest = String::from_utf8_lossy(&self.pending_bytes[valid..]).into_owned();
                    self.buffer.push_str(&rest);
                    self.pending_bytes.clear();
                } else {
                    self.pending_bytes.drain(..valid);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectState {
    KeyOrEnd,
    Key,
    Colon,
    Value,
    CommaOrEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    ValueOrEnd,
    CommaOrEnd,
}

#[derive(Debug, Clone, Copy)]
enum FrameState {
    Object(ObjectState),
    Array(ArrayState),
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    state: FrameState,
    /// Byte offset where the member being built starts (its leading comma
    /// included). Truncating here drops a dangling member.
    member_start: usize,
}

impl Frame {
    fn closer(&self) -> char {
        match self.state {
            FrameState::Object(_) => '}',
            FrameState::Array(_) => ']',
        }
    }

    fn expects_value(&self) -> bool {
        matches!(
            self.state,
            FrameState::Object(ObjectState::Value) | FrameState::Array(ArrayState::ValueOrEnd)
        )
    }

    fn value_done(&mut self) {
        self.state = match self.state {
            FrameState::Object(_) => FrameState::Object(ObjectState::CommaOrEnd),
            FrameState::Array(_) => FrameState::Array(ArrayState::CommaOrEnd),
        };
    }
}

/// Completes a truncated JSON object into the largest valid value it implies.
///
/// Open strings are closed, open containers are closed, and members whose key or
/// value is still incomplete are dropped. Numbers are only kept once a delimiter
/// follows them. Returns `None` until the root object has started.
pub fn parse_partial_json(text: &str) -> Option<Value> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut started = false;
    let mut finished_at: Option<usize> = None;
    let mut in_string = false;
    let mut escape_start: Option<usize> = None;
    let mut unicode_digits_left = 0u8;
    let mut scalar_start: Option<usize> = None;

    for (index, ch) in text.char_indices() {
        if finished_at.is_some() {
            break;
        }

        if in_string {
            if escape_start.is_some() {
                if unicode_digits_left > 0 {
                    unicode_digits_left -= 1;
                    if unicode_digits_left == 0 {
                        escape_start = None;
                    }
                } else if ch == 'u' {
                    unicode_digits_left = 4;
                } else {
                    escape_start = None;
                }
                continue;
            }
            match ch {
                '\\' => escape_start = Some(index),
                '"' => {
                    in_string = false;
                    let frame = frames.last_mut()?;
                    match frame.state {
                        FrameState::Object(ObjectState::Key) => {
                            frame.state = FrameState::Object(ObjectState::Colon)
                        }
                        _ => frame.value_done(),
                    }
                }
                _ => {}
            }
            continue;
        }

        if scalar_start.is_some() {
            if ch.is_whitespace() || matches!(ch, ',' | '}' | ']') {
                scalar_start = None;
                frames.last_mut()?.value_done();
            } else {
                continue;
            }
        }

        if ch.is_whitespace() {
            continue;
        }

        if !started {
            if ch != '{' {
                return None;
            }
            started = true;
            frames.push(Frame {
                state: FrameState::Object(ObjectState::KeyOrEnd),
                member_start: index + 1,
            });
            continue;
        }

        let frame = frames.last_mut()?;
        match (frame.state, ch) {
            (FrameState::Object(ObjectState::KeyOrEnd), '"') => {
                frame.state = FrameState::Object(ObjectState::Key);
                in_string = true;
            }
            (FrameState::Object(ObjectState::Colon), ':') => {
                frame.state = FrameState::Object(ObjectState::Value);
            }
            (FrameState::Object(ObjectState::CommaOrEnd), ',') => {
                frame.state = FrameState::Object(ObjectState::KeyOrEnd);
                frame.member_start = index;
            }
            (FrameState::Array(ArrayState::CommaOrEnd), ',') => {
                frame.state = FrameState::Array(ArrayState::ValueOrEnd);
                frame.member_start = index;
            }
            (FrameState::Object(ObjectState::KeyOrEnd | ObjectState::CommaOrEnd), '}')
            | (FrameState::Array(ArrayState::ValueOrEnd | ArrayState::CommaOrEnd), ']') => {
                frames.pop();
                match frames.last_mut() {
                    Some(parent) => parent.value_done(),
                    None => finished_at = Some(index + 1),
                }
            }
            (_, '"') if frame.expects_value() => in_string = true,
            (_, '{') if frame.expects_value() => {
                frame.value_done();
                frames.push(Frame {
                    state: FrameState::Object(ObjectState::KeyOrEnd),
                    member_start: index + 1,
                });
            }
            (_, '[') if frame.expects_value() => {
                frame.value_done();
                frames.push(Frame {
                    state: FrameState::Array(ArrayState::ValueOrEnd),
                    member_start: index + 1,
                });
            }
            (_, _) if frame.expects_value() => scalar_start = Some(index),
            _ => return None,
        }
    }

    if let Some(end) = finished_at {
        return serde_json::from_str(&text[..end]).ok();
    }
    if !started {
        return None;
    }

    let mut repaired;
    if in_string {
        let top = frames.last()?;
        if matches!(top.state, FrameState::Object(ObjectState::Key)) {
            repaired = text[..top.member_start].to_string();
        } else {
            let end = escape_start.unwrap_or(text.len());
            repaired = text[..end].to_string();
            repaired.push('"');
        }
    } else if let Some(start) = scalar_start {
        let token = &text[start..];
        if matches!(token, "true" | "false" | "null") {
            repaired = text.to_string();
        } else {
            repaired = text[..frames.last()?.member_start].to_string();
        }
    } else {
        let top = frames.last()?;
        let dangling = matches!(
            top.state,
            FrameState::Object(
                ObjectState::KeyOrEnd | ObjectState::Key | ObjectState::Colon | ObjectState::Value
            ) | FrameState::Array(ArrayState::ValueOrEnd)
        );
        repaired = if dangling {
            text[..top.member_start].to_string()
        } else {
            text.to_string()
        };
    }

    for frame in frames.iter().rev() {
        repaired.push(frame.closer());
    }
    serde_json::from_str(&repaired).ok()
}
