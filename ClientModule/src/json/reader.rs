//! # Incremental JSON Reader
//!
//! Frames one top-level JSON value from a stream of characters pushed one at
//! a time. The reader only tracks nesting, strings and escapes to find where
//! the value ends; the framed text is then parsed by `serde_json`.

use log::debug;
use serde_json::Value;

/// Reader position within the framed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Skipping leading whitespace
    Idle,
    /// Inside an object or array
    Value,
    /// Inside a string literal
    String,
    /// Just after a backslash inside a string literal
    Escape,
    /// Inside a top-level number or literal
    Scalar,
    /// A complete value was framed and parsed
    Done,
    Failed,
}

impl ReaderState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

#[derive(Debug)]
pub struct JsonStreamReader {
    state: ReaderState,
    depth: usize,
    buffer: String,
    consumed: usize,
    value: Option<Value>,
}

impl Default for JsonStreamReader {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonStreamReader {
    pub fn new() -> Self {
        Self {
            state: ReaderState::Idle,
            depth: 0,
            buffer: String::new(),
            consumed: 0,
            value: None,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// UTF-8 length of everything accepted up to and including the end of
    /// the framed value
    pub fn consumed_bytes(&self) -> usize {
        self.consumed
    }

    /// Feed one character and return the resulting state
    pub fn push(&mut self, c: char) -> ReaderState {
        match self.state {
            ReaderState::Idle => {
                if c.is_whitespace() || c == '\u{feff}' {
                    self.consumed += c.len_utf8();
                    return self.state;
                }
                self.state = match c {
                    '{' | '[' => {
                        self.depth = 1;
                        ReaderState::Value
                    }
                    '"' => ReaderState::String,
                    c if starts_scalar(c) => ReaderState::Scalar,
                    _ => {
                        debug!("Unexpected '{}' at start of JSON value", c);
                        return self.fail();
                    }
                };
                self.accept(c);
            }
            ReaderState::Value => {
                self.accept(c);
                match c {
                    '"' => self.state = ReaderState::String,
                    '{' | '[' => self.depth += 1,
                    '}' | ']' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            self.finish();
                        }
                    }
                    _ => {}
                }
            }
            ReaderState::String => {
                self.accept(c);
                match c {
                    '\\' => self.state = ReaderState::Escape,
                    '"' if self.depth == 0 => self.finish(),
                    '"' => self.state = ReaderState::Value,
                    _ => {}
                }
            }
            ReaderState::Escape => {
                self.accept(c);
                self.state = ReaderState::String;
            }
            ReaderState::Scalar => {
                if c.is_whitespace() {
                    self.finish();
                } else if matches!(c, ',' | ':' | '{' | '}' | '[' | ']' | '"') {
                    self.finish();
                    return self.push(c);
                } else {
                    self.accept(c);
                }
            }
            ReaderState::Done => {
                if !c.is_whitespace() {
                    debug!("Unexpected '{}' after end of JSON value", c);
                    return self.fail();
                }
            }
            ReaderState::Failed => {}
        }
        self.state
    }

    /// Signal that no more input will arrive. A pending top-level scalar is
    /// completed; any other unfinished value fails.
    pub fn end_of_input(&mut self) -> ReaderState {
        match self.state {
            ReaderState::Scalar => self.finish(),
            ReaderState::Done | ReaderState::Failed => {}
            _ => {
                debug!("JSON input ended inside a value");
                self.fail();
            }
        }
        self.state
    }

    /// The parsed value, when the reader finished successfully
    pub fn take_value(&mut self) -> Option<Value> {
        match self.state {
            ReaderState::Done => self.value.take(),
            _ => None,
        }
    }

    fn accept(&mut self, c: char) {
        self.buffer.push(c);
        self.consumed += c.len_utf8();
    }

    fn finish(&mut self) {
        match serde_json::from_str::<Value>(&self.buffer) {
            Ok(value) => {
                self.value = Some(value);
                self.state = ReaderState::Done;
            }
            Err(e) => {
                debug!("Framed JSON value did not parse: {}", e);
                self.fail();
            }
        }
    }

    fn fail(&mut self) -> ReaderState {
        self.value = None;
        self.state = ReaderState::Failed;
        self.state
    }
}

fn starts_scalar(c: char) -> bool {
    c == '-' || c.is_ascii_digit() || matches!(c, 't' | 'f' | 'n')
}
