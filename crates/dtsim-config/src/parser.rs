//! Flat key=value text parsing.
//!
//! A small hand-rolled character state machine, the same shape as
//! `emu-spectrum::parse_args`'s arg loop but walking file bytes instead
//! of `argv`.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Begin,
    Comment,
    Name,
    Equals,
    Value,
}

/// Parse `text` into uppercased key -> trimmed value pairs. Duplicate keys
/// keep the last occurrence. `#` and `;` start a line comment; `=` on the
/// value line is optional (`KEY value` and `KEY = value` both parse).
#[must_use]
pub fn parse(text: &str) -> HashMap<String, String> {
    let mut data = HashMap::new();
    let mut state = State::Begin;
    let mut name = String::new();
    let mut value = String::new();

    for c in text.chars() {
        match state {
            State::Begin => {
                if c == '#' || c == ';' {
                    state = State::Comment;
                } else if c.is_alphabetic() {
                    state = State::Name;
                    name.clear();
                    name.push(c);
                }
            }
            State::Comment => {
                if c == '\n' {
                    state = State::Begin;
                }
            }
            State::Name => {
                if c.is_alphanumeric() || c == '_' {
                    name.push(c);
                } else {
                    name = name.to_uppercase();
                    state = State::Equals;
                }
            }
            State::Equals => {
                if c == '=' {
                    state = State::Value;
                } else if !c.is_whitespace() {
                    // `=` is optional: the first non-space character after
                    // the name starts the value directly.
                    state = State::Value;
                    value.push(c);
                }
            }
            State::Value => {
                if c.is_whitespace() && value.is_empty() {
                    // Skip leading whitespace before the value starts.
                } else if c == '\r' || c == '\n' || c == '#' {
                    if !value.is_empty() {
                        data.insert(name.clone(), value.trim_end().to_string());
                        value.clear();
                    }
                    state = if c == '#' { State::Comment } else { State::Begin };
                } else {
                    value.push(c);
                }
            }
        }
    }

    if !value.is_empty() {
        data.insert(name, value.trim_end().to_string());
    }
    data
}
