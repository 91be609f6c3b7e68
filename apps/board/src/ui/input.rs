//! Turning terminal lines into gestures, and gestures into intents.

use shared::domain::char_len;
use thiserror::Error;

use crate::{
    controller::events::{Gesture, Severity, UserIntent, INPUT_CLEARED},
    ui::view::BoardView,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please type a message.")]
    Empty,
    #[error("Message is too long ({len} characters, at most {max}).")]
    TooLong { len: usize, max: usize },
}

pub fn parse_line(line: &str) -> Gesture {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.trim() {
        "/refresh" => Gesture::Refresh,
        "/clear" => Gesture::ClearInput,
        "/restart" => Gesture::Restart,
        "/quit" | "/exit" => Gesture::Quit,
        _ => Gesture::Submit(line.to_string()),
    }
}

/// Returns the trimmed text, or why it must not be sent.
pub fn validate_outgoing(text: &str, max_chars: usize) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = char_len(trimmed);
    if len > max_chars {
        return Err(ValidationError::TooLong {
            len,
            max: max_chars,
        });
    }
    Ok(trimmed.to_string())
}

/// Applies a gesture to the view and returns the intent it stands for, if
/// any. Rejected submissions raise an error toast here and go no further.
pub fn interpret<V: BoardView + ?Sized>(
    view: &mut V,
    gesture: Gesture,
    max_chars: usize,
) -> Option<UserIntent> {
    match gesture {
        Gesture::Submit(text) => {
            view.set_input(&text);
            match validate_outgoing(view.read_input(), max_chars) {
                Ok(text) => Some(UserIntent::Send(text)),
                Err(err) => {
                    view.show_toast(&err.to_string(), Severity::Error);
                    None
                }
            }
        }
        Gesture::Refresh => Some(UserIntent::Refresh),
        Gesture::ClearInput => {
            view.clear_input();
            view.show_toast(INPUT_CLEARED, Severity::Info);
            None
        }
        Gesture::Restart | Gesture::Quit => None,
    }
}

#[cfg(test)]
#[path = "tests/input_tests.rs"]
mod tests;
