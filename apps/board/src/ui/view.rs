//! View model for the board and its terminal rendering.

use std::{collections::HashSet, io::Write, time::Duration};

use chrono::Local;
use shared::domain::{Message, MessageId};
use tokio::time::Instant;
use tracing::warn;

use crate::controller::events::Severity;

const EMPTY_STATE: &str = "No messages yet. Be the first to post!";

/// Everything the coordinator may do to the screen.
pub trait BoardView {
    /// Replaces the list. An empty slice shows the empty state.
    fn render_all(&mut self, messages: &[Message]);
    /// Puts `message` on top unless a message with the same id is already
    /// shown. Returns whether it was added.
    fn prepend_one(&mut self, message: Message) -> bool;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn show_sending(&mut self);
    fn hide_sending(&mut self);
    fn show_toast(&mut self, text: &str, severity: Severity);
    fn read_input(&self) -> &str;
    fn set_input(&mut self, text: &str);
    fn clear_input(&mut self);
    fn set_connection_status(&mut self, connected: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub text: String,
    pub severity: Severity,
    pub expires_at: Instant,
}

pub struct TerminalView<W: Write> {
    out: W,
    clear_screen: bool,
    toast_duration: Duration,
    messages: Vec<Message>,
    shown_ids: HashSet<MessageId>,
    busy: bool,
    sending: bool,
    connected: bool,
    toast: Option<Toast>,
    input: String,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W, toast_duration: Duration) -> Self {
        Self {
            out,
            clear_screen: false,
            toast_duration,
            messages: Vec::new(),
            shown_ids: HashSet::new(),
            busy: false,
            sending: false,
            connected: false,
            toast: None,
            input: String::new(),
        }
    }

    /// Clear the terminal before each frame instead of appending frames.
    pub fn with_clear_screen(mut self, clear_screen: bool) -> Self {
        self.clear_screen = clear_screen;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty_state(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref()
    }

    pub fn toast_deadline(&self) -> Option<Instant> {
        self.toast.as_ref().map(|toast| toast.expires_at)
    }

    /// Drops the toast once its time is up. Returns whether one was dropped.
    pub fn expire_toast(&mut self, now: Instant) -> bool {
        match &self.toast {
            Some(toast) if toast.expires_at <= now => {
                self.toast = None;
                self.redraw();
                true
            }
            _ => false,
        }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    fn redraw(&mut self) {
        if let Err(err) = self.draw() {
            warn!("view: failed to draw board: {err}");
        }
    }

    fn draw(&mut self) -> std::io::Result<()> {
        let out = &mut self.out;
        if self.clear_screen {
            write!(out, "\x1b[2J\x1b[H")?;
        } else {
            writeln!(out)?;
        }

        let status = if self.connected { "online" } else { "offline" };
        let noun = if self.messages.len() == 1 { "message" } else { "messages" };
        writeln!(
            out,
            "== Message Board == [{status}] {} {noun}",
            self.messages.len()
        )?;
        if self.busy {
            writeln!(out, "Loading messages...")?;
        }
        if self.sending {
            writeln!(out, "Sending...")?;
        }
        if let Some(toast) = &self.toast {
            writeln!(out, "[{}] {}", toast.severity.label(), toast.text)?;
        }
        writeln!(out, "{}", "-".repeat(40))?;

        if self.messages.is_empty() && !self.busy {
            writeln!(out, "{EMPTY_STATE}")?;
        }
        for message in &self.messages {
            let at = message.created_at.with_timezone(&Local);
            writeln!(
                out,
                "#{:<6} {}  {}",
                message.id.0,
                at.format("%Y-%m-%d %H:%M:%S"),
                message.text
            )?;
        }

        writeln!(out, "{}", "-".repeat(40))?;
        write!(out, "> {}", self.input)?;
        out.flush()
    }
}

impl<W: Write> BoardView for TerminalView<W> {
    fn render_all(&mut self, messages: &[Message]) {
        self.messages = messages.to_vec();
        self.shown_ids = self.messages.iter().map(|m| m.id).collect();
        self.redraw();
    }

    fn prepend_one(&mut self, message: Message) -> bool {
        if !self.shown_ids.insert(message.id) {
            return false;
        }
        self.messages.insert(0, message);
        self.redraw();
        true
    }

    fn show_busy(&mut self) {
        self.busy = true;
        self.redraw();
    }

    fn hide_busy(&mut self) {
        self.busy = false;
        self.redraw();
    }

    fn show_sending(&mut self) {
        self.sending = true;
        self.redraw();
    }

    fn hide_sending(&mut self) {
        self.sending = false;
        self.redraw();
    }

    fn show_toast(&mut self, text: &str, severity: Severity) {
        self.toast = Some(Toast {
            text: text.to_string(),
            severity,
            expires_at: Instant::now() + self.toast_duration,
        });
        self.redraw();
    }

    fn read_input(&self) -> &str {
        &self.input
    }

    fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
    }

    fn clear_input(&mut self) {
        self.input.clear();
        self.redraw();
    }

    fn set_connection_status(&mut self, connected: bool) {
        self.connected = connected;
        self.redraw();
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
