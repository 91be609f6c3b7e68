//! Startup sequencing, intent handling, and push intake for the board.
//!
//! The coordinator never sleeps on its own: a failed startup attempt returns
//! the delay before the next one and the application loop schedules it, so
//! gestures are still answered while a retry is pending.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use client_core::{GatewayError, InsertCallback, InsertFailureKind, MessageGateway, StatusCallback};
use shared::domain::{char_len, Message};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    controller::{
        events::{self, Gesture, PushEvent, Severity, UserIntent},
        orchestration::forward_push,
    },
    ui::{input::interpret, BoardView},
};

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_STEP: Duration = Duration::from_secs(2);
/// Pushed messages younger than this are assumed to be our own echo.
pub const SELF_ECHO_WINDOW_MS: i64 = 5_000;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Ready,
    Degraded,
}

/// Outcome of one startup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStep {
    Ready,
    RetryIn(Duration),
    Degraded,
}

pub struct Coordinator<G, V> {
    gateway: G,
    view: V,
    clock: Arc<dyn Clock>,
    push_tx: mpsc::UnboundedSender<PushEvent>,
    max_message_length: usize,
    state: ConnectionState,
    retry_count: u32,
}

impl<G, V> Coordinator<G, V>
where
    G: MessageGateway,
    V: BoardView,
{
    pub fn new(
        gateway: G,
        view: V,
        clock: Arc<dyn Clock>,
        push_tx: mpsc::UnboundedSender<PushEvent>,
        max_message_length: usize,
    ) -> Self {
        Self {
            gateway,
            view,
            clock,
            push_tx,
            max_message_length,
            state: ConnectionState::Uninitialized,
            retry_count: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// One startup attempt: connect, load, subscribe.
    pub async fn start(&mut self) -> StartupStep {
        self.state = ConnectionState::Connecting;
        info!(attempt = self.retry_count + 1, "coordinator: starting");
        self.view.show_busy();
        self.view.set_connection_status(false);

        if let Err(err) = self.gateway.connect().await {
            return self.connect_failed(err);
        }
        self.view.set_connection_status(true);

        let loaded = self.load_messages().await;
        if !loaded {
            self.view.show_toast(events::LOAD_FAILED, Severity::Error);
        }
        let live = self.subscribe().await;

        self.state = ConnectionState::Ready;
        self.retry_count = 0;
        info!(loaded, live, "coordinator: ready");
        // a failure toast from above stays visible instead
        if loaded && live {
            self.view.show_toast(events::CONNECTED, Severity::Success);
        }
        StartupStep::Ready
    }

    /// Tears everything down and starts over with a fresh retry budget.
    pub async fn restart(&mut self) -> StartupStep {
        info!("coordinator: restarting");
        self.gateway.teardown().await;
        self.state = ConnectionState::Uninitialized;
        self.retry_count = 0;
        self.start().await
    }

    pub async fn shutdown(&mut self) {
        info!("coordinator: shutting down");
        self.gateway.teardown().await;
        self.state = ConnectionState::Uninitialized;
        self.view.set_connection_status(false);
    }

    pub async fn handle_gesture(&mut self, gesture: Gesture) {
        debug!(gesture = gesture.name(), "coordinator: gesture");
        if let Some(intent) = interpret(&mut self.view, gesture, self.max_message_length) {
            self.handle_intent(intent).await;
        }
    }

    pub async fn handle_intent(&mut self, intent: UserIntent) {
        let rejection = match self.state {
            ConnectionState::Ready => None,
            // no retry is coming; only a restart helps
            ConnectionState::Degraded => Some(events::NOT_CONNECTED),
            ConnectionState::Uninitialized | ConnectionState::Connecting => {
                Some(events::STILL_CONNECTING)
            }
        };
        if let Some(text) = rejection {
            warn!(state = ?self.state, "coordinator: intent rejected while not ready");
            self.view.show_toast(text, Severity::Error);
            return;
        }
        match intent {
            UserIntent::Send(text) => self.send(text).await,
            UserIntent::Refresh => self.refresh().await,
        }
    }

    pub async fn on_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Inserted(message) => self.on_pushed(message),
            PushEvent::ChannelLost(reason) => self.on_channel_lost(&reason),
            PushEvent::ChannelRestored => self.on_channel_restored().await,
        }
    }

    /// Shows a message delivered by the push channel.
    fn on_pushed(&mut self, message: Message) {
        let id = message.id.0;
        let mine = self.is_probably_mine(&message);
        let added = self.view.prepend_one(message);
        debug!(id, mine, added, "coordinator: pushed message");
        if !mine {
            self.view.show_toast(events::NEW_MESSAGE, Severity::Info);
        }
    }

    fn on_channel_lost(&mut self, reason: &str) {
        if self.state != ConnectionState::Ready {
            debug!(reason, "coordinator: stale channel loss ignored");
            return;
        }
        warn!(reason, "coordinator: live updates lost");
        self.view.set_connection_status(false);
        self.view
            .show_toast(events::LIVE_UPDATES_LOST, Severity::Warning);
    }

    /// Inserts made while the channel was down are not replayed, so the list
    /// is reloaded.
    async fn on_channel_restored(&mut self) {
        if self.state != ConnectionState::Ready {
            debug!("coordinator: stale channel recovery ignored");
            return;
        }
        info!("coordinator: live updates restored");
        self.view.set_connection_status(true);
        self.view.show_busy();
        if self.load_messages().await {
            self.view
                .show_toast(events::LIVE_UPDATES_RESTORED, Severity::Success);
        } else {
            self.view.show_toast(events::REFRESH_FAILED, Severity::Error);
        }
    }

    fn is_probably_mine(&self, message: &Message) -> bool {
        self.clock.now() - message.created_at
            < chrono::Duration::milliseconds(SELF_ECHO_WINDOW_MS)
    }

    fn connect_failed(&mut self, err: GatewayError) -> StartupStep {
        error!("coordinator: connect failed: {err}");
        self.view.hide_busy();
        self.view.set_connection_status(false);

        if self.retry_count < MAX_RETRIES {
            self.retry_count += 1;
            let delay = RETRY_STEP * self.retry_count;
            warn!(
                attempt = self.retry_count,
                max = MAX_RETRIES,
                delay_ms = delay.as_millis() as u64,
                "coordinator: retrying startup"
            );
            self.view.show_toast(
                &events::retrying(self.retry_count, MAX_RETRIES),
                Severity::Warning,
            );
            StartupStep::RetryIn(delay)
        } else {
            self.state = ConnectionState::Degraded;
            error!("coordinator: giving up after {MAX_RETRIES} retries");
            self.view.show_toast(events::CONNECTION_FAILED, Severity::Error);
            StartupStep::Degraded
        }
    }

    /// Loads the full list. A failure leaves the empty state on screen.
    async fn load_messages(&mut self) -> bool {
        match self.gateway.fetch_all().await {
            Ok(messages) => {
                info!(count = messages.len(), "coordinator: messages loaded");
                self.view.render_all(&messages);
                self.view.hide_busy();
                true
            }
            Err(err) => {
                error!("coordinator: {err}");
                self.view.render_all(&[]);
                self.view.hide_busy();
                false
            }
        }
    }

    async fn subscribe(&mut self) -> bool {
        let inserts = self.push_tx.clone();
        let on_insert: InsertCallback =
            Arc::new(move |message| forward_push(&inserts, PushEvent::Inserted(message)));
        let statuses = self.push_tx.clone();
        let on_status: StatusCallback =
            Arc::new(move |status| forward_push(&statuses, PushEvent::from(status)));
        match self.gateway.subscribe_to_inserts(on_insert, on_status).await {
            Ok(()) => true,
            Err(err) => {
                warn!("coordinator: continuing without live updates: {err}");
                self.view
                    .show_toast(events::LIVE_UPDATES_UNAVAILABLE, Severity::Warning);
                false
            }
        }
    }

    async fn send(&mut self, text: String) {
        info!(chars = char_len(&text), "coordinator: sending message");
        self.view.show_sending();
        match self.gateway.insert(&text).await {
            Ok(message) => {
                info!(id = message.id.0, "coordinator: message sent");
                self.view.clear_input();
                self.view.hide_sending();
                self.view.prepend_one(message);
                self.view.show_toast(events::SENT, Severity::Success);
            }
            Err(err) => {
                error!("coordinator: {err}");
                self.view.hide_sending();
                let kind = err.insert_kind().unwrap_or(InsertFailureKind::Generic);
                self.view
                    .show_toast(events::insert_failure_text(kind), Severity::Error);
            }
        }
    }

    async fn refresh(&mut self) {
        info!("coordinator: refreshing messages");
        self.view.show_busy();
        if self.load_messages().await {
            self.view.show_toast(events::REFRESHED, Severity::Success);
        } else {
            self.view.show_toast(events::REFRESH_FAILED, Severity::Error);
        }
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
