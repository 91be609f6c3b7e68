//! Scripted gateway and clock for controller tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use client_core::{ChannelStatus, GatewayError, InsertCallback, MessageGateway, StatusCallback};
use shared::domain::{Message, MessageId};
use tokio::{sync::mpsc, time::Instant};

use crate::{
    controller::{events::PushEvent, Clock, Coordinator},
    ui::TerminalView,
};

#[derive(Default)]
pub struct ScriptedGateway {
    connect_failures: Mutex<usize>,
    connect_calls: Mutex<Vec<Instant>>,
    messages: Mutex<Vec<Message>>,
    fetch_failure: Mutex<Option<String>>,
    fetch_calls: AtomicUsize,
    insert_failure: Mutex<Option<String>>,
    inserted: Mutex<Vec<String>>,
    subscribe_failure: Mutex<Option<String>>,
    callback: Mutex<Option<(InsertCallback, StatusCallback)>>,
    teardown_calls: AtomicUsize,
    next_id: Mutex<i64>,
    now: Mutex<Option<DateTime<Utc>>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: Mutex::new(100),
            ..Self::default()
        })
    }

    /// The next `count` connects fail; `usize::MAX` for always.
    pub fn fail_connects(&self, count: usize) {
        *self.connect_failures.lock().unwrap() = count;
    }

    pub fn fail_fetch(&self, message: Option<&str>) {
        *self.fetch_failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn fail_insert(&self, message: Option<&str>) {
        *self.insert_failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn fail_subscribe(&self, message: Option<&str>) {
        *self.subscribe_failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn set_messages(&self, messages: Vec<Message>) {
        *self.messages.lock().unwrap() = messages;
    }

    /// Timestamp given to inserted rows; wall clock when unset.
    pub fn set_insert_time(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = Some(now);
    }

    pub fn connect_calls(&self) -> Vec<Instant> {
        self.connect_calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn inserted(&self) -> Vec<String> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }

    pub fn has_subscriber(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    /// Plays the push channel: hands `message` to the registered callback.
    pub fn push(&self, message: Message) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some((on_insert, _)) = callback {
            (on_insert.as_ref())(message);
        }
    }

    /// Plays the push channel dropping or coming back.
    pub fn report_channel(&self, status: ChannelStatus) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some((_, on_status)) = callback {
            (on_status.as_ref())(status);
        }
    }
}

#[async_trait]
impl MessageGateway for ScriptedGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        self.connect_calls.lock().unwrap().push(Instant::now());
        let mut failures = self.connect_failures.lock().unwrap();
        if *failures > 0 {
            if *failures != usize::MAX {
                *failures -= 1;
            }
            return Err(GatewayError::Connectivity(
                "network request failed: connection refused".into(),
            ));
        }
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Message>, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fetch_failure.lock().unwrap().clone() {
            return Err(GatewayError::Query(message));
        }
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn insert(&self, text: &str) -> Result<Message, GatewayError> {
        if let Some(message) = self.insert_failure.lock().unwrap().clone() {
            return Err(GatewayError::insert(message));
        }
        self.inserted.lock().unwrap().push(text.to_string());
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            *next_id
        };
        let created_at = self.now.lock().unwrap().unwrap_or_else(Utc::now);
        let message = Message {
            id: MessageId(id),
            text: text.trim().to_string(),
            created_at,
        };
        self.messages.lock().unwrap().insert(0, message.clone());
        Ok(message)
    }

    async fn subscribe_to_inserts(
        &self,
        on_insert: InsertCallback,
        on_status: StatusCallback,
    ) -> Result<(), GatewayError> {
        if let Some(message) = self.subscribe_failure.lock().unwrap().clone() {
            return Err(GatewayError::Subscription(message));
        }
        *self.callback.lock().unwrap() = Some((on_insert, on_status));
        Ok(())
    }

    async fn teardown(&self) {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        self.callback.lock().unwrap().take();
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000, 0).unwrap()
}

pub fn message_at(id: i64, text: &str, created_at: DateTime<Utc>) -> Message {
    Message {
        id: MessageId(id),
        text: text.to_string(),
        created_at,
    }
}

pub type TestCoordinator = Coordinator<Arc<ScriptedGateway>, TerminalView<Vec<u8>>>;

pub fn test_coordinator(
    gateway: &Arc<ScriptedGateway>,
    clock: Arc<ManualClock>,
    max_message_length: usize,
) -> (TestCoordinator, mpsc::UnboundedReceiver<PushEvent>) {
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let view = TerminalView::new(Vec::new(), std::time::Duration::from_millis(3000));
    let coordinator = Coordinator::new(
        Arc::clone(gateway),
        view,
        clock,
        push_tx,
        max_message_length,
    );
    (coordinator, push_rx)
}
