//! Application root: owns the coordinator and drives it from one loop.

use std::future::pending;

use client_core::MessageGateway;
use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tracing::info;

use crate::{
    controller::{
        events::{Gesture, PushEvent},
        Coordinator, StartupStep,
    },
    ui::TerminalView,
};

pub struct App<G, W: std::io::Write> {
    coordinator: Coordinator<G, TerminalView<W>>,
    gestures: mpsc::Receiver<Gesture>,
    pushes: mpsc::UnboundedReceiver<PushEvent>,
}

impl<G, W> App<G, W>
where
    G: MessageGateway,
    W: std::io::Write,
{
    pub fn new(
        coordinator: Coordinator<G, TerminalView<W>>,
        gestures: mpsc::Receiver<Gesture>,
        pushes: mpsc::UnboundedReceiver<PushEvent>,
    ) -> Self {
        Self {
            coordinator,
            gestures,
            pushes,
        }
    }

    /// Runs until a quit gesture or until input closes, then tears down.
    /// Returns the coordinator for inspection.
    pub async fn run(mut self) -> Coordinator<G, TerminalView<W>> {
        let mut retry_at = schedule(self.coordinator.start().await);

        loop {
            let toast_deadline = self.coordinator.view().toast_deadline();
            tokio::select! {
                gesture = self.gestures.recv() => match gesture {
                    None | Some(Gesture::Quit) => break,
                    Some(Gesture::Restart) => {
                        retry_at = schedule(self.coordinator.restart().await);
                    }
                    Some(gesture) => self.coordinator.handle_gesture(gesture).await,
                },
                Some(event) = self.pushes.recv() => self.coordinator.on_push(event).await,
                _ = wait_until(retry_at), if retry_at.is_some() => {
                    retry_at = schedule(self.coordinator.start().await);
                }
                _ = wait_until(toast_deadline), if toast_deadline.is_some() => {
                    self.coordinator.view_mut().expire_toast(Instant::now());
                }
            }
        }

        info!("board: leaving");
        self.coordinator.shutdown().await;
        self.coordinator
    }
}

fn schedule(step: StartupStep) -> Option<Instant> {
    match step {
        StartupStep::RetryIn(delay) => Some(Instant::now() + delay),
        StartupStep::Ready | StartupStep::Degraded => None,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
