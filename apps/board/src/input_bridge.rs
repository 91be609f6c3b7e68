//! Blocking terminal reader feeding the gesture queue.

use std::{
    io::BufRead,
    thread::{self, JoinHandle},
};

use tokio::sync::mpsc::Sender;

use crate::{
    controller::{events::Gesture, orchestration::dispatch_gesture},
    ui::input::parse_line,
};

/// Reads lines until end of input, then asks the loop to quit. A busy loop
/// holds the reader back instead of losing lines.
pub fn spawn_input_reader<R>(reader: R, gesture_tx: Sender<Gesture>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("board-input".into())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        tracing::warn!("input: read failed: {err}");
                        break;
                    }
                };
                let gesture = parse_line(&line);
                let quit = gesture == Gesture::Quit;
                if !dispatch_gesture(&gesture_tx, gesture) || quit {
                    return;
                }
            }
            if gesture_tx.blocking_send(Gesture::Quit).is_err() {
                tracing::debug!("input: loop already stopped at end of input");
            }
        })
}
