//! UI layer for the terminal board: view model, rendering, and input parsing.

pub mod input;
pub mod view;

pub use view::{BoardView, TerminalView};
