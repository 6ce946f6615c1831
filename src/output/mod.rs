//! Output module for reporting on crawl sessions
//!
//! This module handles:
//! - Loading per-session statistics from the coordination store
//! - Printing them in a human-readable layout

pub mod stats;

pub use stats::{load_statistics, print_statistics, write_statistics, SessionStatistics};
