//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `HostState`: per-host politeness clock, robots rules and failure streak
//! - `ItemState`: durable lifecycle of a frontier item
//! - `DropReason`: why an item left the frontier without completing
//! - `WorkerPhase`: the per-item state machine run by a crawl worker

mod host_state;
mod item_state;

// Re-export main types
pub use host_state::HostState;
pub use item_state::{DropReason, ItemState, WorkerPhase};
