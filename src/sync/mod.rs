//! Synchronization primitives shared between engine workers and callers.

mod gate;

pub use gate::{CompletionGate, GateError};
