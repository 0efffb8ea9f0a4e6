//! Resource-pool lifecycle events.
//!
//! Engine pools describe every transition (a writer handed out, returned,
//! locked, ...) as a [`LifecycleEvent`] and pass it to an
//! [`EventDispatcher`]. The dispatcher forwards it, on the same thread, to
//! the single installed listener.
//!
//! ```text
//!  worker thread                      caller thread
//!  ─────────────                      ─────────────
//!  pool transition                    set_listener(f)
//!        │                                  │
//!        ▼                                  │
//!  dispatcher.dispatch(&event) ──▶ f(&event) │
//!                                    │      ▼
//!                                    └──▶ gate.count_down() ──▶ gate.wait() returns
//! ```

mod dispatcher;
mod event;

pub use dispatcher::{EventDispatcher, ListenerHandle};
pub use event::{EventKind, LifecycleEvent, ResourceCategory};
