//! Wait for a specific lifecycle event triggered by a statement.
//!
//! ```text
//!  caller                         engine worker
//!  ──────                         ─────────────
//!  watch(condition)  ── gate(1) + listener installed
//!  client.execute ──────────────▶ ... writer release ──▶ listener
//!  await_completion  ◀────────────────────────────────── gate.count_down
//! ```
//!
//! If the statement fails because the table already exists, no event will
//! follow; the gate is counted down by the caller instead.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{ClientError, EngineClient, Reply, Statement};
use crate::events::{EventDispatcher, EventKind, LifecycleEvent, ListenerHandle, ResourceCategory};
use crate::sync::{CompletionGate, GateError};

/// Errors from the completion protocol.
#[derive(Debug)]
pub enum ProtocolError {
    Gate(GateError),
    /// The triggering statement failed for a reason other than a duplicate.
    Client(ClientError),
    /// The awaited event did not arrive in time.
    TimedOut {
        resource: String,
        kind: EventKind,
        after: Duration,
    },
    /// The blocking wait task was cancelled or panicked.
    Join(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Gate(e) => write!(f, "gate error: {}", e),
            ProtocolError::Client(e) => write!(f, "statement failed: {}", e),
            ProtocolError::TimedOut {
                resource,
                kind,
                after,
            } => write!(
                f,
                "no {} event for '{}' within {}ms",
                kind,
                resource,
                after.as_millis()
            ),
            ProtocolError::Join(msg) => write!(f, "wait task failed: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Gate(e) => Some(e),
            ProtocolError::Client(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GateError> for ProtocolError {
    fn from(e: GateError) -> Self {
        ProtocolError::Gate(e)
    }
}

impl From<ClientError> for ProtocolError {
    fn from(e: ClientError) -> Self {
        ProtocolError::Client(e)
    }
}

/// Event a caller is waiting for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub category: ResourceCategory,
    pub resource: Arc<str>,
    pub kind: EventKind,
}

impl Condition {
    pub fn new(category: ResourceCategory, resource: impl Into<Arc<str>>, kind: EventKind) -> Self {
        Self {
            category,
            resource: resource.into(),
            kind,
        }
    }

    /// The table writer was returned to its pool: committed rows are visible.
    pub fn writer_released(table: impl Into<Arc<str>>) -> Self {
        Self::new(ResourceCategory::Writer, table, EventKind::Release)
    }

    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        event.category() == self.category
            && event.kind() == self.kind
            && event.is_for(&self.resource)
    }
}

/// Result of a create statement, with duplicates recovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Nothing was submitted to the engine; no event will follow.
    AlreadyExists,
}

impl CreateOutcome {
    pub fn from_reply(reply: Result<Reply, ClientError>) -> Result<Self, ClientError> {
        match reply {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e) if e.is_duplicate() => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

/// A count-1 gate wired to a lifecycle listener.
///
/// The listener is revoked when the watch completes or is dropped, so a
/// later watch on the same dispatcher is never disturbed by this one.
#[derive(Debug)]
pub struct CompletionWatch {
    condition: Condition,
    gate: Arc<CompletionGate>,
    handle: Option<ListenerHandle>,
}

impl CompletionWatch {
    /// Install a listener on `dispatcher` that opens the gate on `condition`.
    ///
    /// Replaces any listener already installed. Call this before submitting
    /// the statement that triggers the event.
    pub fn watch(dispatcher: &EventDispatcher, condition: Condition) -> Result<Self, ProtocolError> {
        let gate = Arc::new(CompletionGate::new(1)?);

        let handle = {
            let gate = Arc::clone(&gate);
            let condition = condition.clone();
            dispatcher.set_listener(move |event| {
                if !event.is_for(&condition.resource) {
                    return;
                }
                tracing::info!(
                    target: "inproc_engine::events",
                    thread = event.thread_name().unwrap_or("unnamed"),
                    category = %event.category(),
                    kind = %event.kind(),
                    table = %condition.resource,
                    "lifecycle event"
                );
                if condition.matches(event) {
                    gate.count_down();
                }
            })
        };

        Ok(Self {
            condition,
            gate,
            handle: Some(handle),
        })
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn gate(&self) -> &Arc<CompletionGate> {
        &self.gate
    }

    /// True once the awaited event has been observed.
    pub fn satisfied(&self) -> bool {
        self.gate.is_released()
    }

    /// Block until the condition holds.
    ///
    /// `AlreadyExists` opens the gate immediately. `None` waits without a
    /// bound.
    pub fn await_completion(
        mut self,
        outcome: CreateOutcome,
        timeout: Option<Duration>,
    ) -> Result<(), ProtocolError> {
        if outcome == CreateOutcome::AlreadyExists {
            self.gate.count_down();
        }

        let result = match timeout {
            None => {
                self.gate.wait();
                Ok(())
            }
            Some(after) if self.gate.wait_timeout(after) => Ok(()),
            Some(after) => Err(ProtocolError::TimedOut {
                resource: self.condition.resource.to_string(),
                kind: self.condition.kind,
                after,
            }),
        };

        self.revoke();
        result
    }

    /// [`await_completion`](Self::await_completion) on the blocking pool.
    pub async fn await_completion_async(
        self,
        outcome: CreateOutcome,
        timeout: Option<Duration>,
    ) -> Result<(), ProtocolError> {
        tokio::task::spawn_blocking(move || self.await_completion(outcome, timeout))
            .await
            .map_err(|e| ProtocolError::Join(e.to_string()))?
    }

    fn revoke(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.revoke();
        }
    }
}

impl Drop for CompletionWatch {
    fn drop(&mut self) {
        self.revoke();
    }
}

/// Submit a create statement and return once its rows are visible.
///
/// Watches for the target table's writer `Release`. A duplicate table is
/// reported as [`CreateOutcome::AlreadyExists`] without waiting.
pub async fn create_and_wait<C>(
    client: &C,
    dispatcher: &EventDispatcher,
    statement: Statement,
    timeout: Option<Duration>,
) -> Result<CreateOutcome, ProtocolError>
where
    C: EngineClient + ?Sized,
{
    let table = statement.table().to_string();
    let watch = CompletionWatch::watch(dispatcher, Condition::writer_released(table.as_str()))?;

    let outcome = CreateOutcome::from_reply(client.execute(statement).await)?;
    match outcome {
        CreateOutcome::AlreadyExists => tracing::info!(table = %table, "Data already exists"),
        CreateOutcome::Created => tracing::debug!(table = %table, "waiting for rows to commit"),
    }

    watch.await_completion_async(outcome, timeout).await?;
    tracing::info!(table = %table, "Data ready");
    Ok(outcome)
}
