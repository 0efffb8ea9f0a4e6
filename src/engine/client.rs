//! Typed statement client for a running engine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::pool::PoolError;
use super::statement::{Reply, Statement};
use super::{EngineError, Pools};

/// Error returned to callers of [`EngineClient::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The statement would create something that already exists.
    DuplicateResource(String),
    /// The statement names a table that does not exist.
    NotFound(String),
    /// A writer, reader slot or worker queue is saturated; retrying may help.
    Busy(String),
    /// The engine is not running.
    Unavailable(String),
    /// The statement was accepted but did not complete.
    Rejected(String),
}

impl ClientError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ClientError::DuplicateResource(_))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::DuplicateResource(name) => write!(f, "already exists: {}", name),
            ClientError::NotFound(name) => write!(f, "not found: {}", name),
            ClientError::Busy(msg) => write!(f, "busy: {}", msg),
            ClientError::Unavailable(msg) => write!(f, "engine unavailable: {}", msg),
            ClientError::Rejected(msg) => write!(f, "statement failed: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<EngineError> for ClientError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::TableExists(name) => ClientError::DuplicateResource(name),
            EngineError::TableNotFound(name) => ClientError::NotFound(name),
            EngineError::WriterBusy(_) | EngineError::ReaderPoolFull(_) => {
                ClientError::Busy(e.to_string())
            }
            EngineError::Pool(e) => e.into(),
            EngineError::Startup { .. } | EngineError::Config(_) | EngineError::InvalidState { .. } => {
                ClientError::Unavailable(e.to_string())
            }
        }
    }
}

impl From<PoolError> for ClientError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::QueueFull { .. } => ClientError::Busy(e.to_string()),
            PoolError::Shutdown | PoolError::ChannelClosed => ClientError::Unavailable(e.to_string()),
            PoolError::Timeout(_) | PoolError::WorkerPanic(_) => ClientError::Rejected(e.to_string()),
        }
    }
}

/// Submits statements to an engine and awaits their replies.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Executes one statement.
    ///
    /// A `CreateTableAs` reply means the table is registered, not that its
    /// rows are visible. Wait for the table writer's `Release` event first.
    async fn execute(&self, statement: Statement) -> Result<Reply, ClientError>;

    /// Returns the name of this client for logging purposes.
    fn name(&self) -> &'static str;
}

/// Client that runs statements on the engine's own worker pools.
///
/// `Insert` goes to the ingest pool, everything else to the query pool.
#[derive(Clone)]
pub struct LocalClient {
    pools: Arc<Pools>,
    timeout: Option<Duration>,
}

impl LocalClient {
    pub(crate) fn new(pools: Arc<Pools>) -> Self {
        Self {
            pools,
            timeout: None,
        }
    }

    /// Fail statements that take longer than `timeout` to reply.
    ///
    /// The statement keeps running on its worker after the timeout fires.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for LocalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EngineClient for LocalClient {
    async fn execute(&self, statement: Statement) -> Result<Reply, ClientError> {
        let id = Uuid::new_v4();
        let pool = match statement {
            Statement::Insert { .. } => &self.pools.ingest,
            _ => &self.pools.query,
        };

        tracing::debug!(
            statement_id = %id,
            statement = statement.kind(),
            table = statement.table(),
            pool = pool.name(),
            "submitting statement"
        );

        let reply = match self.timeout {
            Some(timeout) => pool.execute_with_timeout(statement, timeout).await,
            None => pool.execute(statement).await,
        };

        match reply {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                tracing::debug!(statement_id = %id, error = %e, "statement rejected");
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(statement_id = %id, error = %e, "statement not executed");
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
