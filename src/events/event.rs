//! Lifecycle event record.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Which pool a transition happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    /// Exclusive table writer.
    Writer,
    /// Shared table reader.
    Reader,
    /// Table metadata (DDL path).
    Metadata,
    /// Write-ahead log writer.
    WalWriter,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Writer => "writer",
            Self::Reader => "reader",
            Self::Metadata => "metadata",
            Self::WalWriter => "wal_writer",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Handed out to a caller.
    Acquire,
    /// Returned to the pool.
    Release,
    /// Exclusively locked (e.g. for DDL).
    Lock,
    /// Lock released.
    Unlock,
    /// Lock or acquire attempt found the resource in use.
    LockBusy,
    /// Resource created on first use.
    Create,
    /// Resource removed from the pool.
    Remove,
    /// Idle resource closed by the pool.
    Expire,
    /// Pool has no free slot.
    Full,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Release => "release",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::LockBusy => "lock_busy",
            Self::Create => "create",
            Self::Remove => "remove",
            Self::Expire => "expire",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pool transition, as observed by a listener.
///
/// Built once by the thread performing the transition and never mutated
/// afterwards. The producing thread is captured at construction.
#[derive(Clone, Debug)]
pub struct LifecycleEvent {
    category: ResourceCategory,
    thread: ThreadId,
    thread_name: Option<String>,
    resource: Option<Arc<str>>,
    kind: EventKind,
    segment: i32,
    position: i64,
}

impl LifecycleEvent {
    /// Creates an event attributed to the current thread.
    ///
    /// `resource` is `None` for global events not scoped to a table.
    pub fn new(category: ResourceCategory, kind: EventKind, resource: Option<Arc<str>>) -> Self {
        let current = thread::current();
        Self {
            category,
            thread: current.id(),
            thread_name: current.name().map(str::to_owned),
            resource,
            kind,
            segment: -1,
            position: -1,
        }
    }

    /// Attaches positional metadata (WAL segment and row position).
    pub fn with_position(mut self, segment: i32, position: i64) -> Self {
        self.segment = segment;
        self.position = position;
        self
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// WAL segment, `-1` when not applicable.
    pub fn segment(&self) -> i32 {
        self.segment
    }

    /// Row position within the segment, `-1` when not applicable.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// True if the event concerns the named resource.
    pub fn is_for(&self, resource: &str) -> bool {
        self.resource() == Some(resource)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.category,
            self.kind,
            self.resource().unwrap_or("<global>")
        )?;
        if self.segment >= 0 {
            write!(f, " [segment={}, position={}]", self.segment, self.position)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_producer_thread() {
        let event = std::thread::Builder::new()
            .name("shared-0".into())
            .spawn(|| {
                LifecycleEvent::new(
                    ResourceCategory::Writer,
                    EventKind::Release,
                    Some(Arc::from("trades")),
                )
            })
            .unwrap()
            .join()
            .unwrap();

        assert_ne!(event.thread(), std::thread::current().id());
        assert_eq!(event.thread_name(), Some("shared-0"));
        assert!(event.is_for("trades"));
        assert_eq!(event.segment(), -1);
    }

    #[test]
    fn test_global_event_display() {
        let event = LifecycleEvent::new(ResourceCategory::Reader, EventKind::Full, None);
        assert!(!event.is_for("trades"));
        assert_eq!(event.to_string(), "reader full <global>");
    }

    #[test]
    fn test_with_position() {
        let event = LifecycleEvent::new(
            ResourceCategory::WalWriter,
            EventKind::Acquire,
            Some(Arc::from("trades")),
        )
        .with_position(3, 1024);

        assert_eq!(event.segment(), 3);
        assert_eq!(event.position(), 1024);
        assert_eq!(
            event.to_string(),
            "wal_writer acquire trades [segment=3, position=1024]"
        );
    }
}
