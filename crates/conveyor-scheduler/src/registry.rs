//! Process-wide registry of named execution queues.
//!
//! Built once at startup from configuration and additive afterwards:
//! entries are never removed or overwritten. Writers serialize behind the
//! lock; readers take a consistent snapshot, and entries are immutable once
//! written.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::info;

use conveyor_config::QueueSpec;

/// Queue receiving builds no routing rule claims.
pub const DEFAULT_QUEUE: &str = "builds";

/// A named destination builds are dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    name: String,
}

impl Queue {
    /// Runtime queue name, already canonical.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            name: DEFAULT_QUEUE.to_string(),
        }
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One routing entry: a queue plus the predicate inputs that select it.
/// An entry with neither slug nor target never matches; that is tolerated,
/// not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub queue: Queue,
    pub slug: Option<String>,
    pub target: Option<String>,
}

#[derive(Default)]
struct Inner {
    /// Routing entries in declaration order; order is routing precedence.
    entries: Vec<QueueEntry>,
    /// Defined queues, unique by canonical name.
    queues: Vec<Queue>,
}

/// Registry of queues and routing entries, explicitly owned and passed by
/// reference to whatever needs routing decisions.
pub struct QueueRegistry {
    inner: RwLock<Inner>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Build a registry from the ordered queue configuration.
    pub fn from_config(specs: &[QueueSpec]) -> Self {
        let registry = Self::new();
        registry.setup_custom_queues(specs);
        registry
    }

    /// Register every configured queue. Safe to call repeatedly: queues are
    /// defined idempotently and identical entries are not appended twice.
    pub fn setup_custom_queues(&self, specs: &[QueueSpec]) {
        for spec in specs {
            self.register(spec);
        }
    }

    /// Append a routing entry and define its queue if missing.
    /// Re-registering an identical entry is a no-op.
    pub fn register(&self, spec: &QueueSpec) {
        let name = canonical_queue_name(&spec.queue);
        let mut inner = self.inner.write().expect("queue registry lock poisoned");

        let present = inner
            .entries
            .iter()
            .any(|e| e.queue.name == name && e.slug == spec.slug && e.target == spec.target);
        if !present {
            inner.entries.push(QueueEntry {
                queue: Queue { name: name.clone() },
                slug: spec.slug.clone(),
                target: spec.target.clone(),
            });
        }

        if !inner.queues.iter().any(|q| q.name == name) {
            info!(queue = %name, "defined queue");
            inner.queues.push(Queue { name });
        }
    }

    /// Define a named queue with no routing entry. Idempotent by canonical
    /// name.
    pub fn define_queue(&self, name: &str) -> Queue {
        let name = canonical_queue_name(name);
        let mut inner = self.inner.write().expect("queue registry lock poisoned");

        if let Some(queue) = inner.queues.iter().find(|q| q.name == name) {
            return queue.clone();
        }

        let queue = Queue { name: name.clone() };
        inner.queues.push(queue.clone());
        info!(queue = %name, "defined queue");
        queue
    }

    /// Existence check under the same canonicalization as `define_queue`.
    pub fn has_queue(&self, name: &str) -> bool {
        let name = canonical_queue_name(name);
        self.inner
            .read()
            .expect("queue registry lock poisoned")
            .queues
            .iter()
            .any(|q| q.name == name)
    }

    /// Snapshot of the routing entries in declaration order.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.inner
            .read()
            .expect("queue registry lock poisoned")
            .entries
            .clone()
    }

    /// Snapshot of the defined queues.
    pub fn queues(&self) -> Vec<Queue> {
        self.inner
            .read()
            .expect("queue registry lock poisoned")
            .queues
            .clone()
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical runtime queue name: the segment after any module path,
/// underscored and lowercased (`"Queues::MacOs"` becomes `"mac_os"`).
pub fn canonical_queue_name(name: &str) -> String {
    let demodulized = name.rsplit("::").next().unwrap_or(name);

    let mut out = String::with_capacity(demodulized.len());
    let mut prev_lower = false;
    for c in demodulized.trim().chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else if c == '-' || c.is_whitespace() {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
