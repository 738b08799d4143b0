//! Queue routing and dispatch for Conveyor.
//!
//! Owns the process-wide queue registry, the per-build routing decision,
//! the broker handoff, and the orchestration glue around build lifecycle
//! events.

pub mod dispatcher;
pub mod orchestrator;
pub mod registry;
pub mod router;

pub use dispatcher::{Broker, DispatchReceipt, Dispatcher, JobPayload};
pub use orchestrator::{BuildOrchestrator, StatusReport};
pub use registry::{DEFAULT_QUEUE, Queue, QueueEntry, QueueRegistry};
pub use router::worker_for;
