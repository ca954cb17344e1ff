//! # kyc-review: Manual Review Queue
//!
//! - **Task** (`task.rs`): the review task state machine
//!   (pending → in_review → completed), priorities and reviewer decisions.
//! - **Store** (`store.rs`): persistence port and an in-memory queue ordered
//!   by priority, then enqueue time, then insertion sequence.
//! - **Gate** (`gate.rs`): enqueue, assign, escalate, resolve, pending list
//!   and statistics.
//!
//! ## Crate Policy
//!
//! - Depends on `kyc-core` and `kyc-state` internally.
//! - Never mutates a session. The orchestrator applies review outcomes.

pub mod gate;
pub mod store;
pub mod task;

pub use gate::{
    priority_for, ManualReviewGate, QueueAlert, QueueEntry, ReviewStatistics,
    BACKLOG_ALERT_THRESHOLD, REVIEW_ANOMALY_THRESHOLD, SLOW_REVIEW_ALERT_MINUTES,
};
pub use store::{InMemoryReviewQueue, ReviewQueueStore, TaskUpdate};
pub use task::{
    Escalation, ReviewDecision, ReviewError, ReviewPriority, ReviewResolution, ReviewStatus,
    ReviewTask, ReviewTransitionRecord,
};
