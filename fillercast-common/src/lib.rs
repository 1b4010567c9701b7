//! Pieces shared by the fillercast daemon and `fcctl`: configuration, the
//! work-queue mailbox and the published-record contract.

pub mod config;
pub mod queue;
pub mod status;

pub use config::{Config, ResolvedPaths};
pub use queue::{QueueEntry, QueueError, WorkQueueStore};
pub use status::PublishedStatus;
