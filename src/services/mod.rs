//! Services module - persistence and background synchronization for D4MT.
//!
//! Everything here is framework-agnostic: no presentation code, only file access,
//! entity persistence and work scheduling.
//!
//! # Components
//!
//! - [`FileArbiter`]: opens files once no other process holds an incompatible lock,
//!   retrying under a [`RetryPolicy`] and honouring cancellation
//! - [`ProjectStore`]: creates, loads and saves `Project.json` documents
//! - [`ConfigurationStore`]: loads and saves `Configuration.json`
//! - [`ProjectRepository`]: discovers projects one level below a projects root
//! - [`SyncQueue`]: single-consumer FIFO of futures with drain-on-shutdown
//!
//! # Failure policy
//!
//! - validation problems come back as `None` / `false`
//! - lock contention is retried inside the arbiter and only surfaces as
//!   [`ArbiterError::TimedOut`]
//! - corrupt documents are errors ([`ProjectError::Corrupt`], [`ConfigurationError::Corrupt`])
//! - cancellation comes back as `None` / `false` / an empty sequence

pub mod arbiter;
pub mod configuration_store;
pub(crate) mod json_file;
pub mod project_store;
pub mod repository;
pub mod sync_queue;

pub use arbiter::{Access, ArbiterError, FileArbiter, OpenMode, RetryPolicy, is_contention};
pub use configuration_store::{ConfigurationError, ConfigurationStore};
pub use project_store::{ProjectError, ProjectStore};
pub use repository::{DeserializeAll, ProjectRepository};
pub use sync_queue::{QueueError, SyncQueue, WorkHandle};
