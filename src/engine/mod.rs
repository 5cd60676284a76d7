//! Concurrent acquisition engine.
//!
//! The pieces that make bulk, resumable, partially failing downloads correct:
//!
//! - [`retry`] - bounded, cancellable retries with linear backoff
//! - [`pool`] - fixed-size worker pool that aggregates job failures
//! - [`transfer`] - streaming download to disk with throttled progress
//!
//! Persistence (catalog cache and completion state) lives in
//! [`crate::management`].

pub mod pool;
pub mod retry;
pub mod transfer;

pub use pool::{Job, PoolError, WorkerPool, job};
pub use retry::{RETRY_STEP, RetryError, RetryPolicy};
pub use transfer::{
    ByteSource, HttpProvider, ProgressFn, ProgressSample, SourceProvider, SourceReader, Transfer,
    TransferError, TransferOutcome,
};
