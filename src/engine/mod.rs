//! Queue-draining engine: worker loop and pool coordinator.

pub mod pool;
pub mod worker;

pub use pool::{Pool, PoolConfig, RunReport, WorkerFailure, cancel_on};
pub use worker::{Worker, WorkerCounters, WorkerExit, WorkerReport, WorkerStats};
