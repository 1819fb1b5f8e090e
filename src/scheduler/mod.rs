//! # Poll Scheduler
//!
//! Repeating timers that each call one synchronous advance callback.
//! Timers are owned by a [`PollScheduler`] instance and identified by the
//! [`PollHandle`] returned from `start`; there is no process-wide timer state.

mod poll_scheduler;
mod poller;

pub use poll_scheduler::PollScheduler;
pub use poller::PollHandle;
