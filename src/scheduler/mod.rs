//! Per-key FIFO mutual exclusion.
//!
//! Callers that must not race on the same cache key bracket their critical
//! section with [`KeyScheduler::wait`] and [`KeyScheduler::done`]. A key's
//! queue exists only while someone holds or waits for it.

mod key_scheduler;


pub use key_scheduler::*;
