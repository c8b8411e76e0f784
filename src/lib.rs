#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

use thiserror::Error;

pub mod sync;
pub mod threading;

pub use threading::dispatch::Cpu;
pub use threading::flags::{States, WaitFlags};
pub use threading::thread::{MpCallout, Priority, Thread, ThreadId};
pub use threading::wait::enqueue::{
    DeadlockCallout, deadlock_fatal, deadlock_status, dequeue, dequeue_with_callout,
    enqueue_critical, extract, extract_critical, extract_locked, flush_critical, surrender,
    timeout, unblock_critical,
};
pub use threading::wait::ops::{OPS_FIFO, OPS_PRIORITY, OPS_PRIORITY_INHERIT, Operations};
pub use threading::wait::path::Path;
pub use threading::wait::queue::{
    Heads, QueueContext, QueueGuard, QueueInner, ThreadQueue, Timeout,
};

/// Wait outcome delivered through a thread's return code.
///
/// The blocking entry points never return an error themselves. A caller
/// learns how its wait ended by reading this code after it resumes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    #[default]
    Successful = 0,
    Timeout = 1,
    Deadlock = 2,
    Unavailable = 3,
}

impl Status {
    pub(crate) const fn from_u32(raw: u32) -> Self {
        match raw {
            1 => Self::Timeout,
            2 => Self::Deadlock,
            3 => Self::Unavailable,
            _ => Self::Successful,
        }
    }
}

/// Unrecoverable caller contract violations. These terminate the system.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InternalError {
    #[error("thread queue deadlock")]
    ThreadQueueDeadlock,
    #[error("thread queue enqueue from bad state")]
    EnqueueFromBadState,
}

pub(crate) fn fatal(err: InternalError) -> ! {
    panic!("fatal internal error: {err}");
}

/// One-time boot initialization of the process-wide state (the link
/// registry). Safe to call more than once.
pub fn init() {
    threading::wait::init();
}
