use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::ops::{Deref, DerefMut};

use crate::sync::{ArcSpinGuard, SpinMutex};
use crate::threading::dispatch::Cpu;
use crate::threading::thread::{MpCallout, Thread};
use crate::threading::wait::enqueue::{DeadlockCallout, deadlock_fatal};

/// The waiter list of one queue. Its interpretation belongs to the
/// operations vector; this layer only moves it around.
#[derive(Default)]
pub struct Heads {
    waiters: VecDeque<Arc<Thread>>,
}

impl Heads {
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn push_back(&mut self, thread: Arc<Thread>) {
        self.waiters.push_back(thread);
    }

    /// Insert ordered by urgency, FIFO within one priority.
    pub fn insert_by_priority(&mut self, thread: Arc<Thread>) {
        let priority = thread.priority();
        let at = self
            .waiters
            .iter()
            .position(|t| t.priority() > priority)
            .unwrap_or(self.waiters.len());
        self.waiters.insert(at, thread);
    }

    pub fn remove(&mut self, thread: &Arc<Thread>) -> bool {
        let Some(at) = self.waiters.iter().position(|t| Arc::ptr_eq(t, thread)) else {
            return false;
        };
        self.waiters.remove(at);
        true
    }

    pub fn pop_front(&mut self) -> Option<Arc<Thread>> {
        self.waiters.pop_front()
    }

    pub fn first(&self) -> Option<Arc<Thread>> {
        self.waiters.front().cloned()
    }
}

/// The synchronization-object slot: optional owner plus the waiter list,
/// guarded by the queue's lock.
#[derive(Default)]
pub struct QueueInner {
    pub(crate) owner: Option<Arc<Thread>>,
    pub(crate) heads: Heads,
}

impl QueueInner {
    pub fn owner(&self) -> Option<&Arc<Thread>> {
        self.owner.as_ref()
    }

    pub fn set_owner(&mut self, owner: Option<Arc<Thread>>) {
        self.owner = owner;
    }

    pub fn heads(&self) -> &Heads {
        &self.heads
    }

    pub fn heads_mut(&mut self) -> &mut Heads {
        &mut self.heads
    }
}

/// Cloneable handle to one thread queue. Identity is the address of the
/// shared allocation.
#[derive(Clone, Default)]
pub struct ThreadQueue {
    inner: Arc<SpinMutex<QueueInner>>,
}

impl ThreadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> QueueGuard {
        QueueGuard {
            queue: self.clone(),
            inner: self.inner.lock_arc(),
        }
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl PartialEq for ThreadQueue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ThreadQueue {}

impl core::fmt::Debug for ThreadQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ThreadQueue({:#x})", self.address())
    }
}

/// Proof that the caller holds a queue's lock. Dropping it releases the
/// lock.
pub struct QueueGuard {
    queue: ThreadQueue,
    inner: ArcSpinGuard<QueueInner>,
}

impl QueueGuard {
    pub fn queue(&self) -> &ThreadQueue {
        &self.queue
    }
}

impl Deref for QueueGuard {
    type Target = QueueInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for QueueGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Invalidation slot shared between a path link and the chain owner it
/// walks through. An extractor restoring the owner's default wait state
/// takes the queue out, telling the path builder its link went stale.
pub(crate) struct Gate {
    queue: SpinMutex<Option<ThreadQueue>>,
}

impl Gate {
    pub(crate) fn new(target: ThreadQueue) -> Arc<Self> {
        Arc::new(Self {
            queue: SpinMutex::new(Some(target)),
        })
    }

    pub(crate) fn invalidate(&self) {
        self.queue.lock().take();
    }

    pub(crate) fn target(&self) -> Option<ThreadQueue> {
        self.queue.lock().clone()
    }
}

/// Wait timeout request carried by the queue context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    None,
    /// Ticks from now. Zero means no timeout, not an immediate one.
    Relative(u64),
    /// Absolute deadline on the watchdog clock.
    Absolute(u64),
}

/// Per-call state for the enqueue/extract drivers.
pub struct QueueContext {
    /// The caller's current processor.
    pub cpu: Arc<Cpu>,
    /// Dispatch-disable nesting the caller expects right after the enqueue
    /// driver disables dispatching. A mismatch proves a contract violation.
    pub expected_dispatch_disable_level: u32,
    pub deadlock_callout: DeadlockCallout,
    pub timeout: Timeout,
    pub mp_callout: Option<MpCallout>,
}

impl QueueContext {
    pub fn new(cpu: &Arc<Cpu>) -> Self {
        Self {
            cpu: cpu.clone(),
            expected_dispatch_disable_level: 1,
            deadlock_callout: deadlock_fatal,
            timeout: Timeout::None,
            mp_callout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_deadlock_callout(mut self, callout: DeadlockCallout) -> Self {
        self.deadlock_callout = callout;
        self
    }

    pub fn with_expected_dispatch_disable_level(mut self, level: u32) -> Self {
        self.expected_dispatch_disable_level = level;
        self
    }

    pub fn with_mp_callout(mut self, callout: MpCallout) -> Self {
        self.mp_callout = Some(callout);
        self
    }
}
