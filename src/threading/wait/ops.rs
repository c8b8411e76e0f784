use alloc::sync::Arc;

use crate::threading::thread::Thread;
use crate::threading::wait::path::Path;
use crate::threading::wait::queue::{Heads, QueueInner};

/// Discipline hooks of a thread queue. The queue's object class decides
/// which vector its callers pass in; behaviors are not shared across
/// disciplines.
pub trait Operations: Sync {
    /// Insert `thread` into the waiter list. Runs while the path locks are
    /// held and may record priority updates on the path.
    fn enqueue(&self, queue: &mut QueueInner, thread: &Arc<Thread>, path: &mut Path);

    /// Splice `thread` out of the waiter list.
    fn extract(&self, heads: &mut Heads, thread: &Arc<Thread>);

    /// Pick and remove the successor taking over ownership. Called only
    /// with a nonempty waiter list.
    fn surrender(&self, heads: &mut Heads, previous_owner: &Arc<Thread>) -> Arc<Thread>;

    /// The waiter a signal would wake next, still enqueued.
    fn first(&self, heads: &Heads) -> Option<Arc<Thread>>;
}

/// First come, first served.
pub struct FifoOps;

pub static OPS_FIFO: FifoOps = FifoOps;

impl Operations for FifoOps {
    fn enqueue(&self, queue: &mut QueueInner, thread: &Arc<Thread>, _path: &mut Path) {
        queue.heads_mut().push_back(thread.clone());
    }

    fn extract(&self, heads: &mut Heads, thread: &Arc<Thread>) {
        heads.remove(thread);
    }

    fn surrender(&self, heads: &mut Heads, _previous_owner: &Arc<Thread>) -> Arc<Thread> {
        heads.pop_front().expect("surrender needs a waiter")
    }

    fn first(&self, heads: &Heads) -> Option<Arc<Thread>> {
        heads.first()
    }
}

/// Most urgent waiter first, FIFO within one priority.
pub struct PriorityOps;

pub static OPS_PRIORITY: PriorityOps = PriorityOps;

impl Operations for PriorityOps {
    fn enqueue(&self, queue: &mut QueueInner, thread: &Arc<Thread>, _path: &mut Path) {
        queue.heads_mut().insert_by_priority(thread.clone());
    }

    fn extract(&self, heads: &mut Heads, thread: &Arc<Thread>) {
        heads.remove(thread);
    }

    fn surrender(&self, heads: &mut Heads, _previous_owner: &Arc<Thread>) -> Arc<Thread> {
        heads.pop_front().expect("surrender needs a waiter")
    }

    fn first(&self, heads: &Heads) -> Option<Arc<Thread>> {
        heads.first()
    }
}

/// Priority ordering plus priority inheritance: enqueueing boosts every
/// owner along the acquired ownership chain.
pub struct PriorityInheritOps;

pub static OPS_PRIORITY_INHERIT: PriorityInheritOps = PriorityInheritOps;

impl Operations for PriorityInheritOps {
    fn enqueue(&self, queue: &mut QueueInner, thread: &Arc<Thread>, path: &mut Path) {
        queue.heads_mut().insert_by_priority(thread.clone());
        path.boost_owners(thread.priority());
    }

    fn extract(&self, heads: &mut Heads, thread: &Arc<Thread>) {
        heads.remove(thread);
    }

    fn surrender(&self, heads: &mut Heads, _previous_owner: &Arc<Thread>) -> Arc<Thread> {
        heads.pop_front().expect("surrender needs a waiter")
    }

    fn first(&self, heads: &Heads) -> Option<Arc<Thread>> {
        heads.first()
    }
}
