use alloc::sync::Arc;
use alloc::vec::Vec;

use threadq_common::log;

use crate::threading::dispatch::Cpu;
use crate::threading::flags::{States, WaitFlags};
use crate::threading::thread::{MpCallout, Thread};
use crate::threading::wait::ops::Operations;
use crate::threading::wait::path::Path;
use crate::threading::wait::queue::{QueueContext, QueueGuard, ThreadQueue, Timeout};
use crate::{InternalError, Status, fatal};

pub type DeadlockCallout = fn(&Arc<Thread>);

/// Standard deadlock callout: report through the thread's return code.
pub fn deadlock_status(thread: &Arc<Thread>) {
    thread.set_return_code(Status::Deadlock);
}

/// Standard deadlock callout: a deadlock inside the kernel lock hierarchy
/// is unrecoverable.
pub fn deadlock_fatal(_thread: &Arc<Thread>) {
    fatal(InternalError::ThreadQueueDeadlock);
}

/// Block the executing `thread` on the queue whose lock the caller holds.
///
/// Returns only after the thread either truly blocked and was woken again,
/// or its wait was satisfied or aborted before the block took effect. The
/// queue lock is released in all cases. The outcome is the thread's return
/// code, never a conventional error.
pub fn enqueue_critical(
    mut guard: QueueGuard,
    operations: &'static dyn Operations,
    thread: &Arc<Thread>,
    state: States,
    ctx: &QueueContext,
) {
    thread.claim(guard.queue(), operations);

    let mut path = match Path::acquire(thread, &guard) {
        Ok(path) => path,
        Err(_) => {
            thread.restore_default();
            drop(guard);
            thread.tranquilize();
            log!("deadlock detected enqueueing thread {:?}", thread.id());
            (ctx.deadlock_callout)(thread);
            return;
        }
    };

    operations.enqueue(&mut guard, thread, &mut path);

    path.release();

    thread.set_return_code(Status::Successful);
    thread
        .wait_flags()
        .set(WaitFlags::OBJECT_INTEND_TO_BLOCK);

    let level = ctx.cpu.dispatch_disable();
    drop(guard);

    if level != ctx.expected_dispatch_disable_level {
        fatal(InternalError::EnqueueFromBadState);
    }

    match ctx.timeout {
        Timeout::Relative(ticks) if ticks != 0 => thread.arm_timer_relative(ticks),
        Timeout::Absolute(deadline) => thread.arm_timer_absolute(deadline),
        // a relative timeout of zero waits indefinitely
        Timeout::Relative(_) | Timeout::None => {}
    }

    thread.set_state(state);

    // The queue lock is gone, so interrupts or other processors may already
    // have satisfied or timed out this wait. Nobody touches our state while
    // the flags say intend-to-block, so on a lost race the cleanup is ours.
    let blocked = thread
        .wait_flags()
        .try_change_acquire(WaitFlags::OBJECT_INTEND_TO_BLOCK, WaitFlags::OBJECT_BLOCKED);
    if !blocked {
        remove_timer_and_unblock(thread);
    }

    path.apply_priority_updates();
    ctx.cpu.dispatch_enable();
}

/// Waker side of the three-state handshake. Returns whether the caller
/// still has to undo a completed scheduler block.
pub(crate) fn make_ready_again(thread: &Arc<Thread>) -> bool {
    let raced_the_blocker = thread
        .wait_flags()
        .try_change_release(WaitFlags::OBJECT_INTEND_TO_BLOCK, WaitFlags::OBJECT_READY_AGAIN);
    let unblock = if raced_the_blocker {
        false
    } else {
        debug_assert_eq!(thread.wait_flags().get(), WaitFlags::OBJECT_BLOCKED);
        thread.wait_flags().set(WaitFlags::OBJECT_READY_AGAIN);
        true
    };

    thread.restore_default();
    unblock
}

/// Splice `thread` out of the locked queue and run the ready-again
/// handshake. The returned flag feeds [`unblock_critical`].
pub fn extract_locked(
    guard: &mut QueueGuard,
    operations: &'static dyn Operations,
    thread: &Arc<Thread>,
    ctx: &QueueContext,
) -> bool {
    if thread.is_remote() {
        if let Some(callout) = ctx.mp_callout {
            thread.set_mp_callout(callout);
        }
    }
    operations.extract(guard.heads_mut(), thread);
    make_ready_again(thread)
}

/// Finish an extract: release the queue lock and, if the thread had truly
/// blocked, undo the block under disabled dispatch. When the racing enqueue
/// driver still owns the cleanup this only releases the lock.
pub fn unblock_critical(unblock: bool, guard: QueueGuard, thread: &Arc<Thread>, cpu: &Arc<Cpu>) {
    if unblock {
        cpu.dispatch_disable();
        drop(guard);
        remove_timer_and_unblock(thread);
        cpu.dispatch_enable();
    } else {
        drop(guard);
    }
}

/// Remove `thread` from the locked queue and unblock it as required.
pub fn extract_critical(
    mut guard: QueueGuard,
    operations: &'static dyn Operations,
    thread: &Arc<Thread>,
    ctx: &QueueContext,
) {
    let unblock = extract_locked(&mut guard, operations, thread, ctx);
    unblock_critical(unblock, guard, thread, &ctx.cpu);
}

fn abort_wait(thread: &Arc<Thread>, status: Option<Status>) {
    loop {
        let Some(queue) = thread.wait_queue() else {
            return;
        };
        let mut guard = queue.lock();

        // the wait may have moved on while we took the queue lock
        if thread.wait_queue().as_ref() != Some(guard.queue()) {
            drop(guard);
            continue;
        }
        let Some(operations) = thread.wait_operations() else {
            drop(guard);
            continue;
        };

        if let Some(status) = status {
            thread.set_return_code(status);
        }

        let ctx = QueueContext::new(thread.cpu());
        let unblock = extract_locked(&mut guard, operations, thread, &ctx);
        unblock_critical(unblock, guard, thread, thread.cpu());
        return;
    }
}

/// Abort whatever wait `thread` is currently in. A no-op when the thread is
/// not on a queue; safe against concurrent wakers at any time.
pub fn extract(thread: &Arc<Thread>) {
    abort_wait(thread, None);
}

/// Watchdog expiry entry: end the wait with a timeout status. Firing
/// consumes the timer; a wait already satisfied makes this a no-op.
pub fn timeout(thread: &Arc<Thread>) {
    thread.cancel_timer();
    log!("wait timer of thread {:?} fired", thread.id());
    abort_wait(thread, Some(Status::Timeout));
}

/// Release ownership of an owned-discipline queue, handing it to the
/// successor the discipline selects and waking that successor.
pub fn surrender(
    mut guard: QueueGuard,
    operations: &'static dyn Operations,
    previous_owner: &Arc<Thread>,
    keep_priority: bool,
    ctx: &QueueContext,
) {
    if !guard.heads().is_empty() {
        let new_owner = operations.surrender(guard.heads_mut(), previous_owner);
        guard.set_owner(Some(new_owner.clone()));

        if new_owner.is_remote() {
            if let Some(callout) = ctx.mp_callout {
                new_owner.set_mp_callout(callout);
            }
        } else {
            new_owner.increment_resource_count();
        }

        let unblock = make_ready_again(&new_owner);
        unblock_critical(unblock, guard, &new_owner, &ctx.cpu);
    } else {
        guard.set_owner(None);
        drop(guard);
    }

    if !keep_priority {
        ctx.cpu.dispatch_disable();
        previous_owner.restore_priority();
        ctx.cpu.dispatch_enable();
    }
}

/// Wake and return the first waiter, or `None` for an empty queue. Used by
/// the non-owning disciplines.
pub fn dequeue(
    queue: &ThreadQueue,
    operations: &'static dyn Operations,
    cpu: &Arc<Cpu>,
) -> Option<Arc<Thread>> {
    dequeue_impl(queue, operations, QueueContext::new(cpu))
}

/// [`dequeue`] with an MP callout for remote-proxy waiters.
pub fn dequeue_with_callout(
    queue: &ThreadQueue,
    operations: &'static dyn Operations,
    cpu: &Arc<Cpu>,
    mp_callout: MpCallout,
) -> Option<Arc<Thread>> {
    dequeue_impl(
        queue,
        operations,
        QueueContext::new(cpu).with_mp_callout(mp_callout),
    )
}

fn dequeue_impl(
    queue: &ThreadQueue,
    operations: &'static dyn Operations,
    ctx: QueueContext,
) -> Option<Arc<Thread>> {
    let guard = queue.lock();

    let Some(thread) = operations.first(guard.heads()) else {
        drop(guard);
        return None;
    };

    log!("waking blocked thread {:?}", thread.id());
    extract_critical(guard, operations, &thread, &ctx);
    Some(thread)
}

/// Empty the waiting set, ending every wait with `status`. Returns how many
/// threads were flushed.
pub fn flush_critical(
    mut guard: QueueGuard,
    operations: &'static dyn Operations,
    status: Status,
    ctx: &QueueContext,
) -> usize {
    let mut pending_unblock: Vec<Arc<Thread>> = Vec::new();
    let mut flushed = 0;

    while let Some(thread) = operations.first(guard.heads()) {
        thread.set_return_code(status);
        if extract_locked(&mut guard, operations, &thread, ctx) {
            pending_unblock.push(thread);
        }
        flushed += 1;
    }

    ctx.cpu.dispatch_disable();
    drop(guard);
    for thread in pending_unblock {
        remove_timer_and_unblock(&thread);
    }
    ctx.cpu.dispatch_enable();

    flushed
}

/// Idempotent wake-side cleanup: disarm the timer and undo the scheduler
/// block, or fire the MP callout for a remote proxy.
pub(crate) fn remove_timer_and_unblock(thread: &Arc<Thread>) {
    thread.cancel_timer();
    if thread.is_remote() {
        if let Some(callout) = thread.take_mp_callout() {
            callout(thread);
        }
    } else {
        thread.set_ready();
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::threading::wait::ops::{OPS_FIFO, OPS_PRIORITY_INHERIT};

    fn cpu() -> Arc<Cpu> {
        Arc::new(Cpu::new())
    }

    fn ctx(cpu: &Arc<Cpu>) -> QueueContext {
        QueueContext::new(cpu).with_deadlock_callout(deadlock_status)
    }

    #[cfg(feature = "smp")]
    fn assert_registry_empty() {
        assert_eq!(crate::threading::wait::path::registry().len(), 0);
    }

    #[cfg(not(feature = "smp"))]
    fn assert_registry_empty() {}

    // The link registry is process-wide, so tests asserting its contents
    // must not overlap with tests building multi-hop paths.
    static REGISTRY_SERIAL: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn serialize_registry() -> std::sync::MutexGuard<'static, ()> {
        REGISTRY_SERIAL.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn simple_block_and_signal() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);

        enqueue_critical(
            queue.lock(),
            &OPS_FIFO,
            &a,
            States::WAITING_FOR_SEMAPHORE,
            &ctx(&c),
        );
        assert_eq!(a.wait_flags().get(), WaitFlags::OBJECT_BLOCKED);
        assert_eq!(a.state(), States::WAITING_FOR_SEMAPHORE);
        assert_eq!(a.wait_queue(), Some(queue.clone()));

        let woken = dequeue(&queue, &OPS_FIFO, &c).unwrap();
        assert!(Arc::ptr_eq(&woken, &a));
        assert_eq!(a.return_code(), Status::Successful);
        assert_eq!(a.wait_flags().get(), WaitFlags::OBJECT_READY_AGAIN);
        assert!(a.is_ready());
        assert!(a.wait_queue().is_none());
        assert!(queue.lock().heads().is_empty());
    }

    #[test]
    fn dequeue_of_an_empty_queue_returns_none() {
        let c = cpu();
        let queue = ThreadQueue::new();
        assert!(dequeue(&queue, &OPS_FIFO, &c).is_none());
        // the lock is free again
        drop(queue.lock());
    }

    #[test]
    fn timeout_ends_the_wait() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);

        let ctx = ctx(&c).with_timeout(Timeout::Relative(10));
        enqueue_critical(queue.lock(), &OPS_FIFO, &a, States::WAITING_FOR_TIME, &ctx);
        assert!(a.timer_armed());

        timeout(&a);

        assert_eq!(a.return_code(), Status::Timeout);
        assert!(a.wait_queue().is_none());
        assert!(!a.timer_armed());
        assert!(a.is_ready());
        assert!(dequeue(&queue, &OPS_FIFO, &c).is_none());
    }

    #[test]
    fn relative_zero_timeout_waits_indefinitely() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);

        let ctx = ctx(&c).with_timeout(Timeout::Relative(0));
        enqueue_critical(queue.lock(), &OPS_FIFO, &a, States::WAITING_FOR_EVENT, &ctx);

        assert!(!a.timer_armed());
        assert_eq!(a.wait_flags().get(), WaitFlags::OBJECT_BLOCKED);

        extract(&a);
    }

    #[test]
    fn absolute_timeout_arms_the_timer() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);

        let ctx = ctx(&c).with_timeout(Timeout::Absolute(1234));
        enqueue_critical(queue.lock(), &OPS_FIFO, &a, States::WAITING_FOR_EVENT, &ctx);
        assert!(a.timer_armed());

        extract(&a);
        assert!(!a.timer_armed());
    }

    #[test]
    fn extract_is_a_noop_for_an_unqueued_thread() {
        let c = cpu();
        let a = Thread::named("a", 5, &c);
        extract(&a);
        assert!(a.is_ready());
        assert!(a.wait_queue().is_none());
    }

    #[test]
    fn enqueue_then_extract_leaves_the_thread_runnable() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);

        let ctx = ctx(&c).with_timeout(Timeout::Relative(50));
        enqueue_critical(queue.lock(), &OPS_FIFO, &a, States::WAITING_FOR_EVENT, &ctx);

        extract(&a);

        assert!(a.is_ready());
        assert!(a.wait_queue().is_none());
        assert!(!a.timer_armed());
        assert!(queue.lock().heads().is_empty());

        // extracting again stays a no-op
        extract(&a);
        assert!(a.is_ready());
    }

    #[test]
    fn direct_self_deadlock_is_reported() {
        let _serial = serialize_registry();
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);
        queue.lock().set_owner(Some(a.clone()));

        let ctx = ctx(&c).with_timeout(Timeout::Relative(10));
        enqueue_critical(
            queue.lock(),
            &OPS_PRIORITY_INHERIT,
            &a,
            States::WAITING_FOR_MUTEX,
            &ctx,
        );

        assert_eq!(a.return_code(), Status::Deadlock);
        assert!(Arc::ptr_eq(queue.lock().owner().unwrap(), &a));
        assert!(a.wait_queue().is_none());
        assert_eq!(a.wait_flags().get(), WaitFlags::empty());
        assert!(!a.timer_armed());
        assert!(a.is_ready());
        assert_registry_empty();
    }

    #[test]
    fn two_hop_ownership_cycle_is_deadlock() {
        let _serial = serialize_registry();
        let c = cpu();
        let q1 = ThreadQueue::new();
        let q2 = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);
        let b = Thread::named("b", 5, &c);

        q1.lock().set_owner(Some(b.clone()));
        q2.lock().set_owner(Some(a.clone()));

        // b blocks on q2, held by a
        enqueue_critical(
            q2.lock(),
            &OPS_PRIORITY_INHERIT,
            &b,
            States::WAITING_FOR_MUTEX,
            &ctx(&c),
        );
        assert_eq!(b.wait_flags().get(), WaitFlags::OBJECT_BLOCKED);

        // a asking for q1, held by b, would close the cycle
        enqueue_critical(
            q1.lock(),
            &OPS_PRIORITY_INHERIT,
            &a,
            States::WAITING_FOR_MUTEX,
            &ctx(&c),
        );

        assert_eq!(a.return_code(), Status::Deadlock);
        assert!(a.wait_queue().is_none());
        assert!(a.is_ready());

        // b's wait and both ownerships are untouched, no links leak
        assert_eq!(b.wait_queue(), Some(q2.clone()));
        assert_eq!(b.wait_flags().get(), WaitFlags::OBJECT_BLOCKED);
        assert!(Arc::ptr_eq(q1.lock().owner().unwrap(), &b));
        assert!(Arc::ptr_eq(q2.lock().owner().unwrap(), &a));
        assert_registry_empty();
    }

    #[test]
    #[should_panic(expected = "thread queue deadlock")]
    fn deadlock_is_fatal_without_a_status_callout() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);
        queue.lock().set_owner(Some(a.clone()));

        enqueue_critical(
            queue.lock(),
            &OPS_PRIORITY_INHERIT,
            &a,
            States::WAITING_FOR_MUTEX,
            &QueueContext::new(&c),
        );
    }

    #[test]
    #[should_panic(expected = "enqueue from bad state")]
    fn enqueue_from_bad_state_terminates() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);

        let ctx = ctx(&c).with_expected_dispatch_disable_level(3);
        enqueue_critical(queue.lock(), &OPS_FIFO, &a, States::WAITING_FOR_EVENT, &ctx);
    }

    #[test]
    fn extract_races_intend_to_block() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("a", 5, &c);

        // Stall the enqueue between publishing intend-to-block and the
        // blocked transition by holding the timer lock it arms next.
        let timer_guard = a.timer().lock();

        let worker = {
            let queue = queue.clone();
            let a = a.clone();
            let c = c.clone();
            std::thread::spawn(move || {
                let ctx = QueueContext::new(&c).with_timeout(Timeout::Relative(10));
                enqueue_critical(queue.lock(), &OPS_FIFO, &a, States::WAITING_FOR_EVENT, &ctx);
            })
        };

        while a.wait_flags().get() != WaitFlags::OBJECT_INTEND_TO_BLOCK {
            std::thread::yield_now();
        }

        let extract_cpu = cpu();
        let ctx2 = QueueContext::new(&extract_cpu);
        let mut guard = queue.lock();
        let unblock = extract_locked(&mut guard, &OPS_FIFO, &a, &ctx2);
        // the enqueue driver has not blocked yet, so the cleanup is its job
        assert!(!unblock);
        unblock_critical(unblock, guard, &a, &extract_cpu);

        drop(timer_guard);
        worker.join().unwrap();

        assert_eq!(a.wait_flags().get(), WaitFlags::OBJECT_READY_AGAIN);
        assert_eq!(a.return_code(), Status::Successful);
        assert!(a.wait_queue().is_none());
        assert!(!a.timer_armed());
        assert!(a.is_ready());
    }

    #[cfg(feature = "smp")]
    #[test]
    fn extract_invalidates_an_in_flight_path_link() {
        let _serial = serialize_registry();
        let c_main = cpu();
        let c_worker = cpu();
        let q1 = ThreadQueue::new();
        let q2 = ThreadQueue::new();
        let a = Thread::named("a", 5, &c_worker);
        let b = Thread::named("b", 5, &c_main);

        q1.lock().set_owner(Some(b.clone()));
        q2.lock().set_owner(Some(a.clone()));
        // b waits on q2; a's later path walk q1 -> b -> q2 has one hop
        enqueue_critical(
            q2.lock(),
            &OPS_FIFO,
            &b,
            States::WAITING_FOR_MUTEX,
            &ctx(&c_main),
        );

        // Hold q2 so the walker stalls in the hand-off between b's default
        // lock and the target queue lock.
        let mut q2_guard = q2.lock();

        let worker = {
            let q1 = q1.clone();
            let a = a.clone();
            let c = c_worker.clone();
            std::thread::spawn(move || {
                enqueue_critical(
                    q1.lock(),
                    &OPS_FIFO,
                    &a,
                    States::WAITING_FOR_MUTEX,
                    &ctx(&c),
                );
            })
        };

        // the published gate marks the walker's stall point
        while b.wait_lock().pending_requests.is_empty() {
            std::thread::yield_now();
        }

        // extracting b invalidates the in-flight link before the walker can
        // take the q2 lock
        let extract_ctx = ctx(&c_main);
        let unblock = extract_locked(&mut q2_guard, &OPS_FIFO, &b, &extract_ctx);
        assert!(unblock);
        unblock_critical(unblock, q2_guard, &b, &c_main);

        worker.join().unwrap();

        // the walker backed out and treated the chain as terminated
        assert_eq!(a.wait_flags().get(), WaitFlags::OBJECT_BLOCKED);
        assert_eq!(a.wait_queue(), Some(q1.clone()));
        assert_eq!(q1.lock().heads().len(), 1);
        assert!(b.is_ready());
        assert!(b.wait_lock().pending_requests.is_empty());
        assert_registry_empty();

        extract(&a);
    }

    #[test]
    fn surrender_hands_off_and_restores_priority() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("owner", 5, &c);
        let b = Thread::named("waiter", 2, &c);
        queue.lock().set_owner(Some(a.clone()));

        enqueue_critical(
            queue.lock(),
            &OPS_PRIORITY_INHERIT,
            &b,
            States::WAITING_FOR_MUTEX,
            &ctx(&c),
        );
        // the more urgent waiter boosted the owner
        assert_eq!(a.priority(), 2);
        assert_eq!(a.real_priority(), 5);

        surrender(queue.lock(), &OPS_PRIORITY_INHERIT, &a, false, &ctx(&c));

        assert!(Arc::ptr_eq(queue.lock().owner().unwrap(), &b));
        assert_eq!(b.resource_count(), 1);
        assert!(b.is_ready());
        assert_eq!(b.return_code(), Status::Successful);
        assert_eq!(a.priority(), 5);
    }

    #[test]
    fn surrender_with_no_waiters_just_clears_ownership() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let a = Thread::named("owner", 5, &c);
        queue.lock().set_owner(Some(a.clone()));

        surrender(queue.lock(), &OPS_PRIORITY_INHERIT, &a, false, &ctx(&c));

        assert!(queue.lock().owner().is_none());
        assert_eq!(a.priority(), 5);
        assert!(a.is_ready());
    }

    #[test]
    fn inheritance_propagates_along_the_chain() {
        let _serial = serialize_registry();
        let c = cpu();
        let q1 = ThreadQueue::new();
        let q2 = ThreadQueue::new();
        let mid = Thread::named("mid", 5, &c);
        let tail = Thread::named("tail", 7, &c);
        let urgent = Thread::named("urgent", 1, &c);

        q1.lock().set_owner(Some(mid.clone()));
        q2.lock().set_owner(Some(tail.clone()));

        enqueue_critical(
            q2.lock(),
            &OPS_PRIORITY_INHERIT,
            &mid,
            States::WAITING_FOR_MUTEX,
            &ctx(&c),
        );
        assert_eq!(tail.priority(), 5);

        enqueue_critical(
            q1.lock(),
            &OPS_PRIORITY_INHERIT,
            &urgent,
            States::WAITING_FOR_MUTEX,
            &ctx(&c),
        );

        // both chain owners inherited the urgency
        assert_eq!(mid.priority(), 1);
        assert_eq!(tail.priority(), 1);
        assert_registry_empty();

        extract(&urgent);
        extract(&mid);
    }

    #[test]
    fn flush_wakes_every_waiter() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let waiters: Vec<_> = (0u32..3)
            .map(|i| {
                let t = Thread::new(5 + i, &c);
                enqueue_critical(
                    queue.lock(),
                    &OPS_FIFO,
                    &t,
                    States::WAITING_FOR_CONDITION,
                    &ctx(&c),
                );
                t
            })
            .collect();

        let flushed = flush_critical(queue.lock(), &OPS_FIFO, Status::Unavailable, &ctx(&c));
        assert_eq!(flushed, 3);

        for t in &waiters {
            assert!(t.is_ready());
            assert_eq!(t.return_code(), Status::Unavailable);
            assert!(t.wait_queue().is_none());
        }
        assert!(queue.lock().heads().is_empty());

        // nothing left to flush
        assert_eq!(
            flush_critical(queue.lock(), &OPS_FIFO, Status::Unavailable, &ctx(&c)),
            0
        );
    }

    static PROXY_DEQUEUE_WAKES: AtomicUsize = AtomicUsize::new(0);

    fn proxy_dequeue_callout(_thread: &Arc<Thread>) {
        PROXY_DEQUEUE_WAKES.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn dequeue_fires_the_mp_callout_for_a_proxy() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let proxy = Thread::new_proxy("remote", 5, &c);

        enqueue_critical(
            queue.lock(),
            &OPS_FIFO,
            &proxy,
            States::WAITING_FOR_MESSAGE,
            &ctx(&c),
        );

        let woken = dequeue_with_callout(&queue, &OPS_FIFO, &c, proxy_dequeue_callout).unwrap();
        assert!(Arc::ptr_eq(&woken, &proxy));
        assert_eq!(PROXY_DEQUEUE_WAKES.load(Ordering::Relaxed), 1);
        assert!(proxy.wait_queue().is_none());
    }

    static PROXY_SURRENDER_WAKES: AtomicUsize = AtomicUsize::new(0);

    fn proxy_surrender_callout(_thread: &Arc<Thread>) {
        PROXY_SURRENDER_WAKES.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn surrender_to_a_proxy_skips_the_resource_count() {
        let c = cpu();
        let queue = ThreadQueue::new();
        let owner = Thread::named("owner", 5, &c);
        let proxy = Thread::new_proxy("remote", 4, &c);
        queue.lock().set_owner(Some(owner.clone()));

        enqueue_critical(
            queue.lock(),
            &OPS_PRIORITY_INHERIT,
            &proxy,
            States::WAITING_FOR_MUTEX,
            &ctx(&c),
        );

        let ctx = ctx(&c).with_mp_callout(proxy_surrender_callout);
        surrender(queue.lock(), &OPS_PRIORITY_INHERIT, &owner, true, &ctx);

        assert!(Arc::ptr_eq(queue.lock().owner().unwrap(), &proxy));
        assert_eq!(proxy.resource_count(), 0);
        assert_eq!(PROXY_SURRENDER_WAKES.load(Ordering::Relaxed), 1);
    }
}
