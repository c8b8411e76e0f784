use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::Status;
use crate::sync::{ArcSpinGuard, SpinGuard, SpinMutex};
use crate::threading::dispatch::Cpu;
use crate::threading::flags::{AtomicWaitFlags, States, WaitFlags};
use crate::threading::wait::ops::Operations;
use crate::threading::wait::queue::{Gate, ThreadQueue};

/// Thread priority. Lower values are more urgent.
pub type Priority = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    pub fn get_inner(&self) -> u64 {
        self.0
    }
}

fn next_id() -> ThreadId {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    ThreadId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Callout fired instead of a scheduler unblock when the woken thread is a
/// remote proxy.
pub type MpCallout = fn(&Arc<Thread>);

/// The wait block: everything describing the thread's relation to the queue
/// it is (or is about to be) parked on. Guarded by the thread's default wait
/// lock.
pub(crate) struct Wait {
    pub(crate) queue: Option<ThreadQueue>,
    pub(crate) operations: Option<&'static dyn Operations>,
    /// Gates published by path builders currently walking through this
    /// thread as a chain owner. Invalidated when the wait state is restored
    /// to its defaults.
    pub(crate) pending_requests: Vec<Arc<Gate>>,
}

impl Wait {
    fn new() -> Self {
        Self {
            queue: None,
            operations: None,
            pending_requests: Vec::new(),
        }
    }

    pub(crate) fn remove_request(&mut self, gate: &Arc<Gate>) {
        self.pending_requests.retain(|g| !Arc::ptr_eq(g, gate));
    }
}

/// One-shot wait timer record. Expiry delivery is the timer wheel's job;
/// this subsystem only arms, cancels, and consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timer {
    Inactive,
    Relative(u64),
    Absolute(u64),
}

impl Timer {
    pub(crate) fn is_armed(&self) -> bool {
        !matches!(self, Timer::Inactive)
    }
}

pub struct Thread {
    id: ThreadId,
    name: Option<String>,
    cpu: Arc<Cpu>,
    remote: bool,
    flags: AtomicWaitFlags,
    wait: Arc<SpinMutex<Wait>>,
    timer: SpinMutex<Timer>,
    state: AtomicU32,
    return_code: AtomicU32,
    resource_count: AtomicU32,
    real_priority: AtomicU32,
    current_priority: AtomicU32,
    mp_callout: SpinMutex<Option<MpCallout>>,
}

impl Thread {
    pub fn new(priority: Priority, cpu: &Arc<Cpu>) -> Arc<Self> {
        Self::build(None, priority, cpu, false)
    }

    pub fn named(name: &str, priority: Priority, cpu: &Arc<Cpu>) -> Arc<Self> {
        Self::build(Some(String::from(name)), priority, cpu, false)
    }

    /// A stand-in for a thread living on another node. Unblocking it fires
    /// the MP callout instead of touching scheduler state.
    pub fn new_proxy(name: &str, priority: Priority, cpu: &Arc<Cpu>) -> Arc<Self> {
        Self::build(Some(String::from(name)), priority, cpu, true)
    }

    fn build(name: Option<String>, priority: Priority, cpu: &Arc<Cpu>, remote: bool) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name,
            cpu: cpu.clone(),
            remote,
            flags: AtomicWaitFlags::new(),
            wait: Arc::new(SpinMutex::new(Wait::new())),
            timer: SpinMutex::new(Timer::Inactive),
            state: AtomicU32::new(States::READY.bits()),
            return_code: AtomicU32::new(Status::Successful as u32),
            resource_count: AtomicU32::new(0),
            real_priority: AtomicU32::new(priority),
            current_priority: AtomicU32::new(priority),
            mp_callout: SpinMutex::new(None),
        })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn cpu(&self) -> &Arc<Cpu> {
        &self.cpu
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn state(&self) -> States {
        States::from_bits_retain(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == States::READY
    }

    pub(crate) fn set_state(&self, state: States) {
        self.state.store(state.bits(), Ordering::Release);
    }

    pub(crate) fn set_ready(&self) {
        self.set_state(States::READY);
    }

    pub fn return_code(&self) -> Status {
        Status::from_u32(self.return_code.load(Ordering::Acquire))
    }

    pub fn set_return_code(&self, status: Status) {
        self.return_code.store(status as u32, Ordering::Release);
    }

    pub fn resource_count(&self) -> u32 {
        self.resource_count.load(Ordering::Relaxed)
    }

    pub(crate) fn increment_resource_count(&self) {
        self.resource_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn priority(&self) -> Priority {
        self.current_priority.load(Ordering::Acquire)
    }

    pub fn real_priority(&self) -> Priority {
        self.real_priority.load(Ordering::Acquire)
    }

    /// Inheritance hook: raise urgency to `priority` if it is more urgent
    /// than the current value.
    pub(crate) fn boost_priority(&self, priority: Priority) {
        self.current_priority.fetch_min(priority, Ordering::AcqRel);
    }

    pub(crate) fn restore_priority(&self) {
        self.current_priority
            .store(self.real_priority.load(Ordering::Acquire), Ordering::Release);
    }

    pub(crate) fn wait_flags(&self) -> &AtomicWaitFlags {
        &self.flags
    }

    pub(crate) fn wait_lock(&self) -> SpinGuard<'_, Wait> {
        self.wait.lock()
    }

    pub(crate) fn wait_lock_arc(&self) -> ArcSpinGuard<Wait> {
        self.wait.lock_arc()
    }

    /// The queue this thread is currently claimed on, if any.
    pub fn wait_queue(&self) -> Option<ThreadQueue> {
        self.wait.lock().queue.clone()
    }

    pub(crate) fn wait_operations(&self) -> Option<&'static dyn Operations> {
        self.wait.lock().operations
    }

    /// Publish the queue and operations this thread is about to block on.
    pub(crate) fn claim(&self, queue: &ThreadQueue, operations: &'static dyn Operations) {
        let mut wait = self.wait.lock();
        debug_assert!(wait.queue.is_none());
        wait.queue = Some(queue.clone());
        wait.operations = Some(operations);
        self.flags.set(WaitFlags::CLASS_OBJECT);
    }

    /// Reset the wait block to its defaults and invalidate every path link
    /// currently walking through this thread.
    pub(crate) fn restore_default(&self) {
        let mut wait = self.wait.lock();
        wait.queue = None;
        wait.operations = None;
        for gate in wait.pending_requests.drain(..) {
            gate.invalidate();
        }
    }

    /// Reset the wait-flag word to its idle default without unblocking.
    pub(crate) fn tranquilize(&self) {
        self.flags.set(WaitFlags::empty());
    }

    pub(crate) fn timer(&self) -> &SpinMutex<Timer> {
        &self.timer
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.lock().is_armed()
    }

    pub(crate) fn arm_timer_relative(&self, ticks: u64) {
        *self.timer.lock() = Timer::Relative(ticks);
    }

    pub(crate) fn arm_timer_absolute(&self, deadline: u64) {
        *self.timer.lock() = Timer::Absolute(deadline);
    }

    pub(crate) fn cancel_timer(&self) {
        *self.timer.lock() = Timer::Inactive;
    }

    pub(crate) fn set_mp_callout(&self, callout: MpCallout) {
        *self.mp_callout.lock() = Some(callout);
    }

    pub(crate) fn take_mp_callout(&self) -> Option<MpCallout> {
        self.mp_callout.lock().take()
    }
}

impl Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("flags", &self.flags.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu() -> Arc<Cpu> {
        Arc::new(Cpu::new())
    }

    #[test]
    fn fresh_thread_is_ready_and_successful() {
        let t = Thread::named("idle", 10, &cpu());
        assert!(t.is_ready());
        assert_eq!(t.return_code(), Status::Successful);
        assert!(t.wait_queue().is_none());
        assert!(!t.timer_armed());
    }

    #[test]
    fn boost_only_raises_urgency() {
        let t = Thread::new(5, &cpu());
        t.boost_priority(8);
        assert_eq!(t.priority(), 5);
        t.boost_priority(2);
        assert_eq!(t.priority(), 2);
        t.restore_priority();
        assert_eq!(t.priority(), 5);
    }

    #[test]
    fn thread_ids_are_unique() {
        let c = cpu();
        let a = Thread::new(1, &c);
        let b = Thread::new(1, &c);
        assert_ne!(a.id(), b.id());
    }
}
