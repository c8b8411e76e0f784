use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Compound per-thread wait-flag word: a wait class plus a blocking
    /// phase packed into one atomic value.
    ///
    /// Once a blocking call has published `OBJECT_INTEND_TO_BLOCK`, the only
    /// legal phase transitions are
    /// `INTEND_TO_BLOCK -> BLOCKED` (taken by the blocker itself),
    /// `INTEND_TO_BLOCK -> READY_AGAIN` (a waker racing the blocker) and
    /// `BLOCKED -> READY_AGAIN` (a waker after the true block), each via
    /// compare-and-set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitFlags: u32 {
        const INTEND_TO_BLOCK = 1 << 0;
        const BLOCKED = 1 << 1;
        const READY_AGAIN = 1 << 2;

        const CLASS_OBJECT = 1 << 8;
    }
}

impl WaitFlags {
    pub const OBJECT_INTEND_TO_BLOCK: WaitFlags =
        WaitFlags::CLASS_OBJECT.union(WaitFlags::INTEND_TO_BLOCK);
    pub const OBJECT_BLOCKED: WaitFlags = WaitFlags::CLASS_OBJECT.union(WaitFlags::BLOCKED);
    pub const OBJECT_READY_AGAIN: WaitFlags =
        WaitFlags::CLASS_OBJECT.union(WaitFlags::READY_AGAIN);

    pub fn is_object_class(self) -> bool {
        self.contains(WaitFlags::CLASS_OBJECT)
    }
}

/// The wait-flag atom. The helpers below are the only supported mutators of
/// a thread's blocking phase while an enqueue is in progress.
#[derive(Debug)]
pub struct AtomicWaitFlags(AtomicU32);

impl AtomicWaitFlags {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn get(&self) -> WaitFlags {
        WaitFlags::from_bits_retain(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, flags: WaitFlags) {
        self.0.store(flags.bits(), Ordering::Relaxed);
    }

    pub fn try_change_acquire(&self, expected: WaitFlags, desired: WaitFlags) -> bool {
        self.0
            .compare_exchange(
                expected.bits(),
                desired.bits(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    pub fn try_change_release(&self, expected: WaitFlags, desired: WaitFlags) -> bool {
        self.0
            .compare_exchange(
                expected.bits(),
                desired.bits(),
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_ok()
    }
}

impl Default for AtomicWaitFlags {
    fn default() -> Self {
        Self::new()
    }
}

bitflags! {
    /// Scheduler-visible blocking states. An empty word means ready.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct States: u32 {
        const WAITING_FOR_MUTEX = 1 << 0;
        const WAITING_FOR_SEMAPHORE = 1 << 1;
        const WAITING_FOR_EVENT = 1 << 2;
        const WAITING_FOR_CONDITION = 1 << 3;
        const WAITING_FOR_MESSAGE = 1 << 4;
        const WAITING_FOR_TIME = 1 << 5;
    }
}

impl States {
    pub const READY: States = States::empty();
}
