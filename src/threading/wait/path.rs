use alloc::sync::Arc;
use alloc::vec::Vec;

use cfg_if::cfg_if;

use crate::threading::thread::{Priority, Thread};
use crate::threading::wait::queue::QueueGuard;

#[cfg(feature = "smp")]
use crate::sync::ArcSpinGuard;
#[cfg(feature = "smp")]
use crate::threading::thread::Wait;
#[cfg(feature = "smp")]
use crate::threading::wait::queue::Gate;

/// Ownership cycle found while building a path.
#[derive(Debug, PartialEq, Eq)]
pub struct Deadlock;

pub(crate) struct PriorityUpdate {
    pub(crate) thread: Arc<Thread>,
    pub(crate) priority: Priority,
}

#[cfg(feature = "smp")]
enum PathLink {
    /// The chain ends at this owner; only its default wait lock is held.
    Terminal {
        owner: Arc<Thread>,
        guard: ArcSpinGuard<Wait>,
    },
    /// The owner waits on a further queue; that queue's lock is held and
    /// the link is registered and gated.
    Hop {
        owner: Arc<Thread>,
        source: usize,
        guard: QueueGuard,
        gate: Arc<Gate>,
    },
}

#[cfg(feature = "smp")]
impl PathLink {
    fn owner(&self) -> &Arc<Thread> {
        match self {
            PathLink::Terminal { owner, .. } => owner,
            PathLink::Hop { owner, .. } => owner,
        }
    }
}

/// The acquired ownership chain rooted at the enqueue queue. Locks taken
/// along the walk stay held until [`Path::release`], which runs after the
/// discipline's enqueue hook.
pub struct Path {
    #[cfg(feature = "smp")]
    links: Vec<PathLink>,
    #[cfg(not(feature = "smp"))]
    owners: Vec<Arc<Thread>>,
    update_priority: Vec<PriorityUpdate>,
}

impl Path {
    fn new() -> Self {
        Self {
            #[cfg(feature = "smp")]
            links: Vec::new(),
            #[cfg(not(feature = "smp"))]
            owners: Vec::new(),
            update_priority: Vec::new(),
        }
    }

    /// Walk the ownership chain starting at the caller's locked queue.
    ///
    /// On success the returned path holds every lock the walk acquired; a
    /// detected ownership cycle tears all of them down again and reports
    /// [`Deadlock`] with only the caller's queue lock left held.
    #[cfg(feature = "smp")]
    pub(crate) fn acquire(thread: &Arc<Thread>, guard: &QueueGuard) -> Result<Path, Deadlock> {
        let mut path = Path::new();

        let Some(first_owner) = guard.owner() else {
            return Ok(path);
        };
        if Arc::ptr_eq(first_owner, thread) {
            return Err(Deadlock);
        }

        let mut owner = first_owner.clone();
        let mut queue = guard.queue().clone();

        loop {
            let mut wait_guard = owner.wait_lock_arc();

            let Some(target) = wait_guard.queue.clone() else {
                path.links.push(PathLink::Terminal {
                    owner,
                    guard: wait_guard,
                });
                return Ok(path);
            };

            if !registry().add(queue.address(), target.address()) {
                // this link would close a cycle; make it look terminal so
                // the teardown releases the default lock we still hold
                path.links.push(PathLink::Terminal {
                    owner,
                    guard: wait_guard,
                });
                path.release();
                return Err(Deadlock);
            }

            // Hand-off: publish the gate, release the owner's default lock,
            // only then take the target queue lock.
            let gate = Gate::new(target.clone());
            wait_guard.pending_requests.push(gate.clone());
            drop(wait_guard);

            let target_guard = target.lock();

            if gate.target().is_none() {
                // A concurrent extract moved the owner off its queue while
                // we were between the locks. The chain ends here after all.
                registry().remove(queue.address());
                drop(target_guard);
                let mut wait_guard = owner.wait_lock_arc();
                wait_guard.remove_request(&gate);
                debug_assert!(wait_guard.queue.is_none());
                path.links.push(PathLink::Terminal {
                    owner,
                    guard: wait_guard,
                });
                return Ok(path);
            }

            let next_owner = target_guard.owner().cloned();
            path.links.push(PathLink::Hop {
                owner: owner.clone(),
                source: queue.address(),
                guard: target_guard,
                gate,
            });

            match next_owner {
                None => return Ok(path),
                Some(next) => {
                    owner = next;
                    queue = target;
                }
            }
        }
    }

    /// Walk the ownership chain starting at the caller's locked queue.
    ///
    /// A single executing thread cannot race other walkers, so the chain is
    /// followed without extra locks or the registry.
    #[cfg(not(feature = "smp"))]
    pub(crate) fn acquire(thread: &Arc<Thread>, guard: &QueueGuard) -> Result<Path, Deadlock> {
        let mut path = Path::new();

        let Some(first_owner) = guard.owner() else {
            return Ok(path);
        };
        let mut owner = first_owner.clone();

        loop {
            if Arc::ptr_eq(&owner, thread) {
                return Err(Deadlock);
            }
            path.owners.push(owner.clone());

            let Some(queue) = owner.wait_queue() else {
                return Ok(path);
            };
            match queue.lock().owner().cloned() {
                None => return Ok(path),
                Some(next) => owner = next,
            }
        }
    }

    /// Release the path tail first: the deepest lock was acquired last and
    /// must go first to respect the acquisition order.
    #[cfg(feature = "smp")]
    pub(crate) fn release(&mut self) {
        while let Some(link) = self.links.pop() {
            match link {
                PathLink::Terminal { guard, .. } => drop(guard),
                PathLink::Hop {
                    owner,
                    source,
                    guard,
                    gate,
                } => {
                    registry().remove(source);
                    drop(guard);
                    owner.wait_lock().remove_request(&gate);
                }
            }
        }
    }

    /// No locks are carried on a single processor.
    #[cfg(not(feature = "smp"))]
    pub(crate) fn release(&mut self) {
        self.owners.clear();
    }

    /// Discipline hook: record a boost for every chain owner less urgent
    /// than `priority`.
    pub fn boost_owners(&mut self, priority: Priority) {
        let updates: Vec<PriorityUpdate> = self
            .chain_owners()
            .filter(|owner| owner.priority() > priority)
            .map(|owner| PriorityUpdate {
                thread: owner.clone(),
                priority,
            })
            .collect();
        self.update_priority.extend(updates);
    }

    #[cfg(feature = "smp")]
    fn chain_owners(&self) -> impl Iterator<Item = &Arc<Thread>> {
        self.links.iter().map(PathLink::owner)
    }

    #[cfg(not(feature = "smp"))]
    fn chain_owners(&self) -> impl Iterator<Item = &Arc<Thread>> {
        self.owners.iter()
    }

    /// Propagate the recorded inheritance boosts. Runs after every lock of
    /// the path has been dropped.
    pub(crate) fn apply_priority_updates(&mut self) {
        for update in self.update_priority.drain(..) {
            update.thread.boost_priority(update.priority);
        }
    }
}

cfg_if! {
    if #[cfg(feature = "smp")] {
        use conquer_once::spin::OnceCell;
        use hashbrown::HashMap;

        use crate::sync::SpinMutex;

        struct LinkEntry {
            target: usize,
        }

        /// Process-wide map of the links of all in-flight paths, keyed by
        /// source-queue address. Consulted only when a chain is at least two
        /// hops deep, so contention stays confined to nested-resource
        /// conflicts.
        pub(crate) struct LinkRegistry {
            links: SpinMutex<HashMap<usize, LinkEntry>>,
        }

        impl LinkRegistry {
            fn new() -> Self {
                Self {
                    links: SpinMutex::new(HashMap::new()),
                }
            }

            /// Register `source -> target`. Walks the already registered
            /// links forward from `target`; reaching `source` again means
            /// the new link would close an ownership cycle and nothing is
            /// inserted.
            pub(crate) fn add(&self, source: usize, target: usize) -> bool {
                let mut links = self.links.lock();

                let mut recursive_target = target;
                while let Some(entry) = links.get(&recursive_target) {
                    recursive_target = entry.target;
                    if recursive_target == source {
                        return false;
                    }
                }

                let previous = links.insert(source, LinkEntry { target });
                debug_assert!(previous.is_none());
                true
            }

            pub(crate) fn remove(&self, source: usize) {
                self.links.lock().remove(&source);
            }

            pub(crate) fn len(&self) -> usize {
                self.links.lock().len()
            }
        }

        static LINK_REGISTRY: OnceCell<LinkRegistry> = OnceCell::uninit();

        pub(crate) fn registry() -> &'static LinkRegistry {
            LINK_REGISTRY.get_or_init(LinkRegistry::new)
        }

        pub fn init() {
            _ = LINK_REGISTRY.try_init_once(LinkRegistry::new);
        }
    } else {
        pub fn init() {}
    }
}

#[cfg(all(test, feature = "smp"))]
mod tests {
    use super::*;

    // distinct fake queue addresses; the registry only compares them
    const Q1: usize = 0x1000;
    const Q2: usize = 0x2000;
    const Q3: usize = 0x3000;

    #[test]
    fn rejects_the_closing_link_of_a_cycle() {
        let registry = LinkRegistry::new();
        assert!(registry.add(Q1, Q2));
        assert!(registry.add(Q2, Q3));

        // q3 -> q1 would close q1 -> q2 -> q3 -> q1
        assert!(!registry.add(Q3, Q1));
        assert_eq!(registry.len(), 2);

        registry.remove(Q2);
        assert!(registry.add(Q3, Q1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn rejects_a_direct_two_queue_cycle() {
        let registry = LinkRegistry::new();
        assert!(registry.add(Q1, Q2));
        assert!(!registry.add(Q2, Q1));
        registry.remove(Q1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn unrelated_links_coexist() {
        let registry = LinkRegistry::new();
        assert!(registry.add(Q1, Q2));
        assert!(registry.add(Q3, Q2));
        assert_eq!(registry.len(), 2);
    }
}
