//! Lock aliases shared across the crate.
//!
//! All queue and wait locks are spinlocks. The `arc_lock` guards let a held
//! lock be stored in a path link without borrowing the structure it lives in.

pub type RawSpinlock = spin::Mutex<()>;

pub type SpinMutex<T> = lock_api::Mutex<RawSpinlock, T>;
pub type SpinGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinlock, T>;
pub type ArcSpinGuard<T> = lock_api::ArcMutexGuard<RawSpinlock, T>;
