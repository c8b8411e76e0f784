use core::sync::atomic::{AtomicU32, Ordering};

/// Per-processor state this subsystem cares about: the thread-dispatch
/// disable counter. While the counter is nonzero no thread switch happens on
/// that processor.
///
/// The crate has no arch layer to ask for the current processor, so callers
/// pass their `Cpu` handle explicitly through the queue context.
#[derive(Debug, Default)]
pub struct Cpu {
    dispatch_disable_level: AtomicU32,
}

impl Cpu {
    pub const fn new() -> Self {
        Self {
            dispatch_disable_level: AtomicU32::new(0),
        }
    }

    /// Disable thread dispatching and return the resulting nesting level.
    pub fn dispatch_disable(&self) -> u32 {
        self.dispatch_disable_level.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn dispatch_enable(&self) {
        let previous = self.dispatch_disable_level.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous != 0);
    }

    pub fn dispatch_disable_level(&self) -> u32 {
        self.dispatch_disable_level.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_nests() {
        let cpu = Cpu::new();
        assert_eq!(cpu.dispatch_disable(), 1);
        assert_eq!(cpu.dispatch_disable(), 2);
        cpu.dispatch_enable();
        assert_eq!(cpu.dispatch_disable_level(), 1);
        cpu.dispatch_enable();
        assert_eq!(cpu.dispatch_disable_level(), 0);
    }
}
