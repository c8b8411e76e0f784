#[cfg(not(feature = "std"))]
use ::core::fmt::Arguments;
#[cfg(feature = "std")]
use ::std::fmt::Arguments;

use core::sync::atomic::{AtomicU8, Ordering};

pub trait Logger: Sync + Send {
    fn log(&self, msg: Arguments);
}

const UNSET: u8 = 0;
const BUSY: u8 = 1;
const SET: u8 = 2;

static STATE: AtomicU8 = AtomicU8::new(UNSET);
static mut LOGGER: Option<&'static dyn Logger> = None;

/// Install the global logger. Panics on a second install.
pub fn set_logger(logger: &'static dyn Logger) {
    if STATE
        .compare_exchange(UNSET, BUSY, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        panic!("logger already set");
    }
    unsafe { LOGGER = Some(logger) }
    STATE.store(SET, Ordering::Release);
}

pub fn log(args: Arguments) {
    if STATE.load(Ordering::Acquire) != SET {
        return;
    }
    #[allow(static_mut_refs)]
    if let Some(logger) = unsafe { LOGGER } {
        logger.log(args);
    }
}

#[cfg(feature = "std")]
pub struct StdoutLogger;

#[cfg(feature = "std")]
impl Logger for StdoutLogger {
    fn log(&self, msg: Arguments) {
        ::std::println!("{msg}");
    }
}
