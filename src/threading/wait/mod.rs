pub mod enqueue;
pub mod ops;
pub mod path;
pub mod queue;

pub fn init() {
    path::init();
}
