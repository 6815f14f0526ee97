//! Method-level analyses consumed by the scheduler.

pub mod heap_locations;

pub use heap_locations::{HeapLocation, HeapLocationCollector};
