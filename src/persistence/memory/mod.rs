mod checks;
mod core;
mod store;

pub use core::MemoryPersistence;
