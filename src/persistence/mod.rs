pub mod memory;
pub mod traits;

pub use memory::MemoryPersistence;
pub use traits::{CheckStore, EventStore, Gateway, RunStore};
