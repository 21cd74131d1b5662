//! Session persistence: the `SessionStore` trait and its in-memory backend.

pub mod inmemory;
pub mod traits;

pub use inmemory::MemorySessionStore;
pub use traits::*;
