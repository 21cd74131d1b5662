//! In-memory storage implementations
//!
//! Suitable for development, tests, and single-instance deployments.

mod session;

pub use session::{DEFAULT_SESSION_TTL, MemorySessionStore};
