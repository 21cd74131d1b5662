//! Request guards driven by route metadata.
//!
//! [`AuthGuard`] gates on authentication and roles; [`ResourceGuard`] asks the
//! policy decision point for `resource:scope` permissions.

pub mod auth_guard;
pub mod metadata;
pub mod resource_guard;

pub use auth_guard::AuthGuard;
pub use metadata::{HandlerRef, Metadata, RouteMetadata};
pub use resource_guard::ResourceGuard;
