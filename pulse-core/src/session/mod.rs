//! Session lifecycle, persistence, and retention

pub mod coordinator;
pub mod retention;
pub mod store;
pub mod types;

// Re-export key types for convenience
pub use coordinator::SessionCoordinator;
pub use retention::{RetentionPolicy, eviction_plan};
pub use store::SessionStore;
pub use types::{Session, SessionLifecycleEvent};
