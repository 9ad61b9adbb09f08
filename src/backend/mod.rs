//! MDC backend: accounts, sessions and the shared job record registry.

pub mod auth;
pub mod client;
pub mod registry;

pub use auth::UserProfile;
pub use client::{BackendClient, Session};
pub use registry::RemoteRecordStore;
