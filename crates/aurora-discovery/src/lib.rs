//! Device model discovery.
//!
//! Probes every device of a service concurrently through the
//! [`SchemaStore`](aurora_core::SchemaStore), resolves the vendor model version to build
//! against and caches capability sets for a bounded time.

pub mod cache;
pub mod discovery;

pub use cache::CapabilityCache;
pub use discovery::ModelDiscovery;
