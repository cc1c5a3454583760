//! Read/write coordinator between the order store and the order cache.
//!
//! Writes go to the store first and reach the cache only after the store
//! has committed them; reads consult the cache and fall back to the store,
//! filling the cache on a miss. Aggregates are never updated in place, so
//! a cached entry can lag the store but never contradict it.

pub mod service;

pub use service::{CachedOrderService, OrderService};
