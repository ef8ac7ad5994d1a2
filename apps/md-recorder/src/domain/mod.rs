//! Domain Layer - Core market data types and pure logic.
//!
//! This layer holds the address expander, tick records, subscription
//! registry, and trading schedule. Nothing here performs I/O.

/// Front server address templates and endpoints.
pub mod address;

/// Topic-addressed gateway events.
pub mod event;

/// Trading window schedule.
pub mod schedule;

/// Subscription requests and the symbol/exchange registry.
pub mod subscription;

/// Raw and canonical tick types.
pub mod tick;
