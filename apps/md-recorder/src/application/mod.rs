//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (feed session, event bus, processes).
pub mod ports;

/// Application services: normalization, connection, supervision.
pub mod services;
