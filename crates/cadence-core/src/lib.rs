//! # cadence-core
//!
//! Core abstractions shared by the cadence subscription engine.
//!
//! This crate provides the foundational types used across all cadence components:
//!
//! - **Identifiers**: Commit-log partitions and per-partition subscription identifiers
//! - **Intervals**: Validated closed ranges of offsets and timestamps
//! - **Runtime Configuration**: Process-wide numeric settings read fresh at decision time
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialisation and span helpers
//!
//! ## Crate Boundary
//!
//! `cadence-core` holds the primitives that the engine and its collaborators
//! agree on. It has no knowledge of scheduling or query execution.
//!
//! ## Example
//!
//! ```rust
//! use cadence_core::prelude::*;
//!
//! let partition = PartitionId::new(0);
//! let identifier = SubscriptionIdentifier::generate(partition);
//! assert_eq!(identifier.partition(), partition);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod interval;
pub mod observability;
pub mod runtime_config;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use cadence_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{PartitionId, SubscriptionIdentifier};
    pub use crate::interval::Interval;
    pub use crate::runtime_config::{EnvRuntimeConfig, InMemoryRuntimeConfig, RuntimeConfig};
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use id::{PartitionId, SubscriptionIdentifier};
pub use interval::Interval;
pub use observability::{LogFormat, init_logging};
pub use runtime_config::{EnvRuntimeConfig, InMemoryRuntimeConfig, RuntimeConfig};
