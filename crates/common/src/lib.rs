//! Shared configuration, error types, ids and the column type vocabulary for
//! the PQL compiler crates.
//!
//! Architecture role:
//! - defines the compiler configuration passed from the caller to lowering
//! - provides the common [`PqlError`] / [`Result`] contracts
//! - hosts the wire-stable [`DataType`] / [`SemanticType`] enums
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`location`]
//! - [`types`]

pub mod config;
pub mod error;
pub mod ids;
pub mod location;
pub mod types;

pub use config::{CompilerConfig, EndpointDefaults, PlanOptions, UnusedOperatorPolicy};
pub use error::{PqlError, Result};
pub use ids::*;
pub use location::SourceLocation;
pub use types::{DataType, SemanticType};
