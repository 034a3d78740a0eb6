//! Replication engine: resolves dataset aliases, replaces destination
//! slices, bulk-loads query results, and refreshes indexes and
//! statistics, one dataset at a time.

pub mod config;
pub mod dest;
pub mod identifier;
pub mod pipeline;
pub mod resolve;
pub mod source;

pub use dest::{Destination, PostgresDestination};
pub use pipeline::run_replication;
pub use source::{PostgresSource, SourceClient};
