//! Auricle Shared Library
//!
//! Types shared between the Auricle background service and the CLI:
//! configuration, the transcript record format, the persisted speaker
//! store schema, and platform path resolution.

pub mod config;
pub mod paths;
pub mod types;

pub use config::*;
pub use types::*;
