//! Resource model
//!
//! IDs, types, configs and the resources built from them.

mod config;
mod id;
mod resource;

// Re-exports
pub use config::*;
pub use id::*;
pub use resource::*;
