//! Cloudflare handlers for Gasoline
//!
//! Provisioning handlers that plug into a [`gasoline_cloud::BackendRegistry`].
//!
//! # Supported resource types
//!
//! - `cloudflare-kv`: Workers KV namespaces
//!
//! # Requirements
//!
//! `CLOUDFLARE_API_TOKEN` and `CLOUDFLARE_ACCOUNT_ID` must be set.
//!
//! # Example
//!
//! ```ignore
//! use gasoline_cloud_cloudflare::{CloudflareConfig, registry};
//!
//! let config = CloudflareConfig::from_env()?;
//! let backend = registry(config, "my-app");
//! ```

pub mod api;
pub mod error;
pub mod handlers;
pub mod kv;

pub use api::{CLOUDFLARE_API_BASE, CloudflareConfig};
pub use error::{CloudflareError, Result};
pub use handlers::{KvHandler, KvSpec, register_handlers, registry};
pub use kv::{CloudflareKv, KvNamespace, capital_snake_to_train_case, namespace_title};
