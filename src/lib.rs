//! # Cards Provider
//!
//! A Kubernetes provider that keeps `Deck` managed resources in sync with a
//! card dealer service.
//!
//! ## Module Structure
//!
//! - `crd` - `Deck`, `ProviderConfig` and `ProviderConfigUsage` resources
//! - `managed` - the generic managed resource reconciler
//! - `credentials` - credential resolution for `ProviderConfig`s
//! - `usage` - `ProviderConfig` usage tracking
//! - `cards` - the card dealer and its `Deck` client
//! - `store` - Kubernetes and in-memory object stores
//! - `runtime` - work queue, rate limiting and the worker pool
//! - `observability` - metrics and logging
//! - `server` - metrics and probe endpoints

pub mod cards;
pub mod config;
pub mod constants;
pub mod crd;
pub mod credentials;
pub mod managed;
pub mod observability;
pub mod runtime;
pub mod server;
pub mod store;
pub mod usage;

/// Build metadata stamped by `build.rs`
pub mod build_info {
    pub const GIT_HASH: &str = env!("BUILD_GIT_HASH");
    pub const BUILD_DATETIME: &str = env!("BUILD_DATETIME");
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
