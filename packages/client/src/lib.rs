//! Async client for the CWE REST service.
//!
//! Layers, bottom-up:
//!
//! | Module | Role |
//! |--------|------|
//! | [`rate_limit`] | Spaces outbound requests by a minimum interval |
//! | [`transport`] | Paces, sends, and retries requests on 5xx or I/O failure |
//! | [`entity`] | Folds the service's loose JSON shapes into typed entries |
//! | [`api`] | One method per REST endpoint |
//! | [`fetcher`] | Builds [`cwe::Node`] trees and [`cwe::Registry`] graphs |
//!
//! # Quick start
//!
//! ```no_run
//! use cwe_client::{ClientConfig, Fetcher};
//!
//! # async fn run() -> cwe_client::Result<()> {
//! let fetcher = Fetcher::from_config(&ClientConfig::from_env())?;
//! let registry = fetcher.build_tree_with_view("CWE-1000").await?;
//! println!("{} entries", registry.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod fetcher;
pub mod rate_limit;
pub mod transport;

pub use api::{ApiClient, Version};
pub use config::ClientConfig;
pub use entity::{Entity, EntityKind};
pub use error::{ClientError, Result};
pub use fetcher::Fetcher;
pub use rate_limit::RateLimiter;
pub use transport::Transport;
