//! Common library for the R8it client
//!
//! This crate provides functionality shared by the authenticated API client
//! and the review capture flow: the normalized error taxonomy, persisted
//! client storage and layered configuration.
//!
//! ```rust,no_run
//! use common::config::ClientConfig;
//! use common::storage::{FileStore, KeyValueStore};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_env()?;
//!     let store = FileStore::open(config.storage_path.unwrap_or_else(|| "r8it.json".into()))?;
//!     println!("Stored user: {:?}", store.get("user")?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod storage;

pub use error::{ClientError, ClientResult, ErrorKind};
