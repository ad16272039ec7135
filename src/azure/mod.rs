//! Azure Resource Manager interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - Service principal tokens and Azure CLI profile defaults
//! - [`client`] - Main client: URL building and long-running operations
//! - [`http`] - HTTP utilities for REST API calls
//! - [`models`] - Typed request bodies and resource handles
//! - [`network`] - Virtual networks, subnets, public IPs, NICs
//! - [`compute`] - Image catalog, virtual machines, extensions
//! - [`resources`] - Resource groups and storage accounts
//!
//! # Example
//!
//! ```ignore
//! use azprov::azure::{auth::AzureCredentials, client::AzureClient, compute};
//!
//! async fn example() -> azprov::azure::AzureResult<()> {
//!     let credentials = AzureCredentials::from_env(None, None)?;
//!     let client = AzureClient::new(credentials, "<subscription-id>")?;
//!     let vms = compute::list_vms(&client, "my-rg").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod compute;
pub mod error;
pub mod http;
pub mod models;
pub mod network;
pub mod resources;

pub use client::AzureClient;
pub use error::{AzureError, AzureResult};
