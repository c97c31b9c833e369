//! OpenStack Nova provider for Nimbus
//!
//! Implements the `ComputeClient` seam of `nimbus-cloud` over the Nova
//! compute API, authenticating with Keystone v2.0 password credentials.
//!
//! # Location graph
//!
//! ```text
//! openstack-nova (provider) ── <region> (region) ── <availability zone> (zone)
//! ```
//!
//! Only zones Nova reports as available become locations. A zone whose
//! name collides with the region is left out.
//!
//! # Example
//!
//! ```ignore
//! use nimbus_cloud_nova::{NovaClient, NovaConfig};
//!
//! let client = NovaClient::connect(NovaConfig {
//!     identity_endpoint: "https://keystone.example.com:5000/v2.0".into(),
//!     compute_endpoint: None,
//!     user: "demo".into(),
//!     password: "secret".into(),
//!     tenant: "lab".into(),
//!     region: "RegionOne".into(),
//! })
//! .await?;
//! ```

pub mod client;
pub mod error;

pub use client::{NOVA_PROVIDER, NOVA_ROOT_LOCATION, NovaClient, NovaConfig};
pub use error::{NovaError, Result};
