//! Inventory system client for Nimbus
//!
//! The inventory system is the source of truth for hostnames, tags and
//! roles. This crate talks to its HTTP API and plugs into
//! `nimbus-cloud` through the `InventoryApi` seam.
//!
//! # Endpoints
//!
//! - `GET  /pcmsystemname/{instance}` - inventory name for a provider instance
//! - `GET  /system/{name}` - system record (204 or empty body when absent)
//! - `PUT  /system/{fqdn}` - replace a system record
//!
//! Every request carries a basic-auth header built once from the
//! configured credentials.

pub mod client;
pub mod error;

pub use client::{InventoryClient, InventoryClientConfig, basic_auth_encode};
pub use error::{InventoryError, Result};
