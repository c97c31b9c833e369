//! Nimbus Cloud
//!
//! Provider-independent core of Nimbus: one instance model over many
//! clouds, with hostnames and tags taken from an external inventory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                ProviderRegistry                  │
//! │        (fan-out, create-request validation)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │ one per provider
//! ┌─────────────────▼───────────────────────────────┐
//! │               ComputeConnector                   │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────┐ │
//! │  │   Catalog    │ │ Reconciliation│ │Inventory │ │
//! │  │  resolver    │ │    cache      │ │  bridge  │ │
//! │  └──────────────┘ └──────────────┘ └────┬─────┘ │
//! └───────┬─────────────────────────────────┼───────┘
//!         │ ComputeClient                   │ InventoryApi
//! ┌───────▼───────┐ ┌───────────┐   ┌───────▼───────┐
//! │ nimbus-cloud- │ │  memory   │   │   nimbus-     │
//! │     nova      │ │           │   │   inventory   │
//! └───────────────┘ └───────────┘   └───────────────┘
//! ```

pub mod cache;
pub mod catalog;
pub mod compute;
pub mod connector;
pub mod error;
pub mod inventory;
pub mod memory;
pub mod model;
pub mod registry;

// Re-exports
pub use cache::{CachePolicy, Generation, ReconciliationCache};
pub use catalog::Catalog;
pub use compute::{
    ComputeClient, HardwareProfile, ImageInfo, LocationScope, NodeMetadata, NodeTemplate,
    ProviderLocation,
};
pub use connector::{ComputeConnector, ConnectorSettings, InstanceConnector};
pub use error::{CloudError, Result};
pub use inventory::{InventoryApi, InventoryBridge, InventoryRecord, InventorySystem};
pub use memory::{MemoryCompute, MemoryInventory};
pub use model::{
    DestructionStatus, Instance, InstanceCreationError, InstanceCreationFailedResponse,
    InstanceCreationRequest, InstanceStatus, Location, ProviderInfo, Size, TagUpdateStatus,
};
pub use registry::ProviderRegistry;
