//! In-memory provider and inventory
//!
//! Used for local runs (`kind: memory`) and throughout the tests. The
//! compute side keeps nodes in a map and counts the calls made against
//! it so tests can observe cache behaviour.

use crate::compute::{
    ComputeClient, HardwareProfile, ImageInfo, LocationScope, NodeMetadata, NodeTemplate,
    ProviderLocation,
};
use crate::error::{CloudError, Result};
use crate::inventory::{InventoryApi, InventorySystem};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub const MEMORY_PROVIDER: &str = "memory";
pub const MEMORY_ROOT_LOCATION: &str = "memory";
pub const MEMORY_REGION: &str = "memory-region";
pub const MEMORY_ZONE: &str = "in-memory";
pub const MEMORY_IMAGE: &str = "base";

const PENDING: &str = "PENDING";
const DELETED: &str = "DELETED";

pub struct MemoryCompute {
    nodes: DashMap<String, NodeMetadata>,
    next_id: AtomicU64,
    latency: Option<Duration>,
    fail_creation: AtomicBool,
    fail_destruction: AtomicBool,
    describe_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl Default for MemoryCompute {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCompute {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            next_id: AtomicU64::new(1),
            latency: None,
            fail_creation: AtomicBool::new(false),
            fail_destruction: AtomicBool::new(false),
            describe_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every single-node lookup by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make subsequent creation calls fail
    pub fn fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent destroy calls fail, leaving nodes untouched
    pub fn fail_destruction(&self, fail: bool) {
        self.fail_destruction.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a node's provider status; false if the node does not exist
    pub fn set_status(&self, id: &str, status: &str) -> bool {
        match self.nodes.get_mut(id) {
            Some(mut node) => {
                node.status = status.to_string();
                true
            }
            None => false,
        }
    }

    /// Number of `get_node` calls served so far
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_nodes` calls received so far
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeClient for MemoryCompute {
    fn provider(&self) -> &str {
        MEMORY_PROVIDER
    }

    async fn list_nodes(&self) -> Result<Vec<NodeMetadata>> {
        let mut nodes: Vec<NodeMetadata> = self.nodes.iter().map(|n| n.value().clone()).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn get_node(&self, id: &str) -> Result<Option<NodeMetadata>> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.nodes.get(id).map(|n| n.value().clone()))
    }

    async fn create_nodes(
        &self,
        template: &NodeTemplate,
        count: u32,
    ) -> Result<Vec<NodeMetadata>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(CloudError::upstream(
                "create nodes",
                &template.group,
                "creation disabled on memory provider",
            ));
        }

        let mut created = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let node = NodeMetadata {
                id: format!("mem-{:06}", n),
                name: format!("{}-{}", template.group, n),
                hardware: Some(template.hardware.clone()),
                status: PENDING.to_string(),
                location: Some(template.location.clone()),
            };
            tracing::debug!("Memory provider created node {}", node.id);
            self.nodes.insert(node.id.clone(), node.clone());
            created.push(node);
        }
        Ok(created)
    }

    async fn destroy_node(&self, id: &str) -> Result<()> {
        if self.fail_destruction.load(Ordering::SeqCst) {
            return Err(CloudError::upstream(
                "destroy node",
                id,
                "destruction disabled on memory provider",
            ));
        }
        if self.set_status(id, DELETED) {
            Ok(())
        } else {
            Err(CloudError::upstream("destroy node", id, "no such node"))
        }
    }

    async fn list_hardware(&self) -> Result<Vec<HardwareProfile>> {
        let profile = |id: &str, name: &str, cores: f64, ram_mb: u64, disk_gb: f64| {
            HardwareProfile {
                id: id.to_string(),
                name: name.to_string(),
                cores,
                ram_mb,
                disk_gb,
                location: None,
            }
        };
        Ok(vec![
            profile("1", "m1.tiny", 1.0, 512, 10.0),
            profile("2", "m1.small", 1.0, 1024, 100.0),
            profile("3", "c1.small", 1.0, 1024, 30.0),
            profile("4", "m1.medium", 2.0, 2048, 200.0),
            profile("5", "m1.large.deprecated", 4.0, 8192, 400.0),
        ])
    }

    async fn list_locations(&self) -> Result<Vec<ProviderLocation>> {
        Ok(vec![
            ProviderLocation::new(
                MEMORY_ROOT_LOCATION,
                "Memory provider",
                LocationScope::Provider,
                None,
            ),
            ProviderLocation::new(
                MEMORY_REGION,
                "Memory region",
                LocationScope::Region,
                Some(MEMORY_ROOT_LOCATION),
            ),
            ProviderLocation::new(
                MEMORY_ZONE,
                "In your memory",
                LocationScope::Zone,
                Some(MEMORY_REGION),
            ),
        ])
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        Ok(vec![ImageInfo {
            id: "img-base".to_string(),
            name: MEMORY_IMAGE.to_string(),
        }])
    }
}

/// Inventory that names every instance `<instance-id>.<domain>`
pub struct MemoryInventory {
    domain: String,
    systems: DashMap<String, InventorySystem>,
    writes: AtomicUsize,
}

impl MemoryInventory {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            systems: DashMap::new(),
            writes: AtomicUsize::new(0),
        }
    }

    /// Seed a record without counting it as a write
    pub fn insert(&self, system: InventorySystem) {
        self.systems.insert(system.fqdn.clone(), system);
    }

    pub fn system(&self, name: &str) -> Option<InventorySystem> {
        self.systems.get(name).map(|s| s.value().clone())
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryApi for MemoryInventory {
    async fn system_name(&self, instance_id: &str) -> Result<Option<String>> {
        Ok(Some(format!("{}.{}", instance_id, self.domain)))
    }

    async fn get_system(&self, name: &str) -> Result<Option<InventorySystem>> {
        Ok(self.system(name))
    }

    async fn put_system(&self, system: &InventorySystem) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.systems.insert(system.fqdn.clone(), system.clone());
        Ok(())
    }
}
