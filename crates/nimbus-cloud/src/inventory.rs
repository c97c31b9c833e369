//! Inventory bridge
//!
//! The inventory system owns hostnames, tags and roles. Instances are
//! looked up there by a name the inventory derives from the provider's
//! instance id; every successful write invalidates the cached instance.
//!
//! Records found by a lookup are kept for a few minutes so listing many
//! instances does not cost two inventory round trips each. A kept record
//! is tagged with the instance's cache generation and is only reused
//! while that generation is current. Tag updates always read the live
//! record before writing it back.

use crate::cache::{DEFAULT_INVENTORY_TTL, Generation, ReconciliationCache};
use crate::error::{CloudError, Result};
use crate::model::{Instance, TagUpdateStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Remote inventory operations
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// Inventory name for a provider instance id, `None` if it has none yet
    async fn system_name(&self, instance_id: &str) -> Result<Option<String>>;

    /// Record stored under `name`, `None` when the inventory has no record
    async fn get_system(&self, name: &str) -> Result<Option<InventorySystem>>;

    /// Persist the whole record under its fqdn
    async fn put_system(&self, system: &InventorySystem) -> Result<()>;
}

/// Record kept by the inventory system for one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySystem {
    pub fqdn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic_instance: Option<String>,
    #[serde(default, with = "comma_set")]
    pub roles: BTreeSet<String>,
    #[serde(default, with = "comma_set")]
    pub tags: BTreeSet<String>,
}

impl InventorySystem {
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            serial_number: None,
            pic_instance: None,
            roles: BTreeSet::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_pic_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.pic_instance = Some(instance_id.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Returns whether the tag set changed
    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.tags.insert(tag.to_string())
    }

    /// Returns whether the tag set changed
    pub fn delete_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }
}

/// Sets travel as a single comma-joined string on the wire
mod comma_set {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeSet;

    pub fn serialize<S: Serializer>(set: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error> {
        let joined = set.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        serializer.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(parse).unwrap_or_default())
    }

    pub fn parse(raw: &str) -> BTreeSet<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Inventory view of an instance
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRecord {
    pub name: String,
    pub system: InventorySystem,
}

struct CachedRecord {
    record: InventoryRecord,
    generation: Generation,
    expires_at: Instant,
}

/// Reads and writes inventory data on behalf of one connector
pub struct InventoryBridge {
    api: Arc<dyn InventoryApi>,
    cache: Arc<ReconciliationCache>,
    records: DashMap<String, CachedRecord>,
    record_ttl: Duration,
}

impl InventoryBridge {
    pub fn new(api: Arc<dyn InventoryApi>, cache: Arc<ReconciliationCache>) -> Self {
        Self {
            api,
            cache,
            records: DashMap::new(),
            record_ttl: DEFAULT_INVENTORY_TTL,
        }
    }

    /// How long a record found by [`Self::lookup`] is reused
    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    /// Inventory record of `instance_id`, reusing a recent read
    ///
    /// Absent records are not remembered.
    pub async fn lookup(&self, instance_id: &str) -> Result<Option<InventoryRecord>> {
        let generation = self.cache.generation(instance_id);
        if let Some(cached) = self.records.get(instance_id) {
            if cached.generation == generation && cached.expires_at > Instant::now() {
                return Ok(Some(cached.record.clone()));
            }
        }
        let record = self.fetch(instance_id).await?;
        match &record {
            Some(record) => self.remember(instance_id, record.clone(), generation),
            None => {
                self.records.remove(instance_id);
            }
        }
        Ok(record)
    }

    /// Resolve the inventory name of `instance_id` and read its live record
    async fn fetch(&self, instance_id: &str) -> Result<Option<InventoryRecord>> {
        let Some(name) = self.api.system_name(instance_id).await? else {
            return Ok(None);
        };
        let system = self.api.get_system(&name).await?;
        Ok(system.map(|system| InventoryRecord { name, system }))
    }

    fn remember(&self, instance_id: &str, record: InventoryRecord, generation: Generation) {
        self.records.insert(
            instance_id.to_string(),
            CachedRecord {
                record,
                generation,
                expires_at: Instant::now() + self.record_ttl,
            },
        );
    }

    /// Overlay hostname and tags from inventory onto a provider instance
    ///
    /// Without a record the instance keeps no hostname and no tags; the
    /// provider's display name is never promoted to hostname.
    pub async fn enrich(&self, instance: Instance) -> Result<Instance> {
        match self.lookup(&instance.id).await? {
            Some(record) => {
                let hostname = Some(record.system.fqdn.clone());
                Ok(instance
                    .with_hostname(hostname)
                    .with_tags(record.system.tags))
            }
            None => Ok(instance.with_hostname(None).with_tags(Vec::<String>::new())),
        }
    }

    /// Create the inventory record for a freshly created instance
    ///
    /// Returns the fqdn the inventory assigned. An instance the inventory
    /// has no name for cannot be registered and is an upstream failure.
    pub async fn register(&self, instance_id: &str, roles: &[String]) -> Result<String> {
        let name = self.api.system_name(instance_id).await?.ok_or_else(|| {
            CloudError::upstream(
                "register instance",
                instance_id,
                "inventory assigned no name",
            )
        })?;
        let system = InventorySystem::new(&name)
            .with_pic_instance(instance_id)
            .with_roles(roles.iter().cloned());
        self.api.put_system(&system).await?;
        tracing::info!("Registered instance {} in inventory as {}", instance_id, name);
        self.cache.invalidate(instance_id);
        self.remember(
            instance_id,
            InventoryRecord {
                name: name.clone(),
                system,
            },
            self.cache.generation(instance_id),
        );
        Ok(name)
    }

    pub async fn tags(&self, instance_id: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .lookup(instance_id)
            .await?
            .map(|record| record.system.tags)
            .unwrap_or_default())
    }

    pub async fn add_tag(&self, instance_id: &str, tag: &str) -> Result<TagUpdateStatus> {
        self.update_tags(instance_id, |system| system.add_tag(tag)).await
    }

    pub async fn delete_tag(&self, instance_id: &str, tag: &str) -> Result<TagUpdateStatus> {
        self.update_tags(instance_id, |system| system.delete_tag(tag)).await
    }

    async fn update_tags<F>(&self, instance_id: &str, mutate: F) -> Result<TagUpdateStatus>
    where
        F: FnOnce(&mut InventorySystem) -> bool + Send,
    {
        let generation = self.cache.generation(instance_id);
        let Some(mut record) = self.fetch(instance_id).await? else {
            self.records.remove(instance_id);
            return Ok(TagUpdateStatus::NotFound);
        };
        if mutate(&mut record.system) {
            self.api.put_system(&record.system).await?;
            tracing::debug!("Updated tags of {} to {:?}", record.name, record.system.tags);
            self.cache.invalidate(instance_id);
            self.remember(instance_id, record, self.cache.generation(instance_id));
        } else {
            self.remember(instance_id, record, generation);
        }
        Ok(TagUpdateStatus::Updated)
    }
}
