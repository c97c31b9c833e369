//! Instance connector
//!
//! One connector fronts one provider: it owns the provider's catalog,
//! the reconciliation cache for its instances and the inventory bridge
//! that fills in hostnames and tags.

use crate::cache::{CachePolicy, ReconciliationCache};
use crate::catalog::Catalog;
use crate::compute::{ComputeClient, NodeMetadata, NodeTemplate};
use crate::error::{CloudError, Result};
use crate::inventory::{InventoryApi, InventoryBridge};
use crate::model::{
    DestructionStatus, Instance, InstanceStatus, Location, Size, TagUpdateStatus,
};
use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Instance lifecycle operations of a single provider
#[async_trait]
pub trait InstanceConnector: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Location used when a caller does not pick one
    fn default_location(&self) -> Option<&str> {
        None
    }

    /// Create one instance and register it with the inventory
    ///
    /// Returns the provider-assigned id. Does not wait for the instance
    /// to become active.
    async fn create_instance(
        &self,
        size: &str,
        name_prefix: &str,
        location: &str,
        roles: &[String],
    ) -> Result<String>;

    async fn get_instance(&self, id: &str) -> Result<Option<Instance>>;

    /// Every live instance, fetched lazily when the stream is first polled
    fn get_all_instances(&self) -> BoxStream<'_, Result<Instance>>;

    async fn destroy_instance(&self, id: &str) -> Result<DestructionStatus>;

    fn get_sizes(&self, location: &str) -> Vec<Size>;

    fn get_locations(&self) -> Vec<Location>;

    fn get_location(&self, id: &str) -> Option<Location>;

    async fn add_tag(&self, id: &str, tag: &str) -> Result<TagUpdateStatus>;

    async fn delete_tag(&self, id: &str, tag: &str) -> Result<TagUpdateStatus>;
}

/// Startup settings of a [`ComputeConnector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSettings {
    /// Display name
    pub name: String,
    /// Image new instances boot from, by id or name
    pub default_image_id: String,
    pub default_location_id: Option<String>,
}

impl ConnectorSettings {
    pub fn new(name: impl Into<String>, default_image_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_image_id: default_image_id.into(),
            default_location_id: None,
        }
    }

    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location_id = Some(location.into());
        self
    }
}

/// [`InstanceConnector`] over any [`ComputeClient`]
pub struct ComputeConnector {
    settings: ConnectorSettings,
    client: Arc<dyn ComputeClient>,
    catalog: Catalog,
    image_id: String,
    cache: Arc<ReconciliationCache>,
    inventory: InventoryBridge,
}

impl ComputeConnector {
    /// Load the provider's catalog and check the configured defaults against it
    pub async fn connect(
        settings: ConnectorSettings,
        client: Arc<dyn ComputeClient>,
        inventory: Arc<dyn InventoryApi>,
        policy: CachePolicy,
    ) -> Result<Self> {
        tracing::info!(
            "Connecting to {} provider '{}'",
            client.provider(),
            settings.name
        );

        let locations = client.list_locations().await?;
        let hardware = client.list_hardware().await?;
        let catalog = Catalog::build(locations, hardware)?;

        let images = client.list_images().await?;
        let image = images
            .iter()
            .find(|i| i.id == settings.default_image_id || i.name == settings.default_image_id)
            .ok_or_else(|| {
                CloudError::Configuration(format!(
                    "default image '{}' not found on provider '{}'",
                    settings.default_image_id, settings.name
                ))
            })?;
        let image_id = image.id.clone();

        if let Some(location) = &settings.default_location_id {
            if catalog.location(location).is_none() {
                return Err(CloudError::Configuration(format!(
                    "default location '{}' not found on provider '{}'",
                    location, settings.name
                )));
            }
        }

        let cache = Arc::new(ReconciliationCache::new(policy));
        let inventory =
            InventoryBridge::new(inventory, cache.clone()).with_record_ttl(policy.inventory_ttl);

        tracing::debug!(
            "Provider '{}' ready with image {} and {} locations",
            settings.name,
            image_id,
            catalog.locations().len()
        );

        Ok(Self {
            settings,
            client,
            catalog,
            image_id,
            cache,
            inventory,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> &ReconciliationCache {
        &self.cache
    }

    fn to_instance(&self, node: NodeMetadata) -> Instance {
        let size = node
            .hardware
            .as_deref()
            .map(|h| self.catalog.hardware_name(h).to_string())
            .unwrap_or_default();
        let status = InstanceStatus::from_provider(&node.status);
        let instance = Instance::new(node.id, node.name, size, status);
        match node.location {
            Some(reported) => {
                let location = self
                    .catalog
                    .region_or_zone(&reported)
                    .map(|l| l.id.clone())
                    .unwrap_or(reported);
                instance.with_location(location)
            }
            None => instance,
        }
    }

    async fn load(&self, id: &str) -> Result<Option<Instance>> {
        match self.client.get_node(id).await? {
            Some(node) => {
                let instance = self.inventory.enrich(self.to_instance(node)).await?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    /// Use the cached view of a listed node when it is still fresh
    async fn reconcile(&self, node: NodeMetadata) -> Result<Instance> {
        if let Some(cached) = self.cache.peek(&node.id) {
            return Ok(cached);
        }
        let generation = self.cache.generation(&node.id);
        let instance = self.inventory.enrich(self.to_instance(node)).await?;
        self.cache.store_if_current(instance.clone(), generation);
        Ok(instance)
    }
}

#[async_trait]
impl InstanceConnector for ComputeConnector {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn default_location(&self) -> Option<&str> {
        self.settings.default_location_id.as_deref()
    }

    async fn create_instance(
        &self,
        size: &str,
        name_prefix: &str,
        location: &str,
        roles: &[String],
    ) -> Result<String> {
        if self.catalog.location(location).is_none() {
            return Err(CloudError::LocationUnavailable(location.to_string()));
        }
        if self.catalog.size(location, size).is_none() {
            return Err(CloudError::SizeUnavailable(size.to_string()));
        }
        let hardware = self
            .catalog
            .hardware(location, size)
            .ok_or_else(|| CloudError::SizeUnavailable(size.to_string()))?;
        let root = self
            .catalog
            .provider_root(location)
            .ok_or_else(|| CloudError::LocationUnavailable(location.to_string()))?;

        let template = NodeTemplate {
            group: name_prefix.to_string(),
            hardware: hardware.id.clone(),
            image: self.client.qualify_image(&root.id, &self.image_id),
            location: location.to_string(),
        };

        tracing::info!(
            "Creating {} instance '{}' in {} on provider '{}'",
            size,
            name_prefix,
            location,
            self.settings.name
        );
        let mut nodes = self.client.create_nodes(&template, 1).await?;
        if nodes.len() != 1 {
            return Err(CloudError::upstream(
                "create instance",
                location,
                format!("provider returned {} nodes for a single request", nodes.len()),
            ));
        }
        let node = nodes.remove(0);
        let id = node.id.clone();

        self.inventory.register(&id, roles).await?;
        let generation = self.cache.generation(&id);
        let instance = self.inventory.enrich(self.to_instance(node)).await?;
        self.cache.store_if_current(instance, generation);

        tracing::info!("Created instance {} on provider '{}'", id, self.settings.name);
        Ok(id)
    }

    async fn get_instance(&self, id: &str) -> Result<Option<Instance>> {
        self.cache.get_or_load(id, || self.load(id)).await
    }

    fn get_all_instances(&self) -> BoxStream<'_, Result<Instance>> {
        stream::once(self.client.list_nodes())
            .map_ok(|nodes| stream::iter(nodes.into_iter().map(Ok::<_, CloudError>)))
            .try_flatten()
            .try_filter(|node| {
                future::ready(!InstanceStatus::from_provider(&node.status).is_terminal())
            })
            .and_then(move |node| self.reconcile(node))
            .boxed()
    }

    async fn destroy_instance(&self, id: &str) -> Result<DestructionStatus> {
        let outcome = match self.client.get_node(id).await {
            Ok(Some(node)) if !InstanceStatus::from_provider(&node.status).is_terminal() => {
                tracing::info!("Destroying instance {} on provider '{}'", id, self.settings.name);
                self.client
                    .destroy_node(id)
                    .await
                    .map(|_| DestructionStatus::Destroyed)
            }
            Ok(_) => Ok(DestructionStatus::NotFound),
            Err(e) => Err(e),
        };
        self.cache.invalidate(id);
        outcome
    }

    fn get_sizes(&self, location: &str) -> Vec<Size> {
        self.catalog.sizes(location)
    }

    fn get_locations(&self) -> Vec<Location> {
        self.catalog.locations()
    }

    fn get_location(&self, id: &str) -> Option<Location> {
        self.catalog.location(id)
    }

    async fn add_tag(&self, id: &str, tag: &str) -> Result<TagUpdateStatus> {
        if self.get_instance(id).await?.is_none() {
            return Ok(TagUpdateStatus::NotFound);
        }
        self.inventory.add_tag(id, tag).await
    }

    async fn delete_tag(&self, id: &str, tag: &str) -> Result<TagUpdateStatus> {
        if self.get_instance(id).await?.is_none() {
            return Ok(TagUpdateStatus::NotFound);
        }
        self.inventory.delete_tag(id, tag).await
    }
}
