//! Provider registry
//!
//! Fixed, ordered set of named connectors built at startup. Instance ids
//! are only unique within a provider, so lookups try providers in
//! registration order and stop at the first hit.

use crate::connector::InstanceConnector;
use crate::error::{CloudError, Result};
use crate::model::{
    DestructionStatus, Instance, InstanceCreationRequest, Location, ProviderInfo, Size,
    TagUpdateStatus,
};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;

pub struct ProviderRegistry {
    bindings: Vec<(String, Arc<dyn InstanceConnector>)>,
}

impl ProviderRegistry {
    pub fn new(bindings: Vec<(String, Arc<dyn InstanceConnector>)>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (name, _) in &bindings {
            if name.trim().is_empty() {
                return Err(CloudError::Configuration(
                    "provider name must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(CloudError::Configuration(format!(
                    "provider '{}' is bound more than once",
                    name
                )));
            }
        }
        tracing::info!(
            "Provider registry ready: {}",
            bindings
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { bindings })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| name.as_str())
    }

    pub fn connector(&self, name: &str) -> Option<&Arc<dyn InstanceConnector>> {
        self.bindings
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, connector)| connector)
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.bindings
            .iter()
            .map(|(name, connector)| provider_info(name, connector.as_ref()))
            .collect()
    }

    pub fn provider(&self, name: &str) -> Option<ProviderInfo> {
        self.connector(name)
            .map(|connector| provider_info(name, connector.as_ref()))
    }

    pub fn location(&self, provider: &str, id: &str) -> Option<Location> {
        self.connector(provider)?.get_location(id)
    }

    /// Sizes at a provider's location; `None` if either is unknown
    pub fn sizes(&self, provider: &str, location: &str) -> Option<Vec<Size>> {
        let connector = self.connector(provider)?;
        connector.get_location(location)?;
        Some(connector.get_sizes(location))
    }

    /// Instances of every provider, in registration order
    pub fn list_all(&self) -> BoxStream<'_, Result<Instance>> {
        stream::iter(self.bindings.iter())
            .flat_map(|(name, connector)| {
                connector
                    .get_all_instances()
                    .map_ok(move |instance| instance.with_provider(name.as_str()))
            })
            .boxed()
    }

    /// Validate the request against the catalogs, then create and read back
    ///
    /// Checks run provider, location, size; the first failing check wins
    /// and nothing is sent to a provider.
    pub async fn create(&self, request: &InstanceCreationRequest) -> Result<Instance> {
        request.validate()?;

        let connector = self
            .connector(&request.provider)
            .ok_or_else(|| CloudError::ProviderUnavailable(request.provider.clone()))?;
        if connector.get_location(&request.location).is_none() {
            return Err(CloudError::LocationUnavailable(request.location.clone()));
        }
        if !connector
            .get_sizes(&request.location)
            .iter()
            .any(|size| size.name == request.size)
        {
            return Err(CloudError::SizeUnavailable(request.size.clone()));
        }

        let id = connector
            .create_instance(
                &request.size,
                &request.name_prefix,
                &request.location,
                &request.roles,
            )
            .await?;
        let instance = connector.get_instance(&id).await?.ok_or_else(|| {
            CloudError::upstream("create instance", &id, "instance not visible after creation")
        })?;
        Ok(instance.with_provider(request.provider.as_str()))
    }

    pub async fn find_first(&self, id: &str) -> Result<Option<Instance>> {
        for (name, connector) in &self.bindings {
            if let Some(instance) = connector.get_instance(id).await? {
                return Ok(Some(instance.with_provider(name.as_str())));
            }
        }
        Ok(None)
    }

    pub async fn destroy_first(&self, id: &str) -> Result<DestructionStatus> {
        for (name, connector) in &self.bindings {
            if connector.destroy_instance(id).await? == DestructionStatus::Destroyed {
                tracing::info!("Destroyed instance {} on provider '{}'", id, name);
                return Ok(DestructionStatus::Destroyed);
            }
        }
        Ok(DestructionStatus::NotFound)
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<TagUpdateStatus> {
        for (_, connector) in &self.bindings {
            if connector.add_tag(id, tag).await? == TagUpdateStatus::Updated {
                return Ok(TagUpdateStatus::Updated);
            }
        }
        Ok(TagUpdateStatus::NotFound)
    }

    pub async fn delete_tag(&self, id: &str, tag: &str) -> Result<TagUpdateStatus> {
        for (_, connector) in &self.bindings {
            if connector.delete_tag(id, tag).await? == TagUpdateStatus::Updated {
                return Ok(TagUpdateStatus::Updated);
            }
        }
        Ok(TagUpdateStatus::NotFound)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

fn provider_info(name: &str, connector: &dyn InstanceConnector) -> ProviderInfo {
    ProviderInfo {
        provider: name.to_string(),
        name: connector.name().to_string(),
        locations: connector.get_locations(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::connector::{ComputeConnector, ConnectorSettings};
    use crate::memory::{MEMORY_IMAGE, MEMORY_ZONE, MemoryCompute, MemoryInventory};

    async fn memory_connector(name: &str) -> Arc<dyn InstanceConnector> {
        Arc::new(
            ComputeConnector::connect(
                ConnectorSettings::new(name, MEMORY_IMAGE),
                Arc::new(MemoryCompute::new()),
                Arc::new(MemoryInventory::new("example.com")),
                CachePolicy::default(),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_rejects_duplicate_and_blank_names() {
        let a = memory_connector("A").await;
        let result = ProviderRegistry::new(vec![
            ("lab".to_string(), a.clone()),
            ("lab".to_string(), a.clone()),
        ]);
        assert!(matches!(result, Err(CloudError::Configuration(_))));

        let result = ProviderRegistry::new(vec![(" ".to_string(), a)]);
        assert!(matches!(result, Err(CloudError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_debug_lists_bound_names() {
        let registry = ProviderRegistry::new(vec![
            ("lab".to_string(), memory_connector("Lab").await),
            ("edge".to_string(), memory_connector("Edge").await),
        ])
        .unwrap();
        assert_eq!(
            format!("{:?}", registry),
            r#"ProviderRegistry { providers: ["lab", "edge"] }"#
        );
    }

    #[tokio::test]
    async fn test_provider_views() {
        let registry = ProviderRegistry::new(vec![
            ("lab".to_string(), memory_connector("Lab").await),
            ("edge".to_string(), memory_connector("Edge").await),
        ])
        .unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["lab", "edge"]);
        let info = registry.provider("edge").unwrap();
        assert_eq!(info.name, "Edge");
        assert_eq!(info.locations.len(), 2);
        assert_eq!(registry.providers().len(), 2);
        assert!(registry.provider("missing").is_none());

        assert_eq!(registry.sizes("lab", MEMORY_ZONE).unwrap().len(), 4);
        assert!(registry.sizes("lab", "nowhere").is_none());
        assert!(registry.location("lab", MEMORY_ZONE).is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_provider_first() {
        let registry =
            ProviderRegistry::new(vec![("lab".to_string(), memory_connector("Lab").await)])
                .unwrap();
        let request = InstanceCreationRequest::new("other", "nowhere", "m9.huge", "web");
        let err = registry.create(&request).await.unwrap_err();
        assert_eq!(
            err.creation_error(),
            Some(crate::model::InstanceCreationError::ProviderUnavailable)
        );

        let request = InstanceCreationRequest::new("lab", MEMORY_ZONE, "m9.huge", "web");
        let err = registry.create(&request).await.unwrap_err();
        assert!(matches!(err, CloudError::SizeUnavailable(_)));
    }

    #[tokio::test]
    async fn test_list_all_tags_provider() {
        let registry = ProviderRegistry::new(vec![
            ("lab".to_string(), memory_connector("Lab").await),
            ("edge".to_string(), memory_connector("Edge").await),
        ])
        .unwrap();
        registry
            .create(&InstanceCreationRequest::new("lab", MEMORY_ZONE, "m1.tiny", "a"))
            .await
            .unwrap();
        registry
            .create(&InstanceCreationRequest::new("edge", MEMORY_ZONE, "m1.tiny", "b"))
            .await
            .unwrap();

        let all: Vec<Instance> = registry.list_all().try_collect().await.unwrap();
        let providers: Vec<_> = all.iter().map(|i| i.provider.as_deref()).collect();
        assert_eq!(providers, vec![Some("lab"), Some("edge")]);
    }
}
