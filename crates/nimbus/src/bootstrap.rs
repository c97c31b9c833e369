//! Registry assembly from settings

use anyhow::{Context, anyhow};
use nimbus_cloud::memory::{MEMORY_IMAGE, MEMORY_ZONE};
use nimbus_cloud::{
    CachePolicy, ComputeClient, ComputeConnector, ConnectorSettings, InstanceConnector,
    InventoryApi, MemoryCompute, MemoryInventory, ProviderRegistry,
};
use nimbus_cloud_nova::{NovaClient, NovaConfig};
use nimbus_config::{ProviderKind, ProviderSettings, Settings};
use nimbus_inventory::{InventoryClient, InventoryClientConfig};
use std::sync::Arc;

/// Domain of hostnames handed out by the in-memory inventory
pub const MEMORY_INVENTORY_DOMAIN: &str = "nimbus.local";

/// Connect every configured provider, in settings order
///
/// A provider that fails to connect aborts startup.
pub async fn build_registry(settings: &Settings) -> anyhow::Result<ProviderRegistry> {
    let inventory = build_inventory(settings)?;
    let policy = CachePolicy {
        active_ttl: settings.cache.active_ttl(),
        transient_ttl: settings.cache.transient_ttl(),
        inventory_ttl: settings.cache.inventory_ttl(),
    };

    let mut bindings = Vec::with_capacity(settings.providers.len());
    for name in &settings.providers {
        let section = settings
            .provider_settings(name)
            .ok_or_else(|| anyhow!("No settings section for provider '{}'", name))?;
        let connector = connect_provider(name, section, inventory.clone(), policy)
            .await
            .with_context(|| format!("Failed to start provider '{}'", name))?;
        tracing::info!(provider = %name, "Provider connected");
        bindings.push((name.clone(), Arc::new(connector) as Arc<dyn InstanceConnector>));
    }

    Ok(ProviderRegistry::new(bindings)?)
}

fn build_inventory(settings: &Settings) -> anyhow::Result<Arc<dyn InventoryApi>> {
    match &settings.inventory {
        Some(inventory) => {
            let client = InventoryClient::new(InventoryClientConfig {
                base_uri: inventory.base_uri.clone(),
                user: inventory.user.clone(),
                password: inventory.password.clone(),
            })?;
            tracing::debug!("Using inventory at {}", client.base_uri());
            Ok(Arc::new(client))
        }
        None => {
            tracing::info!(
                "No inventory configured, hostnames and tags live in memory for this run"
            );
            Ok(Arc::new(MemoryInventory::new(MEMORY_INVENTORY_DOMAIN)))
        }
    }
}

async fn connect_provider(
    name: &str,
    section: &ProviderSettings,
    inventory: Arc<dyn InventoryApi>,
    policy: CachePolicy,
) -> anyhow::Result<ComputeConnector> {
    let (client, image, default_location): (Arc<dyn ComputeClient>, String, Option<String>) =
        match section.kind {
            ProviderKind::Memory => (
                Arc::new(MemoryCompute::new()) as Arc<dyn ComputeClient>,
                section
                    .default_image_id
                    .clone()
                    .unwrap_or_else(|| MEMORY_IMAGE.to_string()),
                Some(
                    section
                        .default_location_id
                        .clone()
                        .unwrap_or_else(|| MEMORY_ZONE.to_string()),
                ),
            ),
            ProviderKind::Nova => {
                let config = NovaConfig {
                    identity_endpoint: required(name, "identity_endpoint", &section.identity_endpoint)?,
                    compute_endpoint: section.endpoint.clone(),
                    user: required(name, "user", &section.user)?,
                    password: required(name, "secret", &section.secret)?,
                    tenant: required(name, "tenant", &section.tenant)?,
                    region: required(name, "region", &section.region)?,
                };
                tracing::info!(provider = %name, "Authenticating against {}", config.identity_endpoint);
                (
                    Arc::new(NovaClient::connect(config).await?) as Arc<dyn ComputeClient>,
                    required(name, "default_image_id", &section.default_image_id)?,
                    section.default_location_id.clone(),
                )
            }
        };

    let mut connector_settings = ConnectorSettings::new(section.display_name(name), image);
    if let Some(location) = default_location {
        connector_settings = connector_settings.with_default_location(location);
    }
    Ok(ComputeConnector::connect(connector_settings, client, inventory, policy).await?)
}

fn required(provider: &str, field: &str, value: &Option<String>) -> anyhow::Result<String> {
    value
        .clone()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("provider.{}.{} is required", provider, field))
}
