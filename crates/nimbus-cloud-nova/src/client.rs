//! OpenStack Nova compute client
//!
//! Authenticates once against Keystone v2.0 with password credentials
//! and sends the issued token as `X-Auth-Token` on every compute call.

use crate::error::{NovaError, Result};
use async_trait::async_trait;
use nimbus_cloud::{
    CloudError, ComputeClient, HardwareProfile, ImageInfo, LocationScope, NodeMetadata,
    NodeTemplate, ProviderLocation,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const NOVA_PROVIDER: &str = "openstack-nova";

/// Id of the provider-scoped root location every region hangs off
pub const NOVA_ROOT_LOCATION: &str = "openstack-nova";

const AUTH_HEADER: &str = "X-Auth-Token";

/// Connection settings for one Nova deployment
#[derive(Debug, Clone)]
pub struct NovaConfig {
    /// Keystone v2.0 endpoint, e.g. `https://keystone:5000/v2.0`
    pub identity_endpoint: String,
    /// Compute endpoint; taken from the service catalog when unset
    pub compute_endpoint: Option<String>,
    pub user: String,
    pub password: String,
    pub tenant: String,
    pub region: String,
}

pub struct NovaClient {
    http: reqwest::Client,
    compute_url: String,
    token: String,
    region: String,
}

impl NovaClient {
    /// Authenticate and resolve the compute endpoint
    // TODO: re-authenticate on 401 once tokens outlive a single process run
    pub async fn connect(config: NovaConfig) -> Result<Self> {
        let http = reqwest::Client::new();
        let url = format!("{}/tokens", config.identity_endpoint.trim_end_matches('/'));
        let request = TokenRequest {
            auth: AuthBody {
                password_credentials: PasswordCredentials {
                    username: config.user.clone(),
                    password: config.password.clone(),
                },
                tenant_name: config.tenant.clone(),
            },
        };

        tracing::debug!("Authenticating {} against {}", config.user, url);
        let response = http.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NovaError::AuthenticationFailed(format!("{}: {}", status, body)));
        }
        let access: TokenResponse = response.json().await?;

        let compute_url = match &config.compute_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => access
                .access
                .service_catalog
                .iter()
                .filter(|service| service.r#type == "compute")
                .flat_map(|service| service.endpoints.iter())
                .find(|endpoint| endpoint.region.as_deref() == Some(config.region.as_str()))
                .map(|endpoint| endpoint.public_url.clone())
                .ok_or_else(|| NovaError::NoComputeEndpoint(config.region.clone()))?,
        };

        tracing::info!("Connected to Nova at {} ({})", compute_url, config.region);
        Ok(Self {
            http,
            compute_url: compute_url.trim_end_matches('/').to_string(),
            token: access.access.token.id,
            region: config.region,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.compute_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    pub async fn list_servers(&self) -> Result<Vec<Server>> {
        let servers: ServersResponse = self.get_json("/servers/detail").await?;
        Ok(servers.servers)
    }

    /// `None` when Nova answers 404
    pub async fn get_server(&self, id: &str) -> Result<Option<Server>> {
        let response = self
            .http
            .get(self.url(&format!("/servers/{}", id)))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response).await?;
        let server: ServerResponse = response.json().await?;
        Ok(Some(server.server))
    }

    pub async fn create_server(&self, request: CreateServer) -> Result<Server> {
        let name = request.name.clone();
        let zone = request.availability_zone.clone();
        let flavor = request.flavor_ref.clone();
        let response = self
            .http
            .post(self.url("/servers"))
            .header(AUTH_HEADER, &self.token)
            .json(&CreateServerRequest { server: request })
            .send()
            .await?;
        let response = check(response).await?;
        let created: CreatedServerResponse = response.json().await?;

        // the creation response only carries the id
        Ok(Server {
            id: created.server.id,
            name,
            status: "BUILD".to_string(),
            flavor: Some(FlavorRef { id: flavor }),
            availability_zone: zone,
        })
    }

    pub async fn delete_server(&self, id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/servers/{}", id)))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let flavors: FlavorsResponse = self.get_json("/flavors/detail").await?;
        Ok(flavors.flavors)
    }

    /// Names of the availability zones currently accepting servers
    pub async fn list_zones(&self) -> Result<Vec<String>> {
        let zones: ZonesResponse = self.get_json("/os-availability-zone").await?;
        Ok(zones
            .availability_zone_info
            .into_iter()
            .filter(|zone| zone.zone_state.available)
            .map(|zone| zone.zone_name)
            .collect())
    }

    pub async fn images(&self) -> Result<Vec<Image>> {
        let images: ImagesResponse = self.get_json("/images/detail").await?;
        Ok(images.images)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(NovaError::Api {
        status: status.as_u16(),
        body,
    })
}

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
        .unwrap_or_default();
    format!("{:08x}", nanos)
}

impl From<Server> for NodeMetadata {
    fn from(server: Server) -> Self {
        NodeMetadata {
            id: server.id,
            name: server.name,
            hardware: server.flavor.map(|f| f.id),
            status: server.status,
            location: server.availability_zone,
        }
    }
}

#[async_trait]
impl ComputeClient for NovaClient {
    fn provider(&self) -> &str {
        NOVA_PROVIDER
    }

    async fn list_nodes(&self) -> nimbus_cloud::Result<Vec<NodeMetadata>> {
        let servers = self
            .list_servers()
            .await
            .map_err(|e| CloudError::upstream("list servers", &self.region, e))?;
        Ok(servers.into_iter().map(NodeMetadata::from).collect())
    }

    async fn get_node(&self, id: &str) -> nimbus_cloud::Result<Option<NodeMetadata>> {
        let server = self
            .get_server(id)
            .await
            .map_err(|e| CloudError::upstream("get server", id, e))?;
        Ok(server.map(NodeMetadata::from))
    }

    async fn create_nodes(
        &self,
        template: &NodeTemplate,
        count: u32,
    ) -> nimbus_cloud::Result<Vec<NodeMetadata>> {
        let mut created = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let request = CreateServer {
                name: format!("{}-{}", template.group, unique_suffix()),
                image_ref: template.image.clone(),
                flavor_ref: template.hardware.clone(),
                availability_zone: Some(template.location.clone()),
            };
            let server = self
                .create_server(request)
                .await
                .map_err(|e| CloudError::upstream("create server", &template.group, e))?;
            tracing::debug!("Nova accepted server {} ({})", server.id, server.name);
            created.push(NodeMetadata::from(server));
        }
        Ok(created)
    }

    async fn destroy_node(&self, id: &str) -> nimbus_cloud::Result<()> {
        self.delete_server(id)
            .await
            .map_err(|e| CloudError::upstream("delete server", id, e))
    }

    async fn list_hardware(&self) -> nimbus_cloud::Result<Vec<HardwareProfile>> {
        let flavors = self
            .list_flavors()
            .await
            .map_err(|e| CloudError::upstream("list flavors", &self.region, e))?;
        Ok(flavors
            .into_iter()
            .map(|flavor| HardwareProfile {
                id: flavor.id,
                name: flavor.name,
                cores: flavor.vcpus as f64,
                ram_mb: flavor.ram,
                disk_gb: flavor.disk as f64,
                location: None,
            })
            .collect())
    }

    async fn list_locations(&self) -> nimbus_cloud::Result<Vec<ProviderLocation>> {
        let zones = self
            .list_zones()
            .await
            .map_err(|e| CloudError::upstream("list availability zones", &self.region, e))?;

        let mut locations = vec![
            ProviderLocation::new(NOVA_ROOT_LOCATION, "OpenStack Nova", LocationScope::Provider, None),
            ProviderLocation::new(
                &self.region,
                format!("Region {}", self.region),
                LocationScope::Region,
                Some(NOVA_ROOT_LOCATION),
            ),
        ];
        for zone in zones {
            if zone == self.region || zone == NOVA_ROOT_LOCATION {
                tracing::warn!(
                    "Skipping availability zone '{}': id already used by the location graph",
                    zone
                );
                continue;
            }
            let description = format!("Availability zone {}", zone);
            locations.push(ProviderLocation::new(
                zone,
                description,
                LocationScope::Zone,
                Some(self.region.as_str()),
            ));
        }
        Ok(locations)
    }

    async fn list_images(&self) -> nimbus_cloud::Result<Vec<ImageInfo>> {
        let images = self
            .images()
            .await
            .map_err(|e| CloudError::upstream("list images", &self.region, e))?;
        Ok(images
            .into_iter()
            .map(|image| ImageInfo {
                id: image.id,
                name: image.name,
            })
            .collect())
    }

    /// Nova takes the bare image id
    fn qualify_image(&self, _root_location: &str, image_id: &str) -> String {
        image_id.to_string()
    }
}

// ============ API Types ============

#[derive(Debug, Serialize)]
struct TokenRequest {
    auth: AuthBody,
}

#[derive(Debug, Serialize)]
struct AuthBody {
    #[serde(rename = "passwordCredentials")]
    password_credentials: PasswordCredentials,
    #[serde(rename = "tenantName")]
    tenant_name: String,
}

#[derive(Debug, Serialize)]
struct PasswordCredentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogService>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    r#type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub flavor: Option<FlavorRef>,
    #[serde(rename = "OS-EXT-AZ:availability_zone", default)]
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlavorRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct ServerResponse {
    server: Server,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateServer {
    pub name: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateServerRequest {
    server: CreateServer,
}

#[derive(Debug, Deserialize)]
struct CreatedServerResponse {
    server: CreatedServer,
}

#[derive(Debug, Deserialize)]
struct CreatedServer {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub vcpus: u32,
    /// MB
    pub ram: u64,
    /// GB
    pub disk: u64,
}

#[derive(Debug, Deserialize)]
struct FlavorsResponse {
    flavors: Vec<Flavor>,
}

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    #[serde(rename = "availabilityZoneInfo")]
    availability_zone_info: Vec<ZoneInfo>,
}

#[derive(Debug, Deserialize)]
struct ZoneInfo {
    #[serde(rename = "zoneName")]
    zone_name: String,
    #[serde(rename = "zoneState")]
    zone_state: ZoneState,
}

#[derive(Debug, Deserialize)]
struct ZoneState {
    available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    images: Vec<Image>,
}
