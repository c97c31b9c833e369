//! Provider-native compute client seam
//!
//! A [`ComputeClient`] is the thin layer that talks to one cloud's own
//! API. Everything above it (catalog, cache, inventory enrichment) is
//! provider independent.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw compute API of a single provider
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Native provider identifier (e.g., "openstack-nova", "memory")
    fn provider(&self) -> &str;

    /// All nodes visible to the configured account
    async fn list_nodes(&self) -> Result<Vec<NodeMetadata>>;

    /// A single node, `None` when the provider does not know the id
    async fn get_node(&self, id: &str) -> Result<Option<NodeMetadata>>;

    /// Create `count` nodes from `template`
    ///
    /// A failure of any node is reported as an error for the whole call.
    async fn create_nodes(&self, template: &NodeTemplate, count: u32)
    -> Result<Vec<NodeMetadata>>;

    async fn destroy_node(&self, id: &str) -> Result<()>;

    async fn list_hardware(&self) -> Result<Vec<HardwareProfile>>;

    async fn list_locations(&self) -> Result<Vec<ProviderLocation>>;

    async fn list_images(&self) -> Result<Vec<ImageInfo>>;

    /// Build the image reference a creation request must carry
    ///
    /// Providers that scope images by region expect `root/image`.
    fn qualify_image(&self, root_location: &str, image_id: &str) -> String {
        format!("{}/{}", root_location, image_id)
    }
}

/// Node as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub id: String,
    pub name: String,
    /// Hardware profile id or name, whichever the provider reports
    pub hardware: Option<String>,
    /// Provider status string, normalized later
    pub status: String,
    pub location: Option<String>,
}

/// Hardware profile as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub id: String,
    pub name: String,
    pub cores: f64,
    pub ram_mb: u64,
    pub disk_gb: f64,
    pub location: Option<String>,
}

/// How far up the provider hierarchy a location sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationScope {
    Provider,
    Region,
    Zone,
    Host,
}

impl std::fmt::Display for LocationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationScope::Provider => write!(f, "provider"),
            LocationScope::Region => write!(f, "region"),
            LocationScope::Zone => write!(f, "zone"),
            LocationScope::Host => write!(f, "host"),
        }
    }
}

/// Location node of the provider's location graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderLocation {
    pub id: String,
    pub description: String,
    pub scope: LocationScope,
    pub parent: Option<String>,
}

impl ProviderLocation {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        scope: LocationScope,
        parent: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            scope,
            parent: parent.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    pub name: String,
}

/// Everything a provider needs to create nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    /// Group / name prefix for the new nodes
    pub group: String,
    /// Provider hardware id
    pub hardware: String,
    /// Qualified image reference (see [`ComputeClient::qualify_image`])
    pub image: String,
    pub location: String,
}
