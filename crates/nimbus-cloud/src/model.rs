//! Domain types shared by every provider

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle status of an instance, normalized from the provider's own vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Accepted by the provider, nothing scheduled yet
    Requested,
    /// Being built / pending
    Building,
    /// Active / running
    Active,
    /// Terminated or deleted
    Terminated,
    /// Anything the provider reports that we do not recognize
    Unknown,
}

impl InstanceStatus {
    /// Normalize a provider-reported status string
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "REQUESTED" => InstanceStatus::Requested,
            "BUILD" | "BUILDING" | "PENDING" | "REBUILD" => InstanceStatus::Building,
            "ACTIVE" | "RUNNING" => InstanceStatus::Active,
            "TERMINATED" | "DELETED" | "SOFT_DELETED" => InstanceStatus::Terminated,
            _ => InstanceStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Terminated)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Requested => write!(f, "REQUESTED"),
            InstanceStatus::Building => write!(f, "BUILDING"),
            InstanceStatus::Active => write!(f, "ACTIVE"),
            InstanceStatus::Terminated => write!(f, "TERMINATED"),
            InstanceStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A compute instance as presented to callers
///
/// Provider, hostname and tags are filled in after the fact by the
/// registry and the inventory bridge; the provider's own display name is
/// never used as the hostname.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub size: String,
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Instance {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        size: impl Into<String>,
        status: InstanceStatus,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: size.into(),
            status,
            provider: None,
            location: None,
            hostname: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Instance {}

/// A hardware profile ("size") offered by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub name: String,
    pub cores: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    /// Location this profile is restricted to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Size {
    pub fn new(name: impl Into<String>, cores: u32, memory_mb: u64, disk_gb: u64) -> Self {
        Self {
            name: name.into(),
            cores,
            memory_mb,
            disk_gb,
            location: None,
        }
    }

    pub fn in_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Rough relative cost: cores + memory in GB + disk in TB
    pub fn cost(&self) -> f64 {
        self.cores as f64 + self.memory_mb as f64 / 1024.0 + self.disk_gb as f64 / 1024.0
    }

    pub fn memory_display(&self) -> String {
        succinct_size(self.memory_mb, &["MB", "GB", "TB", "PB"])
    }

    pub fn disk_display(&self) -> String {
        succinct_size(self.disk_gb, &["GB", "TB", "PB"])
    }

    /// Whether this profile may be used at `location`
    pub fn available_in(&self, location: &str) -> bool {
        self.location.as_deref().is_none_or(|l| l == location)
    }
}

fn succinct_size(value: u64, units: &[&str]) -> String {
    let mut amount = value as f64;
    let mut unit = 0;
    while amount >= 1024.0 && unit + 1 < units.len() {
        amount /= 1024.0;
        unit += 1;
    }
    let formatted = format!("{:.2}", amount);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", trimmed, units[unit])
}

/// A place instances can be created in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Only populated when a single location is looked up
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_sizes: Vec<Size>,
}

/// Provider as shown to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Registry key
    pub provider: String,
    /// Display name reported by the connector
    pub name: String,
    pub locations: Vec<Location>,
}

/// Request to create one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceCreationRequest {
    pub provider: String,
    pub location: String,
    pub size: String,
    #[serde(rename = "namePrefix")]
    pub name_prefix: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl InstanceCreationRequest {
    pub fn new(
        provider: impl Into<String>,
        location: impl Into<String>,
        size: impl Into<String>,
        name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            location: location.into(),
            size: size.into(),
            name_prefix: name_prefix.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Reject incomplete requests, naming the first blank field
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("provider", &self.provider),
            ("location", &self.location),
            ("size", &self.size),
            ("namePrefix", &self.name_prefix),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(CloudError::validation(field, "must not be empty"));
            }
        }
        if let Some(role) = self.roles.iter().find(|r| r.contains(',')) {
            return Err(CloudError::validation(
                "roles",
                format!("role '{}' must not contain ','", role),
            ));
        }
        Ok(())
    }
}

/// Why a creation request was turned down before reaching a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceCreationError {
    ProviderUnavailable,
    LocationUnavailable,
    SizeUnavailable,
}

impl InstanceCreationError {
    pub fn message(&self) -> &'static str {
        match self {
            InstanceCreationError::ProviderUnavailable => "Provider Unavailable",
            InstanceCreationError::LocationUnavailable => "Location Unavailable",
            InstanceCreationError::SizeUnavailable => "Size Unavailable",
        }
    }
}

impl std::fmt::Display for InstanceCreationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Body returned to a caller whose creation request was rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceCreationFailedResponse {
    #[serde(rename = "requestedInstance")]
    pub requested_instance: InstanceCreationRequest,
    #[serde(rename = "error", serialize_with = "serialize_creation_error")]
    pub error: InstanceCreationError,
}

fn serialize_creation_error<S: serde::Serializer>(
    error: &InstanceCreationError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(error.message())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestructionStatus {
    Destroyed,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagUpdateStatus {
    Updated,
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_normalization() {
        assert_eq!(InstanceStatus::from_provider("BUILD"), InstanceStatus::Building);
        assert_eq!(InstanceStatus::from_provider("pending"), InstanceStatus::Building);
        assert_eq!(InstanceStatus::from_provider("RUNNING"), InstanceStatus::Active);
        assert_eq!(InstanceStatus::from_provider("ACTIVE"), InstanceStatus::Active);
        assert_eq!(InstanceStatus::from_provider("DELETED"), InstanceStatus::Terminated);
        assert_eq!(InstanceStatus::from_provider("SHUTOFF"), InstanceStatus::Unknown);
        assert!(InstanceStatus::Terminated.is_terminal());
        assert!(!InstanceStatus::Building.is_terminal());
    }

    #[test]
    fn test_instance_builders() {
        let instance = Instance::new("i-1", "web-1", "m1.tiny", InstanceStatus::Active)
            .with_provider("lab")
            .with_hostname(Some("web-1.example.com".to_string()))
            .with_tags(["db", "web", "db"]);

        assert_eq!(instance.provider.as_deref(), Some("lab"));
        assert_eq!(instance.hostname.as_deref(), Some("web-1.example.com"));
        assert_eq!(instance.tags.len(), 2);
        assert_eq!(
            instance,
            Instance::new("i-1", "other", "m1.small", InstanceStatus::Unknown)
        );
    }

    #[test]
    fn test_size_display_and_cost() {
        let tiny = Size::new("m1.tiny", 1, 512, 10);
        assert_eq!(tiny.memory_display(), "512MB");
        assert_eq!(tiny.disk_display(), "10GB");

        let medium = Size::new("m1.medium", 2, 2048, 1536);
        assert_eq!(medium.memory_display(), "2GB");
        assert_eq!(medium.disk_display(), "1.5TB");
        assert!((medium.cost() - 5.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_size_affinity() {
        let anywhere = Size::new("m1.small", 1, 1024, 100);
        let pinned = Size::new("g1.large", 8, 32768, 400).in_location("zone-a");
        assert!(anywhere.available_in("zone-b"));
        assert!(pinned.available_in("zone-a"));
        assert!(!pinned.available_in("zone-b"));
    }

    #[test]
    fn test_request_validation_names_field() {
        let request = InstanceCreationRequest::new("p1", "", "m1.tiny", "web");
        match request.validate() {
            Err(CloudError::Validation { field, .. }) => assert_eq!(field, "location"),
            other => panic!("expected validation error, got {:?}", other),
        }

        let request = InstanceCreationRequest::new("p1", "us-east", "m1.tiny", "web")
            .with_roles(["web,db"]);
        assert!(request.validate().is_err());

        let request = InstanceCreationRequest::new("p1", "us-east", "m1.tiny", "web");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_failed_response_serialization() {
        let response = InstanceCreationFailedResponse {
            requested_instance: InstanceCreationRequest::new("p1", "missing", "m1.tiny", "web"),
            error: InstanceCreationError::LocationUnavailable,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "Location Unavailable");
        assert_eq!(json["requestedInstance"]["location"], "missing");
    }
}
