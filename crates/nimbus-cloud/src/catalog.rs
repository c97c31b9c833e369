//! Catalog resolver
//!
//! Immutable index of the hardware profiles and locations one provider
//! exposes, built once when its connector starts. Two ancestor lookups
//! climb the location graph:
//!
//! ```text
//!   provider-root   <- provider_root(zone) stops here
//!        │
//!      region
//!        │
//!       zone        <- region_or_zone(zone) stops here
//!        │
//!       host        <- region_or_zone(host) climbs to zone
//! ```

use crate::compute::{HardwareProfile, LocationScope, ProviderLocation};
use crate::error::{CloudError, Result};
use crate::model::{Location, Size};
use std::collections::HashMap;

const DEPRECATED_MARKER: &str = "deprecated";

#[derive(Debug, Clone)]
pub struct Catalog {
    locations: Vec<ProviderLocation>,
    index: HashMap<String, usize>,
    hardware: Vec<HardwareProfile>,
}

impl Catalog {
    /// Index the provider's locations and hardware
    ///
    /// Fails when a parent reference points nowhere or the parent graph
    /// has a cycle.
    pub fn build(locations: Vec<ProviderLocation>, hardware: Vec<HardwareProfile>) -> Result<Self> {
        let mut index = HashMap::with_capacity(locations.len());
        for (position, location) in locations.iter().enumerate() {
            if index.insert(location.id.clone(), position).is_some() {
                return Err(CloudError::Configuration(format!(
                    "duplicate location id '{}'",
                    location.id
                )));
            }
        }

        let catalog = Self {
            locations,
            index,
            hardware,
        };

        for location in &catalog.locations {
            if let Some(parent) = &location.parent {
                if !catalog.index.contains_key(parent) {
                    return Err(CloudError::Configuration(format!(
                        "location '{}' references unknown parent '{}'",
                        location.id, parent
                    )));
                }
            }
            if catalog.has_parent_cycle(location) {
                return Err(CloudError::Configuration(format!(
                    "location '{}' is part of a parent cycle",
                    location.id
                )));
            }
        }

        tracing::debug!(
            "Built catalog with {} locations and {} hardware profiles",
            catalog.locations.len(),
            catalog.hardware.len()
        );
        Ok(catalog)
    }

    pub fn provider_location(&self, id: &str) -> Option<&ProviderLocation> {
        self.index.get(id).map(|&i| &self.locations[i])
    }

    fn parent_of(&self, location: &ProviderLocation) -> Option<&ProviderLocation> {
        location
            .parent
            .as_deref()
            .and_then(|p| self.provider_location(p))
    }

    /// Whether following parents from `start` never reaches a parentless location
    fn has_parent_cycle(&self, start: &ProviderLocation) -> bool {
        let mut current = start;
        for _ in 0..self.locations.len() {
            match self.parent_of(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        true
    }

    /// Climb to the provider-scoped root of `id`
    ///
    /// Used to qualify image references at creation time.
    pub fn provider_root(&self, id: &str) -> Option<&ProviderLocation> {
        let start = self.provider_location(id)?;
        self.climb(start, self.locations.len(), &|catalog, location| {
            location.scope == LocationScope::Provider || catalog.parent_of(location).is_none()
        })
    }

    /// Climb to the region- or zone-scoped ancestor of `id`
    ///
    /// Stops at the first location whose parent is absent or scoped at
    /// provider or region level. Used for display and grouping.
    pub fn region_or_zone(&self, id: &str) -> Option<&ProviderLocation> {
        let start = self.provider_location(id)?;
        self.climb(start, self.locations.len(), &|catalog, location| {
            match catalog.parent_of(location) {
                None => true,
                Some(parent) => {
                    matches!(parent.scope, LocationScope::Provider | LocationScope::Region)
                }
            }
        })
    }

    fn climb<'a>(
        &'a self,
        location: &'a ProviderLocation,
        remaining: usize,
        stop: &dyn Fn(&Catalog, &ProviderLocation) -> bool,
    ) -> Option<&'a ProviderLocation> {
        if stop(self, location) {
            return Some(location);
        }
        // more steps than locations means we are going around a cycle
        if remaining == 0 {
            return None;
        }
        let parent = self.parent_of(location)?;
        self.climb(parent, remaining - 1, stop)
    }

    /// Locations instances can be placed in (everything below the provider root)
    pub fn locations(&self) -> Vec<Location> {
        self.locations
            .iter()
            .filter(|l| l.scope != LocationScope::Provider)
            .map(|l| Location {
                id: l.id.clone(),
                description: l.description.clone(),
                parent: l.parent.clone(),
                available_sizes: Vec::new(),
            })
            .collect()
    }

    /// A single assignable location with its available sizes
    pub fn location(&self, id: &str) -> Option<Location> {
        let location = self.provider_location(id)?;
        if location.scope == LocationScope::Provider {
            return None;
        }
        Some(Location {
            id: location.id.clone(),
            description: location.description.clone(),
            parent: location.parent.clone(),
            available_sizes: self.sizes(id),
        })
    }

    /// Sizes usable at `location`, without deprecated profiles
    pub fn sizes(&self, location: &str) -> Vec<Size> {
        self.hardware
            .iter()
            .filter(|h| !h.name.contains(DEPRECATED_MARKER))
            .map(to_size)
            .filter(|s| s.available_in(location))
            .collect()
    }

    pub fn size(&self, location: &str, name: &str) -> Option<Size> {
        self.sizes(location).into_iter().find(|s| s.name == name)
    }

    /// Raw profile behind a size name at `location`, for building creation templates
    ///
    /// Location-scoped profiles may share a name, so affinity is honored
    /// the same way [`Catalog::size`] honors it.
    pub fn hardware(&self, location: &str, name: &str) -> Option<&HardwareProfile> {
        self.hardware.iter().find(|h| {
            h.name == name && h.location.as_deref().is_none_or(|l| l == location)
        })
    }

    /// Map whatever a node reports as its hardware (id or name) to a profile name
    pub fn hardware_name<'a>(&'a self, id_or_name: &'a str) -> &'a str {
        self.hardware
            .iter()
            .find(|h| h.id == id_or_name || h.name == id_or_name)
            .map(|h| h.name.as_str())
            .unwrap_or(id_or_name)
    }
}

fn to_size(hardware: &HardwareProfile) -> Size {
    Size {
        name: hardware.name.clone(),
        cores: hardware.cores.round() as u32,
        memory_mb: hardware.ram_mb,
        disk_gb: hardware.disk_gb.round() as u64,
        location: hardware.location.clone(),
    }
}
