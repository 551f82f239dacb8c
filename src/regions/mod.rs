//! Static region directory.
//!
//! Two immutable tables are embedded at build time: the edge fleet of probe
//! regions and the cloud host regions a database endpoint can live in. Both
//! are parsed once at startup and never mutated afterwards.

use serde::Deserialize;
use std::collections::HashMap;

const EDGE_REGIONS_JSON: &str = include_str!("data/edge-regions.json");
const AWS_REGIONS_JSON: &str = include_str!("data/aws-regions.json");

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct RegionRecord {
    name: String,
    location: String,
    latitude: f64,
    longitude: f64,
}

/// A compute location that can run the connection probe.
#[derive(Debug, Clone)]
pub struct ProbeRegion {
    pub id: String,
    pub name: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ProbeRegion {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A cloud region that can host the target database.
#[derive(Debug, Clone)]
pub struct HostRegion {
    pub id: String,
    pub name: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl HostRegion {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Immutable directory of probe and host regions.
///
/// Probe regions keep the order of the embedded table; that order is the
/// tie-break baseline when ranking by distance.
pub struct RegionDirectory {
    probe_regions: Vec<ProbeRegion>,
    host_regions: HashMap<String, HostRegion>,
}

impl RegionDirectory {
    /// Parse the embedded region tables.
    pub fn load() -> Result<Self, serde_json::Error> {
        // serde_json's preserve_order keeps the file's table order here
        let edge: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(EDGE_REGIONS_JSON)?;
        let mut probe_regions = Vec::with_capacity(edge.len());
        for (id, value) in edge {
            let rec: RegionRecord = serde_json::from_value(value)?;
            probe_regions.push(ProbeRegion {
                id,
                name: rec.name,
                location: rec.location,
                latitude: rec.latitude,
                longitude: rec.longitude,
            });
        }

        let aws: HashMap<String, RegionRecord> = serde_json::from_str(AWS_REGIONS_JSON)?;
        let host_regions = aws
            .into_iter()
            .map(|(id, rec)| {
                let region = HostRegion {
                    id: id.clone(),
                    name: rec.name,
                    location: rec.location,
                    latitude: rec.latitude,
                    longitude: rec.longitude,
                };
                (id, region)
            })
            .collect();

        Ok(Self {
            probe_regions,
            host_regions,
        })
    }

    /// Probe regions in table order.
    pub fn probe_regions(&self) -> &[ProbeRegion] {
        &self.probe_regions
    }

    pub fn host_region(&self, id: &str) -> Option<&HostRegion> {
        self.host_regions.get(id)
    }

    pub fn has_host_region(&self, id: &str) -> bool {
        self.host_regions.contains_key(id)
    }

    #[cfg(test)]
    pub fn for_tests(probe_regions: Vec<ProbeRegion>, host_regions: Vec<HostRegion>) -> Self {
        Self {
            probe_regions,
            host_regions: host_regions.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_embedded_tables() {
        let dir = RegionDirectory::load().expect("embedded tables parse");
        assert_eq!(dir.probe_regions().len(), 13);
        assert!(dir.has_host_region("eu-west-2"));
        assert!(dir.has_host_region("us-east-1"));
        assert!(!dir.has_host_region("xx-nowhere-9"));
    }

    #[test]
    fn test_probe_region_order_is_table_order() {
        let dir = RegionDirectory::load().unwrap();
        // The embedded table starts on the US east coast.
        assert_eq!(dir.probe_regions()[0].id, "iad1");
        assert_eq!(dir.probe_regions()[1].id, "cle1");
    }

    #[test]
    fn test_host_region_lookup() {
        let dir = RegionDirectory::load().unwrap();
        let fra = dir.host_region("eu-central-1").unwrap();
        assert_eq!(fra.name, "Frankfurt");
        assert!(fra.latitude > 50.0 && fra.latitude < 51.0);
    }
}
