//! Great-circle distance and probe-region ranking.

use crate::regions::{GeoPoint, HostRegion, ProbeRegion};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance value standing in for "reference point unknown".
pub const UNKNOWN_DISTANCE_KM: f64 = -1.0;

/// Haversine great-circle distance in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// A probe region annotated with its distance to the host and to the client.
#[derive(Debug, Clone)]
pub struct RankedProbeRegion {
    pub region: ProbeRegion,
    /// Km to the database host region, or [`UNKNOWN_DISTANCE_KM`].
    pub km_to_host: f64,
    /// Km to the client, or [`UNKNOWN_DISTANCE_KM`].
    pub km_to_client: f64,
}

/// Rank probe regions by ascending distance to the host region.
///
/// With no host region every distance is the unknown sentinel and the input
/// order is kept. Client distance is annotation only and never affects the
/// ordering. The sort is stable, so ties keep table order.
pub fn rank(
    probe_regions: &[ProbeRegion],
    host: Option<&HostRegion>,
    client: Option<GeoPoint>,
) -> Vec<RankedProbeRegion> {
    let mut ranked: Vec<RankedProbeRegion> = probe_regions
        .iter()
        .map(|region| RankedProbeRegion {
            km_to_host: host
                .map(|h| haversine_km(region.point(), h.point()))
                .unwrap_or(UNKNOWN_DISTANCE_KM),
            km_to_client: client
                .map(|c| haversine_km(region.point(), c))
                .unwrap_or(UNKNOWN_DISTANCE_KM),
            region: region.clone(),
        })
        .collect();

    if host.is_some() {
        ranked.sort_by(|a, b| {
            a.km_to_host
                .partial_cmp(&b.km_to_host)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::RegionDirectory;

    fn dir() -> RegionDirectory {
        RegionDirectory::load().unwrap()
    }

    #[test]
    fn test_haversine_is_symmetric_and_zero_on_self() {
        let london = GeoPoint { latitude: 51.5072, longitude: -0.1276 };
        let paris = GeoPoint { latitude: 48.8575, longitude: 2.3514 };

        assert_eq!(haversine_km(london, london), 0.0);
        let ab = haversine_km(london, paris);
        let ba = haversine_km(paris, london);
        assert!((ab - ba).abs() < 1e-9);
        // London-Paris is roughly 340 km.
        assert!(ab > 300.0 && ab < 380.0, "got {ab}");
    }

    #[test]
    fn test_rank_without_host_keeps_input_order() {
        let dir = dir();
        let ranked = rank(dir.probe_regions(), None, None);
        let ids: Vec<&str> = ranked.iter().map(|r| r.region.id.as_str()).collect();
        let input: Vec<&str> = dir.probe_regions().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, input);
        assert!(ranked.iter().all(|r| r.km_to_host == UNKNOWN_DISTANCE_KM));
        assert!(ranked.iter().all(|r| r.km_to_client == UNKNOWN_DISTANCE_KM));
    }

    #[test]
    fn test_rank_is_a_permutation_in_ascending_order() {
        let dir = dir();
        let host = dir.host_region("eu-west-2").unwrap();
        let ranked = rank(dir.probe_regions(), Some(host), None);

        assert_eq!(ranked.len(), dir.probe_regions().len());
        let mut ids: Vec<&str> = ranked.iter().map(|r| r.region.id.as_str()).collect();
        ids.sort();
        let mut input: Vec<&str> = dir.probe_regions().iter().map(|r| r.id.as_str()).collect();
        input.sort();
        assert_eq!(ids, input);

        for pair in ranked.windows(2) {
            assert!(pair[0].km_to_host <= pair[1].km_to_host);
        }
        // London edge sits on top of the eu-west-2 host region.
        assert_eq!(ranked[0].region.id, "lhr1");
        assert!(ranked[0].km_to_host < 1.0);
    }

    #[test]
    fn test_region_at_host_coordinates_has_zero_distance() {
        let dir = dir();
        // fra1 and eu-central-1 share coordinates in the tables.
        let host = dir.host_region("eu-central-1").unwrap();
        let ranked = rank(dir.probe_regions(), Some(host), None);
        assert_eq!(ranked[0].region.id, "fra1");
        assert_eq!(ranked[0].km_to_host, 0.0);
    }

    #[test]
    fn test_client_distance_does_not_affect_order() {
        let dir = dir();
        let host = dir.host_region("us-east-1").unwrap();
        let sydney = GeoPoint { latitude: -33.8688, longitude: 151.2093 };

        let without = rank(dir.probe_regions(), Some(host), None);
        let with = rank(dir.probe_regions(), Some(host), Some(sydney));

        let a: Vec<&str> = without.iter().map(|r| r.region.id.as_str()).collect();
        let b: Vec<&str> = with.iter().map(|r| r.region.id.as_str()).collect();
        assert_eq!(a, b);
        assert!(with.iter().all(|r| r.km_to_client >= 0.0));
    }
}
