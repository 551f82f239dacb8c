//! Synthetic prober for offline runs.
//!
//! Produces distance-scaled latencies with random overhead and a
//! low-probability injected database error, so the whole pipeline can be
//! exercised without a fleet or a database.

use super::{clamp_trials, ProbeError, ProbeLocation, ProbeRequest, ProbeResponse, Prober};
use crate::distance::RankedProbeRegion;

use std::time::Duration;

/// Baseline connect-plus-query cost in milliseconds.
const BASE_EDGE_MS: f64 = 4.0;
/// Round-trip milliseconds per kilometer of great-circle distance.
const MS_PER_KM: f64 = 0.02;
/// Assumed distance when the region has no computed host distance.
const FALLBACK_KM: f64 = 1500.0;

/// Prober that fabricates plausible trial results locally.
pub struct SyntheticProber {
    error_rate: f64,
}

impl SyntheticProber {
    pub fn new(error_rate: f64) -> Self {
        Self { error_rate }
    }

    fn edge_ms(km_to_host: f64) -> i64 {
        let km = if km_to_host < 0.0 { FALLBACK_KM } else { km_to_host };
        let jitter = 1.0 + 0.3 * rand::random::<f64>();
        ((BASE_EDGE_MS + km * MS_PER_KM) * jitter).round() as i64
    }

    fn overhead_ms() -> i64 {
        3 + (rand::random::<f64>() * 22.0) as i64
    }
}

impl Default for SyntheticProber {
    fn default() -> Self {
        Self::new(0.02)
    }
}

impl Prober for SyntheticProber {
    async fn check(&self, _request: ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        // Offline short-circuit: no network call, synthesized client location.
        Ok(ProbeResponse {
            durations: vec![Self::overhead_ms()],
            results: Vec::new(),
            location: ProbeLocation {
                city: Some("Berlin".to_string()),
                longitude: Some(13.405),
                latitude: Some(52.52),
            },
        })
    }

    async fn probe(
        &self,
        region: &RankedProbeRegion,
        request: ProbeRequest,
    ) -> Result<ProbeResponse, ProbeError> {
        let count = clamp_trials(request.trials);
        let mut durations = Vec::with_capacity(count);

        for _ in 0..count {
            if rand::random::<f64>() < self.error_rate {
                return Err(ProbeError::Remote("synthetic database error".to_string()));
            }
            let edge = Self::edge_ms(region.km_to_host);
            let total = edge + Self::overhead_ms();
            tokio::time::sleep(Duration::from_millis(total as u64)).await;
            durations.push(edge);
        }

        Ok(ProbeResponse {
            durations,
            results: Vec::new(),
            location: ProbeLocation::default(),
        })
    }
}
