//! Connection probe client side.
//!
//! A probe invocation asks one probe region to run a batch of timed database
//! connection trials and report the durations. Two implementations: an HTTP
//! client talking to deployed probe endpoints, and a synthetic one for
//! offline runs.

mod http;
mod synthetic;

pub use http::*;
pub use synthetic::*;

use crate::distance::RankedProbeRegion;
use crate::regions::GeoPoint;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Probe invocation failure, split by origin so remote database failures and
/// local transport failures can be told apart downstream.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe answered with an error payload (database-side failure).
    #[error("probe reported an error: {0}")]
    Remote(String),
    /// The probe could not be reached or answered garbage.
    #[error("probe request failed: {0}")]
    Transport(String),
    #[error("probe request timed out after {0:?}")]
    Timeout(Duration),
}

impl ProbeError {
    pub fn is_remote(&self) -> bool {
        matches!(self, ProbeError::Remote(_))
    }
}

/// `pipelineConnect` request member: a plain switch or a named mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineConnect {
    Flag(bool),
    Mode(String),
}

impl Default for PipelineConnect {
    fn default() -> Self {
        PipelineConnect::Flag(false)
    }
}

/// Request body for one probe invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub trials: i64,
    pub database: String,
    #[serde(rename = "pipelineConnect", default)]
    pub pipeline_connect: PipelineConnect,
}

impl ProbeRequest {
    /// A single-trial request, the unit the orchestrator dispatches.
    pub fn single(database: &str) -> Self {
        Self {
            trials: 1,
            database: database.to_string(),
            pipeline_connect: PipelineConnect::default(),
        }
    }
}

/// Best-effort caller geolocation reported by a probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeLocation {
    pub city: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl ProbeLocation {
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        }
    }
}

/// Successful probe response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// Elapsed milliseconds per trial, in trial order.
    pub durations: Vec<i64>,
    /// Round-trip query results per trial (timestamps as text).
    #[serde(default)]
    pub results: Vec<String>,
    #[serde(default)]
    pub location: ProbeLocation,
}

/// A source of connection trials, chosen once at orchestrator construction.
pub trait Prober: Send + Sync {
    /// Connectivity pre-check against the nearest endpoint.
    fn check(
        &self,
        request: ProbeRequest,
    ) -> impl Future<Output = Result<ProbeResponse, ProbeError>> + Send;

    /// One probe invocation against a specific region.
    fn probe(
        &self,
        region: &RankedProbeRegion,
        request: ProbeRequest,
    ) -> impl Future<Output = Result<ProbeResponse, ProbeError>> + Send;
}

pub const MIN_TRIALS: i64 = 1;
pub const MAX_TRIALS: i64 = 21;

/// Clamp a requested trial count to the supported range.
pub fn clamp_trials(requested: i64) -> usize {
    requested.clamp(MIN_TRIALS, MAX_TRIALS) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_trials() {
        assert_eq!(clamp_trials(-3), 1);
        assert_eq!(clamp_trials(0), 1);
        assert_eq!(clamp_trials(1), 1);
        assert_eq!(clamp_trials(21), 21);
        assert_eq!(clamp_trials(1000), 21);
    }

    #[test]
    fn test_pipeline_connect_accepts_bool_and_string() {
        let flag: PipelineConnect = serde_json::from_str("false").unwrap();
        assert!(matches!(flag, PipelineConnect::Flag(false)));
        let mode: PipelineConnect = serde_json::from_str("\"password\"").unwrap();
        assert!(matches!(mode, PipelineConnect::Mode(m) if m == "password"));
    }

    #[test]
    fn test_response_location_point() {
        let loc = ProbeLocation {
            city: Some("Lisbon".into()),
            longitude: Some(-9.14),
            latitude: Some(38.72),
        };
        let point = loc.point().unwrap();
        assert_eq!(point.latitude, 38.72);
        assert!(ProbeLocation::default().point().is_none());
    }

    #[test]
    fn test_request_wire_shape() {
        let req = ProbeRequest::single("postgres://u:p@h.x/db");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["trials"], 1);
        assert_eq!(json["pipelineConnect"], false);
    }
}
