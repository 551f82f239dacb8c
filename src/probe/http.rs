//! HTTP prober talking to deployed probe endpoints.

use super::{ProbeError, ProbeRequest, ProbeResponse, Prober};
use crate::distance::RankedProbeRegion;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Prober that POSTs trial requests to one endpoint per region.
///
/// The per-region URL comes from a template containing `{region}`; the
/// connectivity check goes to a separate "nearest" endpoint that the fleet's
/// routing layer resolves to whichever region is closest to the caller.
pub struct HttpProber {
    client: reqwest::Client,
    probe_url_template: String,
    nearest_url: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(
        probe_url_template: &str,
        nearest_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            probe_url_template: probe_url_template.to_string(),
            nearest_url: nearest_url.to_string(),
            timeout,
        })
    }

    fn url_for(&self, region_id: &str) -> String {
        self.probe_url_template.replace("{region}", region_id)
    }

    async fn invoke(&self, url: &str, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(self.timeout)
                } else {
                    ProbeError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<ProbeResponse>()
                .await
                .map_err(|e| ProbeError::Transport(format!("malformed probe response: {e}")))
        } else {
            // Non-success with an { error } body is a database-side failure;
            // anything else came from the transport in between.
            match response.json::<ErrorBody>().await {
                Ok(body) => Err(ProbeError::Remote(body.error)),
                Err(_) => Err(ProbeError::Transport(format!("probe returned status {status}"))),
            }
        }
    }
}

impl Prober for HttpProber {
    async fn check(&self, request: ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        self.invoke(&self.nearest_url, &request).await
    }

    async fn probe(
        &self,
        region: &RankedProbeRegion,
        request: ProbeRequest,
    ) -> Result<ProbeResponse, ProbeError> {
        self.invoke(&self.url_for(&region.region.id), &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template_substitution() {
        let prober = HttpProber::new(
            "https://{region}.probes.example.com/api/probe",
            "https://nearest.probes.example.com/api/probe",
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            prober.url_for("syd1"),
            "https://syd1.probes.example.com/api/probe"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transport_error() {
        let prober = HttpProber::new(
            "http://127.0.0.1:1/api/{region}",
            "http://127.0.0.1:1/api/nearest",
            Duration::from_millis(200),
        )
        .unwrap();
        let err = prober
            .check(ProbeRequest::single("postgres://u:p@h.x/db"))
            .await
            .unwrap_err();
        assert!(!err.is_remote());
    }
}
