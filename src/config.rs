//! Configuration module for edgepulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Probe server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the probe endpoint (default: 8080)
    pub http_port: u16,
    /// Region id this probe instance answers for (default: "local")
    pub region_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            region_id: "local".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `EDGEPULSE_HTTP_PORT`: HTTP port (default: 8080)
    /// - `EDGEPULSE_REGION`: probe region id (default: "local")
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("EDGEPULSE_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(region) = env::var("EDGEPULSE_REGION") {
            cfg.region_id = region;
        }

        cfg
    }
}

/// Measurement runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Trials per region (default: 21, the probe's maximum)
    pub trials: usize,
    /// Delay between dispatches within a region (default: 50 ms)
    pub pacing: Duration,
    /// In-flight trial bound per region (default: 8)
    pub max_in_flight: usize,
    /// Per-region probe URL template; `{region}` is substituted
    pub probe_url: String,
    /// Connectivity-check endpoint routed to the nearest region
    pub nearest_url: String,
    /// Probe request timeout (default: 15 s)
    pub probe_timeout: Duration,
    /// Use the synthetic prober instead of the fleet
    pub offline: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            trials: 21,
            pacing: Duration::from_millis(50),
            max_in_flight: 8,
            probe_url: "https://{region}.probes.edgepulse.dev/api/probe".to_string(),
            nearest_url: "https://nearest.probes.edgepulse.dev/api/probe".to_string(),
            probe_timeout: Duration::from_secs(15),
            offline: false,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `EDGEPULSE_TRIALS`, `EDGEPULSE_PACING_MS`, `EDGEPULSE_MAX_IN_FLIGHT`
    /// - `EDGEPULSE_PROBE_URL`, `EDGEPULSE_NEAREST_URL`
    /// - `EDGEPULSE_PROBE_TIMEOUT_SECS`
    /// - `EDGEPULSE_OFFLINE`: "1"/"true" switches to the synthetic prober
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(trials) = env::var("EDGEPULSE_TRIALS") {
            if let Ok(trials) = trials.parse() {
                cfg.trials = trials;
            }
        }

        if let Ok(ms) = env::var("EDGEPULSE_PACING_MS") {
            if let Ok(ms) = ms.parse() {
                cfg.pacing = Duration::from_millis(ms);
            }
        }

        if let Ok(bound) = env::var("EDGEPULSE_MAX_IN_FLIGHT") {
            if let Ok(bound) = bound.parse::<usize>() {
                if bound > 0 {
                    cfg.max_in_flight = bound;
                }
            }
        }

        if let Ok(url) = env::var("EDGEPULSE_PROBE_URL") {
            cfg.probe_url = url;
        }

        if let Ok(url) = env::var("EDGEPULSE_NEAREST_URL") {
            cfg.nearest_url = url;
        }

        if let Ok(secs) = env::var("EDGEPULSE_PROBE_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                cfg.probe_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(flag) = env::var("EDGEPULSE_OFFLINE") {
            cfg.offline = flag == "1" || flag.eq_ignore_ascii_case("true");
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.region_id, "local");
    }

    #[test]
    fn test_default_runner_config() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.trials, 21);
        assert_eq!(cfg.pacing, Duration::from_millis(50));
        assert_eq!(cfg.max_in_flight, 8);
        assert!(!cfg.offline);
        assert!(cfg.probe_url.contains("{region}"));
    }
}
