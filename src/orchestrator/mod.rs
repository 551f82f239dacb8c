//! Measurement orchestrator.
//!
//! Drives a full run: resolve the database's host region, one connectivity
//! pre-check against the nearest probe endpoint, then a ranked sweep where
//! every region gets a paced batch of single-trial probe invocations.
//! Regions are visited strictly one at a time; within a region dispatches
//! are paced and bounded but completions land in any order. Trial failures
//! never abort a run; they become sentinel samples. Only a failed
//! connectivity check (or a stop request) ends a run early.

use crate::distance::{rank, RankedProbeRegion};
use crate::probe::{ProbeError, ProbeRequest, ProbeResponse, Prober};
use crate::regions::{GeoPoint, RegionDirectory};
use crate::resolve::{self, ResolvedEndpoint};
use crate::stats::TrialSample;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch, RwLock, Semaphore};
use tokio::task::JoinSet;

/// Run lifecycle. Exactly one state is active at a time and every run ends
/// back at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ConnectivityCheck,
    Measuring,
}

/// One recorded sample, published as it lands.
#[derive(Debug, Clone)]
pub struct SampleEvent {
    pub region_id: String,
    pub sample: TrialSample,
}

/// Errors that stop a run from starting or finishing.
///
/// Trial-stage failures are absorbed as sentinels and never surface here.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("no connection string supplied")]
    MissingDatabase,
    #[error("connection string is incomplete or names no known host region")]
    UnresolvedEndpoint,
    #[error("connectivity check failed, server: {0}")]
    ConnectivityRemote(String),
    #[error("connectivity check failed, client: {0}")]
    ConnectivityLocal(String),
    #[error("run stopped")]
    Stopped,
}

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Trials per region, clamped by the probe to at most 21.
    pub trials: usize,
    /// Delay between successive dispatches within a region.
    pub pacing: Duration,
    /// Hard bound on simultaneously in-flight trials per region.
    pub max_in_flight: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            trials: 21,
            pacing: Duration::from_millis(50),
            max_in_flight: 8,
        }
    }
}

/// What a completed run measured.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub host_region_id: String,
    pub client: Option<GeoPoint>,
    /// Sweep order, ascending distance to the host.
    pub regions: Vec<RankedProbeRegion>,
    pub dispatched: usize,
    pub errored: usize,
}

/// The latency measurement driver.
///
/// Consumers observe a run through [`Orchestrator::state`] and
/// [`Orchestrator::subscribe`] rather than through return values, so any
/// front end can render progress live.
pub struct Orchestrator<P> {
    directory: Arc<RegionDirectory>,
    prober: Arc<P>,
    config: RunConfig,
    state_tx: watch::Sender<RunState>,
    event_tx: broadcast::Sender<SampleEvent>,
    samples: Arc<RwLock<HashMap<String, Vec<TrialSample>>>>,
    stop_tx: broadcast::Sender<()>,
}

impl<P: Prober + 'static> Orchestrator<P> {
    pub fn new(directory: Arc<RegionDirectory>, prober: P, config: RunConfig) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        let (event_tx, _) = broadcast::channel(1024);
        let (stop_tx, _) = broadcast::channel(1);

        Self {
            directory,
            prober: Arc::new(prober),
            config,
            state_tx,
            event_tx,
            samples: Arc::new(RwLock::new(HashMap::new())),
            stop_tx,
        }
    }

    /// Watch the run state.
    pub fn state(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to samples as they are recorded.
    pub fn subscribe(&self) -> broadcast::Receiver<SampleEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of one region's accumulated samples.
    pub async fn samples_for(&self, region_id: &str) -> Vec<TrialSample> {
        self.samples
            .read()
            .await
            .get(region_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Ask a running sweep to stop at its next suspension point.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    /// Execute one full run.
    pub async fn run(&self, database: &str) -> Result<RunReport, RunError> {
        let host_id = match resolve::resolve(database, &self.directory) {
            ResolvedEndpoint::Region(id) => id,
            ResolvedEndpoint::Unspecified => return Err(RunError::MissingDatabase),
            ResolvedEndpoint::Invalid => return Err(RunError::UnresolvedEndpoint),
        };
        let host = self
            .directory
            .host_region(&host_id)
            .ok_or(RunError::UnresolvedEndpoint)?;
        let database = database.trim();

        // Fresh run: every accumulator is reset in one step.
        {
            let mut map = self.samples.write().await;
            map.clear();
            for region in self.directory.probe_regions() {
                map.insert(region.id.clone(), Vec::new());
            }
        }
        let mut stop_rx = self.stop_tx.subscribe();

        self.state_tx.send_replace(RunState::ConnectivityCheck);
        tracing::info!(host_region = %host_id, "connectivity check against nearest endpoint");

        let client = match self.prober.check(ProbeRequest::single(database)).await {
            Ok(response) => response.location.point(),
            Err(err) => {
                self.state_tx.send_replace(RunState::Idle);
                return Err(match err {
                    ProbeError::Remote(msg) => RunError::ConnectivityRemote(msg),
                    other => RunError::ConnectivityLocal(other.to_string()),
                });
            }
        };

        let ranked = rank(self.directory.probe_regions(), Some(host), client);
        self.state_tx.send_replace(RunState::Measuring);

        let mut dispatched = 0usize;
        let mut errored = 0usize;
        let mut stopped = false;

        for ranked_region in &ranked {
            tracing::info!(region = %ranked_region.region.id, km = ranked_region.km_to_host, "sweeping region");

            let gate = Arc::new(Semaphore::new(self.config.max_in_flight));
            let mut in_flight: JoinSet<bool> = JoinSet::new();

            for trial in 0..self.config.trials {
                if trial > 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.pacing) => {}
                        _ = stop_rx.recv() => stopped = true,
                    }
                    if stopped {
                        break;
                    }
                }

                let permit = match gate.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let prober = self.prober.clone();
                let region = ranked_region.clone();
                let request = ProbeRequest::single(database);
                let samples = self.samples.clone();
                let event_tx = self.event_tx.clone();
                dispatched += 1;

                in_flight.spawn(async move {
                    let _permit = permit;
                    let started = Instant::now();
                    let outcome = prober.probe(&region, request).await;
                    let total_ms = started.elapsed().as_millis() as i64;

                    let sample = classify(outcome, total_ms, &region.region.id);
                    {
                        let mut map = samples.write().await;
                        if let Some(list) = map.get_mut(&region.region.id) {
                            list.push(sample);
                        }
                    }
                    let _ = event_tx.send(SampleEvent {
                        region_id: region.region.id.clone(),
                        sample,
                    });
                    sample.is_error()
                });
            }

            // Barrier: everything dispatched for this region settles before
            // the sweep advances (or before a stop takes effect).
            while let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok(true) => errored += 1,
                    Ok(false) => {}
                    Err(e) => tracing::warn!("trial task failed to join: {e}"),
                }
            }

            if stopped {
                break;
            }
        }

        self.state_tx.send_replace(RunState::Idle);
        if stopped {
            return Err(RunError::Stopped);
        }

        tracing::info!(dispatched, errored, "run complete");
        Ok(RunReport {
            host_region_id: host_id,
            client,
            regions: ranked,
            dispatched,
            errored,
        })
    }
}

/// Fold one trial outcome into a sample.
///
/// Remote (database-side) failures and local transport failures get distinct
/// sentinels; malformed success payloads count as transport failures.
fn classify(
    outcome: Result<ProbeResponse, ProbeError>,
    total_ms: i64,
    region_id: &str,
) -> TrialSample {
    match outcome {
        Ok(response) => match response.durations.first() {
            Some(edge) if *edge >= 0 => TrialSample::ok(*edge, total_ms),
            _ => {
                tracing::warn!(region = %region_id, "probe response carried no duration");
                TrialSample::transport_error()
            }
        },
        Err(err) if err.is_remote() => {
            tracing::warn!(region = %region_id, "remote trial failure: {err}");
            TrialSample::db_error()
        }
        Err(err) => {
            tracing::warn!(region = %region_id, "local trial failure: {err}");
            TrialSample::transport_error()
        }
    }
}
