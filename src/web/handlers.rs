//! Probe request handlers.

use super::AppState;
use crate::probe::{clamp_trials, ProbeLocation, ProbeResponse};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Instant;
use tokio_postgres::NoTls;

/// Fixed message for every malformed request, distinguishable from a runtime
/// failure by its 400 status.
const DATA_ERROR: &str = r#"Expected a POSTed JSON object like { "trials": 1, "database": "postgres://...", "pipelineConnect": "password" }"#;

pub async fn handle_identity(State(state): State<AppState>) -> impl IntoResponse {
    format!("edgepulse probe, region {}\n", state.config.region_id)
}

pub async fn handle_probe(
    State(_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let (database, count) = match parse_probe_request(&body) {
        Ok(parsed) => parsed,
        Err(()) => return (StatusCode::BAD_REQUEST, DATA_ERROR).into_response(),
    };

    let location = caller_location(&headers);

    match run_trials(&database, count).await {
        Ok((durations, results)) => Json(ProbeResponse {
            durations,
            results,
            location,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!("trial batch failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
                .into_response()
        }
    }
}

/// Validate the request body before any trial executes.
///
/// Returns the trimmed connection string and the clamped trial count, or a
/// unit error that maps to the one fixed client-error message.
fn parse_probe_request(body: &[u8]) -> Result<(String, usize), ()> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|_| ())?;

    let trials = match value.get("trials") {
        Some(t) if t.is_number() => t.as_f64().ok_or(())?,
        _ => return Err(()),
    };

    let database = match value.get("database").and_then(|d| d.as_str()) {
        Some(d) => d,
        None => return Err(()),
    };
    let trimmed = database.trim_start();
    if !trimmed.starts_with("postgres:") && !trimmed.starts_with("postgresql:") {
        return Err(());
    }

    Ok((trimmed.trim().to_string(), clamp_trials(trials as i64)))
}

/// Best-effort caller geolocation from routing-layer headers.
fn caller_location(headers: &HeaderMap) -> ProbeLocation {
    let header_str =
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

    ProbeLocation {
        city: header_str("x-vercel-ip-city"),
        longitude: header_str("x-vercel-ip-longitude").and_then(|v| v.parse().ok()),
        latitude: header_str("x-vercel-ip-latitude").and_then(|v| v.parse().ok()),
    }
}

/// Run `count` strictly sequential connection trials.
///
/// Each trial owns one connection: open, one round-trip query, then the
/// client is dropped so teardown finishes in the background without holding
/// up the response. Any failure voids the whole batch.
async fn run_trials(
    database: &str,
    count: usize,
) -> Result<(Vec<i64>, Vec<String>), tokio_postgres::Error> {
    let mut durations = Vec::with_capacity(count);
    let mut results = Vec::with_capacity(count);

    for _ in 0..count {
        let started = Instant::now();

        let (client, connection) = tokio_postgres::connect(database, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("connection wind-down: {e}");
            }
        });

        let row = client.query_one("SELECT now()", &[]).await?;
        durations.push(started.elapsed().as_millis() as i64);

        let now: DateTime<Utc> = row.get(0);
        results.push(now.to_rfc3339());
        // dropping the client ends the spawned driver on its own time
    }

    Ok((durations, results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_json_body() {
        assert!(parse_probe_request(b"not json").is_err());
        assert!(parse_probe_request(b"").is_err());
    }

    #[test]
    fn test_rejects_non_numeric_trials() {
        let body = br#"{ "trials": "5", "database": "postgres://u:p@h.x/db" }"#;
        assert!(parse_probe_request(body).is_err());
        let body = br#"{ "database": "postgres://u:p@h.x/db" }"#;
        assert!(parse_probe_request(body).is_err());
    }

    #[test]
    fn test_rejects_non_database_scheme() {
        let body = br#"{ "trials": 1, "database": "mysql://u:p@h.x/db" }"#;
        assert!(parse_probe_request(body).is_err());
        let body = br#"{ "trials": 1, "database": 42 }"#;
        assert!(parse_probe_request(body).is_err());
    }

    #[test]
    fn test_accepts_well_formed_request_and_clamps() {
        let body = br#"{ "trials": 100, "database": "  postgres://u:p@h.x/db", "pipelineConnect": false }"#;
        let (database, count) = parse_probe_request(body).unwrap();
        assert_eq!(database, "postgres://u:p@h.x/db");
        assert_eq!(count, 21);

        let body = br#"{ "trials": -1, "database": "postgresql://u:p@h.x/db" }"#;
        let (_, count) = parse_probe_request(body).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_caller_location_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-vercel-ip-city", "Porto".parse().unwrap());
        headers.insert("x-vercel-ip-latitude", "41.15".parse().unwrap());
        headers.insert("x-vercel-ip-longitude", "-8.61".parse().unwrap());

        let location = caller_location(&headers);
        assert_eq!(location.city.as_deref(), Some("Porto"));
        assert!(location.point().is_some());

        let empty = caller_location(&HeaderMap::new());
        assert!(empty.city.is_none() && empty.point().is_none());
    }
}
