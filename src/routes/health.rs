use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub engine_pool: PoolHealth,
    pub region: RegionInfo,
}

#[derive(Serialize)]
pub struct PoolHealth {
    pub status: String,
    pub engines: Vec<String>,
}

#[derive(Serialize)]
pub struct RegionInfo {
    pub latitude: [f64; 2],
    pub longitude: [f64; 2],
}

/// GET /health — engine pool state and the active coordinate region.
///
/// The pool is built lazily by the first batch, so "idle" is healthy.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let pool = state.pools.get();
    let failed = pool.is_none() && state.pools.last_init_failed();

    let engine_pool = match &pool {
        Some(pool) => PoolHealth {
            status: "ready".to_string(),
            engines: pool.engine_names().to_vec(),
        },
        None if failed => PoolHealth {
            status: "error".to_string(),
            engines: Vec::new(),
        },
        None => PoolHealth {
            status: "idle".to_string(),
            engines: Vec::new(),
        },
    };

    let region = state.coordinator.region();
    let status_code = if failed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status: if failed { "degraded" } else { "ok" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            engine_pool,
            region: RegionInfo {
                latitude: [*region.latitude.start(), *region.latitude.end()],
                longitude: [*region.longitude.start(), *region.longitude.end()],
            },
        },
    };

    (status_code, Json(response))
}
