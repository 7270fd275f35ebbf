use crate::config::AppConfig;
use crate::lookup::{MasterTable, TableCache};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState {
    pub cache: TableCache,
}

#[derive(Serialize)]
pub struct LevelsResponse {
    levels: Vec<String>,
}

#[derive(Serialize)]
pub struct OptionsResponse {
    level: Option<String>,
    options: Vec<String>,
}

#[derive(Serialize)]
pub struct AreaResponse {
    id: String,
    label: String,
    names: Vec<String>,
    latitude: f64,
    longitude: f64,
    coordinates: String,
    maps_link: String,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    rows: usize,
}

type ApiError = (StatusCode, String);

fn load_table(state: &AppState) -> Result<Arc<MasterTable>, ApiError> {
    state.cache.get().map_err(|e| {
        warn!("table lookup failed: {:#}", e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Coordinate table not available yet; ask an administrator to generate it.".to_string(),
        )
    })
}

/// Leading filter values present in the query, in hierarchy order.
///
/// Stops at the first level without a value.
fn selection<'a>(table: &MasterTable, params: &'a HashMap<String, String>) -> Vec<&'a str> {
    table.levels().iter()
        .map_while(|level| params.get(level).map(String::as_str))
        .collect()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/levels", get(levels_handler))
        .route("/api/options", get(options_handler))
        .route("/api/areas", get(areas_handler))
        .route("/api/reload", post(reload_handler))
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let state = Arc::new(AppState {
        cache: TableCache::new(&config.output.csv, config.schema()),
    });

    // Warm the cache; a missing table is not fatal, it may be generated later.
    match state.cache.get() {
        Ok(table) => info!("Serving {} areas from {:?}", table.rows().len(), state.cache.path()),
        Err(e) => warn!("Table not loaded yet: {:#}", e),
    }

    let mut app = router(state);
    if let Some(dir) = &config.server.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn levels_handler(
    State(state): State<Arc<AppState>>,
) -> Json<LevelsResponse> {
    Json(LevelsResponse {
        levels: state.cache.schema().filter_levels().to_vec(),
    })
}

async fn options_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<OptionsResponse>, ApiError> {
    let table = load_table(&state)?;
    let chosen = selection(&table, &params);

    Ok(Json(OptionsResponse {
        level: table.levels().get(chosen.len()).cloned(),
        options: table.options(&chosen),
    }))
}

async fn areas_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<AreaResponse>>, ApiError> {
    let table = load_table(&state)?;
    let chosen = selection(&table, &params);

    let areas = table.rows_matching(&chosen).into_iter().map(|row| AreaResponse {
        id: row.id.clone(),
        label: row.label().to_string(),
        names: row.names.clone(),
        latitude: row.latitude,
        longitude: row.longitude,
        coordinates: row.coordinates(),
        maps_link: row.maps_link(),
    }).collect();

    Ok(Json(areas))
}

async fn reload_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, ApiError> {
    state.cache.invalidate();
    let table = load_table(&state)?;
    Ok(Json(ReloadResponse { rows: table.rows().len() }))
}
