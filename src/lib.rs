//! Representative coordinates for administrative areas.
//!
//! `generate` loads an area layer and a building-point layer, normalizes
//! both to WGS84, computes the mean center of the buildings inside each
//! area (falling back to an interior point for empty areas) and exports a
//! flat table. The `server` module serves that table for drill-down lookup.

pub mod config;
pub mod crs;
pub mod data;
pub mod error;
pub mod export;
pub mod lookup;
pub mod normalize;
pub mod processing;
pub mod server;
pub mod types;

use anyhow::{Context, Result};
use config::AppConfig;
use processing::Aggregation;

/// Run the full admin pipeline and write the table to `config.output.csv`.
pub fn generate(config: &AppConfig) -> Result<Aggregation> {
    // 1. Load both layers
    let areas = data::load_areas(&config.input)?;
    let points = data::load_points(&config.input)?;

    // 2. Bring them into the same geographic CRS
    let normalized = normalize::normalize(&areas, &points)
        .context("Failed to normalize input layers")?;

    // 3. Aggregate
    let aggregation = processing::aggregate(
        &normalized.areas.features,
        &normalized.points.features,
    )?;

    // 4. Export
    export::export_csv(&config.output.csv, &config.schema(), &aggregation.centers)?;

    Ok(aggregation)
}
