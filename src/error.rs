//! Error types for normalization and aggregation.

use thiserror::Error;

/// Errors raised by the coordinate normalizer and the mean-center aggregator.
#[derive(Error, Debug)]
pub enum CenterError {
    /// A layer reached the normalizer without a declared CRS.
    #[error("layer '{layer}' has no declared coordinate reference system")]
    UnknownCrs { layer: String },

    /// A CRS name or code that has no built-in definition.
    #[error("unrecognized coordinate reference system: {0}")]
    UnrecognizedCrs(String),

    /// The target geographic CRS could not be turned into a projection.
    #[error("unsupported projection {crs}: {reason}")]
    UnsupportedProjection { crs: String, reason: String },

    /// A coordinate could not be transformed.
    #[error("projection failed for ({x}, {y}): {reason}")]
    Projection { x: f64, y: f64, reason: String },

    /// An area has no interior point to fall back on.
    #[error("area '{0}' has an empty geometry")]
    EmptyGeometry(String),

    /// An area feature without a polygon boundary.
    #[error("area '{id}' (feature {feature}) has no polygon geometry: {found}")]
    NonPolygonArea { id: String, feature: usize, found: String },

    /// Two areas share the same identifier.
    #[error("duplicate area identifier '{0}'")]
    DuplicateAreaId(String),

    /// A required attribute column is absent from a feature.
    #[error("required column '{column}' missing on feature {feature}")]
    MissingColumn { column: String, feature: usize },
}

/// Result type for normalization and aggregation.
pub type Result<T> = std::result::Result<T, CenterError>;
