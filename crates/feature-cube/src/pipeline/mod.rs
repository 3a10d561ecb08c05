//! Product pipelines.
//!
//! Each pipeline loads one product through the [`DataSource`], applies its
//! own masking and reducers, and returns flattened feature layers. Pipelines
//! share nothing but the read-only [`BaselineQuery`], so they can run
//! concurrently.

mod fractional_cover;
mod geomedian;
mod monthly;
mod slope;

pub use fractional_cover::FractionalCoverPipeline;
pub use geomedian::GeomedianPipeline;
pub use monthly::MonthlyIndexPipeline;
pub use slope::SlopePipeline;

use async_trait::async_trait;

use crate::config::BaselineQuery;
use crate::error::Result;
use crate::layer::FlattenedLayer;
use crate::source::DataSource;

/// Sentinel-2 geomedian measurements: reflectances, then MAD statistics.
pub const S2_GEOMEDIAN_MEASUREMENTS: [&str; 13] = [
    "blue",
    "green",
    "red",
    "nir_1",
    "nir_2",
    "swir_1",
    "swir_2",
    "red_edge_1",
    "red_edge_2",
    "red_edge_3",
    "smad",
    "emad",
    "bcmad",
];

/// Landsat fractional cover measurements.
pub const FC_MEASUREMENTS: [&str; 4] = ["bs", "pv", "npv", "ue"];

/// Monthly NDVI anomaly measurements.
pub const MONTHLY_NDVI_MEASUREMENTS: [&str; 1] = ["ndvi_mean"];

/// Terrain derivative measurement, also the output band name.
pub const SLOPE_MEASUREMENT: &str = "slope";

/// One product's contribution to the feature cube.
#[async_trait]
pub trait ProductPipeline: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Load, mask and reduce the product into flattened layers.
    ///
    /// # Arguments
    /// * `source` - Backend resolving load requests
    /// * `baseline` - Shared spatial and CRS parameters
    async fn run(
        &self,
        source: &dyn DataSource,
        baseline: &BaselineQuery,
    ) -> Result<Vec<FlattenedLayer>>;
}
