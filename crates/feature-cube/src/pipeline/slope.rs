//! Static terrain slope.

use async_trait::async_trait;
use crop_common::TimeRange;
use tracing::info;

use super::{ProductPipeline, SLOPE_MEASUREMENT};
use crate::config::BaselineQuery;
use crate::error::Result;
use crate::layer::FlattenedLayer;
use crate::source::{DataSource, Resampling};
use crate::window::flatten_stack;

/// Fill value of the SRTM derivatives product.
pub const SLOPE_NODATA: f32 = -9999.0;

/// Loads the single-date slope layer and emits it as band `slope`.
#[derive(Debug, Clone)]
pub struct SlopePipeline {
    time: TimeRange,
}

impl SlopePipeline {
    pub fn new(time: TimeRange) -> Self {
        Self { time }
    }
}

#[async_trait]
impl ProductPipeline for SlopePipeline {
    fn name(&self) -> &str {
        "slope"
    }

    async fn run(
        &self,
        source: &dyn DataSource,
        baseline: &BaselineQuery,
    ) -> Result<Vec<FlattenedLayer>> {
        let request = baseline
            .request("dem_srtm_deriv", [SLOPE_MEASUREMENT], self.time)
            .with_resampling(Resampling::Bilinear);
        let stack = source
            .load(&request)
            .await?
            .mask_value(SLOPE_NODATA)
            .recode_nodata();

        let layers = flatten_stack(stack, SLOPE_MEASUREMENT)?;
        info!(pipeline = self.name(), layers = layers.len(), "Pipeline complete");
        Ok(layers)
    }
}
