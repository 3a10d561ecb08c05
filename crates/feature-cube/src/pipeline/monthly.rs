//! Monthly NDVI anomaly features.

use async_trait::async_trait;
use crop_common::TimeRange;
use tracing::info;

use super::{ProductPipeline, MONTHLY_NDVI_MEASUREMENTS};
use crate::config::BaselineQuery;
use crate::error::Result;
use crate::layer::FlattenedLayer;
use crate::source::{DataSource, Resampling};
use crate::window::flatten_time_steps;

/// Loads the monthly index product over one interval and keeps every step
/// as its own feature, named `{band}_{stepIndex}`.
#[derive(Debug, Clone)]
pub struct MonthlyIndexPipeline {
    product: String,
    range: TimeRange,
}

impl MonthlyIndexPipeline {
    pub fn new(range: TimeRange) -> Self {
        Self {
            product: "ndvi_anomaly".to_string(),
            range,
        }
    }
}

#[async_trait]
impl ProductPipeline for MonthlyIndexPipeline {
    fn name(&self) -> &str {
        "monthly_ndvi"
    }

    async fn run(
        &self,
        source: &dyn DataSource,
        baseline: &BaselineQuery,
    ) -> Result<Vec<FlattenedLayer>> {
        let request = baseline
            .request(&self.product, MONTHLY_NDVI_MEASUREMENTS, self.range)
            .with_resampling(Resampling::Bilinear);
        let stack = source.load(&request).await?.recode_nodata();

        let layers = flatten_time_steps(&stack)?;
        info!(
            pipeline = self.name(),
            steps = stack.steps(),
            layers = layers.len(),
            "Pipeline complete"
        );
        Ok(layers)
    }
}
