//! Feature collection: fan a query out to every product pipeline and merge.

use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::{BaselineQuery, CollectorConfig, QueryConfig};
use crate::consolidate::merge;
use crate::error::{FeatureError, Result};
use crate::layer::FeatureCube;
use crate::pipeline::{
    FractionalCoverPipeline, GeomedianPipeline, MonthlyIndexPipeline, ProductPipeline,
    SlopePipeline,
};
use crate::source::DataSource;

/// The five standard pipelines for a validated query.
pub fn standard_pipelines(
    query: &QueryConfig,
    config: &CollectorConfig,
) -> Vec<Arc<dyn ProductPipeline>> {
    vec![
        Arc::new(GeomedianPipeline::annual(
            query.annual_geomedian_times.clone(),
            config.geomedian,
        )),
        Arc::new(GeomedianPipeline::semiannual(
            query.semiannual_geomedian_times.clone(),
            config.geomedian,
        )),
        Arc::new(MonthlyIndexPipeline::new(query.monthly_ndvi_time_range)),
        Arc::new(FractionalCoverPipeline::new(
            query.ls_fc_cover_times.clone(),
            query.fc_reducer,
            config.mask_match_tolerance(),
        )),
        Arc::new(SlopePipeline::new(query.slope_time)),
    ]
}

/// Runs a set of pipelines concurrently against one data source.
///
/// Either every pipeline succeeds and the merged cube is returned, or the
/// first error is. Pipelines still running when another fails are left to
/// finish; their output is discarded.
pub struct FeatureCollector {
    baseline: Arc<BaselineQuery>,
    pipelines: Vec<Arc<dyn ProductPipeline>>,
}

impl FeatureCollector {
    /// Collector running the standard pipelines for `query`.
    pub fn from_query(query: &QueryConfig, config: &CollectorConfig) -> Result<Self> {
        config.validate().map_err(FeatureError::config)?;
        Ok(Self::with_pipelines(
            query.baseline.clone(),
            standard_pipelines(query, config),
        ))
    }

    /// Collector running an explicit pipeline list.
    pub fn with_pipelines(
        baseline: BaselineQuery,
        pipelines: Vec<Arc<dyn ProductPipeline>>,
    ) -> Self {
        Self {
            baseline: Arc::new(baseline),
            pipelines,
        }
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name()).collect()
    }

    /// Run every pipeline and merge their layers into one cube.
    pub async fn collect(&self, source: Arc<dyn DataSource>) -> Result<FeatureCube> {
        let start = Instant::now();
        info!(pipelines = ?self.pipeline_names(), "Starting feature collection");

        let handles = self.pipelines.iter().map(|pipeline| {
            let pipeline = Arc::clone(pipeline);
            let source = Arc::clone(&source);
            let baseline = Arc::clone(&self.baseline);

            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let result = pipeline.run(source.as_ref(), &baseline).await;
                match &result {
                    Ok(layers) => info!(
                        pipeline = pipeline.name(),
                        layers = layers.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Pipeline finished"
                    ),
                    Err(e) => error!(pipeline = pipeline.name(), error = %e, "Pipeline failed"),
                }
                result
            });

            async move {
                handle
                    .await
                    .map_err(|e| FeatureError::Task(e.to_string()))?
            }
        });

        let layer_lists = try_join_all(handles).await?;
        let cube = merge(layer_lists)?;

        info!(
            bands = cube.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Feature collection complete"
        );
        Ok(cube)
    }
}
