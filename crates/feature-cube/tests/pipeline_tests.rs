//! Per-pipeline tests against the fixture catalogue.

use feature_cube::pipeline::{
    FractionalCoverPipeline, GeomedianPipeline, MonthlyIndexPipeline, ProductPipeline,
    SlopePipeline,
};
use feature_cube::reduce::GeomedianConfig;
use feature_cube::{FeatureError, FlattenedLayer, MemorySource, Resampling, StatReducer};
use chrono::Duration;
use test_utils::*;

fn names(layers: &[FlattenedLayer]) -> Vec<&str> {
    layers.iter().map(FlattenedLayer::name).collect()
}

fn find<'a>(layers: &'a [FlattenedLayer], name: &str) -> &'a FlattenedLayer {
    layers
        .iter()
        .find(|l| l.name() == name)
        .unwrap_or_else(|| panic!("layer {} missing from {:?}", name, names(layers)))
}

#[tokio::test]
async fn test_annual_geomedian_with_indices() {
    let query = sample_query();
    let source = sample_catalog();
    let pipeline = GeomedianPipeline::annual(query.annual_geomedian_times.clone(), GeomedianConfig::default());

    let layers = pipeline.run(&source, &query.baseline).await.unwrap();

    // 13 product bands plus 5 indices for the single window.
    assert_eq!(layers.len(), 18);
    assert!(layers.iter().all(|l| l.name().ends_with("_s2_y1")));

    let blue = find(&layers, "blue_s2_y1");
    assert!(blue.data().iter().all(|v| *v == 500.0));
    let ndvi = find(&layers, "NDVI_s2_y1");
    assert_approx_eq!(ndvi.data()[0], 0.5, 1e-6);
    find(&layers, "bcmad_s2_y1");

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].product, "gm_s2_annual");
    assert_eq!(requests[0].measurements.len(), 13);
}

#[tokio::test]
async fn test_semiannual_windows_pick_nearest() {
    let query = sample_query();
    let pipeline = GeomedianPipeline::semiannual(
        query.semiannual_geomedian_times.clone(),
        GeomedianConfig::default(),
    );

    let layers = pipeline.run(&sample_catalog(), &query.baseline).await.unwrap();

    assert_eq!(layers.len(), 36);
    // The second semiannual step is offset by 10 per reflectance band.
    assert_eq!(find(&layers, "red_s2_h1").data()[0], 1000.0);
    assert_eq!(find(&layers, "red_s2_h2").data()[0], 1010.0);
}

#[tokio::test]
async fn test_monthly_steps_are_numbered() {
    let query = sample_query();
    let source = sample_catalog();
    let pipeline = MonthlyIndexPipeline::new(query.monthly_ndvi_time_range);

    let layers = pipeline.run(&source, &query.baseline).await.unwrap();

    assert_eq!(names(&layers), vec!["ndvi_mean_0", "ndvi_mean_1", "ndvi_mean_2"]);
    assert_approx_eq!(find(&layers, "ndvi_mean_2").data()[5], 0.3, 1e-6);
    assert_eq!(source.requests()[0].resampling, Resampling::Bilinear);
}

#[tokio::test]
async fn test_fractional_cover_masked_and_reduced() {
    let query = sample_query();
    let source = sample_catalog();
    let pipeline = FractionalCoverPipeline::new(
        query.ls_fc_cover_times.clone(),
        StatReducer::Mean,
        Duration::zero(),
    );

    let layers = pipeline.run(&source, &query.baseline).await.unwrap();

    assert_eq!(
        names(&layers),
        vec![
            "bs_mean_b1", "pv_mean_b1", "npv_mean_b1", "ue_mean_b1",
            "bs_mean_b2", "pv_mean_b2", "npv_mean_b2", "ue_mean_b2",
        ]
    );

    // b1 holds Landsat steps 0..=3, b2 steps 4..=7; pixel 1 is always wet.
    let b1 = find(&layers, "bs_mean_b1");
    assert_eq!(b1.data()[0], 11.5);
    assert!(b1.data()[1].is_nan());
    assert_eq!(find(&layers, "bs_mean_b2").data()[0], 15.5);

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].product, "fc_ls");
    assert_eq!(requests[0].collection_category.as_deref(), Some("T1"));
    assert_eq!(requests[1].product, "wofs_ls");
    assert_eq!(requests[1].resampling, Resampling::Nearest);
    assert!(requests[1].like.as_ref().is_some_and(|g| g.same_grid(&fixture_geobox())));
}

#[tokio::test]
async fn test_fractional_cover_median() {
    let query = sample_query();
    let pipeline = FractionalCoverPipeline::new(
        query.ls_fc_cover_times.clone(),
        StatReducer::Median,
        Duration::zero(),
    );

    let layers = pipeline.run(&sample_catalog(), &query.baseline).await.unwrap();
    assert_eq!(find(&layers, "ue_median_b1").data()[0], 41.5);
}

#[tokio::test]
async fn test_fractional_cover_without_mask_product_fails() {
    let query = sample_query();
    let geobox = fixture_geobox();
    let source = MemorySource::new().with_product(
        "fc_ls",
        create_fc_stack(&geobox, create_regular_times(utc_date(2020, 1, 3), 4, 16)),
    );
    let pipeline = FractionalCoverPipeline::new(
        query.ls_fc_cover_times.clone(),
        StatReducer::Mean,
        Duration::zero(),
    );

    let err = pipeline.run(&source, &query.baseline).await.unwrap_err();
    assert!(matches!(err, FeatureError::Source(_)));
}

#[tokio::test]
async fn test_slope_recoded_and_squeezed() {
    let query = sample_query();
    let pipeline = SlopePipeline::new(query.slope_time);

    let layers = pipeline.run(&sample_catalog(), &query.baseline).await.unwrap();

    assert_eq!(names(&layers), vec!["slope"]);
    let slope = &layers[0];
    assert!(slope.data()[0].is_nan());
    assert_eq!(slope.data()[1], 0.5);
    assert_eq!(slope.valid_count(), FIXTURE_WIDTH * FIXTURE_HEIGHT - 1);
}

#[tokio::test]
async fn test_slope_outside_product_time() {
    let mut query = sample_query();
    query.slope_time = feature_cube::TimeRange::parse("2010-01-01").unwrap();

    let err = SlopePipeline::new(query.slope_time)
        .run(&sample_catalog(), &query.baseline)
        .await
        .unwrap_err();
    assert!(matches!(err, FeatureError::EmptyTimeAxis { .. }));
}
