//! Common test fixtures for feature collection tests.
//!
//! The fixture query and catalogue agree with each other: every product the
//! five pipelines load exists on the same 4x3 EASE-Grid 2.0 grid, with
//! observations inside every configured window.

use crop_common::GeoBox;
use feature_cube::{MemorySource, QueryConfig, RasterStack};
use std::path::Path;

use crate::generators::*;

/// Grid width of the fixture catalogue.
pub const FIXTURE_WIDTH: usize = 4;

/// Grid height of the fixture catalogue.
pub const FIXTURE_HEIGHT: usize = 3;

/// A complete query whose footprint covers the fixture grid exactly.
pub const SAMPLE_QUERY_YAML: &str = r#"
footprint:
  bbox: [0, 0, 40, 30]
  crs: "EPSG:6933"
output_crs: "EPSG:6933"
resolution: [10, -10]
annual_geomedian_times:
  y1: "2020-01-01"
semiannual_geomedian_times:
  h1: "2020-01-01"
  h2: "2020-07-01"
monthly_ndvi_time_range: ["2020-01", "2020-03"]
ls_fc_cover_times:
  b1: "2020-01-01/2020-02-28"
  b2: "2020-03-01/2020-04-30"
"#;

/// Bands the fixture query must produce, one per product family.
pub const EXPECTED_SAMPLE_BANDS: [&str; 5] =
    ["blue_s2_y1", "NDVI_s2_y1", "ndvi_mean_0", "bs_mean_b1", "slope"];

/// The grid every fixture product sits on.
pub fn fixture_geobox() -> GeoBox {
    create_test_geobox(FIXTURE_WIDTH, FIXTURE_HEIGHT)
}

/// [`SAMPLE_QUERY_YAML`], parsed.
///
/// # Panics
///
/// Panics if the fixture no longer parses.
pub fn sample_query() -> QueryConfig {
    QueryConfig::from_yaml_str(SAMPLE_QUERY_YAML).expect("fixture query parses")
}

/// Every product of the fixture catalogue, by name.
///
/// Fractional cover has a 16-day Landsat cadence through April; WOfS
/// observations share its timestamps and flag pixel 1 as wet.
pub fn sample_products() -> Vec<(&'static str, RasterStack)> {
    let geobox = fixture_geobox();
    let landsat_times = create_regular_times(utc_date(2020, 1, 3), 8, 16);

    vec![
        (
            "gm_s2_annual",
            create_s2_geomedian_stack(&geobox, vec![utc_date(2020, 1, 1), utc_date(2021, 1, 1)]),
        ),
        (
            "gm_s2_semiannual",
            create_s2_geomedian_stack(&geobox, vec![utc_date(2020, 1, 1), utc_date(2020, 7, 1)]),
        ),
        (
            "ndvi_anomaly",
            create_ndvi_anomaly_stack(&geobox, create_monthly_times(2020, 6)),
        ),
        ("fc_ls", create_fc_stack(&geobox, landsat_times.clone())),
        ("wofs_ls", create_wofs_stack(&geobox, landsat_times, Some(1))),
        ("dem_srtm_deriv", create_slope_stack(&geobox)),
    ]
}

/// An in-memory catalogue holding [`sample_products`].
pub fn sample_catalog() -> MemorySource {
    sample_products()
        .into_iter()
        .fold(MemorySource::new(), |source, (product, stack)| {
            source.with_product(product, stack)
        })
}

/// Write each product as `<dir>/<product>.json`, the layout
/// [`MemorySource::from_dir`] reads.
pub fn write_catalog(dir: &Path, products: &[(&str, RasterStack)]) -> std::io::Result<()> {
    for (product, stack) in products {
        let json = serde_json::to_string(stack)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(dir.join(format!("{}.json", product)), json)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_query_parses() {
        let query = sample_query();
        assert_eq!(query.annual_geomedian_times.len(), 1);
        assert_eq!(query.ls_fc_cover_times.len(), 2);
    }

    #[test]
    fn test_catalog_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        write_catalog(dir.path(), &sample_products()).unwrap();

        let source = MemorySource::from_dir(dir.path()).unwrap();
        assert_eq!(
            source.products(),
            vec!["dem_srtm_deriv", "fc_ls", "gm_s2_annual", "gm_s2_semiannual", "ndvi_anomaly", "wofs_ls"]
        );
    }
}
