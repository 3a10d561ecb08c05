//! Query and runtime configuration.
//!
//! [`QueryConfig`] is read once from YAML, validated as a whole, and then
//! only handed out read-only: pipelines get the shared [`BaselineQuery`]
//! plus their own time specification. [`CollectorConfig`] holds the
//! numeric knobs, read from the environment.

use chrono::Duration;
use crop_common::{time::parse_period, BoundingBox, Crs, TimeRange, WindowSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FeatureError, Result};
use crate::reduce::{GeomedianConfig, StatReducer};
use crate::source::{LoadRequest, Resampling};

/// Date the static terrain product is indexed at.
pub const DEFAULT_SLOPE_TIME: &str = "2000-01-01";

/// Load parameters shared by every product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineQuery {
    /// Area of interest, in `footprint_crs` units.
    pub footprint: BoundingBox,
    pub footprint_crs: Crs,
    pub output_crs: Crs,
    /// Output pixel size (x, y); y is negative for north-up grids.
    pub resolution: (f64, f64),
    /// Resampling for products that do not pick their own.
    pub resampling: Resampling,
}

impl BaselineQuery {
    /// A load request for `product` over `time`, with baseline settings.
    pub fn request<S: Into<String>>(
        &self,
        product: &str,
        measurements: impl IntoIterator<Item = S>,
        time: TimeRange,
    ) -> LoadRequest {
        LoadRequest {
            product: product.to_string(),
            measurements: measurements.into_iter().map(Into::into).collect(),
            footprint: self.footprint,
            footprint_crs: self.footprint_crs,
            output_crs: self.output_crs,
            resolution: self.resolution,
            time,
            resampling: self.resampling,
            like: None,
            collection_category: None,
        }
    }
}

/// A validated feature collection query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryConfig {
    pub baseline: BaselineQuery,
    pub annual_geomedian_times: WindowSpec,
    pub semiannual_geomedian_times: WindowSpec,
    pub monthly_ndvi_time_range: TimeRange,
    pub ls_fc_cover_times: WindowSpec,
    pub slope_time: TimeRange,
    pub fc_reducer: StatReducer,
}

#[derive(Debug, Default, Deserialize)]
struct RawQueryConfig {
    footprint: Option<RawFootprint>,
    output_crs: Option<Crs>,
    resolution: Option<RawResolution>,
    resampling: Option<Resampling>,
    annual_geomedian_times: Option<WindowSpec>,
    semiannual_geomedian_times: Option<WindowSpec>,
    monthly_ndvi_time_range: Option<TimeRange>,
    ls_fc_cover_times: Option<WindowSpec>,
    slope_time: Option<String>,
    fc_reducer: Option<StatReducer>,
}

/// Either an explicit box or a point with a buffer around it.
#[derive(Debug, Deserialize)]
struct RawFootprint {
    bbox: Option<RawBbox>,
    x: Option<f64>,
    y: Option<f64>,
    buffer: Option<f64>,
    crs: Option<Crs>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBbox {
    Array([f64; 4]),
    Text(String),
    Table(BoundingBox),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResolution {
    Square(f64),
    Pair(f64, f64),
}

impl RawFootprint {
    fn resolve(self) -> Result<(BoundingBox, Crs)> {
        let crs = self.crs.unwrap_or(Crs::WGS84);
        let bbox = match (self.bbox, self.x, self.y, self.buffer) {
            (Some(RawBbox::Array([a, b, c, d])), ..) => BoundingBox::new(a, b, c, d),
            (Some(RawBbox::Text(s)), ..) => {
                BoundingBox::parse(&s).map_err(|e| FeatureError::config(e.to_string()))?
            }
            (Some(RawBbox::Table(bbox)), ..) => bbox,
            (None, Some(x), Some(y), Some(buffer)) => BoundingBox::around(x, y, buffer),
            _ => {
                return Err(FeatureError::config(
                    "footprint needs either 'bbox' or all of 'x', 'y' and 'buffer'",
                ))
            }
        };
        bbox.validate().map_err(|e| FeatureError::config(e.to_string()))?;
        Ok((bbox, crs))
    }
}

impl RawResolution {
    fn resolve(self) -> Result<(f64, f64)> {
        let (x, y) = match self {
            // A single size means square, north-up pixels.
            Self::Square(size) => (size.abs(), -size.abs()),
            Self::Pair(x, y) => (x, y),
        };
        if !(x.is_finite() && y.is_finite()) || x <= 0.0 || y == 0.0 {
            return Err(FeatureError::config(format!(
                "resolution must be (positive, non-zero), got ({}, {})",
                x, y
            )));
        }
        Ok((x, y))
    }
}

impl QueryConfig {
    /// Keys that must be present in every query.
    pub const REQUIRED_KEYS: [&'static str; 7] = [
        "footprint",
        "output_crs",
        "resolution",
        "annual_geomedian_times",
        "semiannual_geomedian_times",
        "monthly_ndvi_time_range",
        "ls_fc_cover_times",
    ];

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawQueryConfig = serde_yaml::from_str(yaml)?;
        Self::from_raw(raw)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    fn from_raw(raw: RawQueryConfig) -> Result<Self> {
        let present = [
            raw.footprint.is_some(),
            raw.output_crs.is_some(),
            raw.resolution.is_some(),
            raw.annual_geomedian_times.is_some(),
            raw.semiannual_geomedian_times.is_some(),
            raw.monthly_ndvi_time_range.is_some(),
            raw.ls_fc_cover_times.is_some(),
        ];
        let missing: Vec<&str> = Self::REQUIRED_KEYS
            .iter()
            .zip(present)
            .filter(|(_, found)| !found)
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(FeatureError::config(format!(
                "query is missing required key(s): {}",
                missing.join(", ")
            )));
        }

        let (Some(footprint), Some(output_crs), Some(resolution)) =
            (raw.footprint, raw.output_crs, raw.resolution)
        else {
            return Err(FeatureError::config("query is missing spatial parameters"));
        };
        let (footprint, footprint_crs) = footprint.resolve()?;

        let baseline = BaselineQuery {
            footprint,
            footprint_crs,
            output_crs,
            resolution: resolution.resolve()?,
            resampling: raw.resampling.unwrap_or_default(),
        };

        let slope_time = parse_period(raw.slope_time.as_deref().unwrap_or(DEFAULT_SLOPE_TIME))?;

        Ok(Self {
            baseline,
            annual_geomedian_times: non_empty("annual_geomedian_times", raw.annual_geomedian_times)?,
            semiannual_geomedian_times: non_empty(
                "semiannual_geomedian_times",
                raw.semiannual_geomedian_times,
            )?,
            monthly_ndvi_time_range: raw
                .monthly_ndvi_time_range
                .ok_or_else(|| FeatureError::config("monthly_ndvi_time_range is required"))?,
            ls_fc_cover_times: non_empty("ls_fc_cover_times", raw.ls_fc_cover_times)?,
            slope_time,
            fc_reducer: raw.fc_reducer.unwrap_or_default(),
        })
    }
}

fn non_empty(key: &str, spec: Option<WindowSpec>) -> Result<WindowSpec> {
    match spec {
        Some(spec) if !spec.is_empty() => Ok(spec),
        Some(_) => Err(FeatureError::config(format!("{} has no windows", key))),
        None => Err(FeatureError::config(format!("{} is required", key))),
    }
}

/// Runtime knobs for feature collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// How far a mask observation may be from a target observation and
    /// still be matched to it, in seconds.
    pub mask_match_tolerance_secs: i64,

    /// Weiszfeld solver limits for the geomedian pipelines.
    pub geomedian: GeomedianConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            mask_match_tolerance_secs: 0,
            geomedian: GeomedianConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MASK_MATCH_TOLERANCE_SECS") {
            if let Ok(secs) = val.parse() {
                config.mask_match_tolerance_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("GEOMEDIAN_MAX_ITERATIONS") {
            if let Ok(iterations) = val.parse() {
                config.geomedian.max_iterations = iterations;
            }
        }

        if let Ok(val) = std::env::var("GEOMEDIAN_TOLERANCE") {
            if let Ok(tolerance) = val.parse() {
                config.geomedian.tolerance = tolerance;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.mask_match_tolerance_secs < 0 {
            return Err("mask_match_tolerance_secs must be >= 0".to_string());
        }

        if Duration::try_seconds(self.mask_match_tolerance_secs).is_none() {
            return Err(format!(
                "mask_match_tolerance_secs {} is out of range",
                self.mask_match_tolerance_secs
            ));
        }

        if self.geomedian.max_iterations == 0 {
            return Err("geomedian max_iterations must be > 0".to_string());
        }

        if !(self.geomedian.tolerance.is_finite() && self.geomedian.tolerance > 0.0) {
            return Err("geomedian tolerance must be a positive number".to_string());
        }

        Ok(())
    }

    /// Saturates at the largest representable duration; `validate` rejects
    /// values that would need it.
    pub fn mask_match_tolerance(&self) -> Duration {
        Duration::try_seconds(self.mask_match_tolerance_secs).unwrap_or_else(Duration::max_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crop_common::TimeSelector;

    const QUERY: &str = r#"
footprint:
  x: 3540000
  y: -1970000
  buffer: 50
  crs: "EPSG:6933"
output_crs: "EPSG:6933"
resolution: 10
annual_geomedian_times:
  y1: "2020-01-01"
semiannual_geomedian_times:
  h1: "2020-01-01"
  h2: "2020-07-01"
monthly_ndvi_time_range: ["2020-01", "2020-12"]
ls_fc_cover_times:
  b1: "2020-01-01/2020-02-28"
  b2: "2020-03-01/2020-04-30"
"#;

    #[test]
    fn test_parse_full_query() {
        let query = QueryConfig::from_yaml_str(QUERY).unwrap();

        assert_eq!(query.baseline.footprint, BoundingBox::around(3_540_000.0, -1_970_000.0, 50.0));
        assert_eq!(query.baseline.footprint_crs, Crs::EASE_GRID_2);
        assert_eq!(query.baseline.resolution, (10.0, -10.0));
        assert_eq!(query.baseline.resampling, Resampling::Nearest);
        assert_eq!(query.semiannual_geomedian_times.labels().collect::<Vec<_>>(), vec!["h1", "h2"]);
        assert!(matches!(
            query.ls_fc_cover_times.get("b1"),
            Some(TimeSelector::Interval(_))
        ));
        assert_eq!(query.slope_time, parse_period("2000-01-01").unwrap());
        assert_eq!(query.fc_reducer, StatReducer::Mean);
    }

    #[test]
    fn test_missing_keys_all_reported() {
        let err = QueryConfig::from_yaml_str("output_crs: \"EPSG:6933\"\nresolution: 10\n").unwrap_err();
        match err {
            FeatureError::Configuration(msg) => {
                for key in [
                    "footprint",
                    "annual_geomedian_times",
                    "semiannual_geomedian_times",
                    "monthly_ndvi_time_range",
                    "ls_fc_cover_times",
                ] {
                    assert!(msg.contains(key), "{} not in '{}'", key, msg);
                }
                assert!(!msg.contains("output_crs"));
            }
            other => panic!("Expected Configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_bbox_forms_and_overrides() {
        let yaml = QUERY
            .replace("  x: 3540000\n  y: -1970000\n  buffer: 50\n", "  bbox: \"0,0,100,100\"\n")
            .replace("resolution: 10", "resolution: [20, -20]\nresampling: bilinear\nfc_reducer: median");
        let query = QueryConfig::from_yaml_str(&yaml).unwrap();

        assert_eq!(query.baseline.footprint, BoundingBox::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(query.baseline.resolution, (20.0, -20.0));
        assert_eq!(query.baseline.resampling, Resampling::Bilinear);
        assert_eq!(query.fc_reducer, StatReducer::Median);

        let array = QUERY.replace("  x: 3540000\n  y: -1970000\n  buffer: 50\n", "  bbox: [0, 0, 100, 100]\n");
        assert!(QueryConfig::from_yaml_str(&array).is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let empty = QUERY.replace("annual_geomedian_times:\n  y1: \"2020-01-01\"", "annual_geomedian_times: {}");
        assert!(matches!(
            QueryConfig::from_yaml_str(&empty),
            Err(FeatureError::Configuration(msg)) if msg.contains("no windows")
        ));

        let duplicate = QUERY.replace("h2: \"2020-07-01\"", "h1: \"2020-07-01\"");
        assert!(QueryConfig::from_yaml_str(&duplicate).is_err());

        let no_buffer = QUERY.replace("  buffer: 50\n", "");
        assert!(matches!(
            QueryConfig::from_yaml_str(&no_buffer),
            Err(FeatureError::Configuration(_))
        ));
    }

    #[test]
    fn test_baseline_request() {
        let query = QueryConfig::from_yaml_str(QUERY).unwrap();
        let request = query.baseline.request(
            "gm_s2_annual",
            ["blue", "green"],
            query.annual_geomedian_times.span().unwrap(),
        );
        assert_eq!(request.product, "gm_s2_annual");
        assert_eq!(request.measurements, vec!["blue", "green"]);
        assert_eq!(request.output_crs, Crs::EASE_GRID_2);
        assert!(request.like.is_none());
    }

    #[test]
    fn test_collector_config_validate() {
        let config = CollectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mask_match_tolerance(), Duration::zero());

        let mut bad = CollectorConfig::default();
        bad.geomedian.max_iterations = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_tolerance_beyond_duration_range_rejected() {
        let mut config = CollectorConfig::default();
        config.mask_match_tolerance_secs = i64::MAX;
        assert!(config.validate().unwrap_err().contains("out of range"));
        assert_eq!(config.mask_match_tolerance(), Duration::max_value());

        config.mask_match_tolerance_secs = 86_400;
        assert!(config.validate().is_ok());
        assert_eq!(config.mask_match_tolerance(), Duration::days(1));
    }

    #[test]
    fn test_unknown_resampling_rejected() {
        let yaml = QUERY.replace("resolution: 10", "resolution: 10\nresampling: bilnear");
        assert!(matches!(
            QueryConfig::from_yaml_str(&yaml),
            Err(FeatureError::Configuration(msg)) if msg.contains("bilnear")
        ));
    }

    #[test]
    fn test_bad_bbox_is_a_configuration_error() {
        for bbox in ["  bbox: \"10,0,0,10\"\n", "  bbox: [10, 0, 0, 10]\n", "  bbox: \"1,2,x,4\"\n"] {
            let yaml = QUERY.replace("  x: 3540000\n  y: -1970000\n  buffer: 50\n", bbox);
            assert!(
                matches!(QueryConfig::from_yaml_str(&yaml), Err(FeatureError::Configuration(_))),
                "{}",
                bbox
            );
        }
    }
}
