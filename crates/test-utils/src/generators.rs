//! Test data generators for synthetic product stacks.
//!
//! These generators create predictable, verifiable stacks shaped like the
//! real products (same band names, cadences and fill values), so pipeline
//! output can be checked by hand.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use crop_common::{Crs, GeoBox};
use feature_cube::{Band, RasterStack};

/// Pixel size of every generated grid, in metres.
pub const TEST_RESOLUTION: f64 = 10.0;

/// Water observation value for a wet pixel (bit 7 set).
pub const WOFS_WET: f32 = 128.0;

/// Creates a north-up EASE-Grid 2.0 geobox with its top-left corner at
/// `(0, height * 10)`, matching the fixture query footprint.
pub fn create_test_geobox(width: usize, height: usize) -> GeoBox {
    GeoBox::new(
        Crs::EASE_GRID_2,
        width,
        height,
        (TEST_RESOLUTION, -TEST_RESOLUTION),
        (0.0, height as f64 * TEST_RESOLUTION),
    )
}

/// Creates a test plane with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// # Example
///
/// ```
/// use test_utils::create_test_plane;
///
/// let plane = create_test_plane(10, 5);
/// assert_eq!(plane.len(), 50);
/// assert_eq!(plane[1], 1000.0);  // col=1, row=0
/// assert_eq!(plane[10], 1.0);    // col=0, row=1
/// ```
pub fn create_test_plane(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Midnight UTC on the given date.
///
/// # Panics
///
/// Panics on an invalid date.
pub fn utc_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    let date = NaiveDate::from_ymd_opt(year, month, day).expect("valid date");
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("valid time"))
}

/// `count` timestamps starting at `start`, `step_days` apart.
pub fn create_regular_times(start: DateTime<Utc>, count: usize, step_days: i64) -> Vec<DateTime<Utc>> {
    (0..count)
        .map(|i| start + chrono::Duration::days(step_days * i as i64))
        .collect()
}

/// Mid-month timestamps for months `1..=months` of `year`.
pub fn create_monthly_times(year: i32, months: u32) -> Vec<DateTime<Utc>> {
    (1..=months).map(|m| utc_date(year, m, 15)).collect()
}

/// A stack whose cell values come from `value(band_index, step, pixel)`.
pub fn create_stack(
    geobox: &GeoBox,
    times: Option<Vec<DateTime<Utc>>>,
    bands: &[&str],
    value: impl Fn(usize, usize, usize) -> f32,
) -> RasterStack {
    let steps = times.as_ref().map_or(1, Vec::len);
    let pixels = geobox.len();
    let bands = bands
        .iter()
        .enumerate()
        .map(|(b, name)| {
            let planes = (0..steps)
                .map(|t| (0..pixels).map(|px| value(b, t, px)).collect())
                .collect();
            Band::new(*name, planes)
        })
        .collect();
    RasterStack::new(geobox.clone(), times, bands).expect("generated stack is well formed")
}

/// A stack with the same value in every cell of every band.
pub fn create_constant_stack(
    geobox: &GeoBox,
    times: Option<Vec<DateTime<Utc>>>,
    bands: &[&str],
    value: f32,
) -> RasterStack {
    create_stack(geobox, times, bands, |_, _, _| value)
}

/// Sentinel-2 geomedian product: 10 reflectance bands plus MAD bands.
///
/// Reflectances are vegetated-field digital numbers (red 1000, NIR 3000)
/// offset by 10 per time step, so NDVI is always defined and positive.
pub fn create_s2_geomedian_stack(geobox: &GeoBox, times: Vec<DateTime<Utc>>) -> RasterStack {
    const BANDS: [(&str, f32); 13] = [
        ("blue", 500.0),
        ("green", 800.0),
        ("red", 1000.0),
        ("nir_1", 3000.0),
        ("nir_2", 3100.0),
        ("swir_1", 1800.0),
        ("swir_2", 1200.0),
        ("red_edge_1", 1400.0),
        ("red_edge_2", 2200.0),
        ("red_edge_3", 2600.0),
        ("smad", 0.002),
        ("emad", 450.0),
        ("bcmad", 0.05),
    ];
    let names: Vec<&str> = BANDS.iter().map(|(name, _)| *name).collect();
    create_stack(geobox, Some(times), &names, |b, t, _| {
        let (_, base) = BANDS[b];
        if b < 10 {
            base + 10.0 * t as f32
        } else {
            base
        }
    })
}

/// Landsat fractional cover: `bs`, `pv`, `npv`, `ue` with per-step values
/// `10 * (band + 1) + step`.
pub fn create_fc_stack(geobox: &GeoBox, times: Vec<DateTime<Utc>>) -> RasterStack {
    create_stack(geobox, Some(times), &["bs", "pv", "npv", "ue"], |b, t, _| {
        (10 * (b + 1) + t) as f32
    })
}

/// WOfS water observations: dry everywhere except `wet_pixel` on every step.
pub fn create_wofs_stack(
    geobox: &GeoBox,
    times: Vec<DateTime<Utc>>,
    wet_pixel: Option<usize>,
) -> RasterStack {
    create_stack(geobox, Some(times), &["water"], |_, _, px| {
        if Some(px) == wet_pixel {
            WOFS_WET
        } else {
            0.0
        }
    })
}

/// Monthly NDVI anomaly product, `ndvi_mean` = `0.1 * (step + 1)`.
pub fn create_ndvi_anomaly_stack(geobox: &GeoBox, times: Vec<DateTime<Utc>>) -> RasterStack {
    create_stack(geobox, Some(times), &["ndvi_mean"], |_, t, _| 0.1 * (t + 1) as f32)
}

/// SRTM derivatives slope on 2000-01-01, with pixel 0 set to the -9999 fill.
pub fn create_slope_stack(geobox: &GeoBox) -> RasterStack {
    let width = geobox.width;
    create_stack(geobox, Some(vec![utc_date(2000, 1, 1)]), &["slope"], |_, _, px| {
        if px == 0 {
            -9999.0
        } else {
            (px % width) as f32 * 0.5
        }
    })
}
