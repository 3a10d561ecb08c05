//! Spectral index computation.
//!
//! Indices are computed per plane from surface reflectance, after the
//! satellite profile's scale and offset are applied. The time axis is kept,
//! so this runs equally on raw stacks and on collapsed geomedians.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Reducer;
use crate::error::{FeatureError, Result};
use crate::stack::{Band, RasterStack};

/// Supported spectral indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index.
    Ndvi,
    /// Leaf Area Index, derived from EVI.
    Lai,
    /// Soil Adjusted Vegetation Index.
    Savi,
    /// Modified Soil Adjusted Vegetation Index.
    Msavi,
    /// Modified Normalized Difference Water Index.
    Mndwi,
}

impl SpectralIndex {
    /// Indices added to the geomedian features.
    pub const CROP_SET: [SpectralIndex; 5] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Lai,
        SpectralIndex::Savi,
        SpectralIndex::Msavi,
        SpectralIndex::Mndwi,
    ];

    /// Output band name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ndvi => "NDVI",
            Self::Lai => "LAI",
            Self::Savi => "SAVI",
            Self::Msavi => "MSAVI",
            Self::Mndwi => "MNDWI",
        }
    }

    fn inputs(&self) -> &'static [Channel] {
        use Channel::*;
        match self {
            Self::Ndvi | Self::Savi | Self::Msavi => &[Nir, Red],
            Self::Lai => &[Nir, Red, Blue],
            Self::Mndwi => &[Green, Swir1],
        }
    }

    fn evaluate(&self, r: &Reflectance) -> f32 {
        let value = match self {
            Self::Ndvi => (r.nir - r.red) / (r.nir + r.red),
            Self::Lai => 3.618 * evi(r) - 0.118,
            Self::Savi => 1.5 * (r.nir - r.red) / (r.nir + r.red + 0.5),
            Self::Msavi => {
                let a = 2.0 * r.nir + 1.0;
                (a - (a * a - 8.0 * (r.nir - r.red)).sqrt()) / 2.0
            }
            Self::Mndwi => (r.green - r.swir1) / (r.green + r.swir1),
        };
        if value.is_finite() {
            value as f32
        } else {
            f32::NAN
        }
    }
}

impl fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn evi(r: &Reflectance) -> f64 {
    2.5 * (r.nir - r.red) / (r.nir + 6.0 * r.red - 7.5 * r.blue + 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
}

#[derive(Debug, Default)]
struct Reflectance {
    blue: f64,
    green: f64,
    red: f64,
    nir: f64,
    swir1: f64,
}

impl Reflectance {
    fn set(&mut self, channel: Channel, value: f64) {
        match channel {
            Channel::Blue => self.blue = value,
            Channel::Green => self.green = value,
            Channel::Red => self.red = value,
            Channel::Nir => self.nir = value,
            Channel::Swir1 => self.swir1 = value,
        }
    }
}

/// Band naming and digital-number scaling of one sensor's products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteProfile {
    pub mission: String,
    pub blue: String,
    pub green: String,
    pub red: String,
    pub nir: String,
    pub swir1: String,
    /// Every reflectance band the product carries, in load order.
    pub spectral: Vec<String>,
    /// Reflectance = value * scale + offset.
    pub scale: f64,
    pub offset: f64,
}

impl SatelliteProfile {
    /// Sentinel-2 surface reflectance products.
    pub fn s2() -> Self {
        Self {
            mission: "s2".to_string(),
            blue: "blue".to_string(),
            green: "green".to_string(),
            red: "red".to_string(),
            nir: "nir_1".to_string(),
            swir1: "swir_1".to_string(),
            spectral: [
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
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            scale: 1.0 / 10_000.0,
            offset: 0.0,
        }
    }

    pub fn spectral_bands(&self) -> Vec<String> {
        self.spectral.clone()
    }

    fn band_for(&self, channel: Channel) -> &str {
        match channel {
            Channel::Blue => &self.blue,
            Channel::Green => &self.green,
            Channel::Red => &self.red,
            Channel::Nir => &self.nir,
            Channel::Swir1 => &self.swir1,
        }
    }
}

/// Append the requested indices as new bands.
///
/// With `keep_original` false only the index bands are returned. Pixels with
/// a missing input, or where an index is undefined, become NaN.
pub fn compute_indices(
    stack: &RasterStack,
    indices: &[SpectralIndex],
    profile: &SatelliteProfile,
    keep_original: bool,
) -> Result<RasterStack> {
    let mut out: Vec<Band> = if keep_original {
        stack.bands().to_vec()
    } else {
        Vec::new()
    };

    for index in indices {
        let inputs: Vec<(Channel, &Band)> = index
            .inputs()
            .iter()
            .map(|&channel| {
                let name = profile.band_for(channel);
                stack
                    .band(name)
                    .map(|band| (channel, band))
                    .ok_or_else(|| FeatureError::BandNotFound(name.to_string()))
            })
            .collect::<Result<_>>()?;

        let planes = (0..stack.steps())
            .map(|step| {
                (0..stack.geobox().len())
                    .map(|px| {
                        let mut r = Reflectance::default();
                        for (channel, band) in &inputs {
                            let raw = band.planes[step][px];
                            if band.is_missing(raw) {
                                return f32::NAN;
                            }
                            r.set(*channel, raw as f64 * profile.scale + profile.offset);
                        }
                        index.evaluate(&r)
                    })
                    .collect()
            })
            .collect();

        out.push(Band::new(index.name(), planes));
    }

    stack.with_bands(out)
}

/// Non-collapsing reducer wrapping [`compute_indices`].
#[derive(Debug, Clone)]
pub struct IndexEnrichment {
    indices: Vec<SpectralIndex>,
    profile: SatelliteProfile,
    keep_original: bool,
}

impl IndexEnrichment {
    pub fn new(indices: Vec<SpectralIndex>, profile: SatelliteProfile, keep_original: bool) -> Self {
        Self {
            indices,
            profile,
            keep_original,
        }
    }
}

impl Reducer for IndexEnrichment {
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack> {
        compute_indices(stack, &self.indices, &self.profile, self.keep_original)
    }
}
