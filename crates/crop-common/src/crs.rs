//! Coordinate Reference System types and utilities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CommonError;

/// An EPSG-coded coordinate reference system.
///
/// Serialized as its "EPSG:xxxx" string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    /// WGS84 geographic (lat/lon in degrees).
    pub const WGS84: Crs = Crs { epsg: 4326 };

    /// WGS84 / NSIDC EASE-Grid 2.0 Global, the equal-area grid used for
    /// continental crop mapping products.
    pub const EASE_GRID_2: Crs = Crs { epsg: 6933 };

    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4269)
    }
}

impl FromStr for Crs {
    type Err = CommonError;

    /// Accepts "EPSG:6933", "epsg:6933" and "CRS:84" (WGS84, lon/lat order).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();

        if normalized == "CRS:84" {
            return Ok(Crs::WGS84);
        }

        let code = normalized
            .strip_prefix("EPSG:")
            .ok_or_else(|| CommonError::InvalidCrs(s.to_string()))?;

        code.parse::<u32>()
            .ok()
            .filter(|epsg| *epsg > 0)
            .map(Crs::from_epsg)
            .ok_or_else(|| CommonError::InvalidCrs(s.to_string()))
    }
}

impl TryFrom<String> for Crs {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!("EPSG:6933".parse::<Crs>().unwrap(), Crs::EASE_GRID_2);
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!("CRS:84".parse::<Crs>().unwrap(), Crs::WGS84);
        assert!("EPSG:abc".parse::<Crs>().is_err());
        assert!("6933".parse::<Crs>().is_err());
        assert!("EPSG:0".parse::<Crs>().is_err());
    }

    #[test]
    fn test_serde_string_form() {
        let json = serde_json::to_string(&Crs::EASE_GRID_2).unwrap();
        assert_eq!(json, "\"EPSG:6933\"");

        let back: Crs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Crs::EASE_GRID_2);
        assert!(!back.is_geographic());
        assert!(Crs::WGS84.is_geographic());
    }
}
