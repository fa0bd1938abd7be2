//! Coordinate Reference System handling
//!
//! The focal filter never interprets a CRS; it only carries it from the
//! source raster to the destination. A `CRS` is therefore an opaque
//! descriptor that remembers the form it was read in (WKT from GDAL, the
//! raw key directory from a native GeoTIFF) so it can be written back
//! verbatim.

mod geokeys;

pub use geokeys::{GeoKeys, GEO_ASCII_PARAMS, GEO_DOUBLE_PARAMS};

use std::fmt;

/// Coordinate Reference System descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum CRS {
    /// Authority code in the EPSG registry
    Epsg(u32),
    /// Well-known text definition, kept byte-for-byte
    Wkt(String),
    /// GeoTIFF key directory and parameters, kept value-for-value
    GeoKeys(GeoKeys),
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        CRS::Epsg(code)
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        CRS::Wkt(wkt.into())
    }

    /// Parse a projection reference as reported by a raster store.
    ///
    /// `EPSG:<code>` becomes [`CRS::Epsg`]; anything else non-empty is kept as WKT.
    pub fn parse(reference: &str) -> Option<Self> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(code) = trimmed
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse::<u32>().ok())
        {
            return Some(CRS::Epsg(code));
        }
        Some(CRS::Wkt(reference.to_string()))
    }

    /// EPSG code, if the CRS names one
    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            CRS::Wkt(_) => None,
            CRS::GeoKeys(keys) => keys.epsg(),
        }
    }

    /// WKT definition, either given directly or stored as a GeoTIFF citation
    pub fn wkt(&self) -> Option<&str> {
        match self {
            CRS::Wkt(wkt) => Some(wkt),
            CRS::Epsg(_) => None,
            CRS::GeoKeys(keys) => keys.citation().filter(|c| c.contains('[')),
        }
    }

    /// GeoTIFF description of this CRS; synthesized unless read from a GeoTIFF
    pub fn to_geokeys(&self) -> GeoKeys {
        match self {
            CRS::Epsg(code) => GeoKeys::from_epsg(*code),
            CRS::Wkt(wkt) => GeoKeys::from_wkt(wkt),
            CRS::GeoKeys(keys) => keys.clone(),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.epsg() {
            return write!(f, "EPSG:{}", code);
        }
        match self.wkt() {
            // WKT can be kilobytes long
            Some(wkt) => {
                let head: String = wkt.chars().take(50).collect();
                write!(f, "WKT:{}", head)
            }
            None => write!(f, "user-defined GeoTIFF CRS"),
        }
    }
}
