//! GeoTIFF key directories
//!
//! A GeoTIFF describes its CRS with a key directory plus two parameter
//! tags holding the double and ASCII values the keys point into. Read from
//! a file, the three are kept exactly as stored so they can be written to
//! another file unchanged.

/// `GeoDoubleParamsTag`, location of keys stored as doubles
pub const GEO_DOUBLE_PARAMS: u16 = 34736;
/// `GeoAsciiParamsTag`, location of keys stored as text
pub const GEO_ASCII_PARAMS: u16 = 34737;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GT_CITATION_KEY: u16 = 1026;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Raw GeoTIFF CRS description
#[derive(Debug, Clone, PartialEq)]
pub struct GeoKeys {
    /// `GeoKeyDirectoryTag`: a 4-value header followed by
    /// `(key, location, count, value)` entries
    pub directory: Vec<u16>,
    /// `GeoDoubleParamsTag`
    pub doubles: Vec<f64>,
    /// `GeoAsciiParamsTag`, `|`-separated
    pub ascii: String,
}

impl GeoKeys {
    pub fn new(directory: Vec<u16>, doubles: Vec<f64>, ascii: impl Into<String>) -> Self {
        Self {
            directory,
            doubles,
            ascii: ascii.into(),
        }
    }

    /// Minimal directory for an EPSG code.
    ///
    /// Without a registry the CRS kind is guessed: codes 4000..5000 are
    /// written as geographic, everything else as projected.
    pub fn from_epsg(code: u32) -> Self {
        let geographic = (4000..5000).contains(&code);
        let (model, key) = if geographic {
            (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_KEY)
        } else {
            (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_KEY)
        };
        let value = u16::try_from(code).unwrap_or(USER_DEFINED);
        Self::from_entries(
            &[
                [GT_MODEL_TYPE_KEY, 0, 1, model],
                [GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA],
                [key, 0, 1, value],
            ],
            String::new(),
        )
    }

    /// Directory carrying a WKT definition as the GeoTIFF citation
    pub fn from_wkt(wkt: &str) -> Self {
        let trimmed = wkt.trim_start();
        let geographic = trimmed.starts_with("GEOGCS") || trimmed.starts_with("GEOGCRS");
        let model = if geographic { MODEL_TYPE_GEOGRAPHIC } else { MODEL_TYPE_PROJECTED };
        // the count includes the '|' terminator
        let count = u16::try_from(wkt.len() + 1).unwrap_or(u16::MAX);
        Self::from_entries(
            &[
                [GT_MODEL_TYPE_KEY, 0, 1, model],
                [GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA],
                [GT_CITATION_KEY, GEO_ASCII_PARAMS, count, 0],
            ],
            format!("{}|", wkt),
        )
    }

    fn from_entries(entries: &[[u16; 4]], ascii: String) -> Self {
        let mut directory = vec![1, 1, 0, entries.len() as u16];
        directory.extend(entries.iter().flatten());
        Self::new(directory, Vec::new(), ascii)
    }

    /// `(key, location, count, value)` entries announced by the header
    pub fn entries(&self) -> impl Iterator<Item = (u16, u16, u16, u16)> + '_ {
        let announced = self.directory.get(3).copied().unwrap_or(0) as usize;
        self.directory
            .get(4..)
            .unwrap_or(&[])
            .chunks_exact(4)
            .take(announced)
            .map(|e| (e[0], e[1], e[2], e[3]))
    }

    /// EPSG code of the projected or geographic CRS, unless user-defined
    pub fn epsg(&self) -> Option<u32> {
        [PROJECTED_CS_TYPE_KEY, GEOGRAPHIC_TYPE_KEY]
            .into_iter()
            .find_map(|wanted| {
                self.entries()
                    .find(|&(key, location, _, value)| {
                        key == wanted && location == 0 && value != USER_DEFINED
                    })
                    .map(|(_, _, _, value)| value as u32)
            })
    }

    /// Text of `GTCitationGeoKey`, without its terminator
    pub fn citation(&self) -> Option<&str> {
        let (_, _, count, offset) = self
            .entries()
            .find(|&(key, location, _, _)| key == GT_CITATION_KEY && location == GEO_ASCII_PARAMS)?;
        let start = offset as usize;
        let end = start + (count as usize).saturating_sub(1);
        self.ascii.get(start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projected_code_in_geographic_range_is_read_as_given() {
        // CGCS2000 / 3-degree Gauss-Kruger CM 114E is projected
        let keys = GeoKeys::new(vec![1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 4547], vec![], "");
        assert_eq!(keys.epsg(), Some(4547));
        assert_eq!(keys.citation(), None);
    }

    #[test]
    fn test_user_defined_has_no_epsg() {
        let keys = GeoKeys::new(
            vec![1, 1, 0, 4, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 32767, 3074, 0, 1, 16033],
            vec![],
            "",
        );
        assert_eq!(keys.epsg(), None);
        assert_eq!(keys.entries().count(), 4);
    }

    #[test]
    fn test_wkt_citation_roundtrip() {
        let wkt = "PROJCS[\"Local grid\"]";
        let keys = GeoKeys::from_wkt(wkt);
        assert_eq!(keys.citation(), Some(wkt));
        assert_eq!(keys.ascii, format!("{}|", wkt));
    }

    #[test]
    fn test_from_epsg() {
        let keys = GeoKeys::from_epsg(32719);
        assert_eq!(keys.directory, vec![1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 32719]);
        assert_eq!(GeoKeys::from_epsg(4326).epsg(), Some(4326));
    }

    #[test]
    fn test_truncated_directory() {
        let keys = GeoKeys::new(vec![1, 1, 0, 5, 1024, 0, 1], vec![], "");
        assert_eq!(keys.entries().count(), 0);
        assert_eq!(GeoKeys::new(vec![], vec![], "").epsg(), None);
    }
}
