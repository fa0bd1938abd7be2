//! Native GeoTIFF store (without GDAL dependency)
//!
//! Uses the `tiff` crate for TIFF I/O. Band 1 of the source is decoded into
//! memory when opened, so per-cell reads never touch the file again.
//! Destinations are buffered and encoded as single-band `Float32` GeoTIFFs
//! when closed.
//!
//! Georeferencing support:
//! - transform: `ModelPixelScale` + `ModelTiepoint`, or `ModelTransformation`
//!   for rotated / south-up grids
//! - CRS: the GeoKey directory with its double and ASCII parameters, kept
//!   exactly as read and written back unchanged
//! - nodata: the `GDAL_NODATA` ASCII tag

use crate::crs::{GeoKeys, CRS, GEO_ASCII_PARAMS, GEO_DOUBLE_PARAMS};
use crate::error::{Error, Result};
use crate::io::store::{CreationOptions, GridReader, GridWriter, RasterStore};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::compression::{
    Compression as TiffCompression, Deflate, Lzw, Packbits, Uncompressed,
};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::{debug, warn};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Tag for a GeoTIFF/GDAL code.
///
/// `tiff` decodes these codes to named variants, so a `Tag::Unknown` with
/// the same number never matches a tag read from a file.
fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Compression algorithms supported by the native writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Deflate,
    Lzw,
    PackBits,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Compression::None),
            "DEFLATE" | "ZIP" => Ok(Compression::Deflate),
            "LZW" => Ok(Compression::Lzw),
            "PACKBITS" => Ok(Compression::PackBits),
            other => Err(format!(
                "unsupported compression '{}' (use DEFLATE, LZW, PACKBITS or NONE)",
                other
            )),
        }
    }
}

/// Store backed by GeoTIFF files. Accepts the `GTiff` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffStore;

impl GeoTiffStore {
    /// Format name accepted by [`RasterStore::create_for_write`]
    pub const FORMAT: &'static str = "GTiff";

    pub fn new() -> Self {
        Self
    }
}

impl RasterStore for GeoTiffStore {
    type Reader = GeoTiffReader;
    type Writer = GeoTiffWriter;

    fn open_for_read(&self, path: &Path) -> Result<GeoTiffReader> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            _ => Error::UnreadableFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        let decoded = decode_geotiff(file).map_err(|reason| Error::UnreadableFormat {
            path: path.to_path_buf(),
            reason,
        })?;
        debug!(
            "Opened {} ({} x {}, {} band(s))",
            path.display(),
            decoded.raster.cols(),
            decoded.raster.rows(),
            decoded.band_count
        );

        Ok(GeoTiffReader {
            path: path.to_path_buf(),
            raster: decoded.raster,
            band_count: decoded.band_count,
            closed: false,
        })
    }

    fn create_for_write(
        &self,
        path: &Path,
        rows: usize,
        cols: usize,
        format: &str,
        options: &CreationOptions,
    ) -> Result<GeoTiffWriter> {
        let target_error = |reason: String| Error::WriteTarget {
            path: path.to_path_buf(),
            reason,
        };

        if !format.eq_ignore_ascii_case(Self::FORMAT) {
            return Err(target_error(format!(
                "unsupported format '{}', expected {}",
                format,
                Self::FORMAT
            )));
        }
        if rows == 0 || cols == 0 || u32::try_from(rows).is_err() || u32::try_from(cols).is_err() {
            return Err(target_error(format!("cannot create a {}x{} raster", rows, cols)));
        }
        let compression = match options.compression() {
            Some(name) => name.parse::<Compression>().map_err(target_error)?,
            None => Compression::None,
        };
        for (key, value) in options.iter() {
            if key != CreationOptions::COMPRESS {
                warn!("Ignoring unsupported creation option {}={}", key, value);
            }
        }

        let file = File::create(path).map_err(|e| target_error(e.to_string()))?;
        debug!("Created {} ({} x {}, {:?})", path.display(), cols, rows, compression);

        Ok(GeoTiffWriter {
            path: path.to_path_buf(),
            file: Some(file),
            raster: Raster::new(rows, cols),
            nodata: None,
            compression,
            closed: false,
        })
    }
}

/// Read handle of a [`GeoTiffStore`]
#[derive(Debug)]
pub struct GeoTiffReader {
    path: PathBuf,
    raster: Raster<f64>,
    band_count: usize,
    closed: bool,
}

impl GridReader for GeoTiffReader {
    fn rows(&self) -> usize {
        self.raster.rows()
    }

    fn cols(&self) -> usize {
        self.raster.cols()
    }

    fn band_count(&self) -> usize {
        self.band_count
    }

    fn nodata(&self) -> Option<f64> {
        self.raster.nodata()
    }

    fn geo_transform(&self) -> GeoTransform {
        *self.raster.transform()
    }

    fn projection(&self) -> Option<CRS> {
        self.raster.crs().cloned()
    }

    fn read_cell(&self, row: usize, col: usize) -> Result<f64> {
        if self.closed {
            return Err(Error::cell_io(&self.path, row, col, "read on a closed handle"));
        }
        self.raster
            .get(row, col)
            .map_err(|e| Error::cell_io(&self.path, row, col, e))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            // release the decoded band
            self.raster = Raster::new(0, 0);
        }
        Ok(())
    }
}

/// Write handle of a [`GeoTiffStore`]
///
/// The file is created when the handle is, and encoded on [`GridWriter::close`].
/// A writer dropped without being closed deletes its file.
#[derive(Debug)]
pub struct GeoTiffWriter {
    path: PathBuf,
    file: Option<File>,
    raster: Raster<f32>,
    // kept apart from `raster` so the sentinel is not narrowed to f32
    nodata: Option<f64>,
    compression: Compression,
    closed: bool,
}

impl GeoTiffWriter {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::raster_io(&self.path, "write on a closed handle"));
        }
        Ok(())
    }

    fn remove_file(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::raster_io(&self.path, e)),
        }
    }
}

impl GridWriter for GeoTiffWriter {
    fn rows(&self) -> usize {
        self.raster.rows()
    }

    fn cols(&self) -> usize {
        self.raster.cols()
    }

    fn set_geo_transform(&mut self, transform: GeoTransform) -> Result<()> {
        self.ensure_open()?;
        self.raster.set_transform(transform);
        Ok(())
    }

    fn set_projection(&mut self, crs: Option<&CRS>) -> Result<()> {
        self.ensure_open()?;
        self.raster.set_crs(crs.cloned());
        Ok(())
    }

    fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()> {
        self.ensure_open()?;
        self.nodata = nodata;
        Ok(())
    }

    fn write_cell(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if self.closed {
            return Err(Error::cell_io(&self.path, row, col, "write on a closed handle"));
        }
        self.raster
            .set(row, col, value as f32)
            .map_err(|e| Error::cell_io(&self.path, row, col, e))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let mut sink = BufWriter::new(file);
        let encoded = encode_geotiff(&self.raster, self.nodata, &mut sink, self.compression)
            .and_then(|()| sink.flush().map_err(|e| e.to_string()));

        match encoded {
            Ok(()) => {
                debug!("Finalized {}", self.path.display());
                Ok(())
            }
            Err(reason) => {
                drop(sink);
                self.remove_file()?;
                Err(Error::raster_io(&self.path, reason))
            }
        }
    }

    fn discard(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.file = None;
        self.remove_file()
    }
}

impl Drop for GeoTiffWriter {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Discarding unfinished raster {}", self.path.display());
            if let Err(e) = self.discard() {
                warn!("{}", e);
            }
        }
    }
}

/// Read band 1 of a GeoTIFF file into a Raster
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster<f64>> {
    let mut reader = GeoTiffStore.open_for_read(path.as_ref())?;
    let raster = std::mem::replace(&mut reader.raster, Raster::new(0, 0));
    reader.close()?;
    Ok(raster)
}

/// Read band 1 of an in-memory GeoTIFF buffer into a Raster
pub fn read_geotiff_from_buffer(data: &[u8]) -> Result<Raster<f64>> {
    decode_geotiff(Cursor::new(data))
        .map(|decoded| decoded.raster)
        .map_err(|reason| Error::UnreadableFormat {
            path: PathBuf::from("<buffer>"),
            reason,
        })
}

/// Write a Raster to a single-band `Float32` GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: &CreationOptions) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let (rows, cols) = raster.shape();
    let mut writer =
        GeoTiffStore.create_for_write(path.as_ref(), rows, cols, GeoTiffStore::FORMAT, options)?;
    writer.set_geo_transform(*raster.transform())?;
    writer.set_projection(raster.crs())?;
    writer.set_nodata(raster.nodata().and_then(RasterElement::into_f64))?;
    for ((row, col), &value) in raster.data().indexed_iter() {
        writer.write_cell(row, col, value.into_f64().unwrap_or(f64::NAN))?;
    }
    writer.close()
}

struct DecodedGeoTiff {
    raster: Raster<f64>,
    band_count: usize,
}

macro_rules! band_one {
    ($buf:expr, $stride:expr) => {
        $buf.iter().step_by($stride).map(|&v| v as f64).collect::<Vec<f64>>()
    };
}

/// Internal: decode band 1 and georeferencing from any `Read + Seek` source
fn decode_geotiff<R: Read + Seek>(reader: R) -> std::result::Result<DecodedGeoTiff, String> {
    let mut decoder = Decoder::new(reader)
        .map_err(|e| format!("TIFF decode error: {}", e))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| format!("cannot read dimensions: {}", e))?;
    let rows = height as usize;
    let cols = width as usize;
    let band_count = decoder
        .get_tag_u32(Tag::SamplesPerPixel)
        .map(|n| n.max(1) as usize)
        .unwrap_or(1);

    let transform = read_geotransform(&mut decoder);
    let crs = read_crs(&mut decoder);
    let nodata = decoder
        .get_tag_ascii_string(geo_tag(GDAL_NODATA))
        .ok()
        .and_then(|s| parse_nodata(&s));

    let image = decoder
        .read_image()
        .map_err(|e| format!("cannot read image data: {}", e))?;

    let data = match image {
        DecodingResult::U8(buf) => band_one!(buf, band_count),
        DecodingResult::U16(buf) => band_one!(buf, band_count),
        DecodingResult::U32(buf) => band_one!(buf, band_count),
        DecodingResult::U64(buf) => band_one!(buf, band_count),
        DecodingResult::I8(buf) => band_one!(buf, band_count),
        DecodingResult::I16(buf) => band_one!(buf, band_count),
        DecodingResult::I32(buf) => band_one!(buf, band_count),
        DecodingResult::I64(buf) => band_one!(buf, band_count),
        DecodingResult::F32(buf) => band_one!(buf, band_count),
        DecodingResult::F64(buf) => band_one!(buf, band_count),
        #[allow(unreachable_patterns)]
        _ => return Err("unsupported TIFF sample format".to_string()),
    };

    if data.len() != rows * cols {
        return Err(format!(
            "expected {} samples for a {}x{} band, decoded {}",
            rows * cols,
            cols,
            rows,
            data.len()
        ));
    }

    let mut raster = Raster::from_vec(data, rows, cols).map_err(|e| e.to_string())?;
    raster.set_transform(transform.unwrap_or_default());
    raster.set_crs(crs);
    raster.set_nodata(nodata);

    Ok(DecodedGeoTiff { raster, band_count })
}

fn parse_nodata(text: &str) -> Option<f64> {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse::<f64>()
        .ok()
}

fn format_nodata(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        // shortest representation that parses back to the same value
        format!("{}", value)
    }
}

/// Read the GeoTransform from `ModelTransformation` or pixel scale + tiepoint tags
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(geo_tag(MODEL_TRANSFORMATION))
        && m.len() >= 8
    {
        return Some(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
    }

    let scale = decoder
        .get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geo_tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    None
}

/// Read the GeoKey directory and its parameter tags as stored
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let directory = decoder.get_tag_u16_vec(geo_tag(GEO_KEY_DIRECTORY)).ok()?;
    let doubles = decoder
        .get_tag_f64_vec(geo_tag(GEO_DOUBLE_PARAMS))
        .unwrap_or_default();
    let ascii = decoder
        .get_tag_ascii_string(geo_tag(GEO_ASCII_PARAMS))
        .unwrap_or_default();
    Some(CRS::GeoKeys(GeoKeys::new(directory, doubles, ascii)))
}

/// Internal: encode a Raster as a `Float32` GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(
    raster: &Raster<T>,
    nodata: Option<f64>,
    writer: W,
    compression: Compression,
) -> std::result::Result<(), String>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| format!("TIFF encoder error: {}", e))?;

    match compression {
        Compression::None => encode_image(&mut encoder, raster, nodata, Uncompressed::default()),
        Compression::Deflate => encode_image(&mut encoder, raster, nodata, Deflate::default()),
        Compression::Lzw => encode_image(&mut encoder, raster, nodata, Lzw::default()),
        Compression::PackBits => encode_image(&mut encoder, raster, nodata, Packbits::default()),
    }
}

fn encode_image<T, W, D>(
    encoder: &mut TiffEncoder<W>,
    raster: &Raster<T>,
    nodata: Option<f64>,
    compression: D,
) -> std::result::Result<(), String>
where
    T: RasterElement,
    W: Write + Seek,
    D: TiffCompression,
{
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image_with_compression::<Gray32Float, D>(cols as u32, rows as u32, compression)
        .map_err(|e| format!("cannot create TIFF image: {}", e))?;

    let gt = raster.transform();
    if gt.is_north_up() {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        image
            .encoder()
            .write_tag(geo_tag(MODEL_PIXEL_SCALE), &scale[..])
            .map_err(|e| format!("cannot write scale tag: {}", e))?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(geo_tag(MODEL_TIEPOINT), &tiepoint[..])
            .map_err(|e| format!("cannot write tiepoint tag: {}", e))?;
    } else {
        let matrix = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image
            .encoder()
            .write_tag(geo_tag(MODEL_TRANSFORMATION), &matrix[..])
            .map_err(|e| format!("cannot write transformation tag: {}", e))?;
    }

    if let Some(keys) = raster.crs().map(CRS::to_geokeys) {
        image
            .encoder()
            .write_tag(geo_tag(GEO_KEY_DIRECTORY), keys.directory.as_slice())
            .map_err(|e| format!("cannot write geokey tag: {}", e))?;
        if !keys.doubles.is_empty() {
            image
                .encoder()
                .write_tag(geo_tag(GEO_DOUBLE_PARAMS), keys.doubles.as_slice())
                .map_err(|e| format!("cannot write geo double tag: {}", e))?;
        }
        if !keys.ascii.is_empty() {
            image
                .encoder()
                .write_tag(geo_tag(GEO_ASCII_PARAMS), keys.ascii.as_str())
                .map_err(|e| format!("cannot write geo ascii tag: {}", e))?;
        }
    }

    if let Some(nd) = nodata {
        image
            .encoder()
            .write_tag(geo_tag(GDAL_NODATA), format_nodata(nd).as_str())
            .map_err(|e| format!("cannot write nodata tag: {}", e))?;
    }

    image
        .write_data(&data)
        .map_err(|e| format!("cannot write image data: {}", e))
}
