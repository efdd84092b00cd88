//! GeoTIFF reading/writing on top of the `tiff` crate
//!
//! Georeferencing is carried by the ModelPixelScale / ModelTiepoint tags,
//! the CRS by the EPSG code in the GeoKey directory and no-data by the
//! GDAL_NODATA ASCII tag. Rotated or sheared rasters are not supported.

use crate::crs::Crs;
use crate::dataset::Variable;
use crate::error::{Error, Result};
use crate::raster::{GeoBox, Raster, RasterElement};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{Gray32Float, Gray8, GrayI16};
use tiff::encoder::compression::Deflate;
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{context}: {e}"))
}

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(tiff_err("TIFF decode error"))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let (rows, cols) = (height as usize, width as usize);

    let geobox = read_geobox(&mut decoder, rows, cols)?;
    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok());

    let result = decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?;

    macro_rules! cast_all {
        ($buf:expr) => {
            $buf.iter()
                .map(|&v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
                .collect::<Vec<T>>()
        };
    }
    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_all!(buf),
        DecodingResult::U16(buf) => cast_all!(buf),
        DecodingResult::U32(buf) => cast_all!(buf),
        DecodingResult::I8(buf) => cast_all!(buf),
        DecodingResult::I16(buf) => cast_all!(buf),
        DecodingResult::I32(buf) => cast_all!(buf),
        DecodingResult::F32(buf) => cast_all!(buf),
        DecodingResult::F64(buf) => cast_all!(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    // Multi-sample images: keep the first sample of each pixel.
    let samples = data.len() / (rows * cols).max(1);
    let data = if samples > 1 {
        data.into_iter().step_by(samples).collect()
    } else {
        data
    };

    let raster = Raster::from_vec(data, geobox)?;
    Ok(raster.with_nodata(nodata.map(T::from_f64)))
}

fn read_geobox<R: Read + Seek>(decoder: &mut Decoder<R>, rows: usize, cols: usize) -> Result<GeoBox> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::Other("GeoTIFF has no pixel scale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::Other("GeoTIFF has no tiepoint tag".into()))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::Other("Cannot determine geotransform".into()));
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];

    let crs = decoder
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .ok()
        .and_then(|keys| epsg_from_geokeys(&keys))
        .map(|code| Crs::from_epsg(code as u32))
        .ok_or_else(|| Error::Other("GeoTIFF has no EPSG code".into()))?;

    Ok(GeoBox::new(rows, cols, origin_x, origin_y, scale[0], -scale[1], crs))
}

/// EPSG code from a GeoKey directory: projected CS first, then geographic.
fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    let entries: Vec<&[u16]> = keys.get(4..)?.chunks_exact(4).collect();
    let direct = |id: u16| {
        entries
            .iter()
            .find(|e| e[0] == id && e[1] == 0)
            .map(|e| e[3])
            .filter(|&code| code != 0 && code != 32767)
    };
    direct(PROJECTED_CS_TYPE).or_else(|| direct(GEOGRAPHIC_TYPE))
}

fn geokeys_for(crs: &Crs) -> Result<Vec<u16>> {
    let code = u16::try_from(crs.epsg()).map_err(|_| Error::UnsupportedCrs(crs.epsg()))?;
    let (model, key) = if crs.is_geographic() {
        (2, GEOGRAPHIC_TYPE)
    } else {
        (1, PROJECTED_CS_TYPE)
    };
    Ok(vec![
        1, 1, 0, 3, // Version 1.1.0, 3 keys
        GT_MODEL_TYPE, 0, 1, model,
        GT_RASTER_TYPE, 0, 1, 1, // RasterPixelIsArea
        key, 0, 1, code,
    ])
}

fn write_geo_tags<W, K>(dir: &mut DirectoryEncoder<'_, W, K>, geobox: &GeoBox, nodata: Option<f64>) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
{
    let (res_x, res_y) = geobox.resolution();
    let (origin_x, origin_y) = geobox.origin();

    dir.write_tag(Tag::ModelPixelScaleTag, &[res_x, res_y.abs(), 0.0][..])
        .map_err(tiff_err("Cannot write scale tag"))?;
    dir.write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, origin_x, origin_y, 0.0][..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;
    dir.write_tag(Tag::GeoKeyDirectoryTag, geokeys_for(geobox.crs())?.as_slice())
        .map_err(tiff_err("Cannot write geokey tag"))?;
    if let Some(nd) = nodata {
        let text = if nd.is_nan() { "nan".to_string() } else { nd.to_string() };
        dir.write_tag(Tag::GdalNodata, text.as_str())
            .map_err(tiff_err("Cannot write nodata tag"))?;
    }
    Ok(())
}

macro_rules! encode_raster {
    ($encoder:expr, $color:ty, $raster:expr) => {{
        let raster = $raster;
        let (rows, cols) = raster.shape();
        let data: Vec<_> = raster.data().iter().copied().collect();
        let mut image = $encoder
            .new_image_with_compression::<$color, _>(cols as u32, rows as u32, Deflate::default())
            .map_err(tiff_err("Cannot create TIFF image"))?;
        write_geo_tags(image.encoder(), raster.geobox(), raster.nodata().map(f64::from))?;
        image
            .write_data(&data)
            .map_err(tiff_err("Cannot write image data"))?;
    }};
}

fn encode_variable<W: Write + Seek>(var: &Variable, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    match var {
        Variable::U8(r) => encode_raster!(encoder, Gray8, r),
        Variable::I16(r) => encode_raster!(encoder, GrayI16, r),
        Variable::F32(r) => encode_raster!(encoder, Gray32Float, r),
    }
    Ok(())
}

/// Write one dataset variable to a deflate-compressed GeoTIFF file
pub fn write_geotiff<P: AsRef<Path>>(var: &Variable, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    encode_variable(var, file)
}

/// Write one dataset variable to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer(var: &Variable) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_variable(var, Cursor::new(&mut buf))?;
    Ok(buf)
}
