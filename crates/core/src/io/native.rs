//! Native GeoTIFF reading/writing through the `tiff` crate
//!
//! Supports single-band rasters with a north-up geotransform
//! (ModelPixelScale + ModelTiepoint tags) and the GDAL no-data tag.
//! Integer rasters are written as signed 32-bit samples, float rasters as
//! 32-bit float samples.
//!
//! Reading into an integer raster is strict: a sample that is fractional or
//! out of range for the target type is an error naming the cell. Only NaN
//! and the declared no-data value map to no data.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use num_traits::NumCast;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, GrayI32};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Skip the GDAL no-data tag even when the raster has a no-data value
    pub omit_nodata: bool,
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

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{}: {}", context, e))
}

fn cast_samples<S, T>(buf: Vec<S>, cols: usize, nodata: Option<f64>) -> Result<Vec<T>>
where
    S: NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .enumerate()
        .map(|(i, v)| {
            let value: f64 = num_traits::cast(v).unwrap_or(f64::NAN);
            if value.is_nan() {
                return Ok(T::fallback());
            }
            if let Some(nd) = nodata {
                if value == nd || (value - nd).abs() <= nd.abs() * <f64 as From<f32>>::from(f32::EPSILON) {
                    return Ok(nodata_as(nd));
                }
            }
            let integral = T::is_float() || value.fract() == 0.0;
            match num_traits::cast::<S, T>(v) {
                Some(cast) if integral => Ok(cast),
                _ => Err(Error::InvalidSample {
                    row: i / cols.max(1),
                    col: i % cols.max(1),
                    value,
                }),
            }
        })
        .collect()
}

/// No-data value in the target type; a value the type cannot hold falls
/// back to the type's own placeholder.
fn nodata_as<T: RasterElement>(nd: f64) -> T {
    num_traits::cast(nd).unwrap_or_else(T::fallback)
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let rows = height as usize;
    let cols = width as usize;

    let nodata = read_nodata(&mut decoder);

    let data: Vec<T> = match decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?
    {
        DecodingResult::U8(buf) => cast_samples(buf, cols, nodata)?,
        DecodingResult::U16(buf) => cast_samples(buf, cols, nodata)?,
        DecodingResult::U32(buf) => cast_samples(buf, cols, nodata)?,
        DecodingResult::I8(buf) => cast_samples(buf, cols, nodata)?,
        DecodingResult::I16(buf) => cast_samples(buf, cols, nodata)?,
        DecodingResult::I32(buf) => cast_samples(buf, cols, nodata)?,
        DecodingResult::F32(buf) => cast_samples(buf, cols, nodata)?,
        DecodingResult::F64(buf) => cast_samples(buf, cols, nodata)?,
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    // Multi-band images decode interleaved; only single-band is supported
    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_nodata(nodata.map(nodata_as));

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    text.trim_matches(char::from(0)).trim().parse().ok()
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file, &options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T: RasterElement>(
    raster: &Raster<T>,
    options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let (rows, cols) = raster.shape();
    let nodata = if options.omit_nodata {
        None
    } else {
        raster.nodata().and_then(num_traits::cast::<T, f64>)
    };

    if T::is_float() {
        let data: Vec<f32> = raster
            .data()
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
            .collect();
        let mut image = encoder
            .new_image::<Gray32Float>(cols as u32, rows as u32)
            .map_err(tiff_err("Cannot create TIFF image"))?;
        write_geo_tags(image.encoder(), raster.transform(), nodata)?;
        image
            .write_data(&data)
            .map_err(tiff_err("Cannot write image data"))?;
    } else {
        let data = raster
            .data()
            .iter()
            .map(|&v| {
                num_traits::cast::<T, i32>(v).ok_or_else(|| Error::InvalidParameter {
                    name: "sample",
                    value: format!("{:?}", v),
                    reason: "does not fit a signed 32-bit sample".to_string(),
                })
            })
            .collect::<Result<Vec<i32>>>()?;
        let mut image = encoder
            .new_image::<GrayI32>(cols as u32, rows as u32)
            .map_err(tiff_err("Cannot create TIFF image"))?;
        write_geo_tags(image.encoder(), raster.transform(), nodata)?;
        image
            .write_data(&data)
            .map_err(tiff_err("Cannot write image data"))?;
    }

    Ok(())
}

fn write_geo_tags<W, K>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    gt: &GeoTransform,
    nodata: Option<f64>,
) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
{
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;

    // Minimal GeoKeyDirectory: version 1.1.0, GTModelType = projected,
    // GTRasterType = pixel is area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    dir.write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])
        .map_err(tiff_err("Cannot write geokey tag"))?;

    if let Some(nd) = nodata {
        dir.write_tag(Tag::GdalNodata, nd.to_string().as_str())
            .map_err(tiff_err("Cannot write nodata tag"))?;
    }

    Ok(())
}
