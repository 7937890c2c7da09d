//! GeoTIFF reading and writing on top of the `tiff` crate
//!
//! Multi-band rasters are stored one band per TIFF page (IFD), each page
//! carrying the band name in `ImageDescription`. Georeferencing uses
//! ModelPixelScale + ModelTiepoint, the CRS travels as an EPSG code in the
//! GeoKey directory, and no-data as the GDAL_NODATA ASCII tag.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Image, Raster, RasterElement};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::GeoTiff(format!("{}: {}", context, e))
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read one band (TIFF page, 0-based) of a GeoTIFF file
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let mut decoder = open_decoder(file)?;
    seek_band(&mut decoder, band.unwrap_or(0))?;
    decode_page(&mut decoder).map(|(_, r)| r)
}

/// Read one band of a GeoTIFF held in memory
pub fn read_geotiff_from_buffer<T>(data: &[u8], band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    let mut decoder = open_decoder(Cursor::new(data))?;
    seek_band(&mut decoder, band.unwrap_or(0))?;
    decode_page(&mut decoder).map(|(_, r)| r)
}

/// Read every page of a GeoTIFF as a named band.
///
/// Pages without an `ImageDescription` are named `B1`, `B2`, ...
pub fn read_bands<P: AsRef<Path>>(path: P) -> Result<Vec<(String, Raster<f64>)>> {
    let file = File::open(path.as_ref())?;
    decode_all(open_decoder(file)?)
}

/// Read every page of an in-memory GeoTIFF as a named band
pub fn read_bands_from_buffer(data: &[u8]) -> Result<Vec<(String, Raster<f64>)>> {
    decode_all(open_decoder(Cursor::new(data))?)
}

/// Read a multi-band GeoTIFF written by [`write_image`] back into an [`Image`]
pub fn read_image<P: AsRef<Path>>(path: P, id: impl Into<String>) -> Result<Image> {
    read_bands(path)?
        .into_iter()
        .try_fold(Image::new(id), |img, (name, raster)| img.with_band(name, raster))
}

fn open_decoder<R: Read + Seek>(reader: R) -> Result<Decoder<R>> {
    Decoder::new(reader).map_err(tiff_err("TIFF decode error"))
}

fn seek_band<R: Read + Seek>(decoder: &mut Decoder<R>, band: usize) -> Result<()> {
    for i in 0..band {
        if !decoder.more_images() {
            return Err(Error::GeoTiff(format!(
                "band {} requested but file has {} page(s)",
                band,
                i + 1
            )));
        }
        decoder.next_image().map_err(tiff_err("cannot advance to next page"))?;
    }
    Ok(())
}

fn decode_all<R: Read + Seek>(mut decoder: Decoder<R>) -> Result<Vec<(String, Raster<f64>)>> {
    let mut bands = Vec::new();
    loop {
        let (name, raster) = decode_page::<f64, R>(&mut decoder)?;
        let name = name.unwrap_or_else(|| format!("B{}", bands.len() + 1));
        bands.push((name, raster.to_f64()));
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(tiff_err("cannot advance to next page"))?;
    }
    debug!("decoded {} band(s)", bands.len());
    Ok(bands)
}

fn cast_buf<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

/// Decode the current page: description, pixels, georeferencing, nodata, CRS
fn decode_page<T, R>(decoder: &mut Decoder<R>) -> Result<(Option<String>, Raster<T>)>
where
    T: RasterElement,
    R: Read + Seek,
{
    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("cannot read dimensions"))?;
    let rows = height as usize;
    let cols = width as usize;

    let description = decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .ok()
        .map(|s| s.trim_end_matches('\0').trim().to_string())
        .filter(|s| !s.is_empty());

    let data: Vec<T> = match decoder.read_image().map_err(tiff_err("cannot read image data"))? {
        DecodingResult::F32(buf) => cast_buf(buf),
        DecodingResult::F64(buf) => cast_buf(buf),
        DecodingResult::U8(buf) => cast_buf(buf),
        DecodingResult::U16(buf) => cast_buf(buf),
        DecodingResult::U32(buf) => cast_buf(buf),
        DecodingResult::I8(buf) => cast_buf(buf),
        DecodingResult::I16(buf) => cast_buf(buf),
        DecodingResult::I32(buf) => cast_buf(buf),
        _ => return Err(Error::UnsupportedDataType("unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    if let Some(transform) = read_geotransform(decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(decoder));
    raster.set_nodata(read_nodata(decoder));
    Ok((description, raster))
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::Unknown(GEO_KEY_DIRECTORY)).ok()?;
    // header: version, revision, minor, key count; then 4-value entries
    let count = *keys.get(3)? as usize;
    let entries = keys.get(4..4 + count * 4)?;

    let lookup = |wanted: u16| {
        entries
            .chunks_exact(4)
            .find(|e| e[0] == wanted && e[1] == 0 && e[3] != 0 && e[3] != 32767)
            .map(|e| e[3] as u32)
    };
    lookup(PROJECTED_CS_TYPE_KEY)
        .or_else(|| lookup(GEOGRAPHIC_TYPE_KEY))
        .map(CRS::from_epsg)
}

fn read_nodata<T: RasterElement, R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<T> {
    let text = decoder.get_tag_ascii_string(Tag::Unknown(GDAL_NODATA)).ok()?;
    let value: f64 = text.trim_end_matches('\0').trim().parse().ok()?;
    num_traits::cast(value)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write a single-band raster as a 32-bit float GeoTIFF
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_pages(&[(None, raster)], file)
}

/// Write a single-band raster into an in-memory GeoTIFF
pub fn write_geotiff_to_buffer<T: RasterElement>(raster: &Raster<T>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_pages(&[(None, raster)], Cursor::new(&mut buf))?;
    Ok(buf)
}

/// Write named bands as a multi-page GeoTIFF. All bands must share a grid.
pub fn write_bands<T, P>(bands: &[(&str, &Raster<T>)], path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let pages: Vec<(Option<&str>, &Raster<T>)> = bands.iter().map(|(n, r)| (Some(*n), *r)).collect();
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_pages(&pages, file)
}

/// Write every band of an image as one GeoTIFF
pub fn write_image<P: AsRef<Path>>(image: &Image, path: P) -> Result<()> {
    let bands = image
        .band_names()
        .into_iter()
        .map(|name| image.band(name).map(|r| (name, r)))
        .collect::<Result<Vec<_>>>()?;
    if bands.is_empty() {
        return Err(Error::Other(format!("image '{}' has no bands to write", image.id())));
    }
    write_bands(&bands, path)
}

fn geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(CRS::epsg).filter(|code| *code <= u16::MAX as u32);
    let geographic = crs.map_or(false, CRS::is_geographic);

    // GTModelType: 1 projected, 2 geographic; GTRasterType 1 = PixelIsArea
    let mut entries: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE_KEY, 0, 1, if geographic { 2 } else { 1 }],
        [GT_RASTER_TYPE_KEY, 0, 1, 1],
    ];
    if let Some(code) = epsg {
        let key = if geographic { GEOGRAPHIC_TYPE_KEY } else { PROJECTED_CS_TYPE_KEY };
        entries.push([key, 0, 1, code as u16]);
    }

    let mut out = vec![1, 1, 0, entries.len() as u16];
    out.extend(entries.into_iter().flatten());
    out
}

fn encode_pages<T, W>(pages: &[(Option<&str>, &Raster<T>)], writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let Some((_, first)) = pages.first() else {
        return Err(Error::Other("nothing to write".into()));
    };
    for (_, raster) in &pages[1..] {
        first.check_same_grid(raster)?;
    }

    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;

    for (name, raster) in pages {
        let (rows, cols) = raster.shape();
        let nodata = raster.nodata();
        let data: Vec<f32> = raster
            .data()
            .iter()
            .map(|&v| {
                if v.is_nodata(nodata) {
                    nodata
                        .and_then(|nd| num_traits::cast(nd))
                        .unwrap_or(crate::raster::NODATA as f32)
                } else {
                    num_traits::cast(v).unwrap_or(f32::NAN)
                }
            })
            .collect();

        let mut image = encoder
            .new_image::<Gray32Float>(cols as u32, rows as u32)
            .map_err(tiff_err("cannot create TIFF image"))?;

        let gt = raster.transform();
        let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
            .map_err(tiff_err("cannot write scale tag"))?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
            .map_err(tiff_err("cannot write tiepoint tag"))?;

        let keys = geokeys(raster.crs());
        image
            .encoder()
            .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), keys.as_slice())
            .map_err(tiff_err("cannot write geokey tag"))?;

        let nodata_value = nodata
            .and_then(|nd| nd.to_f64())
            .unwrap_or(crate::raster::NODATA);
        let nodata_text = format!("{}", nodata_value);
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), nodata_text.as_str())
            .map_err(tiff_err("cannot write nodata tag"))?;

        if let Some(name) = name {
            image
                .encoder()
                .write_tag(Tag::ImageDescription, *name)
                .map_err(tiff_err("cannot write band name"))?;
        }

        image
            .write_data(&data)
            .map_err(tiff_err("cannot write image data"))?;
    }

    Ok(())
}
