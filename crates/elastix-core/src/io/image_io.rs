use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::{Array2, ArrayView2, Ix2};

use crate::error::{ElastixError, Result};
use crate::image::Image;
use crate::io::mhd;

fn as_2d(image: &Image) -> Result<ArrayView2<'_, f32>> {
    image
        .data
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| {
            ElastixError::InvalidArgument(format!(
                "only 2D images can be saved as PNG/TIFF (got {}D)",
                image.ndim()
            ))
        })
}

/// Map pixel values to [0, 1]. Data already inside that range is kept as is;
/// anything else is min-max rescaled.
fn unit_range(data: &ArrayView2<f32>) -> Array2<f32> {
    let (lo, hi) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo >= 0.0 && hi <= 1.0 {
        return data.to_owned();
    }
    let span = (hi - lo).max(f32::EPSILON);
    data.mapv(|v| (v - lo) / span)
}

/// Save a 2D image as 16-bit grayscale TIFF.
pub fn save_tiff(image: &Image, path: &Path) -> Result<()> {
    let data = unit_range(&as_2d(image)?);
    let (h, w) = data.dim();

    let pixels: Vec<u16> = data
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0) as u16)
        .collect();

    let img = image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| ElastixError::InvalidArgument("pixel buffer does not match image size".into()))?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a 2D image as 8-bit grayscale PNG.
pub fn save_png(image: &Image, path: &Path) -> Result<()> {
    let data = unit_range(&as_2d(image)?);
    let (h, w) = data.dim();

    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), &v) in data.indexed_iter() {
        let val = (v.clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save an image, choosing the format from the file extension.
///
/// `.mhd` keeps full precision and works for any dimensionality; PNG and
/// TIFF are 2D only. Unknown extensions fall back to MetaImage.
pub fn save_image(image: &Image, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tiff" | "tif") => save_tiff(image, path),
        Some("png") => save_png(image, path),
        _ => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    ElastixError::InvalidArgument(format!("bad output path: {}", path.display()))
                })?;
            mhd::write_mhd(image, dir, stem)?;
            Ok(())
        }
    }
}

/// Load a grayscale PNG/TIFF (or any format the `image` crate reads) with
/// pixel values scaled to [0, 1]. `.mhd` files go through the MetaImage reader.
pub fn load_image(path: &Path) -> Result<Image> {
    if path.extension().and_then(|e| e.to_str()) == Some("mhd") {
        return mhd::read_mhd(path);
    }

    let img = image::open(path)?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let mut data = Array2::<f32>::zeros((h as usize, w as usize));

    for (col, row, pixel) in gray.enumerate_pixels() {
        data[[row as usize, col as usize]] = pixel.0[0] as f32 / 65535.0;
    }

    Ok(Image::new(data.into_dyn()))
}
