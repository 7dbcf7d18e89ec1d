//! Conversions between [`Frame`] and the `image` crate.

use crate::SourceError;
use image::{DynamicImage, GrayImage, ImageReader, RgbImage, RgbaImage};
use std::path::Path;
use surface_capture_core::{Frame, PixelFormat};

/// Wrap a decoded image as a frame. Gray, RGB and RGBA 8-bit layouts are
/// kept; anything else is converted to RGB8.
pub fn frame_from_image(img: DynamicImage) -> Result<Frame, SourceError> {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let frame = match img {
        DynamicImage::ImageLuma8(buf) => {
            Frame::new(width, height, PixelFormat::Gray8, buf.into_raw())?
        }
        DynamicImage::ImageRgba8(buf) => {
            Frame::new(width, height, PixelFormat::Rgba8, buf.into_raw())?
        }
        other => Frame::new(width, height, PixelFormat::Rgb8, other.into_rgb8().into_raw())?,
    };
    Ok(frame)
}

/// Copy a frame into an `image` buffer; `None` if the buffer is inconsistent.
pub fn frame_to_image(frame: &Frame) -> Option<DynamicImage> {
    let (w, h) = (frame.width as u32, frame.height as u32);
    let data = frame.data.clone();
    match frame.format {
        PixelFormat::Gray8 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
        PixelFormat::Rgb8 => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
        PixelFormat::Rgba8 => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
    }
}

/// Decode an image file into a frame.
pub fn load_frame(path: impl AsRef<Path>) -> Result<Frame, SourceError> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    frame_from_image(img)
}

/// Encode a frame to disk; the format follows the file extension.
pub fn save_frame(frame: &Frame, path: impl AsRef<Path>) -> Result<(), SourceError> {
    let img = frame_to_image(frame).ok_or(SourceError::EmptyFrame)?;
    img.save(path)?;
    Ok(())
}
