//! Image manipulation.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image used for camera frames and drawing surfaces.
//! - [`Color`], an sRGBA color.
//! - [`Resolution`], the size of an image or surface.
//! - A few [`draw`] functions to visualize landmarks and their connections.

mod color;
pub mod draw;
mod resolution;

#[cfg(test)]
mod tests;

use std::{fmt, path::Path};

use image::{imageops, imageops::FilterType, ImageBuffer, Rgba, RgbaImage};

pub use color::Color;
pub use resolution::Resolution;

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => anyhow::bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone, PartialEq)]
pub struct Image {
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_format())?.to_rgba8();
        Ok(Self { buf })
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Creates an [`Image`] from raw, preexisting RGBA pixel data.
    ///
    /// `buf` needs to contain data in the following interleaved pixel format:
    /// `rrrrrrrr gggggggg bbbbbbbb aaaaaaaa`. Its length needs to be exactly `width * height * 4`,
    /// or this function will panic.
    pub fn from_rgba8(res: impl Into<Resolution>, buf: &[u8]) -> Self {
        let res = res.into();
        let expected_size = res.width() as usize * res.height() as usize * 4;
        assert_eq!(
            expected_size,
            buf.len(),
            "incorrect buffer size {} for {} image (expected {} bytes)",
            buf.len(),
            res,
            expected_size,
        );

        Self {
            buf: ImageBuffer::from_vec(res.width(), res.height(), buf.to_vec())
                .expect("buffer size does not match image resolution"),
        }
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.save_impl(path.as_ref())
    }

    fn save_impl(&self, path: &Path) -> anyhow::Result<()> {
        match ImageFormat::from_path(path)? {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => Ok(image::DynamicImage::ImageRgba8(self.buf.clone())
                .to_rgb8()
                .save(path)?),
            ImageFormat::Png => Ok(self.buf.save(path)?),
        }
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Returns a new [`Image`] of the given size, with every pixel initialized to `color`.
    pub fn filled(res: impl Into<Resolution>, color: Color) -> Self {
        let res = res.into();
        let mut this = Self::new(res.width(), res.height());
        this.clear(color);
        this
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Sets the pixel at `(x, y)` if it lies inside the image, and ignores the write otherwise.
    #[inline]
    pub(crate) fn set_clipped(&mut self, x: i32, y: i32, color: Color) {
        if x >= 0 && (x as u32) < self.width() && y >= 0 && (y as u32) < self.height() {
            self.buf[(x as u32, y as u32)] = Rgba(color.0);
        }
    }

    /// Returns a copy of `self` stretched or shrunk to `res`.
    ///
    /// If `self` already has the requested resolution, this is a plain copy.
    pub fn resized(&self, res: impl Into<Resolution>) -> Image {
        let res = res.into();
        if res == self.resolution() {
            return self.clone();
        }
        Image {
            buf: imageops::resize(&self.buf, res.width(), res.height(), FilterType::Triangle),
        }
    }

    /// Overwrites the data in `self` with `src`, stretching or shrinking `src` as necessary.
    ///
    /// This always covers the *entire* destination. No blending is performed.
    pub fn draw_scaled(&mut self, src: &Image) {
        if src.resolution() == self.resolution() {
            self.buf.copy_from_slice(src.buf.as_raw());
        } else {
            let scaled = src.resized(self.resolution());
            self.buf = scaled.buf;
        }
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}
