//! Pixel containers shared by every pipeline stage.
//!
//! `RasterBuffer` holds 3- or 4-channel color in row-major order with a fixed
//! stride; `AlphaMatte` holds one opacity byte per pixel. Both expose
//! bounds-checked `get`/`set` accessors so the per-pixel algorithms never do
//! manual offset arithmetic outside this module.

use crate::error::{MatteError, Result};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

/// Channel layout of a color buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Bgr8,
    Bgra8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        self.channels() == 4
    }

    /// Byte offsets of R, G, B and (optionally) A inside one pixel.
    fn offsets(self) -> ([usize; 3], Option<usize>) {
        match self {
            Self::Rgb8 => ([0, 1, 2], None),
            Self::Bgr8 => ([2, 1, 0], None),
            Self::Rgba8 => ([0, 1, 2], Some(3)),
            Self::Bgra8 => ([2, 1, 0], Some(3)),
        }
    }
}

/// How color channels relate to the alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Straight,
    Premultiplied,
}

/// Owned color image.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    alpha_mode: AlphaMode,
    data: Vec<u8>,
}

impl RasterBuffer {
    /// Zero-filled buffer with a tightly packed stride.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.channels();
        Self {
            width,
            height,
            stride,
            format,
            alpha_mode: AlphaMode::Straight,
            data: vec![0; stride * height as usize],
        }
    }

    /// Buffer of a single color. `rgba` is given in RGBA order regardless of `format`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, rgba: [u8; 4]) -> Self {
        let mut buffer = Self::new(width, height, format);
        for y in 0..height {
            for x in 0..width {
                buffer.set_rgba(x, y, rgba);
            }
        }
        buffer
    }

    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let stride = width as usize * format.channels();
        Self::from_raw_with_stride(width, height, stride, format, data)
    }

    /// Wrap externally produced bytes whose rows may be padded.
    pub fn from_raw_with_stride(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self> {
        let row_bytes = width as usize * format.channels();
        if stride < row_bytes {
            return Err(MatteError::invalid_input(format!(
                "stride {stride} shorter than row of {row_bytes} bytes"
            )));
        }
        let required = match height {
            0 => 0,
            h => stride * (h as usize - 1) + row_bytes,
        };
        if data.len() < required {
            return Err(MatteError::invalid_input(format!(
                "buffer holds {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                required
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            alpha_mode: AlphaMode::Straight,
            data,
        })
    }

    pub fn with_alpha_mode(mut self, alpha_mode: AlphaMode) -> Self {
        self.alpha_mode = alpha_mode;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn alpha_mode(&self) -> AlphaMode {
        self.alpha_mode
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} raster",
            self.width,
            self.height
        );
        y as usize * self.stride + x as usize * self.format.channels()
    }

    /// Pixel in RGBA order; 3-channel formats report alpha 255.
    #[inline]
    pub fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        let base = self.offset(x, y);
        let ([r, g, b], a) = self.format.offsets();
        let px = &self.data[base..base + self.format.channels()];
        [px[r], px[g], px[b], a.map_or(255, |a| px[a])]
    }

    /// Write a pixel given in RGBA order; alpha is dropped for 3-channel formats.
    #[inline]
    pub fn set_rgba(&mut self, x: u32, y: u32, value: [u8; 4]) {
        let base = self.offset(x, y);
        let ([r, g, b], a) = self.format.offsets();
        let channels = self.format.channels();
        let px = &mut self.data[base..base + channels];
        px[r] = value[0];
        px[g] = value[1];
        px[b] = value[2];
        if let Some(a) = a {
            px[a] = value[3];
        }
    }

    /// Copy with color channels divided back out of alpha.
    pub fn to_straight(&self) -> RasterBuffer {
        if self.alpha_mode == AlphaMode::Straight || !self.format.has_alpha() {
            return self.clone().with_alpha_mode(AlphaMode::Straight);
        }
        let mut out = self.clone();
        for y in 0..self.height {
            for x in 0..self.width {
                let [r, g, b, a] = self.rgba(x, y);
                let unpremultiply = |c: u8| -> u8 {
                    if a == 0 {
                        0
                    } else {
                        ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8
                    }
                };
                out.set_rgba(x, y, [unpremultiply(r), unpremultiply(g), unpremultiply(b), a]);
            }
        }
        out.alpha_mode = AlphaMode::Straight;
        out
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| Rgba(self.rgba(x, y)))
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let [r, g, b, _] = self.rgba(x, y);
            Rgb([r, g, b])
        })
    }

    /// Bilinear resample to an exact size. Output is tightly packed `Rgba8`.
    pub fn resize_to(&self, width: u32, height: u32) -> RasterBuffer {
        let resized = if (width, height) == self.dimensions() {
            self.to_rgba_image()
        } else {
            imageops::resize(
                &self.to_rgba_image(),
                width,
                height,
                imageops::FilterType::Triangle,
            )
        };
        RasterBuffer::from(resized).with_alpha_mode(self.alpha_mode)
    }

    /// Downscale so the longer side is at most `max_side`, preserving aspect ratio.
    /// Buffers already within bounds are returned unchanged.
    pub fn fit_within(&self, max_side: u32) -> RasterBuffer {
        let longest = self.width.max(self.height);
        if max_side == 0 || longest <= max_side {
            return self.clone();
        }
        let scale = max_side as f64 / longest as f64;
        let width = ((self.width as f64 * scale).round() as u32).max(1);
        let height = ((self.height as f64 * scale).round() as u32).max(1);
        self.resize_to(width, height)
    }
}

impl From<RgbImage> for RasterBuffer {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            stride: width as usize * 3,
            format: PixelFormat::Rgb8,
            alpha_mode: AlphaMode::Straight,
            data: image.into_raw(),
        }
    }
}

impl From<RgbaImage> for RasterBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            stride: width as usize * 4,
            format: PixelFormat::Rgba8,
            alpha_mode: AlphaMode::Straight,
            data: image.into_raw(),
        }
    }
}

impl From<image::DynamicImage> for RasterBuffer {
    fn from(image: image::DynamicImage) -> Self {
        if image.color().has_alpha() {
            Self::from(image.into_rgba8())
        } else {
            Self::from(image.into_rgb8())
        }
    }
}

/// Single-channel opacity map, 0 = background, 255 = foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMatte {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl AlphaMatte {
    /// Fully transparent matte.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(MatteError::invalid_input(format!(
                "matte holds {} bytes, {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a matte by evaluating `f` at every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u8) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "matte pixel ({x}, {y}) outside {}x{}",
            self.width,
            self.height
        );
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Read with coordinates clamped to the nearest edge pixel.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> u8 {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(x, y)
    }

    /// Apply `f` to every value, producing a new matte.
    pub fn map(&self, f: impl Fn(u8) -> u8) -> AlphaMatte {
        AlphaMatte {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| Luma([self.get(x, y)]))
    }

    pub fn from_gray_image(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    /// Grayscale silhouette for visual inspection.
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let v = self.get(x, y);
            Rgb([v, v, v])
        })
    }

    pub fn resize_to(&self, width: u32, height: u32) -> AlphaMatte {
        if (width, height) == self.dimensions() {
            return self.clone();
        }
        let resized = imageops::resize(
            &self.to_gray_image(),
            width,
            height,
            imageops::FilterType::Triangle,
        );
        Self::from_gray_image(resized)
    }
}
