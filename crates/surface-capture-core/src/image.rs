use serde::{Deserialize, Serialize};

/// Pixel layout of a [`Frame`]; all formats are 8 bits per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid frame buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },
}

/// Row-major, tightly packed pixel buffer.
///
/// Frames are never edited after they are published; the capture loop
/// replaces the whole frame every cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    /// Wrap an existing buffer, checking that its length matches the size.
    pub fn new(
        width: usize,
        height: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let frame = Self {
            width,
            height,
            format,
            data,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Check that the buffer length matches `width * height * channels`.
    ///
    /// Fields are public, so frames built by hand may not satisfy this.
    pub fn validate(&self) -> Result<(), FrameError> {
        let expected = self
            .width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.channels()))
            .ok_or(FrameError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })?;
        if self.data.len() != expected {
            return Err(FrameError::InvalidBuffer {
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }

    /// A zero-filled frame.
    pub fn blank(width: usize, height: usize, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0; width * height * format.channels()],
        }
    }

    /// True when the frame carries no pixels (a failed grab).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.width * self.channels()
    }

    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Channel values of pixel `(x, y)`, or `None` outside the frame.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels();
        let start = y * self.stride() + x * c;
        self.data.get(start..start + c)
    }
}

#[inline]
fn get_channel(src: &Frame, x: i32, y: i32, channel: usize) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data
        .get(y as usize * src.stride() + x as usize * src.channels() + channel)
        .copied()
        .unwrap_or(0)
}

/// Bilinear sample of one channel; pixels outside the frame read as 0.
#[inline]
pub fn sample_bilinear(src: &Frame, x: f32, y: f32, channel: usize) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_channel(src, x0, y0, channel) as f32;
    let p10 = get_channel(src, x0 + 1, y0, channel) as f32;
    let p01 = get_channel(src, x0, y0 + 1, channel) as f32;
    let p11 = get_channel(src, x0 + 1, y0 + 1, channel) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Sample every channel at `(x, y)` into `out` (length = channel count).
#[inline]
pub fn sample_bilinear_into(src: &Frame, x: f32, y: f32, out: &mut [u8]) {
    for (channel, dst) in out.iter_mut().enumerate().take(src.channels()) {
        *dst = sample_bilinear(src, x, y, channel).round().clamp(0.0, 255.0) as u8;
    }
}
