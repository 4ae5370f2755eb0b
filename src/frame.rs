//! RGBA frame representation
//!
//! Every rank renders exactly one `RgbaFrame` of the agreed dimensions.
//! Samples are linear `f32` values stored row-major, four per pixel.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Number of channels per pixel (R, G, B, A)
pub const CHANNELS: usize = 4;

/// Size in bytes of one encoded sample on the wire
const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// A single RGBA pixel
pub type Pixel = [f32; 4];

/// Fully transparent black
pub const TRANSPARENT: Pixel = [0.0, 0.0, 0.0, 0.0];

/// Errors raised when building or decoding frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Width or height was zero
    ZeroDimension { width: u32, height: u32 },
    /// Sample buffer does not hold exactly width*height*4 values
    SampleCountMismatch { expected: usize, actual: usize },
    /// Encoded payload does not hold exactly width*height*4 f32 values
    PayloadLength { expected: usize, actual: usize },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::ZeroDimension { width, height } => {
                write!(f, "Frame dimensions must be non-zero (got {}x{})", width, height)
            }
            FrameError::SampleCountMismatch { expected, actual } => {
                write!(f, "Expected {} samples, got {}", expected, actual)
            }
            FrameError::PayloadLength { expected, actual } => {
                write!(f, "Expected payload of {} bytes, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// A fixed-size RGBA image with floating-point channels
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
    width: u32,
    height: u32,
    samples: Vec<f32>,
}

impl RgbaFrame {
    /// Create a fully transparent frame
    pub fn transparent(width: u32, height: u32) -> Result<Self, FrameError> {
        check_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            samples: vec![0.0; Self::sample_count(width, height)],
        })
    }

    /// Wrap an existing row-major RGBA sample buffer
    pub fn from_samples(width: u32, height: u32, samples: Vec<f32>) -> Result<Self, FrameError> {
        check_dimensions(width, height)?;
        let expected = Self::sample_count(width, height);
        if samples.len() != expected {
            return Err(FrameError::SampleCountMismatch {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self { width, height, samples })
    }

    /// Number of f32 samples for the given dimensions (width * height * 4)
    pub fn sample_count(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * CHANNELS
    }

    /// Exact encoded payload length in bytes for the given dimensions
    pub fn payload_len(width: u32, height: u32) -> usize {
        Self::sample_count(width, height) * SAMPLE_BYTES
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

    /// Number of pixels in the frame
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Raw row-major samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// View the samples as pixels
    pub fn pixels(&self) -> &[Pixel] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Mutable view of the samples as pixels
    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }

    /// Pixel at (x, y); panics when out of bounds like slice indexing
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        self.pixels()[self.index(x, y)]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        let index = self.index(x, y);
        self.pixels_mut()[index] = pixel;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Whether every pixel has zero alpha
    pub fn is_fully_transparent(&self) -> bool {
        self.pixels().iter().all(|p| p[3] == 0.0)
    }

    /// Encode as a little-endian f32 payload for transport
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.samples.len() * SAMPLE_BYTES);
        for &sample in &self.samples {
            buf.put_f32_le(sample);
        }
        buf.freeze()
    }

    /// Decode a payload produced by [`RgbaFrame::to_payload`].
    ///
    /// The payload must be exactly `width * height * 4` samples long; there
    /// is no partial-frame recovery.
    pub fn from_payload(width: u32, height: u32, mut payload: Bytes) -> Result<Self, FrameError> {
        check_dimensions(width, height)?;
        let expected = Self::payload_len(width, height);
        if payload.len() != expected {
            return Err(FrameError::PayloadLength {
                expected,
                actual: payload.len(),
            });
        }

        let mut samples = Vec::with_capacity(Self::sample_count(width, height));
        while payload.has_remaining() {
            samples.push(payload.get_f32_le());
        }
        Ok(Self { width, height, samples })
    }

    /// Quantize to 8-bit RGBA, clamping each channel to [0, 1]
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.samples
            .iter()
            .map(|&s| (s.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::ZeroDimension { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_frame() {
        let frame = RgbaFrame::transparent(8, 4).unwrap();
        assert_eq!(frame.dimensions(), (8, 4));
        assert_eq!(frame.samples().len(), 8 * 4 * 4);
        assert_eq!(frame.pixel_count(), 32);
        assert!(frame.is_fully_transparent());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert_eq!(
            RgbaFrame::transparent(0, 4),
            Err(FrameError::ZeroDimension { width: 0, height: 4 })
        );
    }

    #[test]
    fn test_sample_count_mismatch() {
        let err = RgbaFrame::from_samples(2, 2, vec![0.0; 15]).unwrap_err();
        assert_eq!(err, FrameError::SampleCountMismatch { expected: 16, actual: 15 });
    }

    #[test]
    fn test_pixel_access_is_row_major() {
        let mut frame = RgbaFrame::transparent(3, 2).unwrap();
        frame.set_pixel(2, 1, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(frame.pixel(2, 1), [0.1, 0.2, 0.3, 0.4]);
        // (2, 1) is pixel 5, samples 20..24
        assert_eq!(&frame.samples()[20..24], &[0.1, 0.2, 0.3, 0.4]);
        assert!(!frame.is_fully_transparent());
    }

    #[test]
    fn test_payload_preserves_bits() {
        let samples = vec![0.0, -0.0, 1.5, f32::MIN_POSITIVE, 0.25, 0.5, 0.75, 1.0];
        let frame = RgbaFrame::from_samples(2, 1, samples).unwrap();
        let payload = frame.to_payload();
        assert_eq!(payload.len(), RgbaFrame::payload_len(2, 1));

        let decoded = RgbaFrame::from_payload(2, 1, payload).unwrap();
        let original_bits: Vec<u32> = frame.samples().iter().map(|s| s.to_bits()).collect();
        let decoded_bits: Vec<u32> = decoded.samples().iter().map(|s| s.to_bits()).collect();
        assert_eq!(original_bits, decoded_bits);
    }

    #[test]
    fn test_payload_length_must_be_exact() {
        let frame = RgbaFrame::transparent(2, 2).unwrap();
        let payload = frame.to_payload();

        let err = RgbaFrame::from_payload(2, 3, payload.clone()).unwrap_err();
        assert_eq!(err, FrameError::PayloadLength { expected: 96, actual: 64 });

        let truncated = payload.slice(..payload.len() - 1);
        assert!(RgbaFrame::from_payload(2, 2, truncated).is_err());
    }

    #[test]
    fn test_to_rgba8_clamps() {
        let frame = RgbaFrame::from_samples(1, 1, vec![1.7, -0.3, 0.5, 1.0]).unwrap();
        assert_eq!(frame.to_rgba8(), vec![255, 0, 128, 255]);
    }
}
