//! Composite accumulator
//!
//! Owned by the coordinator for the duration of the composite phase. Layers
//! are added one at a time in visibility order through `&mut self`, and
//! `resolve` consumes the accumulator to produce the final frame, so nothing
//! can touch the accumulator after it has been flattened.

use super::blend::{blend_over, contributes, resolve_background, DEFAULT_ALPHA_EPSILON};
use super::CompositeError;
use crate::frame::RgbaFrame;

/// Running back-to-front composite
#[derive(Debug, Clone)]
pub struct CompositeAccumulator {
    frame: RgbaFrame,
    epsilon: f32,
    layers: usize,
}

impl CompositeAccumulator {
    /// Start from fully transparent black with the default alpha epsilon
    pub fn new(width: u32, height: u32) -> Result<Self, CompositeError> {
        Self::with_epsilon(width, height, DEFAULT_ALPHA_EPSILON)
    }

    pub fn with_epsilon(width: u32, height: u32, epsilon: f32) -> Result<Self, CompositeError> {
        Ok(Self {
            frame: RgbaFrame::transparent(width, height)?,
            epsilon,
            layers: 0,
        })
    }

    /// Blend one layer over the accumulated result.
    ///
    /// Pixels whose alpha is at or below the epsilon are skipped without
    /// reading or writing the accumulator.
    pub fn composite(&mut self, layer: &RgbaFrame) -> Result<(), CompositeError> {
        if layer.dimensions() != self.frame.dimensions() {
            return Err(CompositeError::DimensionMismatch {
                expected: self.frame.dimensions(),
                actual: layer.dimensions(),
            });
        }

        let epsilon = self.epsilon;
        let mut touched = 0usize;
        for (acc, &src) in self.frame.pixels_mut().iter_mut().zip(layer.pixels()) {
            if contributes(src, epsilon) {
                *acc = blend_over(*acc, src);
                touched += 1;
            }
        }

        self.layers += 1;
        tracing::trace!(layer = self.layers, touched, "Layer composited");
        Ok(())
    }

    /// Number of layers composited so far
    pub fn layers(&self) -> usize {
        self.layers
    }

    /// The accumulated (premultiplied, unresolved) frame
    pub fn frame(&self) -> &RgbaFrame {
        &self.frame
    }

    /// Flatten onto an opaque background, touching only pixels with alpha < 1
    pub fn resolve(mut self, background: [f32; 3]) -> RgbaFrame {
        for pixel in self.frame.pixels_mut() {
            *pixel = resolve_background(*pixel, background);
        }
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::blend::DEFAULT_BACKGROUND;
    use crate::frame::Pixel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_frame(rng: &mut StdRng, width: u32, height: u32) -> RgbaFrame {
        let samples = (0..RgbaFrame::sample_count(width, height))
            .map(|_| rng.random::<f32>())
            .collect();
        RgbaFrame::from_samples(width, height, samples).unwrap()
    }

    fn bits(frame: &RgbaFrame) -> Vec<u32> {
        frame.samples().iter().map(|s| s.to_bits()).collect()
    }

    #[test]
    fn test_zero_alpha_layer_leaves_accumulator_bit_identical() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut acc = CompositeAccumulator::new(16, 16).unwrap();
        acc.composite(&random_frame(&mut rng, 16, 16)).unwrap();
        let before = bits(acc.frame());

        let mut clear = random_frame(&mut rng, 16, 16);
        for pixel in clear.pixels_mut() {
            pixel[3] = 0.0;
        }
        acc.composite(&clear).unwrap();
        assert_eq!(bits(acc.frame()), before);

        acc.composite(&RgbaFrame::transparent(16, 16).unwrap()).unwrap();
        assert_eq!(bits(acc.frame()), before);
        assert_eq!(acc.layers(), 3);
    }

    #[test]
    fn test_single_opaque_layer_matches_source() {
        let mut layer = RgbaFrame::transparent(2, 2).unwrap();
        for pixel in layer.pixels_mut() {
            *pixel = [1.0, 0.0, 0.0, 1.0];
        }

        let mut acc = CompositeAccumulator::new(2, 2).unwrap();
        acc.composite(&layer).unwrap();
        let out = acc.resolve(DEFAULT_BACKGROUND);
        assert_eq!(out, layer);
    }

    #[test]
    fn test_single_layer_equals_direct_blend() {
        let mut rng = StdRng::seed_from_u64(42);
        let layer = random_frame(&mut rng, 32, 8);

        let mut acc = CompositeAccumulator::new(32, 8).unwrap();
        acc.composite(&layer).unwrap();
        let composited = acc.resolve(DEFAULT_BACKGROUND);

        // Blend each pixel straight onto the background without an accumulator
        let direct: Vec<f32> = layer
            .pixels()
            .iter()
            .flat_map(|&[r, g, b, a]| {
                let covered: Pixel = if a > DEFAULT_ALPHA_EPSILON {
                    [r * a * 1.0, g * a * 1.0, b * a * 1.0, a * 1.0]
                } else {
                    [0.0; 4]
                };
                resolve_background(covered, DEFAULT_BACKGROUND)
            })
            .collect();
        let direct = RgbaFrame::from_samples(32, 8, direct).unwrap();
        assert_eq!(bits(&composited), bits(&direct));
    }

    #[test]
    fn test_opaque_pixel_survives_later_layers() {
        let mut front = RgbaFrame::transparent(1, 1).unwrap();
        front.set_pixel(0, 0, [1.0, 0.0, 0.0, 1.0]);
        let mut back = RgbaFrame::transparent(1, 1).unwrap();
        back.set_pixel(0, 0, [0.0, 1.0, 1.0, 1.0]);

        let mut acc = CompositeAccumulator::new(1, 1).unwrap();
        acc.composite(&front).unwrap();
        acc.composite(&back).unwrap();
        assert_eq!(acc.frame().pixel(0, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_resolve_only_touches_translucent_pixels() {
        let mut layer = RgbaFrame::transparent(2, 1).unwrap();
        layer.set_pixel(0, 0, [0.5, 0.5, 0.5, 1.0]);
        layer.set_pixel(1, 0, [1.0, 1.0, 1.0, 0.5]);

        let mut acc = CompositeAccumulator::new(2, 1).unwrap();
        acc.composite(&layer).unwrap();
        let out = acc.resolve([0.0, 0.0, 1.0]);
        assert_eq!(out.pixel(0, 0), [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(out.pixel(1, 0), [0.5, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let mut acc = CompositeAccumulator::new(4, 4).unwrap();
        let err = acc.composite(&RgbaFrame::transparent(4, 5).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            CompositeError::DimensionMismatch { expected: (4, 4), actual: (4, 5) }
        ));
        assert_eq!(acc.layers(), 0);
    }
}
