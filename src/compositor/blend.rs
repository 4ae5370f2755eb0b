//! Per-pixel blend operators
//!
//! Two operators make up the composite: `blend_over`, which accumulates a
//! layer in visibility order, and `resolve_background`, which flattens the
//! accumulated result onto an opaque background.

use crate::frame::Pixel;

/// Source alpha at or below this is skipped entirely
pub const DEFAULT_ALPHA_EPSILON: f32 = 0.01;

/// Background used by the resolve pass (dark grey, opaque)
pub const DEFAULT_BACKGROUND: [f32; 3] = [0.2, 0.2, 0.2];

/// Accumulate `src` onto `acc`.
///
/// ```text
/// out.rgb = acc.rgb + src.rgb * src.a * (1 - acc.a)
/// out.a   = acc.a   + src.a   * (1 - acc.a)
/// ```
///
/// Source color is straight (not premultiplied); the accumulator holds
/// premultiplied color. Once `acc.a` reaches exactly 1.0 the pixel no longer
/// changes.
#[inline]
pub fn blend_over(acc: Pixel, src: Pixel) -> Pixel {
    let src_alpha = src[3];
    let remaining = 1.0 - acc[3];
    [
        acc[0] + src[0] * src_alpha * remaining,
        acc[1] + src[1] * src_alpha * remaining,
        acc[2] + src[2] * src_alpha * remaining,
        acc[3] + src_alpha * remaining,
    ]
}

/// Whether a source pixel contributes at all under `epsilon`
#[inline]
pub fn contributes(src: Pixel, epsilon: f32) -> bool {
    src[3] > epsilon
}

/// Flatten an accumulated pixel onto an opaque background.
///
/// Pixels with alpha >= 1.0 are returned untouched, bit for bit.
#[inline]
pub fn resolve_background(acc: Pixel, background: [f32; 3]) -> Pixel {
    if acc[3] >= 1.0 {
        return acc;
    }
    let remaining = 1.0 - acc[3];
    [
        acc[0] + background[0] * remaining,
        acc[1] + background[1] * remaining,
        acc[2] + background[2] * remaining,
        1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_onto_transparent_premultiplies() {
        let out = blend_over([0.0; 4], [1.0, 0.5, 0.25, 0.5]);
        assert_eq!(out, [0.5, 0.25, 0.125, 0.5]);
    }

    #[test]
    fn test_opaque_accumulator_is_unchanged() {
        let acc = [0.3, 0.6, 0.9, 1.0];
        assert_eq!(blend_over(acc, [1.0, 1.0, 1.0, 1.0]), acc);
        assert_eq!(blend_over(acc, [0.0, 0.2, 0.0, 0.7]), acc);
    }

    #[test]
    fn test_two_layers() {
        let back = [0.0, 0.0, 1.0, 0.5];
        let front = [1.0, 0.0, 0.0, 1.0];

        let acc = blend_over(blend_over([0.0; 4], back), front);
        assert_eq!(acc, [0.5, 0.0, 0.5, 1.0]);

        // Reversed, the opaque layer saturates first and the other is ignored
        let acc = blend_over(blend_over([0.0; 4], front), back);
        assert_eq!(acc, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_epsilon_gate() {
        assert!(!contributes([1.0, 1.0, 1.0, 0.0], DEFAULT_ALPHA_EPSILON));
        assert!(!contributes([1.0, 1.0, 1.0, 0.01], DEFAULT_ALPHA_EPSILON));
        assert!(contributes([1.0, 1.0, 1.0, 0.011], DEFAULT_ALPHA_EPSILON));
    }

    #[test]
    fn test_resolve_transparent_gives_background() {
        let out = resolve_background([0.0; 4], DEFAULT_BACKGROUND);
        assert_eq!(out, [0.2, 0.2, 0.2, 1.0]);
    }

    #[test]
    fn test_resolve_partial_alpha() {
        let out = resolve_background([0.25, 0.0, 0.0, 0.5], [1.0, 1.0, 0.0]);
        assert_eq!(out, [0.75, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_resolve_leaves_opaque_pixels_bit_identical() {
        let acc = [1.25, -0.0, f32::MIN_POSITIVE, 1.0];
        let out = resolve_background(acc, DEFAULT_BACKGROUND);
        let bits = |p: Pixel| p.map(f32::to_bits);
        assert_eq!(bits(out), bits(acc));
    }
}
