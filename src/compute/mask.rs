//! Host implementation of the `mask_to_image` kernel.
//!
//! Must stay bit-identical to `gpu/shaders/mask.wgsl`.

use crate::schema::MaskColor;

/// Integer luma, `(77r + 150g + 29b + 128) >> 8`.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8) as u8
}

/// Apply the mask to a single RGBA pixel. Alpha is always preserved.
#[inline]
pub fn mask_pixel(px: [u8; 4], color: MaskColor) -> [u8; 4] {
    let [r, g, b, a] = px;
    match color {
        MaskColor::Identity => px,
        MaskColor::Bw => {
            let y = luma(r, g, b);
            [y, y, y, a]
        }
        MaskColor::Red => [r, 0, 0, a],
        MaskColor::Green => [0, g, 0, a],
        MaskColor::Blue => [0, 0, b, a],
    }
}

/// Apply the mask to a run of RGBA8 pixels.
pub fn mask_pixels(input: &[u8], output: &mut [u8], color: MaskColor) {
    for (src, dst) in input.chunks_exact(4).zip(output.chunks_exact_mut(4)) {
        dst.copy_from_slice(&mask_pixel([src[0], src[1], src[2], src[3]], color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_extremes() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
    }

    #[test]
    fn test_channels_masked() {
        let px = [10, 20, 30, 40];
        assert_eq!(mask_pixel(px, MaskColor::Identity), px);
        assert_eq!(mask_pixel(px, MaskColor::Red), [10, 0, 0, 40]);
        assert_eq!(mask_pixel(px, MaskColor::Green), [0, 20, 0, 40]);
        assert_eq!(mask_pixel(px, MaskColor::Blue), [0, 0, 30, 40]);

        let [y0, y1, y2, a] = mask_pixel(px, MaskColor::Bw);
        assert_eq!((y0, a), (y1, 40));
        assert_eq!(y1, y2);
    }

    #[test]
    fn test_mask_pixels_run() {
        let input = [255, 0, 0, 255, 0, 255, 0, 128];
        let mut output = [0u8; 8];
        mask_pixels(&input, &mut output, MaskColor::Blue);
        assert_eq!(output, [0, 0, 0, 255, 0, 0, 0, 128]);
    }
}
