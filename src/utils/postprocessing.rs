//! Turning raw network output into a cutout
//!
//! Each model family reads its output tensor differently; the result is always
//! a single-channel mask at the original image size, which is then used as the
//! alpha channel of the source pixels.

use crate::{
    error::{BgRemovalError, Result},
    models::ModelFamily,
};
use image::{imageops::FilterType, DynamicImage, GrayImage, ImageFormat, Luma, RgbaImage};
use ndarray::{ArrayViewD, Axis};
use std::io::Cursor;

/// Mask extraction and cutout composition
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Extract a mask at the output resolution from the first model output
    ///
    /// Expects an `[N, C, H, W]` tensor and reads batch 0.
    pub fn extract_mask(output: &ArrayViewD<'_, f32>, family: ModelFamily) -> Result<GrayImage> {
        let shape = output.shape();
        if shape.len() != 4 {
            return Err(BgRemovalError::processing(format!(
                "Expected 4D model output, got shape {shape:?}"
            )));
        }
        let (channels, height, width) = (shape[1], shape[2], shape[3]);
        if shape[0] == 0 || channels == 0 || height == 0 || width == 0 {
            return Err(BgRemovalError::processing(format!(
                "Model output has an empty dimension: {shape:?}"
            )));
        }

        let batch = output.index_axis(Axis(0), 0);
        let values: Vec<f32> = match family {
            ModelFamily::ClothSegmentation => {
                // Anything that is not the background class counts as foreground
                let mut values = vec![0.0_f32; height * width];
                for (index, value) in values.iter_mut().enumerate() {
                    let (y, x) = (index / width, index % width);
                    let background = batch[[0, y, x]];
                    let foreground = (1..channels).any(|c| batch[[c, y, x]] > background);
                    *value = if foreground { 1.0 } else { 0.0 };
                }
                values
            },
            ModelFamily::BiRefNet => batch
                .index_axis(Axis(0), 0)
                .iter()
                .map(|&v| 1.0 / (1.0 + (-v).exp()))
                .collect(),
            ModelFamily::U2Net | ModelFamily::IsNet | ModelFamily::SegmentAnything => {
                batch.index_axis(Axis(0), 0).iter().copied().collect()
            },
        };

        let normalized = Self::min_max_normalize(&values);
        let pixels: Vec<u8> = normalized
            .iter()
            .map(|&v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();

        GrayImage::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| BgRemovalError::internal("Mask buffer does not match output dimensions"))
    }

    /// Rescale values so the smallest maps to 0 and the largest to 1
    ///
    /// A constant input maps to all zeros unless the constant is already 1 or
    /// more, in which case it stays fully opaque.
    #[must_use]
    pub fn min_max_normalize(values: &[f32]) -> Vec<f32> {
        let (min, max) = values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;
        if !range.is_finite() || range <= f32::EPSILON {
            let fill = if max >= 1.0 { 1.0 } else { 0.0 };
            return vec![fill; values.len()];
        }
        values.iter().map(|&v| (v - min) / range).collect()
    }

    /// Resize a mask back to the source image size
    #[must_use]
    pub fn resize_mask(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
        if mask.dimensions() == (width, height) {
            return mask.clone();
        }
        image::imageops::resize(mask, width, height, FilterType::Lanczos3)
    }

    /// Use the mask as the alpha channel of the source image
    pub fn apply_mask(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage> {
        let mut rgba = image.to_rgba8();
        if rgba.dimensions() != mask.dimensions() {
            return Err(BgRemovalError::processing(format!(
                "Mask size {:?} does not match image size {:?}",
                mask.dimensions(),
                rgba.dimensions()
            )));
        }
        for (pixel, Luma([alpha])) in rgba.pixels_mut().zip(mask.pixels()) {
            pixel[3] = *alpha;
        }
        Ok(rgba)
    }

    /// Encode an RGBA buffer as PNG bytes
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| BgRemovalError::processing(format!("Failed to encode PNG: {e}")))?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use ndarray::Array4;

    #[test]
    fn test_min_max_normalize() {
        let normalized = MaskPostprocessor::min_max_normalize(&[2.0, 4.0, 6.0]);
        assert_eq!(normalized, vec![0.0, 0.5, 1.0]);
        assert_eq!(MaskPostprocessor::min_max_normalize(&[0.3, 0.3]), vec![0.0, 0.0]);
        assert_eq!(MaskPostprocessor::min_max_normalize(&[1.0, 1.0]), vec![1.0, 1.0]);
    }

    #[test]
    fn test_extract_mask_u2net_first_channel() {
        let mut output = Array4::<f32>::zeros((1, 2, 2, 2));
        output[[0, 0, 0, 0]] = 1.0;
        output[[0, 1, 1, 1]] = 5.0; // second channel ignored
        let mask = MaskPostprocessor::extract_mask(&output.view().into_dyn(), ModelFamily::U2Net).unwrap();
        assert_eq!(mask.dimensions(), (2, 2));
        assert_eq!(mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(mask.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn test_extract_mask_birefnet_applies_sigmoid() {
        let mut output = Array4::<f32>::zeros((1, 1, 1, 3));
        output[[0, 0, 0, 0]] = -10.0;
        output[[0, 0, 0, 1]] = 0.0;
        output[[0, 0, 0, 2]] = 10.0;
        let mask =
            MaskPostprocessor::extract_mask(&output.view().into_dyn(), ModelFamily::BiRefNet).unwrap();
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert!((127..=128).contains(&mask.get_pixel(1, 0).0[0]));
        assert_eq!(mask.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn test_extract_mask_cloth_uses_non_background_classes() {
        let mut output = Array4::<f32>::zeros((1, 4, 1, 2));
        output[[0, 0, 0, 0]] = 0.9; // background wins
        output[[0, 2, 0, 1]] = 0.8; // lower-body class wins
        let mask = MaskPostprocessor::extract_mask(
            &output.view().into_dyn(),
            ModelFamily::ClothSegmentation,
        )
        .unwrap();
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert_eq!(mask.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_extract_mask_rejects_wrong_rank() {
        let output = ndarray::Array2::<f32>::zeros((4, 4));
        assert!(MaskPostprocessor::extract_mask(&output.view().into_dyn(), ModelFamily::U2Net).is_err());
    }

    #[test]
    fn test_apply_mask_and_encode() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30])));
        let mask = GrayImage::from_pixel(3, 2, Luma([77]));
        let cutout = MaskPostprocessor::apply_mask(&image, &mask).unwrap();
        assert_eq!(*cutout.get_pixel(2, 1), Rgba([10, 20, 30, 77]));

        let png = MaskPostprocessor::encode_png(&cutout).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded, cutout);
    }

    #[test]
    fn test_apply_mask_size_mismatch() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::new(3, 2));
        let mask = GrayImage::new(2, 2);
        assert!(MaskPostprocessor::apply_mask(&image, &mask).is_err());
    }

    #[test]
    fn test_resize_mask() {
        let mask = GrayImage::from_pixel(4, 4, Luma([200]));
        let resized = MaskPostprocessor::resize_mask(&mask, 10, 6);
        assert_eq!(resized.dimensions(), (10, 6));
    }
}
