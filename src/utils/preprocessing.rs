//! Image preprocessing for segmentation networks
//!
//! Every supported network takes a square NCHW float tensor. The image is
//! stretched to the square (no letterboxing), scaled by its brightest channel
//! value and then normalized per channel.

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
    utils::validation::NumericValidator,
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Resize and normalize an image into a `[1, 3, size, size]` tensor
    ///
    /// # Errors
    /// Returns a processing error when the target size is zero or the image is empty.
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let target_size =
            NumericValidator::validate_dimension(preprocessing_config.target_size, "Target size")?;
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::processing("Input image has no pixels"));
        }

        let resized = image::imageops::resize(
            &image.to_rgb8(),
            target_size,
            target_size,
            FilterType::Lanczos3,
        );

        let side: usize = target_size.try_into().map_err(|_| {
            BgRemovalError::processing(
                "Target size too large for usize conversion in tensor allocation",
            )
        })?;

        Ok(Self::canvas_to_tensor(&resized, preprocessing_config, side))
    }

    /// Convert the resized image to a normalized tensor
    fn canvas_to_tensor(
        canvas: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
        side: usize,
    ) -> Array4<f32> {
        let max_value = canvas
            .as_raw()
            .iter()
            .copied()
            .max()
            .map_or(0.0, f32::from)
            .max(1e-6);

        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for channel in 0..3 {
                    let scaled = f32::from(pixel[channel]) / max_value;
                    tensor[[0, channel, y, x]] = (scaled - mean[channel]) / std[channel];
                }
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn config(target_size: u32) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size,
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb(color));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_tensor_shape_is_square_for_any_aspect() {
        let tensor = ImagePreprocessor::preprocess_for_inference(&solid(100, 40, [255, 0, 0]), &config(32))
            .unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
    }

    #[test]
    fn test_values_scaled_by_brightest_channel() {
        // Brightest value is 128, so the red channel scales to exactly 1.0
        let tensor = ImagePreprocessor::preprocess_for_inference(&solid(8, 8, [128, 0, 0]), &config(8))
            .unwrap();
        let expected_r = (1.0 - 0.485) / 0.229;
        let expected_g = (0.0 - 0.456) / 0.224;
        assert!((tensor[[0, 0, 4, 4]] - expected_r).abs() < 1e-4);
        assert!((tensor[[0, 1, 4, 4]] - expected_g).abs() < 1e-4);
    }

    #[test]
    fn test_black_image_does_not_divide_by_zero() {
        let tensor = ImagePreprocessor::preprocess_for_inference(&solid(4, 4, [0, 0, 0]), &config(4))
            .unwrap();
        assert!(tensor.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_target_size_rejected() {
        let result = ImagePreprocessor::preprocess_for_inference(&solid(4, 4, [1, 2, 3]), &config(0));
        assert!(result.is_err());
    }
}
