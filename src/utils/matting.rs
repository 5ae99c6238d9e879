//! Trimap alpha-matting refinement
//!
//! The soft segmentation mask is split into three regions. Confident
//! foreground and background are shrunk by an erosion and then snapped to
//! fully opaque or fully transparent; whatever lies between keeps its soft
//! mask value, which gives a clean interior with a feathered boundary.

use crate::config::MattingParams;
use image::GrayImage;

/// Alpha-matting refinement over a single-channel mask
pub struct AlphaMatting;

impl AlphaMatting {
    /// Refine a mask using the given thresholds and erosion size
    #[must_use]
    pub fn refine(mask: &GrayImage, params: &MattingParams) -> GrayImage {
        let (width, height) = mask.dimensions();
        let (w, h) = (width as usize, height as usize);
        let raw = mask.as_raw();

        let foreground: Vec<bool> = raw.iter().map(|&v| v > params.fg_threshold).collect();
        let background: Vec<bool> = raw.iter().map(|&v| v < params.bg_threshold).collect();

        let size = usize::from(params.erode_size);
        let foreground = Self::erode(&foreground, w, h, size);
        let background = Self::erode(&background, w, h, size);

        let mut refined = mask.clone();
        for (index, pixel) in refined.pixels_mut().enumerate() {
            if foreground.get(index).copied().unwrap_or(false) {
                pixel.0[0] = 255;
            } else if background.get(index).copied().unwrap_or(false) {
                pixel.0[0] = 0;
            }
        }
        refined
    }

    /// Binary erosion with a `size x size` square; pixels outside the image count as unset
    fn erode(region: &[bool], width: usize, height: usize, size: usize) -> Vec<bool> {
        if size <= 1 || region.is_empty() {
            return region.to_vec();
        }
        let horizontal = Self::erode_pass(region, width, height, size, true);
        Self::erode_pass(&horizontal, width, height, size, false)
    }

    /// One separable pass: a pixel survives only if the full window along the axis is set
    fn erode_pass(region: &[bool], width: usize, height: usize, size: usize, along_x: bool) -> Vec<bool> {
        let (lines, length) = if along_x { (height, width) } else { (width, height) };
        let before = (size - 1) / 2;
        let after = size / 2;
        let at = |line: usize, pos: usize| -> usize {
            if along_x {
                line * width + pos
            } else {
                pos * width + line
            }
        };

        let mut out = vec![false; region.len()];
        let mut prefix = vec![0usize; length + 1];
        for line in 0..lines {
            for pos in 0..length {
                let set = region.get(at(line, pos)).copied().unwrap_or(false);
                prefix[pos + 1] = prefix[pos] + usize::from(set);
            }
            for pos in 0..length {
                if pos < before || pos + after >= length {
                    continue;
                }
                let count = prefix[pos + after + 1] - prefix[pos - before];
                if count == size {
                    if let Some(slot) = out.get_mut(at(line, pos)) {
                        *slot = true;
                    }
                }
            }
        }
        out
    }
}
