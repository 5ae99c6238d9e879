//! Supported segmentation models
//!
//! The set of model identifiers is closed. Anything outside it is rejected with a
//! configuration error before a backend ever sees it.

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Release location of the pretrained weights
const MODEL_RELEASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

/// Identifier of a pretrained segmentation network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "birefnet-general")]
    BirefnetGeneral,
    #[serde(rename = "birefnet-general-lite")]
    BirefnetGeneralLite,
    #[serde(rename = "birefnet-portrait")]
    BirefnetPortrait,
    #[serde(rename = "birefnet-dis")]
    BirefnetDis,
    #[serde(rename = "birefnet-hrsod")]
    BirefnetHrsod,
    #[serde(rename = "birefnet-cod")]
    BirefnetCod,
    #[serde(rename = "birefnet-massive")]
    BirefnetMassive,
    #[serde(rename = "u2net")]
    U2Net,
    #[serde(rename = "u2netp")]
    U2NetP,
    #[serde(rename = "u2net_human_seg")]
    U2NetHumanSeg,
    #[serde(rename = "u2net_cloth_seg")]
    U2NetClothSeg,
    #[serde(rename = "isnet-general-use")]
    IsnetGeneralUse,
    #[serde(rename = "isnet-anime")]
    IsnetAnime,
    #[serde(rename = "sam")]
    Sam,
}

/// Architecture family, which decides how input is prepared and output is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// U2-Net style saliency map, first output channel
    U2Net,
    /// U2-Net trained for clothing, one channel per class with channel 0 as background
    ClothSegmentation,
    /// IS-Net dichotomous segmentation
    IsNet,
    /// BiRefNet, logits that need a sigmoid
    BiRefNet,
    /// Segment Anything, needs point or box prompts
    SegmentAnything,
}

/// Image preprocessing parameters for a model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input size the network expects
    pub target_size: u32,
    /// Per-channel mean applied after scaling to `[0, 1]`
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation
    pub normalization_std: [f32; 3],
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

impl ModelId {
    /// Every supported model, in the order they are offered to the user
    pub const ALL: [ModelId; 14] = [
        ModelId::BirefnetGeneral,
        ModelId::BirefnetGeneralLite,
        ModelId::BirefnetPortrait,
        ModelId::BirefnetDis,
        ModelId::BirefnetHrsod,
        ModelId::BirefnetCod,
        ModelId::BirefnetMassive,
        ModelId::U2Net,
        ModelId::U2NetP,
        ModelId::U2NetHumanSeg,
        ModelId::U2NetClothSeg,
        ModelId::IsnetGeneralUse,
        ModelId::IsnetAnime,
        ModelId::Sam,
    ];

    /// Canonical string identifier
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BirefnetGeneral => "birefnet-general",
            Self::BirefnetGeneralLite => "birefnet-general-lite",
            Self::BirefnetPortrait => "birefnet-portrait",
            Self::BirefnetDis => "birefnet-dis",
            Self::BirefnetHrsod => "birefnet-hrsod",
            Self::BirefnetCod => "birefnet-cod",
            Self::BirefnetMassive => "birefnet-massive",
            Self::U2Net => "u2net",
            Self::U2NetP => "u2netp",
            Self::U2NetHumanSeg => "u2net_human_seg",
            Self::U2NetClothSeg => "u2net_cloth_seg",
            Self::IsnetGeneralUse => "isnet-general-use",
            Self::IsnetAnime => "isnet-anime",
            Self::Sam => "sam",
        }
    }

    /// One-line description shown next to the model picker
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::BirefnetGeneral => "BiRefNet General - Best quality, most accurate",
            Self::BirefnetGeneralLite => "BiRefNet Lite - Faster, good quality",
            Self::BirefnetPortrait => "BiRefNet Portrait - Optimized for faces",
            Self::BirefnetDis => "BiRefNet DIS - Dichotomous segmentation",
            Self::BirefnetHrsod => "BiRefNet HRSOD - High-res salient objects",
            Self::BirefnetCod => "BiRefNet COD - Concealed object detection",
            Self::BirefnetMassive => "BiRefNet Massive - Large dataset trained",
            Self::U2Net => "U2Net - Classic model, balanced",
            Self::U2NetP => "U2Net-P - Lightweight, fast",
            Self::U2NetHumanSeg => "U2Net Human - Human segmentation",
            Self::U2NetClothSeg => "U2Net Cloth - Clothing segmentation",
            Self::IsnetGeneralUse => "ISNet General - Good all-around",
            Self::IsnetAnime => "ISNet Anime - Anime/illustration optimized",
            Self::Sam => "SAM - Segment Anything Model",
        }
    }

    #[must_use]
    pub fn family(self) -> ModelFamily {
        match self {
            Self::BirefnetGeneral
            | Self::BirefnetGeneralLite
            | Self::BirefnetPortrait
            | Self::BirefnetDis
            | Self::BirefnetHrsod
            | Self::BirefnetCod
            | Self::BirefnetMassive => ModelFamily::BiRefNet,
            Self::U2Net | Self::U2NetP | Self::U2NetHumanSeg => ModelFamily::U2Net,
            Self::U2NetClothSeg => ModelFamily::ClothSegmentation,
            Self::IsnetGeneralUse | Self::IsnetAnime => ModelFamily::IsNet,
            Self::Sam => ModelFamily::SegmentAnything,
        }
    }

    /// Input size and normalization for this model
    #[must_use]
    pub fn preprocessing_config(self) -> PreprocessingConfig {
        let (target_size, normalization_mean, normalization_std) = match self {
            Self::U2Net | Self::U2NetP | Self::U2NetHumanSeg => (320, IMAGENET_MEAN, IMAGENET_STD),
            Self::U2NetClothSeg => (768, IMAGENET_MEAN, IMAGENET_STD),
            Self::IsnetGeneralUse => (1024, [0.5, 0.5, 0.5], [1.0, 1.0, 1.0]),
            Self::IsnetAnime => (1024, IMAGENET_MEAN, [1.0, 1.0, 1.0]),
            Self::Sam => (1024, [123.675, 116.28, 103.53], [58.395, 57.12, 57.375]),
            _ => (1024, IMAGENET_MEAN, IMAGENET_STD),
        };
        PreprocessingConfig {
            target_size,
            normalization_mean,
            normalization_std,
        }
    }

    /// Name of the weights file inside the model store
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.as_str())
    }

    /// Remote location of the weights, `None` for models that cannot run unprompted
    #[must_use]
    pub fn download_url(self) -> Option<String> {
        let remote = match self {
            Self::BirefnetGeneral => "BiRefNet-general-epoch_244.onnx",
            Self::BirefnetGeneralLite => "BiRefNet-general-bb_swin_v1_tiny-epoch_232.onnx",
            Self::BirefnetPortrait => "BiRefNet-portrait-epoch_150.onnx",
            Self::BirefnetDis => "BiRefNet-DIS-epoch_590.onnx",
            Self::BirefnetHrsod => "BiRefNet-HRSOD_DHU-epoch_115.onnx",
            Self::BirefnetCod => "BiRefNet-COD-epoch_125.onnx",
            Self::BirefnetMassive => "BiRefNet-massive-TR_DIS5K_TR_TEs-epoch_420.onnx",
            Self::U2Net => "u2net.onnx",
            Self::U2NetP => "u2netp.onnx",
            Self::U2NetHumanSeg => "u2net_human_seg.onnx",
            Self::U2NetClothSeg => "u2net_cloth_seg.onnx",
            Self::IsnetGeneralUse => "isnet-general-use.onnx",
            Self::IsnetAnime => "isnet-anime.onnx",
            Self::Sam => return None,
        };
        Some(format!("{MODEL_RELEASE_URL}/{remote}"))
    }

    /// Whether the model produces a mask without user prompts
    #[must_use]
    pub fn supports_unprompted(self) -> bool {
        self.family() != ModelFamily::SegmentAnything
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::BirefnetGeneral
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| {
                BgRemovalError::configuration(format!(
                    "Unsupported model: '{}'. Supported models: {}",
                    s,
                    Self::ALL
                        .iter()
                        .map(|m| m.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}
