//! Persisted user settings
//!
//! Settings are a flat JSON object stored next to the executable. Loading
//! never fails: saved values are merged key by key over the defaults, and
//! anything unreadable falls back to the default for that key (or for the whole
//! file). Keys this version does not know are kept and written back unchanged.

use crate::{
    config::{
        ExecutionProvider, OutputFormat, ProcessingOptions, BG_THRESHOLD_RANGE,
        DEFAULT_BG_THRESHOLD, DEFAULT_ERODE_SIZE, DEFAULT_FG_THRESHOLD, DEFAULT_SUFFIX,
        ERODE_SIZE_RANGE, FG_THRESHOLD_RANGE,
    },
    error::{BgRemovalError, Result},
    models::ModelId,
    processor::BackendType,
    utils::ExecutionProviderManager,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// File name of the settings file
pub const SETTINGS_FILE_NAME: &str = "bg_remover_config.json";

/// Settings as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub model: String,
    pub suffix: String,
    pub alpha_matting: bool,
    pub alpha_matting_fg_threshold: i64,
    pub alpha_matting_bg_threshold: i64,
    pub alpha_matting_erode_size: i64,
    pub output_format: OutputFormat,
    pub auto_process: bool,
    /// Backend selector, `backend[:provider]`
    pub backend: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model: ModelId::default().as_str().to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
            alpha_matting: false,
            alpha_matting_fg_threshold: i64::from(DEFAULT_FG_THRESHOLD),
            alpha_matting_bg_threshold: i64::from(DEFAULT_BG_THRESHOLD),
            alpha_matting_erode_size: i64::from(DEFAULT_ERODE_SIZE),
            output_format: OutputFormat::Png,
            auto_process: true,
            backend: "onnx".to_string(),
            extra: Map::new(),
        }
    }
}

impl AppSettings {
    /// Settings file next to the running executable
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    /// Load settings from `path`, merged over the defaults
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path_ref = path.as_ref();
        let text = match std::fs::read_to_string(path_ref) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No settings at {}, using defaults", path_ref.display());
                return Self::default();
            },
            Err(e) => {
                log::warn!("Could not read settings {}: {}", path_ref.display(), e);
                return Self::default();
            },
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(saved)) => Self::merge_over_defaults(saved),
            Ok(_) => {
                log::warn!(
                    "Settings {} is not a JSON object, using defaults",
                    path_ref.display()
                );
                Self::default()
            },
            Err(e) => {
                log::warn!("Could not parse settings {}: {}", path_ref.display(), e);
                Self::default()
            },
        }
    }

    /// Apply saved keys one at a time, skipping any that do not fit their field
    fn merge_over_defaults(saved: Map<String, Value>) -> Self {
        let mut merged = match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => return Self::default(),
        };

        for (key, value) in saved {
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value.clone());
            if serde_json::from_value::<Self>(Value::Object(candidate)).is_ok() {
                merged.insert(key, value);
            } else {
                log::warn!("Ignoring invalid settings value for '{}': {}", key, value);
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or_default()
    }

    /// Write the settings as pretty-printed JSON
    ///
    /// # Errors
    /// - Serialization or write failure; also logged
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BgRemovalError::internal(format!("Failed to serialize settings: {e}")))?;
        std::fs::write(path_ref, json).map_err(|e| {
            log::error!("Failed to save settings to {}: {}", path_ref.display(), e);
            BgRemovalError::file_io_error("write settings", path_ref, &e)
        })
    }

    /// Build the options snapshot for a request, clamping values into range
    ///
    /// # Errors
    /// - Suffix containing a path separator
    pub fn to_options(&self) -> Result<ProcessingOptions> {
        ProcessingOptions::builder()
            .model_id(self.model.clone())
            .alpha_matting(self.alpha_matting)
            .fg_threshold(clamp_setting(self.alpha_matting_fg_threshold, &FG_THRESHOLD_RANGE))
            .bg_threshold(clamp_setting(self.alpha_matting_bg_threshold, &BG_THRESHOLD_RANGE))
            .erode_size(clamp_setting(self.alpha_matting_erode_size, &ERODE_SIZE_RANGE))
            .output_suffix(self.suffix.clone())
            .build()
    }

    /// Parsed backend selection
    ///
    /// # Errors
    /// - Unknown backend or provider name
    pub fn backend_selection(&self) -> Result<(BackendType, ExecutionProvider)> {
        ExecutionProviderManager::parse_provider_string(&self.backend)
    }
}

fn clamp_setting(value: i64, range: &RangeInclusive<u8>) -> u8 {
    let clamped = value.clamp(i64::from(*range.start()), i64::from(*range.end()));
    u8::try_from(clamped).unwrap_or(*range.start())
}
