//! Backend selection strings
//!
//! The shell and the settings file name a backend as `backend[:provider]`,
//! for example `onnx`, `onnx:cuda` or `tract:cpu`.

use crate::{
    config::ExecutionProvider,
    error::{BgRemovalError, Result},
    processor::BackendType,
};

/// A selectable backend/provider pair and whether this build can use it
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: &'static str,
}

const PROVIDER_TABLE: [(BackendType, ExecutionProvider, &str); 5] = [
    (
        BackendType::Onnx,
        ExecutionProvider::Auto,
        "ONNX Runtime with the best available provider",
    ),
    (BackendType::Onnx, ExecutionProvider::Cpu, "ONNX Runtime CPU execution"),
    (BackendType::Onnx, ExecutionProvider::Cuda, "ONNX Runtime CUDA GPU acceleration"),
    (
        BackendType::Onnx,
        ExecutionProvider::CoreMl,
        "ONNX Runtime CoreML (Apple Silicon) acceleration",
    ),
    (BackendType::Tract, ExecutionProvider::Cpu, "Pure Rust CPU inference via Tract"),
];

/// Parses and lists backend selections
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse a `backend[:provider]` string
    ///
    /// A bare backend name picks that backend's default provider.
    ///
    /// ```rust
    /// use braindead_bgremove::{config::ExecutionProvider, processor::BackendType};
    /// use braindead_bgremove::utils::ExecutionProviderManager;
    ///
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx:cuda").unwrap();
    /// assert_eq!(backend, BackendType::Onnx);
    /// assert_eq!(provider, ExecutionProvider::Cuda);
    /// ```
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let normalized = provider_str.trim().to_lowercase();
        let (backend, provider) = match normalized.split_once(':') {
            Some((backend, provider)) => (backend, Some(provider)),
            None => (normalized.as_str(), None),
        };

        let backend_type = match backend {
            "onnx" => BackendType::Onnx,
            "tract" => BackendType::Tract,
            other => {
                return Err(BgRemovalError::configuration(format!(
                    "Unknown backend: {other}. Supported backends: onnx, tract"
                )))
            },
        };

        let Some(provider) = provider else {
            return Ok((backend_type, Self::default_provider_for_backend(backend_type)));
        };

        let execution_provider = match (backend_type, provider) {
            (BackendType::Onnx, "auto") => ExecutionProvider::Auto,
            (BackendType::Onnx, "cpu") | (BackendType::Tract, "cpu") => ExecutionProvider::Cpu,
            (BackendType::Onnx, "cuda") => ExecutionProvider::Cuda,
            (BackendType::Onnx, "coreml") => ExecutionProvider::CoreMl,
            (BackendType::Onnx, other) => {
                return Err(BgRemovalError::configuration(format!(
                    "Unknown ONNX provider: {other}. Supported: auto, cpu, cuda, coreml"
                )))
            },
            (BackendType::Tract, other) => {
                return Err(BgRemovalError::configuration(format!(
                    "Unknown Tract provider: {other}. Tract only supports 'cpu'"
                )))
            },
        };
        Ok((backend_type, execution_provider))
    }

    /// Every known selection with its availability in this build
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        PROVIDER_TABLE
            .iter()
            .map(|&(backend_type, execution_provider, description)| ProviderInfo {
                name: Self::provider_to_string(backend_type, execution_provider),
                backend_type,
                execution_provider,
                available: Self::is_available(backend_type, execution_provider),
                description,
            })
            .collect()
    }

    /// Whether this build can run the given selection
    pub fn is_available(backend_type: BackendType, provider: ExecutionProvider) -> bool {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => crate::backends::OnnxBackend::is_provider_available(provider),
            #[cfg(not(feature = "onnx"))]
            BackendType::Onnx => {
                let _ = provider;
                false
            },
            BackendType::Tract => cfg!(feature = "tract") && provider == ExecutionProvider::Cpu,
        }
    }

    pub fn is_valid_provider_string(provider_str: &str) -> bool {
        Self::parse_provider_string(provider_str).is_ok()
    }

    #[must_use]
    pub fn default_provider_for_backend(backend_type: BackendType) -> ExecutionProvider {
        match backend_type {
            BackendType::Onnx => ExecutionProvider::Auto,
            BackendType::Tract => ExecutionProvider::Cpu,
        }
    }

    /// Inverse of [`Self::parse_provider_string`]
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        let backend_str = match backend_type {
            BackendType::Onnx => "onnx",
            BackendType::Tract => "tract",
        };
        let provider_str = match provider {
            ExecutionProvider::Auto => "auto",
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
            ExecutionProvider::CoreMl => "coreml",
        };
        format!("{backend_str}:{provider_str}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_onnx_providers() {
        for (input, expected) in [
            ("onnx:auto", ExecutionProvider::Auto),
            ("onnx:cpu", ExecutionProvider::Cpu),
            ("onnx:cuda", ExecutionProvider::Cuda),
            ("ONNX:CoreML", ExecutionProvider::CoreMl),
        ] {
            let (backend, provider) = ExecutionProviderManager::parse_provider_string(input).unwrap();
            assert_eq!(backend, BackendType::Onnx);
            assert_eq!(provider, expected, "{input}");
        }
    }

    #[test]
    fn test_parse_tract_providers() {
        let (backend, provider) =
            ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap();
        assert_eq!(backend, BackendType::Tract);
        assert_eq!(provider, ExecutionProvider::Cpu);

        assert!(ExecutionProviderManager::parse_provider_string("tract:cuda").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("tract:auto").is_err());
    }

    #[test]
    fn test_parse_backend_only() {
        let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx").unwrap();
        assert_eq!(backend, BackendType::Onnx);
        assert_eq!(provider, ExecutionProvider::Auto);

        let (backend, provider) = ExecutionProviderManager::parse_provider_string(" tract ").unwrap();
        assert_eq!(backend, BackendType::Tract);
        assert_eq!(provider, ExecutionProvider::Cpu);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(!ExecutionProviderManager::is_valid_provider_string("invalid"));
        assert!(!ExecutionProviderManager::is_valid_provider_string("onnx:invalid"));
        assert!(!ExecutionProviderManager::is_valid_provider_string("invalid:auto"));
        assert!(!ExecutionProviderManager::is_valid_provider_string(""));
    }

    #[test]
    fn test_provider_string_round_trip_for_listing() {
        for info in ExecutionProviderManager::list_all_providers() {
            let (backend, provider) =
                ExecutionProviderManager::parse_provider_string(&info.name).unwrap();
            assert_eq!(backend, info.backend_type);
            assert_eq!(provider, info.execution_provider);
        }
    }

    #[test]
    fn test_list_all_providers() {
        let providers = ExecutionProviderManager::list_all_providers();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"onnx:auto"));
        assert!(names.contains(&"tract:cpu"));

        let tract = providers.iter().find(|p| p.name == "tract:cpu").unwrap();
        assert_eq!(tract.available, cfg!(feature = "tract"));
    }
}
