//! Merging command-line overrides into persisted settings

use crate::cli::main_impl::Cli;
use crate::{
    config::BackendConfig,
    models::ModelId,
    processor::BackendType,
    settings::AppSettings,
    utils::{ExecutionProviderManager, NumericValidator},
};
use anyhow::{Context, Result};

/// Applies CLI arguments on top of the settings file
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Overwrite the settings with every flag the user actually passed
    ///
    /// Thresholds are stored as given and clamped when options are built, the
    /// same way values read from the settings file are.
    pub(crate) fn apply_overrides(cli: &Cli, settings: &mut AppSettings) -> Result<()> {
        if let Some(model) = &cli.model {
            settings.model = model.clone();
        }
        if let Some(suffix) = &cli.suffix {
            settings.suffix = suffix.clone();
        }
        if cli.alpha_matting {
            settings.alpha_matting = true;
        }
        if cli.no_alpha_matting {
            settings.alpha_matting = false;
        }
        if let Some(value) = cli.fg_threshold {
            settings.alpha_matting_fg_threshold = value;
        }
        if let Some(value) = cli.bg_threshold {
            settings.alpha_matting_bg_threshold = value;
        }
        if let Some(value) = cli.erode_size {
            settings.alpha_matting_erode_size = value;
        }
        if let Some(backend) = &cli.backend {
            ExecutionProviderManager::parse_provider_string(backend)
                .context("Invalid backend selection")?;
            settings.backend = backend.clone();
        }
        Ok(())
    }

    /// Backend type and its runtime configuration
    pub(crate) fn backend_config(cli: &Cli, settings: &AppSettings) -> Result<(BackendType, BackendConfig)> {
        let (backend_type, execution_provider) = settings
            .backend_selection()
            .context("Invalid backend selection")?;
        let threads = NumericValidator::validate_thread_count(cli.threads)
            .context("Invalid thread count")?;

        Ok((
            backend_type,
            BackendConfig {
                execution_provider,
                // One value drives both pools; 0 lets the backend pick
                intra_threads: threads,
                inter_threads: threads,
            },
        ))
    }

    /// Model named by `--model`, falling back to the settings file
    pub(crate) fn model(cli: &Cli, settings: &AppSettings) -> Result<ModelId> {
        let name = cli.model.as_deref().unwrap_or(&settings.model);
        Ok(name.parse::<ModelId>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionProvider;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["braindead-bgremove"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_no_flags_keep_settings() {
        let cli = parse(&["cat.png"]);
        let mut settings = AppSettings {
            model: "u2net".to_string(),
            alpha_matting: true,
            ..AppSettings::default()
        };
        let before = settings.clone();
        CliConfigBuilder::apply_overrides(&cli, &mut settings).unwrap();
        assert_eq!(settings, before);
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = parse(&[
            "--model",
            "isnet-anime",
            "--suffix",
            "_cutout",
            "--alpha-matting",
            "--fg-threshold",
            "230",
            "--erode-size",
            "5",
            "--backend",
            "tract",
            "cat.png",
        ]);
        let mut settings = AppSettings::default();
        CliConfigBuilder::apply_overrides(&cli, &mut settings).unwrap();

        assert_eq!(settings.model, "isnet-anime");
        assert_eq!(settings.suffix, "_cutout");
        assert!(settings.alpha_matting);
        assert_eq!(settings.alpha_matting_fg_threshold, 230);
        assert_eq!(settings.alpha_matting_bg_threshold, 10);
        assert_eq!(settings.alpha_matting_erode_size, 5);
        assert_eq!(settings.backend, "tract");

        let (backend, config) = CliConfigBuilder::backend_config(&cli, &settings).unwrap();
        assert_eq!(backend, BackendType::Tract);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(CliConfigBuilder::model(&cli, &settings).unwrap(), ModelId::IsnetAnime);
    }

    #[test]
    fn test_no_alpha_matting_wins_over_settings() {
        let cli = parse(&["--no-alpha-matting", "cat.png"]);
        let mut settings = AppSettings {
            alpha_matting: true,
            ..AppSettings::default()
        };
        CliConfigBuilder::apply_overrides(&cli, &mut settings).unwrap();
        assert!(!settings.alpha_matting);
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let cli = parse(&["--backend", "tract:cuda", "cat.png"]);
        let mut settings = AppSettings::default();
        assert!(CliConfigBuilder::apply_overrides(&cli, &mut settings).is_err());
        assert_eq!(settings.backend, "onnx");
    }

    #[test]
    fn test_unknown_model_rejected() {
        let cli = parse(&["--model", "not-a-model", "cat.png"]);
        assert!(CliConfigBuilder::model(&cli, &AppSettings::default()).is_err());
    }

    #[test]
    fn test_thread_count_validated() {
        let cli = parse(&["--threads", "4", "cat.png"]);
        let (_, config) = CliConfigBuilder::backend_config(&cli, &AppSettings::default()).unwrap();
        assert_eq!((config.intra_threads, config.inter_threads), (4, 4));

        let cli = parse(&["--threads", "1000", "cat.png"]);
        assert!(CliConfigBuilder::backend_config(&cli, &AppSettings::default()).is_err());
    }
}
