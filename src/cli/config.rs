//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{default_models_dir, parse_provider_string, repo_dir_name, BlastConfig, ResampleMethod},
    download::parse_repo_id,
};
use anyhow::{Context, Result};
use std::path::Path;

/// Convert CLI arguments to a `BlastConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: JSON file (or defaults), then command-line overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<BlastConfig> {
        let mut config = match &cli.config {
            Some(path) => BlastConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => BlastConfig::default(),
        };

        if let Some(db) = &cli.db {
            config.database_path.clone_from(db);
        }

        if let Some(model) = &cli.model {
            Self::apply_model_arg(&mut config, model)?;
        }

        if let Some(variant) = &cli.variant {
            config.model_variant = Some(variant.clone());
        }

        if let Some(provider) = &cli.execution_provider {
            let (backend_type, execution_provider) =
                parse_provider_string(provider).context("Invalid execution provider format")?;
            config.backend_type = backend_type;
            config.execution_provider = execution_provider;
        }

        if let Some(resample) = &cli.resample {
            config.resample = resample
                .parse::<ResampleMethod>()
                .context("Invalid resample method")?;
        }

        if cli.threads > 0 {
            config.intra_threads = cli.threads;
            config.inter_threads = cli.threads;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// `--model` is either an existing model folder or a repository id
    fn apply_model_arg(config: &mut BlastConfig, model: &str) -> Result<()> {
        let path = Path::new(model);
        if path.is_dir() {
            config.model_dir = path.to_path_buf();
            return Ok(());
        }

        let repo = parse_repo_id(model)
            .with_context(|| format!("'{model}' is neither a model folder nor a repository id"))?;
        config.model_dir = default_models_dir().join(repo_dir_name(&repo));
        config.model_repo = repo;
        Ok(())
    }

    /// True when the model folder is the managed download location for the repository
    pub(crate) fn uses_managed_model(config: &BlastConfig) -> bool {
        config.model_dir == default_models_dir().join(repo_dir_name(&config.model_repo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendType, ExecutionProvider};
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["bgblast"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = CliConfigBuilder::from_cli(&parse(&["list"])).unwrap();
        assert_eq!(config, BlastConfig::default());
        assert!(CliConfigBuilder::uses_managed_model(&config));
    }

    #[test]
    fn test_flag_overrides() {
        let cli = parse(&[
            "--db",
            "/tmp/records.db",
            "--execution-provider",
            "tract:cpu",
            "--resample",
            "nearest",
            "--threads",
            "4",
            "process",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.database_path, Path::new("/tmp/records.db"));
        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.resample, ResampleMethod::Nearest);
        assert_eq!(config.intra_threads, 4);
        assert_eq!(config.inter_threads, 4);
    }

    #[test]
    fn test_invalid_provider_and_resample() {
        let cli = parse(&["--execution-provider", "invalid:provider", "list"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let cli = parse(&["--resample", "bicubic", "list"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_model_folder_and_repo() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_string_lossy().into_owned();
        let config = CliConfigBuilder::from_cli(&parse(&["--model", &folder, "list"])).unwrap();
        assert_eq!(config.model_dir, dir.path());
        assert!(!CliConfigBuilder::uses_managed_model(&config));

        let config = CliConfigBuilder::from_cli(&parse(&["--model", "someone/matting", "list"])).unwrap();
        assert_eq!(config.model_repo, "someone/matting");
        assert!(config.model_dir.ends_with("someone--matting"));
        assert!(CliConfigBuilder::uses_managed_model(&config));
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bgblast.json");
        std::fs::write(&path, r#"{ "resample": "nearest", "output_suffix": "-cut" }"#).unwrap();

        let cli = parse(&["--config", path.to_str().unwrap(), "--resample", "bilinear", "list"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.output_suffix, "-cut");
        assert_eq!(config.resample, ResampleMethod::Bilinear);
    }
}
