mod file_config;

pub use file_config::{FileConfig, ProvidersConfig, ScoringConfig};

use crate::embedding::DEFAULT_MODEL_NAME;
use crate::providers::{detect_search_commands, CommandRunnerSettings};
use crate::search::{ExtractionThresholds, PipelineSettings, ScoreConfig};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DB_PATH_ENV: &str = "TUNR_DB_PATH";
pub const DEFAULT_DB_PATH: &str = "./data/tunr.db";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub model_name: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub model_name: String,
    pub thresholds: ExtractionThresholds,
    pub scoring: ScoreConfig,
    pub providers: ProviderSettings,
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub timeout_secs: u64,
    pub invocations_per_provider: usize,
    pub max_concurrency: usize,
    pub limit: Option<usize>,
    /// `(label, command)` pairs, in label order when they come from the file.
    pub commands: Vec<(String, String)>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            invocations_per_provider: 1,
            max_concurrency: 2,
            limit: None,
            commands: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        Self::resolve_with_env(cli, file_config, |key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::resolve`] with an explicit environment lookup.
    pub fn resolve_with_env<F>(
        cli: &CliConfig,
        file_config: Option<FileConfig>,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .or_else(|| env(DB_PATH_ENV).filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        if db_path.is_dir() {
            bail!("db_path points to a directory: {:?}", db_path);
        }

        let model_name = file
            .model_name
            .or_else(|| cli.model_name.clone())
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

        let default_thresholds = ExtractionThresholds::default();
        let thresholds = ExtractionThresholds {
            strict_threshold: file
                .strict_threshold
                .unwrap_or(default_thresholds.strict_threshold),
            lenient_threshold: file
                .lenient_threshold
                .unwrap_or(default_thresholds.lenient_threshold),
        };
        validate_unit("strict_threshold", thresholds.strict_threshold)?;
        validate_unit("lenient_threshold", thresholds.lenient_threshold)?;

        let scoring_file = file.scoring.unwrap_or_default();
        let defaults = ScoreConfig::default();
        let scoring = ScoreConfig {
            base_weight: scoring_file.base_weight.unwrap_or(defaults.base_weight),
            strict_weight: scoring_file.strict_weight.unwrap_or(defaults.strict_weight),
            source_weight: scoring_file.source_weight.unwrap_or(defaults.source_weight),
            year_weight: scoring_file.year_weight.unwrap_or(defaults.year_weight),
            year_tolerance: scoring_file
                .year_tolerance
                .unwrap_or(defaults.year_tolerance),
            source_cap: scoring_file.source_cap.unwrap_or(defaults.source_cap),
            year_target: None,
        };
        if scoring.year_tolerance < 1 {
            bail!(
                "scoring.year_tolerance must be at least 1, got {}",
                scoring.year_tolerance
            );
        }
        if scoring.source_cap < 1 {
            bail!("scoring.source_cap must be at least 1");
        }
        for (name, weight) in [
            ("base_weight", scoring.base_weight),
            ("strict_weight", scoring.strict_weight),
            ("source_weight", scoring.source_weight),
            ("year_weight", scoring.year_weight),
        ] {
            if !weight.is_finite() {
                bail!("scoring.{} must be a finite number", name);
            }
        }

        // Provider settings - merge file config with defaults
        let providers_file = file.providers.unwrap_or_default();
        let provider_defaults = ProviderSettings::default();
        let mut commands: Vec<(String, String)> = providers_file
            .commands
            .into_iter()
            .filter(|(_, command)| !command.trim().is_empty())
            .collect();
        if commands.is_empty() {
            commands = detect_search_commands(&env);
        }
        let providers = ProviderSettings {
            timeout_secs: providers_file
                .timeout_secs
                .unwrap_or(provider_defaults.timeout_secs),
            invocations_per_provider: providers_file
                .invocations_per_provider
                .unwrap_or(provider_defaults.invocations_per_provider),
            max_concurrency: providers_file
                .max_concurrency
                .unwrap_or(provider_defaults.max_concurrency),
            limit: providers_file.limit.or(cli.limit),
            commands,
        };
        if providers.max_concurrency < 1 {
            bail!("providers.max_concurrency must be at least 1");
        }
        if providers.invocations_per_provider < 1 {
            bail!("providers.invocations_per_provider must be at least 1");
        }
        if providers.timeout_secs == 0 {
            bail!("providers.timeout_secs must be at least 1");
        }
        if providers.limit == Some(0) {
            bail!("providers.limit must be at least 1");
        }

        Ok(Self {
            db_path,
            model_name,
            thresholds,
            scoring,
            providers,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            thresholds: self.thresholds,
            score_config: self.scoring.clone(),
        }
    }

    pub fn runner_settings(&self) -> CommandRunnerSettings {
        CommandRunnerSettings {
            timeout: Duration::from_secs(self.providers.timeout_secs),
            invocations_per_provider: self.providers.invocations_per_provider,
            max_concurrency: self.providers.max_concurrency,
            limit: self.providers.limit,
        }
    }
}

fn validate_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{} must be between 0 and 1, got {}", name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve_with_env(&CliConfig::default(), None, no_env).unwrap();

        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.model_name, "all-MiniLM-L6-v2");
        assert_eq!(config.thresholds, ExtractionThresholds::default());
        assert_eq!(config.scoring, ScoreConfig::default());
        assert_eq!(config.providers.timeout_secs, 120);
        assert_eq!(config.providers.max_concurrency, 2);
        assert!(config.providers.commands.is_empty());
    }

    #[test]
    fn test_resolve_cli_only() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/tmp/cli.db")),
            model_name: Some("bge-small-en-v1.5".to_string()),
            limit: Some(7),
        };

        let config = AppConfig::resolve_with_env(&cli, None, no_env).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/cli.db"));
        assert_eq!(config.model_name, "bge-small-en-v1.5");
        assert_eq!(config.providers.limit, Some(7));
        assert_eq!(config.runner_settings().limit, Some(7));
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/should/be/overridden.db")),
            model_name: Some("cli-model".to_string()),
            limit: Some(3),
        };
        let file_config = FileConfig {
            db_path: Some("/toml/tunr.db".to_string()),
            strict_threshold: Some(0.5),
            scoring: Some(ScoringConfig {
                base_weight: Some(0.8),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve_with_env(&cli, Some(file_config), no_env).unwrap();

        // TOML values should override CLI
        assert_eq!(config.db_path, PathBuf::from("/toml/tunr.db"));
        assert_eq!(config.thresholds.strict_threshold, 0.5);
        assert_eq!(config.scoring.base_weight, 0.8);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.model_name, "cli-model");
        assert_eq!(config.providers.limit, Some(3));
        // Defaults fill the rest
        assert_eq!(config.thresholds.lenient_threshold, 0.75);
        assert_eq!(config.scoring.strict_weight, 0.4);
    }

    #[test]
    fn test_db_path_from_env() {
        let config = AppConfig::resolve_with_env(
            &CliConfig::default(),
            None,
            env(&[(DB_PATH_ENV, "/env/tunr.db")]),
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/env/tunr.db"));

        let cli = CliConfig {
            db_path: Some(PathBuf::from("/cli/tunr.db")),
            ..Default::default()
        };
        let config =
            AppConfig::resolve_with_env(&cli, None, env(&[(DB_PATH_ENV, "/env/tunr.db")]))
                .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/cli/tunr.db"));
    }

    #[test]
    fn test_db_path_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result.unwrap_err().to_string().contains("directory"));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let file_config = FileConfig {
            lenient_threshold: Some(1.5),
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&CliConfig::default(), Some(file_config), no_env);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("lenient_threshold must be between 0 and 1"));

        let file_config = FileConfig {
            strict_threshold: Some(-0.1),
            ..Default::default()
        };
        assert!(
            AppConfig::resolve_with_env(&CliConfig::default(), Some(file_config), no_env).is_err()
        );
    }

    #[test]
    fn test_scoring_validation() {
        for scoring in [
            ScoringConfig {
                year_tolerance: Some(0),
                ..Default::default()
            },
            ScoringConfig {
                source_cap: Some(0),
                ..Default::default()
            },
            ScoringConfig {
                year_weight: Some(f64::NAN),
                ..Default::default()
            },
        ] {
            let file_config = FileConfig {
                scoring: Some(scoring),
                ..Default::default()
            };
            assert!(AppConfig::resolve_with_env(
                &CliConfig::default(),
                Some(file_config),
                no_env
            )
            .is_err());
        }
    }

    #[test]
    fn test_provider_validation() {
        let file_config = FileConfig {
            providers: Some(ProvidersConfig {
                max_concurrency: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&CliConfig::default(), Some(file_config), no_env);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_concurrency must be at least 1"));
    }

    #[test]
    fn test_file_commands_take_precedence_over_env() {
        let mut commands = BTreeMap::new();
        commands.insert("zeta".to_string(), "./zeta.sh".to_string());
        commands.insert("alpha".to_string(), "./alpha.sh".to_string());
        commands.insert("blank".to_string(), "  ".to_string());
        let file_config = FileConfig {
            providers: Some(ProvidersConfig {
                commands,
                timeout_secs: Some(15),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve_with_env(
            &CliConfig::default(),
            Some(file_config),
            env(&[("ANTHROPIC_API_KEY", "k")]),
        )
        .unwrap();

        assert_eq!(
            config.providers.commands,
            vec![
                ("alpha".to_string(), "./alpha.sh".to_string()),
                ("zeta".to_string(), "./zeta.sh".to_string()),
            ]
        );
        assert_eq!(config.runner_settings().timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_commands_detected_from_env() {
        let config = AppConfig::resolve_with_env(
            &CliConfig::default(),
            None,
            env(&[("WEB_SEARCH_CODEX_CMD", "codex exec --json -")]),
        )
        .unwrap();
        assert_eq!(
            config.providers.commands,
            vec![("codex".to_string(), "codex exec --json -".to_string())]
        );
    }

    #[test]
    fn test_pipeline_settings() {
        let file_config = FileConfig {
            strict_threshold: Some(0.4),
            ..Default::default()
        };
        let config =
            AppConfig::resolve_with_env(&CliConfig::default(), Some(file_config), no_env).unwrap();
        let settings = config.pipeline_settings();
        assert_eq!(settings.thresholds.strict_threshold, 0.4);
        assert_eq!(settings.score_config, config.scoring);
    }
}
