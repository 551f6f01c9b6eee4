use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub model_name: Option<String>,
    pub strict_threshold: Option<f64>,
    pub lenient_threshold: Option<f64>,

    pub scoring: Option<ScoringConfig>,
    pub providers: Option<ProvidersConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_weight: Option<f64>,
    pub strict_weight: Option<f64>,
    pub source_weight: Option<f64>,
    pub year_weight: Option<f64>,
    pub year_tolerance: Option<i64>,
    pub source_cap: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    pub timeout_secs: Option<u64>,
    pub invocations_per_provider: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub limit: Option<usize>,
    /// Provider label to shell command.
    pub commands: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_full_file() {
        let config = FileConfig::parse(
            r#"
db_path = "/var/lib/tunr/tunr.db"
model_name = "bge-small-en-v1.5"
strict_threshold = 0.5

[scoring]
base_weight = 0.7
year_tolerance = 5

[providers]
timeout_secs = 30
max_concurrency = 4

[providers.commands]
claude = "claude -p --output-format json"
local = "./bin/search.sh"
"#,
        )
        .unwrap();

        assert_eq!(config.db_path.as_deref(), Some("/var/lib/tunr/tunr.db"));
        assert_eq!(config.model_name.as_deref(), Some("bge-small-en-v1.5"));
        assert_eq!(config.strict_threshold, Some(0.5));
        assert!(config.lenient_threshold.is_none());

        let scoring = config.scoring.unwrap();
        assert_eq!(scoring.base_weight, Some(0.7));
        assert_eq!(scoring.year_tolerance, Some(5));
        assert!(scoring.source_cap.is_none());

        let providers = config.providers.unwrap();
        assert_eq!(providers.timeout_secs, Some(30));
        assert_eq!(providers.max_concurrency, Some(4));
        assert_eq!(providers.commands.len(), 2);
        assert_eq!(providers.commands["local"], "./bin/search.sh");
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = FileConfig::parse("").unwrap();
        assert!(config.db_path.is_none());
        assert!(config.scoring.is_none());
        assert!(config.providers.is_none());
    }

    #[test]
    fn load_reports_path_on_bad_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tunr.toml");
        std::fs::write(&path, "strict_threshold = \"high\"").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));

        let missing = FileConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }
}
