use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::scoring::ScoringConfig;

/// Environment variable overriding `fetch.bea_api_key`
pub const ENV_BEA_KEY_VAR: &str = "PGI_BEA_API_KEY";
/// Environment variable overriding `fetch.fbi_api_key`
pub const ENV_FBI_KEY_VAR: &str = "PGI_FBI_API_KEY";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Where raw inputs are read from and stage outputs are written to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,

    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,

    /// Version of the bundled reference tables to use
    #[serde(default = "default_reference_year")]
    pub reference_year: u16,

    /// Raw file name -> URL fetched by `download`, e.g.
    /// `state_finances.csv: https://example.org/asfin_2023.csv`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, String>,
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_reference_year() -> u16 {
    2023
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            processed_dir: default_processed_dir(),
            reference_year: default_reference_year(),
            sources: BTreeMap::new(),
        }
    }
}

/// Network feed settings. Fetches never retry; a failed feed degrades to the
/// next source.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-request timeout, e.g. "30s", "2m"
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Keep fetched feed bodies in the on-disk cache
    #[serde(default = "default_true")]
    pub cache: bool,

    #[serde(default)]
    pub bea_api_key: Option<String>,

    #[serde(default)]
    pub fbi_api_key: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> String {
    "30s".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: default_timeout(),
            cache: true,
            bea_api_key: None,
            fbi_api_key: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> anyhow::Result<Duration> {
        Ok(humantime::parse_duration(self.timeout.trim())?)
    }

    /// BEA key from the environment, else from the config file.
    pub fn bea_key(&self) -> Option<String> {
        key_from_env(ENV_BEA_KEY_VAR).or_else(|| non_empty(self.bea_api_key.as_deref()))
    }

    /// FBI Crime Data Explorer key from the environment, else from the config file.
    pub fn fbi_key(&self) -> Option<String> {
        key_from_env(ENV_FBI_KEY_VAR).or_else(|| non_empty(self.fbi_api_key.as_deref()))
    }
}

fn key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().and_then(|v| non_empty(Some(&v)))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_saphyr::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.data.raw_dir, PathBuf::from("data/raw"));
        assert_eq!(config.data.reference_year, 2023);
        assert!(config.data.sources.is_empty());
        assert!(config.fetch.enabled);
    }

    #[test]
    fn test_sources_parse() {
        let yaml = r#"
data:
  sources:
    state_finances.csv: https://example.org/asfin.csv
"#;
        let config: Config = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(
            config.data.sources["state_finances.csv"],
            "https://example.org/asfin.csv"
        );
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
data:
  raw_dir: /tmp/raw
  processed_dir: /tmp/out
fetch:
  enabled: false
  timeout: 5s
  cache: false
  bea_api_key: " abc "
scoring:
  scale:
    z_range: 2
"#;
        let config: Config = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.data.raw_dir, PathBuf::from("/tmp/raw"));
        assert_eq!(config.data.reference_year, 2023);
        assert!(!config.fetch.enabled);
        assert!(!config.fetch.cache);
        assert_eq!(config.fetch.timeout().unwrap(), Duration::from_secs(5));
        assert_eq!(config.scoring.scale.z_range, 2.0);
        assert_eq!(non_empty(config.fetch.bea_api_key.as_deref()), Some("abc".to_string()));
    }

    #[test]
    fn test_invalid_timeout() {
        let fetch = FetchConfig {
            timeout: "soon".to_string(),
            ..FetchConfig::default()
        };
        assert!(fetch.timeout().is_err());
    }

    #[test]
    fn test_blank_key_is_none() {
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = Config::default();
        let yaml = serde_saphyr::to_string(&config).unwrap();
        let parsed: Config = serde_saphyr::from_str(&yaml).unwrap();
        assert_eq!(config, parsed);
    }
}
