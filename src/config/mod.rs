mod schema;

pub use schema::{Config, DataConfig, FetchConfig, ENV_BEA_KEY_VAR, ENV_FBI_KEY_VAR};

use anyhow::{Context, Result};
use atomic_write_file::AtomicWriteFile;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::loaders::census::RAW_FILES;
use crate::loaders::reference::SUPPORTED_YEARS;

/// Get the config directory path (~/.config/public-good-index/)
pub fn get_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("public-good-index"))
}

/// Get the default config file path (~/.config/public-good-index/config.yaml)
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.yaml"))
}

/// Load configuration from a YAML file
///
/// # Arguments
///
/// * `path` - Optional path to config file. If None, uses the default path,
///   and a missing default file yields the built-in defaults.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given config file does not exist
/// - The config file cannot be read
/// - The YAML cannot be parsed
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let explicit = path.is_some();
    let config_path = match path {
        Some(p) => p,
        None => get_config_path()?,
    };

    if !config_path.exists() {
        if explicit {
            anyhow::bail!("Config file not found at {}", config_path.display());
        }
        tracing::debug!(path = %config_path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }

    let config_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;

    let config: Config = serde_saphyr::from_str(&config_content).with_context(|| {
        format!(
            "Failed to parse config: invalid YAML in {}",
            config_path.display()
        )
    })?;

    Ok(config)
}

/// Validate the whole configuration, collecting every error.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if !SUPPORTED_YEARS.contains(&config.data.reference_year) {
        errors.push(format!(
            "data.reference_year: no bundled reference tables for {} (available: {:?})",
            config.data.reference_year, SUPPORTED_YEARS
        ));
    }

    for (file, url) in &config.data.sources {
        if !RAW_FILES.contains(&file.as_str()) {
            errors.push(format!(
                "data.sources: unknown raw file '{}' (expected one of: {})",
                file,
                RAW_FILES.join(", ")
            ));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            errors.push(format!("data.sources.{}: '{}' is not an http(s) URL", file, url));
        }
    }

    match config.fetch.timeout() {
        Ok(timeout) if timeout.is_zero() => {
            errors.push("fetch.timeout: must be greater than zero".to_string());
        }
        Ok(_) => {}
        Err(e) => errors.push(format!(
            "fetch.timeout: invalid duration '{}' - {}",
            config.fetch.timeout, e
        )),
    }

    if let Err(scoring_errors) = crate::scoring::validate_scoring(&config.scoring) {
        errors.extend(scoring_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Write the default configuration to `path`.
///
/// Refuses to replace an existing file unless `force` is set.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create config directory at {}", parent.display())
        })?;
    }

    let yaml = serde_saphyr::to_string(&Config::default())
        .context("Failed to serialize default config")?;

    let mut file = AtomicWriteFile::open(path)
        .with_context(|| format!("Failed to open atomic write file at {}", path.display()))?;
    file.write_all(yaml.as_bytes())
        .context("Failed to write config")?;
    file.commit().context("Failed to save config")?;

    Ok(())
}
