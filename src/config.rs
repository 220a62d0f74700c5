use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vloop::batch::BatchConfig;
use vloop::cache::CacheConfig;
use vloop::llm::AnthropicConfig;
use vloop::runner::LoopConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub validation: ValidationConfig,
    pub concurrency: ConcurrencyConfig,
    pub cache: CacheSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub endpoint: String,
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let anthropic = AnthropicConfig::default();
        Self {
            model: anthropic.model,
            max_tokens: anthropic.max_tokens,
            timeout_ms: anthropic.timeout.as_millis() as u64,
            endpoint: anthropic.endpoint,
            api_key_env: anthropic.api_key_env,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_retries: u32,
    pub attempt_timeout_ms: Option<u64>,
    pub include_warnings: bool,
    pub extract_code_blocks: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout_ms: None,
            include_warnings: false,
            extract_code_blocks: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub limit: usize,
    pub batch_timeout_ms: Option<u64>,
    pub abort_on_fatal: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            limit: 4,
            batch_timeout_ms: None,
            abort_on_fatal: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_memory_bytes: usize,
    pub ttl_seconds: f64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            enabled: true,
            max_entries: cache.max_entries,
            max_memory_bytes: cache.max_memory_bytes,
            ttl_seconds: cache.ttl_seconds,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            validation: ValidationConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            cache: CacheSection::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn anthropic(&self) -> AnthropicConfig {
        AnthropicConfig {
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            timeout: Duration::from_millis(self.llm.timeout_ms),
            endpoint: self.llm.endpoint.clone(),
            api_key_env: self.llm.api_key_env.clone(),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        let mut config = LoopConfig::default()
            .with_max_retries(self.validation.max_retries)
            .with_warnings(self.validation.include_warnings)
            .with_code_block_extraction(self.validation.extract_code_blocks);
        if let Some(ms) = self.validation.attempt_timeout_ms {
            config = config.with_attempt_timeout(Duration::from_millis(ms));
        }
        config
    }

    pub fn batch_config(&self) -> BatchConfig {
        let mut config = BatchConfig::default()
            .with_concurrency_limit(self.concurrency.limit)
            .with_abort_on_fatal(self.concurrency.abort_on_fatal);
        if let Some(ms) = self.concurrency.batch_timeout_ms {
            config = config.with_batch_timeout(Duration::from_millis(ms));
        }
        config
    }

    /// Cache settings, or None when the cache is disabled
    pub fn cache_config(&self) -> Option<CacheConfig> {
        self.cache.enabled.then(|| CacheConfig {
            max_entries: self.cache.max_entries,
            max_memory_bytes: self.cache.max_memory_bytes,
            ttl_seconds: self.cache.ttl_seconds,
        })
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache.sweep_interval_secs > 0).then(|| Duration::from_secs(self.cache.sweep_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.validation.max_retries, 3);
        assert_eq!(config.concurrency.limit, 4);
        assert_eq!(config.cache.max_entries, 1000);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "validation:\n  max_retries: 5\nconcurrency:\n  limit: 8\n  batch_timeout_ms: 2000\ncache:\n  enabled: false"
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.validation.max_retries, 5);
        assert_eq!(config.concurrency.limit, 8);
        assert!(config.cache_config().is_none());
        assert_eq!(config.batch_config().batch_timeout, Some(Duration::from_secs(2)));
        // Unset sections keep their defaults
        assert_eq!(config.llm.max_tokens, LlmConfig::default().max_tokens);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = PathBuf::from("/nonexistent/vloop.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_loop_config_mapping() {
        let mut config = Config::default();
        config.validation.attempt_timeout_ms = Some(1500);
        config.validation.extract_code_blocks = true;
        let loop_config = config.loop_config();
        assert_eq!(loop_config.per_attempt_timeout, Some(Duration::from_millis(1500)));
        assert!(loop_config.extract_code_blocks);
    }

    #[test]
    fn test_cache_config_mapping() {
        let mut config = Config::default();
        config.cache.ttl_seconds = 0.0;
        let cache = config.cache_config().unwrap();
        assert!(cache.ttl().is_none());
    }
}
