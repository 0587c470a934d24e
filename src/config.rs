use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Upstream API-Football connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the API-Football v3 service
    pub base_url: String,
    /// API key (usually supplied via LUCIDE_API_KEY)
    pub key: String,
    /// Per-call HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v3.football.api-sports.io".to_string(),
            key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-call retry settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Upstream attempts per call (default: 3)
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds; attempt N waits
    /// N times this (default: 1000)
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, retry_delay_ms: 1000 }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens (default: 5)
    pub failure_threshold: u32,
    /// Cool-down before a recovery probe in seconds (default: 60)
    pub timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, timeout_secs: 60 }
    }
}

impl BreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Whole-plan execution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on one plan's execution in seconds (default: 30)
    pub plan_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { plan_timeout_secs: 30 }
    }
}

impl PipelineConfig {
    pub fn plan_timeout(&self) -> Duration {
        Duration::from_secs(self.plan_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

/// Command line arguments for the lucide binary
#[derive(Parser, Debug, Clone)]
#[command(name = "lucide")]
#[command(version, about = "Lucide - Autonomous football-analytics request pipeline")]
pub struct CommandLineArgs {
    /// The question to answer
    pub question: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// API key (overrides config file)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// API base URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub api_base_url: Option<String>,

    /// Logging level (overrides config file, e.g. "info,lucide=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Upstream attempts per call (overrides config file)
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Whole-plan timeout in seconds (overrides config file)
    #[arg(long, value_name = "SECS")]
    pub plan_timeout_secs: Option<u64>,

    /// Pinned league context, e.g. "Ligue 1"
    #[arg(long, value_name = "LEAGUE")]
    pub league: Option<String>,

    /// Pinned team context
    #[arg(long, value_name = "TEAM")]
    pub team: Option<String>,

    /// Pinned player context
    #[arg(long, value_name = "PLAYER")]
    pub player: Option<String>,

    /// Pinned fixture id
    #[arg(long, value_name = "ID")]
    pub fixture_id: Option<i64>,

    /// Pinned season, e.g. 2026
    #[arg(long, value_name = "YEAR")]
    pub season: Option<i32>,

    /// Language override ("fr" or "en")
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Print the metrics exposition after the answer
    #[arg(long)]
    pub show_metrics: bool,
}

impl Config {
    /// Load configuration with command line, environment variable, and
    /// file support.
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with LUCIDE_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::debug!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {path}: {e}"))?;
        let config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {path}: {e}"))?;
        Ok(config)
    }

    fn find_config_file() -> Option<String> {
        for candidate in ["config.toml", "conf/config.toml"] {
            if Path::new(candidate).exists() {
                return Some(candidate.to_string());
            }
        }
        None
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("LUCIDE_API_KEY") {
            self.api.key = key;
        }
        if let Ok(url) = std::env::var("LUCIDE_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(level) = std::env::var("LUCIDE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(value) = std::env::var("LUCIDE_MAX_RETRIES")
            && let Ok(parsed) = value.parse()
        {
            self.retry.max_retries = parsed;
        }
        if let Ok(value) = std::env::var("LUCIDE_BREAKER_THRESHOLD")
            && let Ok(parsed) = value.parse()
        {
            self.breaker.failure_threshold = parsed;
        }
        if let Ok(value) = std::env::var("LUCIDE_PLAN_TIMEOUT_SECS")
            && let Ok(parsed) = value.parse()
        {
            self.pipeline.plan_timeout_secs = parsed;
        }
    }

    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(key) = &args.api_key {
            self.api.key = key.clone();
        }
        if let Some(url) = &args.api_base_url {
            self.api.base_url = url.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(max_retries) = args.max_retries {
            self.retry.max_retries = max_retries;
        }
        if let Some(secs) = args.plan_timeout_secs {
            self.pipeline.plan_timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        if self.retry.max_retries == 0 {
            anyhow::bail!("retry.max_retries must be at least 1");
        }
        if self.breaker.failure_threshold == 0 {
            anyhow::bail!("breaker.failure_threshold must be at least 1");
        }
        if self.pipeline.plan_timeout_secs == 0 {
            anyhow::bail!("pipeline.plan_timeout_secs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.pipeline.plan_timeout_secs, 30);
    }

    #[test]
    fn test_toml_sections_partial() {
        let parsed: Config = toml::from_str(
            r#"
            [retry]
            max_retries = 5

            [breaker]
            failure_threshold = 2
            timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(parsed.retry.max_retries, 5);
        assert_eq!(parsed.retry.retry_delay_ms, 1000);
        assert_eq!(parsed.breaker.failure_threshold, 2);
        assert_eq!(parsed.api.timeout_secs, 10);
    }

    #[test]
    fn test_validation_rejects_zeroes() {
        let mut config = Config::default();
        config.breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.api.base_url = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
