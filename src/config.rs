use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream origins
    pub api_base: String,
    pub media_base: String,
    /// Key into the boards file naming the origin to archive. There is
    /// exactly one content origin per run; other keys in the file are
    /// ignored.
    pub origin_key: String,

    // Local storage
    pub data_dir: PathBuf,
    pub boards_file: PathBuf,
    pub selection_file: PathBuf,
    pub journal_file: PathBuf,

    // Worker pool
    pub thread_concurrency: usize,
    pub download_concurrency: usize,

    // Attachment retry policy
    pub max_retries: u32,
    pub attempt_timeout_base: Duration,
    pub attempt_timeout_step: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable has a default; an unconfigured run archives from the
    /// public origin into `./archive`.
    ///
    /// # Errors
    ///
    /// Returns an error if a set variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(env_or_default("DATA_DIR", "./archive"));
        Ok(Self {
            api_base: env_or_default("API_BASE_URL", "https://a.4cdn.org"),
            media_base: env_or_default("MEDIA_BASE_URL", "https://i.4cdn.org"),
            origin_key: env_or_default("ORIGIN_KEY", "4chan"),

            boards_file: env_path_or("BOARDS_FILE", &data_dir, "boards.json"),
            selection_file: env_path_or("SELECTION_FILE", &data_dir, "selection.json"),
            journal_file: env_path_or("JOURNAL_FILE", &data_dir, "journal.jsonl"),
            data_dir,

            thread_concurrency: parse_env_usize("THREAD_CONCURRENCY", 4)?,
            download_concurrency: parse_env_usize("DOWNLOAD_CONCURRENCY", 4)?,

            max_retries: parse_env_u32("MAX_RETRIES", 5)?,
            attempt_timeout_base: Duration::from_secs(parse_env_u64(
                "ATTEMPT_TIMEOUT_BASE_SECS",
                5,
            )?),
            attempt_timeout_step: Duration::from_secs(parse_env_u64(
                "ATTEMPT_TIMEOUT_STEP_SECS",
                3,
            )?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "THREAD_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.download_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DOWNLOAD_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_RETRIES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.origin_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ORIGIN_KEY".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        for (name, value) in [
            ("API_BASE_URL", &self.api_base),
            ("MEDIA_BASE_URL", &self.media_base),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidValue {
                    name: (*name).to_string(),
                    message: format!("not a valid URL: '{value}'"),
                });
            }
        }
        Ok(())
    }

    /// A configuration for tests: short timeouts, local paths.
    ///
    /// Tests override the fields they care about with struct update syntax.
    #[must_use]
    pub fn for_testing() -> Self {
        let data_dir = PathBuf::from("./test-archive");
        Self {
            api_base: "http://127.0.0.1:9".to_string(),
            media_base: "http://127.0.0.1:9".to_string(),
            origin_key: "4chan".to_string(),
            boards_file: data_dir.join("boards.json"),
            selection_file: data_dir.join("selection.json"),
            journal_file: data_dir.join("journal.jsonl"),
            data_dir,
            thread_concurrency: 2,
            download_concurrency: 2,
            max_retries: 5,
            attempt_timeout_base: Duration::from_millis(500),
            attempt_timeout_step: Duration::from_millis(250),
        }
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_path_or(name: &str, base: &std::path::Path, child: &str) -> PathBuf {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .map_or_else(|| base.join(child), PathBuf::from)
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testing_config_validates() {
        Config::for_testing().validate().unwrap();
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = Config {
            thread_concurrency: 0,
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_origin_rejected() {
        let config = Config {
            api_base: "not a url".to_string(),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }
}
