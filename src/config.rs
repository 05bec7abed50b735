use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::aggregator::FallbackPolicy;
use crate::domain::SourceKind;
use crate::error::MinerError;
use crate::eutils::{Contact, DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE, RetryPolicy};
use crate::limiter::DEFAULT_REQUESTS_PER_SECOND;

pub const DEFAULT_CONFIG_FILE: &str = "st-miner.json";
pub const DEFAULT_QUERY: &str = r#"(("spatial transcriptomics"[All Fields] OR "Visium"[All Fields] OR "Slide-seq"[All Fields]) AND "gse"[Filter])"#;
pub const DEFAULT_MAX_RESULTS: usize = 1000;
/// NCBI lifts the anonymous 3 req/s ceiling to 10 req/s for keyed clients.
pub const KEYED_REQUESTS_PER_SECOND: usize = 10;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub sources: Option<Vec<SourceKind>>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub requests_per_second: Option<usize>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
    #[serde(default)]
    pub offline: Option<bool>,
    #[serde(default)]
    pub curated_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub empty_result_triggers_fallback: Option<bool>,
}

/// Command-line values; each one set here beats the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sources: Option<Vec<SourceKind>>,
    pub query: Option<String>,
    pub max_results: Option<usize>,
    pub email: Option<String>,
    pub offline: bool,
    pub no_empty_fallback: bool,
    pub curated_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub sources: Vec<SourceKind>,
    pub query: String,
    pub max_results: usize,
    pub contact: Contact,
    pub batch_size: usize,
    pub page_size: usize,
    pub requests_per_second: usize,
    pub retry: RetryPolicy,
    pub fallback: FallbackPolicy,
    pub offline: bool,
    pub curated_dir: Option<Utf8PathBuf>,
}

impl ResolvedConfig {
    pub fn live_enabled(&self) -> bool {
        !self.offline && self.sources.iter().any(SourceKind::is_live_capable)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `st-miner.json` when present, then applies the
    /// `NCBI_API_KEY` / `NCBI_EMAIL` environment and the overrides.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, MinerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let mut config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| MinerError::ConfigRead(config_path.clone()))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|err| MinerError::ConfigParse(err.to_string()))?
        };

        if config.api_key.is_none() {
            config.api_key = env_value("NCBI_API_KEY");
        }
        if config.email.is_none() {
            config.email = env_value("NCBI_EMAIL");
        }

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, MinerError> {
        let mut sources = Vec::new();
        for source in overrides
            .sources
            .or(config.sources)
            .unwrap_or_else(|| SourceKind::ALL.to_vec())
        {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }

        let query = overrides
            .query
            .or(config.query)
            .unwrap_or_else(|| DEFAULT_QUERY.to_string())
            .trim()
            .to_string();
        let max_results = overrides
            .max_results
            .or(config.max_results)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let contact = Contact {
            email: non_blank(overrides.email.or(config.email)),
            api_key: non_blank(config.api_key),
        };
        let default_rate = if contact.api_key.is_some() {
            KEYED_REQUESTS_PER_SECOND
        } else {
            DEFAULT_REQUESTS_PER_SECOND
        };
        let requests_per_second = config.requests_per_second.unwrap_or(default_rate);

        let retry_config = config.retry.unwrap_or_default();
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: retry_config.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: retry_config
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
        };

        let empty_triggers = config
            .fallback
            .and_then(|fallback| fallback.empty_result_triggers_fallback)
            .unwrap_or(true);
        let fallback = FallbackPolicy {
            empty_result_triggers_fallback: empty_triggers && !overrides.no_empty_fallback,
        };

        let resolved = ResolvedConfig {
            sources,
            query,
            max_results,
            contact,
            batch_size: config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            page_size: config.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            requests_per_second,
            retry,
            fallback,
            offline: overrides.offline || config.offline.unwrap_or(false),
            curated_dir: overrides
                .curated_dir
                .or(config.curated_dir)
                .map(Utf8PathBuf::from),
        };
        validate(&resolved)?;
        Ok(resolved)
    }
}

fn validate(config: &ResolvedConfig) -> Result<(), MinerError> {
    if config.sources.is_empty() {
        return Err(MinerError::Configuration("no sources enabled".to_string()));
    }
    if config.live_enabled() && config.query.is_empty() {
        return Err(MinerError::Configuration(
            "query must not be empty while the live source is enabled".to_string(),
        ));
    }
    let positive = [
        ("max_results", config.max_results),
        ("batch_size", config.batch_size),
        ("page_size", config.page_size),
        ("requests_per_second", config.requests_per_second),
        ("retry.max_attempts", config.retry.max_attempts as usize),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(MinerError::Configuration(format!("{name} must be positive")));
        }
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_value(name: &str) -> Option<String> {
    non_blank(std::env::var(name).ok())
}
