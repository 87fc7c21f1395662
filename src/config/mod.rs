//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
mod shared;

use std::{num::NonZeroUsize, path::Path, str::FromStr, time::Duration};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::{AnchoredPattern, HeaderFilter, RuleSet, rules::compile_patterns};

pub use cli::{CheckArgs, CliArgs, Command, GlobalOverrides, UrlArgs};
pub use shared::{SettingChange, SharedSettings};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "prerender-gate";
const ENV_PREFIX: &str = "SSR";
const DEFAULT_BACKEND: &str = "prerender_io";
const DEFAULT_CACHE_ALIAS: &str = "default";
const DEFAULT_CACHE_PREFIX: &str = "prerender-gate";
const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 14 * 24 * 60 * 60;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
const DEFAULT_PRERENDER_TIMEOUT_SECS: u64 = 30;

const DEFAULT_IGNORE_EXTENSIONS: [&str; 10] = [
    ".js", ".css", ".jpg", ".jpeg", ".svg", ".gif", ".png", ".txt", ".xml", ".ico",
];
const DEFAULT_IGNORE_PATH: [&str; 2] = ["/media/", "/static/"];
const DEFAULT_IGNORE_URLS: [&str; 1] = [r"(?i)https?://example\.com/"];
const DEFAULT_REMOVE_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "content-encoding",
];
// Google crawlers: https://support.google.com/webmasters/answer/1061943
const DEFAULT_USER_AGENTS: [&str; 3] = [
    "(?i).*Googlebot",
    "(?i).*Mediapartners-Google",
    "(?i).*AdsBot-Google",
];

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct SsrSettings {
    pub debug: bool,
    pub enabled: bool,
    pub backend: String,
    pub strip_query_params: bool,
    pub cache: CacheSettings,
    pub rules: RuleSettings,
    pub prerender: PrerenderSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub alias: String,
    pub prefix: String,
    pub timeout: Duration,
    pub max_entries: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct RuleSettings {
    pub ignore_extensions: Vec<String>,
    pub ignore_path: Vec<AnchoredPattern>,
    pub ignore_urls: Vec<AnchoredPattern>,
    pub remove_headers: HeaderFilter,
    pub user_agents: Vec<AnchoredPattern>,
}

#[derive(Debug, Clone)]
pub struct PrerenderSettings {
    /// Render endpoint of a self-hosted prerender service.
    pub hosted_url: String,
    /// Recache endpoint of a self-hosted prerender service.
    pub hosted_update_url: String,
    /// prerender.io account token.
    pub token: String,
    /// Timeout for each outbound render or recache call.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

impl SsrSettings {
    /// Settings with every value at its built-in default.
    pub fn defaults() -> Result<Self, LoadError> {
        Self::from_raw(RawSettings::default())
    }

    /// Parse settings from a TOML document, without files, environment or CLI.
    pub fn from_toml_str(document: &str) -> Result<Self, LoadError> {
        Self::from_raw(raw_from_toml_str(document)?)
    }

    /// Rules to evaluate against incoming requests.
    pub fn rule_set(&self) -> RuleSet {
        RuleSet {
            enabled: self.enabled,
            ignore_urls: self.rules.ignore_urls.clone(),
            ignore_path: self.rules.ignore_path.clone(),
            ignore_extensions: self.rules.ignore_extensions.clone(),
            user_agents: self.rules.user_agents.clone(),
        }
    }

    pub(crate) fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            debug,
            enabled,
            backend,
            strip_query_params,
            cache,
            rules,
            prerender,
            logging,
        } = raw;

        let debug = debug.unwrap_or(false);
        let enabled = enabled.unwrap_or(!debug);
        let backend = build_backend_name(backend)?;

        Ok(Self {
            debug,
            enabled,
            backend,
            strip_query_params: strip_query_params.unwrap_or(false),
            cache: build_cache_settings(cache)?,
            rules: build_rule_settings(rules)?,
            prerender: build_prerender_settings(prerender)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<SsrSettings, LoadError> {
    SsrSettings::from_raw(load_raw(cli)?)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, SsrSettings), LoadError> {
    use clap::Parser;

    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

pub(crate) fn load_raw(cli: &CliArgs) -> Result<RawSettings, LoadError> {
    let mut raw = load_sources(cli.config_file.as_deref())?;
    raw.apply_overrides(&cli.overrides);
    Ok(raw)
}

fn load_sources(config_file: Option<&Path>) -> Result<RawSettings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

pub(crate) fn raw_from_toml_str(document: &str) -> Result<RawSettings, LoadError> {
    Ok(Config::builder()
        .add_source(File::from_str(document, FileFormat::Toml))
        .build()?
        .try_deserialize()?)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawSettings {
    pub(crate) debug: Option<bool>,
    pub(crate) enabled: Option<bool>,
    pub(crate) backend: Option<String>,
    pub(crate) strip_query_params: Option<bool>,
    pub(crate) cache: RawCacheSettings,
    pub(crate) rules: RawRuleSettings,
    pub(crate) prerender: RawPrerenderSettings,
    pub(crate) logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(backend) = overrides.backend.as_ref() {
            self.backend = Some(backend.clone());
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawCacheSettings {
    pub(crate) enabled: Option<bool>,
    pub(crate) alias: Option<String>,
    pub(crate) prefix: Option<String>,
    pub(crate) timeout_seconds: Option<u64>,
    pub(crate) max_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawRuleSettings {
    pub(crate) ignore_extensions: Option<Vec<String>>,
    pub(crate) ignore_path: Option<Vec<String>>,
    pub(crate) ignore_urls: Option<Vec<String>>,
    pub(crate) remove_headers: Option<Vec<String>>,
    pub(crate) user_agents: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawPrerenderSettings {
    pub(crate) hosted_url: Option<String>,
    pub(crate) hosted_update_url: Option<String>,
    pub(crate) token: Option<String>,
    pub(crate) timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawLoggingSettings {
    pub(crate) level: Option<String>,
    pub(crate) json: Option<bool>,
}

fn build_backend_name(backend: Option<String>) -> Result<String, LoadError> {
    let name = backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string());
    let name = name.trim();
    if name.is_empty() {
        return Err(LoadError::invalid("backend", "must not be empty"));
    }
    Ok(name.to_string())
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let alias = cache
        .alias
        .unwrap_or_else(|| DEFAULT_CACHE_ALIAS.to_string());
    if alias.trim().is_empty() {
        return Err(LoadError::invalid("cache.alias", "must not be empty"));
    }

    let prefix = cache
        .prefix
        .unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string());

    let timeout_secs = cache.timeout_seconds.unwrap_or(DEFAULT_CACHE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "cache.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_entries = NonZeroUsize::new(cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES))
        .ok_or_else(|| LoadError::invalid("cache.max_entries", "must be greater than zero"))?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        alias,
        prefix,
        timeout: Duration::from_secs(timeout_secs),
        max_entries,
    })
}

fn build_rule_settings(rules: RawRuleSettings) -> Result<RuleSettings, LoadError> {
    let ignore_extensions = rules
        .ignore_extensions
        .unwrap_or_else(|| owned(&DEFAULT_IGNORE_EXTENSIONS));
    if ignore_extensions.iter().any(|ext| ext.is_empty()) {
        return Err(LoadError::invalid(
            "rules.ignore_extensions",
            "extensions must not be empty strings",
        ));
    }

    let ignore_path = patterns(rules.ignore_path, &DEFAULT_IGNORE_PATH, "rules.ignore_path")?;
    let ignore_urls = patterns(rules.ignore_urls, &DEFAULT_IGNORE_URLS, "rules.ignore_urls")?;
    let user_agents = patterns(rules.user_agents, &DEFAULT_USER_AGENTS, "rules.user_agents")?;

    let remove_headers = HeaderFilter::new(
        rules
            .remove_headers
            .unwrap_or_else(|| owned(&DEFAULT_REMOVE_HEADERS)),
    );

    Ok(RuleSettings {
        ignore_extensions,
        ignore_path,
        ignore_urls,
        remove_headers,
        user_agents,
    })
}

fn build_prerender_settings(
    prerender: RawPrerenderSettings,
) -> Result<PrerenderSettings, LoadError> {
    let timeout_secs = prerender
        .timeout_seconds
        .unwrap_or(DEFAULT_PRERENDER_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "prerender.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(PrerenderSettings {
        hosted_url: trimmed(prerender.hosted_url),
        hosted_update_url: trimmed(prerender.hosted_update_url),
        token: trimmed(prerender.token),
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn patterns(
    configured: Option<Vec<String>>,
    defaults: &[&str],
    key: &'static str,
) -> Result<Vec<AnchoredPattern>, LoadError> {
    let sources = configured.unwrap_or_else(|| owned(defaults));
    compile_patterns(&sources).map_err(|reason| LoadError::invalid(key, reason))
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}
