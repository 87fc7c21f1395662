//! Process-wide settings handle with single-value live reload.

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::util::lock::{read_or_recover, write_or_recover};

use super::{CliArgs, LoadError, RawSettings, SsrSettings, load_raw, raw_from_toml_str};

const SOURCE: &str = "config::shared";
const NAME_PREFIX: &str = "ssr_";

/// Notification that one setting changed in the host environment.
///
/// `value: None` (or JSON `null`) restores the value loaded at startup.
#[derive(Debug, Clone)]
pub struct SettingChange {
    pub name: String,
    pub value: Option<Value>,
}

impl SettingChange {
    pub fn set(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn reset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Cloneable handle to the current settings.
///
/// Readers call [`SharedSettings::current`] per use and so always observe
/// the latest reload.
#[derive(Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<State>>,
}

struct State {
    baseline: RawSettings,
    raw: RawSettings,
    current: Arc<SsrSettings>,
}

impl SharedSettings {
    pub fn load(cli: &CliArgs) -> Result<Self, LoadError> {
        Self::from_raw(load_raw(cli)?)
    }

    pub fn from_toml_str(document: &str) -> Result<Self, LoadError> {
        Self::from_raw(raw_from_toml_str(document)?)
    }

    pub fn defaults() -> Result<Self, LoadError> {
        Self::from_raw(RawSettings::default())
    }

    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let current = Arc::new(SsrSettings::from_raw(raw.clone())?);
        Ok(Self {
            inner: Arc::new(RwLock::new(State {
                baseline: raw.clone(),
                raw,
                current,
            })),
        })
    }

    pub fn current(&self) -> Arc<SsrSettings> {
        Arc::clone(&read_or_recover(&self.inner, SOURCE, "current").current)
    }

    /// Apply one changed setting.
    ///
    /// Returns `Ok(false)` for names this crate does not own. A value that
    /// fails validation leaves the current settings untouched.
    pub fn apply(&self, change: &SettingChange) -> Result<bool, LoadError> {
        let name = change.name.to_ascii_lowercase();
        let name = name.strip_prefix(NAME_PREFIX).unwrap_or(&name);

        let mut state = write_or_recover(&self.inner, SOURCE, "apply");
        let mut raw = state.raw.clone();
        if !assign(&mut raw, &state.baseline, name, change.value.clone())? {
            return Ok(false);
        }

        let settings = SsrSettings::from_raw(raw.clone())?;
        state.raw = raw;
        state.current = Arc::new(settings);
        info!(setting = name, reset = change.value.is_none(), "setting reloaded");
        Ok(true)
    }
}

fn assign(
    raw: &mut RawSettings,
    baseline: &RawSettings,
    name: &str,
    value: Option<Value>,
) -> Result<bool, LoadError> {
    match name {
        "debug" => raw.debug = pick("debug", value, &baseline.debug)?,
        "enabled" => raw.enabled = pick("enabled", value, &baseline.enabled)?,
        "backend" => raw.backend = pick("backend", value, &baseline.backend)?,
        "strip_query_params" => {
            raw.strip_query_params =
                pick("strip_query_params", value, &baseline.strip_query_params)?
        }
        "cache_enabled" => {
            raw.cache.enabled = pick("cache.enabled", value, &baseline.cache.enabled)?
        }
        "cache_alias" => raw.cache.alias = pick("cache.alias", value, &baseline.cache.alias)?,
        "cache_prefix" => {
            raw.cache.prefix = pick("cache.prefix", value, &baseline.cache.prefix)?
        }
        "cache_timeout" => {
            raw.cache.timeout_seconds = pick(
                "cache.timeout_seconds",
                value,
                &baseline.cache.timeout_seconds,
            )?
        }
        "cache_max_entries" => {
            raw.cache.max_entries =
                pick("cache.max_entries", value, &baseline.cache.max_entries)?
        }
        "ignore_extensions" => {
            raw.rules.ignore_extensions = pick(
                "rules.ignore_extensions",
                value,
                &baseline.rules.ignore_extensions,
            )?
        }
        "ignore_path" => {
            raw.rules.ignore_path =
                pick("rules.ignore_path", value, &baseline.rules.ignore_path)?
        }
        "ignore_urls" => {
            raw.rules.ignore_urls =
                pick("rules.ignore_urls", value, &baseline.rules.ignore_urls)?
        }
        "remove_headers" => {
            raw.rules.remove_headers =
                pick("rules.remove_headers", value, &baseline.rules.remove_headers)?
        }
        "user_agents" => {
            raw.rules.user_agents =
                pick("rules.user_agents", value, &baseline.rules.user_agents)?
        }
        "prerender_io_hosted_url" => {
            raw.prerender.hosted_url =
                pick("prerender.hosted_url", value, &baseline.prerender.hosted_url)?
        }
        "prerender_io_hosted_update_url" => {
            raw.prerender.hosted_update_url = pick(
                "prerender.hosted_update_url",
                value,
                &baseline.prerender.hosted_update_url,
            )?
        }
        "prerender_io_token" => {
            raw.prerender.token = pick("prerender.token", value, &baseline.prerender.token)?
        }
        "prerender_timeout" => {
            raw.prerender.timeout_seconds = pick(
                "prerender.timeout_seconds",
                value,
                &baseline.prerender.timeout_seconds,
            )?
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn pick<T: DeserializeOwned + Clone>(
    key: &'static str,
    value: Option<Value>,
    baseline: &Option<T>,
) -> Result<Option<T>, LoadError> {
    match value {
        None | Some(Value::Null) => Ok(baseline.clone()),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|err| LoadError::invalid(key, err.to_string())),
    }
}
