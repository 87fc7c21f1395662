//! HTTP backends for prerender services.
//!
//! [`PrerenderHosted`] talks to a self-hosted <https://github.com/prerender/prerender>;
//! [`PrerenderIo`] talks to the prerender.io SaaS and authenticates every call
//! with the account token.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use metrics::{counter, histogram};
use reqwest::{Client, redirect::Policy};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    application::backend::{BackendError, RenderBackend, RenderError},
    config::SsrSettings,
    domain::{HeaderFilter, RenderedResponse},
};

pub const PRERENDER_IO_URL: &str = "https://service.prerender.io/";
pub const PRERENDER_IO_UPDATE_URL: &str = "https://api.prerender.io/recache";
pub const PRERENDER_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-prerender-token");

pub(crate) const METRIC_RENDER_MS: &str = "ssr_render_ms";
pub(crate) const METRIC_RENDER_UPSTREAM_ERROR: &str = "ssr_render_upstream_error_total";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection options shared by both prerender backends.
#[derive(Debug, Clone)]
pub struct PrerenderOptions {
    /// Prefix the absolute page URL is appended to.
    pub render_url: String,
    /// Endpoint receiving recache requests.
    pub update_url: String,
    pub strip_query_params: bool,
    pub remove_headers: HeaderFilter,
    pub timeout: Duration,
}

impl PrerenderOptions {
    pub fn new(render_url: impl Into<String>, update_url: impl Into<String>) -> Self {
        Self {
            render_url: render_url.into(),
            update_url: update_url.into(),
            strip_query_params: false,
            remove_headers: HeaderFilter::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Options for the self-hosted endpoints named in `settings`.
    pub fn from_settings(settings: &SsrSettings) -> Self {
        Self {
            render_url: settings.prerender.hosted_url.clone(),
            update_url: settings.prerender.hosted_update_url.clone(),
            strip_query_params: settings.strip_query_params,
            remove_headers: settings.rules.remove_headers.clone(),
            timeout: settings.prerender.timeout,
        }
    }
}

#[derive(Serialize)]
struct RecachePayload<'a> {
    #[serde(rename = "prerenderToken", skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    url: &'a str,
}

/// Backend for a self-hosted prerender service.
///
/// One HTTP client is built per instance and reused for every call; redirects
/// returned by the service are passed through, never followed.
#[derive(Debug)]
pub struct PrerenderHosted {
    client: Client,
    render_url: String,
    update_url: String,
    strip_query_params: bool,
    remove_headers: HeaderFilter,
    token: Option<String>,
}

impl PrerenderHosted {
    pub fn new(options: PrerenderOptions) -> Result<Self, BackendError> {
        Self::build(options, None)
    }

    pub fn from_settings(settings: &SsrSettings) -> Result<Self, BackendError> {
        Self::new(PrerenderOptions::from_settings(settings))
    }

    fn build(options: PrerenderOptions, token: Option<String>) -> Result<Self, BackendError> {
        let render_url = options.render_url.trim().to_string();
        if render_url.is_empty() {
            return Err(BackendError::configuration("render url is missing or empty"));
        }
        let update_url = options.update_url.trim().to_string();
        if update_url.is_empty() {
            return Err(BackendError::configuration("update url is missing or empty"));
        }

        let mut default_headers = HeaderMap::new();
        if let Some(token) = token.as_deref() {
            let mut value = HeaderValue::from_str(token).map_err(|_| {
                BackendError::configuration("prerender.io token is not a valid header value")
            })?;
            value.set_sensitive(true);
            default_headers.insert(PRERENDER_TOKEN_HEADER, value);
        }

        let client = Client::builder()
            .user_agent(user_agent())
            .redirect(Policy::none())
            .timeout(options.timeout)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            render_url,
            update_url,
            strip_query_params: options.strip_query_params,
            remove_headers: options.remove_headers,
            token,
        })
    }

    pub fn render_url(&self) -> &str {
        &self.render_url
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }
}

#[async_trait]
impl RenderBackend for PrerenderHosted {
    fn strip_query_params(&self) -> bool {
        self.strip_query_params
    }

    async fn render(&self, url: &str) -> Result<RenderedResponse, RenderError> {
        let target = format!("{}{url}", self.render_url);
        let started = Instant::now();

        let response = self.client.get(&target).send().await.inspect_err(|_| {
            counter!(METRIC_RENDER_UPSTREAM_ERROR).increment(1);
        })?;
        let status = response.status();
        histogram!(METRIC_RENDER_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        if status.as_u16() >= 500 {
            counter!(METRIC_RENDER_UPSTREAM_ERROR).increment(1);
            return Err(RenderError::Upstream { status });
        }

        let headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            url,
            "received rendered snapshot"
        );
        Ok(RenderedResponse::from_upstream(
            status,
            &headers,
            body,
            &self.remove_headers,
        ))
    }

    async fn update(&self, url: &str) -> Result<bool, RenderError> {
        let payload = RecachePayload {
            token: self.token.as_deref(),
            url,
        };

        match self.client.post(&self.update_url).json(&payload).send().await {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() >= 500 {
                    warn!(status = status.as_u16(), url, "recache rejected by render service");
                    return Ok(false);
                }
                Ok(true)
            }
            Err(err) => {
                warn!(error = %err, url, "recache request failed");
                Ok(false)
            }
        }
    }
}

/// Backend for the prerender.io service.
#[derive(Debug)]
pub struct PrerenderIo {
    hosted: PrerenderHosted,
}

impl PrerenderIo {
    pub fn new(token: &str, options: PrerenderOptions) -> Result<Self, BackendError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(BackendError::configuration(
                "prerender.io token is missing or empty",
            ));
        }
        let hosted = PrerenderHosted::build(options, Some(token.to_string()))?;
        Ok(Self { hosted })
    }

    /// Options pointing at the public prerender.io endpoints.
    pub fn default_options() -> PrerenderOptions {
        PrerenderOptions::new(PRERENDER_IO_URL, PRERENDER_IO_UPDATE_URL)
    }

    pub fn from_settings(settings: &SsrSettings) -> Result<Self, BackendError> {
        let options = PrerenderOptions {
            render_url: PRERENDER_IO_URL.to_string(),
            update_url: PRERENDER_IO_UPDATE_URL.to_string(),
            ..PrerenderOptions::from_settings(settings)
        };
        Self::new(&settings.prerender.token, options)
    }

    pub fn render_url(&self) -> &str {
        self.hosted.render_url()
    }

    pub fn update_url(&self) -> &str {
        self.hosted.update_url()
    }
}

#[async_trait]
impl RenderBackend for PrerenderIo {
    fn strip_query_params(&self) -> bool {
        self.hosted.strip_query_params()
    }

    async fn render(&self, url: &str) -> Result<RenderedResponse, RenderError> {
        self.hosted.render(url).await
    }

    async fn update(&self, url: &str) -> Result<bool, RenderError> {
        self.hosted.update(url).await
    }
}

fn user_agent() -> &'static str {
    concat!("prerender-gate/", env!("CARGO_PKG_VERSION"))
}
