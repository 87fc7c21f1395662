use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, error, instrument, warn};

use crate::{
    application::{
        backend::{BackendError, RenderBackend},
        error::{ErrorReport, HttpError},
        registry::BackendRegistry,
    },
    cache::StoreRegistry,
    config::SharedSettings,
    domain::{IncomingRequest, RenderRequest, rules},
};

pub(crate) const METRIC_INTERCEPT: &str = "ssr_intercept_total";
pub(crate) const METRIC_PASSTHROUGH: &str = "ssr_passthrough_total";

const SOURCE: &str = "infra::http::prerender_layer";

/// Decides whether a request is answered with a pre-rendered snapshot.
pub trait RenderPolicy: Send + Sync {
    fn must_render(&self, request: &dyn IncomingRequest, url: &RenderRequest) -> bool;
}

/// Renders for crawler user agents on URLs no ignore rule excludes.
///
/// Rules are read from the current settings snapshot on every call.
#[derive(Clone)]
pub struct UserAgentPolicy {
    settings: SharedSettings,
}

impl UserAgentPolicy {
    pub fn new(settings: SharedSettings) -> Self {
        Self { settings }
    }
}

impl RenderPolicy for UserAgentPolicy {
    fn must_render(&self, request: &dyn IncomingRequest, url: &RenderRequest) -> bool {
        let settings = self.settings.current();
        let user_agent = request.header("user-agent").unwrap_or_default();

        rules::is_user_agent_match(&user_agent, &settings.rules.user_agents)
            && rules::must_render(url.as_str(), &settings.rule_set())
    }
}

#[derive(Clone)]
pub struct PrerenderState {
    backend: Arc<dyn RenderBackend>,
    policy: Arc<dyn RenderPolicy>,
}

impl PrerenderState {
    pub fn with_backend(backend: Arc<dyn RenderBackend>, policy: Arc<dyn RenderPolicy>) -> Self {
        Self { backend, policy }
    }

    /// State around the backend the current settings name.
    pub fn from_settings(
        settings: &SharedSettings,
        backends: &BackendRegistry,
        stores: &StoreRegistry,
        policy: Arc<dyn RenderPolicy>,
    ) -> Result<Self, BackendError> {
        let backend = backends.build(&settings.current(), stores)?;
        Ok(Self::with_backend(backend, policy))
    }
}

/// Answers matching requests from the render backend; everything else goes
/// to the wrapped service untouched.
///
/// Mount with `axum::middleware::from_fn_with_state`, on the whole router
/// with `layer` or on selected routes with `route_layer`.
#[instrument(
    name = "prerender",
    skip_all,
    fields(method = %request.method(), path = %request.uri().path())
)]
pub async fn prerender_layer(
    State(state): State<PrerenderState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let url = state.backend.build_absolute_url(&request);

    if !state.policy.must_render(&request, &url) {
        counter!(METRIC_PASSTHROUGH).increment(1);
        return next.run(request).await;
    }

    counter!(METRIC_INTERCEPT).increment(1);
    debug!(url = %url, "answering with pre-rendered snapshot");

    match state.backend.render(url.as_str()).await {
        Ok(rendered) => rendered.into_response(),
        Err(err) => {
            error!(
                url = %url,
                upstream_status = err.upstream_status().map(|status| status.as_u16()),
                error = %err,
                "render service failed"
            );
            HttpError::render_failed(SOURCE, &err).into_response()
        }
    }
}

/// Logs failed responses together with their attached [`ErrorReport`].
pub async fn log_failures(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let elapsed_ms = start.elapsed().as_millis();
    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .cloned()
        .unwrap_or_else(|| "no diagnostic available".to_string());

    if status.is_server_error() {
        error!(
            target: "prerender_gate::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms,
            source,
            detail = %detail,
            chain = ?messages,
            "request failed"
        );
    } else {
        warn!(
            target: "prerender_gate::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms,
            source,
            detail = %detail,
            "client request error"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn crawler_request(user_agent: Option<&str>, uri: &str) -> Request<Body> {
        let mut builder = Request::builder().uri(uri).header("Host", "testserver");
        if let Some(user_agent) = user_agent {
            builder = builder.header("User-Agent", user_agent);
        }
        builder.body(Body::empty()).expect("request")
    }

    fn decide(policy: &UserAgentPolicy, user_agent: Option<&str>, uri: &str) -> bool {
        let request = crawler_request(user_agent, uri);
        let url = RenderRequest::new(request.full_url(), false);
        policy.must_render(&request, &url)
    }

    #[test]
    fn crawler_on_plain_page_is_rendered() {
        let policy = UserAgentPolicy::new(SharedSettings::defaults().expect("settings"));
        assert!(decide(&policy, Some("Mozilla/5.0 (compatible; Googlebot/2.1)"), "/"));
    }

    #[test]
    fn browsers_and_missing_agents_pass_through() {
        let policy = UserAgentPolicy::new(SharedSettings::defaults().expect("settings"));
        assert!(!decide(&policy, Some("Mozilla/5.0 Firefox/128.0"), "/"));
        assert!(!decide(&policy, None, "/"));
    }

    #[test]
    fn ignored_paths_and_assets_pass_through() {
        let policy = UserAgentPolicy::new(SharedSettings::defaults().expect("settings"));
        assert!(!decide(&policy, Some("Googlebot"), "/static/app.css"));
        assert!(!decide(&policy, Some("Googlebot"), "/logo.png?v=2"));
    }

    #[test]
    fn policy_follows_live_reload() {
        let settings = SharedSettings::defaults().expect("settings");
        let policy = UserAgentPolicy::new(settings.clone());
        assert!(decide(&policy, Some("Googlebot"), "/"));

        settings
            .apply(&crate::config::SettingChange::set(
                "SSR_ENABLED",
                serde_json::json!(false),
            ))
            .expect("apply");
        assert!(!decide(&policy, Some("Googlebot"), "/"));
    }
}
