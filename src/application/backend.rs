//! Render backend contract.

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::{IncomingRequest, RenderRequest, RenderedResponse};

/// Misconfiguration detected while assembling a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("unknown backend `{0}`")]
    UnknownBackend(String),
    #[error("no cache store registered under alias `{0}`")]
    UnknownCacheAlias(String),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

impl BackendError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Failure of a render or update call.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{0} is not implemented by this backend")]
    NotImplemented(&'static str),
    /// The render service itself failed. Never retried and never cached.
    #[error("render service failed with status {status}")]
    Upstream { status: StatusCode },
    /// The render service could not be reached or timed out.
    #[error("render service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RenderError {
    /// Status to report to the upstream-failure log and metrics.
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            Self::Upstream { status } => Some(*status),
            Self::Transport(err) => err.status(),
            Self::NotImplemented(_) => None,
        }
    }
}

/// Produces pre-rendered responses for absolute URLs.
///
/// `render` and `update` default to [`RenderError::NotImplemented`] so a
/// backend only overrides the capabilities it has.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    fn strip_query_params(&self) -> bool {
        false
    }

    /// URL the application would have served for `request`.
    fn build_absolute_url(&self, request: &dyn IncomingRequest) -> RenderRequest {
        RenderRequest::new(request.full_url(), self.strip_query_params())
    }

    async fn render(&self, _url: &str) -> Result<RenderedResponse, RenderError> {
        Err(RenderError::NotImplemented("render"))
    }

    /// Force the render service to refresh its snapshot of `url`.
    async fn update(&self, _url: &str) -> Result<bool, RenderError> {
        Err(RenderError::NotImplemented("update"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl RenderBackend for Bare {}

    struct FakeRequest(&'static str);

    impl IncomingRequest for FakeRequest {
        fn full_url(&self) -> String {
            self.0.to_string()
        }

        fn header(&self, _name: &str) -> Option<String> {
            None
        }
    }

    struct Stripping;

    impl RenderBackend for Stripping {
        fn strip_query_params(&self) -> bool {
            true
        }
    }

    #[test]
    fn builds_absolute_url_with_query() {
        let url = Bare.build_absolute_url(&FakeRequest("http://testserver/main?test=1"));
        assert_eq!(url.as_str(), "http://testserver/main?test=1");
    }

    #[test]
    fn builds_absolute_url_without_query_when_stripping() {
        let url = Stripping.build_absolute_url(&FakeRequest("http://testserver/main?test=1"));
        assert_eq!(url.as_str(), "http://testserver/main");
    }

    #[tokio::test]
    async fn render_and_update_are_unsupported_by_default() {
        assert!(matches!(
            Bare.render("http://test/example").await,
            Err(RenderError::NotImplemented("render"))
        ));
        assert!(matches!(
            Bare.update("http://test/example").await,
            Err(RenderError::NotImplemented("update"))
        ));
    }
}
