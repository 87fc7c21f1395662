use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::backend::RenderError;

/// Diagnostic attached to failure responses as an extension.
///
/// Never rendered into the body; logging middleware can pick it up.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    /// Failure of the render service seen from the interception edge.
    pub fn render_failed(source: &'static str, error: &RenderError) -> Self {
        let status = match error {
            RenderError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            RenderError::Upstream { .. } | RenderError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        Self::from_error(source, status, "Render service unavailable", error)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_failure_maps_to_bad_gateway_with_report() {
        let error = RenderError::Upstream {
            status: StatusCode::SERVICE_UNAVAILABLE,
        };
        let response = HttpError::render_failed("test", &error).into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "test");
        assert_eq!(
            report.messages,
            vec!["render service failed with status 503 Service Unavailable".to_string()]
        );
    }

    #[test]
    fn missing_capability_is_not_implemented() {
        let error = RenderError::NotImplemented("render");
        let response = HttpError::render_failed("test", &error).into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
