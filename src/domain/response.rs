use std::collections::HashSet;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

/// Header names removed from proxied responses, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFilter {
    names: HashSet<String>,
}

impl HeaderFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn removes(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Response served in place of the application's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RenderedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Translate a response received from the render service.
    ///
    /// Every header not named by `filter` is copied; `content-length` always
    /// reflects the body actually received.
    pub fn from_upstream(
        status: StatusCode,
        upstream_headers: &HeaderMap,
        body: Bytes,
        filter: &HeaderFilter,
    ) -> Self {
        let mut headers = HeaderMap::with_capacity(upstream_headers.len());
        for (name, value) in upstream_headers {
            if !filter.removes(name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

        Self {
            status,
            headers,
            body,
        }
    }
}

impl IntoResponse for RenderedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
