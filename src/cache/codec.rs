//! Serialized form of a cached response.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::RenderedResponse;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed cache payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid status code {0}")]
    Status(u16),
    #[error("invalid header `{0}`")]
    Header(String),
    #[error("invalid body encoding: {0}")]
    Body(#[from] base64::DecodeError),
}

// Header values and the body are base64 so non-UTF-8 bytes survive.
#[derive(Debug, Serialize, Deserialize)]
struct CachedEntry {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

pub fn encode(response: &RenderedResponse) -> Result<Bytes, CodecError> {
    let entry = CachedEntry {
        status: response.status.as_u16(),
        headers: response
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), STANDARD.encode(value.as_bytes())))
            .collect(),
        body: STANDARD.encode(&response.body),
    };
    Ok(Bytes::from(serde_json::to_vec(&entry)?))
}

pub fn decode(payload: &[u8]) -> Result<RenderedResponse, CodecError> {
    let entry: CachedEntry = serde_json::from_slice(payload)?;

    let status =
        StatusCode::from_u16(entry.status).map_err(|_| CodecError::Status(entry.status))?;

    let mut headers = HeaderMap::with_capacity(entry.headers.len());
    for (name, value) in entry.headers {
        let header_name =
            HeaderName::try_from(name.as_str()).map_err(|_| CodecError::Header(name.clone()))?;
        let header_value = STANDARD
            .decode(value.as_bytes())
            .ok()
            .and_then(|bytes| HeaderValue::from_bytes(&bytes).ok())
            .ok_or_else(|| CodecError::Header(name.clone()))?;
        headers.append(header_name, header_value);
    }

    let body = STANDARD.decode(entry.body.as_bytes())?;

    Ok(RenderedResponse::new(status, headers, body))
}
