use axum::http::{Request, header};

use crate::domain::IncomingRequest;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

impl<B> IncomingRequest for Request<B> {
    fn full_url(&self) -> String {
        let uri = self.uri();
        let scheme = uri
            .scheme_str()
            .map(str::to_string)
            .or_else(|| forwarded_proto(self))
            .unwrap_or_else(|| "http".to_string());
        let host = uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .or_else(|| self.header(header::HOST.as_str()))
            .unwrap_or_else(|| "localhost".to_string());
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        format!("{scheme}://{host}{path_and_query}")
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

// First hop only, as written by the nearest proxy.
fn forwarded_proto<B>(request: &Request<B>) -> Option<String> {
    let value = request.header(FORWARDED_PROTO)?;
    let proto = value.split(',').next()?.trim().to_ascii_lowercase();
    (!proto.is_empty()).then_some(proto)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request(uri: &str) -> axum::http::request::Builder {
        Request::builder().uri(uri)
    }

    #[test]
    fn origin_form_uses_host_header() {
        let req = request("/main?test=1")
            .header("Host", "testserver")
            .body(Body::empty())
            .expect("request");
        assert_eq!(req.full_url(), "http://testserver/main?test=1");
    }

    #[test]
    fn forwarded_proto_sets_scheme() {
        let req = request("/secure")
            .header("Host", "testserver")
            .header("X-Forwarded-Proto", "HTTPS, http")
            .body(Body::empty())
            .expect("request");
        assert_eq!(req.full_url(), "https://testserver/secure");
    }

    #[test]
    fn absolute_uri_wins() {
        let req = request("https://example.org:8443/a/b?c=d")
            .header("Host", "ignored")
            .body(Body::empty())
            .expect("request");
        assert_eq!(req.full_url(), "https://example.org:8443/a/b?c=d");
    }

    #[test]
    fn missing_host_falls_back_to_localhost() {
        let req = request("/").body(Body::empty()).expect("request");
        assert_eq!(req.full_url(), "http://localhost/");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = request("/")
            .header("User-Agent", "Googlebot")
            .body(Body::empty())
            .expect("request");
        assert_eq!(req.header("user-agent").as_deref(), Some("Googlebot"));
        assert_eq!(req.header("USER-AGENT").as_deref(), Some("Googlebot"));
        assert!(req.header("accept").is_none());
    }
}
