use std::fmt;

/// Host-framework view of an incoming request.
pub trait IncomingRequest {
    /// Fully-qualified URL the application would have served, including the query string.
    fn full_url(&self) -> String;

    /// Case-insensitive header lookup.
    fn header(&self, name: &str) -> Option<String>;
}

/// Absolute URL submitted to a render backend.
///
/// Query stripping, when configured, happens once in [`RenderRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderRequest(String);

impl RenderRequest {
    pub fn new(full_url: impl Into<String>, strip_query_params: bool) -> Self {
        let url = full_url.into();
        if strip_query_params {
            Self(strip_query(&url))
        } else {
            Self(url)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RenderRequest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Drop the whole query string (and fragment) of `url`, keeping scheme, host and path.
///
/// The path is kept byte for byte; dot segments and escapes are not touched.
pub fn strip_query(url: &str) -> String {
    let (origin, path, _) = split_url(url);
    format!("{origin}{path}")
}

/// Raw `(origin, path, tail)` of `url`, with no normalization.
///
/// `origin` is `scheme://authority` (or `scheme:`) and empty for relative
/// input; `tail` starts at the first `?` or `#` after the path.
pub(crate) fn split_url(url: &str) -> (&str, &str, &str) {
    let path_start = match scheme_end(url) {
        Some(colon) => match url[colon + 1..].strip_prefix("//") {
            Some(authority) => {
                colon + 3 + authority.find(['/', '?', '#']).unwrap_or(authority.len())
            }
            None => colon + 1,
        },
        None => 0,
    };
    let rest = &url[path_start..];
    let path_end = path_start + rest.find(['?', '#']).unwrap_or(rest.len());
    (
        &url[..path_start],
        &url[path_start..path_end],
        &url[path_end..],
    )
}

// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"
fn scheme_end(url: &str) -> Option<usize> {
    let colon = url.find(':')?;
    let mut chars = url[..colon].chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(colon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_query_by_default() {
        let request = RenderRequest::new("http://testserver/main?test=1", false);
        assert_eq!(request.as_str(), "http://testserver/main?test=1");
    }

    #[test]
    fn strips_query_when_configured() {
        let request = RenderRequest::new("http://testserver/main?test=1&b=2", true);
        assert_eq!(request.as_str(), "http://testserver/main");
    }

    #[test]
    fn stripping_is_idempotent() {
        let once = strip_query("https://example.net/a/b?x=1#top");
        assert_eq!(once, "https://example.net/a/b");
        assert_eq!(strip_query(&once), once);
    }

    #[test]
    fn strips_non_absolute_input() {
        assert_eq!(strip_query("/main?test=1"), "/main");
    }

    #[test]
    fn stripping_keeps_the_raw_path() {
        assert_eq!(strip_query("http://h?x=1"), "http://h");
        assert_eq!(
            strip_query("http://x/static/../app?y=1"),
            "http://x/static/../app"
        );
        assert_eq!(strip_query("http://x/caf%C3%A9/./a#f"), "http://x/caf%C3%A9/./a");
    }

    #[test]
    fn split_url_separates_origin_path_and_tail() {
        assert_eq!(
            split_url("https://u@example.org:8443/a/b?c=d#e"),
            ("https://u@example.org:8443", "/a/b", "?c=d#e")
        );
        assert_eq!(split_url("http://h"), ("http://h", "", ""));
        assert_eq!(split_url("/a:b?c"), ("", "/a:b", "?c"));
        assert_eq!(split_url("urn:x/y"), ("urn:", "x/y", ""));
    }
}
