//! Decision rules for pre-rendering.
//!
//! Every predicate here is pure: patterns are passed in explicitly, or taken
//! from a [`RuleSet`] built from the current settings snapshot.

use std::fmt;

use regex::Regex;

use super::request::split_url;

/// A regular expression that must match at the start of the input.
///
/// The match may stop before the end of the input, so `/static/` matches
/// `/static/app.css` but not `/assets/static/app.css`.
#[derive(Clone)]
pub struct AnchoredPattern {
    source: String,
    regex: Regex,
}

impl AnchoredPattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!(r"\A(?:{source})"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

impl fmt::Debug for AnchoredPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnchoredPattern").field(&self.source).finish()
    }
}

impl PartialEq for AnchoredPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Compile every source string, reporting the first invalid one.
pub fn compile_patterns<S: AsRef<str>>(sources: &[S]) -> Result<Vec<AnchoredPattern>, String> {
    sources
        .iter()
        .map(|source| {
            let source = source.as_ref();
            AnchoredPattern::new(source).map_err(|err| format!("pattern `{source}`: {err}"))
        })
        .collect()
}

/// Rules evaluated for each candidate URL and user agent.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub enabled: bool,
    pub ignore_urls: Vec<AnchoredPattern>,
    pub ignore_path: Vec<AnchoredPattern>,
    pub ignore_extensions: Vec<String>,
    pub user_agents: Vec<AnchoredPattern>,
}

impl RuleSet {
    pub fn must_render(&self, url: &str) -> bool {
        must_render(url, self)
    }

    pub fn is_url_ignored(&self, url: &str) -> bool {
        is_url_ignored(url, &self.ignore_urls)
    }

    pub fn is_path_ignored(&self, url: &str) -> bool {
        is_path_ignored(url, &self.ignore_path)
    }

    pub fn is_extension_ignored(&self, url: &str) -> bool {
        is_extension_ignored(url, &self.ignore_extensions)
    }

    pub fn is_user_agent_match(&self, user_agent: &str) -> bool {
        is_user_agent_match(user_agent, &self.user_agents)
    }
}

/// True when rendering is enabled and no ignore rule matches `url`.
pub fn must_render(url: &str, rules: &RuleSet) -> bool {
    rules.enabled
        && !is_url_ignored(url, &rules.ignore_urls)
        && !is_path_ignored(url, &rules.ignore_path)
        && !is_extension_ignored(url, &rules.ignore_extensions)
}

pub fn is_url_ignored(url: &str, patterns: &[AnchoredPattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches(url))
}

pub fn is_path_ignored(url: &str, patterns: &[AnchoredPattern]) -> bool {
    let path = url_path(url);
    patterns.iter().any(|pattern| pattern.matches(path))
}

pub fn is_extension_ignored<S: AsRef<str>>(url: &str, extensions: &[S]) -> bool {
    let path = url_path(url);
    extensions
        .iter()
        .any(|extension| path.ends_with(extension.as_ref()))
}

pub fn is_user_agent_match(user_agent: &str, patterns: &[AnchoredPattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches(user_agent))
}

/// Raw path component of `url`, without scheme, host, query or fragment.
///
/// Nothing is normalized: `/static/../app` stays as written. Inputs that are
/// not absolute URLs are treated as a bare path.
pub fn url_path(url: &str) -> &str {
    split_url(url).1
}
