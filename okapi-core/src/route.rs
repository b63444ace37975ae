use regex::Regex;
use serde::{Deserialize, Serialize};

/// Dictates how the proxy engine relates request/response bodies between
/// a hop and the next (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProxyType {
    RequestResponse,
    RequestOnly,
    Headers,
    Redirect,
}

impl Default for ProxyType {
    fn default() -> Self {
        ProxyType::RequestResponse
    }
}

/// A rule selecting requests by path/method and describing how a module
/// participates in the pipeline (spec.md §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEntry {
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub path_pattern: Option<String>,

    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default = "default_phase_level")]
    pub phase_level: String,

    #[serde(default)]
    pub proxy_type: ProxyType,

    #[serde(default)]
    pub redirect_path: Option<String>,

    #[serde(default)]
    pub permissions_required: Vec<String>,

    #[serde(default)]
    pub permissions_desired: Vec<String>,

    #[serde(default)]
    pub module_permissions: Vec<String>,
}

fn default_phase_level() -> String {
    "50".to_string()
}

/// Strips the query string and fragment from a request target, leaving
/// the path `match` is performed against.
fn strip_query_and_fragment(uri: &str) -> &str {
    let uri = uri.split('#').next().unwrap_or(uri);
    uri.split('?').next().unwrap_or(uri)
}

/// Converts an Okapi glob pattern to a fully-anchored regex: `*` matches
/// any run of non-`/` characters, `{name}` matches exactly one path
/// segment. Every other character is matched literally.
pub fn compile_path_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '{' => {
                // consume until the matching `}`; the segment name itself
                // is irrelevant to matching, only its presence as a single
                // path segment is.
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        break;
                    }
                }
                out.push_str("[^/]+");
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

/// Tests whether `entry` matches an incoming request's `uri` and `method`
/// (spec.md §4.1). Strips query/fragment first.
pub fn route_matches(entry: &RoutingEntry, uri: &str, method: &str) -> bool {
    let path = strip_query_and_fragment(uri);

    let path_matches = if let Some(pattern) = &entry.path_pattern {
        match compile_path_pattern(pattern) {
            Ok(re) => re.is_match(path),
            Err(_) => false,
        }
    } else if let Some(prefix) = &entry.path {
        path.starts_with(prefix.as_str())
    } else {
        false
    };

    if !path_matches {
        return false;
    }

    method_matches(entry, method)
}

fn method_matches(entry: &RoutingEntry, method: &str) -> bool {
    if entry.methods.is_empty() || entry.methods.iter().any(|m| m == "*") {
        return true;
    }
    entry
        .methods
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
}

/// Rewrites `uri`'s matched prefix/pattern to `redirect_path`, preserving
/// whatever query/fragment followed the original path (spec.md §4.2).
pub fn rewrite_uri(uri: &str, redirect_path: &str) -> String {
    let path = strip_query_and_fragment(uri);
    let suffix = &uri[path.len()..];
    format!("{}{}", redirect_path, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_prefix(path: &str) -> RoutingEntry {
        RoutingEntry {
            path: Some(path.to_string()),
            path_pattern: None,
            methods: vec![],
            phase_level: "50".to_string(),
            proxy_type: ProxyType::RequestResponse,
            redirect_path: None,
            permissions_required: vec![],
            permissions_desired: vec![],
            module_permissions: vec![],
        }
    }

    fn entry_pattern(pattern: &str) -> RoutingEntry {
        RoutingEntry {
            path: None,
            path_pattern: Some(pattern.to_string()),
            methods: vec![],
            phase_level: "50".to_string(),
            proxy_type: ProxyType::RequestResponse,
            redirect_path: None,
            permissions_required: vec![],
            permissions_desired: vec![],
            module_permissions: vec![],
        }
    }

    #[test]
    fn test_prefix_match() {
        let e = entry_prefix("/echo");
        assert!(route_matches(&e, "/echo", "POST"));
        assert!(route_matches(&e, "/echo/nested", "GET"));
        assert!(!route_matches(&e, "/other", "GET"));
    }

    #[test]
    fn test_glob_star_does_not_cross_slash() {
        let e = entry_pattern("/a/*/c");
        assert!(route_matches(&e, "/a/b/c", "GET"));
        assert!(!route_matches(&e, "/a/b/d/c", "GET"));
    }

    #[test]
    fn test_glob_named_segment() {
        let e = entry_pattern("/items/{id}");
        assert!(route_matches(&e, "/items/42", "GET"));
        assert!(!route_matches(&e, "/items/42/sub", "GET"));
    }

    #[test]
    fn test_method_filter_empty_matches_all() {
        let e = entry_prefix("/x");
        assert!(route_matches(&e, "/x", "DELETE"));
    }

    #[test]
    fn test_method_filter_exact() {
        let mut e = entry_prefix("/x");
        e.methods = vec!["POST".to_string()];
        assert!(route_matches(&e, "/x", "POST"));
        assert!(!route_matches(&e, "/x", "GET"));
    }

    #[test]
    fn test_query_and_fragment_stripped() {
        let e = entry_prefix("/echo");
        assert!(route_matches(&e, "/echo?x=1#frag", "GET"));
    }

    #[test]
    fn test_rewrite_uri_preserves_query() {
        assert_eq!(rewrite_uri("/old?x=1", "/new"), "/new?x=1");
        assert_eq!(rewrite_uri("/old", "/new"), "/new");
    }
}
