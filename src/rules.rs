//! Partial recognizer for Traefik router rules
//!
//! Only `Host(...)` and `HostRegexp(...)` productions are understood, and
//! only structurally: every backtick token inside any such production,
//! anywhere in the rule, participates in one big OR. Boolean operators,
//! path matchers, nested parentheses and escaped backticks are not parsed.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static HOST_PRODUCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Host\(([^)]*)\)").expect("valid pattern"));

static HOST_REGEXP_PRODUCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"HostRegexp\(([^)]*)\)").expect("valid pattern"));

static BACKTICK_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid pattern"));

/// True if any router rule in the label map routes `hostname`.
///
/// Router rules live in labels matching `*traefik.http.routers.*` with a
/// `.rule` suffix; other router-scoped keys are ignored.
pub fn matches_router_rules(labels: &HashMap<String, String>, hostname: &str) -> bool {
    labels.iter().any(|(key, rule)| {
        key.contains("traefik.http.routers.") && key.ends_with(".rule") && rule_matches(rule, hostname)
    })
}

/// True if any `Host()` or `HostRegexp()` token in the rule matches
pub fn rule_matches(rule: &str, hostname: &str) -> bool {
    matches_host(rule, hostname) || matches_host_regexp(rule, hostname)
}

/// Exact-equality match against `Host()` tokens
fn matches_host(rule: &str, hostname: &str) -> bool {
    HOST_PRODUCTION
        .captures_iter(rule)
        .flat_map(|caps| backtick_tokens(caps.get(1).map_or("", |m| m.as_str())))
        .any(|token| token == hostname)
}

/// Regular-expression match against `HostRegexp()` tokens. Tokens that fail
/// to compile are skipped; the remaining tokens are still evaluated.
fn matches_host_regexp(rule: &str, hostname: &str) -> bool {
    HOST_REGEXP_PRODUCTION
        .captures_iter(rule)
        .flat_map(|caps| backtick_tokens(caps.get(1).map_or("", |m| m.as_str())))
        .any(|token| match Regex::new(token) {
            Ok(re) => re.is_match(hostname),
            Err(_) => false,
        })
}

/// Extract every backtick-delimited token, e.g.
/// ``"`a.com`, `b.com`"`` -> `["a.com", "b.com"]`
fn backtick_tokens(argument: &str) -> impl Iterator<Item = &str> {
    BACKTICK_TOKEN
        .captures_iter(argument)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_router_rules() {
        struct Case {
            name: &'static str,
            labels: Vec<(&'static str, &'static str)>,
            hostname: &'static str,
            expected: bool,
        }

        let cases = [
            Case {
                name: "exact Host() match",
                labels: vec![("traefik.http.routers.web.rule", "Host(`webserver.itxnet.local`)")],
                hostname: "webserver.itxnet.local",
                expected: true,
            },
            Case {
                name: "Host() no match",
                labels: vec![("traefik.http.routers.web.rule", "Host(`webserver.itxnet.local`)")],
                hostname: "other.itxnet.local",
                expected: false,
            },
            Case {
                name: "multiple Host() match first",
                labels: vec![(
                    "traefik.http.routers.web.rule",
                    "Host(`web.example.com`, `webserver.itxnet.local`)",
                )],
                hostname: "web.example.com",
                expected: true,
            },
            Case {
                name: "multiple Host() match second",
                labels: vec![(
                    "traefik.http.routers.web.rule",
                    "Host(`web.example.com`, `webserver.itxnet.local`)",
                )],
                hostname: "webserver.itxnet.local",
                expected: true,
            },
            Case {
                name: "HostRegexp() pattern match",
                labels: vec![(
                    "traefik.http.routers.lazy.rule",
                    r"HostRegexp(`^[\w\d-]+\.itxnet\.local$`)",
                )],
                hostname: "test-123.itxnet.local",
                expected: true,
            },
            Case {
                name: "HostRegexp() no match on wrong domain",
                labels: vec![(
                    "traefik.http.routers.lazy.rule",
                    r"HostRegexp(`^[\w\d-]+\.itxnet\.local$`)",
                )],
                hostname: "webserver.example.com",
                expected: false,
            },
            Case {
                name: "HostRegexp() anchors enforced, no bare domain match",
                labels: vec![(
                    "traefik.http.routers.lazy.rule",
                    r"HostRegexp(`^[\w\d-]+\.itxnet\.local$`)",
                )],
                hostname: "itxnet.local",
                expected: false,
            },
            Case {
                name: "combined Host and HostRegexp, Host matches",
                labels: vec![(
                    "traefik.http.routers.web.rule",
                    r"Host(`exact.example.com`) || HostRegexp(`^[\w\d-]+\.itxnet\.local$`)",
                )],
                hostname: "exact.example.com",
                expected: true,
            },
            Case {
                name: "combined Host and HostRegexp, HostRegexp matches",
                labels: vec![(
                    "traefik.http.routers.web.rule",
                    r"Host(`exact.example.com`) || HostRegexp(`^[\w\d-]+\.itxnet\.local$`)",
                )],
                hostname: "test.itxnet.local",
                expected: true,
            },
            Case {
                name: "Host() with spaces around commas",
                labels: vec![(
                    "traefik.http.routers.web.rule",
                    "Host(`web.example.com` , `test.example.com`)",
                )],
                hostname: "test.example.com",
                expected: true,
            },
            Case {
                name: "non-router label ignored",
                labels: vec![(
                    "traefik.http.services.web.loadbalancer.server.port",
                    "8080",
                )],
                hostname: "webserver.itxnet.local",
                expected: false,
            },
            Case {
                name: "router label without .rule suffix ignored",
                labels: vec![("traefik.http.routers.web.entrypoints", "http")],
                hostname: "webserver.itxnet.local",
                expected: false,
            },
            Case {
                name: "substring of hostname does not match",
                labels: vec![("traefik.http.routers.web.rule", "Host(`server.local`)")],
                hostname: "webserver.local",
                expected: false,
            },
            Case {
                name: "rule on second router label matches",
                labels: vec![
                    ("traefik.http.routers.a.entrypoints", "http"),
                    ("traefik.http.routers.b.rule", "Host(`b.example`)"),
                ],
                hostname: "b.example",
                expected: true,
            },
        ];

        for case in cases {
            assert_eq!(
                matches_router_rules(&labels(&case.labels), case.hostname),
                case.expected,
                "case: {}",
                case.name
            );
        }
    }

    #[test]
    fn test_host_matcher() {
        assert!(matches_host("Host(`example.com`)", "example.com"));
        assert!(!matches_host("Host(`example.com`)", "other.com"));
        assert!(matches_host("Host(`a.com`, `b.com`, `c.com`)", "a.com"));
        assert!(matches_host("Host(`a.com`, `b.com`, `c.com`)", "b.com"));
        assert!(matches_host("Host(`a.com`, `b.com`, `c.com`)", "c.com"));
        assert!(!matches_host("Host(`a.com`, `b.com`, `c.com`)", "d.com"));
        assert!(matches_host(
            "Host(`example.com`) && PathPrefix(`/api`)",
            "example.com"
        ));
        assert!(!matches_host("PathPrefix(`/api`)", "example.com"));
    }

    #[test]
    fn test_host_regexp_matcher() {
        assert!(matches_host_regexp(
            r"HostRegexp(`^[a-z]+\.example\.com$`)",
            "test.example.com"
        ));
        assert!(!matches_host_regexp(
            r"HostRegexp(`^[a-z]+\.example\.com$`)",
            "test123.example.com"
        ));
        assert!(matches_host_regexp(
            r"HostRegexp(`^[\w\d-]+\.local$`)",
            "test-server_123.local"
        ));
        // anchors are the pattern's responsibility and are honored
        assert!(!matches_host_regexp(
            r"HostRegexp(`^subdomain\.example\.com$`)",
            "test.subdomain.example.com"
        ));
        // several patterns within one production
        assert!(matches_host_regexp(
            r"HostRegexp(`^test\..*$`, `^prod\..*$`)",
            "prod.example.com"
        ));
        // a token that fails to compile is skipped, not fatal
        assert!(!matches_host_regexp(
            "HostRegexp(`^[invalid(regex$`)",
            "anything.com"
        ));
        assert!(matches_host_regexp(
            r"HostRegexp(`^[invalid(regex$`, `^anything\.com$`)",
            "anything.com"
        ));
        assert!(!matches_host_regexp("Host(`example.com`)", "example.com"));
    }

    #[test]
    fn test_backtick_tokens() {
        let collect = |s: &'static str| backtick_tokens(s).collect::<Vec<_>>();

        assert_eq!(collect("`example.com`"), vec!["example.com"]);
        assert_eq!(collect("`a.com`, `b.com`, `c.com`"), vec!["a.com", "b.com", "c.com"]);
        assert_eq!(collect("`a.com` , `b.com`"), vec!["a.com", "b.com"]);
        assert_eq!(collect(r"`^[\w\d-]+\.local$`"), vec![r"^[\w\d-]+\.local$"]);
        assert!(collect("").is_empty());
        assert!(collect("example.com").is_empty());
    }
}
