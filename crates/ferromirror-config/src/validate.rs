//! Input validation for connection settings

use regex::Regex;
use std::sync::OnceLock;

fn ipv4() -> Option<&'static Regex> {
    static IPV4: OnceLock<Option<Regex>> = OnceLock::new();
    IPV4.get_or_init(|| {
        Regex::new(
            r"^(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$",
        )
        .ok()
    })
    .as_ref()
}

fn domain() -> Option<&'static Regex> {
    static DOMAIN: OnceLock<Option<Regex>> = OnceLock::new();
    DOMAIN.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$",
        )
        .ok()
    })
    .as_ref()
}

/// Accept an IPv4 address, a domain with a top-level label, or `localhost`
pub fn validate_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() {
        return false;
    }
    host.eq_ignore_ascii_case("localhost")
        || ipv4().is_some_and(|re| re.is_match(host))
        || domain().is_some_and(|re| re.is_match(host))
}

/// Accept an absolute remote path without Windows-reserved characters
pub fn validate_remote_path(path: &str) -> bool {
    if path.trim().is_empty() || !path.starts_with('/') {
        return false;
    }
    !path.contains(['<', '>', ':', '"', '|', '?', '*'])
}

/// Accept ports 1 through 65535
pub fn validate_port(port: u32) -> bool {
    (1..=65535).contains(&port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("192.168.1.1", true)]
    #[case("255.255.255.255", true)]
    #[case("0.0.0.0", true)]
    #[case("ftp.example.com", true)]
    #[case("a.b.c.example.co.kr", true)]
    #[case("sub-domain.example.org", true)]
    #[case("localhost", true)]
    #[case("", false)]
    #[case("   ", false)]
    #[case("ftp server", false)]
    #[case("256.256.256.256", false)]
    #[case("ftp://example.com", false)]
    #[case("-invalid.com", false)]
    #[case("invalid-.com", false)]
    #[case("example", false)]
    fn test_validate_host(#[case] host: &str, #[case] expected: bool) {
        assert_eq!(validate_host(host), expected);
    }

    #[rstest]
    #[case("/html", true)]
    #[case("/", true)]
    #[case("/home/user/public_html", true)]
    #[case("html", false)]
    #[case("./relative", false)]
    #[case("", false)]
    #[case("/path<invalid>", false)]
    #[case("/path:invalid", false)]
    #[case("/path|invalid", false)]
    #[case("/path\"invalid", false)]
    #[case("/path?invalid", false)]
    #[case("/path*invalid", false)]
    fn test_validate_remote_path(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(validate_remote_path(path), expected);
    }

    #[rstest]
    #[case(1, true)]
    #[case(21, true)]
    #[case(65535, true)]
    #[case(0, false)]
    #[case(65536, false)]
    fn test_validate_port(#[case] port: u32, #[case] expected: bool) {
        assert_eq!(validate_port(port), expected);
    }
}
