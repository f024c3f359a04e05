//! Destination URL validation (SSRF gate)
//!
//! Private-address checks are purely syntactic. No DNS lookups are made, so a
//! public name that resolves to a private address is not caught here.

use crate::error::UrlValidationError;
use ipnetwork::{Ipv4Network, Ipv6Network};
use once_cell::sync::Lazy;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Unspecified, loopback, RFC 1918 and link-local blocks
static BLOCKED_V4: Lazy<Vec<Ipv4Network>> = Lazy::new(|| {
    [
        (Ipv4Addr::new(0, 0, 0, 0), 8),
        (Ipv4Addr::new(127, 0, 0, 0), 8),
        (Ipv4Addr::new(10, 0, 0, 0), 8),
        (Ipv4Addr::new(172, 16, 0, 0), 12),
        (Ipv4Addr::new(192, 168, 0, 0), 16),
        (Ipv4Addr::new(169, 254, 0, 0), 16),
    ]
    .into_iter()
    .filter_map(|(addr, prefix)| Ipv4Network::new(addr, prefix).ok())
    .collect()
});

fn is_blocked_v4(addr: Ipv4Addr) -> bool {
    BLOCKED_V4.iter().any(|net| net.contains(addr))
}

/// Unique-local (`fc00::/7`) and link-local (`fe80::/10`) blocks
static BLOCKED_V6: Lazy<Vec<Ipv6Network>> = Lazy::new(|| {
    [
        (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
        (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    ]
    .into_iter()
    .filter_map(|(addr, prefix)| Ipv6Network::new(addr, prefix).ok())
    .collect()
});

fn is_blocked_v6(addr: Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return true;
    }
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    BLOCKED_V6.iter().any(|net| net.contains(addr))
}

/// One entry of the allowed-hosts list
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    /// `*.domain`, stored without the leading `*.`
    Wildcard(String),
}

impl HostPattern {
    fn parse(raw: &str) -> Option<Self> {
        let pattern = raw.trim().to_ascii_lowercase();
        if pattern.is_empty() {
            return None;
        }
        match pattern.strip_prefix("*.") {
            Some(domain) if !domain.is_empty() => Some(Self::Wildcard(domain.to_string())),
            Some(_) => None,
            None => Some(Self::Exact(pattern)),
        }
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(name) => host == name,
            Self::Wildcard(domain) => host
                .strip_suffix(domain.as_str())
                .map(|prefix| prefix.len() > 1 && prefix.ends_with('.'))
                .unwrap_or(false),
        }
    }

    fn as_string(&self) -> String {
        match self {
            Self::Exact(name) => name.clone(),
            Self::Wildcard(domain) => format!("*.{}", domain),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlValidator {
    allowed: Vec<HostPattern>,
}

impl UrlValidator {
    /// Validator with an allowed-hosts list. An empty list allows every
    /// public host.
    pub fn new<I, S>(allowed_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed_hosts
                .into_iter()
                .filter_map(|h| HostPattern::parse(h.as_ref()))
                .collect(),
        }
    }

    /// Parse the comma-separated form used by `ALLOWED_HOSTS`.
    pub fn from_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn allowed_hosts(&self) -> Vec<String> {
        self.allowed.iter().map(HostPattern::as_string).collect()
    }

    /// Validate `input`, returning the normalised URL.
    pub fn validate(&self, input: &str) -> Result<String, UrlValidationError> {
        let url = Url::parse(input.trim()).map_err(|e| UrlValidationError::InvalidUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(UrlValidationError::InvalidProtocol {
                url: input.to_string(),
                scheme: scheme.to_string(),
            });
        }

        let host = match url.host() {
            Some(host) => host,
            None => {
                return Err(UrlValidationError::InvalidUrl {
                    url: input.to_string(),
                    reason: "missing host".to_string(),
                })
            }
        };

        let (hostname, private) = match host {
            Host::Domain(domain) => {
                let name = domain.to_ascii_lowercase();
                let name = name.strip_suffix('.').unwrap_or(&name).to_string();
                let private = name == "localhost";
                (name, private)
            }
            Host::Ipv4(addr) => (addr.to_string(), is_blocked_v4(addr)),
            Host::Ipv6(addr) => (addr.to_string(), is_blocked_v6(addr)),
        };

        if private {
            return Err(UrlValidationError::PrivateIp {
                url: input.to_string(),
                host: hostname,
            });
        }

        if !self.allowed.is_empty() && !self.allowed.iter().any(|p| p.matches(&hostname)) {
            return Err(UrlValidationError::HostNotAllowed {
                url: input.to_string(),
                host: hostname,
                allowed: self.allowed_hosts(),
            });
        }

        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(v: &UrlValidator, url: &str) -> &'static str {
        v.validate(url).unwrap_err().kind()
    }

    #[test]
    fn test_accepts_public_http_urls() {
        let v = UrlValidator::default();
        assert_eq!(
            v.validate("https://example.com/path?q=1").unwrap(),
            "https://example.com/path?q=1"
        );
        assert_eq!(v.validate("http://Example.COM").unwrap(), "http://example.com/");
    }

    #[test]
    fn test_rejects_malformed() {
        let v = UrlValidator::default();
        assert_eq!(kind(&v, "not a url"), "invalid_url");
        assert_eq!(kind(&v, ""), "invalid_url");
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        let v = UrlValidator::default();
        for url in [
            "file:///etc/passwd",
            "javascript:alert(1)",
            "data:text/html,<script>alert(1)</script>",
            "ftp://example.com/",
        ] {
            assert_eq!(kind(&v, url), "invalid_protocol", "{url}");
        }
    }

    #[test]
    fn test_rejects_private_addresses_without_allow_list() {
        let v = UrlValidator::default();
        for url in [
            "http://127.0.0.1:3000/",
            "http://127.255.255.254/",
            "http://10.1.2.3/",
            "http://172.16.0.1/",
            "http://172.31.255.255/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data/",
            "http://localhost:5173/",
            "http://LOCALHOST./",
            "http://[::1]:8080/",
            "http://[::ffff:10.0.0.1]/",
            "http://127.1/",
            "http://0.0.0.0:3000/",
            "http://0/",
            "http://[::]/",
            "http://[fe80::1]/",
            "http://[fd12:3456::1]/",
            "http://[fc00::1]/",
        ] {
            assert_eq!(kind(&v, url), "private_ip", "{url}");
        }
    }

    #[test]
    fn test_neighbouring_ranges_are_public() {
        let v = UrlValidator::default();
        assert!(v.validate("http://172.32.0.1/").is_ok());
        assert!(v.validate("http://172.15.255.255/").is_ok());
        assert!(v.validate("http://11.0.0.1/").is_ok());
        assert!(v.validate("http://1.0.0.1/").is_ok());
        assert!(v.validate("http://[2606:4700::1111]/").is_ok());
        assert!(v.validate("http://[fec0::1]/").is_ok());
    }

    #[test]
    fn test_private_ip_beats_allow_list() {
        let v = UrlValidator::new(["localhost", "127.0.0.1"]);
        assert_eq!(kind(&v, "http://localhost/"), "private_ip");
        assert_eq!(kind(&v, "http://127.0.0.1/"), "private_ip");
    }

    #[test]
    fn test_wildcard_allow_list() {
        let v = UrlValidator::from_list("*.example.com, docs.rs");
        assert!(v.validate("https://sub.example.com/").is_ok());
        assert!(v.validate("https://deep.sub.example.com/").is_ok());
        assert!(v.validate("https://docs.rs/").is_ok());
        assert_eq!(kind(&v, "https://example.com/"), "host_not_allowed");
        assert_eq!(kind(&v, "https://other.com/"), "host_not_allowed");
        assert_eq!(kind(&v, "https://badexample.com/"), "host_not_allowed");
    }

    #[test]
    fn test_allow_list_reported() {
        let v = UrlValidator::from_list("*.example.com,,api.test");
        match v.validate("https://other.com").unwrap_err() {
            UrlValidationError::HostNotAllowed { host, allowed, .. } => {
                assert_eq!(host, "other.com");
                assert_eq!(allowed, vec!["*.example.com".to_string(), "api.test".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
