use std::net::IpAddr;

const MAX_LABEL_LEN: usize = 63;
const MIN_LABELS: usize = 3;

/// Maps a request host to the subdomain that keys the tenant directory.
pub trait SubdomainStrategy: Send + Sync {
    fn subdomain(&self, host: &str) -> Option<String>;
}

/// First DNS label of `<school>.<platform>.<tld>` hosts.
///
/// Loopback and literal IP hosts map to `local_fallback` when one is set, so a
/// gateway can be exercised locally without wildcard DNS.
#[derive(Debug, Clone, Default)]
pub struct LabelSubdomainStrategy {
    local_fallback: Option<String>,
}

impl LabelSubdomainStrategy {
    pub fn new(local_fallback: Option<String>) -> Self {
        Self {
            local_fallback: local_fallback.map(|tenant| tenant.to_ascii_lowercase()),
        }
    }
}

impl SubdomainStrategy for LabelSubdomainStrategy {
    fn subdomain(&self, host: &str) -> Option<String> {
        let host = strip_port(host.trim())
            .trim_end_matches('.')
            .to_ascii_lowercase();

        if host.is_empty() {
            return None;
        }

        if is_local_host(&host) {
            return self.local_fallback.clone();
        }

        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < MIN_LABELS {
            return None;
        }

        match labels[0] {
            "" | "www" => None,
            first => Some(first.to_string()),
        }
    }
}

/// `[a-z0-9-]`, 1 to 63 characters, no leading or trailing hyphen.
pub fn is_valid_subdomain(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [v6]:port keeps its brackets
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }

    match host.rsplit_once(':') {
        // a bare v6 literal has more than one colon and no port
        Some((name, _)) if !name.contains(':') => name,
        _ => host,
    }
}

fn is_local_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }

    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> LabelSubdomainStrategy {
        LabelSubdomainStrategy::new(None)
    }

    #[test]
    fn test_first_label_is_subdomain() {
        let s = strategy();
        assert_eq!(
            s.subdomain("harare-primary.schoolgate.app"),
            Some("harare-primary".to_string())
        );
        assert_eq!(
            s.subdomain("harare-primary.schoolgate.app:8443"),
            Some("harare-primary".to_string())
        );
        assert_eq!(
            s.subdomain("Harare-Primary.SchoolGate.App."),
            Some("harare-primary".to_string())
        );
    }

    #[test]
    fn test_hosts_without_subdomain() {
        let s = strategy();
        assert_eq!(s.subdomain("schoolgate.app"), None);
        assert_eq!(s.subdomain("www.schoolgate.app"), None);
        assert_eq!(s.subdomain(""), None);
        assert_eq!(s.subdomain(".schoolgate.app"), None);
    }

    #[test]
    fn test_local_hosts_use_fallback() {
        let s = strategy();
        assert_eq!(s.subdomain("localhost:3000"), None);
        assert_eq!(s.subdomain("127.0.0.1"), None);

        let s = LabelSubdomainStrategy::new(Some("Demo-School".to_string()));
        for host in ["localhost", "localhost:3000", "127.0.0.1:8080", "::1", "[::1]:3000", "10.0.0.5"] {
            assert_eq!(s.subdomain(host), Some("demo-school".to_string()), "{}", host);
        }
    }

    #[test]
    fn test_subdomain_validation() {
        assert!(is_valid_subdomain("harare-primary"));
        assert!(is_valid_subdomain("school42"));
        assert!(!is_valid_subdomain(""));
        assert!(!is_valid_subdomain("-harare"));
        assert!(!is_valid_subdomain("harare-"));
        assert!(!is_valid_subdomain("harare_primary"));
        assert!(!is_valid_subdomain("Harare"));
        assert!(!is_valid_subdomain(&"a".repeat(64)));
        assert!(is_valid_subdomain(&"a".repeat(63)));
    }
}
