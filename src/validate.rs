use url::Url;

/// Platforms the relay is willing to proxy for.
pub const DEFAULT_ALLOWED_HOSTS: [&str; 12] = [
    "tiktok.com",
    "vm.tiktok.com",
    "instagram.com",
    "www.instagram.com",
    "youtube.com",
    "www.youtube.com",
    "youtu.be",
    "m.youtube.com",
    "twitter.com",
    "www.twitter.com",
    "x.com",
    "www.x.com",
];

/// Host allow-list. A host matches an entry when it equals it or is a
/// subdomain of it, after lowercasing and dropping one leading `www.`.
#[derive(Debug, Clone)]
pub struct AllowList {
    domains: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|domain| domain.as_ref().trim().to_ascii_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
        }
    }

    pub fn permits(&self, input: &str) -> bool {
        let Some(host) = normalized_host(input) else {
            return false;
        };

        self.domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HOSTS)
    }
}

fn normalized_host(input: &str) -> Option<String> {
    let parsed = Url::parse(input).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str()?.to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(stripped) => Some(stripped.to_string()),
        None => Some(host),
    }
}

/// Coarse platform name reported by `/info`.
pub fn detect_platform(input: &str) -> &'static str {
    let host = Url::parse(input)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default();

    if host.contains("youtube") || host.contains("youtu.be") {
        "youtube"
    } else if host.contains("tiktok") {
        "tiktok"
    } else if host.contains("instagram") {
        "instagram"
    } else {
        "twitter"
    }
}
