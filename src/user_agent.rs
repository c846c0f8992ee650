//! Browser identity rotation for outbound requests.
//!
//! Institutional repositories often block clients that send the same identity repeatedly.
//! [`UserAgentPool`] keeps a fixed set of realistic browser strings and favors the ones
//! whose OS and browser families have gone unused the longest.

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Instant;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use regex::Regex;
use tracing::trace;

use crate::resolver::utils::compile_static_regex;

const BUILTIN_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.35",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.35",
    "Mozilla/5.0 (Windows NT 6.3; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.35",
    "Mozilla/5.0 (Windows NT 6.1; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.35",
    "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.35",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.35",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Windows NT 6.1; Win64; x64; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Windows NT 6.1; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Windows NT 10.0; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Android 12; Mobile; rv:109.0) Gecko/113.0 Firefox/113.0",
    "Mozilla/5.0 (Android 13; Mobile; rv:109.0) Gecko/113.0 Firefox/113.0",
    "Mozilla/5.0 (Windows NT 6.3; Win64; x64; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Android 11; Mobile; rv:109.0) Gecko/113.0 Firefox/113.0",
    "Mozilla/5.0 (Windows NT 6.2; Win64; x64; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Windows NT 6.3; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.13; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Android 10; Mobile; rv:109.0) Gecko/113.0 Firefox/113.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.3; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; Lenovo TB-8505F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; Infinix X656) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; LM-Q730) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; M2004J19C) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; SM-N960F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; A509DL) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; moto g pure) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; SM-A115F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; SM-A207F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; SM-A207M) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; FNE-NX9) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; M2101K7AG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; motorola edge 5G UW (2021)) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; SM-A115F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; SM-A135U) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; SM-M515F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; SM-S127DL) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-A536E) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 9; INE-LX2) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 9; SM-J530F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; COL-L29) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; CPH1819) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; CPH1931) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; CPH2179) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; ELE-L29) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; HRY-LX1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; JSN-L21) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
];

/// Weight seeded for families missing from the initial table.
const UNKNOWN_FAMILY_WEIGHT: f64 = 0.1;

static BROWSER_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(Edg|Firefox|Chrome|Version)/(\d+(?:\.\d+)*)"));

/// Operating-system family of a browser identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
    Ubuntu,
    Android,
    Ios,
    Other,
}

impl OsFamily {
    fn detect(user_agent: &str) -> Self {
        if user_agent.contains("Android") {
            Self::Android
        } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
            Self::Ios
        } else if user_agent.contains("Ubuntu") {
            Self::Ubuntu
        } else if user_agent.contains("Windows") {
            Self::Windows
        } else if user_agent.contains("Mac OS X") {
            Self::MacOs
        } else if user_agent.contains("Linux") || user_agent.contains("X11") {
            Self::Linux
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Windows => "Windows",
            Self::MacOs => "Mac OS X",
            Self::Linux => "Linux",
            Self::Ubuntu => "Ubuntu",
            Self::Android => "Android",
            Self::Ios => "iOS",
            Self::Other => "Other",
        })
    }
}

/// Browser family of a browser identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Other,
}

impl BrowserFamily {
    fn detect(user_agent: &str) -> Self {
        // Edge and Chrome both advertise Safari; check the most specific token first.
        if user_agent.contains("Edg/") {
            Self::Edge
        } else if user_agent.contains("Firefox/") {
            Self::Firefox
        } else if user_agent.contains("Chrome/") {
            Self::Chrome
        } else if user_agent.contains("Safari/") {
            Self::Safari
        } else {
            Self::Other
        }
    }

    fn version_token(self) -> &'static str {
        match self {
            Self::Edge => "Edg",
            Self::Firefox => "Firefox",
            Self::Chrome => "Chrome",
            Self::Safari | Self::Other => "Version",
        }
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Chrome => "Chrome",
            Self::Firefox => "Firefox",
            Self::Safari => "Safari",
            Self::Edge => "Edge",
            Self::Other => "Other",
        })
    }
}

/// Key into the shared family weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Os(OsFamily),
    Browser(BrowserFamily),
}

/// A browser identity handed to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentProfile {
    /// Full `User-Agent` header value.
    pub user_agent: String,
    pub browser: BrowserFamily,
    pub os: OsFamily,
    /// Browser version, `major.minor.patch`.
    pub version: String,
    /// When this identity was last handed out.
    pub last_used: Instant,
}

impl UserAgentProfile {
    fn parse(user_agent: &str, now: Instant) -> Self {
        let browser = BrowserFamily::detect(user_agent);
        let version = BROWSER_VERSION_RE
            .captures_iter(user_agent)
            .find(|caps| caps.get(1).is_some_and(|m| m.as_str() == browser.version_token()))
            .and_then(|caps| caps.get(2))
            .map_or_else(|| "0.0.0".to_string(), |m| pad_version(m.as_str()));
        Self {
            user_agent: user_agent.to_string(),
            browser,
            os: OsFamily::detect(user_agent),
            version,
            last_used: now,
        }
    }
}

fn pad_version(raw: &str) -> String {
    let mut parts: Vec<&str> = raw.split('.').take(3).collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    parts.join(".")
}

#[derive(Debug)]
struct PoolState {
    profiles: Vec<UserAgentProfile>,
    weights: HashMap<Family, f64>,
}

impl PoolState {
    fn weight(&self, family: Family) -> f64 {
        self.weights
            .get(&family)
            .copied()
            .unwrap_or(UNKNOWN_FAMILY_WEIGHT)
    }

    fn age_families(&mut self, now: Instant) {
        for index in 0..self.profiles.len() {
            let profile = &self.profiles[index];
            let elapsed = now.saturating_duration_since(profile.last_used).as_secs_f64();
            let os = Family::Os(profile.os);
            let browser = Family::Browser(profile.browser);
            let os_weight = self.weight(os) + elapsed;
            let browser_weight = self.weight(browser) + elapsed;
            self.weights.insert(os, os_weight);
            self.weights.insert(browser, browser_weight);
        }

        let total: f64 = self.weights.values().sum();
        if total.is_finite() && total > 0.0 {
            for weight in self.weights.values_mut() {
                *weight /= total;
            }
        }
    }
}

/// Thread-safe pool of browser identities with time-decayed weighted selection.
#[derive(Debug)]
pub struct UserAgentPool {
    state: Mutex<PoolState>,
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::builtin()
    }
}

impl UserAgentPool {
    /// Pool over the built-in desktop and mobile identities.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(BUILTIN_USER_AGENTS.iter().copied())
    }

    /// Pool over caller-supplied identity strings.
    ///
    /// An empty input falls back to the built-in identities.
    #[must_use]
    pub fn new<I, S>(user_agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = Instant::now();
        let mut profiles: Vec<UserAgentProfile> = user_agents
            .into_iter()
            .map(|ua| UserAgentProfile::parse(ua.as_ref(), now))
            .collect();
        if profiles.is_empty() {
            profiles = BUILTIN_USER_AGENTS
                .iter()
                .map(|ua| UserAgentProfile::parse(ua, now))
                .collect();
        }

        let weights = HashMap::from([
            (Family::Os(OsFamily::Windows), 0.3),
            (Family::Os(OsFamily::MacOs), 0.05),
            (Family::Os(OsFamily::Linux), 0.05),
            (Family::Os(OsFamily::Ubuntu), 0.05),
            (Family::Os(OsFamily::Android), 0.1),
            (Family::Os(OsFamily::Ios), 0.05),
            (Family::Browser(BrowserFamily::Chrome), 0.15),
            (Family::Browser(BrowserFamily::Firefox), 0.125),
            (Family::Browser(BrowserFamily::Safari), 0.05),
            (Family::Browser(BrowserFamily::Edge), 0.075),
        ]);

        Self {
            state: Mutex::new(PoolState { profiles, weights }),
        }
    }

    /// Number of identities in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().profiles.len()
    }

    /// Always false; the pool falls back to built-ins when constructed empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().profiles.is_empty()
    }

    /// Current normalized weight of a family.
    #[must_use]
    pub fn family_weight(&self, family: Family) -> f64 {
        self.lock().weight(family)
    }

    /// Picks the next identity.
    #[must_use]
    pub fn get_profile(&self) -> UserAgentProfile {
        self.select_at(Instant::now(), &mut rand::thread_rng())
    }

    /// Picks an identity as of `now` using `rng`.
    pub fn select_at<R: Rng + ?Sized>(&self, now: Instant, rng: &mut R) -> UserAgentProfile {
        let mut state = self.lock();
        state.age_families(now);

        let weights: Vec<f64> = state
            .profiles
            .iter()
            .map(|p| state.weight(Family::Os(p.os)) + state.weight(Family::Browser(p.browser)))
            .collect();
        let index = match WeightedIndex::new(&weights) {
            Ok(distribution) => distribution.sample(rng),
            Err(_) => rng.gen_range(0..state.profiles.len()),
        };

        let profile = &mut state.profiles[index];
        profile.last_used = now;
        trace!(os = %profile.os, browser = %profile.browser, "selected user agent");
        profile.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_builtin_pool_profiles_are_tagged() {
        let pool = UserAgentPool::builtin();
        assert_eq!(pool.len(), BUILTIN_USER_AGENTS.len());

        let state = pool.lock();
        assert!(state.profiles.iter().all(|p| p.os != OsFamily::Other));
        assert!(state.profiles.iter().all(|p| p.browser != BrowserFamily::Other));
    }

    #[test]
    fn test_profile_parsing_detects_families_and_version() {
        let now = Instant::now();
        let edge = UserAgentProfile::parse(BUILTIN_USER_AGENTS[0], now);
        assert_eq!(edge.browser, BrowserFamily::Edge);
        assert_eq!(edge.os, OsFamily::Windows);
        assert_eq!(edge.version, "113.0.1774");

        let ubuntu = UserAgentProfile::parse(
            "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/113.0",
            now,
        );
        assert_eq!(ubuntu.browser, BrowserFamily::Firefox);
        assert_eq!(ubuntu.os, OsFamily::Ubuntu);
        assert_eq!(ubuntu.version, "113.0.0");

        let android = UserAgentProfile::parse(
            "Mozilla/5.0 (Linux; Android 10; CPH1819) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
            now,
        );
        assert_eq!(android.os, OsFamily::Android);
        assert_eq!(android.browser, BrowserFamily::Chrome);
    }

    #[test]
    fn test_selection_returns_pool_member_and_marks_it_used() {
        let pool = UserAgentPool::builtin();
        let mut rng = StdRng::seed_from_u64(7);
        let now = Instant::now() + Duration::from_secs(30);

        let profile = pool.select_at(now, &mut rng);
        assert!(BUILTIN_USER_AGENTS.contains(&profile.user_agent.as_str()));
        assert_eq!(profile.last_used, now);
    }

    #[test]
    fn test_weights_stay_normalized_after_selection() {
        let pool = UserAgentPool::builtin();
        let mut rng = StdRng::seed_from_u64(11);
        let start = Instant::now();
        for step in 1..=20 {
            let _ = pool.select_at(start + Duration::from_secs(step), &mut rng);
            let total: f64 = pool.lock().weights.values().sum();
            assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
        }
    }

    #[test]
    fn test_idle_family_gains_weight() {
        let pool = UserAgentPool::new([
            "Mozilla/5.0 (Windows NT 10.0; rv:109.0) Gecko/20100101 Firefox/113.0",
            "Mozilla/5.0 (Linux; Android 12; SM-A135U) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Mobile Safari/537.36",
        ]);
        let start = Instant::now();
        {
            // Pretend the Android identity was just used while Windows sat idle.
            let mut state = pool.lock();
            state.profiles[1].last_used = start + Duration::from_secs(600);
        }

        let mut rng = StdRng::seed_from_u64(3);
        let _ = pool.select_at(start + Duration::from_secs(600), &mut rng);

        let windows = pool.family_weight(Family::Os(OsFamily::Windows));
        let android = pool.family_weight(Family::Os(OsFamily::Android));
        assert!(windows > android, "windows={windows} android={android}");
    }

    #[test]
    fn test_empty_pool_falls_back_to_builtin() {
        let pool = UserAgentPool::new(Vec::<String>::new());
        assert_eq!(pool.len(), BUILTIN_USER_AGENTS.len());
        assert!(!pool.is_empty());
    }

    #[test]
    fn test_selection_rotates_across_identities() {
        let pool = UserAgentPool::builtin();
        let mut rng = StdRng::seed_from_u64(99);
        let start = Instant::now();
        let distinct: std::collections::HashSet<String> = (1..=40)
            .map(|step| {
                pool.select_at(start + Duration::from_secs(step * 5), &mut rng)
                    .user_agent
            })
            .collect();
        assert!(distinct.len() > 5, "only {} distinct identities", distinct.len());
    }
}
