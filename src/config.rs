//! Configuration for atomstore
//!
//! Options for atomic writes, transient-error retries and the
//! cross-process lock, with sensible defaults and builder-style setters.

use std::io;
use std::time::Duration;

/// Options controlling a single atomic write
///
/// Constructed once per write call by layering caller overrides onto
/// [`AtomicWriteOptions::default`]; never persisted.
#[derive(Debug, Clone)]
pub struct AtomicWriteOptions {
    /// fsync the temp file before renaming it over the target
    pub fsync: bool,

    /// Skip copying the original file's owner/group onto the replacement
    pub disable_chown: bool,

    /// Skip copying the original file's permission bits onto the replacement
    pub disable_chmod: bool,

    /// Transient-error retry policy applied to every filesystem primitive
    pub retry: RetryPolicy,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self {
        Self {
            fsync: false,
            disable_chown: false,
            disable_chmod: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl AtomicWriteOptions {
    pub fn fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn disable_chown(mut self, disable: bool) -> Self {
        self.disable_chown = disable;
        self
    }

    pub fn disable_chmod(mut self, disable: bool) -> Self {
        self.disable_chmod = disable;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Ordered list of retry rules
///
/// The first rule matching the current platform and the observed error
/// kind wins; errors matching no rule propagate immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub rules: Vec<RetryRule>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient_windows_errors()
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    /// The default policy: Windows intermittently fails rename/unlink/open
    /// with permission errors when a file was very recently closed or is
    /// concurrently accessed; retry those for a bounded window.
    pub fn transient_windows_errors() -> Self {
        Self {
            rules: vec![RetryRule {
                platforms: vec!["windows".into()],
                kinds: vec![io::ErrorKind::PermissionDenied],
                retry_interval: Duration::from_millis(100),
                retry_timeout: Duration::from_secs(10),
            }],
        }
    }

    pub fn rule(mut self, rule: RetryRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Find the first rule applicable to `error` on the current platform.
    pub fn matching(&self, error: &io::Error) -> Option<&RetryRule> {
        self.matching_on(error, std::env::consts::OS)
    }

    pub(crate) fn matching_on(&self, error: &io::Error, platform: &str) -> Option<&RetryRule> {
        self.rules
            .iter()
            .find(|rule| rule.applies_to(platform) && rule.kinds.contains(&error.kind()))
    }
}

/// One retry rule: applicable platforms, error kinds, backoff interval
/// and the total window after which the original error is surfaced.
#[derive(Debug, Clone)]
pub struct RetryRule {
    /// Platform names as reported by `std::env::consts::OS`
    pub platforms: Vec<String>,

    /// Error kinds considered transient under this rule
    pub kinds: Vec<io::ErrorKind>,

    /// Delay between attempts
    pub retry_interval: Duration,

    /// Give up once elapsed time exceeds this
    pub retry_timeout: Duration,
}

impl RetryRule {
    fn applies_to(&self, platform: &str) -> bool {
        self.platforms.iter().any(|p| p == platform)
    }
}

/// Options for the advisory cross-process lock
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Delay between acquisition attempts while the lock is held elsewhere
    pub poll_interval: Duration,

    /// Give up after this long; `None` polls forever
    pub timeout: Option<Duration>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl LockOptions {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}
