use std::{collections::BTreeMap, env, fmt};

use quanta::Clock;
use tracing::warn;

const MIN_KEY_LEN: usize = 2;
const MAX_KEY_LEN: usize = 60;
const MIN_VALUE_LEN: usize = 1;
const MAX_VALUE_LEN: usize = 120;

/// Environment variables that map to common tags, as `(variable, tag key)` pairs.
pub const ENV_TAGS: [(&str, &str); 2] =
    [("TITUS_CONTAINER_NAME", "nf.container"), ("NETFLIX_PROCESS_NAME", "nf.process")];

/// Returns `true` if the tag's key and value have acceptable lengths.
///
/// Keys must be between 2 and 60 characters long, and values between 1 and 120.
pub fn is_valid_tag(key: &str, value: &str) -> bool {
    let key_len = key.chars().count();
    let value_len = value.chars().count();
    (MIN_KEY_LEN..=MAX_KEY_LEN).contains(&key_len)
        && (MIN_VALUE_LEN..=MAX_VALUE_LEN).contains(&value_len)
}

/// Keeps only the valid tags, logging the ones that are dropped.
pub fn validate_tags<I, K, V>(tags: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    tags.into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .filter(|(k, v)| {
            let valid = is_valid_tag(k, v);
            if !valid {
                warn!(key = %k, value = %v, "Dropping invalid common tag.");
            }
            valid
        })
        .collect()
}

/// Collects common tags from the environment using `lookup` to read variables.
///
/// Values are trimmed, and empty values are ignored.
pub fn tags_from_env_with<F>(lookup: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    ENV_TAGS
        .iter()
        .filter_map(|(var, key)| {
            let value = lookup(var)?;
            let value = value.trim();
            (!value.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Collects common tags from the process environment.
pub fn tags_from_env() -> BTreeMap<String, String> {
    tags_from_env_with(|var| env::var(var).ok())
}

/// Configuration of a [`Registry`](crate::Registry).
#[derive(Clone)]
pub struct RegistryConfig {
    common_tags: BTreeMap<String, String>,
    clock: Clock,
}

impl RegistryConfig {
    /// Creates a configuration without common tags.
    pub fn new() -> Self {
        Self { common_tags: BTreeMap::new(), clock: Clock::new() }
    }

    /// Adds a tag to every identity created through the registry.
    ///
    /// Invalid tags are dropped with a warning.
    #[must_use]
    pub fn with_common_tag<K, V>(self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.with_common_tags([(key, value)])
    }

    /// Adds several common tags.  Invalid tags are dropped with a warning.
    #[must_use]
    pub fn with_common_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.common_tags.extend(validate_tags(tags));
        self
    }

    /// Adds the common tags found in the process environment, replacing configured values.
    ///
    /// See [`ENV_TAGS`] for the variables that are read.
    #[must_use]
    pub fn with_env_tags(self) -> Self {
        self.with_env_tags_from(|var| env::var(var).ok())
    }

    /// Same as [`with_env_tags`](Self::with_env_tags), reading variables through `lookup`.
    #[must_use]
    pub fn with_env_tags_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.common_tags.extend(tags_from_env_with(lookup));
        self
    }

    /// Sets the clock used by timers created through the registry.
    ///
    /// Defaults to the real clock.  A mocked clock can be used in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Tags added to every identity.
    pub fn common_tags(&self) -> &BTreeMap<String, String> {
        &self.common_tags
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig").field("common_tags", &self.common_tags).finish_non_exhaustive()
    }
}
