use std::{collections::BTreeMap, fmt};

use crate::measurement::Statistic;

/// Tag key holding the statistic a measurement reports.
pub const STATISTIC_TAG: &str = "statistic";

/// Identity of a meter: a name plus a set of tags.
///
/// Tags are kept sorted by key, so two identities built from the same tags in a different order
/// are equal and hash the same way.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id {
    name: String,
    tags: BTreeMap<String, String>,
}

impl Id {
    /// Creates a new `Id` with the given name and tags.
    ///
    /// When a tag key appears more than once, the last value wins.
    pub fn new<N, I, K, V>(name: N, tags: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let tags = tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { name: name.into(), tags }
    }

    /// Creates a new `Id` with the given name and no tags.
    pub fn from_name<N: Into<String>>(name: N) -> Self {
        Self { name: name.into(), tags: BTreeMap::new() }
    }

    /// Name of the meter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags of the meter, sorted by key.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Returns the value of the tag `key`, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns a copy of this `Id` with one more tag, replacing any existing value for `key`.
    #[must_use]
    pub fn with_tag<K, V>(&self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut id = self.clone();
        id.tags.insert(key.into(), value.into());
        id
    }

    /// Returns a copy of this `Id` with the given tags added, replacing existing values.
    #[must_use]
    pub fn with_tags<I, K, V>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut id = self.clone();
        id.tags.extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        id
    }

    /// Returns a copy of this `Id` tagged with `statistic`.
    #[must_use]
    pub fn with_stat(&self, statistic: Statistic) -> Self {
        self.with_tag(STATISTIC_TAG, statistic.as_str())
    }

    /// Returns a copy of this `Id` tagged with `statistic`, unless it already has a statistic.
    #[must_use]
    pub fn with_default_stat(&self, statistic: Statistic) -> Self {
        if self.tags.contains_key(STATISTIC_TAG) {
            self.clone()
        } else {
            self.with_stat(statistic)
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (k, v) in &self.tags {
            write!(f, ",{}={}", k, v)?;
        }
        Ok(())
    }
}
