//! Tunables shared by every repository instance of a deployment.

use serde::{Deserialize, Serialize};

/// What [`Repository::search`](crate::Repository::search) does with a query
/// string that is not valid JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedFilterPolicy {
    /// Fail with [`RepositoryError::MalformedFilter`](crate::RepositoryError::MalformedFilter).
    #[default]
    Reject,
    /// Log a warning and search as if no user filter had been given.
    /// The security filter still applies.
    MatchAll,
}

/// Repository behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Documents written concurrently by `upsert`; `1` writes sequentially.
    pub write_concurrency: usize,
    /// Handling of malformed search JSON.
    pub malformed_filter: MalformedFilterPolicy,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            write_concurrency: 1,
            malformed_filter: MalformedFilterPolicy::Reject,
        }
    }
}

impl RepositorySettings {
    /// Set the write concurrency (values below 1 are treated as 1).
    #[must_use]
    pub const fn with_write_concurrency(mut self, write_concurrency: usize) -> Self {
        self.write_concurrency = write_concurrency;
        self
    }

    /// Set the malformed filter policy.
    #[must_use]
    pub const fn with_malformed_filter(mut self, policy: MalformedFilterPolicy) -> Self {
        self.malformed_filter = policy;
        self
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_partial_yaml() {
        assert_eq!(RepositorySettings::default().write_concurrency, 1);

        let settings: RepositorySettings =
            serde_yml::from_str("malformed_filter: match_all").expect("valid yaml");
        assert_eq!(settings.write_concurrency, 1);
        assert_eq!(settings.malformed_filter, MalformedFilterPolicy::MatchAll);
    }
}
