use chronicle_provider::PermissionMode;

use crate::retry::RetryPolicy;

/// Selects whether the engine's providers call a live SDK or replay a
/// recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Call the underlying provider, optionally capturing a recording.
    Live,
    /// Replay a previously captured recording; never touches the network.
    Playback,
}

/// Driver-wide configuration: a plain struct with a [`ConfigBuilder`] for
/// ergonomic construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether providers run live or from a recording.
    pub provider_mode: ProviderMode,
    /// SQLite file path, or `:memory:`.
    pub database_url: String,
    /// Run schema migrations automatically on open.
    pub auto_migrate: bool,
    /// Per-activation deadline in milliseconds.
    pub task_timeout_ms: u64,
    /// Backoff policy for transient provider errors.
    pub retry: RetryPolicy,
    /// Permission mode passed through to providers.
    pub permission_mode: PermissionMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_mode: ProviderMode::Live,
            database_url: ":memory:".to_string(),
            auto_migrate: true,
            task_timeout_ms: 300_000,
            retry: RetryPolicy::default(),
            permission_mode: PermissionMode::BypassPermissions,
        }
    }
}

impl Config {
    /// Start building a config from defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from `CHRONICLE_*` environment variables,
    /// falling back to [`Config::default`] for anything unset or
    /// unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(mode) = std::env::var("CHRONICLE_PROVIDER_MODE") {
            match mode.as_str() {
                "live" => config.provider_mode = ProviderMode::Live,
                "playback" => config.provider_mode = ProviderMode::Playback,
                other => tracing::warn!(value = other, "ignoring unrecognized CHRONICLE_PROVIDER_MODE"),
            }
        }
        if let Ok(url) = std::env::var("CHRONICLE_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(value) = std::env::var("CHRONICLE_AUTO_MIGRATE") {
            if let Ok(parsed) = value.parse() {
                config.auto_migrate = parsed;
            }
        }
        if let Ok(value) = std::env::var("CHRONICLE_TASK_TIMEOUT_MS") {
            if let Ok(parsed) = value.parse() {
                config.task_timeout_ms = parsed;
            }
        }
        if let Ok(mode) = std::env::var("CHRONICLE_PERMISSION_MODE") {
            match mode.as_str() {
                "bypassPermissions" => config.permission_mode = PermissionMode::BypassPermissions,
                "askUser" => config.permission_mode = PermissionMode::AskUser,
                other => tracing::warn!(value = other, "ignoring unrecognized CHRONICLE_PERMISSION_MODE"),
            }
        }

        config
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the provider mode.
    #[must_use]
    pub fn provider_mode(mut self, mode: ProviderMode) -> Self {
        self.config.provider_mode = mode;
        self
    }

    /// Set the database URL.
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    /// Set whether migrations run automatically.
    #[must_use]
    pub fn auto_migrate(mut self, auto_migrate: bool) -> Self {
        self.config.auto_migrate = auto_migrate;
        self
    }

    /// Set the per-activation timeout.
    #[must_use]
    pub fn task_timeout_ms(mut self, ms: u64) -> Self {
        self.config.task_timeout_ms = ms;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the permission mode.
    #[must_use]
    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.config.permission_mode = mode;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.task_timeout_ms, 300_000);
        assert!(config.auto_migrate);
        assert_eq!(config.retry.max_attempts, 10);
    }

    #[test]
    fn builder_overrides_only_what_is_set() {
        let config = Config::builder().database_url("/tmp/chronicle.db").build();
        assert_eq!(config.database_url, "/tmp/chronicle.db");
        assert_eq!(config.task_timeout_ms, 300_000);
    }
}
