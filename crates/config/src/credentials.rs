//! Secrets resolved once at startup from the environment.

use secrecy::Secret;

use crate::schema::RelayConfig;

/// Env var consulted when the config has no `hook_url`.
pub const HOOK_URL_ENV: &str = "HOOK_URL";
/// Env var consulted when the config has no `hook_token`.
pub const HOOK_TOKEN_ENV: &str = "HOOK_TOKEN";

/// Resolved credentials. Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub bot_token: Option<Secret<String>>,
    pub search_api_key: Option<Secret<String>>,
    pub hook_url: Option<String>,
    pub hook_token: Option<Secret<String>>,
}

impl Credentials {
    /// Resolve from the process environment using the env var names in `config`.
    #[must_use]
    pub fn resolve(config: &RelayConfig) -> Self {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve using a custom lookup, so tests don't touch the process env.
    #[must_use]
    pub fn resolve_with(config: &RelayConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Self {
            bot_token: non_empty(lookup(&config.token_env)).map(Secret::new),
            search_api_key: non_empty(lookup(&config.search_api_key_env)).map(Secret::new),
            hook_url: non_empty(config.hook_url.clone()).or_else(|| non_empty(lookup(HOOK_URL_ENV))),
            hook_token: config
                .hook_token
                .clone()
                .or_else(|| non_empty(lookup(HOOK_TOKEN_ENV)).map(Secret::new)),
        }
    }
}
