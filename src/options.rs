use std::time::Duration;

use crate::common::BuildError;
use crate::environment::{env_string, Environment};

use tracing::info;

pub const ENV_AGENT_HOST: &str = "DD_AGENT_HOST";
pub const ENV_AGENT_PORT: &str = "DD_AGENT_PORT";
pub const ENV_SERVICE: &str = "DD_SERVICE";
pub const ENV_TAGS: &str = "DD_TAGS";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: &str = "8125";
pub const DEFAULT_SERVICE: &str = "service-unknown";
pub const DEFAULT_TAG_HOSTNAME_KEY: &str = "pod_name";
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Configuration used to create DogStatsD transport clients.
///
/// Every unset field falls back to the environment, see [`Options::resolve`].
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Agent host. Defaults to `DD_AGENT_HOST`, then `localhost`.
    pub host: Option<String>,
    /// Agent port. Defaults to `DD_AGENT_PORT`, then `8125`.
    pub port: Option<String>,
    /// Prefix prepended to every metric name.
    pub namespace: String,
    /// Service name, sent as the `service:<service>` tag. Defaults to `DD_SERVICE`, then
    /// `service-unknown`.
    pub service: Option<String>,
    /// Tags attached to every metric. Defaults to the space-delimited `DD_TAGS` when empty.
    pub tags: Vec<String>,
    /// Key of the host name tag. Defaults to `pod_name`.
    pub tag_hostname_key: Option<String>,
    /// Prevents adding the `<tag_hostname_key>:<hostname>` tag.
    pub disable_tag_hostname: bool,
    /// Enables diagnostic logging.
    pub debug: bool,
    /// Maximum lifetime of a transport client owned by a [`RenewingClient`][crate::RenewingClient].
    /// Zero means [`DEFAULT_TTL`]. Ignored by unwrapped clients.
    pub ttl: Duration,
}

/// Fully resolved configuration for a single transport client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedOptions {
    /// `host:port` of the agent.
    pub address: String,
    pub namespace: String,
    pub service: String,
    /// Sorted tags with exact duplicates removed.
    pub tags: Vec<String>,
}

impl Options {
    /// Returns the TTL a renewing client uses for these options.
    pub fn effective_ttl(&self) -> Duration {
        if self.ttl.is_zero() {
            DEFAULT_TTL
        } else {
            self.ttl
        }
    }

    /// Resolves these options against `env`.
    ///
    /// Unset fields are filled in the order host, port, service, tags.  Unless disabled, the
    /// host name tag is added, then the service tag, and finally the tags are sorted and exact
    /// duplicates removed.
    ///
    /// ## Errors
    ///
    /// Returns [`BuildError::HostLookup`] if host name tagging is enabled and the local host
    /// name cannot be determined.
    pub fn resolve(&self, env: &dyn Environment) -> Result<ResolvedOptions, BuildError> {
        let host = non_empty(&self.host)
            .map(str::to_string)
            .unwrap_or_else(|| env_string(env, ENV_AGENT_HOST, DEFAULT_HOST));
        let port = non_empty(&self.port)
            .map(str::to_string)
            .unwrap_or_else(|| env_string(env, ENV_AGENT_PORT, DEFAULT_PORT));
        let service = non_empty(&self.service)
            .map(str::to_string)
            .unwrap_or_else(|| env_string(env, ENV_SERVICE, DEFAULT_SERVICE));

        let mut tags = if self.tags.is_empty() {
            env_string(env, ENV_TAGS, "")
                .split_whitespace()
                .map(str::to_string)
                .collect()
        } else {
            self.tags.clone()
        };

        if !self.disable_tag_hostname {
            let key = non_empty(&self.tag_hostname_key).unwrap_or(DEFAULT_TAG_HOSTNAME_KEY);
            let hostname = env.hostname().map_err(BuildError::HostLookup)?;
            tags.push(format!("{}:{}", key, hostname));
        }

        tags.push(format!("service:{}", service));
        compact_tags(&mut tags);

        let resolved = ResolvedOptions {
            address: format!("{}:{}", host, port),
            namespace: self.namespace.clone(),
            service,
            tags,
        };

        if self.debug {
            info!(
                address = resolved.address.as_str(),
                namespace = resolved.namespace.as_str(),
                service = resolved.service.as_str(),
                tags = ?resolved.tags,
                "resolved client options"
            );
        }

        Ok(resolved)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Sorts `tags` and drops exact duplicates.
pub fn compact_tags(tags: &mut Vec<String>) {
    tags.sort_unstable();
    tags.dedup();
}
