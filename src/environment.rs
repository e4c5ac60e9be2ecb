//! Access to the process environment used for configuration defaults.
use std::collections::HashMap;
use std::io;

use tracing::debug;

/// Source of environment-style configuration values and of the local host name.
///
/// Client factories never read ambient process state directly, they go through an
/// [`Environment`].  [`SystemEnvironment`] is what production code uses, while
/// [`StaticEnvironment`] allows fully deterministic configuration.
pub trait Environment: Send + Sync {
    /// Returns the value of the variable `name`, or `None` if it is unset.
    fn var(&self, name: &str) -> Option<String>;

    /// Returns the network host name of the local machine.
    fn hostname(&self) -> io::Result<String>;
}

/// Reads `name` from `env`, falling back to `default` when unset or empty.
pub(crate) fn env_string(env: &dyn Environment, name: &str, default: &str) -> String {
    let raw = env.var(name).unwrap_or_default();
    let value = if raw.is_empty() {
        default.to_string()
    } else {
        raw.clone()
    };
    debug!(
        variable = name,
        raw = raw.as_str(),
        using = value.as_str(),
        default,
        "resolved environment variable"
    );
    value
}

/// The environment of the running process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    #[cfg(unix)]
    fn hostname(&self) -> io::Result<String> {
        let name = nix::unistd::gethostname().map_err(io::Error::from)?;
        Ok(name.to_string_lossy().to_string())
    }

    #[cfg(not(unix))]
    fn hostname(&self) -> io::Result<String> {
        let name = gethostname::gethostname();
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "empty host name"));
        }
        Ok(name.to_string_lossy().to_string())
    }
}

/// A fixed, in-memory environment.
///
/// Unless a host name is set, host name lookups fail with [`io::ErrorKind::NotFound`].
#[derive(Clone, Debug, Default)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
    hostname: Option<String>,
}

impl StaticEnvironment {
    /// Creates an empty environment without a host name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the variable `name` to `value`.
    #[must_use]
    pub fn with_var<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Sets the host name returned by [`Environment::hostname`].
    #[must_use]
    pub fn with_hostname<H: Into<String>>(mut self, hostname: H) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}

impl Environment for StaticEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn hostname(&self) -> io::Result<String> {
        self.hostname
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no host name configured"))
    }
}
