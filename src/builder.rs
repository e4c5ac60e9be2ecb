use std::sync::Arc;
use std::time::Duration;

use crate::client::UdpClient;
use crate::common::BuildError;
use crate::environment::{Environment, SystemEnvironment};
use crate::factory::{ClientFactory, UdpClientFactory};
use crate::options::Options;
use crate::recorder::DogstatsdRecorder;
use crate::renewing::RenewingClient;

use quanta::Clock;

/// Builder for creating DogStatsD clients and installing them as the global recorder.
pub struct ClientBuilder {
    options: Options,
    environment: Arc<dyn Environment>,
    clock: Clock,
}

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] reading unset options from the process environment.
    pub fn new() -> Self {
        Self::from_options(Options::default())
    }

    /// Creates a new [`ClientBuilder`] starting from `options`.
    pub fn from_options(options: Options) -> Self {
        ClientBuilder {
            options,
            environment: Arc::new(SystemEnvironment),
            clock: Clock::new(),
        }
    }

    /// Sets the agent host.
    ///
    /// Defaults to `DD_AGENT_HOST`, or `localhost` if that is unset.
    #[must_use]
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.options.host = Some(host.into());
        self
    }

    /// Sets the agent port.
    ///
    /// Defaults to `DD_AGENT_PORT`, or `8125` if that is unset.
    #[must_use]
    pub fn with_port<P: ToString>(mut self, port: P) -> Self {
        self.options.port = Some(port.to_string());
        self
    }

    /// Sets the namespace prepended to every metric name.
    #[must_use]
    pub fn set_namespace<N: Into<String>>(mut self, namespace: N) -> Self {
        self.options.namespace = namespace.into();
        self
    }

    /// Sets the service, sent as the `service:<service>` tag.
    ///
    /// Defaults to `DD_SERVICE`, or `service-unknown` if that is unset.
    #[must_use]
    pub fn with_service<S: Into<String>>(mut self, service: S) -> Self {
        self.options.service = Some(service.into());
        self
    }

    /// Adds a tag, in the `key:value` form, sent with every metric.
    ///
    /// If no tag is added, tags are read from the space-delimited `DD_TAGS`.
    #[must_use]
    pub fn add_tag<T: Into<String>>(mut self, tag: T) -> Self {
        self.options.tags.push(tag.into());
        self
    }

    /// Sets the key of the host name tag. Defaults to `pod_name`.
    #[must_use]
    pub fn with_tag_hostname_key<K: Into<String>>(mut self, key: K) -> Self {
        self.options.tag_hostname_key = Some(key.into());
        self
    }

    /// Disables the `<key>:<hostname>` tag.
    #[must_use]
    pub fn disable_tag_hostname(mut self) -> Self {
        self.options.disable_tag_hostname = true;
        self
    }

    /// Enables diagnostic logging of resolved options, renewals, and sent metrics.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Sets the maximum lifetime of the transport client of a [`RenewingClient`].
    ///
    /// Defaults to one minute.  Ignored by [`build_unsafe`][Self::build_unsafe].
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = ttl;
        self
    }

    /// Sets where unset options are read from.
    #[must_use]
    pub fn with_environment<E: Environment + 'static>(mut self, environment: E) -> Self {
        self.environment = Arc::new(environment);
        self
    }

    /// Builds a client that renews its transport client every TTL.
    ///
    /// ## Errors
    ///
    /// If the host name tag is enabled and the local host name cannot be looked up, or the
    /// transport client cannot be created for the agent address, an error variant will be
    /// returned describing the error.
    pub fn build(self) -> Result<RenewingClient, BuildError> {
        let factory = UdpClientFactory::with_environment(self.environment);
        RenewingClient::with_clock(self.options, factory, self.clock)
    }

    /// Builds a client that renews its transport client through `factory`.
    ///
    /// The builder's environment is not used, `factory` is responsible for resolving options.
    ///
    /// ## Errors
    ///
    /// If the factory fails to create the first transport client, its error is returned.
    pub fn build_with_factory<F: ClientFactory>(
        self,
        factory: F,
    ) -> Result<RenewingClient<F>, BuildError> {
        RenewingClient::with_clock(self.options, factory, self.clock)
    }

    /// Builds a bare transport client which is never renewed.
    ///
    /// The client keeps sending to the agent address resolved here, even after the agent moves.
    /// Prefer [`build`][Self::build] unless address changes are handled elsewhere.
    ///
    /// ## Errors
    ///
    /// Same as [`build`][Self::build].
    pub fn build_unsafe(self) -> Result<UdpClient, BuildError> {
        UdpClientFactory::with_environment(self.environment).create(&self.options)
    }

    /// Builds a [`RenewingClient`] and installs a recorder sending through it as the global
    /// [`metrics`] recorder.
    ///
    /// ## Errors
    ///
    /// If there is an error while either building the client, or installing the recorder, an
    /// error variant will be returned describing the error.
    pub fn install(self) -> Result<(), BuildError> {
        let recorder = DogstatsdRecorder::new(self.build()?);
        metrics::set_global_recorder(recorder)
            .map_err(|e| BuildError::FailedToInstall(e.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder::new()
    }
}
