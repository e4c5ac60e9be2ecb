use std::sync::Arc;

use crate::client::{DogstatsdClient, UdpClient};
use crate::common::BuildError;
use crate::environment::{Environment, SystemEnvironment};
use crate::options::Options;

/// Creates transport clients from [`Options`].
///
/// Every call creates a new client bound to the agent address as resolved at that moment.
pub trait ClientFactory: Send + Sync {
    type Client: DogstatsdClient;

    /// Creates a new transport client.
    ///
    /// ## Errors
    ///
    /// Returns [`BuildError::HostLookup`] if the local host name is needed and cannot be
    /// determined, or [`BuildError::TransportCreation`] if the client cannot be created for
    /// the resolved address.
    fn create(&self, options: &Options) -> Result<Self::Client, BuildError>;
}

/// Factory of [`UdpClient`]s, resolving unset options against an [`Environment`].
#[derive(Clone)]
pub struct UdpClientFactory {
    environment: Arc<dyn Environment>,
}

impl UdpClientFactory {
    /// Creates a factory reading defaults from the process environment.
    pub fn new() -> Self {
        Self::with_environment(Arc::new(SystemEnvironment))
    }

    /// Creates a factory reading defaults from `environment`.
    pub fn with_environment(environment: Arc<dyn Environment>) -> Self {
        UdpClientFactory { environment }
    }
}

impl Default for UdpClientFactory {
    fn default() -> Self {
        UdpClientFactory::new()
    }
}

impl ClientFactory for UdpClientFactory {
    type Client = UdpClient;

    fn create(&self, options: &Options) -> Result<UdpClient, BuildError> {
        let resolved = options.resolve(self.environment.as_ref())?;
        UdpClient::connect(&resolved.address, &resolved.namespace, resolved.tags)
    }
}
