use std::io;

use thiserror::Error;

/// Errors that could occur while building or installing a DogStatsD client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The local host name could not be looked up for the host name tag.
    #[error("failed to look up local host name: {0}")]
    HostLookup(#[source] io::Error),

    /// The transport client could not be created for the resolved agent address.
    #[error("failed to create transport client for '{address}': {source}")]
    TransportCreation {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Installing the recorder as the global recorder failed.
    #[error("failed to install recorder: {0}")]
    FailedToInstall(String),
}

impl BuildError {
    pub(crate) fn transport<A: Into<String>>(address: A, source: io::Error) -> Self {
        BuildError::TransportCreation {
            address: address.into(),
            source,
        }
    }
}

/// Errors returned by emission and close operations of a [`DogstatsdClient`][crate::DogstatsdClient].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client had expired and building its replacement failed.
    ///
    /// The expired client is kept and renewal is attempted again on the next call.
    #[error("failed to renew client: {0}")]
    Renewal(#[from] BuildError),

    /// The datagram could not be written to the local socket.
    #[error("failed to send metric: {0}")]
    Send(#[from] io::Error),

    /// The client was explicitly closed.
    #[error("client is closed")]
    Closed,
}
