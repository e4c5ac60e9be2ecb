//! A DogStatsD client that keeps up with agent address changes.
//!
//! ## Basics
//!
//! `dogstatsd-ttl-client` sends counts, gauges, and timings to a statsd or datadog agent over
//! UDP.  A UDP client resolves the agent address once, when it is created, so it keeps sending
//! to the old address when the agent is rescheduled or its DNS record changes.
//! [`RenewingClient`] works around this by replacing its transport client once it gets older
//! than a TTL, transparently for its callers.
//!
//! ## High-level features
//!
//! - transport client renewal every TTL (one minute by default), safe under concurrent use
//! - defaults from the usual Datadog environment variables: `DD_AGENT_HOST`, `DD_AGENT_PORT`,
//!   `DD_SERVICE` and `DD_TAGS`
//! - `service:<service>` and `pod_name:<hostname>` tags added to every metric
//! - a single [`DogstatsdClient`] trait implemented by renewing and bare clients
//! - a [`metrics`]-compatible recorder
//!
//! ## Behavior
//!
//! - Every operation of a [`RenewingClient`] takes the same lock, renewal included
//! - A failed renewal is returned to the caller, the expired client is kept and renewal is
//!   retried on the next call
//! - Tags are sorted and exact duplicates removed; tags are otherwise sent verbatim
//! - Samples are sent one datagram each, without buffering
//!
//! ## Usage
//!
//! ```ignore
//! use dogstatsd_ttl_client::{ClientBuilder, DogstatsdClient};
//!
//! // Unset options come from the environment, falling back to localhost:8125.
//! let client = ClientBuilder::new()
//!     .set_namespace("checkout")
//!     .with_ttl(std::time::Duration::from_secs(30))
//!     .build()
//!     .expect("failed to build client");
//!
//! client.count("orders", 1, &["region:eu"], 1.0)?;
//! client.time_in_milliseconds("latency", 12.5, &[], 0.1)?;
//!
//! // Or send everything recorded through the `metrics` macros.
//! ClientBuilder::new().install().expect("failed to install recorder");
//! metrics::counter!("orders").increment(1);
//! ```
mod common;
pub use self::common::{BuildError, ClientError};

mod environment;
pub use self::environment::{Environment, StaticEnvironment, SystemEnvironment};

mod options;
pub use self::options::{
    compact_tags, Options, ResolvedOptions, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SERVICE,
    DEFAULT_TAG_HOSTNAME_KEY, DEFAULT_TTL, ENV_AGENT_HOST, ENV_AGENT_PORT, ENV_SERVICE, ENV_TAGS,
};

pub mod formatting;

mod client;
pub use self::client::{DogstatsdClient, UdpClient};

mod factory;
pub use self::factory::{ClientFactory, UdpClientFactory};

mod renewing;
pub use self::renewing::RenewingClient;

mod builder;
pub use self::builder::ClientBuilder;

mod recorder;
pub use self::recorder::DogstatsdRecorder;
