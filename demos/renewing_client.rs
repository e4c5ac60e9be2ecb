use std::process;
use std::thread::sleep;
use std::time::Duration;

use clap::Parser;
use dogstatsd_ttl_client::{ClientBuilder, ClientError, DogstatsdClient};
use tracing::{error, info};

const INTERVAL: Duration = Duration::from_secs(5);

/// Sends a count to the DogStatsD agent every five seconds.
#[derive(Debug, Parser)]
struct Args {
    /// Log metrics instead of sending them.
    #[arg(long)]
    mock: bool,

    /// Sample rate.
    #[arg(long, default_value_t = 1.0)]
    sample_rate: f64,

    /// Namespace.
    #[arg(long, default_value = "namespace1")]
    namespace: String,

    /// Space-delimited tags.
    #[arg(long, default_value = "k1:v1 k2:v2")]
    tags: String,
}

struct LoggingClient;

impl DogstatsdClient for LoggingClient {
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ClientError> {
        info!(name, value, ?tags, rate, "mock count");
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ClientError> {
        info!(name, value, ?tags, rate, "mock gauge");
        Ok(())
    }

    fn time_in_milliseconds(
        &self,
        name: &str,
        value: f64,
        tags: &[&str],
        rate: f64,
    ) -> Result<(), ClientError> {
        info!(name, value, ?tags, rate, "mock timing");
        Ok(())
    }

    fn close(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    info!(?args, "flags");

    let client: Box<dyn DogstatsdClient> = if args.mock {
        Box::new(LoggingClient)
    } else {
        match ClientBuilder::new()
            .set_namespace(args.namespace.as_str())
            .with_debug(true)
            .build()
        {
            Ok(client) => Box::new(client),
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        }
    };

    let tags: Vec<&str> = args.tags.split_whitespace().collect();

    loop {
        send(client.as_ref(), "metric1", 3, &tags, args.sample_rate);
        sleep(INTERVAL);
    }
}

fn send(client: &dyn DogstatsdClient, metric: &str, value: i64, tags: &[&str], rate: f64) {
    info!("sending COUNT name={} value={}", metric, value);
    if let Err(e) = client.count(metric, value, tags, rate) {
        error!("failed to send {}: {}", metric, e);
    }
}
