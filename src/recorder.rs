use std::sync::Arc;

use crate::client::DogstatsdClient;
use crate::common::ClientError;
use crate::formatting::sanitize_metric_name;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use portable_atomic::{AtomicF64, AtomicU64, Ordering};
use tracing::error;

/// A [`metrics`] recorder sending every update straight through a [`DogstatsdClient`].
///
/// Nothing is aggregated locally:
///
/// - counter increments are sent as counts, absolute counter values as the positive difference
///   with the last absolute value
/// - gauges keep their current value locally and send it after every update
/// - histogram samples are sent as timings in milliseconds
///
/// Key names are sanitized to the DogStatsD naming rules, while labels of the metric key are sent
/// as `key:value` tags.  Since metric handles cannot report failures, send errors are logged and
/// dropped.
pub struct DogstatsdRecorder<C> {
    client: Arc<C>,
}

impl<C: DogstatsdClient + 'static> DogstatsdRecorder<C> {
    /// Creates a recorder over `client`.
    pub fn new(client: C) -> Self {
        Self::from_shared(Arc::new(client))
    }

    /// Creates a recorder over a client also used elsewhere.
    pub fn from_shared(client: Arc<C>) -> Self {
        DogstatsdRecorder { client }
    }

    /// The client samples are sent through.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    fn handle(&self, key: &Key) -> Arc<Handle<C>> {
        let tags = key
            .labels()
            .map(|label| format!("{}:{}", label.key(), label.value()))
            .collect();
        Arc::new(Handle {
            client: self.client.clone(),
            name: sanitize_metric_name(key.name()),
            tags,
            last_absolute: AtomicU64::new(0),
            gauge: AtomicF64::new(0.0),
        })
    }
}

struct Handle<C> {
    client: Arc<C>,
    name: String,
    tags: Vec<String>,
    last_absolute: AtomicU64,
    gauge: AtomicF64,
}

impl<C: DogstatsdClient> Handle<C> {
    fn send<S>(&self, send: S)
    where
        S: FnOnce(&C, &str, &[&str]) -> Result<(), ClientError>,
    {
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        if let Err(e) = send(&self.client, &self.name, &tags) {
            error!(name = self.name.as_str(), error = %e, "failed to send metric");
        }
    }

    fn send_gauge(&self, value: f64) {
        self.send(|c, name, tags| c.gauge(name, value, tags, 1.0));
    }
}

impl<C: DogstatsdClient> CounterFn for Handle<C> {
    fn increment(&self, value: u64) {
        let value = i64::try_from(value).unwrap_or(i64::MAX);
        self.send(|c, name, tags| c.count(name, value, tags, 1.0));
    }

    fn absolute(&self, value: u64) {
        let previous = self.last_absolute.swap(value, Ordering::AcqRel);
        if value > previous {
            CounterFn::increment(self, value - previous);
        }
    }
}

impl<C: DogstatsdClient> GaugeFn for Handle<C> {
    fn increment(&self, value: f64) {
        let current = self.gauge.fetch_add(value, Ordering::AcqRel) + value;
        self.send_gauge(current);
    }

    fn decrement(&self, value: f64) {
        let current = self.gauge.fetch_sub(value, Ordering::AcqRel) - value;
        self.send_gauge(current);
    }

    fn set(&self, value: f64) {
        self.gauge.store(value, Ordering::Release);
        self.send_gauge(value);
    }
}

impl<C: DogstatsdClient> HistogramFn for Handle<C> {
    fn record(&self, value: f64) {
        self.send(|c, name, tags| c.time_in_milliseconds(name, value, tags, 1.0));
    }
}

impl<C: DogstatsdClient + 'static> Recorder for DogstatsdRecorder<C> {
    fn describe_counter(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}
    fn describe_gauge(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}
    fn describe_histogram(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.handle(key))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.handle(key))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.handle(key))
    }
}

#[cfg(test)]
mod tests {
    use super::DogstatsdRecorder;
    use crate::client::{DogstatsdClient, UdpClient};
    use metrics::{Key, Label, Level, Metadata, Recorder};
    use std::net::UdpSocket;
    use std::time::Duration;

    static METADATA: Metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

    fn setup() -> (UdpSocket, DogstatsdRecorder<UdpClient>) {
        let agent = UdpSocket::bind("127.0.0.1:0").unwrap();
        agent
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let address = agent.local_addr().unwrap().to_string();
        let client = UdpClient::connect(&address, "app", vec!["service:svc".to_string()]).unwrap();
        (agent, DogstatsdRecorder::new(client))
    }

    fn recv(agent: &UdpSocket) -> String {
        let mut buf = [0u8; 1500];
        let n = agent.recv(&mut buf).unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn test_counter() {
        let (agent, recorder) = setup();
        let key = Key::from_parts("basic.counter", vec![Label::new("wutang", "forever")]);
        let counter = recorder.register_counter(&key, &METADATA);

        counter.increment(42);
        assert_eq!(
            recv(&agent),
            "app.basic.counter:42|c|#service:svc,wutang:forever\n"
        );

        counter.absolute(10);
        assert_eq!(
            recv(&agent),
            "app.basic.counter:10|c|#service:svc,wutang:forever\n"
        );
        counter.absolute(4);
        counter.absolute(16);
        assert_eq!(
            recv(&agent),
            "app.basic.counter:12|c|#service:svc,wutang:forever\n"
        );
    }

    #[test]
    fn test_gauge() {
        let (agent, recorder) = setup();
        let gauge = recorder.register_gauge(&Key::from_name("basic.gauge"), &METADATA);

        gauge.set(-3.5);
        assert_eq!(recv(&agent), "app.basic.gauge:-3.5|g|#service:svc\n");
        gauge.increment(4.5);
        assert_eq!(recv(&agent), "app.basic.gauge:1|g|#service:svc\n");
        gauge.decrement(0.5);
        assert_eq!(recv(&agent), "app.basic.gauge:0.5|g|#service:svc\n");
    }

    #[test]
    fn test_histogram() {
        let (agent, recorder) = setup();
        let histogram = recorder.register_histogram(&Key::from_name("basic.latency"), &METADATA);

        histogram.record(12.0);
        assert_eq!(recv(&agent), "app.basic.latency:12|ms|#service:svc\n");
    }

    #[test]
    fn test_sanitized_name() {
        let (agent, recorder) = setup();
        let counter = recorder.register_counter(&Key::from_name("yee_haw:lets go"), &METADATA);

        counter.increment(1);
        assert_eq!(recv(&agent), "app.yee_haw_lets_go:1|c|#service:svc\n");
    }

    #[test]
    fn test_closed_client_is_logged() {
        let (_agent, recorder) = setup();
        recorder.client().close().unwrap();
        let counter = recorder.register_counter(&Key::from_name("dropped"), &METADATA);
        counter.increment(1);
    }
}
