use std::fmt::{self, Display};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::client::DogstatsdClient;
use crate::common::{BuildError, ClientError};
use crate::factory::{ClientFactory, UdpClientFactory};
use crate::options::Options;

use portable_atomic::{AtomicU64, Ordering};
use quanta::{Clock, Instant};
use tracing::{info, warn};

struct State<C> {
    client: C,
    created_at: Instant,
    closed: bool,
}

/// A DogStatsD client that replaces its transport client once it gets older than a TTL.
///
/// Transport clients resolve the agent address only when they are created, so a long-lived
/// client keeps sending to a stale address after the agent moves.  [`RenewingClient`] creates a
/// fresh transport client through its [`ClientFactory`] whenever an operation finds the current
/// one expired, then closes the old one.
///
/// All operations, renewal included, run under a single lock: no sample is ever sent through a
/// client that is being replaced, and every superseded client is closed exactly once.
///
/// If renewal fails, the calling operation returns the error and the expired client is kept, so
/// the next call simply tries again.
pub struct RenewingClient<F: ClientFactory = UdpClientFactory> {
    factory: F,
    options: Options,
    ttl: Duration,
    clock: Clock,
    state: Mutex<State<F::Client>>,
    renewals: AtomicU64,
}

impl<F: ClientFactory> RenewingClient<F> {
    /// Creates a renewing client, eagerly creating its first transport client.
    ///
    /// ## Errors
    ///
    /// Returns the factory error if the first transport client cannot be created.
    pub fn new(options: Options, factory: F) -> Result<Self, BuildError> {
        Self::with_clock(options, factory, Clock::new())
    }

    pub(crate) fn with_clock(
        options: Options,
        factory: F,
        clock: Clock,
    ) -> Result<Self, BuildError> {
        let ttl = options.effective_ttl();
        if options.debug && options.ttl != ttl {
            info!(new_ttl = ?ttl, old_ttl = ?options.ttl, "using default client TTL");
        }

        let client = factory.create(&options)?;
        let state = State {
            client,
            created_at: clock.now(),
            closed: false,
        };

        Ok(RenewingClient {
            factory,
            options,
            ttl,
            clock,
            state: Mutex::new(state),
            renewals: AtomicU64::new(1),
        })
    }

    /// The maximum age of a transport client before it gets replaced.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of transport clients created so far, including the first one.
    pub fn renewals(&self) -> u64 {
        self.renewals.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, State<F::Client>> {
        // State is swapped as a whole, so a panicking holder cannot leave it half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the current client if it has expired.  Must be called with the lock held.
    fn renew_if_expired(&self, state: &mut State<F::Client>) -> Result<(), BuildError> {
        let now = self.clock.now();
        if now.saturating_duration_since(state.created_at) < self.ttl {
            return Ok(());
        }

        if self.options.debug {
            info!(ttl = ?self.ttl, "client has expired, renewing");
        }

        let client = self.factory.create(&self.options)?;
        let previous = std::mem::replace(&mut state.client, client);
        state.created_at = self.clock.now();
        self.renewals.fetch_add(1, Ordering::AcqRel);

        if let Err(e) = previous.close() {
            warn!(error = %e, "failed to close expired client");
        }
        Ok(())
    }

    fn emit<T, S>(
        &self,
        operation: &str,
        name: &str,
        value: T,
        tags: &[&str],
        rate: f64,
        send: S,
    ) -> Result<(), ClientError>
    where
        T: Display,
        S: FnOnce(&F::Client) -> Result<(), ClientError>,
    {
        let mut state = self.lock();
        if state.closed {
            return Err(ClientError::Closed);
        }
        self.renew_if_expired(&mut state)?;

        if self.options.debug {
            info!(operation, name, value = %value, tags = ?tags, rate, "sending metric");
        }
        send(&state.client)
    }
}

impl<F: ClientFactory> fmt::Debug for RenewingClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewingClient")
            .field("options", &self.options)
            .field("ttl", &self.ttl)
            .field("renewals", &self.renewals())
            .finish_non_exhaustive()
    }
}

impl<F: ClientFactory> DogstatsdClient for RenewingClient<F> {
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ClientError> {
        self.emit("count", name, value, tags, rate, |c| {
            c.count(name, value, tags, rate)
        })
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ClientError> {
        self.emit("gauge", name, value, tags, rate, |c| {
            c.gauge(name, value, tags, rate)
        })
    }

    fn time_in_milliseconds(
        &self,
        name: &str,
        value: f64,
        tags: &[&str],
        rate: f64,
    ) -> Result<(), ClientError> {
        self.emit("time_in_milliseconds", name, value, tags, rate, |c| {
            c.time_in_milliseconds(name, value, tags, rate)
        })
    }

    fn close(&self) -> Result<(), ClientError> {
        let mut state = self.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.client.close()
    }
}

#[cfg(test)]
mod tests {
    use super::RenewingClient;
    use crate::client::DogstatsdClient;
    use crate::common::{BuildError, ClientError};
    use crate::environment::Environment;
    use crate::factory::{ClientFactory, UdpClientFactory};
    use crate::options::Options;
    use quanta::Clock;
    use std::io;
    use std::net::UdpSocket;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Tracker {
        created: AtomicUsize,
        fail: AtomicBool,
        closes: Mutex<Vec<usize>>,
        sends: Mutex<Vec<(usize, String)>>,
    }

    struct MockClient {
        id: usize,
        tracker: Arc<Tracker>,
        closed: AtomicBool,
    }

    impl MockClient {
        fn record(&self, name: &str) -> Result<(), ClientError> {
            assert!(!self.closed.load(Ordering::SeqCst), "sent through closed client");
            self.tracker
                .sends
                .lock()
                .unwrap()
                .push((self.id, name.to_string()));
            Ok(())
        }
    }

    impl DogstatsdClient for MockClient {
        fn count(&self, name: &str, _: i64, _: &[&str], _: f64) -> Result<(), ClientError> {
            self.record(name)
        }

        fn gauge(&self, name: &str, _: f64, _: &[&str], _: f64) -> Result<(), ClientError> {
            self.record(name)
        }

        fn time_in_milliseconds(
            &self,
            name: &str,
            _: f64,
            _: &[&str],
            _: f64,
        ) -> Result<(), ClientError> {
            self.record(name)
        }

        fn close(&self) -> Result<(), ClientError> {
            assert!(!self.closed.swap(true, Ordering::SeqCst), "double close");
            self.tracker.closes.lock().unwrap().push(self.id);
            Ok(())
        }
    }

    struct MockFactory {
        tracker: Arc<Tracker>,
    }

    impl ClientFactory for MockFactory {
        type Client = MockClient;

        fn create(&self, _options: &Options) -> Result<MockClient, BuildError> {
            if self.tracker.fail.load(Ordering::SeqCst) {
                return Err(BuildError::HostLookup(io::Error::new(
                    io::ErrorKind::Other,
                    "lookup failed",
                )));
            }
            let id = self.tracker.created.fetch_add(1, Ordering::SeqCst);
            Ok(MockClient {
                id,
                tracker: self.tracker.clone(),
                closed: AtomicBool::new(false),
            })
        }
    }

    fn mock_client(ttl: Duration, clock: Clock) -> (RenewingClient<MockFactory>, Arc<Tracker>) {
        let tracker = Arc::new(Tracker::default());
        let factory = MockFactory {
            tracker: tracker.clone(),
        };
        let options = Options {
            ttl,
            ..Default::default()
        };
        let client = RenewingClient::with_clock(options, factory, clock).unwrap();
        (client, tracker)
    }

    #[test]
    fn test_construction_creates_client() {
        let (clock, _mock) = Clock::mock();
        let (client, tracker) = mock_client(Duration::ZERO, clock);
        assert_eq!(client.ttl(), Duration::from_secs(60));
        assert_eq!(client.renewals(), 1);
        assert_eq!(tracker.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_construction_failure() {
        let tracker = Arc::new(Tracker::default());
        tracker.fail.store(true, Ordering::SeqCst);
        let factory = MockFactory { tracker };
        let result = RenewingClient::new(Options::default(), factory);
        assert!(matches!(result, Err(BuildError::HostLookup(_))));
    }

    #[test]
    fn test_reuses_fresh_client() {
        let (clock, mock) = Clock::mock();
        let (client, tracker) = mock_client(Duration::from_secs(10), clock);

        client.count("a", 1, &[], 1.0).unwrap();
        mock.increment(Duration::from_secs(9));
        client.gauge("b", 1.0, &[], 1.0).unwrap();

        assert_eq!(client.renewals(), 1);
        assert!(tracker.closes.lock().unwrap().is_empty());
        let sends = tracker.sends.lock().unwrap();
        assert_eq!(*sends, vec![(0, "a".to_string()), (0, "b".to_string())]);
    }

    #[test]
    fn test_renews_expired_client() {
        let (clock, mock) = Clock::mock();
        let (client, tracker) = mock_client(Duration::from_millis(1), clock);
        let first_created = client.lock().created_at;

        mock.increment(Duration::from_millis(1));
        client.count("a", 1, &[], 1.0).unwrap();
        let second_created = client.lock().created_at;
        assert!(second_created > first_created);
        assert_eq!(client.renewals(), 2);
        assert_eq!(*tracker.closes.lock().unwrap(), vec![0]);

        mock.increment(Duration::from_millis(5));
        client.time_in_milliseconds("b", 3.0, &[], 1.0).unwrap();
        assert!(client.lock().created_at > second_created);
        assert_eq!(client.renewals(), 3);
        assert_eq!(*tracker.closes.lock().unwrap(), vec![0, 1]);

        let sends = tracker.sends.lock().unwrap();
        assert_eq!(*sends, vec![(1, "a".to_string()), (2, "b".to_string())]);
    }

    #[test]
    fn test_renewal_failure_keeps_client() {
        let (clock, mock) = Clock::mock();
        let (client, tracker) = mock_client(Duration::from_secs(1), clock);
        let created = client.lock().created_at;

        mock.increment(Duration::from_secs(2));
        tracker.fail.store(true, Ordering::SeqCst);
        let err = client.count("a", 1, &[], 1.0).unwrap_err();
        assert!(matches!(err, ClientError::Renewal(BuildError::HostLookup(_))));
        assert_eq!(client.lock().created_at, created);
        assert_eq!(client.lock().client.id, 0);
        assert!(tracker.closes.lock().unwrap().is_empty());
        assert!(tracker.sends.lock().unwrap().is_empty());

        tracker.fail.store(false, Ordering::SeqCst);
        client.count("b", 1, &[], 1.0).unwrap();
        assert_eq!(client.renewals(), 2);
        assert_eq!(*tracker.closes.lock().unwrap(), vec![0]);
        assert_eq!(*tracker.sends.lock().unwrap(), vec![(1, "b".to_string())]);
    }

    #[test]
    fn test_close() {
        let (clock, mock) = Clock::mock();
        let (client, tracker) = mock_client(Duration::from_secs(1), clock);

        client.close().unwrap();
        client.close().unwrap();
        assert_eq!(*tracker.closes.lock().unwrap(), vec![0]);

        mock.increment(Duration::from_secs(5));
        assert!(matches!(
            client.count("a", 1, &[], 1.0),
            Err(ClientError::Closed)
        ));
        assert_eq!(client.renewals(), 1);
    }

    #[test]
    fn test_concurrent_renewals() {
        const THREADS: usize = 8;
        const CALLS: usize = 200;

        let (client, tracker) = mock_client(Duration::from_nanos(1), Clock::new());
        let client = Arc::new(client);

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let client = client.clone();
                thread::spawn(move || {
                    for i in 0..CALLS {
                        client.count("hits", i as i64, &[], 1.0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let created = tracker.created.load(Ordering::SeqCst);
        assert_eq!(client.renewals() as usize, created);
        assert_eq!(tracker.sends.lock().unwrap().len(), THREADS * CALLS);

        let mut closes = tracker.closes.lock().unwrap().clone();
        assert_eq!(closes.len(), created - 1);
        closes.sort_unstable();
        closes.dedup();
        assert_eq!(closes.len(), created - 1);
        assert!(!closes.contains(&client.lock().client.id));
    }

    #[test]
    fn test_debug_output() {
        let (clock, _mock) = Clock::mock();
        let (client, _tracker) = mock_client(Duration::from_secs(5), clock);
        let output = format!("{:?}", client);
        assert!(output.starts_with("RenewingClient"));
        assert!(output.contains("ttl: 5s"));
        assert!(output.contains("renewals: 1"));
    }

    /// Environment whose agent port can be moved while clients are alive.
    struct MovingAgent {
        port: Mutex<String>,
    }

    impl Environment for MovingAgent {
        fn var(&self, name: &str) -> Option<String> {
            match name {
                "DD_AGENT_HOST" => Some("127.0.0.1".to_string()),
                "DD_AGENT_PORT" => Some(self.port.lock().unwrap().clone()),
                _ => None,
            }
        }

        fn hostname(&self) -> io::Result<String> {
            Ok("web-1".to_string())
        }
    }

    fn agent() -> UdpSocket {
        let agent = UdpSocket::bind("127.0.0.1:0").unwrap();
        agent
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        agent
    }

    fn recv(agent: &UdpSocket) -> String {
        let mut buf = [0u8; 1500];
        let n = agent.recv(&mut buf).unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn test_renewal_follows_agent_move() {
        let old_agent = agent();
        let new_agent = agent();
        let env = Arc::new(MovingAgent {
            port: Mutex::new(old_agent.local_addr().unwrap().port().to_string()),
        });
        let factory = UdpClientFactory::with_environment(env.clone());
        let options = Options {
            ttl: Duration::from_secs(60),
            disable_tag_hostname: true,
            ..Default::default()
        };
        let (clock, mock) = Clock::mock();
        let client = RenewingClient::with_clock(options, factory, clock).unwrap();

        client.count("hits", 1, &[], 1.0).unwrap();
        assert_eq!(recv(&old_agent), "hits:1|c|#service:service-unknown\n");

        *env.port.lock().unwrap() = new_agent.local_addr().unwrap().port().to_string();
        client.count("hits", 2, &[], 1.0).unwrap();
        assert_eq!(recv(&old_agent), "hits:2|c|#service:service-unknown\n");

        mock.increment(Duration::from_secs(60));
        client.count("hits", 3, &[], 1.0).unwrap();
        assert_eq!(recv(&new_agent), "hits:3|c|#service:service-unknown\n");
        assert_eq!(client.renewals(), 2);
    }
}
