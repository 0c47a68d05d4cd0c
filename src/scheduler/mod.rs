//! Polling scheduler: fans out concurrent HTTP checks at per-endpoint
//! cadences.
//!
//! The scheduler polls every endpoint immediately on start, then ticks at
//! the GCD of all endpoint intervals and polls only endpoints that are due.
//! Due endpoints are dispatched to a fixed pool of worker tasks; each
//! worker probes its endpoint, derives a status, and pushes a
//! [`StatusResult`] onto the bounded results channel.
//!
//! TIMING SEMANTIC: an endpoint's last-polled stamp is taken when its poll
//! STARTS, not when it completes. This prevents concurrent polls of the
//! same endpoint but means the effective cadence for a slow endpoint is
//! `configured interval + probe duration`. Known coarsening, kept as is.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::extractors::http_status_to_status;
use crate::probe::{ProbeClient, ProbeOutcome};
use crate::status::{Status, StatusExtractor, StatusResult};
use crate::Error;

/// Tick cadence never drops below this, to avoid tight-loop CPU burn.
const MIN_BASE_INTERVAL: Duration = Duration::from_secs(1);

/// Manages periodic polling of multiple endpoints.
///
/// Lifecycle is `unstarted → running → stopped`. [`Scheduler::start`] is
/// idempotent and non-blocking; [`Scheduler::stop`] is idempotent, safe to
/// call before `start`, and blocks until the control loop and every
/// in-flight worker have exited, the results channel is closed, and the
/// probe client's connections are released.
pub struct Scheduler {
    endpoints: Arc<Vec<Endpoint>>,
    interval: Duration,
    max_concurrency: usize,
    client: Arc<ProbeClient>,
    // level-triggered stop signal: set once to true, observed via
    // `wait_for`, so late subscribers cannot miss it
    stop_tx: watch::Sender<bool>,
    state: Mutex<SchedulerState>,
    results_rx: Mutex<Option<mpsc::Receiver<StatusResult>>>,
}

struct SchedulerState {
    started: bool,
    stopped: bool,
    control: Option<tokio::task::JoinHandle<()>>,
    // held until start moves it into the control loop; dropping it is what
    // closes the results channel if start never runs
    results_tx: Option<mpsc::Sender<StatusResult>>,
}

impl Scheduler {
    /// Creates a scheduler over `endpoints` with the given global default
    /// interval and worker-pool size.
    pub fn new(
        endpoints: Vec<Endpoint>,
        interval: Duration,
        max_concurrency: usize,
    ) -> Result<Self, Error> {
        let capacity = endpoints.len().max(1);
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            endpoints: Arc::new(endpoints),
            interval,
            max_concurrency: max_concurrency.max(1),
            client: Arc::new(ProbeClient::new()?),
            stop_tx,
            state: Mutex::new(SchedulerState {
                started: false,
                stopped: false,
                control: None,
                results_tx: Some(results_tx),
            }),
            results_rx: Mutex::new(Some(results_rx)),
        })
    }

    /// Takes the receiving end of the results channel.
    ///
    /// The channel is closed when the scheduler stops. Exactly one
    /// consumer should take it; subsequent calls return `None`.
    pub fn take_results(&self) -> Option<mpsc::Receiver<StatusResult>> {
        self.results_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Begins the polling loop in a background task.
    ///
    /// Non-blocking. No-op if already running or already stopped.
    pub fn start(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.started || state.stopped {
            return;
        }
        state.started = true;

        let Some(results_tx) = state.results_tx.take() else {
            return;
        };

        let run = PollRun {
            endpoints: self.endpoints.clone(),
            interval: self.interval,
            max_concurrency: self.max_concurrency,
            client: self.client.clone(),
            results_tx,
            stop_rx: self.stop_tx.subscribe(),
        };
        let mut stop_rx = self.stop_tx.subscribe();

        state.control = Some(tokio::spawn(async move {
            let base_interval = run.calculate_base_interval();
            let mut last_polled: HashMap<String, Instant> =
                HashMap::with_capacity(run.endpoints.len());

            tracing::info!(
                endpoints = run.endpoints.len(),
                base_interval_ms = base_interval.as_millis() as u64,
                "scheduler started"
            );

            // first cycle polls everything immediately
            run.poll_due_endpoints(&mut last_polled, true).await;

            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + base_interval, base_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_requested(&mut stop_rx) => break,
                    _ = ticker.tick() => {
                        run.poll_due_endpoints(&mut last_polled, false).await;
                    }
                }
            }
            // run (and with it the last results sender) drops here, closing
            // the results channel after all workers have exited
        }));
    }

    /// Halts the scheduler and waits for all tasks to complete.
    ///
    /// Idempotent; calling before `start` is a safe no-op that still
    /// closes the results channel.
    pub async fn stop(&self) {
        let (control, leftover_tx) = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if !state.stopped {
                state.stopped = true;
                self.stop_tx.send_replace(true);
            }
            (state.control.take(), state.results_tx.take())
        };

        // closes the results channel when start was never called
        drop(leftover_tx);

        if let Some(control) = control {
            let _ = control.await;
        }

        // release pooled connections after all workers have exited
        self.client.close();
        tracing::info!("scheduler stopped");
    }
}

/// State moved into the control loop task at start.
struct PollRun {
    endpoints: Arc<Vec<Endpoint>>,
    interval: Duration,
    max_concurrency: usize,
    client: Arc<ProbeClient>,
    results_tx: mpsc::Sender<StatusResult>,
    stop_rx: watch::Receiver<bool>,
}

impl PollRun {
    /// Tick interval: the GCD of all effective endpoint intervals, floored
    /// at one second.
    fn calculate_base_interval(&self) -> Duration {
        let mut intervals = self
            .endpoints
            .iter()
            .map(|ep| ep.interval.unwrap_or(self.interval));

        let Some(first) = intervals.next() else {
            return self.interval.max(MIN_BASE_INTERVAL);
        };

        let gcd_nanos = intervals.fold(first.as_nanos(), |acc, d| gcd(acc, d.as_nanos()));
        let result = Duration::from_nanos(gcd_nanos.min(u64::MAX as u128) as u64);
        result.max(MIN_BASE_INTERVAL)
    }

    /// Polls endpoints that are due. When `immediate` is true every
    /// endpoint is due unconditionally. Last-polled stamps are taken here,
    /// at dispatch time.
    async fn poll_due_endpoints(&self, last_polled: &mut HashMap<String, Instant>, immediate: bool) {
        let now = Instant::now();
        let mut due: Vec<Endpoint> = Vec::with_capacity(self.endpoints.len());

        for ep in self.endpoints.iter() {
            let effective = ep.interval.unwrap_or(self.interval);
            let is_due = immediate
                || match last_polled.get(&ep.name) {
                    Some(last) => now.duration_since(*last) >= effective,
                    None => true,
                };
            if is_due {
                last_polled.insert(ep.name.clone(), now);
                due.push(ep.clone());
            }
        }

        if due.is_empty() {
            return;
        }

        self.dispatch(due).await;
    }

    /// Hands due endpoints to a fixed pool of workers through a bounded
    /// job channel and waits for all of them to finish. Cancellation wins
    /// over both job and result delivery.
    async fn dispatch(&self, due: Vec<Endpoint>) {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Endpoint>(due.len());
        let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));

        let mut workers = Vec::with_capacity(self.max_concurrency);
        for _ in 0..self.max_concurrency {
            let jobs_rx = jobs_rx.clone();
            let client = self.client.clone();
            let results_tx = self.results_tx.clone();
            let mut stop_rx = self.stop_rx.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let job = { jobs_rx.lock().await.recv().await };
                    let Some(ep) = job else { return };

                    let result = poll_endpoint(&client, &ep).await;
                    // cancellation wins over delivery
                    tokio::select! {
                        _ = stop_requested(&mut stop_rx) => return,
                        sent = results_tx.send(result) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }));
        }

        let mut stop_rx = self.stop_rx.clone();
        for ep in due {
            tokio::select! {
                _ = stop_requested(&mut stop_rx) => break,
                sent = jobs_tx.send(ep) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(jobs_tx);

        for worker in workers {
            let _ = worker.await;
        }
    }
}

/// Resolves once the stop flag is set. A dropped sender counts as a stop.
///
/// `watch::Receiver::wait_for` yields a `Ref` borrowing the channel slot,
/// which is not `Send`; this wrapper discards it before yielding so the
/// futures that select on it can be spawned.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

/// Polls a single endpoint and derives its status.
async fn poll_endpoint(client: &ProbeClient, ep: &Endpoint) -> StatusResult {
    let outcome = client
        .fetch(ep.method.clone(), &ep.url, &ep.headers, ep.timeout)
        .await;

    let (status, error) = derive_status(&outcome, ep.extractor.as_ref());

    StatusResult {
        name: ep.name.clone(),
        url: ep.url.clone(),
        status,
        labels: ep.labels.clone(),
        latency: outcome.latency,
        checked_at: Utc::now(),
        error,
        raw_response: outcome.body,
        status_code: outcome.status_code,
    }
}

/// Status derivation: a transport error is unconditionally down; otherwise
/// the endpoint's extractor (panic-isolated) or the default HTTP status
/// code mapping decides.
fn derive_status(
    outcome: &ProbeOutcome,
    extractor: Option<&StatusExtractor>,
) -> (Status, Option<String>) {
    if let Some(err) = &outcome.error {
        return (Status::Down, Some(err.to_string()));
    }

    match extractor {
        Some(extractor) => match safe_extract(extractor, &outcome.body, outcome.status_code) {
            Ok(status) => (status, None),
            Err(message) => (Status::Down, Some(message)),
        },
        None => (http_status_to_status(outcome.status_code), None),
    }
}

/// Calls the extractor with panic recovery.
///
/// On panic, the full payload is logged server-side under a fresh
/// correlation identifier and the returned error carries only that
/// identifier, so operators can correlate without leaking internals.
fn safe_extract(
    extractor: &StatusExtractor,
    body: &[u8],
    status_code: u16,
) -> Result<Status, String> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| extractor(body, status_code))) {
        Ok(status) => Ok(status),
        Err(panic) => {
            let correlation_id = Uuid::new_v4();
            tracing::error!(
                correlation_id = %correlation_id,
                panic = %panic_message(panic.as_ref()),
                "status extractor panicked"
            );
            Err(format!("extractor panic (correlation_id: {correlation_id})"))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
