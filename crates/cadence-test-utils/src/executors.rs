//! Query executor doubles.
//!
//! - [`ScriptedExecutor`]: per-timestamp delays, hangs and failures, plus
//!   per-source hangs, with
//!   request recording and an in-flight high-water mark
//! - [`SimulatedExecutor`]: seeded random latency and failures, for
//!   reproducible fault-injection runs

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cadence_subscriptions::executor::{ExecutionError, QueryExecutor};
use cadence_subscriptions::request::{QuerySource, Request};
use cadence_subscriptions::value::QueryValue;

/// Response every double returns: which side answered, and for when.
///
/// `{"data": [{"count": 1}], "source": "<legacy|structured>", "timestamp": "<rfc3339>"}`
pub fn response_for(request: &Request) -> QueryValue {
    let timestamp = request
        .evaluation_timestamp()
        .map_or(QueryValue::Null, |ts| QueryValue::from(ts.to_rfc3339()));
    QueryValue::object([
        (
            "data",
            QueryValue::array([QueryValue::object([("count", QueryValue::UInt(1))])]),
        ),
        ("source", QueryValue::from(request.source.as_label())),
        ("timestamp", timestamp),
    ])
}

#[derive(Debug, Clone)]
enum Script {
    Delay(Duration),
    Hang,
    Fail(ExecutionError),
}

/// Decrements the in-flight count when an execution ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executor whose behaviour is scripted per evaluation timestamp.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<DateTime<Utc>, Script>>,
    default_delay: Duration,
    hung_source: Option<QuerySource>,
    emit_nan: bool,
    requests: Mutex<Vec<Request>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    /// Creates an executor answering immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every unscripted execution by `delay`.
    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Adds a NaN `ratio` field to every response.
    #[must_use]
    pub fn with_nan(mut self) -> Self {
        self.emit_nan = true;
        self
    }

    /// Never completes executions of `source` requests.
    #[must_use]
    pub fn hang_on(mut self, source: QuerySource) -> Self {
        self.hung_source = Some(source);
        self
    }

    /// Delays executions for `timestamp` by `delay`.
    #[must_use]
    pub fn delay_at(self, timestamp: DateTime<Utc>, delay: Duration) -> Self {
        self.script(timestamp, Script::Delay(delay))
    }

    /// Never completes executions for `timestamp`.
    #[must_use]
    pub fn hang_at(self, timestamp: DateTime<Utc>) -> Self {
        self.script(timestamp, Script::Hang)
    }

    /// Fails executions for `timestamp` with `error`.
    #[must_use]
    pub fn fail_at(self, timestamp: DateTime<Utc>, error: ExecutionError) -> Self {
        self.script(timestamp, Script::Fail(error))
    }

    fn script(self, timestamp: DateTime<Utc>, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(timestamp, script);
        self
    }

    /// Returns every request received, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Returns the highest number of concurrent executions observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, request: &Request) -> Result<QueryValue, ExecutionError> {
        self.requests.lock().unwrap().push(request.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let script = if self.hung_source == Some(request.source) {
            Some(Script::Hang)
        } else {
            request
                .evaluation_timestamp()
                .and_then(|ts| self.scripts.lock().unwrap().get(&ts).cloned())
        };

        match script {
            Some(Script::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(Script::Hang) => std::future::pending::<()>().await,
            Some(Script::Fail(error)) => return Err(error),
            None if !self.default_delay.is_zero() => tokio::time::sleep(self.default_delay).await,
            None => {}
        }

        let mut response = response_for(request);
        if self.emit_nan {
            if let QueryValue::Object(map) = &mut response {
                map.insert("ratio".to_string(), QueryValue::Float(f64::NAN));
            }
        }
        Ok(response)
    }
}

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability an execution fails as unavailable (0.0 - 1.0).
    pub execution_failure_rate: f64,
    /// Simulated latency range (min, max) in milliseconds.
    pub latency_range_ms: Option<(u64, u64)>,
}

impl FaultConfig {
    /// Creates a config with no faults.
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Creates a config simulating a flaky query engine.
    #[must_use]
    pub fn flaky_engine() -> Self {
        Self {
            execution_failure_rate: 0.2,
            latency_range_ms: Some((1, 20)),
        }
    }
}

/// Executor injecting seeded random latency and failures.
#[derive(Debug)]
pub struct SimulatedExecutor {
    rng: Mutex<StdRng>,
    faults: FaultConfig,
    failures: Arc<AtomicUsize>,
}

impl SimulatedExecutor {
    /// Creates an executor with a fixed seed.
    pub fn with_seed(seed: u64, faults: FaultConfig) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            faults,
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of injected failures so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for SimulatedExecutor {
    async fn execute(&self, request: &Request) -> Result<QueryValue, ExecutionError> {
        let (fail, latency) = {
            let mut rng = self.rng.lock().unwrap();
            let fail = rng.gen::<f64>() < self.faults.execution_failure_rate;
            let latency = self
                .faults
                .latency_range_ms
                .map(|(min, max)| Duration::from_millis(rng.gen_range(min..=max)));
            (fail, latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(ExecutionError::unavailable("injected failure"));
        }
        Ok(response_for(request))
    }
}
