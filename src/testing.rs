//! Helpers for tests: a scripted in-memory gateway and client constructors.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;

use crate::{
    errors::{APIError, Result},
    gateway::{BoxFuture, ChatGateway},
    types::TaskRequest,
    Client, Config,
};

/// One request as seen by [`MockGateway`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: TaskRequest,
    /// When the call reached the gateway.
    pub started_at: Instant,
}

/// Gateway that answers from a script instead of the network.
///
/// Responses are consumed in order; once the script runs out every call fails
/// with a 503 [`APIError`].
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<(Result<String>, Duration)>,
    default_delay: Duration,
    calls: Vec<RecordedCall>,
    in_flight: usize,
    max_in_flight: usize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to responses queued without an explicit one.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().default_delay = delay;
        self
    }

    pub fn push_ok(&self, text: impl Into<String>) -> &Self {
        let mut state = self.lock();
        let delay = state.default_delay;
        state.responses.push_back((Ok(text.into()), delay));
        drop(state);
        self
    }

    pub fn push_err(&self, err: impl Into<crate::Error>) -> &Self {
        let mut state = self.lock();
        let delay = state.default_delay;
        state.responses.push_back((Err(err.into()), delay));
        drop(state);
        self
    }

    /// Queue a response that takes `delay` to arrive.
    pub fn push_delayed(&self, result: Result<String>, delay: Duration) -> &Self {
        self.lock().responses.push_back((result, delay));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Highest number of calls that were ever inside the gateway at once.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct InFlight<'a>(&'a MockGateway);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().in_flight -= 1;
    }
}

impl ChatGateway for MockGateway {
    fn send<'a>(&'a self, request: &'a TaskRequest) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let (result, delay) = {
                let mut state = self.lock();
                state.calls.push(RecordedCall {
                    request: request.clone(),
                    started_at: Instant::now(),
                });
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
                state.responses.pop_front().unwrap_or_else(|| {
                    (
                        Err(APIError::new(503, "mock gateway has no scripted response").into()),
                        Duration::ZERO,
                    )
                })
            };
            // Released even when the caller times out mid-delay.
            let _in_flight = InFlight(self);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

/// Client talking HTTP to `base_url` (e.g. a wiremock server) with a test key.
pub fn test_client(base_url: &str) -> Client {
    Client::new(Config {
        base_url: Some(base_url.to_string()),
        api_key: Some("sk-or-test-key".to_string()),
        min_interval: Some(Duration::ZERO),
        ..Default::default()
    })
    .expect("client")
}

/// Client dispatching to `gateway`, with a test key and the given spacing.
pub fn mock_client(gateway: &MockGateway, min_interval: Duration) -> Client {
    Client::with_gateway(
        Config {
            api_key: Some("sk-or-test-key".to_string()),
            min_interval: Some(min_interval),
            ..Default::default()
        },
        Arc::new(gateway.clone()),
    )
    .expect("client")
}
