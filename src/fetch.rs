// =============================================================================
// fetch.rs - ONE HTTP CALL, RETRIED WHEN IT'S WORTH IT
// =============================================================================
//
// Both adapters go through `FetchClient`. It knows nothing about JSON,
// HTML or pagination. It sends a GET through a `Transport`, classifies the
// outcome, and retries the transient set (502/503/504 and timeouts) under a
// `BackoffPolicy`. Everything else goes straight back to the caller.
//
// The `Transport` seam exists so the adapters can be driven by a scripted
// upstream in tests. Production uses `ReqwestTransport`.
// =============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::retry::BackoffPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("gave up after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// The retryable set: gateway errors and timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout => true,
            FetchError::Status { status } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// HTTP status behind this error, looking through `Exhausted`.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status } => Some(*status),
            FetchError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// A GET request. Query pairs are appended by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can perform a GET.
///
/// Implementations return non-2xx responses as `Ok` and leave classification
/// to the fetch client. `Err` is reserved for failures with no response.
pub trait Transport: Send + Sync {
    fn get(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<HttpResponse, FetchError>> + Send;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else {
        FetchError::Malformed(err.to_string())
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        Ok(HttpResponse { status, body })
    }
}

/// Retrying wrapper around a transport. Stateless between calls.
pub struct FetchClient<T> {
    transport: Arc<T>,
    policy: BackoffPolicy,
}

impl<T: Transport> FetchClient<T> {
    pub fn new(transport: Arc<T>, policy: BackoffPolicy) -> Self {
        Self { transport, policy }
    }

    /// Perform the request, retrying transient failures.
    ///
    /// Returns the first 2xx response. A transient failure on the final
    /// attempt comes back as `FetchError::Exhausted`; any other failure is
    /// returned as-is on the attempt it happened.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        let attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            let error = match self.transport.get(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => FetchError::Status {
                    status: response.status,
                },
                Err(error) => error,
            };

            if !self.policy.should_retry(&error) {
                debug!(url = request.url.as_str(), error = %error, "Fetch failed, not retryable");
                return Err(error);
            }

            if attempt >= attempts {
                warn!(
                    url = request.url.as_str(),
                    attempts = attempts,
                    error = %error,
                    "Fetch retries exhausted"
                );
                return Err(FetchError::Exhausted {
                    attempts,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                url = request.url.as_str(),
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient fetch failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted upstream for adapter tests.

    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;

    type Responder = Box<dyn Fn(&FetchRequest) -> Result<HttpResponse, FetchError> + Send + Sync>;

    /// Answers from a queue first, then from a fallback closure.
    pub struct ScriptedTransport {
        queue: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
        fallback: Responder,
        pub requests: Mutex<Vec<FetchRequest>>,
    }

    impl ScriptedTransport {
        pub fn queued(responses: Vec<Result<HttpResponse, FetchError>>) -> Self {
            Self {
                queue: Mutex::new(responses.into()),
                fallback: Box::new(|_| Err(FetchError::Connect("script exhausted".into()))),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn answering<F>(responder: F) -> Self
        where
            F: Fn(&FetchRequest) -> Result<HttpResponse, FetchError> + Send + Sync + 'static,
        {
            Self {
                queue: Mutex::new(VecDeque::new()),
                fallback: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl Transport for ScriptedTransport {
        async fn get(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
            self.requests.lock().push(request.clone());
            let queued = self.queue.lock().pop_front();
            match queued {
                Some(answer) => answer,
                None => (self.fallback)(request),
            }
        }
    }
}
