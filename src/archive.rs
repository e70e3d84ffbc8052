use std::fmt;
use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

use crate::candidates::Candidate;
use crate::error::FetchError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::write_stream_atomic;

pub const TOKEN_ENV_VAR: &str = "EARTHSCOPE_TOKEN";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bearer token for the archive. The value never shows up in `Debug` output.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn from_env(var: &str) -> Result<Self, FetchError> {
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Ok(Self(token.trim().to_string())),
            _ => Err(FetchError::MissingCredential(var.to_string())),
        }
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// What a single request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// HTTP 200 and the body is on disk. `bytes == 0` means the body was
    /// empty and nothing was kept.
    Written { bytes: u64 },
    /// Any status other than 200; nothing was written.
    Status(u16),
    /// Connect, timeout, DNS, or body read failure.
    Transport(String),
}

/// Performs one authenticated GET and writes the body to `destination` on
/// HTTP 200. `Err` is reserved for local filesystem failures.
pub trait ArchiveTransport: Send + Sync {
    fn attempt(&self, url: &str, destination: &Utf8Path) -> Result<AttemptOutcome, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchResult {
    Success,
    NotFound,
    ServerError,
    ClientError,
    TransportFailure,
}

impl FetchResult {
    pub fn classify(outcome: &AttemptOutcome) -> Self {
        match outcome {
            AttemptOutcome::Written { bytes: 0 } => FetchResult::TransportFailure,
            AttemptOutcome::Written { .. } => FetchResult::Success,
            AttemptOutcome::Status(404) => FetchResult::NotFound,
            AttemptOutcome::Status(status) if (500..600).contains(status) => {
                FetchResult::ServerError
            }
            AttemptOutcome::Status(_) => FetchResult::ClientError,
            AttemptOutcome::Transport(_) => FetchResult::TransportFailure,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchResult::ServerError | FetchResult::TransportFailure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub path: Utf8PathBuf,
    pub bytes: u64,
    pub attempts: u32,
}

#[derive(Debug)]
pub enum FetchFailure {
    NotFound { attempts: u32 },
    ClientError { status: u16, attempts: u32 },
    ServerError { status: u16, attempts: u32 },
    Transport { message: String, attempts: u32 },
    Local(FetchError),
}

impl FetchFailure {
    pub fn result(&self) -> Option<FetchResult> {
        match self {
            FetchFailure::NotFound { .. } => Some(FetchResult::NotFound),
            FetchFailure::ClientError { .. } => Some(FetchResult::ClientError),
            FetchFailure::ServerError { .. } => Some(FetchResult::ServerError),
            FetchFailure::Transport { .. } => Some(FetchResult::TransportFailure),
            FetchFailure::Local(_) => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchFailure::NotFound { attempts }
            | FetchFailure::ClientError { attempts, .. }
            | FetchFailure::ServerError { attempts, .. }
            | FetchFailure::Transport { attempts, .. } => *attempts,
            FetchFailure::Local(_) => 1,
        }
    }
}

/// Runs one candidate download with retries for transient failures.
pub struct Fetcher<T: ArchiveTransport> {
    transport: T,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl<T: ArchiveTransport> Fetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self::with_sleeper(transport, policy, Box::new(ThreadSleeper))
    }

    pub fn with_sleeper(transport: T, policy: RetryPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            transport,
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                delay: policy.delay,
            },
            sleeper,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn fetch(
        &self,
        candidate: &Candidate,
        sink: &dyn ProgressSink,
    ) -> Result<Fetched, FetchFailure> {
        let url = candidate.url.as_str();
        let mut attempt = 1u32;
        loop {
            let outcome = self
                .transport
                .attempt(url, &candidate.path)
                .map_err(FetchFailure::Local)?;

            let result = FetchResult::classify(&outcome);
            let failure = match (result, outcome) {
                (FetchResult::Success, AttemptOutcome::Written { bytes }) => {
                    sink.event(ProgressEvent::Downloaded {
                        url: url.to_string(),
                        bytes,
                    });
                    return Ok(Fetched {
                        path: candidate.path.clone(),
                        bytes,
                        attempts: attempt,
                    });
                }
                (FetchResult::NotFound, _) => {
                    tracing::debug!(%url, "file not found (404)");
                    FetchFailure::NotFound { attempts: attempt }
                }
                (FetchResult::ServerError, AttemptOutcome::Status(status)) => {
                    tracing::warn!(%url, status, attempt, "server error");
                    FetchFailure::ServerError {
                        status,
                        attempts: attempt,
                    }
                }
                (_, AttemptOutcome::Status(status)) => {
                    tracing::debug!(%url, status, "client error");
                    FetchFailure::ClientError {
                        status,
                        attempts: attempt,
                    }
                }
                (_, AttemptOutcome::Transport(message)) => {
                    tracing::warn!(%url, attempt, error = %message, "request failed");
                    FetchFailure::Transport {
                        message,
                        attempts: attempt,
                    }
                }
                (_, AttemptOutcome::Written { .. }) => {
                    tracing::warn!(%url, attempt, "empty response body");
                    FetchFailure::Transport {
                        message: "empty response body".to_string(),
                        attempts: attempt,
                    }
                }
            };

            if !result.is_transient() {
                return Err(failure);
            }
            if attempt >= self.policy.max_attempts {
                tracing::warn!(%url, attempts = attempt, "all attempts failed");
                return Err(failure);
            }
            sink.event(ProgressEvent::Retrying {
                url: url.to_string(),
                attempt,
                delay: self.policy.delay,
            });
            self.sleeper.sleep(self.policy.delay);
            attempt += 1;
        }
    }
}

#[derive(Clone)]
pub struct EarthscopeHttpClient {
    client: Client,
}

impl EarthscopeHttpClient {
    pub fn new(credential: &Credential, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gnss-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::ArchiveHttp(err.to_string()))?,
        );
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credential.token()))
            .map_err(|_| {
                FetchError::ArchiveHttp("token contains invalid header characters".to_string())
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::ArchiveHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl ArchiveTransport for EarthscopeHttpClient {
    fn attempt(&self, url: &str, destination: &Utf8Path) -> Result<AttemptOutcome, FetchError> {
        let response = match self.client.get(url).send() {
            Ok(response) => response,
            Err(err) => return Ok(AttemptOutcome::Transport(describe_error(&err))),
        };
        let status = response.status().as_u16();
        if status != 200 {
            return Ok(AttemptOutcome::Status(status));
        }

        let mut body = TrackedReader::new(response);
        match write_stream_atomic(&mut body, destination) {
            Ok(bytes) => Ok(AttemptOutcome::Written { bytes }),
            Err(err) => match body.error.take() {
                Some(read_error) => Ok(AttemptOutcome::Transport(format!(
                    "response body read failed: {read_error}"
                ))),
                None => Err(err),
            },
        }
    }
}

fn describe_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timeout: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

/// Keeps the first read error so a failed copy can be blamed on the network
/// rather than the filesystem.
struct TrackedReader<R> {
    inner: R,
    error: Option<String>,
}

impl<R> TrackedReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, error: None }
    }
}

impl<R: Read> Read for TrackedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|err| {
            if self.error.is_none() {
                self.error = Some(err.to_string());
            }
        })
    }
}
