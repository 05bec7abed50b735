use std::collections::HashSet;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::SourceKind;
use crate::error::MinerError;
use crate::limiter::{Clock, RateLimiter};

pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const GEO_DATABASE: &str = "gds";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const TOOL_NAME: &str = "st-miner";

/// The two request kinds of the GEO query interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Search,
    Summary,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Search => "esearch.fcgi",
            Endpoint::Summary => "esummary.fcgi",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EutilsRequest {
    pub endpoint: Endpoint,
    pub params: Vec<(String, String)>,
}

impl EutilsRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
    pub retryable: bool,
}

/// One HTTP round-trip. Retries, rate limiting and pagination live above it.
pub trait EutilsTransport: Send + Sync {
    fn get(&self, request: &EutilsRequest) -> Result<HttpReply, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new() -> Result<Self, MinerError> {
        Self::with_base_url(EUTILS_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, MinerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("{TOOL_NAME}/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MinerError::Configuration(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| MinerError::TransientNetwork(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl EutilsTransport for HttpTransport {
    fn get(&self, request: &EutilsRequest) -> Result<HttpReply, TransportError> {
        let url = format!("{}/{}", self.base_url, request.endpoint.path());
        let response = self
            .client
            .get(url)
            .query(&request.params)
            .send()
            .map_err(|err| TransportError {
                message: err.to_string(),
                retryable: is_retryable_error(&err),
            })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| TransportError {
            message: err.to_string(),
            retryable: is_retryable_error(&err),
        })?;
        Ok(HttpReply { status, body })
    }
}

/// Bounded exponential backoff: `base_delay * 2^n` before retry `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Identification forwarded with every request. Courtesy only, not auth.
#[derive(Debug, Clone, Default)]
pub struct Contact {
    pub email: Option<String>,
    pub api_key: Option<String>,
}

/// Live acquisition as seen by the aggregator: search expression in,
/// ordered raw summary documents out.
pub trait RegistryClient {
    fn query(&self, expression: &str, max_results: usize) -> Result<Vec<String>, MinerError>;
}

impl<R: RegistryClient + ?Sized> RegistryClient for &R {
    fn query(&self, expression: &str, max_results: usize) -> Result<Vec<String>, MinerError> {
        (**self).query(expression, max_results)
    }
}

pub struct RemoteQueryClient<T: EutilsTransport, C: Clock> {
    transport: T,
    limiter: RateLimiter<C>,
    retry: RetryPolicy,
    contact: Contact,
    batch_size: usize,
    page_size: usize,
}

impl<T: EutilsTransport, C: Clock> RemoteQueryClient<T, C> {
    pub fn new(transport: T, limiter: RateLimiter<C>) -> Self {
        Self {
            transport,
            limiter,
            retry: RetryPolicy::default(),
            contact: Contact::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = contact;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Collects up to `max_results` unique ids, paging with `retstart`.
    pub fn search(&self, expression: &str, max_results: usize) -> Result<Vec<String>, MinerError> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut retstart = 0usize;

        while ids.len() < max_results {
            let retmax = self.page_size.min(max_results - ids.len());
            let request = self.request(
                Endpoint::Search,
                vec![
                    ("term".to_string(), expression.to_string()),
                    ("retstart".to_string(), retstart.to_string()),
                    ("retmax".to_string(), retmax.to_string()),
                ],
            );
            let body = self.send(&request)?;
            let page = parse_search_page(&body)?;
            debug!(
                retstart,
                returned = page.ids.len(),
                total = page.total,
                "esearch page"
            );

            if page.ids.is_empty() {
                break;
            }
            retstart += page.ids.len();
            for id in page.ids {
                if ids.len() >= max_results {
                    break;
                }
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            if retstart >= page.total {
                break;
            }
        }

        Ok(ids)
    }

    /// One summary document per batch of at most `batch_size` ids.
    pub fn fetch(&self, ids: &[String]) -> Result<Vec<String>, MinerError> {
        let mut documents = Vec::with_capacity(ids.len().div_ceil(self.batch_size));
        let total = ids.len().div_ceil(self.batch_size);
        for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
            debug!(batch = index + 1, total, size = chunk.len(), "esummary batch");
            let request = self.request(
                Endpoint::Summary,
                vec![("id".to_string(), chunk.join(","))],
            );
            documents.push(self.send(&request)?);
        }
        Ok(documents)
    }

    fn request(&self, endpoint: Endpoint, mut params: Vec<(String, String)>) -> EutilsRequest {
        params.insert(0, ("db".to_string(), GEO_DATABASE.to_string()));
        params.push(("retmode".to_string(), "json".to_string()));
        params.push(("tool".to_string(), TOOL_NAME.to_string()));
        if let Some(email) = &self.contact.email {
            params.push(("email".to_string(), email.clone()));
        }
        if let Some(api_key) = &self.contact.api_key {
            params.push(("api_key".to_string(), api_key.clone()));
        }
        EutilsRequest { endpoint, params }
    }

    /// Rate-limited send with retries. Exhausted retries and non-retryable
    /// statuses both surface as `SourceUnavailable`.
    fn send(&self, request: &EutilsRequest) -> Result<String, MinerError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire();
            attempt += 1;
            let (err, retryable) = match self.transport.get(request) {
                Ok(reply) if (200..300).contains(&reply.status) => return Ok(reply.body),
                Ok(reply) => {
                    let retryable = is_retryable_status(reply.status);
                    let err = MinerError::RegistryStatus {
                        status: reply.status,
                        message: truncate(&reply.body, 200),
                    };
                    (err, retryable)
                }
                Err(failure) => (
                    MinerError::TransientNetwork(failure.message),
                    failure.retryable,
                ),
            };

            if !retryable {
                return Err(MinerError::unavailable(SourceKind::NcbiGeo, err));
            }
            if attempt >= self.retry.max_attempts {
                return Err(MinerError::SourceUnavailable {
                    origin: SourceKind::NcbiGeo,
                    reason: format!("{err} (gave up after {attempt} attempts)"),
                });
            }
            let delay = self.retry.delay_for(attempt - 1);
            warn!(
                endpoint = request.endpoint.path(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying E-utilities request"
            );
            self.limiter.clock().sleep(delay);
        }
    }
}

impl<T: EutilsTransport, C: Clock> RegistryClient for RemoteQueryClient<T, C> {
    fn query(&self, expression: &str, max_results: usize) -> Result<Vec<String>, MinerError> {
        let ids = self.search(expression, max_results)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch(&ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub total: usize,
    pub ids: Vec<String>,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(default, rename = "ERROR")]
    error: Option<String>,
}

pub fn parse_search_page(body: &str) -> Result<SearchPage, MinerError> {
    let envelope: SearchEnvelope = serde_json::from_str(body)
        .map_err(|err| MinerError::MalformedResponse(format!("esearch: {err}")))?;
    let result = envelope.esearchresult;
    if let Some(error) = result.error {
        return Err(MinerError::MalformedResponse(format!("esearch: {error}")));
    }
    let total = match result.count {
        Some(count) => count.trim().parse::<usize>().map_err(|_| {
            MinerError::MalformedResponse(format!("esearch: non-numeric count {count:?}"))
        })?,
        None => result.idlist.len(),
    };
    Ok(SearchPage {
        total,
        ids: result.idlist,
    })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &trimmed[..index]),
        None => trimmed.to_string(),
    }
}
