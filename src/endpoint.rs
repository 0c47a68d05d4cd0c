//! Endpoint specification and builder.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use reqwest::{Method, Url};

use crate::status::StatusExtractor;
use crate::Error;

const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(10);

/// A named HTTP target to be health-checked on a cadence.
///
/// Endpoints are immutable once built and handed to the scheduler.
/// Construct with [`Endpoint::builder`].
#[derive(Clone)]
pub struct Endpoint {
    pub(crate) name: String,
    pub(crate) url: String,
    pub(crate) labels: HashMap<String, String>,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) timeout: Duration,
    pub(crate) extractor: Option<StatusExtractor>,
    pub(crate) method: Method,
    pub(crate) interval: Option<Duration>,
}

impl Endpoint {
    /// Starts building an endpoint with the given display name and URL.
    ///
    /// The name must be non-empty and unique across the endpoints handed
    /// to one scheduler. The URL must be absolute with an http or https
    /// scheme. Validation happens in [`EndpointBuilder::build`].
    pub fn builder(name: impl Into<String>, url: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder {
            name: name.into(),
            url: url.into(),
            labels: HashMap::new(),
            headers: HashMap::new(),
            timeout: DEFAULT_ENDPOINT_TIMEOUT,
            extractor: None,
            method: Method::GET,
            interval: None,
        }
    }

    /// Display name used for identification in the dashboard and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target URL polled for health checks.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Key-value metadata used for grouping and filtering.
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Custom HTTP headers sent with every poll request.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Per-request timeout, default 10 seconds.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// HTTP method, default GET.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Custom polling interval; `None` means the global interval applies.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("labels", &self.labels)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("method", &self.method)
            .field("interval", &self.interval)
            .field("extractor", &self.extractor.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Builder for [`Endpoint`], validating on [`EndpointBuilder::build`].
pub struct EndpointBuilder {
    name: String,
    url: String,
    labels: HashMap<String, String>,
    headers: HashMap<String, String>,
    timeout: Duration,
    extractor: Option<StatusExtractor>,
    method: Method,
    interval: Option<Duration>,
}

impl EndpointBuilder {
    /// Adds one label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds all labels from `labels`.
    pub fn labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Adds one custom HTTP header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Adds all headers from `headers`.
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets a custom polling interval overriding the global default.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Sets the status extractor for this endpoint.
    pub fn extractor(mut self, extractor: StatusExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Validates and builds the [`Endpoint`].
    ///
    /// Fails if the name is empty or the URL is not an absolute http(s)
    /// URL.
    pub fn build(self) -> Result<Endpoint, Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidEndpoint("endpoint name cannot be empty".to_string()));
        }

        let parsed = Url::parse(&self.url)
            .map_err(|e| Error::InvalidEndpoint(format!("invalid URL {:?}: {}", self.url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::InvalidEndpoint(format!(
                "URL must have an http:// or https:// scheme, got {:?}",
                self.url
            )));
        }

        if self.timeout.is_zero() {
            return Err(Error::InvalidEndpoint("timeout must be positive".to_string()));
        }
        if self.interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::InvalidEndpoint("interval must be positive".to_string()));
        }

        Ok(Endpoint {
            name: self.name,
            url: self.url,
            labels: self.labels,
            headers: self.headers,
            timeout: self.timeout,
            extractor: self.extractor,
            method: self.method,
            interval: self.interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors;

    #[test]
    fn test_builder_defaults() {
        let ep = Endpoint::builder("API", "https://api.example.com/health")
            .build()
            .unwrap();
        assert_eq!(ep.name(), "API");
        assert_eq!(ep.timeout(), Duration::from_secs(10));
        assert_eq!(ep.method(), &Method::GET);
        assert!(ep.interval().is_none());
        assert!(ep.extractor.is_none());
    }

    #[test]
    fn test_builder_options() {
        let ep = Endpoint::builder("API", "https://api.example.com/health")
            .label("env", "prod")
            .header("Authorization", "Bearer token")
            .timeout(Duration::from_secs(5))
            .method(Method::HEAD)
            .interval(Duration::from_secs(30))
            .extractor(extractors::json_field_extractor("status"))
            .build()
            .unwrap();
        assert_eq!(ep.labels()["env"], "prod");
        assert_eq!(ep.headers()["Authorization"], "Bearer token");
        assert_eq!(ep.timeout(), Duration::from_secs(5));
        assert_eq!(ep.method(), &Method::HEAD);
        assert_eq!(ep.interval(), Some(Duration::from_secs(30)));
        assert!(ep.extractor.is_some());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(Endpoint::builder("", "https://example.com").build().is_err());
        assert!(Endpoint::builder("  ", "https://example.com").build().is_err());
    }

    #[test]
    fn test_bad_url_rejected() {
        assert!(Endpoint::builder("x", "not a url").build().is_err());
        assert!(Endpoint::builder("x", "example.com/health").build().is_err());
        assert!(Endpoint::builder("x", "ftp://example.com").build().is_err());
    }

    #[test]
    fn test_zero_durations_rejected() {
        assert!(Endpoint::builder("x", "https://example.com")
            .timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(Endpoint::builder("x", "https://example.com")
            .interval(Duration::ZERO)
            .build()
            .is_err());
    }
}
