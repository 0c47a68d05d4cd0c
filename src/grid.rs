//! Endpoint grids: cartesian expansion of a URL template over dimensions.
//!
//! A grid turns one URL template plus a set of dimension value lists into
//! one endpoint per combination, so monitoring `region × service` does not
//! require hand-writing every endpoint.

use std::collections::HashMap;
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::status::StatusExtractor;
use crate::Error;

/// Builder producing multiple [`Endpoint`]s from a URL template.
///
/// The template uses `{key}` placeholders, one per dimension. Dimension
/// values are URL-encoded before substitution. Each endpoint is named
/// `"Base (v1/v2)"` with values ordered by alphabetically sorted dimension
/// key, and the dimension values become labels (static labels win on
/// collision).
///
/// ```no_run
/// # use pulsewatch::EndpointGrid;
/// let endpoints = EndpointGrid::builder("API Health")
///     .url_template("https://api.example.com/health?region={region}")
///     .dimension("region", ["us-east", "eu-west"])
///     .build()
///     .unwrap();
/// assert_eq!(endpoints.len(), 2);
/// ```
pub struct EndpointGrid {
    base_name: String,
    url_template: Option<String>,
    dimensions: HashMap<String, Vec<String>>,
    static_labels: HashMap<String, String>,
    headers: HashMap<String, String>,
    timeout: Option<Duration>,
    interval: Option<Duration>,
    extractor: Option<StatusExtractor>,
}

impl EndpointGrid {
    /// Starts building a grid with the given base name.
    pub fn builder(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            url_template: None,
            dimensions: HashMap::new(),
            static_labels: HashMap::new(),
            headers: HashMap::new(),
            timeout: None,
            interval: None,
            extractor: None,
        }
    }

    /// Sets the URL template with `{key}` placeholders. Required.
    pub fn url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = Some(template.into());
        self
    }

    /// Adds one dimension with its value list. At least one is required.
    pub fn dimension<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a static label applied to every generated endpoint. Static
    /// labels take precedence over dimension labels on collision.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_labels.insert(key.into(), value.into());
        self
    }

    /// Adds a custom HTTP header applied to every generated endpoint.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the per-request timeout for every generated endpoint.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets a custom polling interval for every generated endpoint.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Sets the status extractor for every generated endpoint.
    pub fn extractor(mut self, extractor: StatusExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Expands the grid into endpoints, one per dimension combination.
    ///
    /// Fails fast on an empty base name, a missing template or dimensions,
    /// or a template placeholder mismatch (unknown or unused keys).
    pub fn build(self) -> Result<Vec<Endpoint>, Error> {
        if self.base_name.trim().is_empty() {
            return Err(Error::InvalidEndpoint("grid base name cannot be empty".to_string()));
        }
        let template = self
            .url_template
            .ok_or_else(|| Error::InvalidEndpoint("grid URL template required".to_string()))?;
        if self.dimensions.is_empty() {
            return Err(Error::InvalidEndpoint(
                "grid requires at least one dimension".to_string(),
            ));
        }
        if self.dimensions.values().any(|v| v.is_empty()) {
            return Err(Error::InvalidEndpoint(
                "grid dimensions cannot have empty value lists".to_string(),
            ));
        }

        // alphabetical key order keeps names and expansion deterministic
        let mut keys: Vec<&String> = self.dimensions.keys().collect();
        keys.sort();

        for key in &keys {
            if !template.contains(&format!("{{{}}}", key)) {
                return Err(Error::InvalidEndpoint(format!(
                    "URL template does not use dimension {:?}",
                    key
                )));
            }
        }

        let combinations = cartesian_product(&keys, &self.dimensions);

        let mut endpoints = Vec::with_capacity(combinations.len());
        for combo in combinations {
            let mut url = template.clone();
            for (key, value) in keys.iter().zip(&combo) {
                let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
                url = url.replace(&format!("{{{}}}", key), &encoded);
            }
            if let Some(start) = url.find('{') {
                return Err(Error::InvalidEndpoint(format!(
                    "URL template has unexpanded placeholder at {:?}",
                    &url[start..]
                )));
            }

            let name = format!("{} ({})", self.base_name, combo.join("/"));

            let mut builder = Endpoint::builder(name, url);
            for (key, value) in keys.iter().zip(&combo) {
                builder = builder.label(key.as_str(), value.as_str());
            }
            builder = builder
                .labels(self.static_labels.clone())
                .headers(self.headers.clone());
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }
            if let Some(interval) = self.interval {
                builder = builder.interval(interval);
            }
            if let Some(extractor) = &self.extractor {
                builder = builder.extractor(extractor.clone());
            }

            endpoints.push(builder.build()?);
        }

        Ok(endpoints)
    }
}

/// All value combinations across dimensions, in sorted-key order.
fn cartesian_product(keys: &[&String], dimensions: &HashMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut combos: Vec<Vec<String>> = vec![Vec::new()];
    for key in keys {
        let values = &dimensions[*key];
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.push(value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_dimension() {
        let endpoints = EndpointGrid::builder("API")
            .url_template("https://api.example.com/health?region={region}")
            .dimension("region", ["us-east", "eu-west"])
            .build()
            .unwrap();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].name(), "API (us-east)");
        assert_eq!(endpoints[0].url(), "https://api.example.com/health?region=us-east");
        assert_eq!(endpoints[0].labels()["region"], "us-east");
    }

    #[test]
    fn test_two_dimensions_sorted_key_order() {
        let endpoints = EndpointGrid::builder("Svc")
            .url_template("https://{region}.example.com/{service}/health")
            .dimension("service", ["auth", "billing"])
            .dimension("region", ["us"])
            .build()
            .unwrap();

        assert_eq!(endpoints.len(), 2);
        // "region" sorts before "service"
        assert_eq!(endpoints[0].name(), "Svc (us/auth)");
        assert_eq!(endpoints[0].url(), "https://us.example.com/auth/health");
        assert_eq!(endpoints[1].name(), "Svc (us/billing)");
    }

    #[test]
    fn test_values_are_url_encoded() {
        let endpoints = EndpointGrid::builder("Q")
            .url_template("https://example.com/health?env={env}")
            .dimension("env", ["pre prod"])
            .build()
            .unwrap();
        assert_eq!(endpoints[0].url(), "https://example.com/health?env=pre+prod");
        // label keeps the original value
        assert_eq!(endpoints[0].labels()["env"], "pre prod");
    }

    #[test]
    fn test_static_labels_win() {
        let endpoints = EndpointGrid::builder("L")
            .url_template("https://example.com/{env}")
            .dimension("env", ["prod"])
            .label("env", "override")
            .build()
            .unwrap();
        assert_eq!(endpoints[0].labels()["env"], "override");
    }

    #[test]
    fn test_unused_dimension_rejected() {
        let err = EndpointGrid::builder("X")
            .url_template("https://example.com/health")
            .dimension("region", ["us"])
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_template_rejected() {
        assert!(EndpointGrid::builder("X").dimension("a", ["1"]).build().is_err());
        assert!(EndpointGrid::builder("X")
            .url_template("https://example.com/{a}")
            .build()
            .is_err());
    }
}
