//! Upstream search API access.
//!
//! The harvest loop only needs a URL-in, JSON-out seam ([`Fetcher`]); the
//! production implementation ([`ProxyFetcher`]) routes every request through
//! a rendering proxy because the search endpoint sits behind JavaScript.
//! Response payloads deserialize into [`SearchPage`].

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::config::ProxyConfig;
use crate::error::{HarvestError, HarvestResult};

/// URL-in, JSON-out seam between the harvest loop and the network.
pub trait Fetcher {
    /// Fetch a fully resolved query URL and return the parsed response body.
    ///
    /// A non-2xx answer must surface as a retryable error carrying the
    /// status the upstream returned.
    fn fetch(&self, url: &str) -> HarvestResult<Value>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, url: &str) -> HarvestResult<Value> {
        (**self).fetch(url)
    }
}

/// One page of search results.
#[derive(Debug, Deserialize)]
pub struct SearchPage {
    /// Primary results.
    pub search: SearchSection,
    /// Paid placements interleaved by the API. Missing in some responses
    /// and parsed as empty rather than failing the page.
    #[serde(default)]
    pub sponsored: SponsoredSection,
}

/// The `search` section of a page. `records` is mandatory; a payload
/// without it is malformed.
#[derive(Debug, Deserialize)]
pub struct SearchSection {
    /// Approximate total the API reports for the whole query. Feeds a
    /// progress log line only, so a malformed count reads as absent
    /// rather than failing the page.
    #[serde(default, deserialize_with = "lenient_count")]
    pub count: Option<Number>,
    pub records: Vec<Map<String, Value>>,
}

/// The `sponsored` section of a page.
#[derive(Debug, Default, Deserialize)]
pub struct SponsoredSection {
    #[serde(default)]
    pub records: Vec<Map<String, Value>>,
}

impl SearchPage {
    /// Interpret a fetched payload as a search page.
    pub fn from_value(payload: Value) -> HarvestResult<Self> {
        serde_json::from_value(payload).map_err(|err| HarvestError::Payload {
            detail: err.to_string(),
        })
    }
}

/// Keep `search.count` when it is any JSON number, drop it otherwise.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<Number>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<Value>::deserialize(deserializer)?.and_then(|value| match value {
            Value::Number(count) => Some(count),
            _ => None,
        }),
    )
}

/// Blocking client that routes every fetch through a rendering proxy.
///
/// The proxy receives the target URL as a query parameter, renders the
/// page's JavaScript, and passes the upstream status through, so a non-2xx
/// from the search API itself still maps to [`HarvestError::Http`]. The API
/// key lives only in the [`ProxyConfig`], whose `Debug` output redacts it.
#[derive(Debug)]
pub struct ProxyFetcher {
    config: ProxyConfig,
}

impl ProxyFetcher {
    pub fn new(config: ProxyConfig) -> HarvestResult<Self> {
        config.validate()?;
        Ok(ProxyFetcher { config })
    }
}

impl Fetcher for ProxyFetcher {
    fn fetch(&self, url: &str) -> HarvestResult<Value> {
        debug!(url, "fetching through rendering proxy");
        let response = ureq::get(&self.config.endpoint)
            .query("apikey", &self.config.api_key)
            .query("url", url)
            .query("js_render", "true")
            .query("original_status", "true")
            .call()?;
        let body = response.into_body().read_to_string()?;
        parse_body(body)
    }
}

/// Parse a response body, trying simd-json first and falling back to
/// serde_json when it refuses the input.
fn parse_body(body: String) -> HarvestResult<Value> {
    let mut buffer = body.clone().into_bytes();
    match simd_json::serde::from_slice::<Value>(&mut buffer) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(&body).map_err(|err| HarvestError::Payload {
            detail: format!("response body is not valid JSON: {err}"),
        }),
    }
}
