//! The REST client handle.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use url::Url;

use crate::Error;
use crate::codec::{DEFAULT_CONTENT_TYPE, JsonMarshaler, Marshaler};
use crate::config::{Config, ContentConfig};
use crate::latency::{LatencyObserver, TracingLatency};
use crate::rate::{RateLimiter, Retry, TokenBucket};
use crate::request::Request;
use crate::transport::RoundTripper;

/// Cheaply cloneable handle for issuing requests against one base URL.
///
/// All mutable per-call state lives in the [`Request`] builder; the client
/// itself is immutable after construction and safe to share across tasks.
#[derive(Clone)]
pub struct Client<M = JsonMarshaler> {
    pub(crate) base: Url,
    pub(crate) content: ContentConfig<M>,
    pub(crate) transport: Arc<dyn RoundTripper>,
    pub(crate) rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub(crate) retry: Option<Arc<dyn Retry>>,
    pub(crate) latency: Arc<dyn LatencyObserver>,
    pub(crate) default_timeout: Option<Duration>,
}

impl<M: Marshaler> Client<M> {
    /// Client over an already-built transport.
    ///
    /// The base URL is normalized: its path gains a trailing slash and any
    /// query or fragment is dropped. An empty content type falls back to
    /// `application/json`.
    pub fn new(base_url: Url, mut content: ContentConfig<M>, transport: Arc<dyn RoundTripper>) -> Self {
        if content.content_type.is_empty() {
            content.content_type = DEFAULT_CONTENT_TYPE.to_owned();
        }
        Self {
            base: normalize_base_url(base_url),
            content,
            transport,
            rate_limiter: None,
            retry: None,
            latency: Arc::new(TracingLatency),
            default_timeout: None,
        }
    }

    /// Build a client from a declarative [`Config`]: parses the base URL,
    /// builds (or reuses from cache) the decorated transport, and installs
    /// the config's policy hooks.
    pub fn for_config(config: Config<M>) -> Result<Self, Error> {
        let base = config.parse_base_url()?;
        let transport = config.build_transport()?;

        let mut client = Client::new(base, config.content, transport);
        client.rate_limiter = match config.rate_limiter {
            Some(limiter) => Some(limiter),
            None if config.qps > 0.0 => {
                Some(Arc::new(TokenBucket::new(config.qps, config.burst)))
            }
            None => None,
        };
        client.retry = config.retry;
        client.default_timeout = config.timeout;
        if let Some(observer) = config.latency {
            client.latency = observer;
        }
        Ok(client)
    }

    /// Normalized base URL every request path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// The configured rate limiter, for callers coordinating with it.
    pub fn rate_limiter(&self) -> Option<&Arc<dyn RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Begin a request with an arbitrary HTTP method.
    pub fn verb(&self, verb: Method) -> Request<'_, M> {
        Request::new(self).verb(verb)
    }

    pub fn get(&self) -> Request<'_, M> {
        self.verb(Method::GET)
    }

    pub fn post(&self) -> Request<'_, M> {
        self.verb(Method::POST)
    }

    pub fn put(&self) -> Request<'_, M> {
        self.verb(Method::PUT)
    }

    pub fn patch(&self) -> Request<'_, M> {
        self.verb(Method::PATCH)
    }

    pub fn delete(&self) -> Request<'_, M> {
        self.verb(Method::DELETE)
    }
}

impl<M> std::fmt::Debug for Client<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base", &self.base.as_str())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::Recording;

    fn client(base: &str) -> Client {
        Client::new(base.parse().unwrap(), ContentConfig::default(), Recording::new())
    }

    #[test]
    fn test_base_url_gains_trailing_slash() {
        let client = client("https://example.com/api/v1");
        assert_eq!(client.base_url().as_str(), "https://example.com/api/v1/");
    }

    #[test]
    fn test_base_url_drops_query_and_fragment() {
        let client = client("https://example.com/api/?watch=true#frag");
        assert_eq!(client.base_url().as_str(), "https://example.com/api/");
    }

    #[test]
    fn test_empty_content_type_defaults_to_json() {
        let client = client("https://example.com/");
        assert_eq!(client.content.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_for_config_wires_base_url_and_defaults() {
        let mut config = Config::new("example.com:8080");
        config.api_path = "api/v1".into();
        config.round_tripper = Some(Recording::new());
        config.timeout = Some(Duration::from_secs(5));

        let client = Client::for_config(config).unwrap();
        assert_eq!(client.base_url().as_str(), "http://example.com:8080/api/v1/");
        assert_eq!(client.default_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_for_config_derives_limiter_from_qps_hints() {
        let mut config = Config::new("https://example.com");
        config.round_tripper = Some(Recording::new());
        config.qps = 2.0;
        config.burst = 1;

        let client = Client::for_config(config).unwrap();
        let limiter = client.rate_limiter().expect("limiter from hints");
        assert_eq!(limiter.qps(), 2.0);
        assert!(limiter.try_acquire());
        // burst of one is spent
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_for_config_without_hints_has_no_limiter() {
        let mut config = Config::new("https://example.com");
        config.round_tripper = Some(Recording::new());
        let client = Client::for_config(config).unwrap();
        assert!(client.rate_limiter().is_none());
    }

    #[test]
    fn test_for_config_rejects_bad_host() {
        assert!(Client::for_config(Config::new("")).is_err());
    }

    #[test]
    fn test_clone_shares_transport() {
        let client = client("https://example.com/");
        let cloned = client.clone();
        assert!(Arc::ptr_eq(&client.transport, &cloned.transport));
    }
}
