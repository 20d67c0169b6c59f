//! HTTP transport layer and decoration chain.
//!
//! A [`RoundTripper`] performs one HTTP request and returns one response.
//! Cross-cutting concerns (credentials, user-agent) are layered on top as
//! decorators that wrap an inner round tripper without changing its
//! contract. [`new_transport`] builds the full chain from a
//! [`TransportConfig`]; the base of the chain is either a caller-supplied
//! round tripper or a [`ReqwestTransport`] built from [`TransportSettings`].
//!
//! Decorators are idempotent (a header already present passes through
//! unchanged) and never mutate the caller's request: when a decorator needs
//! to inject a header it works on a clone made by [`clone_request`], so the
//! original request stays reusable across retries.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use http::header::{AUTHORIZATION, USER_AGENT};
use http::{HeaderValue, Request, Response};
use url::Url;

use crate::Error;

/// Boxed future returned by transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outgoing request with a fully buffered body.
pub type HttpRequest = Request<Bytes>;

/// Incoming response with a fully buffered body.
pub type HttpResponse = Response<Bytes>;

/// Performs one HTTP request and returns one response.
///
/// The request is taken by reference: implementations that need to modify
/// it clone first, so the caller's value is never mutated and can be
/// resubmitted (e.g. by retry logic).
pub trait RoundTripper: Send + Sync {
    /// Execute the request.
    fn round_trip(&self, req: &HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>>;
}

impl std::fmt::Debug for dyn RoundTripper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RoundTripper")
    }
}

/// Wraps a round tripper with additional behavior.
pub type WrapperFn = Arc<dyn Fn(Arc<dyn RoundTripper>) -> Arc<dyn RoundTripper> + Send + Sync>;

/// Fold an ordered list of optional wrappers into a single wrapper.
///
/// An empty (or all-absent) list yields `None`; a single present wrapper is
/// returned as-is; otherwise the resulting wrapper applies each present
/// function in list order, so the last wrapper in the list ends up
/// outermost.
pub fn compose<I>(wrappers: I) -> Option<WrapperFn>
where
    I: IntoIterator<Item = Option<WrapperFn>>,
{
    let mut present: Vec<WrapperFn> = wrappers.into_iter().flatten().collect();
    if present.len() <= 1 {
        return present.pop();
    }
    Some(Arc::new(move |base| {
        present
            .iter()
            .fold(base, |rt, wrap| wrap(rt))
    }))
}

/// Shallow copy of a request with an independent deep copy of its headers.
///
/// The `Bytes` body is shared, matching the shallow-body/deep-header clone
/// the decorators rely on.
pub fn clone_request(req: &HttpRequest) -> HttpRequest {
    let mut out = Request::new(req.body().clone());
    *out.method_mut() = req.method().clone();
    *out.uri_mut() = req.uri().clone();
    *out.version_mut() = req.version();
    *out.headers_mut() = req.headers().clone();
    out
}

/// Default dial timeout for the base transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default cap on idle connections per host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 128;
/// Default cap on idle connections across all hosts.
pub const DEFAULT_POOL_MAX_IDLE_TOTAL: usize = 2048;
/// Default idle-connection timeout.
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Default `Expect: 100-continue` timeout.
pub const DEFAULT_EXPECT_CONTINUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection parameters for the default base transport.
///
/// Every knob participates in the transport-cache fingerprint.
/// `pool_max_idle_total` and `expect_continue_timeout` are carried for
/// configurations whose base transport can enforce them; reqwest's pool
/// caps idle connections per host only.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportSettings {
    /// Dial timeout for new connections.
    pub connect_timeout: Duration,
    /// Maximum idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Maximum idle connections kept across all hosts.
    pub pool_max_idle_total: usize,
    /// How long an idle connection stays pooled.
    pub pool_idle_timeout: Duration,
    /// How long to wait for a `100 Continue` before sending the body.
    pub expect_continue_timeout: Duration,
    /// Proxy for all outgoing requests.
    pub proxy: Option<Url>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_max_idle_total: DEFAULT_POOL_MAX_IDLE_TOTAL,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            expect_continue_timeout: DEFAULT_EXPECT_CONTINUE_TIMEOUT,
            proxy: None,
        }
    }
}

/// Connection-only subset of [`Config`](crate::Config), derived once per
/// client and immutable thereafter.
#[derive(Clone, Default)]
pub struct TransportConfig {
    /// Basic-auth username.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Bearer token; takes precedence over basic auth when both are set.
    pub bearer_token: Option<String>,
    /// Value injected as `User-Agent` when the request has none.
    pub user_agent: Option<String>,
    /// Caller-supplied base round tripper, replacing the default transport.
    pub round_tripper: Option<Arc<dyn RoundTripper>>,
    /// Composed wrapper applied closest to the base transport.
    pub wrap_transport: Option<WrapperFn>,
    /// Settings for the default base transport.
    pub settings: TransportSettings,
    /// Cache key, present only when the config is derivable from data
    /// alone. Set by `Config::transport_config`.
    pub(crate) fingerprint: Option<String>,
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("username", &self.username)
            .field("bearer_token", &self.bearer_token.is_some())
            .field("user_agent", &self.user_agent)
            .field("round_tripper", &self.round_tripper.is_some())
            .field("wrap_transport", &self.wrap_transport.is_some())
            .field("settings", &self.settings)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl TransportConfig {
    /// Whether basic-auth credentials are configured.
    pub fn has_basic_auth(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Compose an additional wrapper onto the existing wrap hook.
    ///
    /// A custom wrapper cannot be fingerprinted, so this also makes the
    /// config non-cacheable.
    pub fn wrap(&mut self, wrapper: WrapperFn) {
        self.wrap_transport = compose([self.wrap_transport.take(), Some(wrapper)]);
        self.fingerprint = None;
    }

    /// Cache key for this config, if it is cacheable.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}

/// Build the decorated round tripper for a transport config.
///
/// The base is the caller-supplied round tripper, or a [`ReqwestTransport`]
/// built from the config's settings.
pub fn new_transport(config: &TransportConfig) -> Result<Arc<dyn RoundTripper>, Error> {
    let base: Arc<dyn RoundTripper> = match &config.round_tripper {
        Some(rt) => rt.clone(),
        None => Arc::new(ReqwestTransport::new(&config.settings)?),
    };
    http_wrappers_for_config(config, base)
}

/// Apply the config's decorators to a base round tripper in fixed
/// precedence: the wrap hook (auth provider) innermost, then user-agent,
/// then bearer or basic auth outermost.
pub fn http_wrappers_for_config(
    config: &TransportConfig,
    base: Arc<dyn RoundTripper>,
) -> Result<Arc<dyn RoundTripper>, Error> {
    let mut rt = base;
    if let Some(wrap) = &config.wrap_transport {
        rt = wrap(rt);
    }
    if let Some(agent) = config.user_agent.as_deref().filter(|a| !a.is_empty()) {
        rt = Arc::new(UserAgentRoundTripper::new(agent, rt)?);
    }
    if let Some(token) = config.bearer_token.as_deref().filter(|t| !t.is_empty()) {
        rt = Arc::new(BearerAuthRoundTripper::new(token, rt)?);
    } else if config.has_basic_auth() {
        rt = Arc::new(BasicAuthRoundTripper::new(
            config.username.as_deref().unwrap_or_default(),
            config.password.as_deref().unwrap_or_default(),
            rt,
        )?);
    }
    Ok(rt)
}

/// Injects a `User-Agent` header when the request carries none.
pub struct UserAgentRoundTripper {
    agent: HeaderValue,
    inner: Arc<dyn RoundTripper>,
}

impl UserAgentRoundTripper {
    /// Wrap `inner`, injecting `agent` as the user agent.
    pub fn new(agent: &str, inner: Arc<dyn RoundTripper>) -> Result<Self, Error> {
        let agent = HeaderValue::from_str(agent)
            .map_err(|_| Error::Encode(format!("invalid user agent {agent:?}")))?;
        Ok(Self { agent, inner })
    }
}

impl RoundTripper for UserAgentRoundTripper {
    fn round_trip(&self, req: &HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        if req.headers().contains_key(USER_AGENT) {
            return self.inner.round_trip(req);
        }
        let mut req = clone_request(req);
        req.headers_mut().insert(USER_AGENT, self.agent.clone());
        self.inner.round_trip(&req)
    }
}

/// Injects an `Authorization: Basic ...` header when the request carries no
/// `Authorization` header.
pub struct BasicAuthRoundTripper {
    header: HeaderValue,
    inner: Arc<dyn RoundTripper>,
}

impl BasicAuthRoundTripper {
    /// Wrap `inner`, injecting credentials for `username` and `password`.
    pub fn new(
        username: &str,
        password: &str,
        inner: Arc<dyn RoundTripper>,
    ) -> Result<Self, Error> {
        let encoded = BASE64.encode(format!("{username}:{password}"));
        let mut header = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|_| Error::Auth("invalid basic-auth credentials".into()))?;
        header.set_sensitive(true);
        Ok(Self { header, inner })
    }
}

impl RoundTripper for BasicAuthRoundTripper {
    fn round_trip(&self, req: &HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        if req.headers().contains_key(AUTHORIZATION) {
            return self.inner.round_trip(req);
        }
        let mut req = clone_request(req);
        req.headers_mut().insert(AUTHORIZATION, self.header.clone());
        self.inner.round_trip(&req)
    }
}

/// Injects an `Authorization: Bearer ...` header when the request carries
/// no `Authorization` header.
pub struct BearerAuthRoundTripper {
    header: HeaderValue,
    inner: Arc<dyn RoundTripper>,
}

impl BearerAuthRoundTripper {
    /// Wrap `inner`, injecting `token` as a bearer credential.
    pub fn new(token: &str, inner: Arc<dyn RoundTripper>) -> Result<Self, Error> {
        let mut header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Auth("invalid bearer token".into()))?;
        header.set_sensitive(true);
        Ok(Self { header, inner })
    }
}

impl RoundTripper for BearerAuthRoundTripper {
    fn round_trip(&self, req: &HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        if req.headers().contains_key(AUTHORIZATION) {
            return self.inner.round_trip(req);
        }
        let mut req = clone_request(req);
        req.headers_mut().insert(AUTHORIZATION, self.header.clone());
        self.inner.round_trip(&req)
    }
}

/// Base transport backed by a pooled reqwest client.
///
/// Reads every response body to completion before returning, so responses
/// carry owned bytes; a body that cannot be read surfaces as the retryable
/// [`Error::BodyRead`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a pooled transport from connection settings.
    pub fn new(settings: &TransportSettings) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .pool_idle_timeout(settings.pool_idle_timeout);
        if let Some(proxy) = &settings.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| Error::Transport(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transport(format!("building transport: {e}")))?;
        Ok(Self { client })
    }
}

impl RoundTripper for ReqwestTransport {
    fn round_trip(&self, req: &HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        let client = self.client.clone();
        let req = clone_request(req);
        Box::pin(async move {
            let req = reqwest::Request::try_from(req)
                .map_err(|e| Error::Transport(format!("building outgoing request: {e}")))?;
            let resp = client
                .execute(req)
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;

            let status = resp.status();
            let version = resp.version();
            let headers = resp.headers().clone();
            let body = resp
                .bytes()
                .await
                .map_err(|e| Error::BodyRead(e.to_string()))?;

            let mut out = Response::new(body);
            *out.status_mut() = status;
            *out.version_mut() = version;
            *out.headers_mut() = headers;
            Ok(out)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use http::Method;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Round tripper that records every request it sees and returns an
    /// empty 200 response.
    pub(crate) struct Recording {
        pub(crate) seen: Mutex<Vec<HttpRequest>>,
    }

    impl Recording {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl RoundTripper for Recording {
        fn round_trip(
            &self,
            req: &HttpRequest,
        ) -> BoxFuture<'static, Result<HttpResponse, Error>> {
            self.seen.lock().unwrap().push(clone_request(req));
            Box::pin(async { Ok(Response::new(Bytes::new())) })
        }
    }

    fn request() -> HttpRequest {
        let mut req = Request::new(Bytes::new());
        *req.method_mut() = Method::GET;
        *req.uri_mut() = "http://localhost/api".parse().unwrap();
        req
    }

    #[tokio::test]
    async fn test_user_agent_injected_when_absent() {
        let recording = Recording::new();
        let rt = UserAgentRoundTripper::new("restkit/1.0", recording.clone()).unwrap();

        let req = request();
        rt.round_trip(&req).await.unwrap();

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen[0].headers().get(USER_AGENT).unwrap(), "restkit/1.0");
        // the caller's request is untouched
        assert!(req.headers().get(USER_AGENT).is_none());
    }

    #[tokio::test]
    async fn test_user_agent_passthrough_when_present() {
        let recording = Recording::new();
        let rt = UserAgentRoundTripper::new("restkit/1.0", recording.clone()).unwrap();

        let mut req = request();
        req.headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static("custom/2.0"));
        rt.round_trip(&req).await.unwrap();

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen[0].headers().get(USER_AGENT).unwrap(), "custom/2.0");
    }

    #[tokio::test]
    async fn test_basic_auth_idempotent() {
        let recording = Recording::new();
        let rt = BasicAuthRoundTripper::new("user", "pass", recording.clone()).unwrap();

        let mut req = request();
        req.headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer preset"));
        rt.round_trip(&req).await.unwrap();

        // passed through unmodified
        let seen = recording.seen.lock().unwrap();
        assert_eq!(
            seen[0].headers().get(AUTHORIZATION).unwrap(),
            "Bearer preset"
        );
        assert_eq!(req.headers().get(AUTHORIZATION).unwrap(), "Bearer preset");
    }

    #[tokio::test]
    async fn test_basic_auth_injected_when_absent() {
        let recording = Recording::new();
        let rt = BasicAuthRoundTripper::new("user", "pass", recording.clone()).unwrap();

        let req = request();
        rt.round_trip(&req).await.unwrap();

        let seen = recording.seen.lock().unwrap();
        let value = seen[0].headers().get(AUTHORIZATION).unwrap();
        // base64("user:pass")
        assert_eq!(value, "Basic dXNlcjpwYXNz");
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_chain_execution_order_and_caller_immutability() {
        let recording = Recording::new();
        let config = TransportConfig {
            username: Some("user".into()),
            password: Some("pass".into()),
            user_agent: Some("restkit/1.0".into()),
            round_tripper: Some(recording.clone()),
            ..TransportConfig::default()
        };
        let chain = new_transport(&config).unwrap();

        let req = request();
        chain.round_trip(&req).await.unwrap();

        let seen = recording.seen.lock().unwrap();
        assert!(seen[0].headers().contains_key(USER_AGENT));
        assert!(seen[0].headers().contains_key(AUTHORIZATION));
        // the pre-decoration request object carries neither header
        assert!(req.headers().is_empty());
    }

    #[tokio::test]
    async fn test_bearer_takes_precedence_over_basic() {
        let recording = Recording::new();
        let config = TransportConfig {
            username: Some("user".into()),
            password: Some("pass".into()),
            bearer_token: Some("tok123".into()),
            round_tripper: Some(recording.clone()),
            ..TransportConfig::default()
        };
        let chain = new_transport(&config).unwrap();

        chain.round_trip(&request()).await.unwrap();

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen[0].headers().get(AUTHORIZATION).unwrap(), "Bearer tok123");
    }

    #[test]
    fn test_compose_empty_is_none() {
        assert!(compose([]).is_none());
        assert!(compose([None, None]).is_none());
    }

    #[test]
    fn test_compose_skips_absent_and_applies_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let tag = |label: &'static str, order: Arc<Mutex<Vec<&'static str>>>| -> WrapperFn {
            Arc::new(move |rt| {
                order.lock().unwrap().push(label);
                rt
            })
        };

        let wrap = compose([
            None,
            Some(tag("inner", order.clone())),
            Some(tag("outer", order.clone())),
        ])
        .unwrap();

        let base: Arc<dyn RoundTripper> = Recording::new();
        let _ = wrap(base);
        assert_eq!(*order.lock().unwrap(), vec!["inner", "outer"]);
    }

    #[test]
    fn test_clone_request_deep_copies_headers() {
        let mut req = request();
        req.headers_mut()
            .insert("x-a", HeaderValue::from_static("1"));

        let mut cloned = clone_request(&req);
        cloned
            .headers_mut()
            .insert("x-b", HeaderValue::from_static("2"));

        assert!(req.headers().get("x-b").is_none());
        assert_eq!(cloned.headers().get("x-a").unwrap(), "1");
        assert_eq!(cloned.method(), req.method());
        assert_eq!(cloned.uri(), req.uri());
    }

    #[tokio::test]
    async fn test_decorators_are_stateless_across_requests() {
        let counter = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>);
        impl RoundTripper for Counting {
            fn round_trip(
                &self,
                _req: &HttpRequest,
            ) -> BoxFuture<'static, Result<HttpResponse, Error>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(Response::new(Bytes::new())) })
            }
        }

        let rt =
            UserAgentRoundTripper::new("restkit/1.0", Arc::new(Counting(counter.clone()))).unwrap();
        for _ in 0..3 {
            rt.round_trip(&request()).await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
