//! Declarative client configuration.
//!
//! A [`Config`] describes everything needed to build a
//! [`Client`](crate::Client): where to connect, how to authenticate, which
//! codec to speak, and which policy hooks to install. The connection-only
//! subset is split off as a
//! [`TransportConfig`](crate::transport::TransportConfig) so equivalent
//! configs can share a pooled transport through a
//! [`TransportCache`](crate::cache::TransportCache).

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::Error;
use crate::auth::{AuthConfig, AuthProvider, SignedTokenProvider};
use crate::cache::TransportCache;
use crate::codec::{JsonMarshaler, Marshaler};
use crate::latency::LatencyObserver;
use crate::rate::{RateLimiter, Retry};
use crate::transport::{
    RoundTripper, TransportConfig, TransportSettings, WrapperFn, compose, new_transport,
};

/// Content negotiation and codec selection for a client.
#[derive(Clone, Debug)]
pub struct ContentConfig<M = JsonMarshaler> {
    /// Value preferred in the outgoing `Accept` header. Falls back to
    /// `content_type` when empty.
    pub accept_content_types: String,
    /// Media type of request bodies; defaults to `application/json` when
    /// left empty.
    pub content_type: String,
    /// Codec for request and response bodies. `None` turns typed encoding
    /// and decoding into [`Error::NoCodec`].
    pub codec: Option<M>,
}

impl<M: Default> Default for ContentConfig<M> {
    fn default() -> Self {
        Self {
            accept_content_types: String::new(),
            content_type: String::new(),
            codec: Some(M::default()),
        }
    }
}

/// Everything needed to build a [`Client`](crate::Client).
///
/// Plain-data fields participate in the transport-cache fingerprint;
/// opaque hooks (`round_tripper`, `wrap_transport`, a provider without an
/// [`AuthConfig`]) make the config non-cacheable.
#[derive(Clone)]
pub struct Config<M = JsonMarshaler> {
    /// Server to connect to, either a full URL or a `host:port` pair
    /// (scheme defaults to `http`).
    pub host: String,
    /// Path prefix under which every request path is rooted, e.g. `/api/v1`.
    pub api_path: String,
    /// Content negotiation and codec selection.
    pub content: ContentConfig<M>,

    /// Basic-auth username.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Bearer token; takes precedence over basic auth when both are set.
    pub bearer_token: Option<String>,
    /// Value injected as `User-Agent` when a request sets none.
    pub user_agent: Option<String>,

    /// Declarative auth provider selection.
    pub auth_config: Option<AuthConfig>,
    /// Explicit auth provider, overriding `auth_config` resolution.
    pub auth_provider: Option<Arc<dyn AuthProvider>>,

    /// Caller-supplied base round tripper, replacing the default transport.
    pub round_tripper: Option<Arc<dyn RoundTripper>>,
    /// Wrapper applied closest to the base transport.
    pub wrap_transport: Option<WrapperFn>,
    /// Settings for the default base transport.
    pub settings: TransportSettings,
    /// Cache consulted when building the transport.
    pub transport_cache: Option<Arc<TransportCache>>,

    /// Steady-state requests per second. When no explicit `rate_limiter`
    /// is set and this is positive, [`Client::for_config`] installs a
    /// token-bucket limiter from these hints.
    ///
    /// [`Client::for_config`]: crate::Client::for_config
    pub qps: f32,
    /// Burst allowance for the hint-derived limiter.
    pub burst: usize,
    /// Admission control consulted before each request, overriding the
    /// qps/burst hints.
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    /// Policy deciding whether failed attempts are resubmitted.
    pub retry: Option<Arc<dyn Retry>>,
    /// Default per-request deadline, overridable per request.
    pub timeout: Option<Duration>,
    /// Observer for per-request latency; defaults to the `tracing` emitter.
    pub latency: Option<Arc<dyn LatencyObserver>>,
}

impl<M: Default> Default for Config<M> {
    fn default() -> Self {
        Self {
            host: String::new(),
            api_path: String::new(),
            content: ContentConfig::default(),
            username: None,
            password: None,
            bearer_token: None,
            user_agent: None,
            auth_config: None,
            auth_provider: None,
            round_tripper: None,
            wrap_transport: None,
            settings: TransportSettings::default(),
            transport_cache: None,
            qps: 0.0,
            burst: 0,
            rate_limiter: None,
            retry: None,
            timeout: None,
            latency: None,
        }
    }
}

impl<M> std::fmt::Debug for Config<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("api_path", &self.api_path)
            .field("username", &self.username)
            .field("bearer_token", &self.bearer_token.is_some())
            .field("user_agent", &self.user_agent)
            .field("auth_config", &self.auth_config)
            .field("auth_provider", &self.auth_provider.is_some())
            .field("round_tripper", &self.round_tripper.is_some())
            .field("wrap_transport", &self.wrap_transport.is_some())
            .field("settings", &self.settings)
            .field("qps", &self.qps)
            .field("burst", &self.burst)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config<JsonMarshaler> {
    /// JSON-speaking config for `host` with every other field at its
    /// default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

impl<M: Marshaler> Config<M> {
    /// Parse `host` and `api_path` into the client's base URL.
    pub fn parse_base_url(&self) -> Result<Url, Error> {
        if self.host.is_empty() {
            return Err(Error::InvalidUrl(
                "host must be a URL or a host:port pair".into(),
            ));
        }
        let base = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("http://{}", self.host)
        };
        let mut url =
            Url::parse(&base).map_err(|e| Error::InvalidUrl(format!("{base:?}: {e}")))?;
        if url.host_str().is_none() {
            return Err(Error::InvalidUrl(format!(
                "host {:?} must be a URL or a host:port pair",
                self.host
            )));
        }
        if !self.api_path.is_empty() {
            let joined = format!(
                "{}/{}",
                url.path().trim_end_matches('/'),
                self.api_path.trim_matches('/')
            );
            url.set_path(&joined);
        }
        Ok(url)
    }

    /// Derive the connection-only subset of this config.
    ///
    /// Resolves the auth provider (explicit, or by [`AuthConfig`] name) and
    /// installs its transport wrapper. The fingerprint is computed first,
    /// from plain data only, so a config whose auth is described by an
    /// `AuthConfig` stays cacheable.
    pub fn transport_config(&self) -> Result<TransportConfig, Error> {
        let mut conf = TransportConfig {
            username: self.username.clone(),
            password: self.password.clone(),
            bearer_token: self.bearer_token.clone(),
            user_agent: self.user_agent.clone(),
            round_tripper: self.round_tripper.clone(),
            wrap_transport: self.wrap_transport.clone(),
            settings: self.settings.clone(),
            fingerprint: None,
        };

        let opaque = conf.round_tripper.is_some()
            || conf.wrap_transport.is_some()
            || (self.auth_provider.is_some() && self.auth_config.is_none());
        if !opaque {
            conf.fingerprint = Some(fingerprint_for(&conf, self.auth_config.as_ref()));
        }

        let provider: Option<Arc<dyn AuthProvider>> = match (&self.auth_provider, &self.auth_config)
        {
            (Some(provider), _) => Some(provider.clone()),
            (None, Some(config)) => Some(provider_for(config)?),
            (None, None) => None,
        };
        if let Some(provider) = provider {
            let wrap: WrapperFn = Arc::new(move |rt| provider.wrap_transport(rt));
            conf.wrap_transport = compose([conf.wrap_transport.take(), Some(wrap)]);
        }
        Ok(conf)
    }

    /// Build the decorated transport, sharing it through the configured
    /// cache when the config is cacheable.
    pub fn build_transport(&self) -> Result<Arc<dyn RoundTripper>, Error> {
        let conf = self.transport_config()?;
        match (&self.transport_cache, conf.fingerprint()) {
            (Some(cache), Some(key)) => cache.get_or_create(key, || new_transport(&conf)),
            _ => new_transport(&conf),
        }
    }
}

/// Resolve a declarative [`AuthConfig`] to its provider by name.
pub fn provider_for(config: &AuthConfig) -> Result<Arc<dyn AuthProvider>, Error> {
    match config.name.as_str() {
        SignedTokenProvider::NAME => Ok(Arc::new(SignedTokenProvider::from_config(config)?)),
        other => Err(Error::Auth(format!("unknown auth provider {other:?}"))),
    }
}

fn fingerprint_for(conf: &TransportConfig, auth: Option<&AuthConfig>) -> String {
    let s = &conf.settings;
    format!(
        "ua={:?};user={:?};pass={:?};bearer={:?};proxy={:?};connect={:?};idle_host={};idle_total={};idle_timeout={:?};expect_continue={:?};auth={auth:?}",
        conf.user_agent,
        conf.username,
        conf.password,
        conf.bearer_token,
        s.proxy.as_ref().map(Url::as_str),
        s.connect_timeout,
        s.pool_max_idle_per_host,
        s.pool_max_idle_total,
        s.pool_idle_timeout,
        s.expect_continue_timeout,
    )
}
