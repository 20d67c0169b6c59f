//! Configurable REST client core.
//!
//! restkit layers a typed, fluent request API over a decorated HTTP
//! transport:
//!
//! - **Transport decoration**: cross-cutting concerns (user-agent, basic
//!   auth, bearer tokens, signed request tokens) are [`RoundTripper`]
//!   decorators composed around a pooled base transport. Decorators are
//!   idempotent and never mutate the caller's request.
//! - **Fluent requests**: [`Client`] verb methods open a [`Request`]
//!   builder whose first failure is sticky, so a whole chain is written
//!   without intermediate error handling and checked once at send time.
//! - **Typed parameters**: the [`params!`] macro derives a struct⇄query
//!   codec with per-field names and defaults; zero values are skipped and
//!   keys encode in sorted order.
//! - **Deferred decoding**: [`CallResult`] carries the raw body, status,
//!   and codec, so callers choose between [`CallResult::raw`] bytes and
//!   [`CallResult::decode_into`] after inspecting the outcome.
//!
//! # Example
//!
//! ```no_run
//! use restkit::{Client, Config};
//! use serde::Deserialize;
//!
//! restkit::params! {
//!     struct ListOptions {
//!         limit: u32 => "limit",
//!         page: u32 => "page" | "1",
//!     }
//! }
//!
//! #[derive(Deserialize)]
//! struct Widget {
//!     name: String,
//! }
//!
//! # async fn run() -> Result<(), restkit::Error> {
//! let mut config = Config::new("https://api.example.com");
//! config.api_path = "/v1".into();
//! config.user_agent = Some("widgetctl/1.0".into());
//! let client = Client::for_config(config)?;
//!
//! let widget: Widget = client
//!     .get()
//!     .path("/v1/widgets/42")
//!     .params(&ListOptions { limit: 10, page: 0 })
//!     .send()
//!     .await
//!     .decode_into()?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod latency;
pub mod params;
pub mod rate;
pub mod request;
pub mod response;
pub mod transport;

pub use auth::{AuthConfig, AuthProvider, NullAuthProvider, SignedTokenProvider};
pub use cache::TransportCache;
pub use client::Client;
pub use codec::{DEFAULT_CONTENT_TYPE, JsonMarshaler, Marshaler};
pub use config::{Config, ContentConfig};
pub use error::Error;
pub use latency::{LatencyObserver, TracingLatency};
pub use params::{Params, UrlValues};
pub use rate::{NoLimit, NoRetry, RateLimiter, Retry, RetryOnTransportError, TokenBucket};
pub use request::Request;
pub use response::CallResult;
pub use transport::{RoundTripper, TransportConfig, TransportSettings, WrapperFn};
