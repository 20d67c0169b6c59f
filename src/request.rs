//! Fluent request builder.
//!
//! Every builder method takes and returns the builder by value, so a call
//! chain reads top to bottom and ends in [`Request::send`]. Failures along
//! the chain are sticky: the first error is recorded and later fallible
//! steps become no-ops, so error handling happens exactly once, at send
//! time.

use std::io::Read;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use url::Url;

use crate::Error;
use crate::client::Client;
use crate::codec::{JsonMarshaler, Marshaler};
use crate::params::{Params, UrlValues, encode_parameters};
use crate::response::CallResult;

/// Single-use builder for one HTTP call.
///
/// Created by the verb methods on [`Client`]; consumed by [`send`].
///
/// [`send`]: Request::send
pub struct Request<'c, M = JsonMarshaler> {
    client: &'c Client<M>,
    verb: Method,
    path_prefix: String,
    params: UrlValues,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    err: Option<Error>,
}

impl<'c, M: Marshaler> Request<'c, M> {
    pub(crate) fn new(client: &'c Client<M>) -> Self {
        let mut request = Self {
            client,
            verb: Method::GET,
            path_prefix: String::new(),
            params: UrlValues::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: client.default_timeout,
            err: None,
        };
        let accept = if !client.content.accept_content_types.is_empty() {
            Some(format!("{}, */*", client.content.accept_content_types))
        } else if !client.content.content_type.is_empty() {
            Some(format!("{}, */*", client.content.content_type))
        } else {
            None
        };
        if let Some(accept) = accept {
            request = request.set_header(ACCEPT, accept);
        }
        request
    }

    /// Set the HTTP method. Applies even after an earlier error.
    pub fn verb(mut self, verb: Method) -> Self {
        self.verb = verb;
        self
    }

    /// Set a header, replacing any existing values under the same name.
    ///
    /// Applies even after an earlier error; an unparseable name or value
    /// becomes the recorded error instead.
    pub fn set_header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let Ok(name) = name.try_into() else {
            self.fail(Error::Encode("invalid header name".into()));
            return self;
        };
        let Ok(value) = value.try_into() else {
            self.fail(Error::Encode(format!("invalid value for header {name:?}")));
            return self;
        };
        self.headers.insert(name, value);
        self
    }

    /// Replace the request path outright. Applies even after an earlier
    /// error.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path_prefix = path.into();
        self
    }

    /// Append path segments, joined and cleaned with `/`.
    pub fn prefix<I>(mut self, segments: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        if self.err.is_some() {
            return self;
        }
        self.path_prefix = join_paths(&self.path_prefix, segments);
        self
    }

    /// Set the path and query from a request URI, absolute or relative to
    /// the client's base URL.
    ///
    /// The path replaces the current one; each query key in the URI
    /// replaces all accumulated values under that key.
    pub fn request_uri(mut self, uri: &str) -> Self {
        if self.err.is_some() {
            return self;
        }
        let parsed = match Url::parse(uri) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                match self.client.base_url().join(uri) {
                    Ok(url) => url,
                    Err(e) => {
                        self.fail(Error::InvalidUrl(format!("{uri:?}: {e}")));
                        return self;
                    }
                }
            }
            Err(e) => {
                self.fail(Error::InvalidUrl(format!("{uri:?}: {e}")));
                return self;
            }
        };
        self.path_prefix = parsed.path().to_owned();
        let mut incoming = UrlValues::new();
        for (key, value) in parsed.query_pairs() {
            incoming.add(key, value);
        }
        for (key, values) in incoming.iter() {
            self.params.set_all(key, values.to_vec());
        }
        self
    }

    /// Append one query parameter value.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if self.err.is_some() {
            return self;
        }
        self.params.add(name, value);
        self
    }

    /// Encode a parameter struct into the query, appending to any values
    /// already set.
    pub fn params<P: Params>(mut self, obj: &P) -> Self {
        if self.err.is_some() {
            return self;
        }
        match encode_parameters(obj) {
            Ok(values) => self.params.merge(values),
            Err(err) => self.fail(err),
        }
        self
    }

    /// Set the request deadline, covering dispatch and any retries.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if self.err.is_some() {
            return self;
        }
        self.timeout = Some(timeout);
        self
    }

    /// Encode `obj` with the client's codec and use it as the body, with a
    /// matching `Content-Type` header.
    pub fn body<T: Serialize>(mut self, obj: &T) -> Self {
        if self.err.is_some() {
            return self;
        }
        let Some(codec) = &self.client.content.codec else {
            self.fail(Error::NoCodec {
                content_type: self.client.content.content_type.clone(),
            });
            return self;
        };
        match codec.marshal(obj) {
            Ok(encoded) => {
                let content_type = self.client.content.content_type.clone();
                self.body = Some(Bytes::from(encoded));
                self.set_header(CONTENT_TYPE, content_type)
            }
            Err(err) => {
                self.fail(err);
                self
            }
        }
    }

    /// Use raw bytes as the body, bypassing the codec.
    pub fn body_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        if self.err.is_some() {
            return self;
        }
        self.body = Some(bytes.into());
        self
    }

    /// Read a body from `reader`. A read failure becomes the recorded
    /// error.
    pub fn body_reader<R: Read>(mut self, mut reader: R) -> Self {
        if self.err.is_some() {
            return self;
        }
        let mut buf = Vec::new();
        match reader.read_to_end(&mut buf) {
            Ok(_) => self.body = Some(Bytes::from(buf)),
            Err(e) => self.fail(Error::Encode(format!("reading request body: {e}"))),
        }
        self
    }

    /// The error recorded so far, if any.
    pub fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// The final URL: the client's base with the accumulated path and
    /// sorted, percent-encoded query.
    pub fn url(&self) -> Url {
        let mut url = self.client.base_url().clone();
        url.set_path(&self.path_prefix);
        if self.params.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&self.params.encode()));
        }
        url
    }

    /// Dispatch the request and return its result for deferred decoding.
    ///
    /// Latency is observed for every call, including ones that fail before
    /// reaching the transport.
    pub async fn send(self) -> CallResult<M> {
        let client = self.client;
        let verb = self.verb.clone();
        let url = self.url();

        let start = Instant::now();
        let outcome = self.dispatch().await;
        client.latency.observe(&verb, &url, start.elapsed());

        match outcome {
            Ok(result) => result,
            Err(err) => CallResult::from_error(err),
        }
    }

    /// Dispatch and return the raw response body.
    pub async fn send_raw(self) -> Result<Bytes, Error> {
        self.send().await.raw()
    }

    async fn dispatch(mut self) -> Result<CallResult<M>, Error> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }
        let client = self.client;
        let url = self.url();
        let mut req = http::Request::new(self.body.take().unwrap_or_default());
        *req.method_mut() = self.verb.clone();
        *req.uri_mut() = http::Uri::try_from(url.as_str())
            .map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        *req.headers_mut() = std::mem::take(&mut self.headers);

        // admission waits count against the same deadline as the attempts
        let attempts = async {
            if let Some(limiter) = &client.rate_limiter {
                limiter.wait().await?;
            }
            let mut attempt = 0usize;
            loop {
                match client.transport.round_trip(&req).await {
                    Ok(response) => break Ok(response),
                    Err(err) => {
                        attempt += 1;
                        let retry = client
                            .retry
                            .as_ref()
                            .is_some_and(|r| r.should_retry(attempt, &err));
                        if !retry {
                            break Err(err);
                        }
                        tracing::debug!(
                            target: "restkit",
                            verb = %self.verb,
                            url = %url,
                            attempt,
                            error = %err,
                            "retrying request",
                        );
                    }
                }
            }
        };
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, attempts)
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => attempts.await?,
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| client.content.content_type.clone());
        let status = response.status();
        Ok(CallResult::new(
            response.into_body(),
            content_type,
            status,
            client.content.codec.clone(),
        ))
    }

    fn fail(&mut self, err: Error) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }
}

impl<M> std::fmt::Debug for Request<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("verb", &self.verb)
            .field("path_prefix", &self.path_prefix)
            .field("timeout", &self.timeout)
            .field("err", &self.err)
            .finish()
    }
}

/// Join `base` and `segments` with single slashes, dropping empty segments
/// and collapsing duplicate separators.
fn join_paths<I>(base: &str, segments: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut joined = String::from(base);
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        if !joined.is_empty() && !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(segment);
    }
    // collapse any doubled separators introduced by the inputs
    let mut cleaned = String::with_capacity(joined.len());
    for part in joined.split('/').filter(|p| !p.is_empty()) {
        cleaned.push('/');
        cleaned.push_str(part);
    }
    if cleaned.is_empty() && !joined.is_empty() {
        cleaned.push('/');
    }
    if !joined.starts_with('/') {
        cleaned = cleaned.trim_start_matches('/').to_owned();
    }
    cleaned
}
