//! Deferred decoding of finished calls.

use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::Error;
use crate::codec::{JsonMarshaler, Marshaler};

/// Outcome of a dispatched request: raw bytes plus everything needed to
/// decode them later.
///
/// Decoding is deferred so one call site can inspect the status, hand the
/// raw body to one consumer, and decode for another. Once any accessor
/// observes an error the result is poisoned: every later accessor returns
/// that same error, so a decode failure cannot be silently shadowed by a
/// later successful-looking read.
#[derive(Clone, Debug)]
pub struct CallResult<M = JsonMarshaler> {
    body: Bytes,
    content_type: String,
    status: Option<StatusCode>,
    err: Option<Error>,
    codec: Option<M>,
}

impl<M: Marshaler> CallResult<M> {
    pub(crate) fn new(
        body: Bytes,
        content_type: String,
        status: StatusCode,
        codec: Option<M>,
    ) -> Self {
        Self {
            body,
            content_type,
            status: Some(status),
            err: None,
            codec,
        }
    }

    /// Result for a request that failed before producing a response.
    pub(crate) fn from_error(err: Error) -> Self {
        Self {
            body: Bytes::new(),
            content_type: String::new(),
            status: None,
            err: Some(err),
            codec: None,
        }
    }

    /// The raw response body, or the recorded error.
    pub fn raw(&self) -> Result<Bytes, Error> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(self.body.clone()),
        }
    }

    /// Decode the body into `T` with the configured codec.
    ///
    /// Fails with the recorded error if one exists, [`Error::NoCodec`]
    /// when no codec is configured, and [`Error::EmptyBody`] for a
    /// zero-length body. Any failure is recorded on the result.
    pub fn decode_into<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        let outcome = match &self.codec {
            None => Err(Error::NoCodec {
                content_type: self.content_type.clone(),
            }),
            Some(_) if self.body.is_empty() => Err(Error::EmptyBody {
                status: self.status.map(|s| s.as_u16()).unwrap_or_default(),
                content_type: self.content_type.clone(),
            }),
            Some(codec) => codec.unmarshal(&self.body),
        };
        match outcome {
            Ok(value) => Ok(value),
            Err(err) => {
                self.err = Some(err.clone());
                Err(err)
            }
        }
    }

    /// HTTP status of the response, absent when the request never produced
    /// one.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    /// Content type the response arrived with (or the client default when
    /// the response carried none).
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The recorded error, if any.
    pub fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Widget {
        name: String,
        count: u32,
    }

    fn result(body: &'static str) -> CallResult {
        CallResult::new(
            Bytes::from_static(body.as_bytes()),
            "application/json".to_owned(),
            StatusCode::OK,
            Some(JsonMarshaler),
        )
    }

    #[test]
    fn test_decode_into_parses_body() {
        let mut res = result(r#"{"name":"bolt","count":3}"#);
        let widget: Widget = res.decode_into().unwrap();
        assert_eq!(
            widget,
            Widget {
                name: "bolt".into(),
                count: 3
            }
        );
        assert!(res.error().is_none());
    }

    #[test]
    fn test_raw_and_decode_read_the_same_body() {
        let mut res = result(r#"{"name":"bolt","count":3}"#);
        let raw = res.raw().unwrap();
        let widget: Widget = res.decode_into().unwrap();
        assert_eq!(raw, Bytes::from_static(br#"{"name":"bolt","count":3}"#));
        assert_eq!(widget.count, 3);
    }

    #[test]
    fn test_empty_body_reports_status_and_content_type() {
        let mut res = result("");
        let err = res.decode_into::<Widget>().unwrap_err();
        match err {
            Error::EmptyBody {
                status,
                content_type,
            } => {
                assert_eq!(status, 200);
                assert_eq!(content_type, "application/json");
            }
            other => panic!("expected EmptyBody, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_codec_errors() {
        let mut res: CallResult = CallResult::new(
            Bytes::from_static(b"{}"),
            "application/msgpack".to_owned(),
            StatusCode::OK,
            None,
        );
        let err = res.decode_into::<Widget>().unwrap_err();
        assert!(matches!(err, Error::NoCodec { .. }));
    }

    #[test]
    fn test_decode_failure_poisons_later_reads() {
        let mut res = result("not json");
        assert!(matches!(
            res.decode_into::<Widget>().unwrap_err(),
            Error::Decode(_)
        ));
        // the failure sticks: raw() now reports it too
        assert!(matches!(res.raw().unwrap_err(), Error::Decode(_)));
        assert!(res.error().is_some());
    }

    #[test]
    fn test_from_error_short_circuits_everything() {
        let mut res: CallResult = CallResult::from_error(Error::Transport("refused".into()));
        assert!(matches!(res.raw().unwrap_err(), Error::Transport(_)));
        assert!(matches!(
            res.decode_into::<Widget>().unwrap_err(),
            Error::Transport(_)
        ));
        assert!(res.status_code().is_none());
    }
}
