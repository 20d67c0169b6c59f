//! Body codecs.
//!
//! A [`Marshaler`] turns a request value into bytes and response bytes back
//! into a caller-supplied type. The default is [`JsonMarshaler`]; the client
//! is generic over the marshaler so alternative codecs plug in without
//! dynamic dispatch.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Error;

/// Default content type used when neither the response nor the client
/// configuration specifies one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Encodes request bodies and decodes response bodies.
pub trait Marshaler: Clone + Send + Sync {
    /// Encode a value into body bytes.
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Error>;

    /// Decode body bytes into a value.
    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, Error>;
}

/// JSON codec backed by serde_json.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMarshaler;

impl Marshaler for JsonMarshaler {
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(value).map_err(|e| Error::Encode(e.to_string()))
    }

    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, Error> {
        serde_json::from_slice(data).map_err(|e| Error::Decode(e.to_string()))
    }
}
