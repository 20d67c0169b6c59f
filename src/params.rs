//! Query-string parameter codec.
//!
//! Maps plain structs to and from query-string key/value pairs through an
//! explicit, compile-time field mapping: the [`params!`](crate::params!)
//! macro generates a [`Params`] implementation from a declarative field
//! list, replacing the tag syntax `param:"name[,default]"` / `param:"-"`
//! with `field: Ty => "name"` (optionally `| "default"`) and `=> -`.
//!
//! Kinds outside the supported set (strings, booleans, integers, floats)
//! do not implement [`ParamValue`], so a mapping over them is rejected at
//! compile time.
//!
//! # Example
//!
//! ```
//! restkit::params! {
//!     pub struct ListOptions {
//!         pub name: String => "name",
//!         pub age: u32 => "age" | "18",
//!         pub internal: bool => -,
//!     }
//! }
//!
//! let opts = ListOptions { name: "yao".into(), age: 20, internal: true };
//! let values = restkit::params::encode_parameters(&opts).unwrap();
//! assert_eq!(values.encode(), "age=20&name=yao");
//! ```

use std::collections::BTreeMap;

use crate::Error;

/// Ordered, multi-valued query parameters.
///
/// Keys iterate in lexicographic order; each key's values keep insertion
/// order. [`UrlValues::encode`] therefore produces a canonical query string
/// independent of insertion order, a required determinism property for
/// testability and cache-key stability.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlValues {
    inner: BTreeMap<String, Vec<String>>,
}

impl UrlValues {
    /// Create an empty value set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to a key, keeping any existing values.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Replace all values of a key with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    /// Replace all values of a key.
    pub fn set_all(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.inner.insert(key.into(), values);
    }

    /// First value recorded for a key, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|vs| vs.first())
            .map(String::as_str)
    }

    /// All values recorded for a key.
    pub fn get_all(&self, key: &str) -> Option<&[String]> {
        self.inner.get(key).map(Vec::as_slice)
    }

    /// Append every value of `other` to this set, key by key.
    pub fn merge(&mut self, other: UrlValues) {
        for (key, values) in other.inner {
            self.inner.entry(key).or_default().extend(values);
        }
    }

    /// Whether no parameters have been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over `(key, values)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Canonical percent-encoded query string: keys sorted, per-key values
    /// in insertion order.
    pub fn encode(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.inner {
            for value in values {
                ser.append_pair(key, value);
            }
        }
        ser.finish()
    }
}

/// A field kind the parameter codec can convert.
pub trait ParamValue: Sized {
    /// Type name used in conversion error messages.
    const EXPECTED: &'static str;

    /// Whether the value is its kind's zero value; zero-valued fields are
    /// omitted on encode.
    fn is_zero(&self) -> bool;

    /// Stringify for the query string. `None` means the kind is not
    /// encodable and the field is silently skipped.
    fn encode(&self) -> Option<String>;

    /// Convert a raw query-string value, naming `key` on failure.
    fn decode(raw: &str, key: &str) -> Result<Self, Error>;
}

impl ParamValue for String {
    const EXPECTED: &'static str = "string";

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn encode(&self) -> Option<String> {
        Some(self.clone())
    }

    fn decode(raw: &str, _key: &str) -> Result<Self, Error> {
        Ok(raw.to_owned())
    }
}

impl ParamValue for bool {
    const EXPECTED: &'static str = "bool";

    fn is_zero(&self) -> bool {
        !*self
    }

    fn encode(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn decode(raw: &str, key: &str) -> Result<Self, Error> {
        raw.parse().map_err(|_| Error::ParamParse {
            expected: Self::EXPECTED,
            value: raw.to_owned(),
            key: key.to_owned(),
        })
    }
}

macro_rules! impl_param_int {
    ($($ty:ty),+) => {
        $(
            impl ParamValue for $ty {
                const EXPECTED: &'static str = stringify!($ty);

                fn is_zero(&self) -> bool {
                    *self == 0
                }

                fn encode(&self) -> Option<String> {
                    Some(self.to_string())
                }

                // parse() rejects overflow for the concrete bit width.
                fn decode(raw: &str, key: &str) -> Result<Self, Error> {
                    raw.parse().map_err(|_| Error::ParamParse {
                        expected: Self::EXPECTED,
                        value: raw.to_owned(),
                        key: key.to_owned(),
                    })
                }
            }
        )+
    };
}

impl_param_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_param_float {
    ($($ty:ty),+) => {
        $(
            impl ParamValue for $ty {
                const EXPECTED: &'static str = stringify!($ty);

                fn is_zero(&self) -> bool {
                    *self == 0.0
                }

                // Floats decode but are not encoded.
                fn encode(&self) -> Option<String> {
                    None
                }

                fn decode(raw: &str, key: &str) -> Result<Self, Error> {
                    raw.parse().map_err(|_| Error::ParamParse {
                        expected: Self::EXPECTED,
                        value: raw.to_owned(),
                        key: key.to_owned(),
                    })
                }
            }
        )+
    };
}

impl_param_float!(f32, f64);

/// A struct with a declared query-parameter mapping.
///
/// Implemented by the [`params!`](crate::params!) macro; hand-written
/// implementations are possible where a macro-generated struct does not fit.
pub trait Params {
    /// Encode every mapped, non-zero field into `values`.
    fn encode_params(&self, values: &mut UrlValues) -> Result<(), Error>;

    /// Fill mapped fields from `values`.
    ///
    /// Fields processed before a conversion failure keep their assigned
    /// values; fields after are left untouched. An absent key with no
    /// declared default leaves the field untouched.
    fn decode_params(&mut self, values: &UrlValues) -> Result<(), Error>;
}

/// Encode a parameter struct into a fresh [`UrlValues`].
pub fn encode_parameters<P: Params>(obj: &P) -> Result<UrlValues, Error> {
    let mut values = UrlValues::new();
    obj.encode_params(&mut values)?;
    Ok(values)
}

/// Decode query values into an existing parameter struct.
pub fn decode_parameters<P: Params>(values: &UrlValues, obj: &mut P) -> Result<(), Error> {
    obj.decode_params(values)
}

/// Declare a parameter struct and its query-string mapping.
///
/// Each field maps to a query key (`=> "name"`), optionally with a decode
/// default (`| "default"`), or is excluded from the mapping (`=> -`).
///
/// ```
/// restkit::params! {
///     pub struct UserQuery {
///         pub name: String => "name",
///         pub age: u32 => "age" | "18",
///     }
/// }
/// ```
#[macro_export]
macro_rules! params {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty => $ptag:tt $(| $default:literal)?
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $fty, )+
        }

        impl $crate::params::Params for $name {
            fn encode_params(
                &self,
                values: &mut $crate::params::UrlValues,
            ) -> ::std::result::Result<(), $crate::Error> {
                $( $crate::__param_encode!(self, values, $field, $ptag); )+
                ::std::result::Result::Ok(())
            }

            fn decode_params(
                &mut self,
                values: &$crate::params::UrlValues,
            ) -> ::std::result::Result<(), $crate::Error> {
                $( $crate::__param_decode!(self, values, $field, $ptag $(, $default)?); )+
                ::std::result::Result::Ok(())
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __param_encode {
    ($this:expr, $values:expr, $field:ident, -) => {};
    ($this:expr, $values:expr, $field:ident, $pname:literal) => {
        if !$crate::params::ParamValue::is_zero(&$this.$field) {
            if let ::std::option::Option::Some(v) =
                $crate::params::ParamValue::encode(&$this.$field)
            {
                $values.add($pname, v);
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __param_decode {
    ($this:expr, $values:expr, $field:ident, - $(, $default:literal)?) => {};
    ($this:expr, $values:expr, $field:ident, $pname:literal $(, $default:literal)?) => {{
        let default: ::std::option::Option<&str> =
            ::std::option::Option::None$(.or(::std::option::Option::Some($default)))?;
        if let ::std::option::Option::Some(raw) = $values.get($pname).or(default) {
            $this.$field = $crate::params::ParamValue::decode(raw, $pname)?;
        }
    }};
}
