//! Response body decoders.
//!
//! A [`ResponseDecoder`] turns the bytes of a response body into a typed
//! target. The set of decoders is closed: JSON, XML and a raw passthrough
//! that hands the bytes verbatim to targets such as `Vec<u8>` or `String`.

use crate::error::DecodeError;
use serde::de::value::{Error as ValueError, SeqDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::forward_to_deserialize_any;

/// Strategy used to decode response bodies into targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseDecoder {
    /// `serde_json` into any deserializable target
    #[default]
    Json,
    /// `quick-xml` into any deserializable target; the root element maps to
    /// the target struct
    Xml,
    /// Body bytes copied verbatim. Targets: `Vec<u8>`, `String` (UTF-8
    /// checked), `()` to discard, or any type that accepts a byte buffer.
    Raw,
}

impl ResponseDecoder {
    /// Decode `body` into a new `T`.
    ///
    /// # Errors
    /// Returns the decoder-specific [`DecodeError`] when `body` does not match
    /// the shape of `T`.
    pub fn decode<T: DeserializeOwned>(self, body: &[u8]) -> Result<T, DecodeError> {
        match self {
            ResponseDecoder::Json => Ok(serde_json::from_slice(body)?),
            ResponseDecoder::Xml => Ok(quick_xml::de::from_reader(body)?),
            ResponseDecoder::Raw => Ok(T::deserialize(RawBody(body.to_vec()))?),
        }
    }
}

/// Deserializer presenting an owned byte buffer as-is.
struct RawBody(Vec<u8>);

impl<'de> Deserializer<'de> for RawBody {
    type Error = ValueError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_byte_buf(self.0)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match String::from_utf8(self.0) {
            Ok(text) => visitor.visit_string(text),
            Err(e) => Err(de::Error::custom(e)),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let mut seq = SeqDeserializer::<_, ValueError>::new(self.0.into_iter());
        let value = visitor.visit_seq(&mut seq)?;
        seq.end()?;
        Ok(value)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char bytes
        byte_buf unit_struct tuple tuple_struct map struct enum identifier
        ignored_any
    }
}
