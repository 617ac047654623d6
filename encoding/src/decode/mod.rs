//! Reading tagpack byte streams back into value trees.
//!
//! The [`Decoder`] borrows its input slice and tracks the dictionary,
//! repeat and extension state mirroring the encoder's. Every read is
//! bounds-checked up front; running out of input raises the dedicated
//! [`Error::Incomplete`] variant, which is the one and only signal the
//! framing layer uses to accumulate partial frames.

use crate::extensions::{ExtensionError, ExtensionRegistry};
use byteordered::byteorder::{ByteOrder, LittleEndian};
use chrono::TimeZone;
use flate2::read::DeflateDecoder;
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::Read;
use std::mem;
use std::sync::Arc;
use tagpack_core::constructor::{LENGTH_EXTENDED, LENGTH_RESERVED};
use tagpack_core::value::{DateTime, Utc};
use tagpack_core::{Constructor, Dictionary, Map, Value};

/// Module-level error type:
/// for errors which may occur while unpacking values.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// The tag byte is reserved or unknown.
    #[snafu(display("invalid constructor tag {:#04x} at offset {}", tag, offset))]
    InvalidConstructor {
        tag: u8,
        offset: usize,
        backtrace: Backtrace,
    },

    /// The input ended before the current read could finish.
    ///
    /// This is a recoverable condition for callers that can supply
    /// more input; see [`Error::is_incomplete`].
    #[snafu(display(
        "incomplete input at offset {}: needed {} byte(s), {} available",
        offset,
        needed,
        available
    ))]
    Incomplete {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A length prefix used the reserved 255 marker.
    #[snafu(display("reserved length marker at offset {}", offset))]
    ReservedLength { offset: usize, backtrace: Backtrace },

    /// A `DictIndex` referenced a word neither seeded nor registered.
    #[snafu(display("dictionary index {} at offset {} is not registered", index, offset))]
    DictionaryMiss {
        index: usize,
        offset: usize,
        backtrace: Backtrace,
    },

    /// A string payload was not valid UTF-8.
    #[snafu(display("invalid UTF-8 in string at offset {}", offset))]
    InvalidString {
        offset: usize,
        source: std::str::Utf8Error,
    },

    /// A date payload did not denote a representable point in time.
    #[snafu(display("date value {} at offset {} is out of range", seconds, offset))]
    InvalidDate { seconds: f64, offset: usize },

    /// The raw-deflate payload of a GZIP sub-object was corrupt.
    #[snafu(display("could not inflate compressed sub-object at offset {}", offset))]
    Inflate {
        offset: usize,
        source: std::io::Error,
    },

    /// A GZIP payload inflated to a truncated sub-object.
    #[snafu(display("compressed sub-object at offset {} is truncated", offset))]
    TruncatedSubObject { offset: usize, backtrace: Backtrace },

    /// A repeat marker arrived before any scalar it could repeat.
    #[snafu(display("repeat marker at offset {} without a preceding scalar", offset))]
    RepeatWithoutValue { offset: usize, backtrace: Backtrace },

    /// The tag expected a boolean constructor.
    #[snafu(display("expected a boolean constructor at offset {}, found {:#04x}", offset, tag))]
    ExpectedBool {
        tag: u8,
        offset: usize,
        backtrace: Backtrace,
    },

    /// The tag expected the null constructor.
    #[snafu(display("expected the null constructor at offset {}, found {:#04x}", offset, tag))]
    ExpectedNull {
        tag: u8,
        offset: usize,
        backtrace: Backtrace,
    },

    /// The extension registered for a token failed to rebuild its value.
    #[snafu(display("extension codec for token {} failed to decode", token))]
    ExtensionDecode { token: u8, source: ExtensionError },
}

impl Error {
    /// Whether this error only means the input was cut short.
    ///
    /// Callers holding a partial frame can retry with more input;
    /// every other variant is a hard parse error.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::Incomplete { .. })
    }
}

/// Type alias for a result from this module.
pub type Result<T> = std::result::Result<T, Error>;

/// Construction options for a [`Decoder`].
#[derive(Debug, Default)]
pub struct DecoderOptions {
    /// Seed dictionary shared out-of-band with the encoding peer.
    pub dictionary: Option<Arc<Dictionary>>,
    /// Custom value codecs.
    pub extensions: ExtensionRegistry,
}

#[derive(Debug)]
struct RepeatPool {
    remaining: usize,
    value: Value,
}

/// A stateful value decoder over a borrowed input slice.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
    seed: Option<Arc<Dictionary>>,
    extended: Dictionary,
    extensions: Arc<ExtensionRegistry>,
    last: Option<Value>,
    repeat: Option<RepeatPool>,
}

impl<'a> Decoder<'a> {
    /// Create a decoder over `data` with no seed dictionary and no
    /// extensions.
    pub fn new(data: &'a [u8]) -> Self {
        Decoder::with_options(data, DecoderOptions::default())
    }

    /// Create a decoder over `data` from the given options.
    pub fn with_options(data: &'a [u8], options: DecoderOptions) -> Self {
        let extended = match &options.dictionary {
            Some(seed) => Dictionary::with_base(seed.end()),
            None => Dictionary::new(),
        };
        Decoder {
            data,
            offset: 0,
            seed: options.dictionary,
            extended,
            extensions: Arc::new(options.extensions),
            last: None,
            repeat: None,
        }
    }

    /// Create a decoder over `data` resuming dictionary state
    /// accumulated from earlier input, with a shared extension table.
    ///
    /// This is the constructor used by framing layers that decode a
    /// stream of concatenated frames: `extended` is the dictionary
    /// returned by [`Decoder::into_dictionary`] on the previous frame.
    pub fn resume(
        data: &'a [u8],
        seed: Option<Arc<Dictionary>>,
        extended: Dictionary,
        extensions: Arc<ExtensionRegistry>,
    ) -> Self {
        Decoder {
            data,
            offset: 0,
            seed,
            extended,
            extensions,
            last: None,
            repeat: None,
        }
    }

    /// The runtime-extended dictionary built up from `DictValue`
    /// payloads seen so far.
    pub fn dictionary(&self) -> &Dictionary {
        &self.extended
    }

    /// Give up the runtime-extended dictionary, for a later
    /// [`Decoder::resume`] over the next input.
    pub fn into_dictionary(self) -> Dictionary {
        self.extended
    }

    /// Rebind the decoder to a fresh input slice and read one value
    /// from its start.
    ///
    /// Repeat state is frame-local and reset here; dictionary state
    /// persists, so a stream of frames can keep referencing keys
    /// registered by earlier frames.
    pub fn decode(&mut self, data: &'a [u8]) -> Result<Value> {
        self.data = data;
        self.offset = 0;
        self.last = None;
        self.repeat = None;
        self.read_object()
    }

    /// Read one tagged value at the current position.
    pub fn read_object(&mut self) -> Result<Value> {
        if let Some(pool) = &mut self.repeat {
            if pool.remaining > 0 {
                pool.remaining -= 1;
                return Ok(pool.value.clone());
            }
            self.repeat = None;
        }
        let at = self.offset;
        let tag = self.read_byte()?;
        match Constructor::from_u8(tag) {
            Some(c) => {
                let value = self.read_core(c, at)?;
                self.last = if value.is_scalar() {
                    Some(value.clone())
                } else {
                    None
                };
                Ok(value)
            }
            None => self.read_extension(tag, at),
        }
    }

    fn read_core(&mut self, c: Constructor, at: usize) -> Result<Value> {
        match c {
            // a stray terminator is transparent at value position
            Constructor::None => self.read_object(),
            Constructor::Binary => self.read_bytes().map(Value::Bytes),
            Constructor::BoolFalse => Ok(Value::Bool(false)),
            Constructor::BoolTrue => Ok(Value::Bool(true)),
            Constructor::Null => Ok(Value::Null),
            Constructor::Date => self.read_date().map(Value::Date),
            Constructor::Vector => self.read_vector().map(Value::Vector),
            Constructor::VectorDynamic => self.read_vector_dynamic().map(Value::Vector),
            Constructor::Int8 => self.read_i8().map(|n| Value::Int(n.into())),
            Constructor::Int16 => self.read_i16().map(|n| Value::Int(n.into())),
            Constructor::Int32 => self.read_i32().map(|n| Value::Int(n.into())),
            Constructor::UInt8 => self.read_byte().map(|n| Value::UInt(n.into())),
            Constructor::UInt16 => self.read_u16().map(|n| Value::UInt(n.into())),
            Constructor::UInt32 => self.read_u32().map(|n| Value::UInt(n.into())),
            Constructor::Float => self.read_f32().map(Value::F32),
            Constructor::Double => self.read_f64().map(Value::F64),
            Constructor::Map => self.read_map().map(Value::Map),
            // interned short strings surface as dictionary constructors
            // at value position
            Constructor::DictValue => {
                let word = self.read_str()?;
                self.extended.insert(&word);
                Ok(Value::Str(word))
            }
            Constructor::DictIndex => {
                let index = self.read_length()?;
                self.resolve_index(index, at).map(Value::Str)
            }
            Constructor::String => self.read_str().map(Value::Str),
            Constructor::Repeat => {
                let count = self.read_length()?;
                let value = self
                    .last
                    .clone()
                    .context(RepeatWithoutValueSnafu { offset: at })?;
                if count > 0 {
                    self.repeat = Some(RepeatPool {
                        remaining: count - 1,
                        value: value.clone(),
                    });
                }
                Ok(value)
            }
            Constructor::Gzip => {
                let length = self.read_length()?;
                let payload_at = self.offset;
                let compressed = self.take(length)?;
                let mut inflated = Vec::new();
                DeflateDecoder::new(compressed)
                    .read_to_end(&mut inflated)
                    .context(InflateSnafu { offset: payload_at })?;
                self.read_sub_object(&inflated, payload_at)
            }
        }
    }

    /// Run a sub-decoder over an inflated payload, sharing this
    /// decoder's dictionary and extensions.
    fn read_sub_object(&mut self, data: &[u8], at: usize) -> Result<Value> {
        let mut child = Decoder {
            data,
            offset: 0,
            seed: self.seed.clone(),
            extended: mem::take(&mut self.extended),
            extensions: Arc::clone(&self.extensions),
            last: None,
            repeat: None,
        };
        let result = child.read_object();
        let Decoder { extended, .. } = child;
        self.extended = extended;
        match result {
            // the sub-object is framed by its full deflate payload, so
            // running dry inside it is corruption, not short input
            Err(e) if e.is_incomplete() => TruncatedSubObjectSnafu { offset: at }.fail(),
            other => other,
        }
    }

    fn read_extension(&mut self, token: u8, at: usize) -> Result<Value> {
        let registry = Arc::clone(&self.extensions);
        match registry.by_token(token) {
            Some(ext) => {
                let lowered = self.read_object()?;
                ext.rebuild(lowered)
                    .context(ExtensionDecodeSnafu { token })
            }
            None => InvalidConstructorSnafu { tag: token, offset: at }.fail(),
        }
    }

    /// Read the next map key through the dictionary.
    ///
    /// Returns `None` on the map terminator. A tag that is neither a
    /// dictionary constructor nor the terminator is left unconsumed and
    /// also ends the map.
    fn read_dictionary(&mut self) -> Result<Option<String>> {
        let at = self.offset;
        let tag = self.read_byte()?;
        match Constructor::from_u8(tag) {
            Some(Constructor::DictIndex) => {
                let index = self.read_length()?;
                self.resolve_index(index, at).map(Some)
            }
            Some(Constructor::DictValue) => {
                let word = self.read_str()?;
                self.extended.insert(&word);
                Ok(Some(word))
            }
            Some(Constructor::None) => Ok(None),
            _ => {
                self.offset = at;
                Ok(None)
            }
        }
    }

    fn resolve_index(&self, index: usize, at: usize) -> Result<String> {
        self.seed
            .as_ref()
            .and_then(|seed| seed.word_at(index))
            .or_else(|| self.extended.word_at(index))
            .map(str::to_owned)
            .context(DictionaryMissSnafu { index, offset: at })
    }

    // --- typed payload readers, symmetric to the encoder's writers ---

    /// Read one raw byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        self.take(1).map(|bytes| bytes[0])
    }

    /// Read a signed 8-bit payload.
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_byte().map(|b| b as i8)
    }

    /// Read a signed 16-bit little-endian payload.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.take(2).map(LittleEndian::read_i16)
    }

    /// Read a signed 32-bit little-endian payload.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.take(4).map(LittleEndian::read_i32)
    }

    /// Read an unsigned 16-bit little-endian payload.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.take(2).map(LittleEndian::read_u16)
    }

    /// Read an unsigned 32-bit little-endian payload.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.take(4).map(LittleEndian::read_u32)
    }

    /// Read a 32-bit IEEE-754 little-endian payload.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.take(4).map(LittleEndian::read_f32)
    }

    /// Read a 64-bit IEEE-754 little-endian payload.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.take(8).map(LittleEndian::read_f64)
    }

    /// Read a length prefix (see the encoder's `write_length`).
    pub fn read_length(&mut self) -> Result<usize> {
        let at = self.offset;
        let marker = self.read_byte()?;
        if marker < LENGTH_EXTENDED {
            Ok(usize::from(marker))
        } else if marker == LENGTH_RESERVED {
            ReservedLengthSnafu { offset: at }.fail()
        } else {
            self.take(3)
                .map(|bytes| LittleEndian::read_u24(bytes) as usize)
        }
    }

    /// Read a length-prefixed UTF-8 string payload.
    pub fn read_str(&mut self) -> Result<String> {
        let length = self.read_length()?;
        let at = self.offset;
        let bytes = self.take(length)?;
        std::str::from_utf8(bytes)
            .context(InvalidStringSnafu { offset: at })
            .map(str::to_owned)
    }

    /// Read a length-prefixed raw byte payload.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_length()?;
        self.take(length).map(<[u8]>::to_vec)
    }

    /// Read a date payload: an IEEE-754 double of Unix epoch seconds.
    pub fn read_date(&mut self) -> Result<DateTime<Utc>> {
        let at = self.offset;
        let seconds = self.read_f64()?;
        let millis = seconds * 1000.0;
        ensure!(
            millis.is_finite() && (i64::MIN as f64..=i64::MAX as f64).contains(&millis),
            InvalidDateSnafu {
                seconds,
                offset: at
            }
        );
        Utc.timestamp_millis_opt(millis.round() as i64)
            .single()
            .context(InvalidDateSnafu {
                seconds,
                offset: at
            })
    }

    /// Read a boolean constructor tag.
    pub fn read_bool(&mut self) -> Result<bool> {
        let at = self.offset;
        let tag = self.read_byte()?;
        match Constructor::from_u8(tag) {
            Some(Constructor::BoolTrue) => Ok(true),
            Some(Constructor::BoolFalse) => Ok(false),
            _ => ExpectedBoolSnafu { tag, offset: at }.fail(),
        }
    }

    /// Read the null constructor tag.
    pub fn read_null(&mut self) -> Result<()> {
        let at = self.offset;
        let tag = self.read_byte()?;
        match Constructor::from_u8(tag) {
            Some(Constructor::Null) => Ok(()),
            _ => ExpectedNullSnafu { tag, offset: at }.fail(),
        }
    }

    /// Read a vector payload: a length prefix followed by that many
    /// objects.
    pub fn read_vector(&mut self) -> Result<Vec<Value>> {
        let length = self.read_length()?;
        let mut items = Vec::with_capacity(length.min(self.remaining()));
        for _ in 0..length {
            items.push(self.read_object()?);
        }
        Ok(items)
    }

    /// Read a dynamic vector payload: objects until a `None` tag.
    pub fn read_vector_dynamic(&mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            if !self.repeat_pending() {
                let tag = self.peek_byte()?;
                if tag == u8::from(Constructor::None) {
                    self.offset += 1;
                    break;
                }
            }
            items.push(self.read_object()?);
        }
        Ok(items)
    }

    /// Read a map payload: dictionary keys and values until the
    /// terminator. Later bindings of a duplicate key replace earlier
    /// ones.
    pub fn read_map(&mut self) -> Result<Map> {
        let mut map = Map::new();
        while let Some(key) = self.read_dictionary()? {
            let value = self.read_object()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    // --- positioning ---

    /// The current read position.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Move the read position, clamped to the input length.
    pub fn set_position(&mut self, position: usize) {
        self.offset = position.min(self.data.len());
    }

    /// Move the read position by a signed delta, clamped to the input.
    pub fn seek(&mut self, delta: i64) {
        let target = self.offset as i64 + delta;
        self.set_position(target.max(0) as usize);
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn repeat_pending(&self) -> bool {
        self.repeat.as_ref().map_or(false, |pool| pool.remaining > 0)
    }

    fn peek_byte(&self) -> Result<u8> {
        ensure!(
            self.remaining() >= 1,
            IncompleteSnafu {
                offset: self.offset,
                needed: 1usize,
                available: 0usize,
            }
        );
        Ok(self.data[self.offset])
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        ensure!(
            n <= available,
            IncompleteSnafu {
                offset: self.offset,
                needed: n,
                available,
            }
        );
        let bytes = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }
}

/// Decode a single value with a fresh default decoder.
pub fn decode(data: &[u8]) -> Result<Value> {
    Decoder::new(data).read_object()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_frames_decode() {
        assert_eq!(decode(&[0x03]).unwrap(), Value::Bool(true));
        assert_eq!(decode(&[0x02]).unwrap(), Value::Bool(false));
        assert_eq!(decode(&[0x04]).unwrap(), Value::Null);
        assert_eq!(decode(&[0x0D, 0xFF]).unwrap(), Value::UInt(255));
        assert_eq!(decode(&[0x0C, 0x00, 0x01]).unwrap(), Value::UInt(256));
        assert_eq!(decode(&[0x0A, 0xFF]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn stray_terminators_are_transparent_at_value_position() {
        assert_eq!(decode(&[0x00, 0x00, 0x03]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn maps_rebuild_keys_from_the_dictionary() {
        let value = decode(&[0x10, 0x11, 0x01, 0x61, 0x0D, 0x01, 0x00]).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("a"), Some(&Value::UInt(1)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn repeat_marker_reuses_the_dictionary_and_last_value() {
        let value = decode(&[
            0x10, 0x11, 0x01, 0x61, 0x0D, 0x01, 0x12, 0x01, 0x14, 0x01, 0x00,
        ])
        .unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a"), Some(&Value::UInt(1)));
    }

    #[test]
    fn repeat_pool_drains_without_consuming_input() {
        let value = decode(&[0x06, 0x04, 0x0D, 0x07, 0x14, 0x03]).unwrap();
        assert_eq!(
            value,
            Value::Vector(vec![
                Value::UInt(7),
                Value::UInt(7),
                Value::UInt(7),
                Value::UInt(7),
            ])
        );
    }

    #[test]
    fn repeat_without_prior_scalar_is_rejected() {
        let err = decode(&[0x14, 0x01]).unwrap_err();
        assert!(matches!(err, Error::RepeatWithoutValue { .. }));
        assert!(!err.is_incomplete());
    }

    #[test]
    fn reserved_tags_are_invalid_constructors() {
        for tag in (21..=24).chain(26..=34) {
            let err = decode(&[tag]).unwrap_err();
            assert!(
                matches!(err, Error::InvalidConstructor { .. }),
                "tag {} should be invalid",
                tag
            );
            assert!(!err.is_incomplete());
        }
    }

    #[test]
    fn unknown_extension_tokens_are_invalid_constructors() {
        let err = decode(&[0x28]).unwrap_err();
        assert!(matches!(err, Error::InvalidConstructor { tag: 0x28, .. }));
    }

    #[test]
    fn truncated_input_is_flagged_incomplete() {
        let err = decode(&[0x0C, 0x00]).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn dynamic_vector_without_terminator_is_incomplete() {
        let err = decode(&[0x07, 0x0D, 0x01]).unwrap_err();
        assert!(err.is_incomplete());

        let ok = decode(&[0x07, 0x0D, 0x01, 0x00]).unwrap();
        assert_eq!(ok, Value::Vector(vec![Value::UInt(1)]));
    }

    #[test]
    fn reserved_length_marker_is_a_hard_error() {
        let err = decode(&[0x13, 0xFF]).unwrap_err();
        assert!(matches!(err, Error::ReservedLength { .. }));
        assert!(!err.is_incomplete());
    }

    #[test]
    fn dictionary_miss_is_a_hard_error() {
        let err = decode(&[0x10, 0x12, 0x05, 0x0D, 0x01, 0x00]).unwrap_err();
        assert!(matches!(err, Error::DictionaryMiss { index: 5, .. }));
    }

    #[test]
    fn positioning_helpers_track_consumption() {
        let mut decoder = Decoder::new(&[0x0D, 0x2A, 0x03]);
        assert_eq!(decoder.read_object().unwrap(), Value::UInt(42));
        assert_eq!(decoder.position(), 2);
        assert_eq!(decoder.read_object().unwrap(), Value::Bool(true));
        assert_eq!(decoder.position(), 3);
        decoder.seek(-1);
        assert_eq!(decoder.read_object().unwrap(), Value::Bool(true));
    }
}
