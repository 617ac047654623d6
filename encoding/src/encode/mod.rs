//! Writing value trees into the tagpack wire format.
//!
//! The [`Encoder`] owns a growable pack buffer and the dictionary and
//! extension state that give repeated keys, repeated scalars and custom
//! values their compact wire forms. One [`Encoder::encode`] call
//! produces one frame; dictionary state persists across calls so peers
//! sharing a long-lived encoder/decoder pair keep paying one
//! `DictValue` per distinct key.

use crate::extensions::ExtensionRegistry;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use std::io::Write;
use std::mem;
use std::sync::Arc;
use tagpack_core::constructor::{LENGTH_EXTENDED, MAX_LENGTH, SHORT_STRING_LIMIT};
use tagpack_core::value::{DateTime, Utc};
use tagpack_core::{Constructor, Dictionary, Map, Value};

pub mod buffer;

pub use buffer::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};

use buffer::PackBuffer;

/// Module-level error type:
/// for errors which may occur while packing values.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// The value has no core constructor and no registered extension
    /// claimed it.
    #[snafu(display("no encoding rule for value of kind {} and no extension claimed it", kind))]
    UnsupportedType {
        kind: &'static str,
        backtrace: Backtrace,
    },

    /// Growing the pack buffer would exceed the platform limit.
    #[snafu(display("packed buffer would be larger than maximum buffer size"))]
    BufferOverflow { required: usize },

    /// A length prefix cannot carry the requested length.
    #[snafu(display("length {} exceeds the 24-bit length prefix limit", length))]
    LengthTooLong {
        length: usize,
        backtrace: Backtrace,
    },

    /// The deflate sink failed while compressing a sub-object.
    #[snafu(display("could not deflate sub-object"))]
    Deflate {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

/// Type alias for a result from this module.
pub type Result<T> = std::result::Result<T, Error>;

/// Construction options for an [`Encoder`].
#[derive(Debug, Default)]
pub struct EncoderOptions {
    /// Compress string payloads as GZIP sub-objects.
    pub gzip: bool,
    /// Seed dictionary shared out-of-band with the decoding peer.
    pub dictionary: Option<Arc<Dictionary>>,
    /// Custom value codecs.
    pub extensions: ExtensionRegistry,
}

/// An open repeat run: the count length-prefix lives at `at` and is
/// rewritten in place while the run stays adjacent to the write offset.
#[derive(Debug)]
struct RepeatRun {
    at: usize,
    end: usize,
    count: u32,
}

/// A stateful value encoder over a growable buffer.
#[derive(Debug)]
pub struct Encoder {
    buf: PackBuffer,
    gzip: bool,
    seed: Option<Arc<Dictionary>>,
    extended: Dictionary,
    extensions: Arc<ExtensionRegistry>,
    last: Option<Value>,
    repeat: Option<RepeatRun>,
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new()
    }
}

impl Encoder {
    /// Create an encoder with no seed dictionary, no extensions and
    /// compression off.
    pub fn new() -> Self {
        Encoder::with_options(EncoderOptions::default())
    }

    /// Create an encoder from the given options.
    pub fn with_options(options: EncoderOptions) -> Self {
        let extended = match &options.dictionary {
            Some(seed) => Dictionary::with_base(seed.end()),
            None => Dictionary::new(),
        };
        Encoder {
            buf: PackBuffer::new(),
            gzip: options.gzip,
            seed: options.dictionary,
            extended,
            extensions: Arc::new(options.extensions),
            last: None,
            repeat: None,
        }
    }

    /// The runtime-extended dictionary built up by this encoder.
    pub fn dictionary(&self) -> &Dictionary {
        &self.extended
    }

    /// Encode one value, returning the written frame.
    ///
    /// The returned slice borrows the encoder's buffer and stays valid
    /// until the next `encode` call. Repeat state is frame-local;
    /// dictionary state persists across frames.
    pub fn encode(&mut self, value: &Value) -> Result<&[u8]> {
        self.reset();
        self.write_object(value)?;
        Ok(self.output())
    }

    /// Rewind the buffer and clear frame-local repeat state, keeping
    /// dictionary state. Called implicitly by [`Encoder::encode`];
    /// callers composing frames by hand call it between frames.
    pub fn reset(&mut self) {
        self.buf.reset();
        self.last = None;
        self.repeat = None;
    }

    /// The bytes written since the last reset.
    pub fn output(&self) -> &[u8] {
        self.buf.written()
    }

    /// Write one tagged value at the current offset.
    pub fn write_object(&mut self, value: &Value) -> Result<()> {
        if value.is_scalar() {
            if self.try_repeat(value)? {
                return Ok(());
            }
            self.last = Some(value.clone());
            return match value.constructor() {
                Some(c) => self.write_core(c, value),
                None => self.write_extension(value),
            };
        }
        // containers close any open run and never seed one
        self.repeat = None;
        match value.constructor() {
            Some(c) => {
                self.write_core(c, value)?;
                self.last = None;
                Ok(())
            }
            None => self.write_extension(value),
        }
    }

    /// Explicitly write a value as a GZIP sub-object, whatever its kind.
    pub fn write_compressed(&mut self, value: &Value) -> Result<()> {
        self.repeat = None;
        self.write_gzip_raw(value)?;
        self.last = if value.is_scalar() {
            Some(value.clone())
        } else {
            None
        };
        Ok(())
    }

    /// Open a dynamic vector. The caller writes any number of objects
    /// and closes it with [`Encoder::end_dynamic_vector`]. Nestable.
    pub fn start_dynamic_vector(&mut self) -> Result<()> {
        self.put_tag(Constructor::VectorDynamic)
    }

    /// Terminate the innermost open dynamic vector.
    pub fn end_dynamic_vector(&mut self) -> Result<()> {
        self.put_tag(Constructor::None)?;
        self.last = None;
        self.repeat = None;
        Ok(())
    }

    fn put_tag(&mut self, c: Constructor) -> Result<()> {
        self.buf.ensure(1)?;
        self.buf.put_u8(c.into());
        Ok(())
    }

    /// Emit or extend a repeat run if `value` equals the last scalar.
    ///
    /// A run may only be extended while its count bytes are still the
    /// last thing written; any emission in between (a map key, a
    /// terminator) forces a fresh run for the next repetition.
    fn try_repeat(&mut self, value: &Value) -> Result<bool> {
        match &self.last {
            Some(last) if last == value => {}
            _ => {
                self.repeat = None;
                return Ok(false);
            }
        }
        match self.repeat.take() {
            Some(mut run) if run.end == self.buf.offset() => {
                run.count += 1;
                self.buf.set_offset(run.at);
                self.write_length(run.count as usize)?;
                run.end = self.buf.offset();
                self.repeat = Some(run);
            }
            _ => {
                self.put_tag(Constructor::Repeat)?;
                let at = self.buf.offset();
                self.write_length(1)?;
                self.repeat = Some(RepeatRun {
                    at,
                    end: self.buf.offset(),
                    count: 1,
                });
            }
        }
        Ok(true)
    }

    fn write_core(&mut self, c: Constructor, value: &Value) -> Result<()> {
        if self.gzip && c == Constructor::String {
            return self.write_gzip_raw(value);
        }
        match value {
            Value::Int(n) => {
                self.put_tag(c)?;
                match c {
                    Constructor::UInt8 => self.write_byte(*n as u8),
                    Constructor::UInt16 => self.write_u16(*n as u16),
                    Constructor::UInt32 => self.write_u32(*n as u32),
                    Constructor::Int8 => self.write_i8(*n as i8),
                    Constructor::Int16 => self.write_i16(*n as i16),
                    Constructor::Int32 => self.write_i32(*n as i32),
                    _ => self.write_f64(*n as f64),
                }
            }
            Value::UInt(n) => {
                self.put_tag(c)?;
                match c {
                    Constructor::UInt8 => self.write_byte(*n as u8),
                    Constructor::UInt16 => self.write_u16(*n as u16),
                    Constructor::UInt32 => self.write_u32(*n as u32),
                    _ => self.write_f64(*n as f64),
                }
            }
            Value::F32(x) => {
                self.put_tag(c)?;
                self.write_f32(*x)
            }
            Value::F64(x) => {
                self.put_tag(c)?;
                self.write_f64(*x)
            }
            Value::Date(d) => {
                self.put_tag(c)?;
                self.write_date(d)
            }
            Value::Str(s) => {
                if s.encode_utf16().count() <= SHORT_STRING_LIMIT {
                    self.wire_dictionary(s)
                } else {
                    self.put_tag(c)?;
                    self.write_str(s)
                }
            }
            Value::Bytes(b) => {
                self.put_tag(c)?;
                self.write_bytes(b)
            }
            Value::Vector(items) => {
                self.put_tag(c)?;
                self.write_vector(items)
            }
            Value::Map(map) => {
                self.put_tag(c)?;
                self.write_map(map)
            }
            Value::Null | Value::Bool(_) => self.put_tag(c),
            Value::Custom(_) => self.write_extension(value),
        }
    }

    /// Write a map key or interned short string through the dictionary:
    /// `DictIndex` for a known word, `DictValue` registering a new one.
    fn wire_dictionary(&mut self, word: &str) -> Result<()> {
        let known = self
            .seed
            .as_ref()
            .and_then(|seed| seed.index_of(word))
            .or_else(|| self.extended.index_of(word));
        match known {
            Some(index) => {
                self.put_tag(Constructor::DictIndex)?;
                self.write_length(index)
            }
            None => {
                self.extended.insert(word);
                self.put_tag(Constructor::DictValue)?;
                self.write_str(word)
            }
        }
    }

    fn write_extension(&mut self, value: &Value) -> Result<()> {
        let registry = Arc::clone(&self.extensions);
        for ext in registry.encode_candidates() {
            if let Some(lowered) = ext.lower(value) {
                if let Some(token) = ext.token() {
                    self.buf.ensure(1)?;
                    self.buf.put_u8(token);
                }
                return self.write_object(&lowered);
            }
        }
        UnsupportedTypeSnafu { kind: value.kind() }.fail()
    }

    /// Encode `value` through an ephemeral child encoder sharing this
    /// encoder's dictionary and extensions, then emit the deflated
    /// child bytes as a GZIP sub-object.
    fn write_gzip_raw(&mut self, value: &Value) -> Result<()> {
        let mut child = Encoder {
            buf: PackBuffer::new(),
            gzip: false,
            seed: self.seed.clone(),
            extended: mem::take(&mut self.extended),
            extensions: Arc::clone(&self.extensions),
            last: None,
            repeat: None,
        };
        let outcome = child.write_object(value);
        let Encoder {
            buf: child_buf,
            extended,
            ..
        } = child;
        self.extended = extended;
        outcome?;

        let mut deflater = DeflateEncoder::new(Vec::new(), Compression::fast());
        deflater
            .write_all(child_buf.written())
            .context(DeflateSnafu)?;
        let compressed = deflater.finish().context(DeflateSnafu)?;

        self.put_tag(Constructor::Gzip)?;
        self.write_length(compressed.len())?;
        self.buf.ensure(compressed.len())?;
        self.buf.put_slice(&compressed);
        Ok(())
    }

    // --- typed payload writers, public for advanced callers ---

    /// Write one raw byte.
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.buf.ensure(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    /// Write a signed 8-bit payload.
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_byte(value as u8)
    }

    /// Write a signed 16-bit little-endian payload.
    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.buf.ensure(2)?;
        self.buf.put_i16(value);
        Ok(())
    }

    /// Write a signed 32-bit little-endian payload.
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.buf.ensure(4)?;
        self.buf.put_i32(value);
        Ok(())
    }

    /// Write an unsigned 16-bit little-endian payload.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.buf.ensure(2)?;
        self.buf.put_u16(value);
        Ok(())
    }

    /// Write an unsigned 32-bit little-endian payload.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.buf.ensure(4)?;
        self.buf.put_u32(value);
        Ok(())
    }

    /// Write a 32-bit IEEE-754 little-endian payload.
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.buf.ensure(4)?;
        self.buf.put_f32(value);
        Ok(())
    }

    /// Write a 64-bit IEEE-754 little-endian payload.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.buf.ensure(8)?;
        self.buf.put_f64(value);
        Ok(())
    }

    /// Write a length prefix: one byte below 254, otherwise the 254
    /// marker followed by an unsigned 24-bit little-endian length.
    pub fn write_length(&mut self, length: usize) -> Result<()> {
        if length < usize::from(LENGTH_EXTENDED) {
            self.write_byte(length as u8)
        } else {
            ensure!(length <= MAX_LENGTH, LengthTooLongSnafu { length });
            self.buf.ensure(4)?;
            self.buf.put_u8(LENGTH_EXTENDED);
            self.buf.put_u24(length as u32);
            Ok(())
        }
    }

    /// Write a length-prefixed UTF-8 string payload.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write a length-prefixed raw byte payload.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_length(value.len())?;
        self.buf.ensure(value.len())?;
        self.buf.put_slice(value);
        Ok(())
    }

    /// Write a date payload: an IEEE-754 double of Unix epoch seconds.
    pub fn write_date(&mut self, value: &DateTime<Utc>) -> Result<()> {
        self.write_f64(value.timestamp_millis() as f64 / 1000.0)
    }

    /// Write a boolean, carried entirely by its constructor tag.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.put_tag(if value {
            Constructor::BoolTrue
        } else {
            Constructor::BoolFalse
        })
    }

    /// Write the null constructor tag.
    pub fn write_null(&mut self) -> Result<()> {
        self.put_tag(Constructor::Null)
    }

    /// Write a vector payload: a length prefix followed by the items.
    pub fn write_vector(&mut self, items: &[Value]) -> Result<()> {
        self.write_length(items.len())?;
        for item in items {
            self.write_object(item)?;
        }
        Ok(())
    }

    /// Write a map payload: dictionary-keyed entries and a terminator.
    pub fn write_map(&mut self, map: &Map) -> Result<()> {
        for (key, value) in map.iter() {
            self.wire_dictionary(key)?;
            self.write_object(value)?;
        }
        self.put_tag(Constructor::None)
    }
}

/// Encode a single value with a fresh default encoder.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new();
    let bytes = encoder.encode(value)?;
    Ok(bytes.to_vec())
}
