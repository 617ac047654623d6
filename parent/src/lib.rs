//! # tagpack
//!
//! This crate serves as a parent for the library crates in the tagpack
//! project, aggregating the modules you are likely to need when moving
//! dynamically-typed value trees over a compact binary wire format.
//!
//! - The [`core`] module holds the data model: [`Value`] trees,
//!   insertion-ordered [`Map`]s, the constructor tag table and the
//!   interning [`Dictionary`] shared between peers.
//! - The [`encoding`] module holds the codec itself: [`Encoder`] and
//!   [`Decoder`], plus the extension registry for custom value codecs.
//! - The [`stream`] module adapts the codec to chunked I/O with
//!   one-frame-per-value writers and incomplete-tail-buffering readers.
//!
//! ## Quick start
//!
//! ```
//! use tagpack::{decode, encode, Map, Value};
//!
//! let mut map = Map::new();
//! map.insert("answer", 42);
//! let bytes = encode(&Value::Map(map)).unwrap();
//! let value = decode(&bytes).unwrap();
//! assert_eq!(value.as_map().unwrap().get("answer"), Some(&Value::UInt(42)));
//! ```

pub use tagpack_core as core;
pub use tagpack_encoding as encoding;
pub use tagpack_stream as stream;

pub use tagpack_core::{Constructor, Custom, Dictionary, Map, Value};
pub use tagpack_encoding::{
    decode, encode, Decoder, DecoderOptions, Encoder, EncoderOptions, Extension, ExtensionCodec,
    ExtensionRegistry,
};
pub use tagpack_stream::{FrameDecoder, FrameEncoder};
